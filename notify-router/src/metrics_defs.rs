use shared::metrics_defs::{MetricDef, MetricType};

pub const NOTIFY_REQUESTS: MetricDef = MetricDef {
    name: "notify.requests",
    metric_type: MetricType::Counter,
    description: "Notifications received. Tagged with outcome.",
};

pub const DECISION_DURATION: MetricDef = MetricDef {
    name: "decision.duration",
    metric_type: MetricType::Histogram,
    description: "Decision service call duration in seconds, including failures",
};

pub const POSTBACK_DURATION: MetricDef = MetricDef {
    name: "postback.duration",
    metric_type: MetricType::Histogram,
    description: "Postback request duration in seconds, including failures",
};

pub const ALL_METRICS: &[MetricDef] = &[NOTIFY_REQUESTS, DECISION_DURATION, POSTBACK_DURATION];
