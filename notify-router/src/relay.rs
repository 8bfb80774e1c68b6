use crate::config::Config;
use crate::decision::{DecisionService, HttpDecisionClient};
use crate::errors::RelayError;
use crate::extract::ExtractionProfile;
use crate::metrics_defs::{DECISION_DURATION, POSTBACK_DURATION};
use crate::postback::{
    HttpPostbackClient, PostbackSender, PostbackUrlError, validate_postback_url,
};
use serde_json::Value;
use shared::histogram;
use std::sync::Arc;
use std::time::Instant;

/// Terminal state of one notification pass.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// Order identifier or tracking token absent; nothing was called.
    MissingFields {
        has_order_id: bool,
        has_tracking_token: bool,
    },
    /// The decision service could not be reached or timed out.
    DecisionFailed { error: String },
    /// The verdict did not approve the conversion.
    DecisionSkipped { forward: Value },
    /// The verdict approved but its postback URL is unusable.
    InvalidPostback(PostbackUrlError),
    PostbackSent { status: u16 },
    PostbackFailed { error: String },
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::MissingFields { .. } => "missing_fields",
            Outcome::DecisionFailed { .. } => "decision_failed",
            Outcome::DecisionSkipped { .. } => "decision_skip",
            Outcome::InvalidPostback(_) => "invalid_postback",
            Outcome::PostbackSent { .. } => "postback_sent",
            Outcome::PostbackFailed { .. } => "postback_failed",
        }
    }
}

/// Extracts fields, consults the decision service and dispatches the postback.
///
/// Holds no per-request state; one instance serves every request.
pub struct Relay {
    profile: ExtractionProfile,
    decision: Arc<dyn DecisionService>,
    postback: Arc<dyn PostbackSender>,
}

impl Relay {
    pub fn new(
        profile: ExtractionProfile,
        decision: Arc<dyn DecisionService>,
        postback: Arc<dyn PostbackSender>,
    ) -> Self {
        Self {
            profile,
            decision,
            postback,
        }
    }

    /// Builds a relay talking to the configured decision service over HTTP.
    pub fn from_config(config: &Config) -> Result<Self, RelayError> {
        let url = config
            .control
            .url
            .clone()
            .ok_or_else(|| RelayError::InternalError("control URL is not configured".into()))?;
        let timeout = config.control.timeout();

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayError::HttpClientError(e.to_string()))?;

        let decision = HttpDecisionClient::new(
            client,
            url,
            timeout,
            config.control.auth_token.clone(),
        );
        let postback = HttpPostbackClient::build(timeout)?;

        Ok(Self::new(
            config.extraction.profile(),
            Arc::new(decision),
            Arc::new(postback),
        ))
    }

    /// Parses a raw notification body and runs it through the pipeline.
    pub async fn handle(&self, body: &[u8]) -> Result<Outcome, RelayError> {
        let payload = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Default::default())
        } else {
            serde_json::from_slice(body)?
        };
        self.process(&payload).await
    }

    pub async fn process(&self, payload: &Value) -> Result<Outcome, RelayError> {
        tracing::info!(body = %payload, "Received notification");

        let fields = self.profile.extract(payload);
        let Some(request) = fields.decision_request() else {
            tracing::info!(
                order_id = ?fields.order_id,
                has_tracking_token = fields.tracking_token.is_some(),
                "Skipping notification with missing required fields"
            );
            return Ok(Outcome::MissingFields {
                has_order_id: fields.order_id.is_some(),
                has_tracking_token: fields.tracking_token.is_some(),
            });
        };
        let order_id = request.order_ref();

        let started = Instant::now();
        let verdict = self.decision.decide(&request).await;
        histogram!(DECISION_DURATION).record(started.elapsed().as_secs_f64());

        let verdict = match verdict {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Decision service call failed");
                return Ok(Outcome::DecisionFailed {
                    error: e.to_string(),
                });
            }
        };

        tracing::info!(
            order_id = %order_id,
            status = verdict.status,
            forward = %verdict.forward,
            "Decision service responded"
        );

        if !verdict.approves() {
            tracing::info!(
                order_id = %order_id,
                forward = %verdict.forward,
                "Conversion suppressed by decision service"
            );
            return Ok(Outcome::DecisionSkipped {
                forward: verdict.forward,
            });
        }

        let url = match validate_postback_url(&verdict.postback_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(
                    order_id = %order_id,
                    postback_url = %verdict.postback_url,
                    error = %e,
                    "Decision service returned an unusable postback URL"
                );
                return Ok(Outcome::InvalidPostback(e));
            }
        };

        let started = Instant::now();
        let result = self.postback.send(&url).await;
        histogram!(POSTBACK_DURATION).record(started.elapsed().as_secs_f64());

        match result {
            Ok(status) => {
                tracing::info!(order_id = %order_id, status, "Postback sent");
                Ok(Outcome::PostbackSent { status })
            }
            Err(e) => {
                tracing::error!(
                    order_id = %order_id,
                    status = "error",
                    error = %e,
                    "Postback failed"
                );
                Ok(Outcome::PostbackFailed {
                    error: e.to_string(),
                })
            }
        }
    }
}
