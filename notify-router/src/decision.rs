use crate::errors::RelayError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Fields sent to the decision service for one notification.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub order_id: Value,
    /// Serialized as `null` when the notification amount was not a number.
    pub amount: Option<f64>,
    pub currency: Value,
    pub tracking_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliate_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_id: Option<Value>,
}

impl DecisionRequest {
    /// Order identifier as it should appear in logs.
    pub fn order_ref(&self) -> String {
        match &self.order_id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Raw verdict returned by the decision service. Fields stay untyped JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    pub status: u16,
    pub forward: Value,
    pub postback_url: Value,
}

impl Verdict {
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        let parsed = serde_json::from_slice::<Value>(body).unwrap_or(Value::Null);
        let field = |name: &str| parsed.get(name).cloned().unwrap_or(Value::Null);

        Verdict {
            status,
            forward: field("forward"),
            postback_url: field("postbackUrl"),
        }
    }

    /// Only the JSON boolean `true` approves a postback.
    pub fn approves(&self) -> bool {
        self.forward == Value::Bool(true)
    }
}

#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn decide(&self, request: &DecisionRequest) -> Result<Verdict, RelayError>;
}

/// Decision service reached over HTTP.
///
/// Every response status is accepted; only transport failures are errors.
pub struct HttpDecisionClient {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
    auth_token: Option<String>,
}

impl HttpDecisionClient {
    pub fn new(
        client: reqwest::Client,
        url: Url,
        timeout: Duration,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            client,
            url,
            timeout,
            auth_token,
        }
    }

    fn classify(&self, error: reqwest::Error) -> RelayError {
        if error.is_timeout() {
            RelayError::DecisionTimeout(self.timeout)
        } else {
            RelayError::DecisionRequestFailed(error.to_string())
        }
    }
}

#[async_trait]
impl DecisionService for HttpDecisionClient {
    async fn decide(&self, request: &DecisionRequest) -> Result<Verdict, RelayError> {
        let mut builder = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(request);

        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        Ok(Verdict::from_body(status, &body))
    }
}
