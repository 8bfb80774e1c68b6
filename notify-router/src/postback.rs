use crate::errors::RelayError;
use async_trait::async_trait;
use reqwest::redirect::Policy;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_REDIRECTS: usize = 10;

/// Reasons a postback URL supplied by the decision service is rejected.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PostbackUrlError {
    #[error("Postback URL is missing")]
    Missing,

    #[error("Postback URL must be a string, got {0}")]
    NotAString(&'static str),

    #[error("Postback URL is malformed: {0}")]
    Malformed(#[from] url::ParseError),

    #[error("Postback URL must use https, got {0}")]
    NotHttps(String),
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Accepts only absolute `https` URLs.
pub fn validate_postback_url(raw: &Value) -> Result<Url, PostbackUrlError> {
    let raw = match raw {
        Value::Null => return Err(PostbackUrlError::Missing),
        Value::String(s) if s.is_empty() => return Err(PostbackUrlError::Missing),
        Value::String(s) => s,
        other => return Err(PostbackUrlError::NotAString(json_type(other))),
    };

    let url = Url::parse(raw)?;
    if url.scheme() != "https" {
        return Err(PostbackUrlError::NotHttps(url.scheme().to_string()));
    }

    Ok(url)
}

#[async_trait]
pub trait PostbackSender: Send + Sync {
    /// Issues the postback and returns the response status, whatever it is.
    async fn send(&self, url: &Url) -> Result<u16, RelayError>;
}

/// Follows redirects only while every hop stays on `https`.
pub fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.url().scheme() != "https" {
            let scheme = attempt.url().scheme().to_string();
            attempt.error(PostbackUrlError::NotHttps(scheme))
        } else if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    })
}

pub struct HttpPostbackClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPostbackClient {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Builds its own client with [`redirect_policy`].
    pub fn build(timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .redirect(redirect_policy())
            .build()
            .map_err(|e| RelayError::HttpClientError(e.to_string()))?;
        Ok(Self::new(client, timeout))
    }
}

#[async_trait]
impl PostbackSender for HttpPostbackClient {
    async fn send(&self, url: &Url) -> Result<u16, RelayError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::PostbackTimeout(self.timeout)
                } else {
                    RelayError::PostbackRequestFailed(e.to_string())
                }
            })?;

        Ok(response.status().as_u16())
    }
}
