use crate::errors::RelayError;
use crate::metrics_defs::NOTIFY_REQUESTS;
use crate::relay::{Outcome, Relay};
use http::{Method, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use shared::counter;
use shared::http::{empty_response, make_boxed_error_response, text_response};
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type HandlerBody = BoxBody<Bytes, RelayError>;

pub const LIVENESS_MESSAGE: &str = "Postback relay is running";

/// Serves `/`, `/health` and `/notify` on the main listener.
pub struct RelayService {
    relay: Arc<Relay>,
    body_limit: usize,
}

impl RelayService {
    pub fn new(relay: Arc<Relay>, body_limit: usize) -> Self {
        Self { relay, body_limit }
    }
}

impl Service<Request<Incoming>> for RelayService {
    type Response = Response<HandlerBody>;
    type Error = RelayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let relay = self.relay.clone();
        let body_limit = self.body_limit;
        Box::pin(async move { Ok(route(relay, body_limit, req).await) })
    }
}

pub async fn route<B>(
    relay: Arc<Relay>,
    body_limit: usize,
    req: Request<B>,
) -> Response<HandlerBody>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    match (&method, path.as_str()) {
        (&Method::GET, "/") => text_response(StatusCode::OK, LIVENESS_MESSAGE),
        (&Method::GET, "/health") => text_response(StatusCode::OK, "ok"),
        (&Method::POST, "/notify") => {
            let result = match read_body(req.into_body(), body_limit).await {
                Ok(body) => run_detached(relay, body).await,
                Err(e) => Err(e),
            };
            respond(&result)
        }
        (_, "/" | "/health" | "/notify") => {
            make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED)
        }
        _ => make_boxed_error_response(StatusCode::NOT_FOUND),
    }
}

async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, RelayError>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    Limited::new(body, limit)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                RelayError::PayloadTooLarge { limit }
            } else {
                RelayError::RequestBodyError(e.to_string())
            }
        })
}

/// Runs the pipeline on its own task. A panic becomes an error, and a caller
/// hanging up does not cancel the postback.
async fn run_detached(relay: Arc<Relay>, body: Bytes) -> Result<Outcome, RelayError> {
    tokio::spawn(async move { relay.handle(&body).await })
        .await
        .unwrap_or_else(|e| Err(RelayError::InternalError(format!("Task panicked: {e}"))))
}

/// Maps the result of a notification to the response sent to the notifier.
///
/// Every outcome and every error becomes `200` with an empty body.
pub fn respond(result: &Result<Outcome, RelayError>) -> Response<HandlerBody> {
    let outcome = match result {
        Ok(outcome) => outcome.as_str(),
        Err(e) => {
            tracing::error!(error = %e, details = ?e, "Failed to process notification");
            "error"
        }
    };
    counter!(NOTIFY_REQUESTS, "outcome" => outcome).increment(1);

    empty_response(StatusCode::OK)
}
