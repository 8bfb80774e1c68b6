pub mod config;
pub mod decision;
pub mod errors;
pub mod extract;
pub mod metrics_defs;
pub mod postback;
pub mod relay;
pub mod service;

#[cfg(test)]
mod testutils;

use errors::RelayError;
use relay::Relay;
use service::RelayService;
use shared::http::run_http_service;
use std::sync::Arc;

pub async fn run(config: config::Config) -> Result<(), RelayError> {
    let relay = Relay::from_config(&config)?;
    let service = RelayService::new(Arc::new(relay), config.body_limit_bytes);

    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        "Postback relay listening"
    );
    run_http_service(&config.listener.host, config.listener.port, service).await
}
