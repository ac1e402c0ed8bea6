use std::sync::Arc;

use anyhow::Context;

use foodrescue_infra::ServiceConfig;
use foodrescue_observability::LogConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("invalid configuration")?;
    foodrescue_observability::init(&LogConfig::with_format(config.log_format));

    let services = Arc::new(foodrescue_api::app::services::build_services(&config));
    let app = foodrescue_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        lock_timeout_ms = config.lock_timeout.as_millis() as u64,
        token_validity_secs = config.token_validity.as_secs(),
        currency = %config.default_currency,
        "listening"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
