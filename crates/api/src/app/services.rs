//! Service wiring shared by every handler.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;

use foodrescue_infra::{InMemoryOrderService, ServiceConfig, ServiceResult};

use crate::app::errors;

pub type AppServices = InMemoryOrderService;

pub fn build_services(config: &ServiceConfig) -> AppServices {
    InMemoryOrderService::in_memory(config)
}

/// Run a service call off the async runtime.
///
/// Operations wait on row locks, so they run on the blocking pool.
pub async fn blocking<T, F>(services: &Arc<AppServices>, op: F) -> Result<T, Response>
where
    F: FnOnce(&AppServices) -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    let services = Arc::clone(services);
    match tokio::task::spawn_blocking(move || op(&services)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(errors::service_error_to_response(err)),
        Err(join) => {
            tracing::error!(error = %join, "service task failed");
            Err(errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            ))
        }
    }
}
