use axum::{middleware::Next, response::Response};
use tracing::Instrument;

use crate::app::errors;
use crate::context::context_from_headers;

/// Attach the caller's [`foodrescue_core::RequestContext`] to the request.
pub async fn context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ctx = match context_from_headers(req.headers()) {
        Ok(ctx) => ctx,
        Err(err) => return errors::context_error_to_response(err),
    };

    let span = tracing::info_span!(
        "request",
        request_id = %ctx.request_id(),
        actor = %ctx.actor(),
        method = %req.method(),
        path = %req.uri().path(),
    );
    req.extensions_mut().insert(ctx);

    next.run(req).instrument(span).await
}
