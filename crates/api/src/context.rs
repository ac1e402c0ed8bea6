//! Caller identity as forwarded by the upstream gateway.
//!
//! Authentication happens before requests reach this service. The gateway
//! sets exactly one of the identity headers below; this module turns it into
//! the [`RequestContext`] every operation receives.

use axum::http::HeaderMap;
use thiserror::Error;
use uuid::Uuid;

use foodrescue_core::{Actor, ConsumerId, RequestContext, StoreId};

pub const STORE_ID_HEADER: &str = "x-store-id";
pub const CONSUMER_ID_HEADER: &str = "x-consumer-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("missing caller identity (set {STORE_ID_HEADER} or {CONSUMER_ID_HEADER})")]
    Missing,
    #[error("only one of {STORE_ID_HEADER} and {CONSUMER_ID_HEADER} may be set")]
    Ambiguous,
    #[error("malformed header {0}")]
    Malformed(&'static str),
}

/// Build the request context from identity headers.
pub fn context_from_headers(headers: &HeaderMap) -> Result<RequestContext, ContextError> {
    let store = header_value(headers, STORE_ID_HEADER)?;
    let consumer = header_value(headers, CONSUMER_ID_HEADER)?;

    let actor = match (store, consumer) {
        (Some(_), Some(_)) => return Err(ContextError::Ambiguous),
        (None, None) => return Err(ContextError::Missing),
        (Some(raw), None) => Actor::Supplier {
            store_id: raw
                .parse::<StoreId>()
                .map_err(|_| ContextError::Malformed(STORE_ID_HEADER))?,
        },
        (None, Some(raw)) => Actor::Consumer {
            consumer_id: raw
                .parse::<ConsumerId>()
                .map_err(|_| ContextError::Malformed(CONSUMER_ID_HEADER))?,
        },
    };

    // A gateway-assigned request id is kept so logs correlate across hops.
    let request_id = header_value(headers, REQUEST_ID_HEADER)?
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .unwrap_or_else(Uuid::now_v7);

    Ok(RequestContext::with_request_id(request_id, actor))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, ContextError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let value = value.to_str().map_err(|_| ContextError::Malformed(name))?.trim();
            Ok((!value.is_empty()).then_some(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn supplier_header_makes_supplier_context() {
        let ctx = context_from_headers(&headers(&[(STORE_ID_HEADER, "4")])).unwrap();
        assert_eq!(ctx.store_id(), Some(StoreId::new(4)));
    }

    #[test]
    fn consumer_header_makes_consumer_context() {
        let ctx = context_from_headers(&headers(&[(CONSUMER_ID_HEADER, " 12 ")])).unwrap();
        assert_eq!(ctx.consumer_id(), Some(ConsumerId::new(12)));
    }

    #[test]
    fn request_id_is_propagated() {
        let id = Uuid::now_v7();
        let ctx = context_from_headers(&headers(&[
            (STORE_ID_HEADER, "1"),
            (REQUEST_ID_HEADER, &id.to_string()),
        ]))
        .unwrap();
        assert_eq!(ctx.request_id(), id);
    }

    #[test]
    fn rejects_missing_ambiguous_and_malformed() {
        assert_eq!(context_from_headers(&HeaderMap::new()), Err(ContextError::Missing));
        assert_eq!(
            context_from_headers(&headers(&[(STORE_ID_HEADER, "1"), (CONSUMER_ID_HEADER, "2")])),
            Err(ContextError::Ambiguous)
        );
        assert_eq!(
            context_from_headers(&headers(&[(STORE_ID_HEADER, "abc")])),
            Err(ContextError::Malformed(STORE_ID_HEADER))
        );
    }
}
