//! Transport-neutral request/response types.
//!
//! Handlers on both nodes speak [`WireRequest`] / [`WireResponse`]. An HTTP
//! front end only has to translate its own request type into a
//! `WireRequest` (decoded query pairs, bearer token, raw body) and write the
//! `WireResponse` back; tests route the same types in-process.

use crate::messages::ApiEnvelope;
use serde::Serialize;
use std::sync::Arc;

/// Endpoint paths.
pub mod endpoints {
    /// Edge → cloud record ingestion.
    pub const PUSH: &str = "/api/v1/sync/push";
    /// Edge ← cloud delta fetch.
    pub const PULL: &str = "/api/v1/sync/pull";
    /// Unauthenticated liveness probe.
    pub const HEALTH: &str = "/api/v1/health";
    /// Edge sync status.
    pub const STATUS: &str = "/api/v1/system/status";
}

/// HTTP method subset used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A request as seen by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    /// Method.
    pub method: Method,
    /// Path without query string.
    pub path: String,
    /// Percent-decoded query pairs.
    pub query: Vec<(String, String)>,
    /// Bearer credential from the `Authorization` header.
    pub bearer: Option<String>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl WireRequest {
    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            bearer: None,
            body: Vec::new(),
        }
    }

    /// Creates a POST request with a body.
    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            bearer: None,
            body,
        }
    }

    /// Sets the query pairs.
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Sets the bearer credential.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Extracts the token from an `Authorization: Bearer <token>` header value.
    pub fn bearer_from_header(header: &str) -> Option<&str> {
        let mut parts = header.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("Bearer"), Some(token), None) => Some(token),
            _ => None,
        }
    }
}

/// A response produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    /// HTTP status code.
    pub status: u16,
    /// JSON body.
    pub body: Vec<u8>,
}

impl WireResponse {
    /// Serializes an envelope with the given status.
    pub fn envelope<T: Serialize>(status: u16, envelope: &ApiEnvelope<T>) -> Self {
        match envelope.to_json() {
            Ok(body) => Self { status, body },
            Err(_) => Self {
                status: 500,
                body: br#"{"success":false,"message":"failed to encode response","data":null}"#
                    .to_vec(),
            },
        }
    }

    /// A 200 response carrying `data`.
    pub fn ok<T: Serialize>(message: &str, data: T) -> Self {
        Self::envelope(200, &ApiEnvelope::ok(message, data))
    }

    /// An error response with no payload.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::envelope::<()>(status, &ApiEnvelope::error(message))
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that answers wire requests.
pub trait WireHandler: Send + Sync {
    /// Handles one request.
    fn handle(&self, request: &WireRequest) -> WireResponse;
}

impl<H: WireHandler + ?Sized> WireHandler for Arc<H> {
    fn handle(&self, request: &WireRequest) -> WireResponse {
        (**self).handle(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(WireRequest::bearer_from_header("Bearer abc123"), Some("abc123"));
        assert_eq!(WireRequest::bearer_from_header("Basic abc123"), None);
        assert_eq!(WireRequest::bearer_from_header("Bearer"), None);
        assert_eq!(WireRequest::bearer_from_header("Bearer a b"), None);
    }

    #[test]
    fn error_response_shape() {
        let resp = WireResponse::error(401, "Invalid API key");
        assert_eq!(resp.status, 401);
        assert!(!resp.is_success());

        let env: ApiEnvelope<()> = ApiEnvelope::from_json(&resp.body).unwrap();
        assert!(!env.success);
        assert_eq!(env.message, "Invalid API key");
        assert!(env.data.is_none());
    }

    #[test]
    fn ok_response_shape() {
        let resp = WireResponse::ok("OK", 3u8);
        assert!(resp.is_success());
        let env: ApiEnvelope<u8> = ApiEnvelope::from_json(&resp.body).unwrap();
        assert_eq!(env.into_data().unwrap(), 3);
    }

    #[test]
    fn request_builders() {
        let req = WireRequest::get(endpoints::PULL)
            .with_query(vec![("last_sync".into(), "x".into())])
            .with_bearer("key");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.bearer.as_deref(), Some("key"));
        assert_eq!(req.query.len(), 1);
    }
}
