//! Outgoing Request Descriptor
//!
//! Transport-agnostic request shape handed to the request sink, and a sink
//! wrapper that protects mutating requests with the session token.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use super::token::TokenLifecycleManager;

/// HTTP method of an outgoing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Whether requests with this method change server state
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Method::Post | Method::Put | Method::Patch | Method::Delete
        )
    }
}

/// Request descriptor (headers mapping and body)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingRequest {
    /// HTTP method
    pub method: Method,

    /// Target URL or path
    pub url: String,

    /// Header mapping
    pub headers: BTreeMap<String, String>,

    /// JSON body
    pub body: Option<serde_json::Value>,
}

impl OutgoingRequest {
    /// Create a request with no headers or body
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Create a POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Set a header, replacing any existing value
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Set the JSON body
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Header value by exact name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Response returned by a request sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkResponse {
    /// Status code
    pub status: u16,

    /// JSON body
    pub body: Option<serde_json::Value>,
}

/// Outgoing request sink (transport collaborator)
#[async_trait]
pub trait RequestSink: Send + Sync {
    /// Send the request; errors are transport failures
    async fn send(&self, request: OutgoingRequest) -> Result<SinkResponse>;
}

/// Sink wrapper that attaches the session token to mutating requests
///
/// A mutating request is never sent without a token.
pub struct ProtectedSink<S> {
    inner: S,
    tokens: TokenLifecycleManager,
}

impl<S: RequestSink> ProtectedSink<S> {
    /// Wrap `inner` with token protection
    pub fn new(inner: S, tokens: TokenLifecycleManager) -> Self {
        Self { inner, tokens }
    }

    /// Send a request, attaching the token when the method is mutating
    pub async fn send(&self, request: OutgoingRequest) -> Result<SinkResponse> {
        let request = if request.method.is_mutating() {
            match self.tokens.attach_token(&request) {
                Ok(protected) => protected,
                Err(e) => {
                    warn!(url = %request.url, "Refusing to send unprotected {:?} request", request.method);
                    return Err(e.into());
                }
            }
        } else {
            request
        };

        self.inner.send(request).await
    }

    /// Token manager in use
    pub fn tokens(&self) -> &TokenLifecycleManager {
        &self.tokens
    }

    /// Wrapped sink
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csrf::token::CSRF_HEADER;
    use crate::error::MonitorError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<OutgoingRequest>>,
    }

    #[async_trait]
    impl RequestSink for RecordingSink {
        async fn send(&self, request: OutgoingRequest) -> Result<SinkResponse> {
            self.sent.lock().unwrap().push(request);
            Ok(SinkResponse {
                status: 200,
                body: None,
            })
        }
    }

    #[test]
    fn test_mutating_methods() {
        assert!(Method::Post.is_mutating());
        assert!(Method::Put.is_mutating());
        assert!(Method::Patch.is_mutating());
        assert!(Method::Delete.is_mutating());
        assert!(!Method::Get.is_mutating());
        assert!(!Method::Head.is_mutating());
        assert!(!Method::Options.is_mutating());
    }

    #[test]
    fn test_request_builder() {
        let request = OutgoingRequest::post("/api/forms")
            .with_header("Content-Type", "application/json")
            .with_body(serde_json::json!({"name": "test"}));

        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.body.unwrap()["name"], "test");
    }

    #[tokio::test]
    async fn test_protected_sink_attaches_token_to_post() {
        let tokens = TokenLifecycleManager::for_session();
        let token = tokens.get_token().unwrap();
        let sink = ProtectedSink::new(RecordingSink::default(), tokens);

        let response = sink.send(OutgoingRequest::post("/api/invitations")).await.unwrap();
        assert_eq!(response.status, 200);

        let sent = sink.inner().sent.lock().unwrap();
        assert_eq!(sent[0].header(CSRF_HEADER), Some(token.as_str()));
    }

    #[tokio::test]
    async fn test_protected_sink_leaves_get_untouched() {
        let sink = ProtectedSink::new(RecordingSink::default(), TokenLifecycleManager::for_session());

        sink.send(OutgoingRequest::get("/api/documents")).await.unwrap();

        let sent = sink.inner().sent.lock().unwrap();
        assert!(sent[0].header(CSRF_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_protected_sink_refuses_without_token() {
        let tokens = TokenLifecycleManager::for_session();
        tokens.clear_token();
        let sink = ProtectedSink::new(RecordingSink::default(), tokens);

        let err = sink
            .send(OutgoingRequest::new(Method::Delete, "/api/documents/1"))
            .await
            .unwrap_err();

        assert_eq!(err.downcast_ref::<MonitorError>(), Some(&MonitorError::TokenMissing));
        assert!(sink.inner().sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_still_sent_without_token() {
        let tokens = TokenLifecycleManager::for_session();
        tokens.clear_token();
        let sink = ProtectedSink::new(RecordingSink::default(), tokens);

        assert!(sink.send(OutgoingRequest::get("/api/documents")).await.is_ok());
    }
}
