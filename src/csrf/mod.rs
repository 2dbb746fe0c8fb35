//! Anti-Forgery Token Module
//!
//! Session-scoped tokens attached to outgoing mutating requests.
//!
//! - One current token per session, generated when the session starts
//! - Validation by exact (constant-time) equality against the current token
//! - Tokens live in memory only and are cleared on sign-out

pub mod request;
pub mod token;

pub use request::{Method, OutgoingRequest, ProtectedSink, RequestSink, SinkResponse};
pub use token::{AntiForgeryToken, TokenLifecycleManager, CSRF_HEADER};
