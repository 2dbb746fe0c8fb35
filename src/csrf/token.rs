//! Anti-Forgery Token Lifecycle
//!
//! One current token per session. Generation and clearing replace the whole
//! value under a write lock, so readers see either the old token, the new
//! token, or no token.

use rand::RngCore;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use super::request::OutgoingRequest;
use crate::error::MonitorError;
use crate::metrics;

/// Header carrying the token on outgoing requests
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Minimum token entropy in bytes
pub const MIN_TOKEN_BYTES: usize = 32;

/// An anti-forgery token value (hex-encoded random bytes)
#[derive(Clone, PartialEq, Eq)]
pub struct AntiForgeryToken(String);

impl AntiForgeryToken {
    /// Generate a token from `bytes` bytes of OS-seeded randomness
    pub fn generate(bytes: usize) -> Self {
        let mut buf = vec![0u8; bytes.max(MIN_TOKEN_BYTES)];
        rand::rng().fill_bytes(&mut buf);
        Self(hex::encode(buf))
    }

    /// Token string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a candidate string
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

// Keep token values out of logs
impl fmt::Debug for AntiForgeryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AntiForgeryToken({}…)", &self.0[..8.min(self.0.len())])
    }
}

/// Token lifecycle manager, shared by all request constructors of a session
#[derive(Debug, Clone)]
pub struct TokenLifecycleManager {
    /// Current token
    current: Arc<RwLock<Option<AntiForgeryToken>>>,

    /// Header name used by `attach_token`
    header_name: String,

    /// Random bytes per token
    token_bytes: usize,
}

impl TokenLifecycleManager {
    /// Create a manager with no token
    pub fn new(header_name: impl Into<String>, token_bytes: usize) -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            header_name: header_name.into(),
            token_bytes: token_bytes.max(MIN_TOKEN_BYTES),
        }
    }

    /// Create a manager for a new session and generate its initial token
    pub fn for_session() -> Self {
        let manager = Self::new(CSRF_HEADER, MIN_TOKEN_BYTES);
        manager.generate_token();
        manager
    }

    /// Create a session manager from configuration and generate its initial token
    pub fn from_config(config: &crate::config::CsrfConfig) -> Self {
        let manager = Self::new(config.header_name.clone(), config.token_bytes);
        manager.generate_token();
        manager
    }

    /// Generate a new token, replacing any previous one
    pub fn generate_token(&self) -> AntiForgeryToken {
        let token = AntiForgeryToken::generate(self.token_bytes);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        info!("Generated anti-forgery token");
        token
    }

    /// Current token, if any
    pub fn get_token(&self) -> Option<AntiForgeryToken> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether `candidate` equals the current token
    ///
    /// Always false when no token exists.
    pub fn validate_token(&self, candidate: &str) -> bool {
        let valid = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|token| token.matches(candidate));

        let label = if valid { "valid" } else { "invalid" };
        metrics::CSRF_VALIDATIONS_TOTAL
            .with_label_values(&[label])
            .inc();
        if !valid {
            debug!("Anti-forgery token validation failed");
        }
        valid
    }

    /// Validate `candidate`, reporting why it was rejected
    pub fn ensure_valid(&self, candidate: &str) -> Result<(), MonitorError> {
        if self.get_token().is_none() {
            return Err(MonitorError::TokenMissing);
        }
        if self.validate_token(candidate) {
            Ok(())
        } else {
            Err(MonitorError::TokenMismatch)
        }
    }

    /// Return a copy of `request` carrying the current token
    pub fn attach_token(&self, request: &OutgoingRequest) -> Result<OutgoingRequest, MonitorError> {
        let token = self.get_token().ok_or(MonitorError::TokenMissing)?;
        Ok(request
            .clone()
            .with_header(&self.header_name, token.as_str()))
    }

    /// Remove the current token (e.g. on sign-out)
    pub fn clear_token(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        info!("Cleared anti-forgery token");
    }

    /// Header name used by `attach_token`
    pub fn header_name(&self) -> &str {
        &self.header_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_entropy() {
        let token = AntiForgeryToken::generate(32);
        assert_eq!(token.as_str().len(), 64);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit()));

        // Requests below the minimum are raised to it
        assert_eq!(AntiForgeryToken::generate(4).as_str().len(), 64);
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = AntiForgeryToken::generate(32);
        let b = AntiForgeryToken::generate(32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_session_starts_with_token() {
        let manager = TokenLifecycleManager::for_session();
        assert!(manager.get_token().is_some());
        assert_eq!(manager.header_name(), CSRF_HEADER);
    }

    #[test]
    fn test_validate_generated_token() {
        let manager = TokenLifecycleManager::new(CSRF_HEADER, 32);
        let token = manager.generate_token();
        assert!(manager.validate_token(token.as_str()));
    }

    #[test]
    fn test_regeneration_invalidates_previous() {
        let manager = TokenLifecycleManager::for_session();
        let old = manager.get_token().unwrap();
        let new = manager.generate_token();

        assert!(!manager.validate_token(old.as_str()));
        assert!(manager.validate_token(new.as_str()));
    }

    #[test]
    fn test_clear_token() {
        let manager = TokenLifecycleManager::for_session();
        let token = manager.get_token().unwrap();
        manager.clear_token();

        assert!(manager.get_token().is_none());
        assert!(!manager.validate_token(token.as_str()));
        assert!(!manager.validate_token(""));
    }

    #[test]
    fn test_validate_rejects_near_misses() {
        let manager = TokenLifecycleManager::for_session();
        let token = manager.get_token().unwrap();
        let s = token.as_str();

        assert!(!manager.validate_token(&s[..s.len() - 1]));
        assert!(!manager.validate_token(&format!("{}0", s)));
        assert!(!manager.validate_token(&s.to_uppercase()));
    }

    #[test]
    fn test_ensure_valid() {
        let manager = TokenLifecycleManager::for_session();
        let token = manager.get_token().unwrap();

        assert!(manager.ensure_valid(token.as_str()).is_ok());
        assert_eq!(manager.ensure_valid("nope"), Err(MonitorError::TokenMismatch));

        manager.clear_token();
        assert_eq!(manager.ensure_valid(token.as_str()), Err(MonitorError::TokenMissing));
    }

    #[test]
    fn test_attach_token() {
        let manager = TokenLifecycleManager::for_session();
        let token = manager.get_token().unwrap();
        let request = OutgoingRequest::post("/api/invitations");

        let protected = manager.attach_token(&request).unwrap();
        assert_eq!(protected.header(CSRF_HEADER), Some(token.as_str()));
        assert!(request.header(CSRF_HEADER).is_none());
    }

    #[test]
    fn test_attach_without_token_fails() {
        let manager = TokenLifecycleManager::new(CSRF_HEADER, 32);
        let request = OutgoingRequest::post("/api/invitations");
        assert_eq!(manager.attach_token(&request), Err(MonitorError::TokenMissing));
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = AntiForgeryToken::generate(32);
        let debug = format!("{:?}", token);
        assert!(!debug.contains(token.as_str()));
    }

    #[test]
    fn test_concurrent_readers_see_whole_tokens() {
        let manager = TokenLifecycleManager::for_session();
        let writer = manager.clone();

        let handle = std::thread::spawn(move || {
            for _ in 0..200 {
                writer.generate_token();
            }
        });

        for _ in 0..200 {
            if let Some(token) = manager.get_token() {
                assert_eq!(token.as_str().len(), 64);
            }
        }
        handle.join().unwrap();
    }
}
