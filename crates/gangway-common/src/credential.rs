//! Platform-issued session credential.
//!
//! The hosting platform hands the embedded app a short-lived bearer token
//! through the page URL. The token authorizes backend requests for the
//! lifetime of the current page load; this layer never persists or refreshes
//! it.
//!
//! # Security
//!
//! The token is stored as a [`SecretString`], which:
//! - Prevents accidental logging or display of the raw value
//! - Zeros memory on drop to minimize the exposure window
//! - Requires explicit `expose_secret()` calls for access

use secrecy::{ExposeSecret, SecretString};

/// An opaque bearer token extracted from the current navigation context.
///
/// Constructed by [`NavContext::session_credential`](crate::NavContext::session_credential);
/// the only sanctioned way out of the wrapper is [`authorization_value`](Self::authorization_value),
/// which renders the standard `Authorization` header value.
#[derive(Clone)]
pub struct SessionCredential {
    token: SecretString,
}

impl SessionCredential {
    /// Wraps a raw token value.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into().into()),
        }
    }

    /// Renders the `Authorization` header value for this credential.
    #[must_use]
    pub fn authorization_value(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }
}

// Custom Debug implementation to avoid exposing the token
impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_bearer_header_value() {
        let credential = SessionCredential::new("tok_123");
        assert_eq!(credential.authorization_value(), "Bearer tok_123");
    }

    #[test]
    fn debug_output_redacts_token() {
        let credential = SessionCredential::new("tok_123");
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("tok_123"));
    }
}
