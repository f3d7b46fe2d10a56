//! Shared-Secret Authentication
//!
//! Every command frame is preceded by a token exactly as long as the
//! configured API key. The token is checked here, separately from framing,
//! with a constant-time comparison so response timing does not leak how many
//! leading bytes matched.

use bytes::Bytes;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Authentication failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("access denied")]
    AccessDenied,
}

/// Verifies request tokens against the configured API key.
#[derive(Clone)]
pub struct Authenticator {
    api_key: Bytes,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("token_len", &self.api_key.len())
            .finish()
    }
}

impl Authenticator {
    pub fn new(api_key: impl Into<Bytes>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    /// Number of token bytes that precede every command.
    pub fn token_len(&self) -> usize {
        self.api_key.len()
    }

    /// Checks a token.
    pub fn verify(&self, token: &[u8]) -> Result<(), AuthError> {
        if token.len() == self.api_key.len() && bool::from(token.ct_eq(&self.api_key)) {
            Ok(())
        } else {
            Err(AuthError::AccessDenied)
        }
    }
}
