//! Credential verification seam.
//!
//! Token issuance and validation belong to an external identity service. The
//! hub only needs one answer per connection: which user does this credential
//! name, or why not.

use std::{collections::HashMap, sync::Arc};

use huddle_proto::UserId;
use thiserror::Error;

/// Why a credential was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// `hello` carried an empty token
    #[error("authentication token missing")]
    MissingToken,

    /// Token is unknown, malformed or expired
    #[error("invalid authentication token")]
    InvalidToken,

    /// First frame was not `hello`
    #[error("expected hello, got {0}")]
    UnexpectedFrame(String),
}

/// Resolves an opaque credential to a user identity.
///
/// Called on the hub's event loop, so implementations must not block. A
/// verifier that needs I/O should cache or pre-validate.
pub trait Authenticator: Send + Sync + 'static {
    /// Resolve `token` to the user it was issued for.
    fn authenticate(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Fixed token → user table, for development and tests.
///
/// Clone is cheap (Arc).
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: Arc<HashMap<String, UserId>>,
}

impl StaticTokenAuthenticator {
    /// Build from `(token, user_id)` pairs. Later pairs win on duplicate
    /// tokens.
    pub fn new<T, U>(pairs: impl IntoIterator<Item = (T, U)>) -> Self
    where
        T: Into<String>,
        U: Into<UserId>,
    {
        let tokens = pairs.into_iter().map(|(token, user)| (token.into(), user.into())).collect();
        Self { tokens: Arc::new(tokens) }
    }

    /// Number of known tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// No tokens configured; every handshake will fail.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.tokens.get(token).cloned().ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_token() {
        let auth = StaticTokenAuthenticator::new([("tok-a", "alice"), ("tok-b", "bob")]);

        assert_eq!(auth.authenticate("tok-a"), Ok(UserId::new("alice")));
        assert_eq!(auth.authenticate("tok-b"), Ok(UserId::new("bob")));
        assert_eq!(auth.len(), 2);
    }

    #[test]
    fn rejects_unknown_and_empty_tokens() {
        let auth = StaticTokenAuthenticator::new([("tok-a", "alice")]);

        assert_eq!(auth.authenticate("nope"), Err(AuthError::InvalidToken));
        assert_eq!(auth.authenticate(""), Err(AuthError::MissingToken));
    }

    #[test]
    fn empty_table_rejects_everything() {
        let auth = StaticTokenAuthenticator::default();
        assert!(auth.is_empty());
        assert_eq!(auth.authenticate("tok-a"), Err(AuthError::InvalidToken));
    }
}
