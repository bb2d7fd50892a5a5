//! Refreshable bearer token for authenticated engine adapters.

use std::fmt;
use std::sync::{Arc, RwLock};

/// Bearer token shared between an engine adapter and whoever refreshes it.
///
/// The token is read on every request, so a [`set`](Self::set) is visible to
/// the next call. An empty token means "no auth": no `Authorization` header
/// is produced.
///
/// # Panics
///
/// Methods panic if the inner [`RwLock`] is poisoned (i.e. a writer panicked
/// while holding the write lock). This is treated as an invariant violation.
#[derive(Clone, Default)]
pub struct BearerToken {
    token: Arc<RwLock<String>>,
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("set", &!self.token.read().expect("token RwLock poisoned").is_empty())
            .finish()
    }
}

impl BearerToken {
    /// Token initialised to `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token.into())),
        }
    }

    /// Replace the token; clones of this handle observe the change.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().expect("token RwLock poisoned") = token.into();
    }

    /// `Authorization` header value, or `None` when the token is empty.
    pub fn header_value(&self) -> Option<String> {
        let token = self.token.read().expect("token RwLock poisoned");
        if token.is_empty() {
            None
        } else {
            Some(format!("Bearer {token}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_token_produces_bearer_header() {
        let token = BearerToken::new("abc");
        assert_eq!(token.header_value().as_deref(), Some("Bearer abc"));
    }

    #[test]
    fn empty_token_omits_authorization_header() {
        assert!(BearerToken::default().header_value().is_none());
        assert!(BearerToken::new("").header_value().is_none());
    }

    #[test]
    fn token_mutation_visible_through_clones() {
        let token = BearerToken::new("abc");
        let shared = token.clone();

        shared.set("xyz");

        assert_eq!(token.header_value().as_deref(), Some("Bearer xyz"));
    }

    #[test]
    fn debug_does_not_leak_token() {
        let rendered = format!("{:?}", BearerToken::new("s3cret"));
        assert!(!rendered.contains("s3cret"));
    }
}
