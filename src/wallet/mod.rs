//! Wallet identity and session authentication
//!
//! A session is either anonymous, address-only (read-only, never verified),
//! or backed by a signing key. Only the last kind can hold a bearer token, and
//! the token always belongs to that key's address.

mod auth;
mod identity;

pub use auth::{parse_auth_token, parse_challenge, WalletAuthenticator};
pub use identity::{parse_address, personal_message_hash, recover_address, SigningIdentity};

use crate::mcp::ToolBackend;
use chrono::{DateTime, Utc};

/// Authentication state for one chat session
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    address: Option<String>,
    token: Option<String>,
    identity: Option<SigningIdentity>,
    verified_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    /// No wallet at all
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Known address without a key; tools see it but no token is issued
    pub fn address_only(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    /// Key-backed session, not yet verified
    pub fn with_identity(identity: SigningIdentity) -> Self {
        Self {
            address: Some(identity.address().to_string()),
            identity: Some(identity),
            ..Self::default()
        }
    }

    /// Key-backed session verified with `token`
    pub fn verified(identity: SigningIdentity, token: impl Into<String>) -> Self {
        Self {
            address: Some(identity.address().to_string()),
            token: Some(token.into()),
            identity: Some(identity),
            verified_at: Some(Utc::now()),
        }
    }

    /// Run the handshake for `identity` and build the resulting session
    ///
    /// Verification failure still yields a key-backed session, just without a
    /// token.
    pub async fn establish(backend: &dyn ToolBackend, identity: SigningIdentity) -> Self {
        match WalletAuthenticator::new(backend).authenticate(&identity).await {
            Some(token) => Self::verified(identity, token),
            None => Self::with_identity(identity),
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Bearer token for gated tools
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn identity(&self) -> Option<&SigningIdentity> {
        self.identity.as_ref()
    }

    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        self.verified_at
    }

    pub fn is_verified(&self) -> bool {
        self.token.is_some()
    }
}
