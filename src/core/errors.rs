//! Domain error types
//!
//! These errors represent protocol and business-logic failures, distinct from
//! transport errors (see [`crate::llm::LlmError`]). None of them is fatal to a
//! chat session: callers recover by treating the failed value as absent.

use thiserror::Error;

/// Errors raised by the conversation store
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    /// A tool-result block references a call id that the immediately
    /// preceding assistant turn never requested
    #[error("Protocol violation: tool result references unknown call id '{call_id}'")]
    ProtocolViolation { call_id: String },
}

/// Errors raised while loading or using a signing key
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    /// Key material is not a valid secp256k1 private key
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// Text is not a 20-byte hex address
    #[error("Invalid wallet address: {0}")]
    InvalidAddress(String),

    /// Signature bytes could not be decoded or recovered
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
}

/// Reasons the challenge/sign/verify flow did not yield a bearer token
#[derive(Debug, Error)]
pub enum AuthError {
    /// The challenge tool returned nothing usable
    #[error("Challenge unavailable: {0}")]
    ChallengeUnavailable(String),

    /// The verification tool did not return an auth token
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// The identity could not sign the challenge
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// The remote tool call itself failed
    #[error("Transport error: {0}")]
    Transport(#[source] anyhow::Error),
}
