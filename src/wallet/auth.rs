//! Challenge/sign/verify handshake against the forum tool server

use super::SigningIdentity;
use crate::core::AuthError;
use crate::mcp::{McpToolResult, ToolBackend};
use crate::tools::{CHALLENGE_TOOL, VERIFY_TOOL};
use serde_json::{json, Value};

/// Obtains bearer tokens by proving key ownership to the tool server
pub struct WalletAuthenticator<'a> {
    backend: &'a dyn ToolBackend,
}

impl<'a> WalletAuthenticator<'a> {
    pub fn new(backend: &'a dyn ToolBackend) -> Self {
        Self { backend }
    }

    /// Run the full handshake; any failure is logged and yields `None`
    pub async fn authenticate(&self, identity: &SigningIdentity) -> Option<String> {
        match self.try_authenticate(identity).await {
            Ok(token) => {
                tracing::info!(address = identity.address(), "Wallet verified");
                Some(token)
            }
            Err(e) => {
                tracing::warn!(address = identity.address(), error = %e, "Wallet verification failed");
                None
            }
        }
    }

    /// Same handshake, reporting why it failed
    pub async fn try_authenticate(&self, identity: &SigningIdentity) -> Result<String, AuthError> {
        let address = identity.address();

        tracing::debug!(address, "Requesting wallet challenge");
        let challenge = self
            .backend
            .call_tool(CHALLENGE_TOOL, json!({ "address": address }))
            .await
            .map_err(AuthError::Transport)?;
        let challenge = parse_challenge(&challenge)?;

        let signature = identity.sign_message(&challenge)?;

        tracing::debug!(address, "Submitting signed challenge");
        let verification = self
            .backend
            .call_tool(
                VERIFY_TOOL,
                json!({ "address": address, "signature": signature }),
            )
            .await
            .map_err(AuthError::Transport)?;

        parse_auth_token(&verification)
    }
}

/// Extract the challenge text from a `get_wallet_challenge` result
///
/// The first text block is itself JSON with a nested `content` array; the
/// challenge is the `text` of that array's first element.
pub fn parse_challenge(result: &McpToolResult) -> Result<String, AuthError> {
    let payload = tool_payload(result).map_err(AuthError::ChallengeUnavailable)?;

    payload
        .get("content")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("text"))
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AuthError::ChallengeUnavailable("challenge message was empty".to_string()))
}

/// Extract `auth_token` from a `verify_wallet_signature` result
pub fn parse_auth_token(result: &McpToolResult) -> Result<String, AuthError> {
    let payload = tool_payload(result).map_err(AuthError::VerificationFailed)?;

    payload
        .get("auth_token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AuthError::VerificationFailed("no auth_token received".to_string()))
}

/// First text block of a successful result, parsed as JSON
fn tool_payload(result: &McpToolResult) -> Result<Value, String> {
    let text = result
        .first_text()
        .ok_or_else(|| "tool returned no text".to_string())?;
    if result.is_error {
        return Err(format!("tool reported an error: {}", text));
    }
    serde_json::from_str(text).map_err(|e| format!("response is not JSON: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_result(text: &str) -> McpToolResult {
        McpToolResult::text(text)
    }

    #[test]
    fn test_parse_challenge_nested_content() {
        let result = text_result(r#"{"content":[{"type":"text","text":"Sign in: nonce 42"}]}"#);
        assert_eq!(parse_challenge(&result).unwrap(), "Sign in: nonce 42");
    }

    #[test]
    fn test_parse_challenge_failures() {
        for body in [
            r#"{"content":[]}"#,
            r#"{"content":[{"type":"text","text":""}]}"#,
            r#"{"message":"no content key"}"#,
            "plain text, not json",
        ] {
            let err = parse_challenge(&text_result(body)).unwrap_err();
            assert!(matches!(err, AuthError::ChallengeUnavailable(_)), "{}", body);
        }

        let no_text = McpToolResult {
            content: vec![],
            is_error: false,
        };
        assert!(matches!(
            parse_challenge(&no_text),
            Err(AuthError::ChallengeUnavailable(_))
        ));
    }

    #[test]
    fn test_error_flagged_challenge_is_unavailable() {
        let result = McpToolResult::error(r#"{"content":[{"type":"text","text":"x"}]}"#);
        assert!(matches!(
            parse_challenge(&result),
            Err(AuthError::ChallengeUnavailable(_))
        ));
    }

    #[test]
    fn test_parse_auth_token() {
        let ok = text_result(r#"{"auth_token":"tok-123","expires_in":3600}"#);
        assert_eq!(parse_auth_token(&ok).unwrap(), "tok-123");

        let missing = text_result(r#"{"verified":false}"#);
        assert!(matches!(
            parse_auth_token(&missing),
            Err(AuthError::VerificationFailed(_))
        ));

        let null_token = text_result(r#"{"auth_token":null}"#);
        assert!(matches!(
            parse_auth_token(&null_token),
            Err(AuthError::VerificationFailed(_))
        ));
    }
}
