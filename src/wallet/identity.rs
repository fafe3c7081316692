//! secp256k1 signing identity with Ethereum personal-message signatures

use crate::core::WalletError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use std::fmt;

/// One wallet: a private key and the address derived from it
#[derive(Clone)]
pub struct SigningIdentity {
    key: SigningKey,
    address: String,
}

impl SigningIdentity {
    /// Parse a 32-byte hex private key, with or without `0x`
    pub fn from_hex(private_key: &str) -> Result<Self, WalletError> {
        let trimmed = private_key.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let bytes = hex::decode(digits)
            .map_err(|e| WalletError::InvalidKey(format!("not valid hex: {}", e)))?;
        if bytes.len() != 32 {
            return Err(WalletError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        let key = SigningKey::from_slice(&bytes)
            .map_err(|_| WalletError::InvalidKey("not a valid secp256k1 scalar".to_string()))?;
        Ok(Self::from_signing_key(key))
    }

    /// Fresh random key from the OS RNG
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let address = address_from_verifying_key(key.verifying_key());
        Self { key, address }
    }

    /// EIP-55 checksummed address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// `0x`-prefixed private key, for persisting to `.env`
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.key.to_bytes()))
    }

    /// Sign `message` as an Ethereum personal message
    ///
    /// Returns the 65-byte `r || s || v` signature (v = 27 or 28) as `0x` hex.
    pub fn sign_message(&self, message: &str) -> Result<String, WalletError> {
        let hash = personal_message_hash(message.as_bytes());
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| WalletError::InvalidSignature(e.to_string()))?;

        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(&signature.to_bytes());
        bytes.push(27 + recovery_id.to_byte());
        Ok(format!("0x{}", hex::encode(bytes)))
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("address", &self.address)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// keccak256("\x19Ethereum Signed Message:\n" + len + message)
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(message);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Address that produced `signature` over `message`
pub fn recover_address(message: &str, signature: &str) -> Result<String, WalletError> {
    let digits = signature.trim().trim_start_matches("0x");
    let bytes = hex::decode(digits)
        .map_err(|e| WalletError::InvalidSignature(format!("not valid hex: {}", e)))?;
    if bytes.len() != 65 {
        return Err(WalletError::InvalidSignature(format!(
            "expected 65 bytes, got {}",
            bytes.len()
        )));
    }

    let sig = Signature::from_slice(&bytes[..64])
        .map_err(|e| WalletError::InvalidSignature(e.to_string()))?;
    let recovery_id = match bytes[64] {
        27 | 28 => bytes[64] - 27,
        0 | 1 => bytes[64],
        other => {
            return Err(WalletError::InvalidSignature(format!(
                "bad recovery id {}",
                other
            )))
        }
    };
    let recovery_id = RecoveryId::from_byte(recovery_id)
        .ok_or_else(|| WalletError::InvalidSignature("bad recovery id".to_string()))?;

    let hash = personal_message_hash(message.as_bytes());
    let key = VerifyingKey::recover_from_prehash(&hash, &sig, recovery_id)
        .map_err(|e| WalletError::InvalidSignature(e.to_string()))?;
    Ok(address_from_verifying_key(&key))
}

/// Validate a user-supplied address and return its checksummed form
pub fn parse_address(address: &str) -> Result<String, WalletError> {
    let trimmed = address.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| WalletError::InvalidAddress("must start with 0x".to_string()))?;
    let bytes = hex::decode(digits)
        .map_err(|_| WalletError::InvalidAddress(format!("'{}' is not hex", trimmed)))?;
    let bytes: [u8; 20] = bytes
        .try_into()
        .map_err(|_| WalletError::InvalidAddress("expected 20 bytes".to_string()))?;
    Ok(to_checksum_address(&bytes))
}

fn address_from_verifying_key(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    // Uncompressed SEC1: 0x04 || X || Y
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    to_checksum_address(&address)
}

/// EIP-55 mixed-case encoding
fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = Keccak256::digest(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (hardhat/anvil account #0)
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn test_address_from_known_key() {
        let identity = SigningIdentity::from_hex(DEV_KEY).unwrap();
        assert_eq!(identity.address(), DEV_ADDRESS);

        let unprefixed = SigningIdentity::from_hex(&DEV_KEY[2..]).unwrap();
        assert_eq!(unprefixed.address(), DEV_ADDRESS);
    }

    #[test]
    fn test_private_key_hex_round_trips() {
        let identity = SigningIdentity::from_hex(DEV_KEY).unwrap();
        assert_eq!(identity.private_key_hex(), DEV_KEY);
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(
            SigningIdentity::from_hex("0xnothex"),
            Err(WalletError::InvalidKey(_))
        ));
        assert!(matches!(
            SigningIdentity::from_hex("0x1234"),
            Err(WalletError::InvalidKey(_))
        ));
        // Zero is not a valid scalar
        assert!(matches!(
            SigningIdentity::from_hex(&format!("0x{}", "00".repeat(32))),
            Err(WalletError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_signature_shape_and_recovery() {
        let identity = SigningIdentity::from_hex(DEV_KEY).unwrap();
        let challenge = "Sign this message to verify wallet ownership.\nNonce: 8f1c2a";

        let signature = identity.sign_message(challenge).unwrap();
        assert!(signature.starts_with("0x"));
        assert_eq!(signature.len(), 2 + 130);

        let v = u8::from_str_radix(&signature[signature.len() - 2..], 16).unwrap();
        assert!(v == 27 || v == 28);

        assert_eq!(recover_address(challenge, &signature).unwrap(), DEV_ADDRESS);
        assert_ne!(recover_address("different text", &signature).unwrap(), DEV_ADDRESS);
    }

    #[test]
    fn test_signing_is_deterministic() {
        let identity = SigningIdentity::from_hex(DEV_KEY).unwrap();
        assert_eq!(
            identity.sign_message("hello").unwrap(),
            identity.sign_message("hello").unwrap()
        );
    }

    #[test]
    fn test_generated_identity_signs_for_its_address() {
        let identity = SigningIdentity::generate();
        let signature = identity.sign_message("challenge").unwrap();
        assert_eq!(recover_address("challenge", &signature).unwrap(), identity.address());
    }

    #[test]
    fn test_personal_message_hash_uses_byte_length() {
        // "é" is two bytes; the prefix must say 2, not 1
        let mut hasher = Keccak256::new();
        hasher.update("\x19Ethereum Signed Message:\n2é".as_bytes());
        let expected = hasher.finalize();
        assert_eq!(personal_message_hash("é".as_bytes()).as_slice(), expected.as_slice());
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(
            parse_address("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap(),
            DEV_ADDRESS
        );
        assert!(matches!(
            parse_address("f39fd6e51aad88f6f4ce6ab8827279cfffb92266"),
            Err(WalletError::InvalidAddress(_))
        ));
        assert!(matches!(parse_address("0x1234"), Err(WalletError::InvalidAddress(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let identity = SigningIdentity::from_hex(DEV_KEY).unwrap();
        let debug = format!("{:?}", identity);
        assert!(debug.contains(DEV_ADDRESS));
        assert!(!debug.contains(&DEV_KEY[2..]));
    }
}
