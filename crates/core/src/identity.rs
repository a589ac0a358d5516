//! Cryptographic identity
//!
//! The negotiator and transfer engine only see the [`Identity`] trait; key
//! material is loaded by the CLI and shared read-only across operations.

use std::path::Path;

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};

use crate::error::{Error, Result};
use crate::ids::OwnerId;

/// Ed25519 secret key length in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Signing identity used for session tokens
#[cfg_attr(test, mockall::automock)]
pub trait Identity: Send + Sync {
    /// Sign arbitrary bytes
    fn sign(&self, data: &[u8]) -> Vec<u8>;

    /// Encoded public key
    fn public_key(&self) -> Vec<u8>;

    /// Owner identifier derived from the public key
    fn owner_id(&self) -> OwnerId;
}

/// In-memory Ed25519 identity
#[derive(Clone)]
pub struct KeyIdentity {
    signing_key: SigningKey,
}

impl KeyIdentity {
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Generate a random identity
    pub fn generate() -> Self {
        Self::new(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    pub fn from_bytes(bytes: &[u8; SECRET_KEY_SIZE]) -> Self {
        Self::new(SigningKey::from_bytes(bytes))
    }

    /// Parse a hex-encoded secret key
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| Error::Key(format!("invalid hex private key: {e}")))?;
        Self::from_slice(&bytes)
    }

    /// Load a key given either as a hex string or as a path to a file that
    /// holds hex text or the raw secret bytes.
    pub fn load(arg: &str) -> Result<Self> {
        if arg.is_empty() {
            return Err(Error::Key("private key cannot be empty".into()));
        }

        let path = Path::new(arg);
        if path.is_file() {
            let content = std::fs::read(path)?;
            if content.len() == SECRET_KEY_SIZE {
                return Self::from_slice(&content);
            }
            let text = String::from_utf8(content)
                .map_err(|_| Error::Key(format!("unrecognized key file format: {arg}")))?;
            return Self::from_hex(&text);
        }

        Self::from_hex(arg)
    }

    /// Hex encoding of the secret key
    pub fn to_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; SECRET_KEY_SIZE] = bytes.try_into().map_err(|_| {
            Error::Key(format!(
                "private key must be {SECRET_KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(&bytes))
    }
}

impl Identity for KeyIdentity {
    fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.signing_key.sign(data).to_bytes().to_vec()
    }

    fn public_key(&self) -> Vec<u8> {
        self.verifying_key().to_bytes().to_vec()
    }

    fn owner_id(&self) -> OwnerId {
        OwnerId::from_public_key(&self.public_key())
    }
}

impl std::fmt::Debug for KeyIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyIdentity")
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}

/// Check an Ed25519 signature made by `public_key` over `data`.
///
/// Malformed keys or signatures verify as `false`.
pub fn verify_signature(public_key: &[u8], data: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(data, &signature).is_ok()
}
