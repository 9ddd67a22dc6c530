use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey as DalekSigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

/// Size of Ed25519 private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of Ed25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Number of hex characters of the public key digest used as a key id
const KEY_ID_LEN: usize = 16;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid key size, expected {expected}, got {actual}")]
    InvalidSize { expected: usize, actual: usize },
    #[error("base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("invalid Ed25519 key material")]
    InvalidKey,
    #[error("failed to parse PEM: {0}")]
    Pem(String),
    #[error("invalid PEM tag, expected PRIVATE KEY")]
    PemTag,
}

/// Public half of an instance's Ed25519 signing keypair.
///
/// This key serves two purposes:
/// - **Identity**: peers pin it to authenticate future bundles
/// - **Verification**: checks detached signatures over manifest bytes
///
/// Keys travel as standard base64 of the 32 raw bytes, both in the
/// signature record and in peer registries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse a public key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(KeyError::InvalidSize {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut buff = [0u8; PUBLIC_KEY_SIZE];
        buff.copy_from_slice(bytes);
        VerifyingKey::from_bytes(&buff)
            .map(PublicKey)
            .map_err(|_| KeyError::InvalidKey)
    }

    /// Parse a public key from a base64 string.
    ///
    /// Interior whitespace is stripped first so keys copied out of config
    /// files or HTTP headers compare equal.
    pub fn from_b64(value: &str) -> Result<Self, KeyError> {
        let cleaned: String = value.split_whitespace().collect();
        let bytes = BASE64.decode(cleaned.as_bytes())?;
        Self::from_bytes(&bytes)
    }

    /// Convert public key to raw bytes
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Convert public key to its base64 wire form
    pub fn to_b64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }

    /// Short stable identifier: first 16 hex chars of sha256(public key).
    pub fn key_id(&self) -> String {
        let digest = Sha256::digest(self.to_bytes());
        hex::encode(digest)[..KEY_ID_LEN].to_string()
    }

    /// Verify an Ed25519 signature on a message.
    pub fn verify(
        &self,
        msg: &[u8],
        signature: &ed25519_dalek::Signature,
    ) -> Result<(), ed25519_dalek::SignatureError> {
        self.0.verify_strict(msg, signature)
    }
}

/// Secret half of an instance's Ed25519 signing keypair.
///
/// Never transmitted; persisted only in the local keystore as a PEM file.
#[derive(Clone)]
pub struct SecretKey(DalekSigningKey);

impl std::fmt::Debug for SecretKey {
    // never leak key material through debug output
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey({})", self.public().key_id())
    }
}

impl From<[u8; PRIVATE_KEY_SIZE]> for SecretKey {
    fn from(secret: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(DalekSigningKey::from_bytes(&secret))
    }
}

impl SecretKey {
    /// Generate a new random secret key using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; PRIVATE_KEY_SIZE];
        getrandom::getrandom(&mut bytes).expect("failed to generate random bytes");
        Self::from(bytes)
    }

    /// Derive the public key from this secret key
    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Convert secret key to raw bytes
    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Encode secret key in PEM format for storage.
    ///
    /// Returns a PEM-encoded string with tag "PRIVATE KEY".
    pub fn to_pem(&self) -> String {
        let pem = pem::Pem::new("PRIVATE KEY", self.to_bytes().to_vec());
        pem::encode(&pem)
    }

    /// Parse a secret key from PEM format.
    pub fn from_pem(pem_str: &str) -> Result<Self, KeyError> {
        let pem = pem::parse(pem_str).map_err(|e| KeyError::Pem(e.to_string()))?;
        if pem.tag() != "PRIVATE KEY" {
            return Err(KeyError::PemTag);
        }
        let contents = pem.contents();
        if contents.len() != PRIVATE_KEY_SIZE {
            return Err(KeyError::InvalidSize {
                expected: PRIVATE_KEY_SIZE,
                actual: contents.len(),
            });
        }
        let mut bytes = [0u8; PRIVATE_KEY_SIZE];
        bytes.copy_from_slice(contents);
        Ok(Self::from(bytes))
    }

    /// Sign a message with this secret key using Ed25519.
    ///
    /// Returns a detached signature that can be verified with the
    /// corresponding public key.
    pub fn sign(&self, msg: &[u8]) -> ed25519_dalek::Signature {
        self.0.sign(msg)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let secret_key = SecretKey::generate();
        let public_key = secret_key.public();

        // Test round-trip conversion through base64
        let b64 = public_key.to_b64();
        let recovered = PublicKey::from_b64(&b64).unwrap();
        assert_eq!(public_key.to_bytes(), recovered.to_bytes());

        // Whitespace in transit is tolerated
        let wrapped = format!("{}\n  {}", &b64[..10], &b64[10..]);
        let recovered = PublicKey::from_b64(&wrapped).unwrap();
        assert_eq!(public_key.to_bytes(), recovered.to_bytes());
    }

    #[test]
    fn test_key_id_is_short_and_stable() {
        let secret_key = SecretKey::generate();
        let id = secret_key.public().key_id();
        assert_eq!(id.len(), 16);
        assert_eq!(id, secret_key.public().key_id());
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_pem_serialization() {
        let secret_key = SecretKey::generate();

        let pem = secret_key.to_pem();
        let recovered = SecretKey::from_pem(&pem).unwrap();
        assert_eq!(secret_key.to_bytes(), recovered.to_bytes());
        assert_eq!(
            secret_key.public().to_bytes(),
            recovered.public().to_bytes()
        );
    }

    #[test]
    fn test_sign_and_verify() {
        let secret_key = SecretKey::generate();
        let public_key = secret_key.public();
        let message = b"hello, world!";

        let signature = secret_key.sign(message);
        assert!(public_key.verify(message, &signature).is_ok());

        // Verify fails with wrong message
        let wrong_message = b"hello, world?";
        assert!(public_key.verify(wrong_message, &signature).is_err());

        // Verify fails with wrong key
        let other_key = SecretKey::generate().public();
        assert!(other_key.verify(message, &signature).is_err());
    }
}
