use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::keys::{KeyError, PublicKey, SecretKey};

const PRIVATE_KEY_FILENAME: &str = "id_ed25519";
const PUBLIC_KEY_FILENAME: &str = "id_ed25519.pub";
const METADATA_FILENAME: &str = "key_metadata.json";

#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    #[error("signing key already exists; pass force to regenerate")]
    AlreadyExists,
    #[error("stored public/private key mismatch")]
    Corrupted,
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("key metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The instance's active signing identity.
///
/// Exactly one per instance. Holds the secret half plus the derived key id;
/// the id is what shows up in signature records and the bundle's
/// `public_keys/` directory.
#[derive(Debug, Clone)]
pub struct SigningKey {
    key_id: String,
    secret: SecretKey,
    created_at: Option<OffsetDateTime>,
}

impl SigningKey {
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn public(&self) -> PublicKey {
        self.secret.public()
    }

    pub fn public_key_b64(&self) -> String {
        self.secret.public().to_b64()
    }

    pub fn created_at(&self) -> Option<OffsetDateTime> {
        self.created_at
    }

    pub fn sign(&self, msg: &[u8]) -> ed25519_dalek::Signature {
        self.secret.sign(msg)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyMetadata {
    key_id: String,
    created_at: Option<String>,
}

/// Filesystem-backed store for the instance signing keypair.
///
/// Layout under the sync home:
/// ```text
/// keys/id_ed25519       # PEM, secret half, local-only
/// keys/id_ed25519.pub   # base64, public half
/// keys/key_metadata.json
/// ```
///
/// Loading re-derives the public key from the secret half and refuses a
/// store whose halves disagree, so a partially written keypair is surfaced
/// instead of silently signing with a key nobody trusts.
#[derive(Debug, Clone)]
pub struct Keystore {
    keys_dir: PathBuf,
}

impl Keystore {
    pub fn new(sync_home: &Path) -> Self {
        Self {
            keys_dir: sync_home.join("keys"),
        }
    }

    fn private_key_path(&self) -> PathBuf {
        self.keys_dir.join(PRIVATE_KEY_FILENAME)
    }

    fn public_key_path(&self) -> PathBuf {
        self.keys_dir.join(PUBLIC_KEY_FILENAME)
    }

    fn metadata_path(&self) -> PathBuf {
        self.keys_dir.join(METADATA_FILENAME)
    }

    pub fn exists(&self) -> bool {
        self.private_key_path().exists() && self.public_key_path().exists()
    }

    /// Generate and persist a fresh keypair.
    ///
    /// Refuses to overwrite an existing pair unless `force` is set; forcing
    /// irreversibly discards the previous key, and peers that pinned it
    /// must re-approve the new one.
    pub fn generate(&self, force: bool) -> Result<SigningKey, KeystoreError> {
        if self.exists() && !force {
            return Err(KeystoreError::AlreadyExists);
        }
        fs::create_dir_all(&self.keys_dir)?;

        let secret = SecretKey::generate();
        let public = secret.public();
        let key_id = public.key_id();
        let created_at = OffsetDateTime::now_utc();

        fs::write(self.private_key_path(), secret.to_pem())?;
        fs::write(self.public_key_path(), format!("{}\n", public.to_b64()))?;
        let metadata = KeyMetadata {
            key_id: key_id.clone(),
            created_at: created_at.format(&Rfc3339).ok(),
        };
        fs::write(
            self.metadata_path(),
            format!("{}\n", serde_json::to_string_pretty(&metadata)?),
        )?;

        Ok(SigningKey {
            key_id,
            secret,
            created_at: Some(created_at),
        })
    }

    /// Load the persisted keypair, if any.
    ///
    /// Fails with [`KeystoreError::Corrupted`] when the stored public half
    /// does not match the one re-derived from the secret half.
    pub fn load(&self) -> Result<Option<SigningKey>, KeystoreError> {
        if !self.exists() {
            return Ok(None);
        }
        let pem = fs::read_to_string(self.private_key_path())?;
        let secret = SecretKey::from_pem(&pem)?;

        let public_text = fs::read_to_string(self.public_key_path())?;
        let cleaned: String = public_text.split_whitespace().collect();
        let stored = BASE64
            .decode(cleaned.as_bytes())
            .map_err(KeyError::Decode)?;
        if stored != secret.public().to_bytes() {
            return Err(KeystoreError::Corrupted);
        }

        let (key_id, created_at) = self.read_metadata();
        Ok(Some(SigningKey {
            key_id: key_id.unwrap_or_else(|| secret.public().key_id()),
            secret,
            created_at,
        }))
    }

    /// Load the keypair, generating one on first use when `auto_generate`
    /// is set. Returns the key (if any) and whether it was just created.
    pub fn ensure_local_keypair(
        &self,
        auto_generate: bool,
    ) -> Result<(Option<SigningKey>, bool), KeystoreError> {
        if let Some(existing) = self.load()? {
            return Ok((Some(existing), false));
        }
        if !auto_generate {
            return Ok((None, false));
        }
        let created = self.generate(false)?;
        Ok((Some(created), true))
    }

    fn read_metadata(&self) -> (Option<String>, Option<OffsetDateTime>) {
        let path = self.metadata_path();
        let Ok(text) = fs::read_to_string(&path) else {
            return (None, None);
        };
        let Ok(metadata) = serde_json::from_str::<KeyMetadata>(&text) else {
            return (None, None);
        };
        let created_at = metadata
            .created_at
            .as_deref()
            .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok());
        (Some(metadata.key_id), created_at)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_generates_once() {
        let dir = TempDir::new().unwrap();
        let store = Keystore::new(dir.path());

        let (key, created) = store.ensure_local_keypair(true).unwrap();
        let key = key.unwrap();
        assert!(created);

        let (again, created) = store.ensure_local_keypair(true).unwrap();
        assert!(!created);
        assert_eq!(again.unwrap().key_id(), key.key_id());
    }

    #[test]
    fn test_ensure_without_autogenerate() {
        let dir = TempDir::new().unwrap();
        let store = Keystore::new(dir.path());

        let (key, created) = store.ensure_local_keypair(false).unwrap();
        assert!(key.is_none());
        assert!(!created);
        assert!(!store.exists());
    }

    #[test]
    fn test_generate_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = Keystore::new(dir.path());

        let first = store.generate(false).unwrap();
        assert!(matches!(
            store.generate(false),
            Err(KeystoreError::AlreadyExists)
        ));

        // force discards the old identity
        let second = store.generate(true).unwrap();
        assert_ne!(first.key_id(), second.key_id());
    }

    #[test]
    fn test_mismatched_halves_detected() {
        let dir = TempDir::new().unwrap();
        let store = Keystore::new(dir.path());
        store.generate(false).unwrap();

        // Overwrite the public half with a different key
        let other = SecretKey::generate().public();
        fs::write(
            dir.path().join("keys").join(PUBLIC_KEY_FILENAME),
            format!("{}\n", other.to_b64()),
        )
        .unwrap();

        assert!(matches!(store.load(), Err(KeystoreError::Corrupted)));
    }
}
