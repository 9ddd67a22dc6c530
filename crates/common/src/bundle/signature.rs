//! Detached bundle signatures.
//!
//! `bundle.sig` is a small header file binding a manifest digest to an
//! Ed25519 signature over the raw manifest bytes. Verification is purely
//! local to the bundle directory; whether the signing key is *trusted* for
//! a given peer is a separate decision made against registry state — the
//! `public_keys/` directory inside a bundle is transport convenience, never
//! an authorization input.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::Signature;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::manifest::{digest_bytes, MANIFEST_FILENAME};
use crate::crypto::{PublicKey, SigningKey};

pub const SIGNATURE_VERSION: &str = "1";
pub const SIGNATURE_FILENAME: &str = "bundle.sig";
pub const PUBLIC_KEYS_DIRNAME: &str = "public_keys";

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature file missing: {0}")]
    SignatureMissing(PathBuf),
    #[error("manifest not found for signature: {0}")]
    ManifestMissing(PathBuf),
    #[error("signature file missing '{0}' header")]
    MissingHeader(&'static str),
    #[error("unsupported signature version: {0} (expected {SIGNATURE_VERSION})")]
    UnsupportedVersion(String),
    #[error("manifest digest mismatch")]
    DigestMismatch,
    #[error("signature public key does not match expected peer key")]
    KeyMismatch,
    #[error("failed to decode signature payload")]
    Decode,
    #[error("bundle signature verification failed")]
    BadSignature,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parsed contents of a `bundle.sig` file.
#[derive(Debug, Clone)]
pub struct SignatureRecord {
    pub key_id: String,
    pub public_key_b64: String,
    pub manifest_digest: String,
    pub signed_at: OffsetDateTime,
    pub signature_b64: String,
}

fn normalize_key(value: &str) -> String {
    value.split_whitespace().collect()
}

/// Sign the bundle under `bundle_dir` with `key`.
///
/// Reads the manifest bytes, signs them, writes `bundle.sig`, and publishes
/// the public key under `public_keys/<key-id>.pub` (rewritten only when the
/// content changed). Returns the signature file path.
pub fn sign_bundle(bundle_dir: &Path, key: &SigningKey) -> Result<PathBuf, SignatureError> {
    let manifest_path = bundle_dir.join(MANIFEST_FILENAME);
    if !manifest_path.exists() {
        return Err(SignatureError::ManifestMissing(manifest_path));
    }
    let manifest_bytes = fs::read(&manifest_path)?;
    let digest = digest_bytes(&manifest_bytes);
    let signature = key.sign(&manifest_bytes);

    let signed_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let sig_path = bundle_dir.join(SIGNATURE_FILENAME);
    let contents = format!(
        "Signature-Version: {SIGNATURE_VERSION}\n\
         Key-ID: {}\n\
         Public-Key: {}\n\
         Manifest-Digest: {digest}\n\
         Signed-At: {signed_at}\n\
         Signature: {}\n",
        key.key_id(),
        key.public_key_b64(),
        BASE64.encode(signature.to_bytes()),
    );
    fs::write(&sig_path, contents)?;

    let keys_dir = bundle_dir.join(PUBLIC_KEYS_DIRNAME);
    fs::create_dir_all(&keys_dir)?;
    let pub_path = keys_dir.join(format!("{}.pub", key.key_id()));
    let payload = format!(
        "Key-ID: {}\nPublic-Key: {}\n",
        key.key_id(),
        key.public_key_b64()
    );
    let current = fs::read_to_string(&pub_path).ok();
    if current.as_deref() != Some(payload.as_str()) {
        fs::write(&pub_path, payload)?;
    }

    Ok(sig_path)
}

fn read_signature_headers(sig_path: &Path) -> Result<Vec<(String, String)>, SignatureError> {
    let text = fs::read_to_string(sig_path)?;
    let mut headers = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    Ok(headers)
}

/// Verify the bundle under `bundle_dir`.
///
/// When `expected_public_key` is supplied (a peer claiming a specific
/// identity), the signature's key must match it byte-for-byte after
/// whitespace normalization.
pub fn verify_bundle(
    bundle_dir: &Path,
    expected_public_key: Option<&str>,
) -> Result<SignatureRecord, SignatureError> {
    let sig_path = bundle_dir.join(SIGNATURE_FILENAME);
    if !sig_path.exists() {
        return Err(SignatureError::SignatureMissing(sig_path));
    }
    let headers = read_signature_headers(&sig_path)?;
    let get = |name: &'static str| -> Result<&str, SignatureError> {
        headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .ok_or(SignatureError::MissingHeader(name))
    };

    let version = get("Signature-Version")?;
    if version != SIGNATURE_VERSION {
        return Err(SignatureError::UnsupportedVersion(version.to_string()));
    }

    let manifest_path = bundle_dir.join(MANIFEST_FILENAME);
    if !manifest_path.exists() {
        return Err(SignatureError::ManifestMissing(manifest_path));
    }
    let manifest_bytes = fs::read(&manifest_path)?;
    let digest = digest_bytes(&manifest_bytes);
    if digest != get("Manifest-Digest")? {
        return Err(SignatureError::DigestMismatch);
    }

    let public_key_b64 = normalize_key(get("Public-Key")?);
    let signature_b64 = get("Signature")?.to_string();
    let public_bytes = BASE64
        .decode(public_key_b64.as_bytes())
        .map_err(|_| SignatureError::Decode)?;
    let signature_bytes = BASE64
        .decode(signature_b64.as_bytes())
        .map_err(|_| SignatureError::Decode)?;

    if let Some(expected) = expected_public_key {
        let expected = normalize_key(expected);
        if !expected.is_empty() && expected != public_key_b64 {
            return Err(SignatureError::KeyMismatch);
        }
    }

    let public_key = PublicKey::from_bytes(&public_bytes).map_err(|_| SignatureError::Decode)?;
    let signature = Signature::from_slice(&signature_bytes).map_err(|_| SignatureError::Decode)?;
    public_key
        .verify(&manifest_bytes, &signature)
        .map_err(|_| SignatureError::BadSignature)?;

    let signed_at = get("Signed-At")
        .ok()
        .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);
    let key_id = get("Key-ID")
        .map(str::to_string)
        .unwrap_or_else(|_| public_key.key_id());

    Ok(SignatureRecord {
        key_id,
        public_key_b64,
        manifest_digest: digest,
        signed_at,
        signature_b64,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bundle::manifest::write_manifest;
    use crate::crypto::Keystore;
    use tempfile::TempDir;

    fn signed_bundle() -> (TempDir, TempDir, SigningKey) {
        let home = TempDir::new().unwrap();
        let bundle = TempDir::new().unwrap();
        let key = Keystore::new(home.path()).generate(false).unwrap();

        fs::create_dir_all(bundle.path().join("users")).unwrap();
        fs::write(
            bundle.path().join("users/user_1.sync.txt"),
            b"Entity: user\n\n{}\n",
        )
        .unwrap();
        let files = vec![bundle.path().join("users/user_1.sync.txt")];
        write_manifest(bundle.path(), &files).unwrap();
        sign_bundle(bundle.path(), &key).unwrap();
        (home, bundle, key)
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let (_home, bundle, key) = signed_bundle();

        let record = verify_bundle(bundle.path(), None).unwrap();
        assert_eq!(record.key_id, key.key_id());
        assert_eq!(record.public_key_b64, key.public_key_b64());

        let manifest_bytes = fs::read(bundle.path().join(MANIFEST_FILENAME)).unwrap();
        assert_eq!(record.manifest_digest, digest_bytes(&manifest_bytes));

        // the public key is also published inside the bundle
        assert!(bundle
            .path()
            .join(PUBLIC_KEYS_DIRNAME)
            .join(format!("{}.pub", key.key_id()))
            .exists());
    }

    #[test]
    fn test_tampered_manifest_fails_digest() {
        let (_home, bundle, _key) = signed_bundle();

        let manifest_path = bundle.path().join(MANIFEST_FILENAME);
        let mut bytes = fs::read(&manifest_path).unwrap();
        bytes[0] ^= 0x01;
        fs::write(&manifest_path, bytes).unwrap();

        assert!(matches!(
            verify_bundle(bundle.path(), None),
            Err(SignatureError::DigestMismatch)
        ));
    }

    #[test]
    fn test_expected_key_mismatch() {
        let (_home, bundle, _key) = signed_bundle();

        let other_home = TempDir::new().unwrap();
        let other = Keystore::new(other_home.path()).generate(false).unwrap();
        assert!(matches!(
            verify_bundle(bundle.path(), Some(&other.public_key_b64())),
            Err(SignatureError::KeyMismatch)
        ));

        // whitespace-mangled but equal key still matches
        let (_home2, bundle2, key2) = signed_bundle();
        let wrapped = key2
            .public_key_b64()
            .chars()
            .enumerate()
            .flat_map(|(i, c)| {
                if i == 20 {
                    vec!['\n', ' ', c]
                } else {
                    vec![c]
                }
            })
            .collect::<String>();
        assert!(verify_bundle(bundle2.path(), Some(&wrapped)).is_ok());
    }

    #[test]
    fn test_missing_signature_file() {
        let bundle = TempDir::new().unwrap();
        assert!(matches!(
            verify_bundle(bundle.path(), None),
            Err(SignatureError::SignatureMissing(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let (_home, bundle, _key) = signed_bundle();
        let sig_path = bundle.path().join(SIGNATURE_FILENAME);
        let text = fs::read_to_string(&sig_path).unwrap();
        fs::write(
            &sig_path,
            text.replace("Signature-Version: 1", "Signature-Version: 9"),
        )
        .unwrap();
        assert!(matches!(
            verify_bundle(bundle.path(), None),
            Err(SignatureError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_forged_signature_rejected() {
        let (_home, bundle, _key) = signed_bundle();
        let sig_path = bundle.path().join(SIGNATURE_FILENAME);

        // Re-sign the manifest with a different key but keep the original
        // Public-Key header: the signature no longer verifies against it.
        let other_home = TempDir::new().unwrap();
        let other = Keystore::new(other_home.path()).generate(false).unwrap();
        let manifest_bytes = fs::read(bundle.path().join(MANIFEST_FILENAME)).unwrap();
        let forged = BASE64.encode(other.sign(&manifest_bytes).to_bytes());

        let text = fs::read_to_string(&sig_path).unwrap();
        let rewritten: String = text
            .lines()
            .map(|line| {
                if line.starts_with("Signature:") {
                    format!("Signature: {forged}")
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(&sig_path, rewritten + "\n").unwrap();

        assert!(matches!(
            verify_bundle(bundle.path(), None),
            Err(SignatureError::BadSignature)
        ));
    }
}
