/**
 * Cryptographic types and operations.
 *  - Public and secret key implementations
 *  - On-disk keystore with lazy generation
 */
pub mod crypto;
/**
 * The bundle wire format.
 * Sync files, the manifest, the detached signature
 *  record, and tar.gz packing/extraction.
 */
pub mod bundle;
/**
 * The instance-side peer registry: a flat key=value
 *  file of named peers with pinned public keys.
 */
pub mod peer;

pub mod prelude {
    pub use crate::bundle::archive::{extract_bundle, locate_bundle_root, pack_bundle};
    pub use crate::bundle::manifest::{Manifest, MANIFEST_FILENAME};
    pub use crate::bundle::record::{SyncRecord, SyncScope};
    pub use crate::bundle::signature::{sign_bundle, verify_bundle, SignatureRecord};
    pub use crate::crypto::{Keystore, PublicKey, SecretKey, SigningKey};
    pub use crate::peer::{Peer, PeerFile};
}
