mod keys;
mod keystore;

pub use keys::{KeyError, PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use keystore::{Keystore, KeystoreError, SigningKey};
