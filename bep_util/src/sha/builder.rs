use crypto::digest::Digest;
use crypto::sha2::Sha256;

use crate::sha::{self, Sha256Hash};

/// Building `Sha256Hash` objects by adding byte slices to the hash.
#[derive(Clone)]
pub struct Sha256Builder {
    sha: Sha256,
}

impl Sha256Builder {
    /// Create a new `Sha256Builder`.
    pub fn new() -> Sha256Builder {
        Sha256Builder { sha: Sha256::new() }
    }

    /// Add bytes to the `Sha256Builder`.
    pub fn add_bytes(mut self, bytes: &[u8]) -> Sha256Builder {
        self.sha.input(bytes);

        self
    }

    /// Build the Sha256Hash from the `Sha256Builder`.
    pub fn build(&self) -> Sha256Hash {
        let mut buffer = [0u8; sha::SHA256_HASH_LEN];

        self.sha.clone().result(&mut buffer);

        buffer.into()
    }
}
