use crate::error::{GenericError, GenericResult};

mod builder;

pub use crate::sha::builder::Sha256Builder;

/// Length of a SHA-256 hash.
pub const SHA256_HASH_LEN: usize = 32;

/// SHA-256 hash wrapper type for performing operations on the hash.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha256Hash {
    hash: [u8; SHA256_HASH_LEN],
}

impl Sha256Hash {
    /// Create a Sha256Hash by hashing the given bytes.
    pub fn from_bytes(bytes: &[u8]) -> Sha256Hash {
        Sha256Builder::new().add_bytes(bytes).build()
    }

    /// Create a Sha256Hash directly from the given hash.
    pub fn from_hash(hash: &[u8]) -> GenericResult<Sha256Hash> {
        if hash.len() != SHA256_HASH_LEN {
            Err(GenericError::InvalidLength(SHA256_HASH_LEN))
        } else {
            let mut my_hash = [0u8; SHA256_HASH_LEN];
            my_hash.copy_from_slice(hash);

            Ok(Sha256Hash { hash: my_hash })
        }
    }

    pub fn len() -> usize {
        SHA256_HASH_LEN
    }
}

impl AsRef<[u8]> for Sha256Hash {
    fn as_ref(&self) -> &[u8] {
        &self.hash
    }
}

impl Into<[u8; SHA256_HASH_LEN]> for Sha256Hash {
    fn into(self) -> [u8; SHA256_HASH_LEN] {
        self.hash
    }
}

impl From<[u8; SHA256_HASH_LEN]> for Sha256Hash {
    fn from(hash: [u8; SHA256_HASH_LEN]) -> Sha256Hash {
        Sha256Hash { hash }
    }
}

impl PartialEq<[u8]> for Sha256Hash {
    fn eq(&self, other: &[u8]) -> bool {
        let is_equal = other.len() == self.hash.len();

        self.hash
            .iter()
            .zip(other.iter())
            .fold(is_equal, |prev, (h, o)| prev && h == o)
    }
}

impl ::std::fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        for byte in self.hash.iter() {
            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}
