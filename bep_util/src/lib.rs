//! Utilities shared by the bep-rs synchronization crates.

extern crate chrono;
extern crate crypto;
extern crate rand;

/// Working with and expressing SHA-256 values.
pub mod sha;

/// Device identities derived from certificate hashes.
pub mod device;

/// Monotonic sequence and request id generation.
pub mod seq;

/// Timestamp formatting helpers.
pub mod time;

mod error;

pub use crate::error::{GenericError, GenericResult};

/// Content hash of a file block.
pub type BlockHash = sha::Sha256Hash;

/// Length of a block hash.
pub const BLOCK_HASH_LEN: usize = sha::SHA256_HASH_LEN;
