//! Monotonic sequence and request id generation.

use std::sync::{Arc, Mutex};

/// Generates monotonic sequence numbers and request ids.
///
/// Handles are cheap to clone and share one underlying counter, so all
/// holders observe a single monotonic series.
#[derive(Clone)]
pub struct Sequencer {
    inner: Arc<Mutex<u64>>,
}

impl Sequencer {
    /// Create a new `Sequencer` starting at the given value.
    pub fn new(seed: u64) -> Sequencer {
        Sequencer {
            inner: Arc::new(Mutex::new(seed)),
        }
    }

    /// Grab the next value in the series.
    pub fn next_id(&self) -> u64 {
        let mut guard = self
            .inner
            .lock()
            .expect("bep_util: Failed To Lock Sequencer Counter");

        *guard += 1;

        *guard
    }

    /// Grab the next 128 bit uuid, built from two consecutive values.
    pub fn next_uuid(&self) -> [u8; 16] {
        let hi = self.next_id();
        let lo = self.next_id();

        let mut uuid = [0u8; 16];
        for index in 0..8 {
            uuid[index] = (hi >> (56 - index * 8)) as u8;
            uuid[index + 8] = (lo >> (56 - index * 8)) as u8;
        }

        uuid
    }
}
