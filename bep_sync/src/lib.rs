//! Per-peer synchronization controller.
//!
//! One controller drives one established session: it exchanges cluster
//! configs and indexes, schedules block pulls against the request pool
//! and the in-flight limit, serves the peer's block requests under the
//! outgoing buffer budget, and shepherds every received block through
//! hash validation and the file actor before the model advances.

extern crate bep_disk;
extern crate bep_hasher;
extern crate bep_model;
extern crate bep_proto;
extern crate bep_util;
extern crate bytes;
#[macro_use]
extern crate error_chain;
extern crate futures;
#[macro_use]
extern crate log;

pub mod controller;
pub mod error;
pub mod locks;
pub mod module;
pub mod record;

pub use crate::controller::{
    Controller, ControllerConfig, IControllerMessage, OControllerMessage, ShutdownReason,
};
pub use crate::error::{SyncError, SyncErrorKind, SyncResult};
pub use crate::locks::BlockLocks;
pub use crate::module::ControllerModule;
pub use crate::record::FolderSyncRecord;
