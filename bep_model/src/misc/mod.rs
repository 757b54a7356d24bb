//! Iteration helpers used by the pull and index-exchange machinery.

mod block_iterator;
mod file_iterator;
mod updates_streamer;

pub use self::block_iterator::{BlockIterator, BlockPull, BlockSource};
pub use self::file_iterator::{pull_decision, FileIterator};
pub use self::updates_streamer::{IndexBatch, UpdatesStreamer};
