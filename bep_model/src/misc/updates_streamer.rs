use std::collections::HashMap;

use bep_proto::message::FileInfo as WireFileInfo;
use bep_util::device::DeviceId;

use crate::cluster::Cluster;

/// A batch of local files to announce to the peer.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexBatch {
    pub folder: String,
    pub files: Vec<WireFileInfo>,
    /// True when this is the first batch for the folder in this
    /// session; sent as a full `Index`, later batches as `IndexUpdate`.
    pub initial: bool,
}

/// Streams local index updates to one peer in sequence order.
///
/// Tracks, per folder, the highest local sequence the peer has been
/// sent. The starting position comes from the peer's cluster config
/// announcement; folders where the peer is behind produce a full index
/// first.
pub struct UpdatesStreamer {
    peer: DeviceId,
    positions: HashMap<String, u64>,
    announced: HashMap<String, bool>,
}

impl UpdatesStreamer {
    pub fn new(peer: DeviceId) -> UpdatesStreamer {
        UpdatesStreamer {
            peer,
            positions: HashMap::new(),
            announced: HashMap::new(),
        }
    }

    /// Record the sequence the peer claims to hold for a folder.
    pub fn set_position(&mut self, folder: &str, sequence: u64) {
        self.positions.insert(folder.to_owned(), sequence);
    }

    /// Mark a folder's snapshot as announced; true when it was not
    /// yet. Used to send an initial (possibly empty) index exactly
    /// once per session.
    pub fn mark_announced(&mut self, folder: &str) -> bool {
        let first = !self.announced.get(folder).cloned().unwrap_or(false);
        self.announced.insert(folder.to_owned(), true);

        first
    }

    /// Produce the next batch of files the peer has not seen, if any.
    pub fn next_batch(&mut self, cluster: &Cluster, max_files: usize) -> Option<IndexBatch> {
        let local_id = cluster.local_id();

        for folder in cluster.shared_folders(&self.peer) {
            if !folder.serves_local() {
                continue;
            }

            let folder_info = match cluster.folder_info(&folder.id, &local_id) {
                Some(folder_info) => folder_info,
                None => continue,
            };

            let position = *self.positions.get(&folder.id).unwrap_or(&0);
            let mut fresh: Vec<&crate::file_info::FileInfo> = folder_info
                .files
                .values()
                .filter(|file| file.sequence > position)
                .collect();
            if fresh.is_empty() {
                continue;
            }

            fresh.sort_by_key(|file| file.sequence);
            fresh.truncate(max_files);

            let last = fresh
                .last()
                .map(|file| file.sequence)
                .expect("bep_model: Empty Batch After Non Empty Filter");
            self.positions.insert(folder.id.clone(), last);

            let initial = !self.announced.get(&folder.id).cloned().unwrap_or(false);
            self.announced.insert(folder.id.clone(), true);

            return Some(IndexBatch {
                folder: folder.id.clone(),
                files: fresh.iter().map(|file| file.to_wire()).collect(),
                initial,
            });
        }

        None
    }
}
