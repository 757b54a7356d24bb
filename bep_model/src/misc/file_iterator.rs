use std::collections::VecDeque;

use bep_util::device::DeviceId;

use crate::cluster::Cluster;
use crate::file_info::FileInfo;
use crate::folder::PullOrder;
use crate::version::{self, Decision};

/// Walks the files a peer has that the local device should pull.
///
/// The iterator snapshots candidate names up front (folders in id
/// order, files ordered by the folder's pull order) and re-validates
/// every candidate against the live cluster when it is handed out, so
/// a stale snapshot can skip files but never yield a wrong one. The
/// controller rebuilds the iterator whenever the model changes.
pub struct FileIterator {
    peer: DeviceId,
    queue: VecDeque<(String, String)>,
}

impl FileIterator {
    pub fn new(cluster: &Cluster, peer: &DeviceId) -> FileIterator {
        let mut queue = VecDeque::new();

        for folder in cluster.shared_folders(peer) {
            if !folder.accepts_remote() {
                continue;
            }

            let folder_info = match cluster.folder_info(&folder.id, peer) {
                Some(folder_info) => folder_info,
                None => continue,
            };

            let mut files: Vec<&FileInfo> = folder_info.files.values().collect();
            sort_for_pull(&mut files, folder.pull_order);

            for file in files {
                queue.push_back((folder.id.clone(), file.name.clone()));
            }
        }

        FileIterator { peer: *peer, queue }
    }

    /// Advance to the next file that should be pulled right now.
    pub fn next(&mut self, cluster: &Cluster) -> Option<(String, String)> {
        while let Some((folder, name)) = self.queue.pop_front() {
            if pull_decision(cluster, &self.peer, &folder, &name).is_some() {
                return Some((folder, name));
            }
        }

        None
    }
}

/// Whether (and how) the peer's copy of a file wins against ours.
///
/// `None` means there is nothing to do: no such file, an unreachable or
/// invalid copy, an already completed transfer, or a losing version.
pub fn pull_decision(
    cluster: &Cluster,
    peer: &DeviceId,
    folder: &str,
    name: &str,
) -> Option<Decision> {
    let remote = cluster.file(folder, peer, name)?;
    if remote.unreachable || remote.invalid {
        return None;
    }
    let ignores_delete = cluster
        .folder(folder)
        .map(|entry| entry.ignore_delete)
        .unwrap_or(false);
    if remote.deleted && ignores_delete {
        return None;
    }

    let local_id = cluster.local_id();
    let decision = match cluster.file(folder, &local_id, name) {
        Some(local) => version::decide(local, remote),
        None => Decision::AcceptRemote,
    };

    match decision {
        Decision::IgnoreRemote | Decision::ConflictLocalWins => None,
        decision => {
            // Fully transferred files stay out of the queue once the
            // local metadata catches up, which AdvanceFile performs.
            let caught_up = cluster
                .file(folder, &local_id, name)
                .map(|local| {
                    version::compare(&local.version, &remote.version)
                        == version::VersionOrdering::Equal
                })
                .unwrap_or(false);
            if caught_up {
                None
            } else {
                Some(decision)
            }
        }
    }
}

fn sort_for_pull(files: &mut Vec<&FileInfo>, order: PullOrder) {
    match order {
        PullOrder::Default => files.sort_by_key(|file| file.sequence),
        PullOrder::LargestFirst => {
            files.sort_by(|a, b| b.size.cmp(&a.size).then(a.sequence.cmp(&b.sequence)))
        }
        PullOrder::SmallestFirst => {
            files.sort_by(|a, b| a.size.cmp(&b.size).then(a.sequence.cmp(&b.sequence)))
        }
        PullOrder::OldestFirst => files.sort_by(|a, b| {
            a.modified_s
                .cmp(&b.modified_s)
                .then(a.sequence.cmp(&b.sequence))
        }),
        PullOrder::NewestFirst => files.sort_by(|a, b| {
            b.modified_s
                .cmp(&a.modified_s)
                .then(a.sequence.cmp(&b.sequence))
        }),
        PullOrder::Alphabetic => files.sort_by(|a, b| a.name.cmp(&b.name)),
    }
}
