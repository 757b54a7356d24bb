//! Version vector comparison and conflict resolution.
//!
//! A version vector is a multiset of `(originator short id, counter)`
//! entries. Counters only ever grow; the entry appended most recently
//! names the device that made the latest edit.

use bep_proto::message::Version;
use bep_util::device::{format_short_id, ShortId};
use bep_util::time::format_conflict_stamp;

use crate::file_info::FileInfo;

/// Relationship between two version vectors.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum VersionOrdering {
    /// Left is a strict ancestor of right.
    Ancestor,
    /// Left is a strict descendant of right.
    Descendant,
    Equal,
    Concurrent,
}

/// Outcome of weighing a remotely received file against the local copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The remote file supersedes the local copy.
    AcceptRemote,
    /// The remote file is old news.
    IgnoreRemote,
    /// Concurrent edit which the remote side wins; the local copy moves
    /// to the given conflict copy name.
    ConflictRemoteWins { conflict_name: String },
    /// Concurrent edit which the local side wins; announce our copy.
    ConflictLocalWins,
}

/// Compare two version vectors.
pub fn compare(left: &Version, right: &Version) -> VersionOrdering {
    let left_le = dominated_by(left, right);
    let right_le = dominated_by(right, left);

    match (left_le, right_le) {
        (true, true) => VersionOrdering::Equal,
        (true, false) => VersionOrdering::Ancestor,
        (false, true) => VersionOrdering::Descendant,
        (false, false) => VersionOrdering::Concurrent,
    }
}

/// Whether every counter of `left` is covered by `right`.
fn dominated_by(left: &Version, right: &Version) -> bool {
    left.counters
        .iter()
        .all(|counter| counter_of(right, counter.id) >= counter.value)
}

fn counter_of(version: &Version, id: ShortId) -> u64 {
    version
        .counters
        .iter()
        .filter(|counter| counter.id == id)
        .map(|counter| counter.value)
        .max()
        .unwrap_or(0)
}

/// The device that made the latest edit recorded in a version.
pub fn originator(version: &Version) -> ShortId {
    version.counters.last().map(|counter| counter.id).unwrap_or(0)
}

fn max_counter(version: &Version) -> u64 {
    version
        .counters
        .iter()
        .map(|counter| counter.value)
        .max()
        .unwrap_or(0)
}

/// Decide what to do with remote file `remote` given local file `local`.
///
/// A local copy carrying a not-yet-announced edit (`local_modified`)
/// holds its ground against concurrent remote edits; counter
/// authorship alone does not protect a file, otherwise a locally
/// created file could never lose a conflict by modification time.
pub fn decide(local: &FileInfo, remote: &FileInfo) -> Decision {
    match compare(&remote.version, &local.version) {
        VersionOrdering::Descendant => Decision::AcceptRemote,
        VersionOrdering::Ancestor | VersionOrdering::Equal => Decision::IgnoreRemote,
        VersionOrdering::Concurrent => {
            if local.local_modified {
                return Decision::ConflictLocalWins;
            }

            if remote_wins_concurrent(local, remote) {
                Decision::ConflictRemoteWins {
                    conflict_name: conflict_name(
                        &local.name,
                        local.modified_s,
                        originator(&remote.version),
                    ),
                }
            } else {
                Decision::ConflictLocalWins
            }
        }
    }
}

/// Concurrent tiebreaker chain: modification time, then the highest
/// counter value across the vectors, then the originator short id in
/// lexicographic order of its display form.
fn remote_wins_concurrent(local: &FileInfo, remote: &FileInfo) -> bool {
    if remote.modified_s != local.modified_s {
        return remote.modified_s > local.modified_s;
    }

    let remote_max = max_counter(&remote.version);
    let local_max = max_counter(&local.version);
    if remote_max != local_max {
        return remote_max > local_max;
    }

    format_short_id(originator(&remote.version)) > format_short_id(originator(&local.version))
}

/// Derive the version a new local edit of `version` carries: the
/// author's counter moves past every counter seen so far and becomes
/// the latest entry.
pub fn advance(version: &Version, author: ShortId) -> Version {
    let next = max_counter(version) + 1;
    let mut counters: Vec<_> = version
        .counters
        .iter()
        .cloned()
        .filter(|counter| counter.id != author)
        .collect();
    counters.push(bep_proto::message::Counter::new(author, next));

    Version::new(counters)
}

/// Conflict copy name for the losing local copy:
/// `<stem>.sync-conflict-<YYYYMMDD>-<HHMMSS>-<short7>.<ext>`.
pub fn conflict_name(name: &str, loser_modified_s: i64, winner: ShortId) -> String {
    let stamp = format_conflict_stamp(loser_modified_s);
    let short = format_short_id(winner);

    let segment = name.rfind('/').map(|position| position + 1).unwrap_or(0);
    match name[segment..].rfind('.') {
        // A leading dot is a hidden file, not an extension
        Some(position) if position > 0 && segment + position + 1 < name.len() => {
            let (stem, ext) = name.split_at(segment + position);
            format!("{}.sync-conflict-{}-{}{}", stem, stamp, short, ext)
        }
        _ => format!("{}.sync-conflict-{}-{}", name, stamp, short),
    }
}
