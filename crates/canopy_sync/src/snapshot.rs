//! Last-synced snapshot and change classification.
//!
//! A commit SHA is what decides staleness; this snapshot exists only to
//! classify what a push changed (content edits vs. pure reorders), by
//! comparison against the previously synced state — never by diffing
//! against the remote.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// The tracked state as of the last successful push or pull.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    /// Leaf id → content at sync time.
    #[serde(default)]
    pub leaf_contents: HashMap<String, String>,
    /// Every repository path the last sync tracked (leaves and metadata).
    #[serde(default)]
    pub tracked_paths: BTreeSet<String>,
    /// Serialized metadata documents, keyed by their reserved path.
    #[serde(default)]
    pub metadata_docs: BTreeMap<String, String>,
}

/// What a prospective push changes relative to the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Leaves whose content differs (added, edited, or removed). Purely
    /// structural reorders are excluded.
    pub changed_leaf_count: usize,
    /// No leaf content changed, but ordering/settings metadata did.
    pub metadata_only_changed: bool,
}

/// Compare the desired state against the previously synced snapshot.
pub fn diff(previous: &SyncSnapshot, current: &SyncSnapshot) -> SnapshotDiff {
    let edited = current
        .leaf_contents
        .iter()
        .filter(|(id, content)| previous.leaf_contents.get(*id) != Some(*content))
        .count();
    let removed = previous
        .leaf_contents
        .keys()
        .filter(|id| !current.leaf_contents.contains_key(*id))
        .count();
    let changed_leaf_count = edited + removed;

    let metadata_changed = previous.metadata_docs != current.metadata_docs
        || previous.tracked_paths != current.tracked_paths;

    SnapshotDiff {
        changed_leaf_count,
        metadata_only_changed: changed_leaf_count == 0 && metadata_changed,
    }
}
