//! Pull engine: manifest-first download with priority-ordered fetches.
//!
//! The manifest (a recursive tree listing) is enumerated before any
//! content is fetched. Leaf blobs are then downloaded in two partitions:
//! everything the priority hint names, strictly before the rest. Within a
//! partition fetches run concurrently up to a bounded pool and may finish
//! in any order; the progress counter stays monotonic regardless. The
//! overall return is a single completed collection — progress is purely
//! observational and no partial result is exposed early.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use tracing::{debug, warn};

use canopy_core::model::{Leaf, Metadata, Note, PullPriority, World};
use canopy_core::path::{
    ParsedLeafPath, derived_leaf_id, derived_note_id, metadata_path, parse_leaf_path,
};

use crate::error::SyncError;
use crate::github::{GitHubClient, TreeEntry};
use crate::push::{ArchiveInput, PushInput, build_plan};
use crate::snapshot::SyncSnapshot;

/// Bound on concurrent blob fetches within one partition.
const MAX_CONCURRENT_FETCHES: usize = 8;

/// Progress callback signature.
pub type ProgressFn = Arc<dyn Fn(PullProgress) + Send + Sync>;

/// Observational fetch progress. `fetched` increases monotonically from 1
/// to `total` even when blob fetches complete out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullProgress {
    /// Leaves fetched so far.
    pub fetched: usize,
    /// Total leaves in the manifest.
    pub total: usize,
}

/// Pull configuration.
#[derive(Clone, Default)]
pub struct PullOptions {
    /// Leaves to fetch first.
    pub priority: Option<PullPriority>,
    /// Invoked after each leaf's content resolves.
    pub on_progress: Option<ProgressFn>,
}

/// Result of a successful pull. The caller must treat this as
/// authoritative and fully replace the local cache — never merge.
#[derive(Debug, Clone)]
pub struct PullOutcome {
    /// Assembled notes, both worlds.
    pub notes: Vec<Note>,
    /// Assembled leaves, both worlds.
    pub leaves: Vec<Leaf>,
    /// Recovered metadata (defaults when the reserved file is absent).
    pub metadata: Metadata,
    /// HEAD commit SHA captured before the manifest was read; becomes the
    /// new `lastKnownCommitSha`.
    pub commit_sha: String,
    /// Snapshot of the pulled state, the comparison base for the next
    /// push.
    pub snapshot: SyncSnapshot,
}

struct LeafBlob {
    path: String,
    sha: String,
    parsed: ParsedLeafPath,
}

/// A pull failure carrying whatever metadata was recovered before the
/// failure, so callers can keep badge and ordering state.
#[derive(Debug, Clone)]
pub struct PullFailure {
    /// Classified error.
    pub error: SyncError,
    /// Metadata salvaged before the failure; defaults when the failure
    /// happened before any metadata was read.
    pub metadata: Metadata,
}

impl PullFailure {
    fn early(error: SyncError) -> Self {
        Self {
            error,
            metadata: Metadata::default(),
        }
    }
}

/// Download the full remote state.
///
/// An empty repository surfaces as a [`PullFailure`] carrying
/// [`SyncError::EmptyRepository`]; the coordinator treats that as a
/// valid terminal state, not a failure.
pub async fn pull_all(
    client: &GitHubClient,
    options: &PullOptions,
) -> Result<PullOutcome, PullFailure> {
    // 1-2. HEAD commit, then its root tree.
    let commit_sha = client.get_head().await.map_err(PullFailure::early)?;
    let commit = client
        .get_commit(&commit_sha)
        .await
        .map_err(PullFailure::early)?;

    // 3. Full manifest, no content yet.
    let entries = client
        .get_tree_recursive(&commit.tree_sha)
        .await
        .map_err(PullFailure::early)?;
    let (manifest, metadata_shas) = split_manifest(entries);
    debug!(leaves = manifest.len(), %commit_sha, "pull manifest enumerated");

    // Metadata first: ids and orders inform note assembly and the
    // note-id half of the priority hint. From here on a failure keeps
    // what was recovered.
    let home_meta = fetch_metadata(client, metadata_shas.get(&World::Home)).await;
    let archive_meta = fetch_metadata(client, metadata_shas.get(&World::Archive)).await;

    fetch_and_assemble(client, options, manifest, &home_meta, &archive_meta, commit_sha)
        .await
        .map_err(|error| PullFailure {
            error,
            metadata: merge_metadata(&home_meta, &archive_meta),
        })
}

async fn fetch_and_assemble(
    client: &GitHubClient,
    options: &PullOptions,
    manifest: Vec<LeafBlob>,
    home_meta: &Metadata,
    archive_meta: &Metadata,
    commit_sha: String,
) -> Result<PullOutcome, SyncError> {
    let (notes, dir_to_note_id) = assemble_notes(&manifest, home_meta, archive_meta);

    // 4. Partition, then fetch: priority strictly before rest.
    let hint = options.priority.clone().unwrap_or_default();
    let (priority, rest) = partition(manifest, &hint, &dir_to_note_id);

    let total = priority.len() + rest.len();
    let counter = AtomicUsize::new(0);
    let mut fetched: Vec<(LeafBlob, String)> = Vec::with_capacity(total);
    fetch_partition(client, priority, &counter, total, &options.on_progress, &mut fetched).await?;
    fetch_partition(client, rest, &counter, total, &options.on_progress, &mut fetched).await?;

    // 5. Parse paths back into records.
    let leaves = assemble_leaves(fetched, &notes, &dir_to_note_id, home_meta, archive_meta);
    let metadata = merge_metadata(home_meta, archive_meta);
    let snapshot = capture_snapshot(&notes, &leaves, &metadata)?;

    Ok(PullOutcome {
        notes,
        leaves,
        metadata,
        commit_sha,
        snapshot,
    })
}

/// Separate leaf blobs from the reserved metadata documents; everything
/// else in the tree is ignored.
fn split_manifest(entries: Vec<TreeEntry>) -> (Vec<LeafBlob>, HashMap<World, String>) {
    let mut manifest = Vec::new();
    let mut metadata_shas = HashMap::new();
    for entry in entries {
        if !entry.is_blob() {
            continue;
        }
        let Some(sha) = entry.sha else { continue };
        if entry.path == metadata_path(World::Home) {
            metadata_shas.insert(World::Home, sha);
        } else if entry.path == metadata_path(World::Archive) {
            metadata_shas.insert(World::Archive, sha);
        } else if let Some(parsed) = parse_leaf_path(&entry.path) {
            manifest.push(LeafBlob {
                path: entry.path,
                sha,
                parsed,
            });
        }
    }
    (manifest, metadata_shas)
}

/// Fetch and parse one world's metadata document. Anything that goes
/// wrong degrades to defaults — a bad metadata file must not fail the
/// pull, the markdown tree is still authoritative for existence.
async fn fetch_metadata(client: &GitHubClient, sha: Option<&String>) -> Metadata {
    let Some(sha) = sha else {
        return Metadata::default();
    };
    match client.get_blob(sha).await {
        Ok(json) => match serde_json::from_str(&json) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, "unreadable metadata document, using defaults");
                Metadata::default()
            }
        },
        Err(e) => {
            warn!(error = %e, "metadata blob fetch failed, using defaults");
            Metadata::default()
        }
    }
}

/// Rebuild note records for both worlds.
///
/// Metadata is authoritative for ids and ordering (and keeps empty notes
/// alive — git stores no empty directories); directories seen in the
/// manifest but unknown to metadata get deterministic derived records.
fn assemble_notes(
    manifest: &[LeafBlob],
    home_meta: &Metadata,
    archive_meta: &Metadata,
) -> (Vec<Note>, HashMap<String, String>) {
    let mut notes = Vec::new();
    for (world, meta) in [(World::Home, home_meta), (World::Archive, archive_meta)] {
        for note_meta in &meta.notes {
            notes.push(Note {
                id: note_meta.id.clone(),
                name: note_meta.name.clone(),
                parent_id: note_meta.parent_id.clone(),
                order: note_meta.order,
                world,
            });
        }
    }

    let mut dir_to_note_id: HashMap<String, String> = notes
        .iter()
        .filter_map(|n| Some((canopy_core::path::note_dir(n, &notes)?, n.id.clone())))
        .collect();

    // Directories not covered by metadata: derive stable records.
    let mut next_order = notes.iter().map(|n| n.order + 1).max().unwrap_or(0);
    for blob in manifest {
        let dir = blob.parsed.note_dir();
        if dir_to_note_id.contains_key(&dir) {
            continue;
        }
        let world = blob.parsed.world;
        let parent_id = match &blob.parsed.parent_note {
            Some(parent_name) => {
                let parent_dir = format!("{}/{}", world.namespace(), parent_name);
                let id = dir_to_note_id.entry(parent_dir).or_insert_with(|| {
                    let id = derived_note_id(world, None, parent_name);
                    notes.push(Note {
                        id: id.clone(),
                        name: parent_name.clone(),
                        parent_id: None,
                        order: next_order,
                        world,
                    });
                    next_order += 1;
                    id
                });
                Some(id.clone())
            }
            None => None,
        };

        let id = derived_note_id(world, blob.parsed.parent_note.as_deref(), &blob.parsed.note);
        notes.push(Note {
            id: id.clone(),
            name: blob.parsed.note.clone(),
            parent_id,
            order: next_order,
            world,
        });
        next_order += 1;
        dir_to_note_id.insert(dir, id);
    }

    notes.sort_by(|a, b| (a.order, &a.name).cmp(&(b.order, &b.name)));
    (notes, dir_to_note_id)
}

/// Split the manifest into the priority partition and the rest.
///
/// A leaf is prioritized when its path appears in the hint's path set or
/// its owning note is in the hint's note-id set. Explicit paths keep the
/// hint's relative order and come before note-id matches, which keep
/// manifest order.
fn partition(
    manifest: Vec<LeafBlob>,
    hint: &PullPriority,
    dir_to_note_id: &HashMap<String, String>,
) -> (Vec<LeafBlob>, Vec<LeafBlob>) {
    if hint.is_empty() {
        return (Vec::new(), manifest);
    }

    let mut ranked: Vec<(usize, usize, LeafBlob)> = Vec::new();
    let mut rest = Vec::new();
    for (index, blob) in manifest.into_iter().enumerate() {
        if let Some(rank) = hint.leaf_paths.iter().position(|p| *p == blob.path) {
            ranked.push((rank, index, blob));
        } else if dir_to_note_id
            .get(&blob.parsed.note_dir())
            .is_some_and(|note_id| hint.note_ids.contains(note_id))
        {
            ranked.push((hint.leaf_paths.len(), index, blob));
        } else {
            rest.push(blob);
        }
    }
    ranked.sort_by_key(|(rank, index, _)| (*rank, *index));
    (ranked.into_iter().map(|(_, _, blob)| blob).collect(), rest)
}

/// Fetch one partition with bounded concurrency.
///
/// Completions may arrive in any order; the shared counter makes the
/// reported `fetched` count monotonic and race-free.
async fn fetch_partition(
    client: &GitHubClient,
    items: Vec<LeafBlob>,
    counter: &AtomicUsize,
    total: usize,
    on_progress: &Option<ProgressFn>,
    out: &mut Vec<(LeafBlob, String)>,
) -> Result<(), SyncError> {
    let mut stream = futures::stream::iter(items)
        .map(|blob| async move {
            let content = client.get_blob(&blob.sha).await?;
            Ok::<_, SyncError>((blob, content))
        })
        .buffer_unordered(MAX_CONCURRENT_FETCHES);

    while let Some(result) = stream.next().await {
        let (blob, content) = result?;
        let fetched = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(callback) = on_progress {
            callback(PullProgress { fetched, total });
        }
        out.push((blob, content));
    }
    Ok(())
}

/// Turn fetched blobs into leaf records, recovering ids and orders from
/// metadata where available and deriving them from the path otherwise.
fn assemble_leaves(
    fetched: Vec<(LeafBlob, String)>,
    notes: &[Note],
    dir_to_note_id: &HashMap<String, String>,
    home_meta: &Metadata,
    archive_meta: &Metadata,
) -> Vec<Leaf> {
    let leaf_meta_by_path: HashMap<&str, &canopy_core::model::LeafMeta> = home_meta
        .leaves
        .iter()
        .chain(archive_meta.leaves.iter())
        .map(|m| (m.path.as_str(), m))
        .collect();
    let note_order: HashMap<&str, i64> = notes.iter().map(|n| (n.id.as_str(), n.order)).collect();

    let mut leaves: Vec<Leaf> = Vec::with_capacity(fetched.len());
    for (index, (blob, content)) in fetched.into_iter().enumerate() {
        let Some(note_id) = dir_to_note_id.get(&blob.parsed.note_dir()) else {
            // Unreachable given assemble_notes covered every manifest dir.
            warn!(path = %blob.path, "leaf without assembled note, skipping");
            continue;
        };
        let meta = leaf_meta_by_path.get(blob.path.as_str());
        leaves.push(Leaf {
            id: meta
                .map(|m| m.id.clone())
                .unwrap_or_else(|| derived_leaf_id(&blob.path)),
            note_id: note_id.clone(),
            title: blob.parsed.title.clone(),
            content,
            order: meta.map(|m| m.order).unwrap_or(index as i64),
            updated_at: meta.map(|m| m.updated_at).unwrap_or(0),
            badge_icon: meta.and_then(|m| m.badge_icon.clone()),
            badge_color: meta.and_then(|m| m.badge_color.clone()),
        });
    }

    leaves.sort_by(|a, b| {
        let a_key = (note_order.get(a.note_id.as_str()).copied().unwrap_or(i64::MAX), a.order);
        let b_key = (note_order.get(b.note_id.as_str()).copied().unwrap_or(i64::MAX), b.order);
        a_key.cmp(&b_key).then_with(|| a.title.cmp(&b.title))
    });
    leaves
}

/// Fold both worlds' metadata documents into the single aggregate the
/// caller persists. Home carries the flags; note/leaf records are the
/// union.
fn merge_metadata(home: &Metadata, archive: &Metadata) -> Metadata {
    let mut merged = home.clone();
    merged.notes.extend(archive.notes.iter().cloned());
    merged.leaves.extend(archive.leaves.iter().cloned());
    merged
}

/// Capture the pulled state as the snapshot the next push diffs against.
///
/// Reuses the push planner, wired exactly the way clients wire a push
/// (the merged document is the flag base for both worlds), so both
/// sides serialize metadata identically; otherwise a no-op push right
/// after a pull would misreport a metadata change.
fn capture_snapshot(
    notes: &[Note],
    leaves: &[Leaf],
    metadata: &Metadata,
) -> Result<SyncSnapshot, SyncError> {
    let has_archive =
        metadata.archive_loaded || notes.iter().any(|n| n.world == World::Archive);
    let previous = SyncSnapshot::default();
    let input = PushInput {
        leaves,
        notes,
        metadata,
        archive: has_archive.then_some(ArchiveInput {
            leaves,
            notes,
            metadata,
        }),
        previous: &previous,
    };
    Ok(build_plan(&input)?.snapshot)
}
