//! Push engine: one atomic commit via tree rebuild.
//!
//! The input is the *complete* desired state for every tracked path. The
//! whole snapshot is submitted to the tree-creation endpoint as a flat,
//! authoritative path list, so renames and deletions fall out of "absence
//! from the new entry list" — there is no local diffing against the old
//! tree and no per-file delete call. The call count is bounded (≈6)
//! regardless of corpus size, and the six steps have linear data
//! dependencies: the chain is strictly sequential.

use indexmap::IndexMap;
use tracing::{debug, warn};

use canopy_core::model::{Leaf, Metadata, Note, World, leaf_is_persistable};
use canopy_core::path::{leaf_path, metadata_path};

use crate::error::SyncError;
use crate::github::{GitHubClient, NewTreeEntry};
use crate::snapshot::{self, SyncSnapshot};

/// Archive-world state, included only when the caller has it loaded.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveInput<'a> {
    /// Archive leaves.
    pub leaves: &'a [Leaf],
    /// Archive notes.
    pub notes: &'a [Note],
    /// Archive metadata flags.
    pub metadata: &'a Metadata,
}

/// Complete desired end-state for a push.
#[derive(Debug, Clone, Copy)]
pub struct PushInput<'a> {
    /// Home-world leaves.
    pub leaves: &'a [Leaf],
    /// Home-world notes.
    pub notes: &'a [Note],
    /// Home metadata flags (archive-loaded, badge config).
    pub metadata: &'a Metadata,
    /// Archive subtree, when loaded. When absent, the archive namespace
    /// is not part of the tracked set and is left untouched.
    pub archive: Option<ArchiveInput<'a>>,
    /// Snapshot from the last successful sync, for change classification.
    pub previous: &'a SyncSnapshot,
}

/// Result of a successful push.
#[derive(Debug, Clone, PartialEq)]
pub struct PushOutcome {
    /// SHA of the commit now at HEAD, recorded as `lastKnownCommitSha`.
    pub commit_sha: String,
    /// Leaves whose content changed relative to the previous snapshot.
    pub changed_leaf_count: usize,
    /// True when only ordering/settings metadata changed.
    pub metadata_only_changed: bool,
    /// Snapshot of what was pushed; becomes the new comparison base.
    pub snapshot: SyncSnapshot,
}

pub(crate) struct PushPlan {
    pub entries: Vec<NewTreeEntry>,
    pub snapshot: SyncSnapshot,
}

/// Derive the complete path→content map and the matching snapshot.
///
/// Virtual notes and leaves without a live owning note are excluded; the
/// metadata document of each included world rides along at its reserved
/// path.
pub(crate) fn build_plan(input: &PushInput<'_>) -> Result<PushPlan, SyncError> {
    let mut files: IndexMap<String, String> = IndexMap::new();
    let mut snapshot = SyncSnapshot::default();

    add_world(
        &mut files,
        &mut snapshot,
        input.notes,
        input.leaves,
        input.metadata,
        World::Home,
    )?;
    if let Some(archive) = &input.archive {
        add_world(
            &mut files,
            &mut snapshot,
            archive.notes,
            archive.leaves,
            archive.metadata,
            World::Archive,
        )?;
    }

    snapshot.tracked_paths = files.keys().cloned().collect();
    let entries = files
        .into_iter()
        .map(|(path, content)| NewTreeEntry { path, content })
        .collect();
    Ok(PushPlan { entries, snapshot })
}

fn add_world(
    files: &mut IndexMap<String, String>,
    snapshot: &mut SyncSnapshot,
    notes: &[Note],
    leaves: &[Leaf],
    base_metadata: &Metadata,
    world: World,
) -> Result<(), SyncError> {
    let world_notes: Vec<Note> = notes
        .iter()
        .filter(|n| n.world == world && !n.is_virtual())
        .cloned()
        .collect();

    for leaf in leaves {
        if !leaf_is_persistable(leaf, &world_notes) {
            continue;
        }
        let Some(path) = leaf_path(leaf, &world_notes) else {
            continue;
        };
        if files.insert(path.clone(), leaf.content.clone()).is_some() {
            warn!(%path, "duplicate leaf path, later entry wins");
        }
        snapshot
            .leaf_contents
            .insert(leaf.id.clone(), leaf.content.clone());
    }

    let metadata = Metadata::compose(&world_notes, leaves, base_metadata);
    let json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| SyncError::Internal(format!("metadata serialization: {e}")))?;
    let path = metadata_path(world);
    snapshot.metadata_docs.insert(path.clone(), json.clone());
    files.insert(path, json);
    Ok(())
}

/// Push the complete desired state as one commit.
///
/// # Call chain
/// 1. Resolve the branch ref to the current commit SHA.
/// 2. Resolve that commit's root tree SHA.
/// 3. Create the new tree from the full entry list.
/// 4. Create a commit with the read SHA as parent (none on an empty
///    repository).
/// 5. Fast-forward the ref; a concurrent write surfaces as
///    [`SyncError::RefConflict`] and the caller must pull first.
/// 6. The created commit SHA is returned for staleness bookkeeping.
///
/// Either the commit lands completely or the remote is left unchanged;
/// there is no partial application.
pub async fn push_all(
    client: &GitHubClient,
    input: PushInput<'_>,
) -> Result<PushOutcome, SyncError> {
    let plan = build_plan(&input)?;
    debug!(files = plan.entries.len(), "starting tree-rebuild push");

    let parent = match client.get_head().await {
        Ok(sha) => Some(sha),
        Err(SyncError::EmptyRepository) => None,
        Err(e) => return Err(e),
    };

    let base_tree = match &parent {
        Some(sha) => Some(client.get_commit(sha).await?.tree_sha),
        None => None,
    };

    let tree_sha = client.create_tree(&plan.entries).await?;
    let change = snapshot::diff(input.previous, &plan.snapshot);

    // Trees are content-addressed: an identical SHA means the desired
    // state is already at HEAD, so no commit is created.
    if let (Some(parent_sha), Some(base)) = (&parent, &base_tree)
        && *base == tree_sha
    {
        debug!("tree unchanged, skipping commit");
        return Ok(PushOutcome {
            commit_sha: parent_sha.clone(),
            changed_leaf_count: change.changed_leaf_count,
            metadata_only_changed: change.metadata_only_changed,
            snapshot: plan.snapshot,
        });
    }

    let message = format!(
        "Canopy sync at {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    let commit_sha = client
        .create_commit(&message, &tree_sha, parent.as_deref())
        .await?;

    match &parent {
        Some(_) => client.update_ref(&commit_sha).await?,
        None => client.create_ref(&commit_sha).await?,
    }
    debug!(%commit_sha, changed = change.changed_leaf_count, "push landed");

    Ok(PushOutcome {
        commit_sha,
        changed_leaf_count: change.changed_leaf_count,
        metadata_only_changed: change.metadata_only_changed,
        snapshot: plan.snapshot,
    })
}
