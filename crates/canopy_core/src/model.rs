//! Record types for notes, leaves, settings, and sync metadata.

use serde::{Deserialize, Serialize};

/// Reserved id prefix for virtual records (synthesized views, never pushed).
pub const VIRTUAL_ID_PREFIX: &str = "__";

/// Partition of the note space: active notes vs. cold storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum World {
    /// Active notes.
    #[default]
    Home,
    /// Cold storage, loaded lazily and synced under its own namespace.
    Archive,
}

/// A folder-like grouping node. At most two levels of nesting: a root note,
/// optionally holding sub-notes. Sub-notes never have children of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Stable identifier. Ids starting with `__` denote virtual notes.
    pub id: String,
    /// Display name, doubles as the directory name in the repository.
    pub name: String,
    /// Parent note id for sub-notes; `None` for root notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Sibling sort key.
    #[serde(default)]
    pub order: i64,
    /// World this note belongs to.
    #[serde(default)]
    pub world: World,
}

impl Note {
    /// Virtual notes (e.g. a synthesized priority view) are never persisted
    /// to the remote repository.
    pub fn is_virtual(&self) -> bool {
        self.id.starts_with(VIRTUAL_ID_PREFIX)
    }
}

/// An individual markdown document owned by a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaf {
    /// Stable identifier.
    pub id: String,
    /// Owning note id. A leaf whose note no longer exists is local-only.
    pub note_id: String,
    /// Title, doubles as the file name (minus `.md`) in the repository.
    pub title: String,
    /// Markdown body.
    pub content: String,
    /// Sibling sort key within the owning note.
    #[serde(default)]
    pub order: i64,
    /// Last modification time, unix milliseconds.
    #[serde(default)]
    pub updated_at: i64,
    /// Optional badge icon shown next to the leaf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_icon: Option<String>,
    /// Optional badge color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_color: Option<String>,
}

/// Whether a leaf participates in sync.
///
/// Root-level leaves are not persisted: a leaf is only pushed when its
/// `note_id` references an existing, non-virtual note.
pub fn leaf_is_persistable(leaf: &Leaf, notes: &[Note]) -> bool {
    notes
        .iter()
        .any(|n| n.id == leaf.note_id && !n.is_virtual())
}

/// Per-note entry in the serialized [`Metadata`] document.
///
/// The markdown tree alone cannot round-trip ids, sort keys, or empty
/// notes (git stores no empty directories), so they ride along here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteMeta {
    /// Note id.
    pub id: String,
    /// Note name at push time.
    pub name: String,
    /// Parent note id for sub-notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Sibling sort key.
    #[serde(default)]
    pub order: i64,
}

/// Per-leaf entry in the serialized [`Metadata`] document, keyed by path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafMeta {
    /// Leaf id.
    pub id: String,
    /// Repository path of the leaf at push time.
    pub path: String,
    /// Sibling sort key.
    #[serde(default)]
    pub order: i64,
    /// Last modification time, unix milliseconds.
    #[serde(default)]
    pub updated_at: i64,
    /// Optional badge icon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_icon: Option<String>,
    /// Optional badge color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_color: Option<String>,
}

/// Aggregate sync-relevant state serialized alongside the markdown tree.
///
/// Recovered from a reserved path on pull; defaults apply when the file is
/// missing or unreadable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Whether the archive world has been loaded at least once.
    #[serde(default)]
    pub archive_loaded: bool,
    /// Badge icon for the synthesized priority view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_icon: Option<String>,
    /// Badge color for the synthesized priority view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_color: Option<String>,
    /// Note records, authoritative for ids and ordering.
    #[serde(default)]
    pub notes: Vec<NoteMeta>,
    /// Leaf records, authoritative for ids and ordering, keyed by path.
    #[serde(default)]
    pub leaves: Vec<LeafMeta>,
}

impl Metadata {
    /// Compose the metadata document for one world from its notes and
    /// leaves, carrying over the aggregate flags from `base`.
    ///
    /// Virtual notes and non-persistable leaves are excluded, mirroring
    /// what gets pushed.
    pub fn compose(notes: &[Note], leaves: &[Leaf], base: &Metadata) -> Metadata {
        let note_metas = notes
            .iter()
            .filter(|n| !n.is_virtual())
            .map(|n| NoteMeta {
                id: n.id.clone(),
                name: n.name.clone(),
                parent_id: n.parent_id.clone(),
                order: n.order,
            })
            .collect();
        let leaf_metas = leaves
            .iter()
            .filter_map(|leaf| {
                let path = crate::path::leaf_path(leaf, notes)?;
                Some(LeafMeta {
                    id: leaf.id.clone(),
                    path,
                    order: leaf.order,
                    updated_at: leaf.updated_at,
                    badge_icon: leaf.badge_icon.clone(),
                    badge_color: leaf.badge_color.clone(),
                })
            })
            .collect();
        Metadata {
            archive_loaded: base.archive_loaded,
            badge_icon: base.badge_icon.clone(),
            badge_color: base.badge_color.clone(),
            notes: note_metas,
            leaves: leaf_metas,
        }
    }
}

/// User settings: credentials, repository identity, preferences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Bearer token for the git-hosting API.
    #[serde(default)]
    pub token: String,
    /// Repository identifier, `owner/name`.
    #[serde(default)]
    pub repository: String,
    /// Committer name; a placeholder is used when empty.
    #[serde(default)]
    pub username: String,
    /// Committer email; a placeholder is used when empty.
    #[serde(default)]
    pub email: String,
    /// UI theme preference (opaque to the sync engine).
    #[serde(default)]
    pub theme: String,
    /// World last displayed (opaque to the sync engine).
    #[serde(default)]
    pub last_world: World,
}

impl Settings {
    /// A non-empty token and a `owner/name` repository are required before
    /// any network call.
    pub fn is_configured(&self) -> bool {
        if self.token.trim().is_empty() {
            return false;
        }
        match self.repository.split_once('/') {
            Some((owner, name)) => !owner.trim().is_empty() && !name.trim().is_empty(),
            None => false,
        }
    }

    /// Committer identity, falling back to placeholders.
    pub fn committer(&self) -> (String, String) {
        let name = if self.username.trim().is_empty() {
            "Canopy User".to_string()
        } else {
            self.username.clone()
        };
        let email = if self.email.trim().is_empty() {
            "user@example.com".to_string()
        } else {
            self.email.clone()
        };
        (name, email)
    }
}

/// Hint naming the leaves a pull should fetch first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullPriority {
    /// Repository paths to fetch first, in the given order.
    #[serde(default)]
    pub leaf_paths: Vec<String>,
    /// Owning-note ids whose leaves should be fetched first.
    #[serde(default)]
    pub note_ids: Vec<String>,
}

impl PullPriority {
    /// True when the hint names nothing.
    pub fn is_empty(&self) -> bool {
        self.leaf_paths.is_empty() && self.note_ids.is_empty()
    }
}
