//! Repository path codec.
//!
//! A leaf lives at `<namespace>/[<parentNoteName>/]<noteName>/<leafTitle>.md`
//! where the namespace is `notes` (home world) or `archive`. Directory depth
//! encodes nesting: two note levels at most. Each namespace also carries a
//! reserved `metadata.json` at depth two, which can never collide with a
//! leaf path (leaves sit at depth three or four).

use crate::model::{Leaf, Note, World};

/// Namespace prefix for the home world.
pub const HOME_NAMESPACE: &str = "notes";
/// Namespace prefix for the archive world.
pub const ARCHIVE_NAMESPACE: &str = "archive";
/// File name of the reserved metadata document inside each namespace.
pub const METADATA_FILENAME: &str = "metadata.json";
/// Extension of leaf files.
pub const LEAF_EXTENSION: &str = ".md";

impl World {
    /// Namespace prefix for this world.
    pub fn namespace(self) -> &'static str {
        match self {
            World::Home => HOME_NAMESPACE,
            World::Archive => ARCHIVE_NAMESPACE,
        }
    }

    /// Inverse of [`World::namespace`].
    pub fn from_namespace(namespace: &str) -> Option<World> {
        match namespace {
            HOME_NAMESPACE => Some(World::Home),
            ARCHIVE_NAMESPACE => Some(World::Archive),
            _ => None,
        }
    }
}

/// Reserved metadata path for a world.
pub fn metadata_path(world: World) -> String {
    format!("{}/{}", world.namespace(), METADATA_FILENAME)
}

/// Make a name usable as a single path component.
///
/// Separators would silently change the tree shape, so they are folded
/// into `-`. An empty name becomes `untitled`.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .collect();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}

/// Directory path of a note relative to the repository root, or `None`
/// for virtual notes.
///
/// Only one level of nesting is honored: a sub-note's directory sits under
/// its parent's name, and any deeper `parent_id` chain is ignored.
pub fn note_dir(note: &Note, all_notes: &[Note]) -> Option<String> {
    if note.is_virtual() {
        return None;
    }
    let name = sanitize_component(&note.name);
    let parent = note
        .parent_id
        .as_deref()
        .and_then(|pid| all_notes.iter().find(|n| n.id == pid))
        .filter(|p| !p.is_virtual());
    let dir = match parent {
        Some(parent) => format!(
            "{}/{}/{}",
            note.world.namespace(),
            sanitize_component(&parent.name),
            name
        ),
        None => format!("{}/{}", note.world.namespace(), name),
    };
    Some(dir)
}

/// Repository path for a leaf, or `None` when the leaf is not persistable
/// (owning note missing or virtual).
pub fn leaf_path(leaf: &Leaf, all_notes: &[Note]) -> Option<String> {
    let note = all_notes.iter().find(|n| n.id == leaf.note_id)?;
    let dir = note_dir(note, all_notes)?;
    Some(format!(
        "{}/{}{}",
        dir,
        sanitize_component(&leaf.title),
        LEAF_EXTENSION
    ))
}

/// A leaf path decomposed back into its naming parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLeafPath {
    /// World derived from the namespace component.
    pub world: World,
    /// Root note name for nested leaves.
    pub parent_note: Option<String>,
    /// Owning note name.
    pub note: String,
    /// Leaf title (file name minus extension).
    pub title: String,
}

impl ParsedLeafPath {
    /// Directory path of the owning note.
    pub fn note_dir(&self) -> String {
        match &self.parent_note {
            Some(parent) => format!("{}/{}/{}", self.world.namespace(), parent, self.note),
            None => format!("{}/{}", self.world.namespace(), self.note),
        }
    }
}

/// Parse a repository path into note/leaf naming parts.
///
/// Returns `None` for anything that is not a leaf path: wrong namespace,
/// wrong extension, too shallow (root-level leaves are not persisted) or
/// too deep (more than two note levels).
pub fn parse_leaf_path(path: &str) -> Option<ParsedLeafPath> {
    let components: Vec<&str> = path.split('/').collect();
    let world = World::from_namespace(components.first()?)?;
    let file = components.last()?;
    let title = file.strip_suffix(LEAF_EXTENSION)?;
    if title.is_empty() {
        return None;
    }

    match components.as_slice() {
        [_, note, _] => Some(ParsedLeafPath {
            world,
            parent_note: None,
            note: (*note).to_string(),
            title: title.to_string(),
        }),
        [_, parent, note, _] => Some(ParsedLeafPath {
            world,
            parent_note: Some((*parent).to_string()),
            note: (*note).to_string(),
            title: title.to_string(),
        }),
        _ => None,
    }
}

/// Deterministic note id derived from naming, used when a pulled tree has
/// no metadata record for the note.
pub fn derived_note_id(world: World, parent_note: Option<&str>, name: &str) -> String {
    match parent_note {
        Some(parent) => format!("note:{}/{}/{}", world.namespace(), parent, name),
        None => format!("note:{}/{}", world.namespace(), name),
    }
}

/// Deterministic leaf id derived from the repository path.
pub fn derived_leaf_id(path: &str) -> String {
    format!("leaf:{}", path.strip_suffix(LEAF_EXTENSION).unwrap_or(path))
}
