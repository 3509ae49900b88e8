//! # `canopy_core`
//!
//! Shared domain model for the Canopy clients.
//!
//! Canopy organizes markdown documents ("leaves") under a shallow folder
//! hierarchy ("notes", at most two levels deep), partitioned into a `home`
//! and an `archive` world. A git-hosted repository is the single source of
//! truth; the local stores defined here are caches that get fully replaced
//! on every successful pull.
//!
//! This crate carries no network code. It provides:
//! - the record types ([`model`]),
//! - the repository path codec ([`path`]),
//! - the persistence traits the sync engine and clients share ([`store`]).

#![warn(missing_docs)]

pub mod error;
pub mod model;
pub mod path;
pub mod store;

pub use error::CoreError;
pub use model::{
    Leaf, LeafMeta, Metadata, Note, NoteMeta, PullPriority, Settings, World, leaf_is_persistable,
};
