//! # Canopy Sync Engine
//!
//! Bidirectional synchronization between the local note tree and a
//! git-hosted repository that is the single source of truth.
//!
//! This crate provides:
//! - **Push**: the complete desired state becomes one atomic commit via a
//!   tree rebuild, in a bounded number of API calls ([`push`]).
//! - **Pull**: manifest-first download with priority-ordered blob fetches
//!   and progress reporting ([`pull`]).
//! - **Staleness**: commit-identity comparison against the remote HEAD,
//!   never content diffing ([`stale`]).
//! - **Coordinator**: the public entry point returning tagged results;
//!   no error crosses the sync boundary as a panic ([`coordinator`]).
//!
//! Concurrency model: push is strictly sequential (the caller holds the
//! at-most-one-in-flight lock); pull may fetch blobs concurrently within a
//! bounded pool, priority partition strictly before the rest. No retry or
//! backoff is performed internally.

#![warn(missing_docs)]

pub mod coordinator;
pub mod error;
pub mod github;
pub mod pull;
pub mod push;
pub mod snapshot;
pub mod stale;

pub use coordinator::{
    ArchiveData, PullResult, PushRequest, PushResult, SyncCoordinator, Variant,
};
pub use error::SyncError;
pub use github::{GitHubClient, RateLimitInfo};
pub use pull::{PullFailure, PullOptions, PullProgress};
pub use snapshot::SyncSnapshot;
pub use stale::{HeadLookup, StaleCheckResult};
