//! Public entry point for sync operations.
//!
//! Enforces preconditions before any network call, delegates to the push
//! and pull engines, and maps every outcome — success or failure — into a
//! tagged result. No error crosses this boundary as a panic or a bare
//! `Err`; callers branch on the classification.
//!
//! The at-most-one-in-flight-push invariant is a caller-held lock: the
//! coordinator itself is stateless and cheap to construct.

use canopy_core::model::{Leaf, Metadata, Note, Settings};

use crate::error::SyncError;
use crate::github::{GitHubClient, RateLimitInfo};
use crate::pull::{self, PullFailure, PullOptions};
use crate::push::{self, ArchiveInput, PushInput};
use crate::snapshot::SyncSnapshot;
use crate::stale::{self, HeadLookup, StaleCheckResult};

/// Toast flavor for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Operation landed.
    Success,
    /// Operation failed; `message` says how.
    Error,
}

/// Result of [`SyncCoordinator::execute_push`].
#[derive(Debug, Clone)]
pub struct PushResult {
    /// Whether the push landed.
    pub success: bool,
    /// Stable message key (i18n rendering is the caller's concern).
    pub message: &'static str,
    /// Toast flavor.
    pub variant: Variant,
    /// Rate-limit side channel, present whenever the remote was reached.
    pub rate_limit_info: Option<RateLimitInfo>,
    /// Leaves whose content changed; `Some` only on success.
    pub changed_leaf_count: Option<usize>,
    /// True when only ordering/settings metadata changed.
    pub metadata_only_changed: Option<bool>,
    /// New HEAD commit SHA, for staleness bookkeeping.
    pub commit_sha: Option<String>,
    /// Snapshot to persist as the next comparison base.
    pub snapshot: Option<SyncSnapshot>,
}

impl PushResult {
    fn failure(message: &'static str, rate_limit_info: Option<RateLimitInfo>) -> Self {
        Self {
            success: false,
            message,
            variant: Variant::Error,
            rate_limit_info,
            changed_leaf_count: None,
            metadata_only_changed: None,
            commit_sha: None,
            snapshot: None,
        }
    }
}

/// Result of [`SyncCoordinator::execute_pull`].
///
/// On success the remote is authoritative: the caller must fully replace
/// the local cache (delete-then-recreate), never merge. On failure the
/// collections are empty and `metadata` holds whatever could be salvaged.
#[derive(Debug, Clone)]
pub struct PullResult {
    /// Whether the pull completed (an empty repository counts).
    pub success: bool,
    /// Stable message key.
    pub message: &'static str,
    /// Toast flavor.
    pub variant: Variant,
    /// Pulled notes, both worlds.
    pub notes: Vec<Note>,
    /// Pulled leaves, both worlds.
    pub leaves: Vec<Leaf>,
    /// Recovered (or default) metadata.
    pub metadata: Metadata,
    /// Rate-limit side channel.
    pub rate_limit_info: Option<RateLimitInfo>,
    /// HEAD commit SHA; `None` for an empty repository.
    pub commit_sha: Option<String>,
    /// Snapshot to persist as the next comparison base.
    pub snapshot: Option<SyncSnapshot>,
}

/// Archive-world data for a push, supplied only once loaded.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveData<'a> {
    /// Archive leaves.
    pub leaves: &'a [Leaf],
    /// Archive notes.
    pub notes: &'a [Note],
    /// Archive metadata flags.
    pub metadata: &'a Metadata,
}

/// Everything a push needs, borrowed from the caller's in-memory state.
/// Push never touches the local stores.
#[derive(Debug, Clone, Copy)]
pub struct PushRequest<'a> {
    /// Home-world leaves (complete desired set).
    pub leaves: &'a [Leaf],
    /// Home-world notes.
    pub notes: &'a [Note],
    /// Settings carrying credentials.
    pub settings: &'a Settings,
    /// True while the initial pull has not completed.
    pub operations_locked: bool,
    /// Home metadata flags; defaults when absent.
    pub local_metadata: Option<&'a Metadata>,
    /// Archive subtree, when loaded.
    pub archive: Option<ArchiveData<'a>>,
    /// Snapshot from the last successful sync.
    pub previous: &'a SyncSnapshot,
}

/// Stateless facade over the sync engines.
#[derive(Debug, Clone, Default)]
pub struct SyncCoordinator {
    base_url: Option<String>,
}

impl SyncCoordinator {
    /// Coordinator against the public API host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Coordinator against a different API host (tests, GHE).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
        }
    }

    fn client(&self, settings: &Settings) -> Result<GitHubClient, SyncError> {
        let client = GitHubClient::new(settings)?;
        Ok(match &self.base_url {
            Some(base) => client.with_base_url(base.clone()),
            None => client,
        })
    }

    /// Push the complete desired state as one atomic commit.
    ///
    /// Preconditions are checked before any network call: a held
    /// operations lock (initial pull still running) and an empty leaf set
    /// are both rejected locally.
    pub async fn execute_push(&self, request: PushRequest<'_>) -> PushResult {
        if request.operations_locked {
            return PushResult::failure("toast.initialPullPending", None);
        }
        if request.leaves.is_empty() {
            return PushResult::failure("toast.noLeaves", None);
        }

        let client = match self.client(request.settings) {
            Ok(client) => client,
            Err(e) => return PushResult::failure(e.message_key(), None),
        };

        let default_metadata = Metadata::default();
        let input = PushInput {
            leaves: request.leaves,
            notes: request.notes,
            metadata: request.local_metadata.unwrap_or(&default_metadata),
            archive: request.archive.map(|a| ArchiveInput {
                leaves: a.leaves,
                notes: a.notes,
                metadata: a.metadata,
            }),
            previous: request.previous,
        };

        match push::push_all(&client, input).await {
            Ok(outcome) => PushResult {
                success: true,
                message: "toast.pushed",
                variant: Variant::Success,
                rate_limit_info: client.last_rate_limit(),
                changed_leaf_count: Some(outcome.changed_leaf_count),
                metadata_only_changed: Some(outcome.metadata_only_changed),
                commit_sha: Some(outcome.commit_sha),
                snapshot: Some(outcome.snapshot),
            },
            Err(e) => PushResult::failure(e.message_key(), client.last_rate_limit()),
        }
    }

    /// Pull the full remote state, priority leaves first.
    pub async fn execute_pull(&self, settings: &Settings, options: &PullOptions) -> PullResult {
        let client = match self.client(settings) {
            Ok(client) => client,
            Err(e) => return Self::pull_failure(e.message_key(), None, Metadata::default()),
        };

        match pull::pull_all(&client, options).await {
            Ok(outcome) => PullResult {
                success: true,
                message: "toast.pulled",
                variant: Variant::Success,
                notes: outcome.notes,
                leaves: outcome.leaves,
                metadata: outcome.metadata,
                rate_limit_info: client.last_rate_limit(),
                commit_sha: Some(outcome.commit_sha),
                snapshot: Some(outcome.snapshot),
            },
            // Nobody has pushed yet: a valid terminal state, not an error.
            Err(PullFailure {
                error: SyncError::EmptyRepository,
                ..
            }) => PullResult {
                success: true,
                message: "toast.emptyRepository",
                variant: Variant::Success,
                notes: Vec::new(),
                leaves: Vec::new(),
                metadata: Metadata::default(),
                rate_limit_info: client.last_rate_limit(),
                commit_sha: None,
                snapshot: Some(SyncSnapshot::default()),
            },
            Err(failure) => Self::pull_failure(
                failure.error.message_key(),
                client.last_rate_limit(),
                failure.metadata,
            ),
        }
    }

    /// Check whether the local view has fallen behind the remote history.
    pub async fn check_stale_status(
        &self,
        settings: &Settings,
        last_known_commit_sha: Option<&str>,
    ) -> StaleCheckResult {
        let client = match self.client(settings) {
            Ok(client) => client,
            Err(_) => {
                return StaleCheckResult::CheckFailed {
                    reason: HeadLookup::SettingsInvalid,
                };
            }
        };
        stale::evaluate(stale::head_lookup(&client).await, last_known_commit_sha)
    }

    fn pull_failure(
        message: &'static str,
        rate_limit_info: Option<RateLimitInfo>,
        metadata: Metadata,
    ) -> PullResult {
        PullResult {
            success: false,
            message,
            variant: Variant::Error,
            notes: Vec::new(),
            leaves: Vec::new(),
            metadata,
            rate_limit_info,
            commit_sha: None,
            snapshot: None,
        }
    }
}
