//! Staleness oracle: commit-identity comparison against the remote HEAD.
//!
//! "Stale" means the local view is known to be older than the remote
//! history: pull on one device, push from another, keep editing on the
//! first. Detection compares the remote HEAD commit SHA with the SHA
//! recorded at the last successful sync — never content hashes — so
//! out-of-band `git push`es are detected too. The probe is a single
//! get-ref call and is reused as the first step of push and pull.

use canopy_core::model::Settings;

use crate::error::SyncError;
use crate::github::GitHubClient;

/// Outcome of the minimal remote-HEAD probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadLookup {
    /// The branch resolves to a commit.
    Success {
        /// Remote HEAD commit SHA.
        commit_sha: String,
    },
    /// The repository has no commits yet.
    EmptyRepository,
    /// Token or repository missing; no call was made.
    SettingsInvalid,
    /// Credentials rejected.
    AuthError(String),
    /// Transport failure.
    NetworkError(String),
}

impl HeadLookup {
    fn from_result(result: Result<String, SyncError>) -> Self {
        match result {
            Ok(commit_sha) => HeadLookup::Success { commit_sha },
            Err(SyncError::EmptyRepository) => HeadLookup::EmptyRepository,
            Err(SyncError::SettingsInvalid) => HeadLookup::SettingsInvalid,
            Err(SyncError::Auth(message)) => HeadLookup::AuthError(message),
            Err(SyncError::Network(message)) => HeadLookup::NetworkError(message),
            Err(other) => HeadLookup::NetworkError(other.to_string()),
        }
    }
}

/// Result of a staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleCheckResult {
    /// The remote has moved past the local view; pull before pushing.
    Stale {
        /// Remote HEAD commit SHA.
        remote_commit_sha: String,
        /// Commit SHA of the last local sync.
        local_commit_sha: String,
    },
    /// Local view matches the remote (or there is nothing to be stale
    /// against yet).
    UpToDate,
    /// The check itself failed; carries the original classification.
    CheckFailed {
        /// Why the remote HEAD could not be fetched.
        reason: HeadLookup,
    },
}

/// Probe the remote HEAD with an already-built client.
pub async fn head_lookup(client: &GitHubClient) -> HeadLookup {
    HeadLookup::from_result(client.get_head().await)
}

/// Probe the remote HEAD from settings alone.
pub async fn fetch_remote_head(settings: &Settings) -> HeadLookup {
    match GitHubClient::new(settings) {
        Ok(client) => head_lookup(&client).await,
        Err(_) => HeadLookup::SettingsInvalid,
    }
}

/// Apply the staleness decision table to a probe result.
///
/// | probe                | last known sha | result       |
/// |----------------------|----------------|--------------|
/// | success, sha differs | non-null       | `Stale`      |
/// | success, sha equal   | any            | `UpToDate`   |
/// | success              | null           | `UpToDate`   |
/// | empty repository     | any            | `UpToDate`   |
/// | any failure          | any            | `CheckFailed`|
///
/// A null `last_known_commit_sha` means the device never synced, which is
/// optimistically treated as not stale. An empty repository means nobody
/// has pushed yet, likewise not stale.
pub fn evaluate(lookup: HeadLookup, last_known_commit_sha: Option<&str>) -> StaleCheckResult {
    match lookup {
        HeadLookup::Success { commit_sha } => match last_known_commit_sha {
            Some(local) if local != commit_sha => StaleCheckResult::Stale {
                remote_commit_sha: commit_sha,
                local_commit_sha: local.to_string(),
            },
            _ => StaleCheckResult::UpToDate,
        },
        HeadLookup::EmptyRepository => StaleCheckResult::UpToDate,
        reason => StaleCheckResult::CheckFailed { reason },
    }
}
