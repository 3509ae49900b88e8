//! Sync failure classification.
//!
//! Every category is reported distinctly so callers can branch without a
//! generic catch-all: a conflict means "pull first", an auth failure means
//! "re-enter credentials", a network failure is retryable by the user.

use thiserror::Error;

/// Classified sync failure. Internal to the engine; the coordinator maps
/// these into tagged results before they reach a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Token or repository missing; rejected before any network call.
    #[error("settings incomplete: token and repository are required")]
    SettingsInvalid,

    /// Credentials rejected by the remote.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Transport-level failure (DNS, TLS, timeout, ...).
    #[error("network failure: {0}")]
    Network(String),

    /// The branch ref moved between read and write. The caller must pull
    /// before retrying; the engine never force-overwrites.
    #[error("branch ref moved since read; pull before retrying")]
    RefConflict,

    /// The repository has no commits yet. A valid terminal state for pull
    /// and stale checks, and the no-parent case for push.
    #[error("repository has no commits")]
    EmptyRepository,

    /// The recursive tree listing was truncated by the server, so a full
    /// manifest cannot be assembled.
    #[error("recursive tree listing truncated by server")]
    TreeTruncated,

    /// Any other remote API rejection.
    #[error("remote API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message reported by the remote, possibly empty.
        message: String,
    },

    /// Local failure while preparing a request (e.g. metadata could not
    /// be serialized). Not a remote condition.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Stable message key for UI toasts. Rendering/i18n is out of scope;
    /// keys are the contract.
    pub fn message_key(&self) -> &'static str {
        match self {
            SyncError::SettingsInvalid => "toast.settingsRequired",
            SyncError::Auth(_) => "toast.authError",
            SyncError::Network(_) => "toast.networkError",
            SyncError::RefConflict => "toast.pushConflict",
            SyncError::EmptyRepository => "toast.emptyRepository",
            SyncError::TreeTruncated => "toast.pullFailed",
            SyncError::Api { .. } => "toast.apiError",
            SyncError::Internal(_) => "toast.syncFailed",
        }
    }
}
