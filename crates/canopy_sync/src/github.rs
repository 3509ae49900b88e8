//! GitHub REST client for the git data API.
//!
//! Thin, typed wrappers over the endpoints the engine needs: get-ref,
//! get-commit, get-tree (recursive), create-tree, create-commit,
//! update-ref, create-ref, and the legacy single-file content lookup.
//! Authentication is a bearer token from [`Settings`]. Every response
//! updates the rate-limit side channel so callers can warn proactively
//! even when an operation succeeds.

use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Response, StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use canopy_core::model::Settings;

use crate::error::SyncError;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const DEFAULT_BRANCH: &str = "main";
const USER_AGENT: &str = "canopy-sync";

/// All calls fail via the network-error path after this timeout; no retry
/// or backoff is layered on top.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote rate-limit snapshot parsed from response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    /// Requests remaining in the current window.
    pub remaining: u64,
    /// Window size.
    pub limit: u64,
    /// Unix timestamp at which the window resets.
    pub reset: u64,
}

/// A desired file in the rebuilt tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTreeEntry {
    /// Fully-qualified repository path.
    pub path: String,
    /// UTF-8 file content.
    pub content: String,
}

/// Authenticated client for one repository.
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    repository: String,
    token: String,
    branch: String,
    committer_name: String,
    committer_email: String,
    rate_limit: Mutex<Option<RateLimitInfo>>,
}

impl GitHubClient {
    /// Build a client from settings.
    ///
    /// Fails with [`SyncError::SettingsInvalid`] before any network call
    /// when the token or repository is missing.
    pub fn new(settings: &Settings) -> Result<Self, SyncError> {
        if !settings.is_configured() {
            return Err(SyncError::SettingsInvalid);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;
        let (committer_name, committer_email) = settings.committer();
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            repository: settings.repository.clone(),
            token: settings.token.clone(),
            branch: DEFAULT_BRANCH.to_string(),
            committer_name,
            committer_email,
            rate_limit: Mutex::new(None),
        })
    }

    /// Point the client at a different API host (tests, GHE).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Rate-limit information from the most recent response, if any.
    pub fn last_rate_limit(&self) -> Option<RateLimitInfo> {
        self.rate_limit.lock().ok().and_then(|guard| *guard)
    }

    /// Resolve the branch ref to its current commit SHA.
    ///
    /// This is the cheapest possible remote lookup (no tree or blob fetch)
    /// and doubles as the staleness probe. An empty repository (no commits
    /// on the branch) is reported as [`SyncError::EmptyRepository`].
    pub async fn get_head(&self) -> Result<String, SyncError> {
        let url = self.url(&format!("git/ref/heads/{}", self.branch));
        let response = self.send(self.http.get(&url)).await?;
        match response.status() {
            status if status.is_success() => {
                let body: GitRefResponse = Self::decode(response).await?;
                Ok(body.object.sha)
            }
            // 409 is the documented empty-repository answer; a 404 on the
            // ref means the branch has no commits yet.
            StatusCode::CONFLICT | StatusCode::NOT_FOUND => {
                debug!(branch = %self.branch, "branch ref absent, treating repository as empty");
                Err(SyncError::EmptyRepository)
            }
            _ => Err(Self::fail(response).await),
        }
    }

    /// Resolve a commit to its root tree SHA.
    pub async fn get_commit(&self, sha: &str) -> Result<CommitInfo, SyncError> {
        let url = self.url(&format!("git/commits/{sha}"));
        let response = self.send(self.http.get(&url)).await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        let body: CommitResponse = Self::decode(response).await?;
        Ok(CommitInfo {
            sha: body.sha,
            tree_sha: body.tree.sha,
        })
    }

    /// Enumerate the full manifest under a tree, recursively.
    ///
    /// Content is not fetched here; entries carry blob SHAs for later
    /// retrieval. A truncated listing means the manifest is incomplete and
    /// the pull cannot proceed correctly.
    pub async fn get_tree_recursive(&self, tree_sha: &str) -> Result<Vec<TreeEntry>, SyncError> {
        let url = self.url(&format!("git/trees/{tree_sha}?recursive=1"));
        let response = self.send(self.http.get(&url)).await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        let body: TreeResponse = Self::decode(response).await?;
        if body.truncated {
            return Err(SyncError::TreeTruncated);
        }
        Ok(body.tree)
    }

    /// Fetch and decode one blob as UTF-8 text.
    pub async fn get_blob(&self, sha: &str) -> Result<String, SyncError> {
        let url = self.url(&format!("git/blobs/{sha}"));
        let response = self.send(self.http.get(&url)).await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        let body: BlobResponse = Self::decode(response).await?;
        // The API wraps base64 at 60 columns.
        let compact: String = body.content.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = BASE64.decode(compact.as_bytes()).map_err(|e| SyncError::Api {
            status: 200,
            message: format!("invalid blob encoding for {sha}: {e}"),
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Build a brand-new tree object from a flat, fully-qualified path
    /// list in a single call.
    ///
    /// The submitted list is authoritative for the tracked namespace:
    /// omission of a previously-existing path is deletion, so no separate
    /// delete operations and no enumeration of prior files are needed.
    pub async fn create_tree(&self, entries: &[NewTreeEntry]) -> Result<String, SyncError> {
        #[derive(Serialize)]
        struct WireEntry<'a> {
            path: &'a str,
            mode: &'static str,
            #[serde(rename = "type")]
            kind: &'static str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Body<'a> {
            tree: Vec<WireEntry<'a>>,
        }

        let body = Body {
            tree: entries
                .iter()
                .map(|entry| WireEntry {
                    path: &entry.path,
                    mode: "100644",
                    kind: "blob",
                    content: &entry.content,
                })
                .collect(),
        };
        let url = self.url("git/trees");
        let response = self.send(self.http.post(&url).json(&body)).await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        let created: CreatedObject = Self::decode(response).await?;
        Ok(created.sha)
    }

    /// Create a commit object pointing at `tree_sha`.
    ///
    /// `parent` is `None` only when the repository has no commits yet.
    pub async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parent: Option<&str>,
    ) -> Result<String, SyncError> {
        #[derive(Serialize)]
        struct Committer<'a> {
            name: &'a str,
            email: &'a str,
        }
        #[derive(Serialize)]
        struct Body<'a> {
            message: &'a str,
            tree: &'a str,
            parents: Vec<&'a str>,
            committer: Committer<'a>,
        }

        let body = Body {
            message,
            tree: tree_sha,
            parents: parent.into_iter().collect(),
            committer: Committer {
                name: &self.committer_name,
                email: &self.committer_email,
            },
        };
        let url = self.url("git/commits");
        let response = self.send(self.http.post(&url).json(&body)).await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        let created: CreatedObject = Self::decode(response).await?;
        Ok(created.sha)
    }

    /// Fast-forward the branch ref to `sha`.
    ///
    /// Never forced. A 422 means the ref moved since it was read
    /// (concurrent write) and is surfaced as [`SyncError::RefConflict`].
    pub async fn update_ref(&self, sha: &str) -> Result<(), SyncError> {
        #[derive(Serialize)]
        struct Body<'a> {
            sha: &'a str,
            force: bool,
        }

        let url = self.url(&format!("git/refs/heads/{}", self.branch));
        let response = self
            .send(self.http.patch(&url).json(&Body { sha, force: false }))
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNPROCESSABLE_ENTITY => Err(SyncError::RefConflict),
            _ => Err(Self::fail(response).await),
        }
    }

    /// Create the branch ref, used for the very first commit of an empty
    /// repository.
    pub async fn create_ref(&self, sha: &str) -> Result<(), SyncError> {
        #[derive(Serialize)]
        struct Body<'a> {
            #[serde(rename = "ref")]
            git_ref: String,
            sha: &'a str,
        }

        let url = self.url("git/refs");
        let body = Body {
            git_ref: format!("refs/heads/{}", self.branch),
            sha,
        };
        let response = self.send(self.http.post(&url).json(&body)).await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        Ok(())
    }

    /// Legacy single-file lookup: blob SHA of a path on the default
    /// branch, or `None` when the file does not exist.
    pub async fn get_content_sha(&self, path: &str) -> Result<Option<String>, SyncError> {
        let url = self.url(&format!("contents/{path}"));
        let response = self.send(self.http.get(&url)).await?;
        match response.status() {
            status if status.is_success() => {
                let body: ContentResponse = Self::decode(response).await?;
                Ok(Some(body.sha))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::fail(response).await),
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/repos/{}/{}", self.base_url, self.repository, suffix)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, SyncError> {
        let response = request
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;
        self.record_rate_limit(response.headers());
        Ok(response)
    }

    fn record_rate_limit(&self, headers: &header::HeaderMap) {
        let Some(info) = parse_rate_limit(headers) else {
            return;
        };
        if let Ok(mut guard) = self.rate_limit.lock() {
            *guard = Some(info);
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, SyncError> {
        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::Network(format!("malformed API response: {e}")))
    }

    /// Classify a non-success response that no caller handled specially.
    async fn fail(response: Response) -> SyncError {
        let status = response.status().as_u16();
        let message = response
            .json::<ApiErrorBody>()
            .await
            .map(|body| body.message)
            .unwrap_or_default();
        match status {
            401 | 403 => SyncError::Auth(message),
            _ => SyncError::Api { status, message },
        }
    }
}

fn parse_rate_limit(headers: &header::HeaderMap) -> Option<RateLimitInfo> {
    let field = |name: &str| -> Option<u64> {
        headers.get(name)?.to_str().ok()?.trim().parse().ok()
    };
    Some(RateLimitInfo {
        remaining: field("x-ratelimit-remaining")?,
        limit: field("x-ratelimit-limit")?,
        reset: field("x-ratelimit-reset")?,
    })
}

/// A commit with its root tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Commit SHA.
    pub sha: String,
    /// Root tree SHA.
    pub tree_sha: String,
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    /// Repository path.
    pub path: String,
    /// `blob` or `tree`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Object SHA; absent for some entry kinds.
    #[serde(default)]
    pub sha: Option<String>,
}

impl TreeEntry {
    /// Whether this entry is a file.
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

#[derive(Deserialize)]
struct GitRefResponse {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
    tree: GitObject,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct BlobResponse {
    content: String,
}

#[derive(Deserialize)]
struct CreatedObject {
    sha: String,
}

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}
