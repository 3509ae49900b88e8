//! Command dispatch: status, push, pull, config.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::warn;

use canopy_core::error::CoreError;
use canopy_core::model::{Leaf, Metadata, Note, PullPriority, Settings, World};
use canopy_core::store::{ObjectStore, SettingsStore};
use canopy_sync::{ArchiveData, PullOptions, PushRequest, StaleCheckResult, SyncCoordinator};

use crate::store::{SyncState, Vault};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("no platform data directory; pass --data-dir")]
    NoDataDir,
    #[error("{0}")]
    Operation(String),
}

#[derive(Parser)]
#[command(name = "canopy", version, about = "Sync a local note tree with a git-hosted repository")]
struct Cli {
    /// Data directory (default: the platform data dir)
    #[arg(long, global = true, env = "CANOPY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether the local view is behind the remote
    Status,
    /// Push the complete local tree as one commit
    Push,
    /// Replace the local tree with the remote state
    Pull {
        /// Repository paths to fetch first (repeatable, in order)
        #[arg(long = "priority-path")]
        priority_paths: Vec<String>,
        /// Note ids whose leaves to fetch first (repeatable)
        #[arg(long = "priority-note")]
        priority_notes: Vec<String>,
    },
    /// Show or change sync settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current settings (token masked)
    Show,
    /// Set one or more settings
    Set {
        /// API bearer token
        #[arg(long)]
        token: Option<String>,
        /// Repository, `owner/name`
        #[arg(long)]
        repository: Option<String>,
        /// Committer name
        #[arg(long)]
        username: Option<String>,
        /// Committer email
        #[arg(long)]
        email: Option<String>,
    },
}

pub async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir().ok_or(CliError::NoDataDir)?.join("canopy"),
    };
    let vault = Vault::open(dir)?;

    match cli.command {
        Command::Status => status(&vault).await,
        Command::Push => push(&vault).await,
        Command::Pull {
            priority_paths,
            priority_notes,
        } => pull(&vault, priority_paths, priority_notes).await,
        Command::Config { action } => config(&vault, action),
    }
}

async fn status(vault: &Vault) -> Result<(), CliError> {
    let settings = vault.settings().load()?;
    let state = vault.load_sync_state()?;
    let last_sha = state.as_ref().and_then(|s| s.last_commit_sha.as_deref());

    let result = SyncCoordinator::new()
        .check_stale_status(&settings, last_sha)
        .await;
    match result {
        StaleCheckResult::UpToDate => println!("up to date"),
        StaleCheckResult::Stale {
            remote_commit_sha,
            local_commit_sha,
        } => {
            println!("stale: remote is at {remote_commit_sha}, last sync was {local_commit_sha}");
            println!("run `canopy pull` before pushing");
        }
        StaleCheckResult::CheckFailed { reason } => {
            return Err(CliError::Operation(format!("stale check failed: {reason:?}")));
        }
    }
    Ok(())
}

async fn push(vault: &Vault) -> Result<(), CliError> {
    let settings = vault.settings().load()?;
    let notes = vault.notes().load_all()?;
    let leaves = vault.leaves().load_all()?;
    let metadata = vault.metadata().load()?;
    let state = vault.load_sync_state()?;

    let (home_notes, archive_notes) = split_world(notes);
    let (archive_leaves, home_leaves): (Vec<Leaf>, Vec<Leaf>) = leaves
        .into_iter()
        .partition(|l| is_archive_leaf(l, &archive_notes));

    let previous = state
        .as_ref()
        .map(|s| s.snapshot.clone())
        .unwrap_or_default();
    let has_archive = !archive_notes.is_empty() || metadata.archive_loaded;

    let request = PushRequest {
        leaves: &home_leaves,
        notes: &home_notes,
        settings: &settings,
        operations_locked: state.is_none(),
        local_metadata: Some(&metadata),
        archive: has_archive.then_some(ArchiveData {
            leaves: &archive_leaves,
            notes: &archive_notes,
            metadata: &metadata,
        }),
        previous: &previous,
    };

    let result = SyncCoordinator::new().execute_push(request).await;
    warn_on_low_rate_limit(result.rate_limit_info.map(|r| r.remaining));
    if !result.success {
        return Err(CliError::Operation(describe(result.message).to_string()));
    }

    if let (Some(snapshot), Some(sha)) = (result.snapshot, result.commit_sha) {
        vault.save_sync_state(&SyncState {
            last_commit_sha: Some(sha.clone()),
            snapshot,
        })?;
        match (result.changed_leaf_count, result.metadata_only_changed) {
            (Some(0), Some(true)) => println!("pushed {sha}: metadata only"),
            (Some(changed), _) => println!("pushed {sha}: {changed} leaves changed"),
            _ => println!("pushed {sha}"),
        }
    }
    Ok(())
}

async fn pull(
    vault: &Vault,
    priority_paths: Vec<String>,
    priority_notes: Vec<String>,
) -> Result<(), CliError> {
    let settings = vault.settings().load()?;
    let priority = PullPriority {
        leaf_paths: priority_paths,
        note_ids: priority_notes,
    };
    let options = PullOptions {
        priority: (!priority.is_empty()).then_some(priority),
        on_progress: Some(Arc::new(|p| {
            eprint!("\rfetching leaves {}/{}", p.fetched, p.total);
            if p.fetched == p.total {
                eprintln!();
            }
            let _ = std::io::stderr().flush();
        })),
    };

    let result = SyncCoordinator::new().execute_pull(&settings, &options).await;
    warn_on_low_rate_limit(result.rate_limit_info.map(|r| r.remaining));
    if !result.success {
        return Err(CliError::Operation(describe(result.message).to_string()));
    }

    // The remote is authoritative: replace, never merge.
    vault.notes().replace_all(&result.notes)?;
    vault.leaves().replace_all(&result.leaves)?;
    vault.metadata().save(&result.metadata)?;
    vault.save_sync_state(&SyncState {
        last_commit_sha: result.commit_sha.clone(),
        snapshot: result.snapshot.unwrap_or_default(),
    })?;

    match result.commit_sha {
        Some(sha) => println!(
            "pulled {sha}: {} notes, {} leaves",
            result.notes.len(),
            result.leaves.len()
        ),
        None => println!("{}", describe(result.message)),
    }
    Ok(())
}

fn config(vault: &Vault, action: ConfigAction) -> Result<(), CliError> {
    match action {
        ConfigAction::Show => {
            let settings = vault.settings().load()?;
            println!("repository: {}", display_or_unset(&settings.repository));
            println!("username:   {}", display_or_unset(&settings.username));
            println!("email:      {}", display_or_unset(&settings.email));
            println!(
                "token:      {}",
                if settings.token.is_empty() { "(unset)" } else { "(set)" }
            );
            if !settings.is_configured() {
                println!("sync is not configured; set at least --token and --repository");
            }
        }
        ConfigAction::Set {
            token,
            repository,
            username,
            email,
        } => {
            let store = vault.settings();
            let mut settings = SettingsStore::load(&store)?;
            apply(&mut settings.token, token);
            apply(&mut settings.repository, repository);
            apply(&mut settings.username, username);
            apply(&mut settings.email, email);
            SettingsStore::save(&store, &settings)?;
            println!("settings saved");
        }
    }
    Ok(())
}

fn apply(field: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn display_or_unset(value: &str) -> &str {
    if value.is_empty() { "(unset)" } else { value }
}

fn split_world(notes: Vec<Note>) -> (Vec<Note>, Vec<Note>) {
    notes.into_iter().partition(|n| n.world != World::Archive)
}

/// Whether a leaf's owning note lives in the archive. Orphans count as
/// home; the push planner skips them anyway.
fn is_archive_leaf(leaf: &Leaf, archive_notes: &[Note]) -> bool {
    archive_notes.iter().any(|n| n.id == leaf.note_id)
}

fn warn_on_low_rate_limit(remaining: Option<u64>) {
    if let Some(remaining) = remaining
        && remaining < 20
    {
        warn!(remaining, "API rate limit nearly exhausted");
    }
}

/// Human rendering of the engine's stable message keys.
fn describe(key: &str) -> &str {
    match key {
        "toast.settingsRequired" => {
            "sync is not configured; run `canopy config set --token <token> --repository owner/name`"
        }
        "toast.authError" => "authentication failed; check the token",
        "toast.networkError" => "network error talking to the API",
        "toast.pushConflict" => "the remote moved during push; pull and try again",
        "toast.emptyRepository" => "the remote repository is empty",
        "toast.pullFailed" => "pull failed; the remote listing was unusable",
        "toast.apiError" => "the API rejected the request",
        "toast.syncFailed" => "sync failed",
        "toast.initialPullPending" => "run `canopy pull` once before pushing",
        "toast.noLeaves" => "nothing to push; the local tree has no leaves",
        "toast.pushed" => "push complete",
        "toast.pulled" => "pull complete",
        other => other,
    }
}
