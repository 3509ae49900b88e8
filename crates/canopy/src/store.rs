//! JSON-file persistence under the platform data directory.
//!
//! One file per collection: `settings.json`, `notes.json`, `leaves.json`,
//! `metadata.json`, and `sync.json` (the last sync's commit SHA and
//! snapshot). A missing file reads as defaults; a pull rewrites the
//! collection files wholesale.

use std::fs;
use std::io::Write as _;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use canopy_core::error::CoreError;
use canopy_core::model::{Leaf, Metadata, Note, Settings};
use canopy_core::store::{ObjectStore, Record, SettingsStore};
use canopy_sync::SyncSnapshot;

/// Bookkeeping from the last successful sync. Its presence is what
/// unlocks push: until a pull has completed once, pushing could clobber
/// remote state this device has never seen.
#[derive(Debug, Clone, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// HEAD commit SHA at the last sync; `None` after pulling an empty
    /// repository.
    pub last_commit_sha: Option<String>,
    /// Comparison base for the next push.
    pub snapshot: SyncSnapshot,
}

/// All collection files under one data directory.
pub struct Vault {
    dir: PathBuf,
}

impl Vault {
    /// Open (creating if needed) the vault at `dir`.
    pub fn open(dir: PathBuf) -> Result<Self, CoreError> {
        fs::create_dir_all(&dir)
            .map_err(|e| CoreError::Store(format!("cannot create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    /// Settings file accessor.
    pub fn settings(&self) -> JsonFile<Settings> {
        JsonFile::new(self.dir.join("settings.json"))
    }

    /// Note collection accessor.
    pub fn notes(&self) -> JsonCollection<Note> {
        JsonCollection::new(self.dir.join("notes.json"))
    }

    /// Leaf collection accessor.
    pub fn leaves(&self) -> JsonCollection<Leaf> {
        JsonCollection::new(self.dir.join("leaves.json"))
    }

    /// Metadata file accessor.
    pub fn metadata(&self) -> JsonFile<Metadata> {
        JsonFile::new(self.dir.join("metadata.json"))
    }

    /// Sync state, or `None` before the first completed pull.
    pub fn load_sync_state(&self) -> Result<Option<SyncState>, CoreError> {
        let path = self.dir.join("sync.json");
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(read_json(&path)?))
    }

    /// Persist the sync state after a successful push or pull.
    pub fn save_sync_state(&self, state: &SyncState) -> Result<(), CoreError> {
        write_json(&self.dir.join("sync.json"), state)
    }
}

/// A single default-able document in one JSON file.
pub struct JsonFile<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Default + Serialize + DeserializeOwned> JsonFile<T> {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// Load the document, defaulting when the file is absent.
    pub fn load(&self) -> Result<T, CoreError> {
        if !self.path.exists() {
            return Ok(T::default());
        }
        read_json(&self.path)
    }

    /// Persist the document.
    pub fn save(&self, value: &T) -> Result<(), CoreError> {
        write_json(&self.path, value)
    }
}

impl SettingsStore for JsonFile<Settings> {
    fn load(&self) -> Result<Settings, CoreError> {
        JsonFile::load(self)
    }

    fn save(&self, settings: &Settings) -> Result<(), CoreError> {
        JsonFile::save(self, settings)
    }
}

/// A record collection in one JSON file, serialized as an array.
pub struct JsonCollection<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> JsonCollection<T>
where
    T: Record + Clone + Serialize + DeserializeOwned,
{
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    fn read(&self) -> Result<Vec<T>, CoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_json(&self.path)
    }

    fn write(&self, records: &[T]) -> Result<(), CoreError> {
        write_json(&self.path, &records)
    }
}

impl<T> ObjectStore<T> for JsonCollection<T>
where
    T: Record + Clone + Serialize + DeserializeOwned,
{
    fn load_all(&self) -> Result<Vec<T>, CoreError> {
        self.read()
    }

    fn replace_all(&self, records: &[T]) -> Result<(), CoreError> {
        self.write(records)
    }

    fn get(&self, key: &str) -> Result<Option<T>, CoreError> {
        Ok(self.read()?.into_iter().find(|r| r.key() == key))
    }

    fn put(&self, record: &T) -> Result<(), CoreError> {
        let mut records = self.read()?;
        match records.iter_mut().find(|r| r.key() == record.key()) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        self.write(&records)
    }

    fn delete(&self, key: &str) -> Result<bool, CoreError> {
        let mut records = self.read()?;
        let before = records.len();
        records.retain(|r| r.key() != key);
        let removed = records.len() != before;
        if removed {
            self.write(&records)?;
        }
        Ok(removed)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CoreError> {
    let bytes = fs::read(path)
        .map_err(|e| CoreError::Store(format!("cannot read {}: {e}", path.display())))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Write via a sibling temp file and rename, so a crash mid-write never
/// leaves a half-written collection.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp)
        .map_err(|e| CoreError::Store(format!("cannot write {}: {e}", tmp.display())))?;
    file.write_all(&json)
        .and_then(|_| file.flush())
        .map_err(|e| CoreError::Store(format!("cannot write {}: {e}", tmp.display())))?;
    drop(file);
    fs::rename(&tmp, path)
        .map_err(|e| CoreError::Store(format!("cannot replace {}: {e}", path.display())))?;
    Ok(())
}
