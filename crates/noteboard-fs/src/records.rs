use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use noteboard_core::{Error, NewNote, Note, RecordStore};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A note as stored on disk (without id - the file name is the id).
#[derive(Debug, Serialize, Deserialize)]
struct RecordFile {
    name: String,
    description: String,
    #[serde(default)]
    image_ref: Option<String>,
    created_at: String,
}

impl RecordFile {
    fn into_note(self, id: u64) -> Note {
        Note {
            id: id.to_string(),
            name: self.name,
            description: self.description,
            image_ref: self.image_ref,
            image_url: None,
            created_at: self.created_at,
        }
    }
}

/// File-based record store.
///
/// Each owner gets a directory of numbered JSON files plus a counter file,
/// so ids keep increasing after deletions. The counter is guarded by a
/// per-owner lock file.
pub struct FsRecordStore {
    root: PathBuf,
    owner_re: Regex,
}

impl FsRecordStore {
    /// Open a record store rooted at the given directory.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(&root)
            .map_err(|e| Error::Upstream(format!("Failed to create records dir: {}", e)))?;

        Ok(Self {
            root,
            owner_re: Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex"),
        })
    }

    /// Owner ids become directory names, so they get the same screening as
    /// any other path segment.
    fn owner_dir(&self, owner: &str) -> Result<PathBuf, Error> {
        if !self.owner_re.is_match(owner) {
            return Err(Error::Validation(format!("invalid owner id: {:?}", owner)));
        }
        Ok(self.root.join(owner))
    }

    /// Acquire an exclusive lock on an owner's directory.
    fn lock(dir: &Path) -> Result<FileLock, Error> {
        let lock_path = dir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| Error::Upstream(format!("Failed to open lock file: {}", e)))?;

        file.lock_exclusive()
            .map_err(|e| Error::Upstream(format!("Failed to acquire lock: {}", e)))?;

        Ok(FileLock { file })
    }

    fn record_path(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("{}.json", id))
    }

    /// Get the next available record id.
    /// Uses a counter file so ids always increase, even after deletions.
    fn next_id(dir: &Path) -> Result<u64, Error> {
        let counter_path = dir.join("counter");

        // Read existing counter, or scan the directory if it doesn't exist
        let current_max = if counter_path.exists() {
            let contents = fs::read_to_string(&counter_path)
                .map_err(|e| Error::Upstream(format!("Failed to read counter: {}", e)))?;
            contents.trim().parse::<u64>().unwrap_or(0)
        } else {
            let mut max_id: u64 = 0;
            if let Ok(entries) = fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if let Some(stem) = path.file_stem() {
                        if let Some(stem_str) = stem.to_str() {
                            if let Ok(id) = stem_str.parse::<u64>() {
                                max_id = max_id.max(id);
                            }
                        }
                    }
                }
            }
            max_id
        };

        let next_id = current_max + 1;

        fs::write(&counter_path, next_id.to_string())
            .map_err(|e| Error::Upstream(format!("Failed to write counter: {}", e)))?;

        Ok(next_id)
    }

    /// Read a record file from disk. `Ok(None)` when the file is gone,
    /// which can happen when a delete races a list.
    fn read_record_file(path: &Path) -> Result<Option<RecordFile>, Error> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Upstream(format!("Failed to read record: {}", e)))?;

        let record: RecordFile = serde_json::from_str(&contents)
            .map_err(|e| Error::Upstream(format!("Failed to parse record: {}", e)))?;

        Ok(Some(record))
    }

    /// Write a record file to disk atomically.
    fn write_record_file(dir: &Path, id: u64, record: &RecordFile) -> Result<(), Error> {
        let path = Self::record_path(dir, id);
        let temp_path = dir.join(format!("{}.json.tmp", id));

        let contents = serde_json::to_string_pretty(record)
            .map_err(|e| Error::Upstream(format!("Failed to serialize record: {}", e)))?;

        let mut file = File::create(&temp_path)
            .map_err(|e| Error::Upstream(format!("Failed to create temp file: {}", e)))?;

        file.write_all(contents.as_bytes())
            .map_err(|e| Error::Upstream(format!("Failed to write temp file: {}", e)))?;

        file.sync_all()
            .map_err(|e| Error::Upstream(format!("Failed to sync temp file: {}", e)))?;

        fs::rename(&temp_path, &path)
            .map_err(|e| Error::Upstream(format!("Failed to rename temp file: {}", e)))?;

        Ok(())
    }

    fn now() -> String {
        Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// RAII guard for file locking.
struct FileLock {
    file: File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[async_trait::async_trait(?Send)]
impl RecordStore for FsRecordStore {
    async fn list(&self, owner: &str) -> Result<Vec<Note>, Error> {
        let dir = self.owner_dir(owner)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir)
            .map_err(|e| Error::Upstream(format!("Failed to read records dir: {}", e)))?;

        let mut notes: Vec<(u64, Note)> = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| Error::Upstream(format!("Failed to read dir entry: {}", e)))?;
            let path = entry.path();

            if !path.extension().map(|e| e == "json").unwrap_or(false) {
                continue;
            }
            let id = match path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                Some(id) => id,
                None => continue,
            };

            if let Some(record) = Self::read_record_file(&path)? {
                notes.push((id, record.into_note(id)));
            }
        }

        // Newest first; ids break ties within the same second
        notes.sort_by(|a, b| {
            b.1.created_at
                .cmp(&a.1.created_at)
                .then_with(|| b.0.cmp(&a.0))
        });

        Ok(notes.into_iter().map(|(_, note)| note).collect())
    }

    async fn create(&self, owner: &str, note: NewNote) -> Result<Note, Error> {
        let dir = self.owner_dir(owner)?;
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Upstream(format!("Failed to create owner dir: {}", e)))?;

        let _lock = Self::lock(&dir)?;

        let id = Self::next_id(&dir)?;
        let record = RecordFile {
            name: note.name,
            description: note.description,
            image_ref: note.image_ref,
            created_at: Self::now(),
        };

        Self::write_record_file(&dir, id, &record)?;
        debug!(owner, id, "stored record");

        Ok(record.into_note(id))
    }

    async fn delete(&self, owner: &str, id: &str) -> Result<(), Error> {
        let dir = self.owner_dir(owner)?;
        let numeric: u64 = id
            .parse()
            .map_err(|_| Error::NotFound(format!("no note with id {}", id)))?;

        if !dir.exists() {
            return Err(Error::NotFound(format!("no note with id {}", id)));
        }

        let _lock = Self::lock(&dir)?;

        let path = Self::record_path(&dir, numeric);
        if !path.exists() {
            return Err(Error::NotFound(format!("no note with id {}", id)));
        }

        fs::remove_file(&path)
            .map_err(|e| Error::Upstream(format!("Failed to delete record: {}", e)))?;
        debug!(owner, id, "deleted record");

        Ok(())
    }
}
