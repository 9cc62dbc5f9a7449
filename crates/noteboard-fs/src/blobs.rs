use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use noteboard_core::{BlobStore, Error};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How long display URLs stay valid, mirroring the short-lived links a
/// hosted object store hands out.
const DEFAULT_URL_TTL_SECS: i64 = 900;

/// Sidecar stored next to each blob.
#[derive(Debug, Serialize, Deserialize)]
struct BlobMeta {
    content_type: String,
    uploaded: String,
}

/// File-based blob store.
///
/// Blobs land under the root at their slash-separated key; a `.meta`
/// sidecar next to each blob holds its content type and upload stamp.
/// Display URLs are `file://` links carrying an expiry timestamp and the
/// content type in the query string.
pub struct FsBlobStore {
    root: PathBuf,
    url_ttl_secs: i64,
    segment_re: Regex,
}

impl FsBlobStore {
    /// Open a blob store rooted at the given directory.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(&root)
            .map_err(|e| Error::Upstream(format!("Failed to create blobs dir: {}", e)))?;

        Ok(Self {
            root,
            url_ttl_secs: DEFAULT_URL_TTL_SECS,
            segment_re: Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex"),
        })
    }

    /// Override how long display URLs stay valid.
    pub fn with_url_ttl(mut self, secs: i64) -> Self {
        self.url_ttl_secs = secs;
        self
    }

    /// Map a key like `media/sam/photo.png` onto a path under the root.
    /// Every segment is screened, so a key can never escape the root.
    fn blob_path(&self, key: &str) -> Result<PathBuf, Error> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if !self.segment_re.is_match(segment) {
                return Err(Error::Validation(format!("invalid blob key: {:?}", key)));
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
        let mut os = path.as_os_str().to_os_string();
        os.push(suffix);
        PathBuf::from(os)
    }

    fn meta_path(path: &Path) -> PathBuf {
        Self::path_with_suffix(path, ".meta")
    }

    /// Write a file atomically: temp file, sync, rename.
    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
        let temp_path = Self::path_with_suffix(path, ".tmp");

        let mut file = File::create(&temp_path)
            .map_err(|e| Error::Upstream(format!("Failed to create temp file: {}", e)))?;

        file.write_all(bytes)
            .map_err(|e| Error::Upstream(format!("Failed to write temp file: {}", e)))?;

        file.sync_all()
            .map_err(|e| Error::Upstream(format!("Failed to sync temp file: {}", e)))?;

        fs::rename(&temp_path, path)
            .map_err(|e| Error::Upstream(format!("Failed to rename temp file: {}", e)))?;

        Ok(())
    }

    fn now() -> String {
        Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[async_trait::async_trait(?Send)]
impl BlobStore for FsBlobStore {
    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), Error> {
        let path = self.blob_path(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| Error::Validation(format!("invalid blob key: {:?}", key)))?;

        fs::create_dir_all(parent)
            .map_err(|e| Error::Upstream(format!("Failed to create blob dir: {}", e)))?;

        let meta = BlobMeta {
            content_type: content_type.to_string(),
            uploaded: Self::now(),
        };
        let meta_contents = serde_json::to_string_pretty(&meta)
            .map_err(|e| Error::Upstream(format!("Failed to serialize metadata: {}", e)))?;

        Self::write_atomic(&path, bytes)?;
        Self::write_atomic(&Self::meta_path(&path), meta_contents.as_bytes())?;

        debug!(key, size = bytes.len(), "stored blob");
        Ok(())
    }

    async fn display_url(&self, key: &str) -> Result<String, Error> {
        let path = self.blob_path(key)?;
        if !path.exists() {
            return Err(Error::NotFound(format!("no blob at {}", key)));
        }

        // A blob dropped in by hand has no sidecar; serve it anyway
        let content_type = fs::read_to_string(Self::meta_path(&path))
            .ok()
            .and_then(|s| serde_json::from_str::<BlobMeta>(&s).ok())
            .map(|meta| meta.content_type)
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let abs = fs::canonicalize(&path)
            .map_err(|e| Error::Upstream(format!("Failed to resolve blob path: {}", e)))?;
        let expires = Utc::now().timestamp() + self.url_ttl_secs;

        Ok(format!(
            "file://{}?expires={}&type={}",
            abs.display(),
            expires,
            content_type
        ))
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let path = self.blob_path(key)?;
        if !path.exists() {
            return Err(Error::NotFound(format!("no blob at {}", key)));
        }

        fs::remove_file(&path)
            .map_err(|e| Error::Upstream(format!("Failed to delete blob: {}", e)))?;
        // The sidecar may or may not exist
        let _ = fs::remove_file(Self::meta_path(&path));

        debug!(key, "removed blob");
        Ok(())
    }
}
