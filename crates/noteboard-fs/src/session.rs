use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use noteboard_core::{Error, Session, SessionProvider};
use regex::Regex;
use tracing::debug;

/// File-based session provider.
///
/// The active session is a single JSON file; signing out deletes it.
/// There is no password check: whoever can write the data directory owns
/// the sessions in it.
pub struct FsSessionProvider {
    path: PathBuf,
    username_re: Regex,
}

impl FsSessionProvider {
    /// Open a session provider storing its state in the given directory.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(&root)
            .map_err(|e| Error::Auth(format!("Failed to create session dir: {}", e)))?;

        Ok(Self {
            path: root.join("session.json"),
            username_re: Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex"),
        })
    }

    /// Start a session for `username`. The username doubles as the owner
    /// id, so a user's records and blobs stay stable across sign-ins.
    pub async fn sign_in(&self, username: &str) -> Result<Session, Error> {
        if !self.username_re.is_match(username) {
            return Err(Error::Validation(format!(
                "invalid username: {:?} (letters, digits, '.', '_' and '-' only)",
                username
            )));
        }

        let session = Session {
            user_id: username.to_string(),
            username: username.to_string(),
        };

        let contents = serde_json::to_string_pretty(&session)
            .map_err(|e| Error::Auth(format!("Failed to serialize session: {}", e)))?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = File::create(&temp_path)
            .map_err(|e| Error::Auth(format!("Failed to create temp file: {}", e)))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| Error::Auth(format!("Failed to write temp file: {}", e)))?;
        file.sync_all()
            .map_err(|e| Error::Auth(format!("Failed to sync temp file: {}", e)))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| Error::Auth(format!("Failed to rename temp file: {}", e)))?;

        debug!(username, "signed in");
        Ok(session)
    }
}

#[async_trait::async_trait(?Send)]
impl SessionProvider for FsSessionProvider {
    async fn current(&self) -> Result<Option<Session>, Error> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| Error::Auth(format!("Failed to read session: {}", e)))?;

        let session: Session = serde_json::from_str(&contents)
            .map_err(|e| Error::Auth(format!("Corrupt session file: {}", e)))?;

        Ok(Some(session))
    }

    async fn sign_out(&self) -> Result<(), Error> {
        if !self.path.exists() {
            // Already signed out
            return Ok(());
        }

        fs::remove_file(&self.path)
            .map_err(|e| Error::Auth(format!("Failed to clear session: {}", e)))?;

        debug!("signed out");
        Ok(())
    }
}
