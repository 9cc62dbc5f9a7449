use serde::{Deserialize, Serialize};

/// Prefix under which uploaded images are keyed in the blob store.
pub const MEDIA_PREFIX: &str = "media";

/// A note owned by the current user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Opaque identifier assigned by the record store; never parsed client-side.
    pub id: String,
    pub name: String,
    pub description: String,
    /// Blob store key of the attached image. Set once at creation, never mutated.
    #[serde(default)]
    pub image_ref: Option<String>,
    /// Time-limited display URL for `image_ref`, resolved on every refresh and
    /// never persisted. `None` when there is no image or the blob is gone.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Creation timestamp assigned by the record store.
    pub created_at: String,
}

/// Fields for inserting a new note record.
#[derive(Debug, Clone)]
pub struct NewNote {
    pub name: String,
    pub description: String,
    pub image_ref: Option<String>,
}

/// An image staged on the form, waiting to be uploaded on submission.
#[derive(Debug, Clone)]
pub struct PendingImage {
    /// Original filename, used as the final storage key segment.
    pub file_name: String,
    /// Declared content type the blob is uploaded with (e.g. "image/png").
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PendingImage {
    /// Deterministic storage key for this image, namespaced by the owning
    /// user: `media/{user_id}/{file_name}`.
    pub fn storage_key(&self, user_id: &str) -> String {
        format!("{}/{}/{}", MEDIA_PREFIX, user_id, self.file_name)
    }
}
