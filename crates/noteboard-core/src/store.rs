use crate::{Error, NewNote, Note};

/// Record store abstraction over the managed data backend.
///
/// Uses `async_trait` with a `?Send` bound: the board runs on a
/// single-threaded runtime, and implementations may hold non-`Send` handles
/// (WASM bindings, `Rc` state in tests).
///
/// Every operation takes the owning user id; implementations must scope all
/// reads and writes to that owner.
#[async_trait::async_trait(?Send)]
pub trait RecordStore {
    /// List all notes owned by `owner`, in server-defined order.
    async fn list(&self, owner: &str) -> Result<Vec<Note>, Error>;

    /// Insert a new note record and return it with its server-assigned id
    /// and creation timestamp.
    async fn create(&self, owner: &str, note: NewNote) -> Result<Note, Error>;

    /// Delete a note by id. `NotFound` when `owner` has no such note.
    async fn delete(&self, owner: &str, id: &str) -> Result<(), Error>;
}

/// Blob store abstraction over the managed object storage backend.
#[async_trait::async_trait(?Send)]
pub trait BlobStore {
    /// Store `bytes` under `key` with the declared content type.
    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), Error>;

    /// Mint a time-limited, directly fetchable URL for the blob at `key`.
    /// `NotFound` when the blob does not exist.
    async fn display_url(&self, key: &str) -> Result<String, Error>;

    /// Remove the blob at `key`. `NotFound` when it does not exist.
    async fn remove(&self, key: &str) -> Result<(), Error>;
}
