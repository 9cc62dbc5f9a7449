use futures::future;
use tracing::{debug, warn};

use crate::{BlobStore, Error, NewNote, Note, PendingImage, RecordStore, Session};

/// Transient state of the creation form. Cleared only after a successful
/// creation, so a failed submission can be retried as-is.
#[derive(Debug, Default)]
pub struct NoteForm {
    pub name: String,
    pub description: String,
    pub image: Option<PendingImage>,
}

/// The note board controller: owns the note snapshot and the creation form,
/// and mediates list/create/delete against the record and blob stores.
///
/// Constructing a board requires an authenticated [`Session`]; a signed-out
/// caller has nothing to render and no owner to scope operations to.
pub struct NoteBoard<R: RecordStore, B: BlobStore> {
    session: Session,
    records: R,
    blobs: B,
    notes: Vec<Note>,
    form: NoteForm,
}

impl<R: RecordStore, B: BlobStore> NoteBoard<R, B> {
    pub fn new(session: Session, records: R, blobs: B) -> Self {
        Self {
            session,
            records,
            blobs,
            notes: Vec::new(),
            form: NoteForm::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The snapshot from the last successful [`refresh`](Self::refresh),
    /// in the record store's order.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn form(&self) -> &NoteForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut NoteForm {
        &mut self.form
    }

    /// Fetch the user's notes and resolve a display URL for every attached
    /// image, then replace the snapshot wholesale.
    ///
    /// URL resolutions run concurrently and are all awaited before the
    /// snapshot is touched; on any failure the previous snapshot is kept and
    /// the error returned. A missing blob is not a failure: the note stays in
    /// the list without its URL.
    pub async fn refresh(&mut self) -> Result<(), Error> {
        let records = self.records.list(&self.session.user_id).await?;
        let resolved =
            future::join_all(records.into_iter().map(|note| self.resolve_image(note))).await;
        let notes = resolved.into_iter().collect::<Result<Vec<_>, _>>()?;
        debug!(count = notes.len(), "refreshed note snapshot");
        self.notes = notes;
        Ok(())
    }

    async fn resolve_image(&self, mut note: Note) -> Result<Note, Error> {
        let Some(key) = note.image_ref.as_deref() else {
            return Ok(note);
        };
        match self.blobs.display_url(key).await {
            Ok(url) => {
                note.image_url = Some(url);
                Ok(note)
            }
            Err(Error::NotFound(_)) => {
                // Blob is gone: keep the note, just without its image.
                warn!(note_id = %note.id, key, "image blob missing, note rendered without it");
                note.image_url = None;
                Ok(note)
            }
            Err(e) => Err(e),
        }
    }

    /// Validate the form, upload the staged image (if any), insert the
    /// record, then clear the form and refresh.
    ///
    /// Validation runs before any store call; an invalid form never touches
    /// the backend. On any failure the form is left intact for retry. An
    /// upload failure aborts before the record insert.
    pub async fn create_note(&mut self) -> Result<Note, Error> {
        let name = self.form.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("name cannot be empty".into()));
        }
        let description = self.form.description.trim().to_string();
        if description.is_empty() {
            return Err(Error::Validation("description cannot be empty".into()));
        }

        let image_ref = match &self.form.image {
            Some(image) => {
                let key = image.storage_key(&self.session.user_id);
                self.blobs
                    .upload(&key, &image.bytes, &image.content_type)
                    .await?;
                Some(key)
            }
            None => None,
        };

        let new_note = NewNote {
            name,
            description,
            image_ref: image_ref.clone(),
        };
        let created = match self.records.create(&self.session.user_id, new_note).await {
            Ok(note) => note,
            Err(e) => {
                // The insert failed after the upload: the blob is orphaned.
                // Known gap, no compensating delete.
                if let Some(key) = &image_ref {
                    warn!(key, "record insert failed, uploaded blob left orphaned");
                }
                return Err(e);
            }
        };

        debug!(note_id = %created.id, "created note");
        self.form = NoteForm::default();
        self.refresh().await?;
        Ok(created)
    }

    /// Remove the note's blob (best-effort), delete the record, then refresh.
    ///
    /// Blob-removal failure is logged and does not stop the record delete.
    /// A failed record delete returns without refreshing, preserving the
    /// prior snapshot.
    pub async fn delete_note(&mut self, id: &str, image_ref: Option<&str>) -> Result<(), Error> {
        if let Some(key) = image_ref {
            if let Err(e) = self.blobs.remove(key).await {
                warn!(note_id = id, key, error = %e, "blob removal failed, deleting record anyway");
            }
        }

        self.records.delete(&self.session.user_id, id).await?;
        debug!(note_id = id, "deleted note");
        self.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryBlobStore, MemoryRecordStore};

    fn session() -> Session {
        Session {
            user_id: "user-1".to_string(),
            username: "sam".to_string(),
        }
    }

    fn board_with(
        records: MemoryRecordStore,
        blobs: MemoryBlobStore,
    ) -> NoteBoard<MemoryRecordStore, MemoryBlobStore> {
        NoteBoard::new(session(), records, blobs)
    }

    fn png(file_name: &str) -> PendingImage {
        PendingImage {
            file_name: file_name.to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![0x89, 0x50, 0x4e, 0x47],
        }
    }

    #[tokio::test]
    async fn test_create_and_list_without_image() {
        let records = MemoryRecordStore::new();
        let blobs = MemoryBlobStore::new();
        let mut board = board_with(records, blobs.clone());

        board.form_mut().name = "Groceries".to_string();
        board.form_mut().description = "Milk, eggs".to_string();
        let created = board.create_note().await.unwrap();

        assert_eq!(board.notes().len(), 1);
        let note = &board.notes()[0];
        assert_eq!(note.id, created.id);
        assert_eq!(note.name, "Groceries");
        assert_eq!(note.description, "Milk, eggs");
        assert_eq!(note.image_ref, None);
        assert_eq!(note.image_url, None);
        assert_eq!(blobs.upload_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_clears_form() {
        let mut board = board_with(MemoryRecordStore::new(), MemoryBlobStore::new());

        board.form_mut().name = "Groceries".to_string();
        board.form_mut().description = "Milk, eggs".to_string();
        board.form_mut().image = Some(png("photo.png"));
        board.create_note().await.unwrap();

        assert!(board.form().name.is_empty());
        assert!(board.form().description.is_empty());
        assert!(board.form().image.is_none());
    }

    #[tokio::test]
    async fn test_empty_name_makes_no_store_calls() {
        let records = MemoryRecordStore::new();
        let blobs = MemoryBlobStore::new();
        let mut board = board_with(records.clone(), blobs.clone());

        board.form_mut().description = "Milk, eggs".to_string();
        board.form_mut().image = Some(png("photo.png"));
        let err = board.create_note().await.unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(records.create_calls(), 0);
        assert_eq!(blobs.upload_calls(), 0);
        // Form survives for retry.
        assert_eq!(board.form().description, "Milk, eggs");
        assert!(board.form().image.is_some());
    }

    #[tokio::test]
    async fn test_blank_description_makes_no_store_calls() {
        let records = MemoryRecordStore::new();
        let blobs = MemoryBlobStore::new();
        let mut board = board_with(records.clone(), blobs.clone());

        board.form_mut().name = "Groceries".to_string();
        board.form_mut().description = "   ".to_string();
        let err = board.create_note().await.unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(records.create_calls(), 0);
        assert_eq!(blobs.upload_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_with_image_uploads_under_user_key() {
        let blobs = MemoryBlobStore::new();
        let mut board = board_with(MemoryRecordStore::new(), blobs.clone());

        board.form_mut().name = "Trip".to_string();
        board.form_mut().description = "Beach".to_string();
        board.form_mut().image = Some(png("photo.png"));
        let created = board.create_note().await.unwrap();

        assert_eq!(created.image_ref.as_deref(), Some("media/user-1/photo.png"));
        assert!(blobs.contains("media/user-1/photo.png"));
        assert_eq!(
            blobs.content_type("media/user-1/photo.png").as_deref(),
            Some("image/png")
        );

        let note = &board.notes()[0];
        let url = note.image_url.as_deref().unwrap();
        assert!(!url.is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_aborts_before_insert() {
        let records = MemoryRecordStore::new();
        let blobs = MemoryBlobStore::new();
        let mut board = board_with(records.clone(), blobs.clone());

        blobs.fail_next_upload(Error::Upstream("storage unavailable".to_string()));
        board.form_mut().name = "Trip".to_string();
        board.form_mut().description = "Beach".to_string();
        board.form_mut().image = Some(png("photo.png"));
        let err = board.create_note().await.unwrap_err();

        assert!(matches!(err, Error::Upstream(_)));
        assert_eq!(records.create_calls(), 0);
        assert_eq!(board.form().name, "Trip");
        assert!(board.form().image.is_some());
    }

    #[tokio::test]
    async fn test_insert_failure_keeps_form() {
        let records = MemoryRecordStore::new();
        let mut board = board_with(records.clone(), MemoryBlobStore::new());

        records.fail_next_create(Error::Upstream("insert rejected".to_string()));
        board.form_mut().name = "Groceries".to_string();
        board.form_mut().description = "Milk".to_string();
        let err = board.create_note().await.unwrap_err();

        assert!(matches!(err, Error::Upstream(_)));
        assert_eq!(board.form().name, "Groceries");
        assert!(board.notes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_blob_degrades_to_no_image() {
        let records = MemoryRecordStore::new();
        let mut board = board_with(records.clone(), MemoryBlobStore::new());

        // Record points at a blob that was never uploaded.
        records
            .create(
                "user-1",
                NewNote {
                    name: "Trip".to_string(),
                    description: "Beach".to_string(),
                    image_ref: Some("media/user-1/gone.png".to_string()),
                },
            )
            .await
            .unwrap();

        board.refresh().await.unwrap();

        assert_eq!(board.notes().len(), 1);
        let note = &board.notes()[0];
        assert_eq!(note.image_ref.as_deref(), Some("media/user-1/gone.png"));
        assert_eq!(note.image_url, None);
    }

    #[tokio::test]
    async fn test_list_failure_keeps_previous_snapshot() {
        let records = MemoryRecordStore::new();
        let mut board = board_with(records.clone(), MemoryBlobStore::new());

        board.form_mut().name = "Groceries".to_string();
        board.form_mut().description = "Milk".to_string();
        let created = board.create_note().await.unwrap();
        assert_eq!(board.notes().len(), 1);

        records.fail_next_list(Error::Upstream("connection reset".to_string()));
        let err = board.refresh().await.unwrap_err();

        assert!(matches!(err, Error::Upstream(_)));
        assert_eq!(board.notes().len(), 1);
        assert_eq!(board.notes()[0].id, created.id);
    }

    #[tokio::test]
    async fn test_resolve_failure_fails_whole_refresh() {
        let blobs = MemoryBlobStore::new();
        let mut board = board_with(MemoryRecordStore::new(), blobs.clone());

        board.form_mut().name = "Trip".to_string();
        board.form_mut().description = "Beach".to_string();
        board.form_mut().image = Some(png("photo.png"));
        board.create_note().await.unwrap();
        let snapshot: Vec<String> = board.notes().iter().map(|n| n.id.clone()).collect();

        blobs.fail_next_display_url(Error::Upstream("timeout".to_string()));
        let err = board.refresh().await.unwrap_err();

        assert!(matches!(err, Error::Upstream(_)));
        let after: Vec<String> = board.notes().iter().map(|n| n.id.clone()).collect();
        assert_eq!(after, snapshot);
    }

    #[tokio::test]
    async fn test_delete_removes_note_and_blob() {
        let blobs = MemoryBlobStore::new();
        let mut board = board_with(MemoryRecordStore::new(), blobs.clone());

        board.form_mut().name = "Trip".to_string();
        board.form_mut().description = "Beach".to_string();
        board.form_mut().image = Some(png("photo.png"));
        let created = board.create_note().await.unwrap();

        board
            .delete_note(&created.id, created.image_ref.as_deref())
            .await
            .unwrap();

        assert!(board.notes().is_empty());
        assert!(!blobs.contains("media/user-1/photo.png"));
    }

    #[tokio::test]
    async fn test_delete_without_image_skips_blob_store() {
        let blobs = MemoryBlobStore::new();
        let mut board = board_with(MemoryRecordStore::new(), blobs.clone());

        board.form_mut().name = "Groceries".to_string();
        board.form_mut().description = "Milk".to_string();
        let created = board.create_note().await.unwrap();

        board.delete_note(&created.id, None).await.unwrap();

        assert!(board.notes().is_empty());
        assert_eq!(blobs.remove_calls(), 0);
    }

    #[tokio::test]
    async fn test_blob_removal_failure_is_not_fatal() {
        let blobs = MemoryBlobStore::new();
        let mut board = board_with(MemoryRecordStore::new(), blobs.clone());

        board.form_mut().name = "Trip".to_string();
        board.form_mut().description = "Beach".to_string();
        board.form_mut().image = Some(png("photo.png"));
        let created = board.create_note().await.unwrap();

        blobs.fail_next_remove(Error::Upstream("storage unavailable".to_string()));
        board
            .delete_note(&created.id, created.image_ref.as_deref())
            .await
            .unwrap();

        // Record delete went ahead despite the blob failure.
        assert!(board.notes().is_empty());
    }

    #[tokio::test]
    async fn test_record_delete_failure_preserves_snapshot() {
        let records = MemoryRecordStore::new();
        let mut board = board_with(records.clone(), MemoryBlobStore::new());

        board.form_mut().name = "Groceries".to_string();
        board.form_mut().description = "Milk".to_string();
        let created = board.create_note().await.unwrap();
        let lists_before = records.list_calls();

        records.fail_next_delete(Error::Upstream("conflict".to_string()));
        let err = board.delete_note(&created.id, None).await.unwrap_err();

        assert!(matches!(err, Error::Upstream(_)));
        assert_eq!(board.notes().len(), 1);
        // No refresh after a failed delete.
        assert_eq!(records.list_calls(), lists_before);
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_not_found() {
        let mut board = board_with(MemoryRecordStore::new(), MemoryBlobStore::new());

        let err = board.delete_note("no-such-id", None).await.unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_snapshot_preserves_store_order() {
        let records = MemoryRecordStore::new();
        let mut board = board_with(records.clone(), MemoryBlobStore::new());

        for name in ["first", "second", "third"] {
            board.form_mut().name = name.to_string();
            board.form_mut().description = "body".to_string();
            board.create_note().await.unwrap();
        }

        let names: Vec<&str> = board.notes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_notes_are_scoped_to_the_session_user() {
        let records = MemoryRecordStore::new();

        records
            .create(
                "someone-else",
                NewNote {
                    name: "Private".to_string(),
                    description: "Not yours".to_string(),
                    image_ref: None,
                },
            )
            .await
            .unwrap();

        let mut board = board_with(records.clone(), MemoryBlobStore::new());
        board.refresh().await.unwrap();

        assert!(board.notes().is_empty());
    }
}
