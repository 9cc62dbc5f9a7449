//! In-memory store implementations for tests.
//!
//! Both stores are cheap to clone: clones share state, so a test can hand a
//! store to a [`NoteBoard`](crate::NoteBoard) and keep a handle for
//! assertions. Call counters and single-shot failure injection let tests
//! check which backend calls happened, not just their combined outcome.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::Utc;

use crate::{BlobStore, Error, NewNote, Note, RecordStore};

fn now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Default)]
struct RecordState {
    notes: Vec<(String, Note)>,
    next_id: u64,
    list_calls: usize,
    create_calls: usize,
    delete_calls: usize,
    fail_next_list: Option<Error>,
    fail_next_create: Option<Error>,
    fail_next_delete: Option<Error>,
}

#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    state: Rc<RefCell<RecordState>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list_calls(&self) -> usize {
        self.state.borrow().list_calls
    }

    pub fn create_calls(&self) -> usize {
        self.state.borrow().create_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.state.borrow().delete_calls
    }

    /// Make the next `list` call fail with `err`. One-shot.
    pub fn fail_next_list(&self, err: Error) {
        self.state.borrow_mut().fail_next_list = Some(err);
    }

    pub fn fail_next_create(&self, err: Error) {
        self.state.borrow_mut().fail_next_create = Some(err);
    }

    pub fn fail_next_delete(&self, err: Error) {
        self.state.borrow_mut().fail_next_delete = Some(err);
    }
}

#[async_trait::async_trait(?Send)]
impl RecordStore for MemoryRecordStore {
    async fn list(&self, owner: &str) -> Result<Vec<Note>, Error> {
        let mut state = self.state.borrow_mut();
        state.list_calls += 1;
        if let Some(err) = state.fail_next_list.take() {
            return Err(err);
        }
        Ok(state
            .notes
            .iter()
            .filter(|(o, _)| o == owner)
            .map(|(_, note)| note.clone())
            .collect())
    }

    async fn create(&self, owner: &str, note: NewNote) -> Result<Note, Error> {
        let mut state = self.state.borrow_mut();
        state.create_calls += 1;
        if let Some(err) = state.fail_next_create.take() {
            return Err(err);
        }
        state.next_id += 1;
        let note = Note {
            id: state.next_id.to_string(),
            name: note.name,
            description: note.description,
            image_ref: note.image_ref,
            image_url: None,
            created_at: now(),
        };
        state.notes.push((owner.to_string(), note.clone()));
        Ok(note)
    }

    async fn delete(&self, owner: &str, id: &str) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        state.delete_calls += 1;
        if let Some(err) = state.fail_next_delete.take() {
            return Err(err);
        }
        let before = state.notes.len();
        state.notes.retain(|(o, note)| !(o == owner && note.id == id));
        if state.notes.len() == before {
            return Err(Error::NotFound(format!("no note with id {id}")));
        }
        Ok(())
    }
}

#[derive(Default)]
struct BlobState {
    objects: BTreeMap<String, (Vec<u8>, String)>,
    upload_calls: usize,
    display_url_calls: usize,
    remove_calls: usize,
    fail_next_upload: Option<Error>,
    fail_next_display_url: Option<Error>,
    fail_next_remove: Option<Error>,
}

#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    state: Rc<RefCell<BlobState>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.borrow().objects.contains_key(key)
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.state
            .borrow()
            .objects
            .get(key)
            .map(|(_, ct)| ct.clone())
    }

    pub fn upload_calls(&self) -> usize {
        self.state.borrow().upload_calls
    }

    pub fn display_url_calls(&self) -> usize {
        self.state.borrow().display_url_calls
    }

    pub fn remove_calls(&self) -> usize {
        self.state.borrow().remove_calls
    }

    pub fn fail_next_upload(&self, err: Error) {
        self.state.borrow_mut().fail_next_upload = Some(err);
    }

    pub fn fail_next_display_url(&self, err: Error) {
        self.state.borrow_mut().fail_next_display_url = Some(err);
    }

    pub fn fail_next_remove(&self, err: Error) {
        self.state.borrow_mut().fail_next_remove = Some(err);
    }
}

#[async_trait::async_trait(?Send)]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        state.upload_calls += 1;
        if let Some(err) = state.fail_next_upload.take() {
            return Err(err);
        }
        state
            .objects
            .insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(())
    }

    async fn display_url(&self, key: &str) -> Result<String, Error> {
        let mut state = self.state.borrow_mut();
        state.display_url_calls += 1;
        if let Some(err) = state.fail_next_display_url.take() {
            return Err(err);
        }
        if !state.objects.contains_key(key) {
            return Err(Error::NotFound(format!("no blob at {key}")));
        }
        Ok(format!("memory://{key}"))
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        state.remove_calls += 1;
        if let Some(err) = state.fail_next_remove.take() {
            return Err(err);
        }
        if state.objects.remove(key).is_none() {
            return Err(Error::NotFound(format!("no blob at {key}")));
        }
        Ok(())
    }
}
