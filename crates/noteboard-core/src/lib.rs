//! Note board core library - shared types, contracts, and the controller.
//!
//! This crate contains no I/O: the record store, blob store, and identity
//! provider live behind the contracts defined here.

mod board;
mod error;
mod note;
mod session;
mod store;

pub mod testing;

pub use board::{NoteBoard, NoteForm};
pub use error::Error;
pub use note::{NewNote, Note, PendingImage, MEDIA_PREFIX};
pub use session::{Session, SessionProvider};
pub use store::{BlobStore, RecordStore};
