//! File-based storage backends for the note board.
//!
//! Everything lives under a single data directory:
//!
//! ```text
//! .noteboard/
//!   session.json             # active session, absent when signed out
//!   records/
//!     sam/
//!       .lock                # guards the id counter
//!       counter
//!       1.json
//!       2.json
//!   blobs/
//!     media/
//!       sam/
//!         photo.png
//!         photo.png.meta     # content type sidecar
//! ```
//!
//! Records and blobs are keyed by owner, so several users can share one
//! data directory. Writes go through a temp file and an atomic rename.

mod blobs;
mod records;
mod session;

pub use blobs::FsBlobStore;
pub use records::FsRecordStore;
pub use session::FsSessionProvider;
