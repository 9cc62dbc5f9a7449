use serde::{Deserialize, Serialize};

use crate::Error;

/// An authenticated user context. Every record and blob operation is scoped
/// to the session's user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque principal identifier; namespaces record ownership and storage keys.
    pub user_id: String,
    /// Display name for greetings.
    pub username: String,
}

/// Identity provider abstraction. Sign-in happens outside this crate; the
/// provider only reports the active session and ends it.
#[async_trait::async_trait(?Send)]
pub trait SessionProvider {
    /// The active session, or `None` when signed out.
    async fn current(&self) -> Result<Option<Session>, Error>;

    /// End the active session. Signing out while signed out is not an error.
    async fn sign_out(&self) -> Result<(), Error>;
}
