use crate::traits::Uid;

/// Failures surfaced by the mail session and caught at the poll cycle
/// boundary. None of these terminate the loop.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// Network or transport failure, including a session that dropped
    /// mid-cycle. The next cycle reconnects.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server rejected the configured credentials.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The configured folder cannot be selected.
    #[error("folder {folder:?} unavailable: {reason}")]
    Folder { folder: String, reason: String },

    /// One message is structurally unreadable. Scoped to a single UID so the
    /// rest of the batch keeps flowing.
    #[error("message {uid} could not be decoded: {reason}")]
    Decode { uid: Uid, reason: String },
}
