use async_trait::async_trait;

use crate::error::MailError;
use crate::message::DecodedMessage;

/// Server-assigned message identifier: the IMAP UID within the selected
/// folder. Only comparable while UIDVALIDITY stays the same.
pub type Uid = u32;

/// What a successful connect reports back to the poll loop.
#[derive(Debug, Clone, Default)]
pub struct ConnectSummary {
    /// Every message currently in the folder, used to seed the seen set.
    pub existing: Vec<Uid>,
    /// UIDVALIDITY of the selected folder, when the server reports one.
    pub uid_validity: Option<u32>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailSource: Send {
    /// Establishes the authenticated session and selects the configured
    /// folder. Calling this while connected tears down the old session first.
    async fn connect(&mut self) -> Result<ConnectSummary, MailError>;

    /// IDs of messages the server currently reports as unread. Does not
    /// mutate any state.
    async fn list_unseen(&mut self) -> Result<Vec<Uid>, MailError>;

    /// Retrieves and decodes a single message.
    async fn fetch_and_decode(&mut self, uid: Uid) -> Result<DecodedMessage, MailError>;

    /// Best-effort logout. The session is unusable afterwards.
    async fn close(&mut self);
}
