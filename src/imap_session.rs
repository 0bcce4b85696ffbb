use crate::config::MailboxConfig;
use crate::error::MailError;
use crate::message::{DecodedMessage, decode_message};
use crate::traits::{ConnectSummary, MailSource, Uid};
use async_imap::Session;
use async_native_tls::{TlsConnector, TlsStream};
use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

type ImapSession = Session<TlsStream<Compat<TcpStream>>>;

/// IMAP-backed mail source holding at most one authenticated session.
///
/// Any protocol failure voids the held session; the poll loop reconnects on
/// its next cycle.
pub struct ImapMailSource {
    config: MailboxConfig,
    session: Option<ImapSession>,
}

impl ImapMailSource {
    pub fn new(config: MailboxConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    async fn establish(&self) -> Result<(ImapSession, ConnectSummary), MailError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let tcp_stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| MailError::Connection(format!("failed to connect to {addr}: {e}")))?;

        let tls = TlsConnector::new();
        let tls_stream = tls
            .connect(&self.config.host, tcp_stream.compat())
            .await
            .map_err(|e| MailError::Connection(format!("TLS handshake with {addr} failed: {e}")))?;

        let client = async_imap::Client::new(tls_stream);

        let mut session = client
            .login(&self.config.username, &self.config.password)
            .await
            .map_err(|e| MailError::Auth(format!("{:?}", e.0)))?;

        // Some providers refuse further commands until the client names
        // itself; a rejected ID is harmless elsewhere.
        if let Err(e) = session
            .run_command_and_check_ok("ID (\"name\" \"mail-watcher\" \"version\" \"0.1.0\")")
            .await
        {
            debug!("server rejected ID command: {e}");
        }

        let mailbox = session
            .select(&self.config.folder)
            .await
            .map_err(|e| MailError::Folder {
                folder: self.config.folder.clone(),
                reason: e.to_string(),
            })?;

        let existing = session
            .uid_search("ALL")
            .await
            .map_err(|e| MailError::Connection(format!("initial search failed: {e}")))?;

        let summary = ConnectSummary {
            existing: existing.into_iter().collect(),
            uid_validity: mailbox.uid_validity,
        };

        Ok((session, summary))
    }

    fn session_mut(&mut self) -> Result<&mut ImapSession, MailError> {
        self.session
            .as_mut()
            .ok_or_else(|| MailError::Connection("not connected".to_string()))
    }
}

#[async_trait]
impl MailSource for ImapMailSource {
    async fn connect(&mut self) -> Result<ConnectSummary, MailError> {
        if let Some(mut old) = self.session.take() {
            let _ = old.logout().await;
        }

        let (session, summary) = self.establish().await?;
        info!(
            "connected to {}, {} existing message(s) in {}",
            self.config.host,
            summary.existing.len(),
            self.config.folder
        );
        self.session = Some(session);
        Ok(summary)
    }

    async fn list_unseen(&mut self) -> Result<Vec<Uid>, MailError> {
        let session = self.session_mut()?;
        match session.uid_search("UNSEEN").await {
            Ok(uids) => Ok(uids.into_iter().collect()),
            Err(e) => {
                self.session = None;
                Err(MailError::Connection(format!("search failed: {e}")))
            }
        }
    }

    async fn fetch_and_decode(&mut self, uid: Uid) -> Result<DecodedMessage, MailError> {
        let session = self.session_mut()?;

        let fetched: Result<Vec<async_imap::types::Fetch>, async_imap::error::Error> = async {
            let stream = session.uid_fetch(uid.to_string(), "RFC822").await?;
            stream.collect::<Vec<_>>().await.into_iter().collect()
        }
        .await;

        let fetches = match fetched {
            Ok(fetches) => fetches,
            Err(e) => {
                self.session = None;
                return Err(MailError::Connection(format!(
                    "fetch of message {uid} failed: {e}"
                )));
            }
        };

        let raw = fetches
            .iter()
            .find_map(|fetch| fetch.body().map(|body| body.to_vec()))
            .ok_or_else(|| MailError::Decode {
                uid,
                reason: "server returned no payload".to_string(),
            })?;

        decode_message(uid, &raw)
    }

    async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.logout().await {
                warn!("logout failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod imap_source_tests {
    use super::*;

    // Live test, runs only when pointed at a real server:
    // MAIL_WATCHER_TEST_HOST / _USERNAME / _PASSWORD
    fn live_config() -> Option<MailboxConfig> {
        Some(MailboxConfig {
            host: std::env::var("MAIL_WATCHER_TEST_HOST").ok()?,
            port: 993,
            username: std::env::var("MAIL_WATCHER_TEST_USERNAME").ok()?,
            password: std::env::var("MAIL_WATCHER_TEST_PASSWORD").ok()?,
            folder: "INBOX".to_string(),
            poll_interval_seconds: 10,
        })
    }

    #[tokio::test]
    async fn test_live_connect_and_list() {
        let Some(config) = live_config() else {
            println!("Skipping live IMAP test - set MAIL_WATCHER_TEST_* to run");
            return;
        };

        let mut source = ImapMailSource::new(config);
        let summary = source.connect().await.unwrap();
        println!(
            "connected, {} existing, uidvalidity {:?}",
            summary.existing.len(),
            summary.uid_validity
        );

        let unseen = source.list_unseen().await.unwrap();
        println!("{} unseen message(s)", unseen.len());

        source.close().await;
    }
}
