/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: watcher.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-09 11:02:17
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-14 09:41:52
 */

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::broadcast;

use crate::dispatch::{DispatchOutcome, Handler};
use crate::error::MailError;
use crate::traits::{ConnectSummary, MailSource, Uid};

/// How many times a message that fails to decode is retried before it is
/// given up on and marked seen.
const MAX_DECODE_ATTEMPTS: u32 = 3;

/// Drives a [`MailSource`] forever at a fixed cadence and dispatches each
/// newly arrived message to the registered handler exactly once.
pub struct MailWatcher {
    source: Box<dyn MailSource>,
    handler: Handler,
    poll_interval: Duration,
    seen: HashSet<Uid>,
    decode_attempts: HashMap<Uid, u32>,
    uid_validity: Option<u32>,
    seeded: bool,
    connected: bool,
}

impl MailWatcher {
    pub fn new(source: Box<dyn MailSource>, handler: Handler, poll_interval: Duration) -> Self {
        Self {
            source,
            handler,
            poll_interval,
            seen: HashSet::new(),
            decode_attempts: HashMap::new(),
            uid_validity: None,
            seeded: false,
            connected: false,
        }
    }

    /// Runs the poll loop until a shutdown signal arrives. The signal is
    /// honored both while sleeping and between cycles.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("polling every {:?}", self.poll_interval);
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("shutdown signal received, stopping poll loop");
                    break;
                }
                _ = ticker.tick() => {}
            }

            // One failed cycle must never take the loop down
            if let Err(e) = self.poll_once().await {
                error!("poll cycle failed: {e}");
            }
        }

        self.source.close().await;
    }

    /// Starts the poll loop on its own named OS thread with its own
    /// current-thread runtime, so a slow server or large mailbox never
    /// stalls the caller's scheduler.
    pub fn spawn(self) -> anyhow::Result<WatcherHandle> {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let thread = std::thread::Builder::new()
            .name("mail-watcher".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("failed to build poll runtime: {e}");
                        return;
                    }
                };
                runtime.block_on(self.run(shutdown_rx));
            })
            .map_err(|e| anyhow::anyhow!("failed to spawn watcher thread: {e}"))?;

        Ok(WatcherHandle {
            shutdown: shutdown_tx,
            thread: Some(thread),
        })
    }

    async fn poll_once(&mut self) -> Result<(), MailError> {
        if !self.connected {
            let summary = self.source.connect().await?;
            self.absorb_connect(summary);
        }

        let unseen = match self.source.list_unseen().await {
            Ok(uids) => uids,
            Err(e) => {
                self.connected = false;
                return Err(e);
            }
        };

        let fresh: Vec<Uid> = unseen
            .into_iter()
            .filter(|uid| !self.seen.contains(uid))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }
        info!("{} new message(s)", fresh.len());

        for uid in fresh {
            match self.source.fetch_and_decode(uid).await {
                Ok(message) => {
                    if let DispatchOutcome::Completed(Err(e)) = self.handler.dispatch(uid, message)
                    {
                        error!("handler failed for message {uid}: {e:#}");
                    }
                    // Seen as soon as dispatch is issued, not when the
                    // handler finishes
                    self.seen.insert(uid);
                    self.decode_attempts.remove(&uid);
                }
                Err(e @ MailError::Decode { .. }) => {
                    let attempts = self.decode_attempts.entry(uid).or_insert(0);
                    *attempts += 1;
                    if *attempts >= MAX_DECODE_ATTEMPTS {
                        error!("giving up on message {uid} after {attempts} attempts: {e}");
                        self.seen.insert(uid);
                        self.decode_attempts.remove(&uid);
                    } else {
                        warn!("skipping message {uid}, will retry next cycle: {e}");
                    }
                }
                Err(e) => {
                    // Lost the connection mid-cycle; the UIDs not yet marked
                    // seen are picked up again after the reconnect
                    self.connected = false;
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    fn absorb_connect(&mut self, summary: ConnectSummary) {
        let validity_changed = match (self.uid_validity, summary.uid_validity) {
            (Some(old), Some(new)) => old != new,
            _ => false,
        };
        if validity_changed {
            // UIDs are only comparable within one UIDVALIDITY epoch
            warn!("UIDVALIDITY changed, rebuilding seen set");
        }

        if !self.seeded || validity_changed {
            self.seen = summary.existing.into_iter().collect();
            self.decode_attempts.clear();
            self.seeded = true;
        }

        self.uid_validity = summary.uid_validity;
        self.connected = true;
    }
}

/// Owns the watcher thread. Dropping the handle without calling
/// [`WatcherHandle::stop`] also signals the loop to exit, but does not wait
/// for it.
pub struct WatcherHandle {
    shutdown: broadcast::Sender<()>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl WatcherHandle {
    /// Signals the loop and waits for the thread to finish its cycle.
    pub fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
#[path = "./watcher_tests.rs"]
mod watcher_tests;
