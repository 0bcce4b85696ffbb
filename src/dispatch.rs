use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use log::error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::message::DecodedMessage;
use crate::traits::Uid;

type DirectFn = dyn Fn(Uid, DecodedMessage) -> anyhow::Result<()> + Send;
type ScheduledFn = dyn Fn(Uid, DecodedMessage) -> BoxFuture<'static, anyhow::Result<()>> + Send;

/// A registered new-message handler. The variant is fixed at registration
/// time, so dispatch picks its path once, not per message.
///
/// `Direct` runs to completion on the poll loop's own thread. `Scheduled` is
/// submitted to the runtime that owns the handler; the poll loop never waits
/// for it.
pub enum Handler {
    Direct(Box<DirectFn>),
    Scheduled {
        runtime: Handle,
        run: Box<ScheduledFn>,
    },
}

impl Handler {
    pub fn direct<F>(f: F) -> Self
    where
        F: Fn(Uid, DecodedMessage) -> anyhow::Result<()> + Send + 'static,
    {
        Handler::Direct(Box::new(f))
    }

    pub fn scheduled<F, Fut>(runtime: Handle, f: F) -> Self
    where
        F: Fn(Uid, DecodedMessage) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Handler::Scheduled {
            runtime,
            run: Box::new(move |uid, message| Box::pin(f(uid, message))),
        }
    }

    /// Hands one decoded message to the handler.
    ///
    /// A `Scheduled` handler is spawned onto its runtime (safe from any
    /// thread) and a ticket for the pending outcome is returned immediately.
    /// Dropping the ticket detaches the task; the spawned wrapper still logs
    /// its own failure.
    pub fn dispatch(&self, uid: Uid, message: DecodedMessage) -> DispatchOutcome {
        match self {
            Handler::Direct(run) => DispatchOutcome::Completed(run(uid, message)),
            Handler::Scheduled { runtime, run } => {
                let fut = run(uid, message);
                let task = runtime.spawn(async move {
                    let result = fut.await;
                    if let Err(e) = &result {
                        error!("scheduled handler failed for message {uid}: {e:#}");
                    }
                    result
                });
                DispatchOutcome::Submitted(DispatchTicket { task })
            }
        }
    }
}

/// What one dispatch produced: a finished direct call, or a pending
/// submission to a foreign runtime.
pub enum DispatchOutcome {
    Completed(anyhow::Result<()>),
    Submitted(DispatchTicket),
}

/// Pending outcome of a scheduled dispatch.
pub struct DispatchTicket {
    task: JoinHandle<anyhow::Result<()>>,
}

impl DispatchTicket {
    /// Waits for the handler, giving up after `timeout`. Exceeding the
    /// timeout fails this one dispatch only.
    pub async fn wait(self, timeout: Duration) -> anyhow::Result<()> {
        match tokio::time::timeout(timeout, self.task).await {
            Err(_) => anyhow::bail!("handler did not finish within {timeout:?}"),
            Ok(Err(e)) => anyhow::bail!("handler task was cancelled or panicked: {e}"),
            Ok(Ok(result)) => result,
        }
    }
}
