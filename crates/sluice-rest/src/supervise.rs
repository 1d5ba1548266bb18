use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant as TickInstant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::RestClient;

/// Most recent liveness observation of the local tunnel client, delivered
/// from whatever manages the local client process.
#[derive(Debug, Clone, Copy)]
pub struct ClientStatus {
    pub connected: bool,
    /// When the connection state last changed.
    pub last_change: Instant,
}

/// Handle to a running tunnel.
///
/// Returned by [`RestClient::create`] once the tunnel reaches the running
/// state; at that point its two supervision tasks are already detached and
/// running. Dropping the handle cancels both tasks.
pub struct Tunnel {
    id: String,
    host: Option<String>,
    client: RestClient,
    server_status: mpsc::Receiver<String>,
    client_status: mpsc::Sender<ClientStatus>,
    cancel: CancellationToken,
    swallowed_errors: Arc<AtomicU64>,
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("id", &self.id)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl Tunnel {
    pub(crate) fn start(client: RestClient, id: String, host: Option<String>) -> Self {
        let (terminal_tx, terminal_rx) = mpsc::channel(1);
        let (liveness_tx, liveness_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let swallowed_errors = Arc::new(AtomicU64::new(0));

        let intervals = client.intervals;
        tokio::spawn(poll_server_status(
            client.clone(),
            id.clone(),
            intervals.status,
            terminal_tx,
            cancel.clone(),
            swallowed_errors.clone(),
        ));
        tokio::spawn(report_heartbeats(
            client.clone(),
            id.clone(),
            intervals.heartbeat,
            liveness_rx,
            cancel.clone(),
            swallowed_errors.clone(),
        ));

        Self {
            id,
            host,
            client,
            server_status: terminal_rx,
            client_status: liveness_tx,
            cancel,
            swallowed_errors,
        }
    }

    /// Identifier assigned by the service at creation. Never reused.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Host serving the tunnel, reported by the poll that first saw it
    /// running.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Deliver a fresh liveness observation to the heartbeat activity,
    /// which reports it immediately. Ignored once supervision has stopped.
    pub async fn update_client_status(&self, status: ClientStatus) {
        let _ = self.client_status.send(status).await;
    }

    /// Wait for the remote side to leave the running state.
    ///
    /// Yields the terminal status string exactly once, then `None` forever.
    /// `None` without a prior value means supervision was stopped
    /// externally.
    pub async fn wait_terminated(&mut self) -> Option<String> {
        self.server_status.recv().await
    }

    /// Shut down this tunnel remotely; returns the number of jobs that were
    /// still running.
    pub async fn shutdown(&self, wait_for_jobs: bool) -> Result<u64, crate::RestError> {
        self.client.shutdown(&self.id, wait_for_jobs).await
    }

    /// How many supervision requests have failed and been swallowed so far.
    pub fn swallowed_errors(&self) -> u64 {
        self.swallowed_errors.load(Ordering::Relaxed)
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Poll the remote status until it leaves `running`, then deliver the
/// terminal status exactly once and stop. Poll failures are swallowed;
/// a single failed poll never stops the activity.
async fn poll_server_status(
    client: RestClient,
    id: String,
    every: Duration,
    terminal: mpsc::Sender<String>,
    cancel: CancellationToken,
    errors: Arc<AtomicU64>,
) {
    let mut ticker = interval_at(TickInstant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        match client.status(&id).await {
            Ok(status) if status.is_running() => {}
            Ok(status) => {
                tracing::info!(%id, status = %status.status, "tunnel left the running state");
                let _ = terminal.send(status.status).await;
                return;
            }
            Err(err) => {
                errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%id, error = %err, "status poll failed");
            }
        }
    }
}

/// Report heartbeats on a fixed cadence, and immediately whenever a fresh
/// liveness update arrives. Failures are swallowed the same way as status
/// polls.
async fn report_heartbeats(
    client: RestClient,
    id: String,
    every: Duration,
    mut updates: mpsc::Receiver<ClientStatus>,
    cancel: CancellationToken,
    errors: Arc<AtomicU64>,
) {
    // Until the first update arrives the client counts as never connected,
    // with the state change pinned to loop start.
    let mut latest = ClientStatus {
        connected: false,
        last_change: Instant::now(),
    };
    let mut updates_open = true;
    let mut ticker = interval_at(TickInstant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
            update = updates.recv(), if updates_open => {
                match update {
                    Some(status) => latest = status,
                    None => {
                        updates_open = false;
                        continue;
                    }
                }
            }
        }
        if let Err(err) = client
            .ping(&id, latest.connected, latest.last_change.elapsed())
            .await
        {
            errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(%id, error = %err, "heartbeat failed");
        }
    }
}
