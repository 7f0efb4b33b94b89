//! Deadline-bounded convergence polling.
//!
//! A [`ConvergencePoller`] repeatedly lists the deployments of a release and
//! waits until all of them are available. One query is in flight at a time;
//! the poller sleeps for a fixed interval between ticks.
//!
//! Query failures are transient: the pending set becomes unknown, the error
//! is remembered, and the next tick retries. A query still in flight at the
//! deadline is abandoned and counts as a failed query. Only when the deadline passes
//! is a failure surfaced, and it says whether the last query failed or the
//! deployments simply never became available.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::client::{ClusterClient, DeploymentStatus};

/// Interval between two polling ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Recorded when the deadline passes while a query is still in flight.
pub const QUERY_STALLED: &str = "query did not complete before deadline";

/// Poller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Waiting,
    Done,
}

/// Terminal wait failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WaitError {
    /// The deadline passed while the most recent query was failing.
    #[error("timed out retrying after {last_error}{}", describe_last_known(.last_known_pending))]
    TimedOutRetrying {
        last_error: String,
        last_known_pending: Option<Vec<String>>,
    },

    /// Queries succeeded but some deployments never became available.
    #[error("timed out waiting for unavailable deployments: {}", .pending.join(","))]
    TimedOutWaiting { pending: Vec<String> },

    /// An encompassing cancellation fired while waiting.
    #[error("wait for deployments cancelled")]
    Cancelled,
}

fn describe_last_known(pending: &Option<Vec<String>>) -> String {
    match pending {
        Some(names) if !names.is_empty() => {
            format!(" (last known unavailable deployments: {})", names.join(","))
        }
        _ => String::new(),
    }
}

/// Per-wait bookkeeping, advanced once per tick.
#[derive(Debug, Default)]
struct WaitProgress {
    /// `None` until a query succeeds, and again after any failed query.
    pending: Option<Vec<String>>,
    last_known_pending: Option<Vec<String>>,
    last_error: Option<String>,
}

impl WaitProgress {
    fn record_error(&mut self, message: String) {
        self.pending = None;
        self.last_error = Some(message);
    }

    fn record_listing(&mut self, deployments: &[DeploymentStatus]) {
        let pending: Vec<String> = deployments
            .iter()
            .filter(|d| !d.is_available())
            .map(|d| d.name.clone())
            .collect();
        self.last_error = None;
        self.last_known_pending = Some(pending.clone());
        self.pending = Some(pending);
    }

    fn state(&self) -> PollState {
        match &self.pending {
            Some(pending) if pending.is_empty() => PollState::Done,
            _ => PollState::Waiting,
        }
    }

    fn into_timeout_error(self) -> WaitError {
        match self.last_error {
            Some(last_error) => WaitError::TimedOutRetrying {
                last_error,
                last_known_pending: self.last_known_pending,
            },
            None => WaitError::TimedOutWaiting {
                pending: self.pending.unwrap_or_default(),
            },
        }
    }
}

/// Waits for the deployments of a release to become available.
pub struct ConvergencePoller<'a> {
    client: &'a dyn ClusterClient,
    interval: Duration,
}

impl<'a> ConvergencePoller<'a> {
    pub fn new(client: &'a dyn ClusterClient) -> Self {
        Self {
            client,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the tick interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Poll until every deployment matching `selector` in `namespace` is
    /// available, the `deadline` passes, or `cancel` turns `true`.
    ///
    /// Returns as soon as a tick observes an empty pending set.
    #[instrument(skip_all, fields(namespace = %namespace, selector = %selector))]
    pub async fn wait_for_deployments(
        &self,
        namespace: &str,
        selector: &str,
        deadline: Instant,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), WaitError> {
        let mut progress = WaitProgress::default();

        info!(
            time_left = ?deadline.saturating_duration_since(Instant::now()),
            "Start wait for deployments"
        );

        loop {
            if *cancel.borrow() {
                return Err(WaitError::Cancelled);
            }

            let listed = tokio::select! {
                biased;
                _ = cancelled(cancel) => return Err(WaitError::Cancelled),
                listed = self.client.list_deployments(namespace, selector) => listed,
                _ = tokio::time::sleep_until(deadline) => {
                    progress.record_error(format!(
                        "error getting deployments from namespace {namespace}: {QUERY_STALLED}"
                    ));
                    let err = progress.into_timeout_error();
                    warn!(error = %err, "Deadline passed during deployment query");
                    return Err(err);
                }
            };

            match listed {
                Ok(deployments) => {
                    progress.record_listing(&deployments);
                    if progress.state() == PollState::Done {
                        info!(
                            time_left = ?deadline.saturating_duration_since(Instant::now()),
                            "Finish wait for deployments"
                        );
                        return Ok(());
                    }
                    info!(
                        pending = %progress.pending.as_deref().unwrap_or_default().join(","),
                        "Wait for unavailable deployments"
                    );
                }
                Err(e) => {
                    let message =
                        format!("error getting deployments from namespace {namespace}: {e}");
                    warn!(error = %message, "Deployment query failed, retrying");
                    progress.record_error(message);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let err = progress.into_timeout_error();
                warn!(error = %err, "Deadline passed while waiting for deployments");
                return Err(err);
            }

            let nap = self.interval.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                _ = cancelled(cancel) => return Err(WaitError::Cancelled),
            }
        }
    }
}

/// Resolves once the cancel flag is `true`; never resolves if the sender is
/// gone without having cancelled.
pub async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
