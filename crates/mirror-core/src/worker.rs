//! Reconciliation Worker: applies queued events to one destination
//!
//! Each worker exclusively owns its destination transport. Transport calls
//! block, so each action runs on tokio's blocking pool with the transport
//! moved in and handed back afterwards.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::endpoint::EndpointId;
use crate::event::{ChangeEvent, ChangeKind};
use crate::queue::SyncQueue;
use crate::transport::Transport;
use crate::{Error, Result};

/// What applying one event did to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Copied { bytes: u64 },
    Deleted,
    /// Delete of a file that was not there.
    AlreadyAbsent,
    /// The source disappeared before it could be copied; a later delete
    /// event takes care of the destination.
    SourceVanished,
}

/// Apply a single event through `transport`.
///
/// Paths are translated by resolving the event's root-relative path under
/// the transport's own root.
pub fn apply_action(transport: &mut dyn Transport, event: &ChangeEvent) -> Result<ActionOutcome> {
    let target = event.relative_path();
    match event.kind() {
        ChangeKind::Created | ChangeKind::Modified => {
            if let Some(parent) = target.parent() {
                transport.ensure_directory(&parent)?;
            }
            match transport.copy_in(event.source_path(), target, event.timestamp()) {
                Ok(bytes) => Ok(ActionOutcome::Copied { bytes }),
                Err(e) if e.is_race() => Ok(ActionOutcome::SourceVanished),
                Err(e) => Err(e),
            }
        }
        ChangeKind::Deleted => {
            if transport.delete(target)? {
                Ok(ActionOutcome::Deleted)
            } else {
                Ok(ActionOutcome::AlreadyAbsent)
            }
        }
    }
}

/// Counters reported when a worker stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub applied: u64,
    /// Races with a concurrent change: nothing to do.
    pub skipped: u64,
    pub failed: u64,
    /// Events drained but handed back to the queue on cancellation.
    pub restored: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tally {
    Applied,
    Skipped,
    Failed,
}

impl WorkerReport {
    fn record(&mut self, tally: Tally) {
        match tally {
            Tally::Applied => self.applied += 1,
            Tally::Skipped => self.skipped += 1,
            Tally::Failed => self.failed += 1,
        }
    }
}

fn apply_logged(transport: &mut dyn Transport, destination: &EndpointId, event: &ChangeEvent) -> Tally {
    match apply_action(transport, event) {
        Ok(ActionOutcome::SourceVanished) => {
            debug!(%destination, event = %event, "Source vanished before copy, skipping");
            Tally::Skipped
        }
        Ok(outcome) => {
            info!(%destination, event = %event, ?outcome, "Applied");
            Tally::Applied
        }
        Err(e) => {
            warn!(%destination, event = %event, error = %e, "Action failed, continuing");
            Tally::Failed
        }
    }
}

/// Drains one [`SyncQueue`] into one destination [`Transport`].
pub struct ReconciliationWorker {
    destination: EndpointId,
    queue: Arc<SyncQueue>,
    transport: Option<Box<dyn Transport>>,
    poll_interval: Duration,
}

impl ReconciliationWorker {
    pub fn new(
        destination: EndpointId,
        queue: Arc<SyncQueue>,
        transport: Box<dyn Transport>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            destination,
            queue,
            transport: Some(transport),
            poll_interval,
        }
    }

    pub fn destination(&self) -> &EndpointId {
        &self.destination
    }

    /// Run until `cancel` fires.
    ///
    /// Cancellation is cooperative: the action in flight completes, events
    /// drained but not yet applied go back to the queue, and the loop exits.
    ///
    /// # Errors
    ///
    /// Only a panic inside a transport call ends the worker with an error.
    /// Failed actions are logged and counted, never returned.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<WorkerReport> {
        let mut report = WorkerReport::default();
        info!(destination = %self.destination, "Reconciliation worker started");

        while !cancel.is_cancelled() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.queue.wait_non_empty(self.poll_interval) => {}
            }

            let mut pending = self.queue.drain_all().into_iter();
            while let Some(event) = pending.next() {
                let tally = self.apply(event).await?;
                report.record(tally);

                if cancel.is_cancelled() {
                    let rest: Vec<_> = pending.collect();
                    report.restored = rest.len();
                    self.queue.restore(rest);
                    break;
                }
            }
        }

        info!(
            destination = %self.destination,
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failed,
            "Reconciliation worker stopped"
        );
        Ok(report)
    }

    async fn apply(&mut self, event: ChangeEvent) -> Result<Tally> {
        let mut transport = self.transport.take().ok_or_else(|| Error::Task {
            message: format!("worker for {} lost its transport", self.destination),
        })?;
        let destination = self.destination.clone();

        let (transport, tally) = tokio::task::spawn_blocking(move || {
            let tally = apply_logged(transport.as_mut(), &destination, &event);
            (transport, tally)
        })
        .await
        .map_err(|e| Error::Task {
            message: format!("worker for {} aborted: {}", self.destination, e),
        })?;

        self.transport = Some(transport);
        Ok(tally)
    }
}
