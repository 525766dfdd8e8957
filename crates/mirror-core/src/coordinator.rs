//! Sync Coordinator: wires endpoints into routes and runs them
//!
//! Task layout once started:
//!
//! ```text
//!  watch(src) ──┬── route src→d1: LoopGuard(probe d1) ──► SyncQueue(d1) ──► worker(d1)
//!               └── route src→d2: LoopGuard(probe d2) ──► SyncQueue(d2) ──► worker(d2)
//! ```
//!
//! Each route owns a probe transport, so a slow or unreachable destination
//! only delays events headed for that destination.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::endpoint::{DefaultTransportFactory, Endpoint, EndpointId, TransportFactory, validate_id};
use crate::event::ChangeEvent;
use crate::guard::{ComparisonMode, LoopGuard};
use crate::queue::SyncQueue;
use crate::transport::Transport;
use crate::watch::{WatchService, WatchStream};
use crate::worker::{ReconciliationWorker, WorkerReport};
use crate::{Error, Result};

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    pub recursive: bool,
    pub comparison_mode: ComparisonMode,
    /// How long an idle worker waits before re-checking for cancellation.
    pub poll_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            comparison_mode: ComparisonMode::Hash,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// One directed propagation path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Route {
    pub source: EndpointId,
    pub destination: EndpointId,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// Builder for a set of mirror and fan-out relationships.
pub struct SyncCoordinator {
    endpoints: BTreeMap<EndpointId, Endpoint>,
    routes: Vec<Route>,
    options: SyncOptions,
    factory: Arc<dyn TransportFactory>,
}

impl SyncCoordinator {
    pub fn new(options: SyncOptions) -> Self {
        Self {
            endpoints: BTreeMap::new(),
            routes: Vec::new(),
            options,
            factory: Arc::new(DefaultTransportFactory),
        }
    }

    /// Replace how transports are opened for workers and probes.
    pub fn with_transport_factory(mut self, factory: impl TransportFactory + 'static) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn endpoint(&self, id: &EndpointId) -> Result<&Endpoint> {
        self.endpoints
            .get(id)
            .ok_or_else(|| Error::UnknownEndpoint { id: id.clone() })
    }

    pub fn register_endpoint(&mut self, endpoint: Endpoint) -> Result<()> {
        validate_id(&endpoint.id)?;
        if self.endpoints.contains_key(&endpoint.id) {
            return Err(Error::DuplicateEndpoint { id: endpoint.id });
        }
        debug!(id = %endpoint.id, root = %endpoint.root.display(), "Registered endpoint");
        self.endpoints.insert(endpoint.id.clone(), endpoint);
        Ok(())
    }

    /// Bidirectional mirror between two local endpoints.
    pub fn wire_mirror(&mut self, a: &EndpointId, b: &EndpointId) -> Result<()> {
        self.require_watchable(a)?;
        self.require_watchable(b)?;
        if a == b {
            return Err(Error::config(format!("endpoint '{}' cannot mirror itself", a)));
        }
        self.add_route(a, b);
        self.add_route(b, a);
        Ok(())
    }

    /// One-way propagation from a local source to every destination.
    pub fn wire_fan_out(&mut self, source: &EndpointId, destinations: &[EndpointId]) -> Result<()> {
        self.require_watchable(source)?;
        if destinations.is_empty() {
            return Err(Error::config(format!("fan-out from '{}' has no destinations", source)));
        }
        for destination in destinations {
            self.endpoint(destination)?;
            if destination == source {
                return Err(Error::config(format!(
                    "endpoint '{}' cannot fan out to itself",
                    source
                )));
            }
        }
        for destination in destinations {
            self.add_route(source, destination);
        }
        Ok(())
    }

    fn require_watchable(&self, id: &EndpointId) -> Result<()> {
        if !self.endpoint(id)?.is_local() {
            return Err(Error::NotWatchable {
                id: id.clone(),
                reason: "remote endpoints cannot be watched".to_string(),
            });
        }
        Ok(())
    }

    fn add_route(&mut self, source: &EndpointId, destination: &EndpointId) {
        let route = Route {
            source: source.clone(),
            destination: destination.clone(),
        };
        if !self.routes.contains(&route) {
            info!(%route, "Wired route");
            self.routes.push(route);
        }
    }

    /// Verify every endpoint, start watches and spawn all tasks.
    ///
    /// Nothing is spawned unless every watched root exists and every
    /// destination root is reachable.
    pub async fn start(self, watch: Arc<dyn WatchService>) -> Result<RunningSync> {
        if self.routes.is_empty() {
            return Err(Error::config("no mirror or fan-out relationships configured"));
        }

        let SyncCoordinator {
            endpoints,
            routes,
            options,
            factory,
        } = self;

        let mut prepared = {
            let routes = routes.clone();
            tokio::task::spawn_blocking(move || prepare(&endpoints, &routes, factory.as_ref()))
                .await
                .map_err(|e| Error::Task {
                    message: format!("startup verification aborted: {}", e),
                })??
        };

        let mut streams = Vec::new();
        for (id, root) in &prepared.roots {
            let stream = watch.watch(root, options.recursive)?;
            streams.push((id.clone(), root.clone(), stream));
        }

        let watch_cancel = CancellationToken::new();
        let worker_cancel = CancellationToken::new();

        let mut queues = BTreeMap::new();
        let mut workers = Vec::new();
        for (destination, transport) in std::mem::take(&mut prepared.workers) {
            let queue = Arc::new(SyncQueue::new());
            let worker = ReconciliationWorker::new(
                destination.clone(),
                Arc::clone(&queue),
                transport,
                options.poll_interval,
            );
            let span = info_span!("worker", destination = %destination);
            let handle = tokio::spawn(worker.run(worker_cancel.clone()).instrument(span));
            workers.push((destination.clone(), handle));
            queues.insert(destination, queue);
        }

        let guard = LoopGuard::new(options.comparison_mode);
        let mut senders: BTreeMap<EndpointId, Vec<mpsc::UnboundedSender<ChangeEvent>>> =
            BTreeMap::new();
        let mut guard_tasks = Vec::new();
        for (route, probe) in prepared.probes {
            let Some(queue) = queues.get(&route.destination).map(Arc::clone) else {
                continue;
            };
            let (tx, rx) = mpsc::unbounded_channel();
            senders.entry(route.source.clone()).or_default().push(tx);
            let span = info_span!("route", source = %route.source, destination = %route.destination);
            guard_tasks.push(tokio::spawn(
                run_route(route, guard, probe, rx, queue, watch_cancel.clone()).instrument(span),
            ));
        }

        let mut watch_tasks = Vec::new();
        for (source, root, stream) in streams {
            let routes = senders.remove(&source).unwrap_or_default();
            watch_tasks.push(tokio::spawn(run_watch(
                source,
                root,
                stream,
                routes,
                watch_cancel.clone(),
            )));
        }

        info!(
            routes = routes.len(),
            destinations = queues.len(),
            mode = ?options.comparison_mode,
            "Sync started"
        );

        Ok(RunningSync {
            watch_cancel,
            worker_cancel,
            watch_tasks,
            guard_tasks,
            workers,
            queues,
        })
    }
}

struct Prepared {
    roots: BTreeMap<EndpointId, PathBuf>,
    workers: BTreeMap<EndpointId, Box<dyn Transport>>,
    probes: Vec<(Route, Box<dyn Transport>)>,
}

fn lookup<'a>(endpoints: &'a BTreeMap<EndpointId, Endpoint>, id: &EndpointId) -> Result<&'a Endpoint> {
    endpoints
        .get(id)
        .ok_or_else(|| Error::UnknownEndpoint { id: id.clone() })
}

fn prepare(
    endpoints: &BTreeMap<EndpointId, Endpoint>,
    routes: &[Route],
    factory: &dyn TransportFactory,
) -> Result<Prepared> {
    let mut roots = BTreeMap::new();
    for route in routes {
        if roots.contains_key(&route.source) {
            continue;
        }
        let endpoint = lookup(endpoints, &route.source)?;
        let root = mirror_fs::canonical_root(&endpoint.root).map_err(|e| Error::RootUnavailable {
            id: endpoint.id.clone(),
            reason: e.to_string(),
        })?;
        if !root.is_dir() {
            return Err(Error::RootUnavailable {
                id: endpoint.id.clone(),
                reason: format!("{} is not a directory", root.display()),
            });
        }
        roots.insert(endpoint.id.clone(), root);
    }

    let mut workers = BTreeMap::new();
    for route in routes {
        if workers.contains_key(&route.destination) {
            continue;
        }
        let endpoint = lookup(endpoints, &route.destination)?;
        let mut transport = factory.open(endpoint)?;
        transport.verify_root().map_err(|e| Error::RootUnavailable {
            id: endpoint.id.clone(),
            reason: e.to_string(),
        })?;
        debug!(destination = %endpoint.id, at = %transport.describe(), "Destination verified");
        workers.insert(endpoint.id.clone(), transport);
    }

    check_disjoint(endpoints, routes)?;

    let mut probes = Vec::new();
    for route in routes {
        let probe = factory.open(lookup(endpoints, &route.destination)?)?;
        probes.push((route.clone(), probe));
    }

    Ok(Prepared {
        roots,
        workers,
        probes,
    })
}

/// A local destination inside its source (or the other way round) would
/// feed its own writes back forever.
fn check_disjoint(endpoints: &BTreeMap<EndpointId, Endpoint>, routes: &[Route]) -> Result<()> {
    for route in routes {
        let source = lookup(endpoints, &route.source)?;
        let destination = lookup(endpoints, &route.destination)?;
        if !destination.is_local() {
            continue;
        }
        let a = mirror_fs::canonical_root(&source.root)?;
        let b = mirror_fs::canonical_root(&destination.root)?;
        if a.starts_with(&b) || b.starts_with(&a) {
            return Err(Error::config(format!(
                "roots of '{}' and '{}' overlap: {} and {}",
                source.id,
                destination.id,
                a.display(),
                b.display()
            )));
        }
    }
    Ok(())
}

/// Forward notifications from one watched root to every route leaving it.
async fn run_watch(
    source: EndpointId,
    root: PathBuf,
    mut stream: WatchStream,
    routes: Vec<mpsc::UnboundedSender<ChangeEvent>>,
    cancel: CancellationToken,
) {
    info!(%source, root = %root.display(), "Watching");
    loop {
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = stream.next() => match next {
                Some(raw) => raw,
                None => {
                    warn!(%source, "Watch stream ended");
                    break;
                }
            },
        };

        let event = match ChangeEvent::new(raw.kind, source.clone(), &root, raw.path, raw.timestamp) {
            Ok(event) if !event.relative_path().is_root() => event,
            Ok(_) => continue,
            Err(e) => {
                debug!(%source, error = %e, "Ignoring change outside the watched root");
                continue;
            }
        };
        debug!(event = %event, "Change observed");
        for route in &routes {
            // A closed channel means the route task has already stopped.
            let _ = route.send(event.clone());
        }
    }
    debug!(%source, "Watch task stopped");
}

/// Run the loop guard for one route and enqueue what survives.
async fn run_route(
    route: Route,
    guard: LoopGuard,
    mut probe: Box<dyn Transport>,
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
    queue: Arc<SyncQueue>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = events.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };

        let decided = tokio::task::spawn_blocking(move || {
            let decision = guard.decide(&event, probe.as_mut());
            (probe, event, decision)
        })
        .await;

        match decided {
            Ok((returned, event, decision)) => {
                probe = returned;
                if decision.propagate {
                    queue.enqueue(event);
                } else {
                    debug!(%route, event = %event, reason = %decision.reason, "Suppressed echo");
                }
            }
            Err(e) => {
                error!(%route, error = %e, "Loop guard task aborted");
                break;
            }
        }
    }
    debug!(%route, "Route task stopped");
}

/// Totals reported by [`RunningSync::stop`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub workers: BTreeMap<EndpointId, WorkerReport>,
}

impl SyncSummary {
    pub fn applied(&self) -> u64 {
        self.workers.values().map(|r| r.applied).sum()
    }

    pub fn failed(&self) -> u64 {
        self.workers.values().map(|r| r.failed).sum()
    }
}

/// Handle to a started sync.
pub struct RunningSync {
    watch_cancel: CancellationToken,
    worker_cancel: CancellationToken,
    watch_tasks: Vec<JoinHandle<()>>,
    guard_tasks: Vec<JoinHandle<()>>,
    workers: Vec<(EndpointId, JoinHandle<Result<WorkerReport>>)>,
    queues: BTreeMap<EndpointId, Arc<SyncQueue>>,
}

impl RunningSync {
    /// Queue feeding the worker of `destination`.
    pub fn queue(&self, destination: &EndpointId) -> Option<&Arc<SyncQueue>> {
        self.queues.get(destination)
    }

    pub fn destinations(&self) -> impl Iterator<Item = &EndpointId> {
        self.queues.keys()
    }

    /// Events captured but not yet drained, over all destinations.
    pub fn pending(&self) -> usize {
        self.queues.values().map(|q| q.len()).sum()
    }

    /// Stop watching, then stop every worker.
    ///
    /// Watches end first so no new events arrive; each worker then finishes
    /// its in-flight action and exits. Events still queued stay in the
    /// queues and are not applied.
    pub async fn stop(self) -> Result<SyncSummary> {
        info!("Stopping sync");
        self.watch_cancel.cancel();
        for task in self.watch_tasks.into_iter().chain(self.guard_tasks) {
            if let Err(e) = task.await {
                error!(error = %e, "Watch task panicked");
            }
        }

        self.worker_cancel.cancel();
        let mut summary = SyncSummary::default();
        let mut first_error = None;
        for (destination, handle) in self.workers {
            match handle.await {
                Ok(Ok(report)) => {
                    summary.workers.insert(destination, report);
                }
                Ok(Err(e)) => {
                    error!(%destination, error = %e, "Worker ended with an error");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!(%destination, error = %e, "Worker panicked");
                    first_error.get_or_insert(Error::Task {
                        message: format!("worker for {} panicked: {}", destination, e),
                    });
                }
            }
        }

        let pending: usize = self.queues.values().map(|q| q.len()).sum();
        if pending > 0 {
            warn!(pending, "Stopped with unapplied events");
        }
        info!(applied = summary.applied(), failed = summary.failed(), "Sync stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}
