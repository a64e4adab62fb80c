//! Scheduler event processor
//!
//! A single background worker drains an unbounded FIFO queue of
//! [`SchedulerEvent`]s, handling each one to completion before taking the
//! next. All placement decisions, backend calls and container-completion
//! classifications therefore happen on one task, in submission order, and
//! never race each other.
//!
//! Every submission returns an [`EventTicket`] that resolves once the event
//! has been processed; [`SchedulerEventProcessor::drain`] waits for all
//! earlier submissions.

use stagecoach_common::{ExitStatus, SchedulerConfig, SchedulerError, SchedulerResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::scheduler::affinity::resolve_affinity;
use crate::scheduler::backend::{AffinityTarget, AllocationRequest, TaskSchedulerBackend};
use crate::scheduler::context::AppContext;
use crate::scheduler::events::{
    CompletionReport, ContainerCompletedEvent, ContainerEvent, ContainerEventHandler,
    PlacementRequest, SchedulerEvent,
};

/// Prepended to the backend's diagnostics for preempted containers.
pub const PREEMPTED_DIAGNOSTICS_PREFIX: &str = "Container preempted externally. ";

/// Prepended to the backend's diagnostics for containers lost to disk failure.
pub const DISK_FAILED_DIAGNOSTICS_PREFIX: &str = "Container disk failed. ";

/// Classify a completion report into the event sent to the lifecycle manager.
pub fn classify_completion(report: &CompletionReport) -> ContainerCompletedEvent {
    // Raw codes reported as `Other` still carry their well-known meaning.
    let status = ExitStatus::from_code(report.exit_status.code());
    let (diagnostics, is_preempted, is_disk_failed) = match status {
        ExitStatus::Preempted => (
            format!("{}{}", PREEMPTED_DIAGNOSTICS_PREFIX, report.diagnostics),
            true,
            false,
        ),
        ExitStatus::DisksFailed => (
            format!("{}{}", DISK_FAILED_DIAGNOSTICS_PREFIX, report.diagnostics),
            false,
            true,
        ),
        _ => (report.diagnostics.clone(), false, false),
    };

    ContainerCompletedEvent {
        container_id: report.container_id.clone(),
        diagnostics,
        is_preempted,
        is_disk_failed,
    }
}

/// An event waiting in the queue, with the channel that reports its outcome.
struct QueuedEvent {
    event: SchedulerEvent,
    done: oneshot::Sender<SchedulerResult<()>>,
}

/// Completion signal for one submitted event.
#[derive(Debug)]
pub struct EventTicket {
    receiver: oneshot::Receiver<SchedulerResult<()>>,
}

impl EventTicket {
    /// Wait until the event has been processed and return its outcome.
    ///
    /// Resolves to [`SchedulerError::ProcessorStopped`] if the processor was
    /// stopped before reaching the event.
    pub async fn wait(self) -> SchedulerResult<()> {
        self.receiver
            .await
            .unwrap_or_else(|_| Err(SchedulerError::ProcessorStopped))
    }
}

type PendingWorker = (mpsc::UnboundedReceiver<QueuedEvent>, EventDispatcher);

/// Serializes scheduling decisions onto one worker task.
///
/// All methods take `&self`, so producers on any thread can share the
/// processor behind an `Arc`.
pub struct SchedulerEventProcessor {
    name: String,
    sender: mpsc::UnboundedSender<QueuedEvent>,
    /// Receiver and handler, held until the worker is started.
    pending: Mutex<Option<PendingWorker>>,
    shutdown: CancellationToken,
    stopped: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerEventProcessor {
    /// Create a processor. Events may be submitted right away; they are
    /// handled once [`start`](Self::start) is called.
    pub fn new(
        config: SchedulerConfig,
        context: Arc<dyn AppContext>,
        backend: Arc<dyn TaskSchedulerBackend>,
        container_events: Arc<dyn ContainerEventHandler>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher {
            context,
            backend,
            container_events,
        };

        Self {
            name: config.name,
            sender,
            pending: Mutex::new(Some((receiver, dispatcher))),
            shutdown: CancellationToken::new(),
            stopped: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    /// Enqueue an event. Never waits for processing.
    pub fn submit(&self, event: SchedulerEvent) -> SchedulerResult<EventTicket> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(SchedulerError::ProcessorStopped);
        }

        let kind = event.kind();
        let (done, receiver) = oneshot::channel();
        self.sender
            .send(QueuedEvent { event, done })
            .map_err(|_| SchedulerError::ProcessorStopped)?;

        debug!(processor = %self.name, kind, "queued scheduler event");
        Ok(EventTicket { receiver })
    }

    /// Wait until every event submitted before this call has been processed.
    pub async fn drain(&self) -> SchedulerResult<()> {
        self.submit(SchedulerEvent::Barrier)?.wait().await
    }

    /// Spawn the worker on the current tokio runtime.
    pub fn start(&self) -> SchedulerResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(SchedulerError::ProcessorStopped);
        }
        let (receiver, dispatcher) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SchedulerError::AlreadyStarted)?;

        let worker = tokio::spawn(run_worker(
            self.name.clone(),
            receiver,
            dispatcher,
            self.shutdown.clone(),
        ));
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);

        info!(processor = %self.name, "started scheduler event processor");
        Ok(())
    }

    /// Stop the worker after its current event and wait for it to exit.
    ///
    /// Events still queued are dropped; their tickets resolve to
    /// [`SchedulerError::ProcessorStopped`]. Calling `stop` again is a no-op.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(processor = %self.name, error = %e, "scheduler event worker panicked");
            }
        }

        // Never started: discard what was queued so waiters are released.
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((mut receiver, _)) = pending {
            let dropped = discard_queued(&mut receiver);
            if dropped > 0 {
                warn!(processor = %self.name, dropped, "dropped events queued before start");
            }
        }

        info!(processor = %self.name, "stopped scheduler event processor");
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
            && self
                .worker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
    }
}

impl Drop for SchedulerEventProcessor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_worker(
    name: String,
    mut receiver: mpsc::UnboundedReceiver<QueuedEvent>,
    dispatcher: EventDispatcher,
    shutdown: CancellationToken,
) {
    debug!(processor = %name, "scheduler event worker running");
    let mut processed: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = receiver.recv() => match next {
                Some(queued) => {
                    dispatcher.dispatch(queued).await;
                    processed += 1;
                }
                None => break,
            },
        }
    }

    let dropped = discard_queued(&mut receiver);
    info!(processor = %name, processed, dropped, "scheduler event worker exited");
}

fn discard_queued(receiver: &mut mpsc::UnboundedReceiver<QueuedEvent>) -> usize {
    receiver.close();
    let mut dropped = 0;
    while receiver.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

/// Handles one event at a time on behalf of the worker.
struct EventDispatcher {
    context: Arc<dyn AppContext>,
    backend: Arc<dyn TaskSchedulerBackend>,
    container_events: Arc<dyn ContainerEventHandler>,
}

impl EventDispatcher {
    async fn dispatch(&self, queued: QueuedEvent) {
        let QueuedEvent { event, done } = queued;
        let kind = event.kind();

        let result = self.handle(event).await;
        if let Err(e) = &result {
            error!(
                kind,
                retryable = e.is_retryable(),
                error = %e,
                "failed to process scheduler event"
            );
        }

        // The submitter may have dropped its ticket.
        let _ = done.send(result);
    }

    async fn handle(&self, event: SchedulerEvent) -> SchedulerResult<()> {
        match event {
            SchedulerEvent::LaunchRequest(request) => self.handle_launch_request(request).await,
            SchedulerEvent::AttemptEnded {
                attempt_id,
                succeeded,
            } => {
                debug!(attempt = %attempt_id, succeeded, "deallocating task");
                self.backend
                    .deallocate_task(&attempt_id, succeeded)
                    .await
                    .map_err(|e| {
                        SchedulerError::backend_for_attempt(&attempt_id, "deallocate_task", e)
                    })
            }
            SchedulerEvent::ContainerDeallocate { container_id } => {
                debug!(container = %container_id, "releasing container");
                self.backend
                    .release_container(&container_id)
                    .await
                    .map_err(|e| {
                        SchedulerError::backend_for_container(&container_id, "release_container", e)
                    })
            }
            SchedulerEvent::TaskAllocated {
                attempt_id,
                container,
            } => {
                let container_id = container.id.clone();
                if self.context.containers().add_if_new(container) {
                    debug!(container = %container_id, "new container allocated");
                }
                debug!(
                    attempt = %attempt_id,
                    container = %container_id,
                    "assigning attempt to container"
                );
                self.container_events.handle(ContainerEvent::AssignAttempt {
                    container_id,
                    attempt_id,
                });
                Ok(())
            }
            SchedulerEvent::ContainerCompleted(report) => self.handle_container_completed(report),
            SchedulerEvent::Barrier => Ok(()),
        }
    }

    /// Affinity targets for a placement request, possibly empty.
    fn affinity_for(&self, request: &PlacementRequest) -> Vec<AffinityTarget> {
        if let Some(hosts) = &request.hosts {
            return hosts.iter().cloned().map(AffinityTarget::Host).collect();
        }

        let Some(hint) = &request.location_hint else {
            return Vec::new();
        };
        let Some(dag) = self.context.current_dag() else {
            debug!(attempt = %request.attempt_id, "no current DAG, placing without affinity");
            return Vec::new();
        };

        resolve_affinity(dag.as_ref(), hint)
            .map(AffinityTarget::Container)
            .into_iter()
            .collect()
    }

    async fn handle_launch_request(&self, request: PlacementRequest) -> SchedulerResult<()> {
        let affinity = self.affinity_for(&request);
        let placement_hints = request.racks.clone().unwrap_or_default();
        let request = Arc::new(request);

        debug!(
            attempt = %request.attempt_id,
            resource = %request.resource,
            priority = %request.priority,
            affinity = ?affinity,
            "requesting allocation"
        );

        let allocation = AllocationRequest {
            attempt_id: request.attempt_id,
            resource: request.resource,
            affinity,
            priority: request.priority,
            placement_hints,
            source: Arc::clone(&request),
        };

        self.backend
            .allocate_task(allocation)
            .await
            .map_err(|e| {
                SchedulerError::backend_for_attempt(&request.attempt_id, "allocate_task", e)
            })
    }

    fn handle_container_completed(&self, report: CompletionReport) -> SchedulerResult<()> {
        let Some(container) = self.context.containers().get(&report.container_id) else {
            return Err(SchedulerError::UnknownContainer {
                container_id: report.container_id,
                attempt: report
                    .attempt_id
                    .map(|attempt| attempt.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        };

        let completed = classify_completion(&report);
        if completed.is_preempted {
            info!(container = %container.id, host = %container.node_host, "container preempted");
        } else if completed.is_disk_failed {
            warn!(
                container = %container.id,
                host = %container.node_host,
                "container lost to disk failure"
            );
        } else {
            debug!(container = %container.id, status = %report.exit_status, "container completed");
        }

        self.container_events.handle(ContainerEvent::Completed(ContainerCompletedEvent {
            container_id: container.id,
            ..completed
        }));
        Ok(())
    }
}
