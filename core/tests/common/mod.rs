//! Common test utilities and helpers for integration tests

#![allow(dead_code)] // Each test binary uses a different subset.

use async_trait::async_trait;
use stagecoach_common::{
    Container, ContainerId, DagId, InputAttemptIdentifier, Priority, Resource, SchedulerConfig,
    ShuffleConfig, TaskAttemptId, TaskId, VertexId,
};
use stagecoach_core::scheduler::{
    AllocationRequest, ContainerEvent, ContainerMap, InMemoryDag, SchedulerEventProcessor,
    SimpleAppContext, TaskSchedulerBackend,
};
use stagecoach_core::shuffle::{FetchCallback, FetchedInputHeader};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore, mpsc};

/// A call the scheduler made on the backend.
#[derive(Debug, Clone)]
pub enum BackendCall {
    Allocate(AllocationRequest),
    Deallocate(TaskAttemptId, bool),
    Release(ContainerId),
}

/// Backend that records every call and can be told to fail or block.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<BackendCall>>,
    failing_attempts: Mutex<HashSet<TaskAttemptId>>,
    /// When set, each allocation waits for one permit.
    gate: Option<Semaphore>,
    entered: Notify,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A backend whose allocations block until [`open_gate`](Self::open_gate).
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    pub fn fail_allocation_for(&self, attempt: TaskAttemptId) {
        self.failing_attempts.lock().unwrap().insert(attempt);
    }

    pub fn open_gate(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    /// Wait until an allocation call has started.
    pub async fn allocation_entered(&self) {
        self.entered.notified().await;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn allocations(&self) -> Vec<AllocationRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Allocate(request) => Some(request),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TaskSchedulerBackend for RecordingBackend {
    async fn allocate_task(&self, request: AllocationRequest) -> anyhow::Result<()> {
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        let attempt = request.attempt_id;
        self.calls.lock().unwrap().push(BackendCall::Allocate(request));
        if self.failing_attempts.lock().unwrap().contains(&attempt) {
            anyhow::bail!("no capacity for {}", attempt);
        }
        Ok(())
    }

    async fn deallocate_task(
        &self,
        attempt_id: &TaskAttemptId,
        succeeded: bool,
    ) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(BackendCall::Deallocate(*attempt_id, succeeded));
        Ok(())
    }

    async fn release_container(&self, container_id: &ContainerId) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(BackendCall::Release(container_id.clone()));
        Ok(())
    }
}

/// A processor wired to in-memory collaborators.
pub struct SchedulerHarness {
    pub processor: Arc<SchedulerEventProcessor>,
    pub backend: Arc<RecordingBackend>,
    pub context: Arc<SimpleAppContext>,
    pub containers: Arc<ContainerMap>,
    pub container_events: mpsc::UnboundedReceiver<ContainerEvent>,
}

impl SchedulerHarness {
    pub fn new(backend: Arc<RecordingBackend>) -> Self {
        let containers = Arc::new(ContainerMap::new());
        let context = Arc::new(SimpleAppContext::new(containers.clone()));
        let (sender, container_events) = mpsc::unbounded_channel();
        let processor = Arc::new(SchedulerEventProcessor::new(
            SchedulerConfig::default(),
            context.clone(),
            backend.clone(),
            Arc::new(sender),
        ));

        Self {
            processor,
            backend,
            context,
            containers,
            container_events,
        }
    }

    pub fn started(backend: Arc<RecordingBackend>) -> Self {
        let harness = Self::new(backend);
        harness.processor.start().unwrap();
        harness
    }

    /// Container events emitted so far.
    pub fn take_container_events(&mut self) -> Vec<ContainerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.container_events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// DAG 1 with a two-task vertex "srcVertex" whose task 1 succeeded in
/// `container`.
pub fn dag_with_successful_source(container: &ContainerId) -> Arc<InMemoryDag> {
    let dag = Arc::new(InMemoryDag::new(DagId(1)));
    let vertex = dag.add_vertex("srcVertex", 2);
    let attempt = TaskAttemptId::new(TaskId::new(vertex, 1), 0);
    dag.set_successful_attempt(attempt);
    dag.assign_container(attempt, container.clone());
    dag
}

pub fn attempt(vertex: u32, task: u32) -> TaskAttemptId {
    TaskAttemptId::new(TaskId::new(VertexId::new(DagId(1), vertex), task), 0)
}

pub fn container(id: &str) -> Container {
    Container::new(
        ContainerId::new(id),
        "node-1.example.com",
        Resource::new(1024, 1),
        Priority(20),
    )
}

pub fn resource() -> Resource {
    Resource::new(100, 1)
}

/// A fetch by task 7 of vertex 2 from source task `src`.
pub fn input_attempt(src: u32) -> InputAttemptIdentifier {
    InputAttemptIdentifier::new(src, 0, TaskId::new(VertexId::new(DagId(1), 2), 7))
}

/// Shuffle config that stages everything on disk under `dir`.
pub fn disk_only_config(dir: &Path) -> ShuffleConfig {
    ShuffleConfig {
        local_dirs: vec![dir.to_path_buf()],
        memory_limit_bytes: 0,
        max_single_memory_fetch_bytes: 0,
    }
}

/// Which callback fired, for which input id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Complete(u64),
    Failed(u64),
    Free(u64),
}

#[derive(Default)]
pub struct RecordingCallback {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

impl FetchCallback for RecordingCallback {
    fn fetch_complete(&self, input: &FetchedInputHeader) {
        self.notifications
            .lock()
            .unwrap()
            .push(Notification::Complete(input.id));
    }

    fn fetch_failed(&self, input: &FetchedInputHeader) {
        self.notifications
            .lock()
            .unwrap()
            .push(Notification::Failed(input.id));
    }

    fn free_resources(&self, input: &FetchedInputHeader) {
        self.notifications
            .lock()
            .unwrap()
            .push(Notification::Free(input.id));
    }
}
