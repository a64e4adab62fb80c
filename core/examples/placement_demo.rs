//! Demonstration of affinity-aware task placement and shuffle input staging
//!
//! A source task finishes in a container; a downstream task asks to run near
//! it and then stages the bytes it fetched from that source.
//!
//! Run with an optional JSON config file:
//! `cargo run --example placement_demo -- engine.json`

use async_trait::async_trait;
use stagecoach_common::{
    Container, ContainerId, DagId, EngineConfig, ExitStatus, InputAttemptIdentifier, Priority,
    Resource, TaskAttemptId, TaskId, TaskLocationHint,
};
use stagecoach_core::scheduler::{
    AllocationRequest, CompletionReport, ContainerMap, InMemoryDag, PlacementRequest,
    SchedulerEvent, SchedulerEventProcessor, SimpleAppContext, TaskSchedulerBackend,
};
use stagecoach_core::shuffle::FetchedInputAllocator;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{Level, info};

/// Backend that accepts every call and prints what it was asked.
struct PrintingBackend;

#[async_trait]
impl TaskSchedulerBackend for PrintingBackend {
    async fn allocate_task(&self, request: AllocationRequest) -> anyhow::Result<()> {
        let affinity: Vec<String> = request.affinity.iter().map(|t| t.to_string()).collect();
        println!(
            "   allocate {} {} priority={} affinity={:?}",
            request.attempt_id, request.resource, request.priority, affinity
        );
        Ok(())
    }

    async fn deallocate_task(
        &self,
        attempt_id: &TaskAttemptId,
        succeeded: bool,
    ) -> anyhow::Result<()> {
        println!("   deallocate {} succeeded={}", attempt_id, succeeded);
        Ok(())
    }

    async fn release_container(&self, container_id: &ContainerId) -> anyhow::Result<()> {
        println!("   release {}", container_id);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stagecoach_core::init_tracing(Level::INFO);
    println!("=== Stagecoach: Placement Demo ===\n");

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    let containers = Arc::new(ContainerMap::new());
    let context = Arc::new(SimpleAppContext::new(containers.clone()));
    let (container_events, mut container_events_rx) = mpsc::unbounded_channel();
    let processor = SchedulerEventProcessor::new(
        config.scheduler.clone(),
        context.clone(),
        Arc::new(PrintingBackend),
        Arc::new(container_events),
    );
    processor.start()?;

    // Demo 1: the source task ran in container_01.
    println!("1. Source task completes:");
    let dag = Arc::new(InMemoryDag::new(DagId(1)));
    let source = dag.add_vertex("srcVertex", 2);
    let sink = dag.add_vertex("sinkVertex", 1);
    context.set_current_dag(dag.clone());

    let source_attempt = TaskAttemptId::new(TaskId::new(source, 1), 0);
    let container = Container::new(
        ContainerId::new("container_01"),
        "node-1",
        Resource::new(1024, 1),
        Priority(1),
    );
    processor
        .submit(SchedulerEvent::TaskAllocated {
            attempt_id: source_attempt,
            container: container.clone(),
        })?
        .wait()
        .await?;
    dag.assign_container(source_attempt, container.id.clone());
    dag.set_successful_attempt(source_attempt);
    processor
        .submit(SchedulerEvent::AttemptEnded {
            attempt_id: source_attempt,
            succeeded: true,
        })?
        .wait()
        .await?;

    // Demo 2: the downstream task asks to run next to it.
    println!("\n2. Downstream task placement:");
    let sink_task = TaskId::new(sink, 0);
    let request = PlacementRequest::new(
        TaskAttemptId::new(sink_task, 0),
        Resource::new(512, 1),
        Priority(2),
    )
    .with_location_hint(TaskLocationHint::new("srcVertex", 1));
    processor.submit(SchedulerEvent::LaunchRequest(request))?;
    processor.drain().await?;

    // Demo 3: stage the fetched bytes.
    println!("\n3. Shuffle input staging:");
    let allocator = FetchedInputAllocator::new(config.shuffle.clone());
    let input = allocator.allocate(11, InputAttemptIdentifier::new(1, 0, sink_task))?;
    let mut output = input.output_sink().await?;
    output.write_all(b"hello world").await?;
    output.shutdown().await?;
    input.commit().await?;

    let mut fetched = String::new();
    input.input_source().await?.read_to_string(&mut fetched).await?;
    println!("   {:?} {} bytes: {:?}", input.kind(), input.size(), fetched);
    input.free().await;
    println!("   allocator stats: {:?}", allocator.stats());

    // Demo 4: the container is preempted.
    println!("\n4. Container completion:");
    processor
        .submit(SchedulerEvent::ContainerCompleted(CompletionReport {
            container_id: container.id.clone(),
            exit_status: ExitStatus::Preempted,
            diagnostics: "Preempted by the cluster".to_string(),
            attempt_id: None,
        }))?
        .wait()
        .await?;
    while let Ok(event) = container_events_rx.try_recv() {
        println!("   container event: {:?}", event);
    }

    processor.stop().await;
    info!("demo finished");
    Ok(())
}
