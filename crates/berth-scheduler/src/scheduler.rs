//! Task scheduler — the engine's public face.
//!
//! Callers submit ordered task batches and get back a pending handle that
//! resolves once some offer batch places and launches the tasks. The
//! first submission lazily subscribes to the offer event stream, exactly
//! once; `shutdown` tears the subscription down and fails whatever is
//! still waiting.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use berth_core::{Filter, RequestId, SchedulerConfig, TaskDescriptor, TaskRequest};
use berth_driver::{EventSource, FrameworkDriver, SchedulingService};

use crate::error::{SchedulerError, SchedulerResult};
use crate::ingest::EventIngest;
use crate::registry::{PendingLaunch, PendingRegistry};

/// Matches submitted task requests against cluster offers and launches
/// them on the offering hosts.
pub struct TaskScheduler {
    registry: Arc<PendingRegistry>,
    scheduling: Arc<dyn SchedulingService>,
    driver: Arc<dyn FrameworkDriver>,
    events: Arc<dyn EventSource>,
    /// Lazily started ingestion loop; guarded so concurrent first
    /// submissions subscribe exactly once.
    ingest: Mutex<Option<EventIngest>>,
}

impl TaskScheduler {
    /// Create a scheduler with default configuration.
    pub fn new(
        scheduling: Arc<dyn SchedulingService>,
        driver: Arc<dyn FrameworkDriver>,
        events: Arc<dyn EventSource>,
    ) -> Self {
        Self::with_config(SchedulerConfig::default(), scheduling, driver, events)
    }

    pub fn with_config(
        config: SchedulerConfig,
        scheduling: Arc<dyn SchedulingService>,
        driver: Arc<dyn FrameworkDriver>,
        events: Arc<dyn EventSource>,
    ) -> Self {
        Self {
            registry: Arc::new(PendingRegistry::new(config.max_schedule_failures)),
            scheduling,
            driver,
            events,
            ingest: Mutex::new(None),
        }
    }

    /// Submit an ordered batch of tasks, optionally narrowed by a filter.
    ///
    /// Returns immediately with a pending handle; the handle resolves with
    /// one launched task per input task, in input order, once a matching
    /// offer batch arrives. The first call subscribes to the offer event
    /// stream; a subscription failure surfaces here and the next call
    /// retries it.
    pub async fn submit_tasks(
        &self,
        tasks: Vec<TaskDescriptor>,
        filter: Option<Filter>,
    ) -> SchedulerResult<PendingLaunch> {
        self.ensure_subscribed().await?;

        let task_count = tasks.len();
        let (id, pending) = self.registry.submit(TaskRequest::new(tasks, filter)).await;
        info!(request_id = %id, tasks = task_count, "task request submitted");
        Ok(pending)
    }

    /// Stop the ingestion loop and fail every waiting request.
    ///
    /// Waiting callers observe [`SchedulerError::ShutDown`]. Batches
    /// already being processed run to completion.
    pub async fn shutdown(&self) {
        if let Some(ingest) = self.ingest.lock().await.take() {
            ingest.shutdown();
        }

        for entry in self.registry.drain().await {
            debug!(request_id = %entry.id, "failing request on shutdown");
            let _ = entry.completion.send(Err(SchedulerError::ShutDown));
        }
        info!("scheduler shut down");
    }

    /// Number of requests currently waiting for offers.
    pub async fn pending_count(&self) -> usize {
        self.registry.pending_count().await
    }

    /// Whether the given request is still waiting.
    pub async fn is_pending(&self, id: RequestId) -> bool {
        self.registry.contains(id).await
    }

    async fn ensure_subscribed(&self) -> SchedulerResult<()> {
        let mut ingest = self.ingest.lock().await;
        if ingest.is_some() {
            return Ok(());
        }

        let receiver = self
            .events
            .subscribe()
            .await
            .map_err(SchedulerError::Driver)?;
        *ingest = Some(EventIngest::spawn(
            self.registry.clone(),
            self.scheduling.clone(),
            self.driver.clone(),
            receiver,
        ));
        info!("subscribed to offer event stream");
        Ok(())
    }
}
