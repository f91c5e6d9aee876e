//! Event ingestion — drives the engine from the offer/rescind stream.
//!
//! One background loop per subscription, following the spawned-loop +
//! `watch` shutdown pattern. Each offer batch gets its own coordinating
//! task so concurrent batches proceed independently, serialized only by
//! the registry's per-request claims.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use berth_driver::{FrameworkDriver, OfferEvent, SchedulingService};

use crate::batch;
use crate::registry::PendingRegistry;

/// Handle to a running ingestion loop.
pub(crate) struct EventIngest {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl EventIngest {
    /// Spawn the loop over a freshly subscribed event receiver.
    pub(crate) fn spawn(
        registry: Arc<PendingRegistry>,
        scheduling: Arc<dyn SchedulingService>,
        driver: Arc<dyn FrameworkDriver>,
        events: mpsc::Receiver<OfferEvent>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_event_loop(
            registry,
            scheduling,
            driver,
            events,
            shutdown_rx,
        ));
        Self {
            handle,
            shutdown_tx,
        }
    }

    /// Stop the loop. Batches already spawned run to completion.
    pub(crate) fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

async fn run_event_loop(
    registry: Arc<PendingRegistry>,
    scheduling: Arc<dyn SchedulingService>,
    driver: Arc<dyn FrameworkDriver>,
    mut events: mpsc::Receiver<OfferEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("offer event loop starting");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(OfferEvent::Offers(offers)) => {
                    debug!(offers = offers.len(), "offer batch received");
                    let registry = registry.clone();
                    let scheduling = scheduling.clone();
                    let driver = driver.clone();
                    tokio::spawn(async move {
                        if let Err(err) =
                            batch::resolve(&registry, &scheduling, &driver, offers).await
                        {
                            // The resolution policy has already declined
                            // every offer on this path.
                            warn!(error = %err, "offer batch processing failed");
                        }
                    });
                }
                Some(OfferEvent::Rescinded(offer_id)) => {
                    debug!(%offer_id, "offer rescinded by cluster manager");
                    scheduling.rescind(std::slice::from_ref(&offer_id)).await;
                }
                None => {
                    warn!("offer event stream closed");
                    break;
                }
            },
            _ = shutdown.changed() => {
                debug!("offer event loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::time::Duration;

    use berth_core::{Offer, ResourceSpec};
    use berth_driver::EventSource;
    use berth_testkit::{FirstFitScheduling, RecordingDriver, ScriptedEvents};

    fn make_offer(id: &str) -> Offer {
        Offer {
            id: id.to_string(),
            host: "host-a".to_string(),
            resources: ResourceSpec {
                cpu_weight: 2,
                memory_bytes: 256,
            },
            labels: HashMap::new(),
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn rescind_events_forward_to_the_scheduling_service() {
        let registry = Arc::new(PendingRegistry::new(None));
        let scheduling = Arc::new(FirstFitScheduling::new());
        let driver = Arc::new(RecordingDriver::new());
        let events = ScriptedEvents::new();
        let rx = events.subscribe().await.unwrap();

        let ingest = EventIngest::spawn(registry, scheduling.clone(), driver, rx);

        events.push_rescind("o9").await;
        wait_until(|| scheduling.rescinded() == vec!["o9".to_string()]).await;

        ingest.shutdown();
    }

    #[tokio::test]
    async fn offer_batches_are_resolved_by_the_loop() {
        let registry = Arc::new(PendingRegistry::new(None));
        let scheduling = Arc::new(FirstFitScheduling::new());
        let driver = Arc::new(RecordingDriver::new());
        let events = ScriptedEvents::new();
        let rx = events.subscribe().await.unwrap();

        let ingest = EventIngest::spawn(registry, scheduling, driver.clone(), rx);

        // Nothing pending: the batch must be declined.
        events.push_offers(vec![make_offer("o1")]).await;
        wait_until(|| driver.declines() == vec!["o1".to_string()]).await;

        ingest.shutdown();
    }

    #[tokio::test]
    async fn shutdown_stops_event_processing() {
        let registry = Arc::new(PendingRegistry::new(None));
        let scheduling = Arc::new(FirstFitScheduling::new());
        let driver = Arc::new(RecordingDriver::new());
        let events = ScriptedEvents::new();
        let rx = events.subscribe().await.unwrap();

        let ingest = EventIngest::spawn(registry, scheduling, driver.clone(), rx);
        ingest.shutdown();

        // The receiver is gone with the aborted loop; pushing would panic
        // on a closed channel, so just confirm no declines ever happen.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(driver.declines().is_empty());
    }
}
