//! Offer matcher — first-fit over registry order with retry-on-refusal.

use tracing::{debug, warn};

use berth_core::{Offer, TaskAllocation};
use berth_driver::{ScheduleError, SchedulingService};

use crate::error::{SchedulerError, SchedulerResult};
use crate::registry::{ClaimedRequest, PendingRegistry};

/// A successful match: the winning request (already removed from the
/// registry, completion sender in hand) and its fresh allocation.
pub(crate) struct MatchOutcome {
    pub request: ClaimedRequest,
    pub allocation: TaskAllocation,
}

/// Try successive waiting requests against one offer batch until an
/// allocation succeeds.
///
/// Walks a snapshot of the registry in submission order. Each entry is
/// claimed before the attempt so a concurrent batch working from the same
/// snapshot skips it instead of double-allocating. The batch is registered
/// as visible with the scheduling service before every attempt.
///
/// Recoverable refusals advance to the next entry; anything else aborts the
/// walk immediately. An empty snapshot, or refusals all the way down,
/// yields [`SchedulerError::NoMatch`].
pub(crate) async fn match_offers(
    registry: &PendingRegistry,
    scheduling: &dyn SchedulingService,
    offers: &[Offer],
) -> SchedulerResult<MatchOutcome> {
    let snapshot = registry.snapshot().await;
    if snapshot.is_empty() {
        debug!(offers = offers.len(), "no requests waiting for offers");
        return Err(SchedulerError::NoMatch);
    }

    for (id, request) in snapshot {
        if !registry.claim(id).await {
            debug!(request_id = %id, "request claimed elsewhere, skipping");
            continue;
        }

        scheduling.offer(offers).await;

        match scheduling
            .schedule(&request.tasks, request.filter.as_ref())
            .await
        {
            Ok(allocation) => {
                // The claim guarantees the entry is still ours to remove.
                let Some(claimed) = registry.remove(id).await else {
                    continue;
                };
                debug!(
                    request_id = %id,
                    tasks = allocation.task_count(),
                    offers_used = allocation.assignments.len(),
                    "request matched"
                );
                return Ok(MatchOutcome {
                    request: claimed,
                    allocation,
                });
            }
            Err(err) if err.is_recoverable() => {
                match err {
                    ScheduleError::Unsatisfiable => {
                        debug!(request_id = %id, "request does not fit this batch");
                    }
                    _ => {
                        warn!(
                            request_id = %id,
                            kind = err.kind(),
                            error = %err,
                            "scheduling service refused request"
                        );
                    }
                }
                if let Some(exhausted) = registry.record_refusal(id).await {
                    warn!(request_id = %id, "request exhausted its scheduling retries");
                    let _ = exhausted
                        .completion
                        .send(Err(SchedulerError::RetriesExhausted));
                }
            }
            Err(err) => {
                registry.release(id).await;
                return Err(SchedulerError::Schedule(err));
            }
        }
    }

    Err(SchedulerError::NoMatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use berth_core::{Filter, JobSpec, ResourceSpec, TaskDescriptor, TaskRequest};
    use berth_testkit::FirstFitScheduling;

    fn make_task(name: &str, cpu: u32, mem: u64) -> TaskDescriptor {
        TaskDescriptor {
            name: name.to_string(),
            resources: ResourceSpec {
                cpu_weight: cpu,
                memory_bytes: mem,
            },
            job: JobSpec::Command {
                program: "/bin/true".to_string(),
                args: vec![],
                env: HashMap::new(),
            },
        }
    }

    fn make_offer(id: &str, host: &str, cpu: u32, mem: u64) -> Offer {
        Offer {
            id: id.to_string(),
            host: host.to_string(),
            resources: ResourceSpec {
                cpu_weight: cpu,
                memory_bytes: mem,
            },
            labels: HashMap::new(),
        }
    }

    fn single_task_request(name: &str, cpu: u32, mem: u64) -> TaskRequest {
        TaskRequest::new(vec![make_task(name, cpu, mem)], None)
    }

    #[tokio::test]
    async fn empty_registry_is_no_match() {
        let registry = PendingRegistry::new(None);
        let scheduling = FirstFitScheduling::new();

        let result = match_offers(&registry, &scheduling, &[make_offer("o1", "a", 2, 256)]).await;
        assert!(matches!(result, Err(SchedulerError::NoMatch)));
        assert_eq!(scheduling.schedule_calls(), 0);
    }

    #[tokio::test]
    async fn first_submission_wins_when_both_fit() {
        let registry = PendingRegistry::new(None);
        let scheduling = FirstFitScheduling::new();

        let (id_a, _a) = registry.submit(single_task_request("a", 1, 128)).await;
        let (id_b, _b) = registry.submit(single_task_request("b", 1, 128)).await;

        let outcome = match_offers(&registry, &scheduling, &[make_offer("o1", "a", 2, 256)])
            .await
            .unwrap();

        assert_eq!(outcome.request.id, id_a);
        assert!(registry.contains(id_b).await);
        assert!(!registry.contains(id_a).await);
    }

    #[tokio::test]
    async fn refusal_on_first_tries_second_against_same_batch() {
        let registry = PendingRegistry::new(None);
        let scheduling = FirstFitScheduling::new();
        scheduling.refuse_next(ScheduleError::Rejected("busy".into()));

        let (id_a, _a) = registry.submit(single_task_request("a", 1, 128)).await;
        let (id_b, _b) = registry.submit(single_task_request("b", 1, 128)).await;

        let outcome = match_offers(&registry, &scheduling, &[make_offer("o1", "a", 2, 256)])
            .await
            .unwrap();

        assert_eq!(outcome.request.id, id_b);
        assert_eq!(scheduling.schedule_calls(), 2);
        // The refused request stays pending for a future batch.
        assert!(registry.contains(id_a).await);
    }

    #[tokio::test]
    async fn unsatisfiable_request_is_skipped_for_the_next() {
        let registry = PendingRegistry::new(None);
        let scheduling = FirstFitScheduling::new();

        // First request is too big for the offer, second fits.
        registry.submit(single_task_request("big", 8, 4096)).await;
        let (id_b, _b) = registry.submit(single_task_request("small", 1, 128)).await;

        let outcome = match_offers(&registry, &scheduling, &[make_offer("o1", "a", 2, 256)])
            .await
            .unwrap();
        assert_eq!(outcome.request.id, id_b);
    }

    #[tokio::test]
    async fn all_refused_is_no_match() {
        let registry = PendingRegistry::new(None);
        let scheduling = FirstFitScheduling::new();

        registry.submit(single_task_request("big", 8, 4096)).await;
        registry.submit(single_task_request("bigger", 16, 8192)).await;

        let result = match_offers(&registry, &scheduling, &[make_offer("o1", "a", 2, 256)]).await;
        assert!(matches!(result, Err(SchedulerError::NoMatch)));
        assert_eq!(registry.pending_count().await, 2);
    }

    #[tokio::test]
    async fn internal_error_propagates_and_releases_the_claim() {
        let registry = PendingRegistry::new(None);
        let scheduling = FirstFitScheduling::new();
        scheduling.refuse_next(ScheduleError::Internal("solver crashed".into()));

        let (id, _pending) = registry.submit(single_task_request("a", 1, 128)).await;

        let result = match_offers(&registry, &scheduling, &[make_offer("o1", "a", 2, 256)]).await;
        assert!(matches!(
            result,
            Err(SchedulerError::Schedule(ScheduleError::Internal(_)))
        ));

        // Request survives and can be claimed by a future batch.
        assert!(registry.contains(id).await);
        assert!(registry.claim(id).await);
    }

    #[tokio::test]
    async fn offers_are_registered_before_every_attempt() {
        let registry = PendingRegistry::new(None);
        let scheduling = FirstFitScheduling::new();
        scheduling.refuse_next(ScheduleError::Rejected("busy".into()));

        registry.submit(single_task_request("a", 1, 128)).await;
        registry.submit(single_task_request("b", 1, 128)).await;

        match_offers(&registry, &scheduling, &[make_offer("o1", "a", 2, 256)])
            .await
            .unwrap();
        assert_eq!(scheduling.offer_calls(), 2);
    }

    #[tokio::test]
    async fn claimed_entries_are_skipped() {
        let registry = PendingRegistry::new(None);
        let scheduling = FirstFitScheduling::new();

        let (id_a, _a) = registry.submit(single_task_request("a", 1, 128)).await;
        let (id_b, _b) = registry.submit(single_task_request("b", 1, 128)).await;

        // Simulate a concurrent batch holding the first request.
        assert!(registry.claim(id_a).await);

        let outcome = match_offers(&registry, &scheduling, &[make_offer("o1", "a", 2, 256)])
            .await
            .unwrap();
        assert_eq!(outcome.request.id, id_b);
        assert!(registry.contains(id_a).await);
    }

    #[tokio::test]
    async fn bounded_refusals_fail_the_handle() {
        let registry = PendingRegistry::new(Some(1));
        let scheduling = FirstFitScheduling::new();
        scheduling.refuse_next(ScheduleError::Rejected("busy".into()));

        let (id, pending) = registry.submit(single_task_request("a", 1, 128)).await;

        let result = match_offers(&registry, &scheduling, &[make_offer("o1", "a", 2, 256)]).await;
        assert!(matches!(result, Err(SchedulerError::NoMatch)));

        assert!(!registry.contains(id).await);
        assert!(matches!(
            pending.wait().await,
            Err(SchedulerError::RetriesExhausted)
        ));
    }

    #[tokio::test]
    async fn filter_is_passed_through_to_the_scheduling_service() {
        let registry = PendingRegistry::new(None);
        let scheduling = FirstFitScheduling::new();

        let filter = Filter {
            hosts: vec!["b".to_string()],
            required_labels: HashMap::new(),
        };
        registry
            .submit(TaskRequest::new(vec![make_task("a", 1, 128)], Some(filter)))
            .await;

        // Only host "a" is offered, so the filtered request cannot fit.
        let result = match_offers(&registry, &scheduling, &[make_offer("o1", "a", 2, 256)]).await;
        assert!(matches!(result, Err(SchedulerError::NoMatch)));

        let outcome = match_offers(&registry, &scheduling, &[make_offer("o2", "b", 2, 256)])
            .await
            .unwrap();
        assert_eq!(outcome.allocation.assignments[0].offer.host, "b");
    }
}
