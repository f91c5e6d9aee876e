//! Launch orchestrator — per-host fan-out for a successful allocation.
//!
//! Groups the allocation by host, launches each host's tasks through the
//! framework driver in its own task, declines the batch's unused offers,
//! rescinds the whole batch with the scheduling service, then joins the
//! fan-out and fulfills the request's completion handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use berth_core::{LaunchedTask, Offer, TaskDescriptor, TaskRequest};
use berth_driver::{DriverError, FrameworkDriver, LaunchSpec, SchedulingService};

use crate::error::SchedulerError;
use crate::matcher::MatchOutcome;

/// Launch a matched allocation and resolve every offer in the batch.
///
/// The batch's offers are fully resolved here: allocation offers are
/// consumed by launch calls, the rest are declined individually, and the
/// whole batch is rescinded with the scheduling service regardless of how
/// the launches turn out. Launch failures flow into the request's
/// completion handle — the request already left the registry, so its
/// caller sees the failed future.
pub(crate) async fn launch_allocation(
    scheduling: &Arc<dyn SchedulingService>,
    driver: &Arc<dyn FrameworkDriver>,
    outcome: MatchOutcome,
    batch: &[Offer],
) {
    let MatchOutcome {
        request,
        allocation,
    } = outcome;

    let mut by_host: BTreeMap<String, Vec<(Offer, Vec<TaskDescriptor>)>> = BTreeMap::new();
    for assignment in allocation.assignments.clone() {
        by_host
            .entry(assignment.offer.host.clone())
            .or_default()
            .push((assignment.offer, assignment.tasks));
    }

    let mut fan_out = JoinSet::new();
    for (host, assignments) in by_host {
        let offer_ids: Vec<String> = assignments.iter().map(|(offer, _)| offer.id.clone()).collect();
        let specs: Vec<LaunchSpec> = assignments
            .iter()
            .flat_map(|(offer, tasks)| {
                tasks.iter().map(|task| LaunchSpec {
                    name: task.name.clone(),
                    offer_id: offer.id.clone(),
                    host: host.clone(),
                    resources: task.resources,
                    job: task.job.clone(),
                })
            })
            .collect();
        let pairs: Vec<(TaskDescriptor, String)> = assignments
            .into_iter()
            .flat_map(|(offer, tasks)| {
                let offer_id = offer.id;
                tasks.into_iter().map(move |task| (task, offer_id.clone()))
            })
            .collect();

        let driver = driver.clone();
        fan_out.spawn(async move {
            debug!(%host, tasks = specs.len(), "launching tasks on host");
            let task_ids = driver.launch(&offer_ids, &specs).await?;
            if task_ids.len() != pairs.len() {
                return Err(DriverError::Launch(format!(
                    "driver returned {} task ids for {} tasks on {host}",
                    task_ids.len(),
                    pairs.len()
                )));
            }
            Ok(pairs
                .into_iter()
                .zip(task_ids)
                .map(|((task, offer_id), task_id)| LaunchedTask {
                    task,
                    offer_id,
                    host: host.clone(),
                    task_id,
                })
                .collect::<Vec<_>>())
        });
    }

    // Offers the allocation left untouched are declined individually.
    for offer in batch {
        if !allocation.uses_offer(&offer.id) {
            match driver.decline(&offer.id).await {
                Ok(()) => debug!(offer_id = %offer.id, "declined unused offer"),
                Err(err) => {
                    warn!(offer_id = %offer.id, error = %err, "failed to decline unused offer");
                }
            }
        }
    }

    // The batch is spent once processing began, launches still in flight
    // or not.
    let batch_ids: Vec<String> = batch.iter().map(|offer| offer.id.clone()).collect();
    scheduling.rescind(&batch_ids).await;

    let mut launched: Vec<LaunchedTask> = Vec::new();
    let mut failure: Option<SchedulerError> = None;
    while let Some(joined) = fan_out.join_next().await {
        match joined {
            Ok(Ok(mut tasks)) => launched.append(&mut tasks),
            Ok(Err(err)) => {
                failure.get_or_insert(SchedulerError::Driver(err));
            }
            Err(err) => {
                failure.get_or_insert(SchedulerError::LaunchAborted(err.to_string()));
            }
        }
    }

    let result = match failure {
        Some(err) => {
            warn!(request_id = %request.id, error = %err, "launch fan-out failed");
            Err(err)
        }
        None => {
            info!(
                request_id = %request.id,
                tasks = launched.len(),
                "request launched"
            );
            Ok(in_request_order(&request.request, launched))
        }
    };

    if request.completion.send(result).is_err() {
        debug!(request_id = %request.id, "completion receiver dropped before launch result");
    }
}

/// Project launched tasks back into the request's original task order.
fn in_request_order(request: &TaskRequest, mut launched: Vec<LaunchedTask>) -> Vec<LaunchedTask> {
    let mut ordered = Vec::with_capacity(launched.len());
    for task in &request.tasks {
        if let Some(pos) = launched.iter().position(|l| &l.task == task) {
            ordered.push(launched.remove(pos));
        }
    }
    ordered.extend(launched);
    ordered
}
