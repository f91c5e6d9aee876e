//! Batch processing — one offer batch from arrival to full resolution.
//!
//! The resolution contract: by the time `resolve` returns, every offer in
//! the batch has been consumed by a launch or declined, exactly once, and
//! the batch has been rescinded with the scheduling service.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use berth_core::Offer;
use berth_driver::{FrameworkDriver, SchedulingService};

use crate::error::{SchedulerError, SchedulerResult};
use crate::registry::PendingRegistry;
use crate::{launcher, matcher};

/// Process one offer batch: match, launch, resolve.
///
/// Expected outcomes — nothing waiting fits (`NoMatch`) or the scheduling
/// layer refused the batch — resolve to `Ok(())` after every offer has
/// been declined. Unexpected failures also decline every offer first, then
/// surface to the caller.
pub(crate) async fn resolve(
    registry: &PendingRegistry,
    scheduling: &Arc<dyn SchedulingService>,
    driver: &Arc<dyn FrameworkDriver>,
    offers: Vec<Offer>,
) -> SchedulerResult<()> {
    match matcher::match_offers(registry, scheduling.as_ref(), &offers).await {
        Ok(outcome) => {
            info!(
                request_id = %outcome.request.id,
                offers = offers.len(),
                tasks = outcome.allocation.task_count(),
                "request matched, launching"
            );
            launcher::launch_allocation(scheduling, driver, outcome, &offers).await;
            Ok(())
        }
        Err(err) => {
            let offer_ids: Vec<String> = offers.iter().map(|offer| offer.id.clone()).collect();
            scheduling.rescind(&offer_ids).await;

            for offer in &offers {
                if let Err(decline_err) = driver.decline(&offer.id).await {
                    warn!(
                        offer_id = %offer.id,
                        error = %decline_err,
                        "failed to decline offer"
                    );
                }
            }

            match &err {
                SchedulerError::NoMatch => {
                    debug!(offers = offers.len(), "no pending request fits, batch declined");
                    Ok(())
                }
                SchedulerError::Schedule(refusal) if refusal.is_recoverable() => {
                    warn!(
                        kind = refusal.kind(),
                        error = %refusal,
                        "batch declined after scheduling refusal"
                    );
                    Ok(())
                }
                _ => {
                    error!(error = %err, "unexpected failure while processing offer batch");
                    Err(err)
                }
            }
        }
    }
}
