//! The opaque scheduling service contract.

use async_trait::async_trait;
use berth_core::{Filter, Offer, TaskAllocation, TaskDescriptor};

use crate::error::ScheduleError;

/// The bin-packing/constraint-matching algorithm Berth consumes as a black
/// box.
///
/// The engine registers offer visibility with `offer`, asks for an
/// allocation with `schedule`, and reports consumed or declined offers back
/// with `rescind`.
#[async_trait]
pub trait SchedulingService: Send + Sync {
    /// Make a batch of offers visible to the scheduling algorithm.
    ///
    /// Side-effecting; the engine consumes no return value.
    async fn offer(&self, offers: &[Offer]);

    /// Compute an allocation for `tasks` under `filter` against the
    /// currently visible offers.
    async fn schedule(
        &self,
        tasks: &[TaskDescriptor],
        filter: Option<&Filter>,
    ) -> Result<TaskAllocation, ScheduleError>;

    /// Report that the given offers are no longer valid (consumed or
    /// declined). Idempotent; no failure is surfaced to the engine.
    async fn rescind(&self, offer_ids: &[String]);
}
