//! The cluster framework driver contract.

use async_trait::async_trait;
use berth_core::{JobSpec, ResourceSpec};
use serde::{Deserialize, Serialize};

use crate::error::DriverResult;

/// A launch-ready task record: one task bound to one offer on one host.
///
/// Built by the launch orchestrator from the (offer, descriptor) pairs of a
/// successful allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub name: String,
    pub offer_id: String,
    pub host: String,
    pub resources: ResourceSpec,
    pub job: JobSpec,
}

/// The connection to the cluster manager.
#[async_trait]
pub trait FrameworkDriver: Send + Sync {
    /// Launch `tasks` against the given offer ids, all on one host.
    ///
    /// Resolves once the host has accepted the launch, yielding one
    /// launch-assigned task identifier per record, in record order.
    async fn launch(&self, offer_ids: &[String], tasks: &[LaunchSpec]) -> DriverResult<Vec<String>>;

    /// Tell the cluster manager a single offer will not be used.
    ///
    /// Declining an offer the manager no longer knows about is a no-op.
    async fn decline(&self, offer_id: &str) -> DriverResult<()>;
}
