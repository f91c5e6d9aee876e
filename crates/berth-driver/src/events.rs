//! The offer/rescind event stream contract.

use async_trait::async_trait;
use berth_core::Offer;
use tokio::sync::mpsc;

use crate::error::DriverResult;

/// One notification from the cluster manager's event transport.
#[derive(Debug, Clone, PartialEq)]
pub enum OfferEvent {
    /// A batch of offers advertising available capacity.
    Offers(Vec<Offer>),
    /// A previously advertised offer is no longer valid.
    Rescinded(String),
}

/// A subscribable stream of offer events.
///
/// The engine subscribes exactly once, lazily, on the first task
/// submission; the receiver stays open for the life of the subscription.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(&self) -> DriverResult<mpsc::Receiver<OfferEvent>>;
}
