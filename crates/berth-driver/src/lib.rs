//! berth-driver — the contracts Berth consumes from its collaborators.
//!
//! The placement engine treats three external systems as given:
//!
//! - **`SchedulingService`** — the opaque bin-packing/constraint-matching
//!   algorithm that turns (tasks, filter, visible offers) into a
//!   `TaskAllocation`
//! - **`FrameworkDriver`** — the cluster-manager connection that launches
//!   tasks on hosts and declines unused offers
//! - **`EventSource`** — the transport delivering offer and rescind events
//!
//! All three are dyn-compatible async traits so the engine can hold them as
//! `Arc<dyn …>` and tests can substitute doubles (see `berth-testkit`).

pub mod error;
pub mod events;
pub mod framework;
pub mod scheduling;

pub use error::{DriverError, DriverResult, ScheduleError};
pub use events::{EventSource, OfferEvent};
pub use framework::{FrameworkDriver, LaunchSpec};
pub use scheduling::SchedulingService;
