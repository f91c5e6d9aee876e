//! berth-core — shared types for the Berth placement engine.
//!
//! Berth matches pending task requests against transient resource offers
//! from a cluster manager and launches the matched work on the offering
//! hosts. This crate carries the domain vocabulary shared by every other
//! Berth crate:
//!
//! - `TaskDescriptor` / `JobSpec` / `ResourceSpec` — units of work
//! - `TaskRequest` / `RequestId` — a submitted batch of tasks
//! - `Offer` — advertised capacity on a specific host
//! - `TaskAllocation` — the scheduling service's task → offer assignment
//! - `LaunchedTask` — a task paired with its launch-assigned identifier
//! - `SchedulerConfig` — engine tuning, TOML-loadable

pub mod config;
pub mod types;

pub use config::SchedulerConfig;
pub use types::*;
