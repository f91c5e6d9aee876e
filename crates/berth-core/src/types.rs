//! Shared types used across Berth crates.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Resources a task needs, or an offer advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cpu_weight: u32,
    pub memory_bytes: u64,
}

impl ResourceSpec {
    /// Whether these requirements fit inside `available`.
    pub fn fits_within(&self, available: &ResourceSpec) -> bool {
        self.cpu_weight <= available.cpu_weight && self.memory_bytes <= available.memory_bytes
    }
}

/// What a task actually runs: a plain command or a container image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobSpec {
    Command {
        program: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Container {
        image: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
}

/// A caller-specified unit of work. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub name: String,
    pub resources: ResourceSpec,
    pub job: JobSpec,
}

/// Narrows which offers a request's tasks may use.
///
/// An empty `hosts` list allows any host. `required_labels` must all be
/// present (with equal values) in an offer's labels for it to qualify.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub hosts: Vec<String>,
    pub required_labels: HashMap<String, String>,
}

impl Filter {
    /// Whether an offer passes this filter.
    pub fn admits(&self, offer: &Offer) -> bool {
        let host_ok = self.hosts.is_empty() || self.hosts.iter().any(|h| h == &offer.host);
        let labels_ok = self
            .required_labels
            .iter()
            .all(|(k, v)| offer.labels.get(k).is_some_and(|ov| ov == v));
        host_ok && labels_ok
    }
}

/// A batch of tasks submitted together, processed as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub tasks: Vec<TaskDescriptor>,
    pub filter: Option<Filter>,
}

impl TaskRequest {
    pub fn new(tasks: Vec<TaskDescriptor>, filter: Option<Filter>) -> Self {
        Self { tasks, filter }
    }
}

/// Opaque identity of a submitted request.
///
/// Issued at submission time, decoupled from request content, so two
/// structurally identical submissions never collide in the registry.
/// Ordering follows submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// A time-limited advertisement of resources on a specific host.
///
/// Supplied by the cluster manager, consumed within the processing of one
/// offer batch, never persisted beyond it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub host: String,
    pub resources: ResourceSpec,
    pub labels: HashMap<String, String>,
}

/// One offer paired with the ordered tasks the scheduling service assigned
/// to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferAssignment {
    pub offer: Offer,
    pub tasks: Vec<TaskDescriptor>,
}

/// The scheduling service's assignment of a request's tasks to offers.
///
/// Produced fresh per matching attempt, never merged across attempts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskAllocation {
    pub assignments: Vec<OfferAssignment>,
}

impl TaskAllocation {
    /// Offer ids consumed by this allocation.
    pub fn offer_ids(&self) -> Vec<String> {
        self.assignments.iter().map(|a| a.offer.id.clone()).collect()
    }

    /// Whether the allocation consumes the given offer.
    pub fn uses_offer(&self, offer_id: &str) -> bool {
        self.assignments.iter().any(|a| a.offer.id == offer_id)
    }

    /// Total number of assigned tasks across all offers.
    pub fn task_count(&self) -> usize {
        self.assignments.iter().map(|a| a.tasks.len()).sum()
    }
}

/// A task that has been handed to the framework driver for launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchedTask {
    pub task: TaskDescriptor,
    pub offer_id: String,
    pub host: String,
    /// Launch-assigned task identifier from the framework driver.
    pub task_id: String,
}
