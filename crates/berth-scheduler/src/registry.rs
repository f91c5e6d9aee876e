//! Pending request registry.
//!
//! An arena of requests awaiting offers. Every submission gets an opaque
//! `RequestId` issued from a monotonic counter, so structurally identical
//! requests never collide; the ordered map over those ids makes "registry
//! order" deterministic submission order for the matcher's first-fit walk.
//!
//! Concurrent batches coordinate through per-entry claim flags: a matcher
//! must `claim` an entry before attempting an allocation against it, and a
//! snapshot that has gone stale simply loses the claim and skips the entry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, oneshot};

use berth_core::{LaunchedTask, RequestId, TaskRequest};

use crate::error::{SchedulerError, SchedulerResult};

/// Producer half of a request's single-assignment completion slot.
pub(crate) type CompletionSender = oneshot::Sender<SchedulerResult<Vec<LaunchedTask>>>;

/// Caller-facing half of a completion handle.
///
/// Resolves exactly once: with the launched tasks in submission order, or
/// with the failure that ended the request.
pub struct PendingLaunch {
    id: RequestId,
    rx: oneshot::Receiver<SchedulerResult<Vec<LaunchedTask>>>,
}

impl PendingLaunch {
    /// The opaque identity assigned at submission.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the request to complete.
    pub async fn wait(self) -> SchedulerResult<Vec<LaunchedTask>> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(SchedulerError::Abandoned),
        }
    }
}

/// A request removed from the registry, with its completion sender.
///
/// Whoever holds this owes the caller a resolution.
pub(crate) struct ClaimedRequest {
    pub id: RequestId,
    pub request: TaskRequest,
    pub completion: CompletionSender,
}

struct PendingEntry {
    request: TaskRequest,
    claimed: bool,
    refusals: u32,
    completion: CompletionSender,
}

/// Thread-safe registry of requests awaiting offers.
pub struct PendingRegistry {
    entries: RwLock<BTreeMap<RequestId, PendingEntry>>,
    next_id: AtomicU64,
    max_refusals: Option<u32>,
}

impl PendingRegistry {
    pub fn new(max_refusals: Option<u32>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
            max_refusals,
        }
    }

    /// Insert a request with a fresh id and a fresh completion handle.
    pub async fn submit(&self, request: TaskRequest) -> (RequestId, PendingLaunch) {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();

        let mut entries = self.entries.write().await;
        entries.insert(
            id,
            PendingEntry {
                request,
                claimed: false,
                refusals: 0,
                completion: tx,
            },
        );
        (id, PendingLaunch { id, rx })
    }

    /// Delete an entry if present, yielding its request and completion
    /// sender. Removing an absent id is a no-op.
    pub(crate) async fn remove(&self, id: RequestId) -> Option<ClaimedRequest> {
        let mut entries = self.entries.write().await;
        entries.remove(&id).map(|entry| ClaimedRequest {
            id,
            request: entry.request,
            completion: entry.completion,
        })
    }

    /// Point-in-time ordered view of waiting requests.
    ///
    /// The view can go stale under concurrent mutation; consumers must
    /// re-validate through `claim` before acting on an entry.
    pub async fn snapshot(&self) -> Vec<(RequestId, TaskRequest)> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(id, entry)| (*id, entry.request.clone()))
            .collect()
    }

    /// Set the entry's claimed flag. Fails if the entry is gone or another
    /// batch already holds the claim.
    pub(crate) async fn claim(&self, id: RequestId) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&id) {
            Some(entry) if !entry.claimed => {
                entry.claimed = true;
                true
            }
            _ => false,
        }
    }

    /// Clear the claimed flag after an abandoned attempt.
    pub(crate) async fn release(&self, id: RequestId) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&id) {
            entry.claimed = false;
        }
    }

    /// Clear the claim and count one recoverable scheduling refusal.
    ///
    /// When a `max_refusals` bound is configured and this refusal exhausts
    /// it, the entry is removed and returned so the caller can fail its
    /// handle. Unbounded registries always return `None`.
    pub(crate) async fn record_refusal(&self, id: RequestId) -> Option<ClaimedRequest> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id)?;
        entry.claimed = false;
        entry.refusals += 1;

        match self.max_refusals {
            Some(limit) if entry.refusals >= limit => {
                entries.remove(&id).map(|entry| ClaimedRequest {
                    id,
                    request: entry.request,
                    completion: entry.completion,
                })
            }
            _ => None,
        }
    }

    /// Remove and return every waiting request (shutdown path).
    pub(crate) async fn drain(&self) -> Vec<ClaimedRequest> {
        let mut entries = self.entries.write().await;
        std::mem::take(&mut *entries)
            .into_iter()
            .map(|(id, entry)| ClaimedRequest {
                id,
                request: entry.request,
                completion: entry.completion,
            })
            .collect()
    }

    /// Number of requests currently waiting.
    pub async fn pending_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the given request is still waiting.
    pub async fn contains(&self, id: RequestId) -> bool {
        self.entries.read().await.contains_key(&id)
    }
}
