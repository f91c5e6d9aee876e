//! berth-testkit — test doubles for the Berth collaborator contracts.
//!
//! - [`FirstFitScheduling`] — a `SchedulingService` that packs tasks onto
//!   visible offers first-fit, with scriptable refusals
//! - [`RecordingDriver`] — a `FrameworkDriver` that assigns sequential task
//!   ids and records every launch and decline, with scriptable failures
//! - [`ScriptedEvents`] — an `EventSource` fed by pushing events from the
//!   test body
//!
//! The doubles are deliberately simple: the production scheduling algorithm
//! is an external collaborator, and these exist only to exercise the
//! engine's matching, launch, and resolution paths.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use berth_core::{Filter, Offer, OfferAssignment, TaskAllocation, TaskDescriptor};
use berth_driver::{
    DriverError, DriverResult, EventSource, FrameworkDriver, LaunchSpec, OfferEvent,
    ScheduleError, SchedulingService,
};

/// A first-fit mock scheduling service.
///
/// `offer` replaces the visible batch (the engine registers visibility
/// before every schedule attempt). `schedule` walks the request's tasks in
/// order and assigns each to the first admitted offer with enough remaining
/// capacity, or fails with `Unsatisfiable`. Refusals queued with
/// [`refuse_next`](FirstFitScheduling::refuse_next) are returned before any
/// packing happens, one per `schedule` call.
#[derive(Default)]
pub struct FirstFitScheduling {
    inner: Mutex<SchedulingInner>,
}

#[derive(Default)]
struct SchedulingInner {
    visible: Vec<Offer>,
    refusals: Vec<ScheduleError>,
    offer_calls: usize,
    schedule_calls: usize,
    rescinded: Vec<String>,
}

impl FirstFitScheduling {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error to be returned by the next `schedule` call.
    pub fn refuse_next(&self, err: ScheduleError) {
        self.inner.lock().unwrap().refusals.push(err);
    }

    /// Offer ids reported back via `rescind`, in call order.
    pub fn rescinded(&self) -> Vec<String> {
        self.inner.lock().unwrap().rescinded.clone()
    }

    /// Number of `offer` visibility registrations seen.
    pub fn offer_calls(&self) -> usize {
        self.inner.lock().unwrap().offer_calls
    }

    /// Number of `schedule` attempts seen.
    pub fn schedule_calls(&self) -> usize {
        self.inner.lock().unwrap().schedule_calls
    }
}

fn first_fit(
    tasks: &[TaskDescriptor],
    filter: Option<&Filter>,
    visible: &[Offer],
) -> Result<TaskAllocation, ScheduleError> {
    // Remaining capacity per visible offer, consumed as tasks land on it.
    let mut remaining: Vec<(Offer, u32, u64)> = visible
        .iter()
        .filter(|o| filter.is_none_or(|f| f.admits(o)))
        .map(|o| (o.clone(), o.resources.cpu_weight, o.resources.memory_bytes))
        .collect();

    let mut per_offer: HashMap<String, Vec<TaskDescriptor>> = HashMap::new();
    let mut offer_order: Vec<Offer> = Vec::new();

    for task in tasks {
        let slot = remaining
            .iter_mut()
            .find(|(_, cpu, mem)| task.resources.cpu_weight <= *cpu && task.resources.memory_bytes <= *mem)
            .ok_or(ScheduleError::Unsatisfiable)?;

        slot.1 -= task.resources.cpu_weight;
        slot.2 -= task.resources.memory_bytes;

        if !per_offer.contains_key(&slot.0.id) {
            offer_order.push(slot.0.clone());
        }
        per_offer.entry(slot.0.id.clone()).or_default().push(task.clone());
    }

    let assignments = offer_order
        .into_iter()
        .map(|offer| {
            let tasks = per_offer.remove(&offer.id).unwrap_or_default();
            OfferAssignment { offer, tasks }
        })
        .collect();

    Ok(TaskAllocation { assignments })
}

#[async_trait]
impl SchedulingService for FirstFitScheduling {
    async fn offer(&self, offers: &[Offer]) {
        let mut inner = self.inner.lock().unwrap();
        inner.visible = offers.to_vec();
        inner.offer_calls += 1;
    }

    async fn schedule(
        &self,
        tasks: &[TaskDescriptor],
        filter: Option<&Filter>,
    ) -> Result<TaskAllocation, ScheduleError> {
        let (refusal, visible) = {
            let mut inner = self.inner.lock().unwrap();
            inner.schedule_calls += 1;
            let refusal = if inner.refusals.is_empty() {
                None
            } else {
                Some(inner.refusals.remove(0))
            };
            (refusal, inner.visible.clone())
        };

        if let Some(err) = refusal {
            return Err(err);
        }
        first_fit(tasks, filter, &visible)
    }

    async fn rescind(&self, offer_ids: &[String]) {
        let mut inner = self.inner.lock().unwrap();
        inner.rescinded.extend(offer_ids.iter().cloned());
    }
}

/// A framework driver that records launches and declines.
///
/// Assigns task identifiers `task-0`, `task-1`, … across all launches, in
/// record order.
#[derive(Default)]
pub struct RecordingDriver {
    inner: Mutex<DriverInner>,
}

#[derive(Default)]
struct DriverInner {
    launches: Vec<(Vec<String>, Vec<LaunchSpec>)>,
    declines: Vec<String>,
    next_task: usize,
    launch_failures: Vec<String>,
    decline_failures: bool,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `launch` call fail with the given message.
    pub fn fail_next_launch(&self, message: &str) {
        self.inner.lock().unwrap().launch_failures.push(message.to_string());
    }

    /// Make every `decline` call fail.
    pub fn fail_declines(&self) {
        self.inner.lock().unwrap().decline_failures = true;
    }

    /// Every launch call seen: (offer ids, launch records).
    pub fn launches(&self) -> Vec<(Vec<String>, Vec<LaunchSpec>)> {
        self.inner.lock().unwrap().launches.clone()
    }

    /// Every declined offer id, in call order.
    pub fn declines(&self) -> Vec<String> {
        self.inner.lock().unwrap().declines.clone()
    }
}

#[async_trait]
impl FrameworkDriver for RecordingDriver {
    async fn launch(&self, offer_ids: &[String], tasks: &[LaunchSpec]) -> DriverResult<Vec<String>> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.launch_failures.is_empty() {
            let message = inner.launch_failures.remove(0);
            return Err(DriverError::Launch(message));
        }

        let ids = tasks
            .iter()
            .map(|_| {
                let id = format!("task-{}", inner.next_task);
                inner.next_task += 1;
                id
            })
            .collect();
        inner.launches.push((offer_ids.to_vec(), tasks.to_vec()));
        Ok(ids)
    }

    async fn decline(&self, offer_id: &str) -> DriverResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.decline_failures {
            return Err(DriverError::Decline(format!("refused {offer_id}")));
        }
        inner.declines.push(offer_id.to_string());
        Ok(())
    }
}

/// An event source fed by the test body.
///
/// `subscribe` hands out the single receiver; a second subscription fails,
/// which lets tests assert the engine subscribes exactly once.
pub struct ScriptedEvents {
    tx: mpsc::Sender<OfferEvent>,
    rx: Mutex<Option<mpsc::Receiver<OfferEvent>>>,
    subscriptions: Mutex<usize>,
}

impl ScriptedEvents {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            subscriptions: Mutex::new(0),
        }
    }

    /// Push an offer batch into the stream.
    pub async fn push_offers(&self, offers: Vec<Offer>) {
        self.tx
            .send(OfferEvent::Offers(offers))
            .await
            .expect("event receiver dropped");
    }

    /// Push a rescind notification into the stream.
    pub async fn push_rescind(&self, offer_id: &str) {
        self.tx
            .send(OfferEvent::Rescinded(offer_id.to_string()))
            .await
            .expect("event receiver dropped");
    }

    /// Number of `subscribe` calls seen.
    pub fn subscriptions(&self) -> usize {
        *self.subscriptions.lock().unwrap()
    }
}

impl Default for ScriptedEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for ScriptedEvents {
    async fn subscribe(&self) -> DriverResult<mpsc::Receiver<OfferEvent>> {
        *self.subscriptions.lock().unwrap() += 1;
        self.rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| DriverError::Subscribe("already subscribed".to_string()))
    }
}
