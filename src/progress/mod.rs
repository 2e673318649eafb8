//! Per-job progress fan-out.
//!
//! A background job publishes [`ProgressEvent`]s under its id; any number of
//! SSE consumers subscribe to the same id and drain a shared bounded queue.
//! The queue lives exactly as long as at least one subscription does.
//! Publishing never blocks: a full queue drops its oldest event.

pub mod sse;

use crate::agent::{ProgressSink, ToolActivity, ToolStatus};
use crate::config::ProgressConfig;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;

pub use sse::{job_frames, progress_frames, JobBoard, JobStatusSource};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Lifecycle state of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// No further events will be published once a job is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// One progress frame, serialized as `{"type": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Status {
        status: JobStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Progress(StepProgress),
    ToolCall {
        tool: String,
        query: String,
    },
    ToolResult {
        tool: String,
        query: String,
        result_count: usize,
    },
    DimensionResult {
        dimension: String,
        dimension_title: String,
        summary: String,
    },
    SectionError {
        section_title: String,
        error: String,
    },
    /// State already persisted before the consumer connected.
    Snapshot(Map<String, Value>),
    Error {
        message: String,
    },
    Done,
    Ping,
}

impl ProgressEvent {
    pub fn status(status: JobStatus) -> Self {
        Self::Status {
            status,
            error: None,
        }
    }
}

/// Payload of a `progress` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepProgress {
    pub step: String,
    pub current: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension_title: Option<String>,
}

impl StepProgress {
    pub fn new(step: &str, current: usize, total: usize) -> Self {
        Self {
            step: step.to_string(),
            current,
            total,
            ..Self::default()
        }
    }

    pub fn section(mut self, title: &str) -> Self {
        self.section_title = Some(title.to_string());
        self
    }

    pub fn dimension(mut self, key: &str, title: &str) -> Self {
        self.dimension = Some(key.to_string());
        self.dimension_title = Some(title.to_string());
        self
    }
}

impl From<StepProgress> for ProgressEvent {
    fn from(step: StepProgress) -> Self {
        Self::Progress(step)
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Bounded drop-oldest FIFO shared by every subscriber of one job.
#[derive(Debug)]
pub struct ProgressQueue {
    capacity: usize,
    items: Mutex<VecDeque<ProgressEvent>>,
    notify: Notify,
}

impl ProgressQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ProgressEvent>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: ProgressEvent) {
        {
            let mut items = self.lock();
            if items.len() >= self.capacity {
                items.pop_front();
                trace!(capacity = self.capacity, "progress queue full; dropped oldest event");
            }
            items.push_back(event);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<ProgressEvent> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Next event, waiting at most `timeout`.
    async fn recv_timeout(&self, timeout: Duration) -> Option<ProgressEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(event) = self.pop() {
                return Some(event);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.pop();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

struct Entry {
    queue: Arc<ProgressQueue>,
    refs: usize,
}

/// Registry of live progress queues keyed by job id.
pub struct ProgressHub {
    capacity: usize,
    queues: Mutex<HashMap<Uuid, Entry>>,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::from_config(&ProgressConfig::default())
    }
}

impl ProgressHub {
    pub fn from_config(config: &ProgressConfig) -> Self {
        Self::with_capacity(config.queue_capacity)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: Mutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `event` for `job_id`. Without a live subscription this is a
    /// no-op.
    pub fn publish(&self, job_id: Uuid, event: ProgressEvent) {
        let queue = self.registry().get(&job_id).map(|e| e.queue.clone());
        match queue {
            Some(queue) => queue.push(event),
            None => debug!(%job_id, "no subscribers; progress event discarded"),
        }
    }

    /// Attach to `job_id`'s queue, creating it on first use.
    pub fn subscribe(self: &Arc<Self>, job_id: Uuid) -> ProgressSubscription {
        let queue = {
            let mut registry = self.registry();
            let entry = registry.entry(job_id).or_insert_with(|| Entry {
                queue: Arc::new(ProgressQueue::new(self.capacity)),
                refs: 0,
            });
            entry.refs += 1;
            debug!(%job_id, refs = entry.refs, "progress subscriber attached");
            entry.queue.clone()
        };
        ProgressSubscription {
            hub: self.clone(),
            job_id,
            queue,
        }
    }

    fn release(&self, job_id: Uuid) {
        let mut registry = self.registry();
        let Some(entry) = registry.get_mut(&job_id) else {
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        debug!(%job_id, refs = entry.refs, "progress subscriber released");
        if entry.refs == 0 {
            registry.remove(&job_id);
        }
    }

    /// Live subscriptions for `job_id`.
    pub fn subscriber_count(&self, job_id: Uuid) -> usize {
        self.registry().get(&job_id).map_or(0, |e| e.refs)
    }

    pub fn has_queue(&self, job_id: Uuid) -> bool {
        self.registry().contains_key(&job_id)
    }
}

/// Handle on a job's queue; dropping it releases the reference.
pub struct ProgressSubscription {
    hub: Arc<ProgressHub>,
    job_id: Uuid,
    queue: Arc<ProgressQueue>,
}

impl ProgressSubscription {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub async fn recv_timeout(&self, timeout: Duration) -> Option<ProgressEvent> {
        self.queue.recv_timeout(timeout).await
    }

    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Explicit form of dropping the subscription.
    pub fn release(self) {}
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.hub.release(self.job_id);
    }
}

/// Publishes an agent's tool lifecycle into a job's queue.
pub struct HubSink {
    hub: Arc<ProgressHub>,
    job_id: Uuid,
}

impl HubSink {
    pub fn new(hub: Arc<ProgressHub>, job_id: Uuid) -> Self {
        Self { hub, job_id }
    }
}

impl ProgressSink for HubSink {
    fn on_tool(&self, activity: ToolActivity) {
        let event = match activity.status {
            ToolStatus::Calling => ProgressEvent::ToolCall {
                tool: activity.tool,
                query: activity.query,
            },
            ToolStatus::Done { result_count } => ProgressEvent::ToolResult {
                tool: activity.tool,
                query: activity.query,
                result_count,
            },
        };
        self.hub.publish(self.job_id, event);
    }
}
