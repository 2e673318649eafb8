//! SSE framing of a job's progress queue.

use super::{JobStatus, ProgressEvent, ProgressHub, ProgressSubscription};
use crate::config::ProgressConfig;
use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Final frame of every progress stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Where the frame stream learns whether a job has finished.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    /// `None` when the job is unknown.
    async fn job_status(&self, job_id: Uuid) -> Option<JobStatus>;
}

/// In-process job status table.
#[derive(Default)]
pub struct JobBoard {
    jobs: Mutex<HashMap<Uuid, JobStatus>>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, job_id: Uuid, status: JobStatus) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, status);
    }

    pub fn get(&self, job_id: Uuid) -> Option<JobStatus> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .copied()
    }
}

#[async_trait]
impl JobStatusSource for JobBoard {
    async fn job_status(&self, job_id: Uuid) -> Option<JobStatus> {
        self.get(job_id)
    }
}

/// One `data:` frame for `event`.
pub fn frame(event: &ProgressEvent) -> String {
    match serde_json::to_string(event) {
        Ok(json) => format!("data: {json}\n\n"),
        Err(err) => {
            warn!(error = %err, "progress event could not be serialized");
            "data: {\"type\":\"error\",\"message\":\"unserializable progress event\"}\n\n".to_string()
        }
    }
}

struct FrameState {
    snapshot: Option<ProgressEvent>,
    subscription: Option<ProgressSubscription>,
    status: Arc<dyn JobStatusSource>,
    poll_timeout: Duration,
}

/// Turn a subscription into SSE frames.
///
/// An optional `snapshot` goes out first. Each poll that times out checks
/// the job: a terminal (or vanished) job with an empty queue ends the stream
/// with [`DONE_FRAME`], anything else yields a `ping` keepalive. The
/// subscription is released when the stream ends or is dropped.
pub fn progress_frames(
    subscription: ProgressSubscription,
    status: Arc<dyn JobStatusSource>,
    poll_timeout: Duration,
    snapshot: Option<ProgressEvent>,
) -> impl Stream<Item = String> + Send {
    let state = FrameState {
        snapshot,
        subscription: Some(subscription),
        status,
        poll_timeout,
    };
    stream::unfold(state, |mut state| async move {
        if let Some(snapshot) = state.snapshot.take() {
            return Some((frame(&snapshot), state));
        }
        let subscription = state.subscription.as_ref()?;
        let job_id = subscription.job_id();
        if let Some(event) = subscription.recv_timeout(state.poll_timeout).await {
            return Some((frame(&event), state));
        }
        let current = state.status.job_status(job_id).await;
        let finished = current.map_or(true, JobStatus::is_terminal);
        if finished && subscription.is_empty() {
            debug!(%job_id, status = ?current, "progress stream complete");
            state.subscription = None;
            return Some((DONE_FRAME.to_string(), state));
        }
        Some((frame(&ProgressEvent::Ping), state))
    })
}

/// Subscribe to `job_id` and stream its frames with the configured poll
/// timeout.
pub fn job_frames(
    hub: &Arc<ProgressHub>,
    job_id: Uuid,
    status: Arc<dyn JobStatusSource>,
    config: &ProgressConfig,
    snapshot: Option<ProgressEvent>,
) -> impl Stream<Item = String> + Send {
    progress_frames(hub.subscribe(job_id), status, config.poll_timeout(), snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ProgressHub, StepProgress};
    use futures_util::StreamExt;
    use serde_json::{json, Map};

    fn job(status: JobStatus) -> (Arc<ProgressHub>, Arc<JobBoard>, Uuid) {
        let board = Arc::new(JobBoard::new());
        let id = Uuid::new_v4();
        board.set(id, status);
        (Arc::new(ProgressHub::default()), board, id)
    }

    // Verifies queued events drain before the terminal check ends the stream.
    #[tokio::test(start_paused = true)]
    async fn drains_queue_then_finishes() {
        let (hub, board, id) = job(JobStatus::Running);
        let sub = hub.subscribe(id);
        hub.publish(id, StepProgress::new("start", 0, 2).into());
        hub.publish(id, ProgressEvent::status(JobStatus::Succeeded));
        board.set(id, JobStatus::Succeeded);

        let frames: Vec<String> =
            progress_frames(sub, board, Duration::from_secs(15), None).collect().await;
        assert_eq!(
            frames,
            vec![
                "data: {\"type\":\"progress\",\"step\":\"start\",\"current\":0,\"total\":2}\n\n".to_string(),
                "data: {\"type\":\"status\",\"status\":\"succeeded\"}\n\n".to_string(),
                DONE_FRAME.to_string(),
            ]
        );
        assert!(!hub.has_queue(id));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_running_job_gets_keepalives() {
        let (hub, board, id) = job(JobStatus::Running);
        let sub = hub.subscribe(id);
        let mut frames = Box::pin(progress_frames(sub, board.clone(), Duration::from_secs(15), None));

        assert_eq!(frames.next().await.unwrap(), "data: {\"type\":\"ping\"}\n\n");
        assert_eq!(frames.next().await.unwrap(), "data: {\"type\":\"ping\"}\n\n");
        board.set(id, JobStatus::Failed);
        assert_eq!(frames.next().await.unwrap(), DONE_FRAME);
        assert!(frames.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_leads_and_unknown_job_ends() {
        let hub = Arc::new(ProgressHub::default());
        let board = Arc::new(JobBoard::new());
        let id = Uuid::new_v4();
        let sub = hub.subscribe(id);
        let mut body = Map::new();
        body.insert("content_md".into(), json!("## Intro"));

        let frames: Vec<String> = progress_frames(
            sub,
            board,
            Duration::from_secs(1),
            Some(ProgressEvent::Snapshot(body)),
        )
        .collect()
        .await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], "data: {\"type\":\"snapshot\",\"content_md\":\"## Intro\"}\n\n");
        assert_eq!(frames[1], DONE_FRAME);
    }

    // Verifies the configured poll timeout paces keepalives.
    #[tokio::test(start_paused = true)]
    async fn configured_poll_timeout_paces_keepalives() {
        let (hub, board, id) = job(JobStatus::Running);
        let config = ProgressConfig {
            poll_timeout_secs: 3,
            ..ProgressConfig::default()
        };
        let mut frames = Box::pin(job_frames(&hub, id, board.clone(), &config, None));
        assert_eq!(hub.subscriber_count(id), 1);

        let start = tokio::time::Instant::now();
        assert_eq!(frames.next().await.unwrap(), "data: {\"type\":\"ping\"}\n\n");
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        board.set(id, JobStatus::Succeeded);
        assert_eq!(frames.next().await.unwrap(), DONE_FRAME);
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_the_subscription() {
        let (hub, board, id) = job(JobStatus::Running);
        let keep = hub.subscribe(id);
        let frames = progress_frames(hub.subscribe(id), board, Duration::from_secs(15), None);
        assert_eq!(hub.subscriber_count(id), 2);
        drop(frames);
        assert_eq!(hub.subscriber_count(id), 1);
        drop(keep);
        assert!(!hub.has_queue(id));
    }
}
