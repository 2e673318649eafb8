//! Long-running call-sites of the agent loop.
//!
//! Background jobs run detached from the request that started them and talk
//! to live clients only through the [`ProgressHub`]. Job status lives on a
//! [`JobBoard`] so SSE consumers can tell when to stop.

pub mod analysis;
pub mod term;
pub mod translation;

use crate::error::JobError;
use crate::progress::{JobBoard, JobStatus, ProgressEvent, ProgressHub};
use crate::tools::clip_chars;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

const STATUS_ERROR_CHARS: usize = 200;

/// One section of a paper as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionText {
    pub title: Option<String>,
    /// Markdown body; may be empty for sections that failed to parse.
    pub content: String,
}

/// A project term with its agreed translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownTerm {
    pub phrase: String,
    pub translation: String,
    pub definition: Option<String>,
}

/// Run `work` as a detached job.
///
/// The job is marked queued immediately, running once the task starts, and
/// succeeded or failed when `work` returns. Each transition is published as
/// a `status` event; a failure also publishes an `error` event.
pub fn spawn_job<F>(
    hub: Arc<ProgressHub>,
    board: Arc<JobBoard>,
    job_id: Uuid,
    work: F,
) -> JoinHandle<()>
where
    F: Future<Output = Result<(), JobError>> + Send + 'static,
{
    board.set(job_id, JobStatus::Queued);
    tokio::spawn(async move {
        board.set(job_id, JobStatus::Running);
        hub.publish(job_id, ProgressEvent::status(JobStatus::Running));
        info!(%job_id, "job started");

        match work.await {
            Ok(()) => {
                // the terminal frame must be queued before consumers can see
                // a finished job
                hub.publish(job_id, ProgressEvent::status(JobStatus::Succeeded));
                board.set(job_id, JobStatus::Succeeded);
                info!(%job_id, "job succeeded");
            }
            Err(err) => {
                error!(%job_id, error = %err, "job failed");
                let message = err.to_string();
                hub.publish(
                    job_id,
                    ProgressEvent::Status {
                        status: JobStatus::Failed,
                        error: Some(clip_chars(&message, STATUS_ERROR_CHARS)),
                    },
                );
                hub.publish(job_id, ProgressEvent::Error { message });
                board.set(job_id, JobStatus::Failed);
            }
        }
    })
}
