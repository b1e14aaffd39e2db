//! Submit-then-poll job execution.
//!
//! [`JobRunner::run_job`] posts a prepared template to ComfyUI, then
//! polls the history endpoint on a fixed interval until the backend
//! reports a terminal state, and finally extracts the produced artifacts.
//!
//! The whole submit + poll cycle is bounded by an optional deadline and
//! can be cancelled through a [`CancellationToken`]. Dropping the returned
//! future also stops polling. Neither cancels the job on the backend.

use std::sync::Arc;
use std::time::Duration;

use comfymcp_core::template::JobTemplate;
use tokio_util::sync::CancellationToken;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::history::{parse_history, ArtifactRef, JobStatus, Outcome};

/// Default delay between history polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default upper bound on a job's total submit + poll time.
pub const DEFAULT_JOB_DEADLINE: Duration = Duration::from_secs(600);

/// Polling behaviour for [`JobRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Sleep before each history request.
    pub interval: Duration,
    /// Overall limit for one job; `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: Some(DEFAULT_JOB_DEADLINE),
        }
    }
}

/// A job that finished successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedJob {
    pub prompt_id: String,
    pub artifacts: Vec<ArtifactRef>,
    /// Number of history requests made.
    pub polls: u32,
}

/// Errors from running a job end to end.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The backend rejected the submission with a non-2xx status.
    #[error("Job submission failed ({status}): {body}")]
    SubmissionFailed { status: u16, body: String },

    /// A history request returned a non-2xx status.
    #[error("Polling job {prompt_id} failed ({status}): {body}")]
    PollFailed {
        prompt_id: String,
        status: u16,
        body: String,
    },

    /// The request never got a response (connection, DNS, timeout).
    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// A response arrived but did not match the backend contract.
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    /// The backend reported the job as failed.
    #[error(
        "Job {prompt_id} failed with status '{status}'{}",
        .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
    )]
    JobFailed {
        prompt_id: String,
        status: String,
        detail: Option<String>,
    },

    /// The job succeeded but no output contained an artifact list.
    #[error("Job {prompt_id} completed but no output node produced images")]
    NoArtifactsProduced { prompt_id: String },

    #[error("Job did not finish within {}s", .waited.as_secs())]
    DeadlineExceeded { waited: Duration },

    #[error("Job was cancelled")]
    Cancelled,
}

impl JobError {
    fn from_submit(err: ComfyUIApiError) -> Self {
        match err {
            ComfyUIApiError::ApiError { status, body } => Self::SubmissionFailed { status, body },
            other => Self::from_transport(other),
        }
    }

    fn from_poll(err: ComfyUIApiError, prompt_id: &str) -> Self {
        match err {
            ComfyUIApiError::ApiError { status, body } => Self::PollFailed {
                prompt_id: prompt_id.to_string(),
                status,
                body,
            },
            other => Self::from_transport(other),
        }
    }

    fn from_transport(err: ComfyUIApiError) -> Self {
        match err {
            ComfyUIApiError::Request(e) => Self::Transport(e),
            ComfyUIApiError::MalformedResponse(msg) | ComfyUIApiError::InvalidUrl(msg) => {
                Self::MalformedResponse(msg)
            }
            ComfyUIApiError::ApiError { status, body } => {
                Self::MalformedResponse(format!("unexpected status {status}: {body}"))
            }
        }
    }

    /// Whether the failure came from the HTTP transport rather than from
    /// what the backend said.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::SubmissionFailed { .. } | Self::PollFailed { .. } | Self::Transport(_)
        )
    }

    /// Whether the backend broke its response contract.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::MalformedResponse(_) | Self::NoArtifactsProduced { .. }
        )
    }
}

/// Executes prepared templates against one ComfyUI instance.
///
/// Holds no per-job state, so one runner serves any number of concurrent
/// jobs.
#[derive(Debug, Clone)]
pub struct JobRunner {
    api: Arc<ComfyUIApi>,
    poll: PollConfig,
}

impl JobRunner {
    pub fn new(api: Arc<ComfyUIApi>, poll: PollConfig) -> Self {
        Self { api, poll }
    }

    pub fn api(&self) -> &ComfyUIApi {
        &self.api
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    /// Submit `template`, wait for it to finish, and return its artifacts.
    pub async fn run_job(
        &self,
        template: &JobTemplate,
        cancel: &CancellationToken,
    ) -> Result<CompletedJob, JobError> {
        let bounded = async {
            match self.poll.deadline {
                Some(deadline) => tokio::time::timeout(deadline, self.submit_and_poll(template))
                    .await
                    .unwrap_or(Err(JobError::DeadlineExceeded { waited: deadline })),
                None => self.submit_and_poll(template).await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(JobError::Cancelled),
            result = bounded => result,
        };

        // Failures are logged once, by the caller's call envelope.
        if let Ok(job) = &result {
            tracing::info!(
                prompt_id = %job.prompt_id,
                polls = job.polls,
                artifacts = job.artifacts.len(),
                "ComfyUI job completed",
            );
        }
        result
    }

    // ---- private helpers ----

    async fn submit_and_poll(&self, template: &JobTemplate) -> Result<CompletedJob, JobError> {
        // A fresh client ID per submission; never reused across attempts.
        let client_id = uuid::Uuid::new_v4().to_string();
        let workflow = template.to_value();

        let submitted = self
            .api
            .submit_workflow(&workflow, &client_id)
            .await
            .map_err(JobError::from_submit)?;
        let prompt_id = submitted.prompt_id;

        tracing::info!(
            prompt_id = %prompt_id,
            client_id = %client_id,
            queue_position = ?submitted.number,
            "Workflow submitted to ComfyUI",
        );

        let mut polls = 0u32;
        loop {
            tokio::time::sleep(self.poll.interval).await;
            polls += 1;

            let history = self
                .api
                .get_history(&prompt_id)
                .await
                .map_err(|e| JobError::from_poll(e, &prompt_id))?;

            let Some(entry) =
                parse_history(&history, &prompt_id).map_err(JobError::MalformedResponse)?
            else {
                tracing::debug!(prompt_id = %prompt_id, polls, "Job not in history yet");
                continue;
            };

            match entry.job_status() {
                JobStatus::Completed(Outcome::Success) => {
                    let artifacts = entry
                        .artifacts()
                        .map_err(JobError::MalformedResponse)?
                        .ok_or_else(|| JobError::NoArtifactsProduced {
                            prompt_id: prompt_id.clone(),
                        })?;
                    return Ok(CompletedJob {
                        prompt_id,
                        artifacts,
                        polls,
                    });
                }
                JobStatus::Completed(Outcome::Failure { status, detail }) => {
                    return Err(JobError::JobFailed {
                        prompt_id,
                        status,
                        detail,
                    });
                }
                JobStatus::Pending | JobStatus::Unknown => {
                    tracing::debug!(
                        prompt_id = %prompt_id,
                        polls,
                        status = %entry.status.status_str,
                        "Job still running",
                    );
                }
            }
        }
    }
}
