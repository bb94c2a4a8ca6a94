use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::operation::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Default,
    Analysis,
    Streaming,
}

impl Default for QueueName {
    fn default() -> Self {
        QueueName::Default
    }
}

/// A single `{event}` the job's webhook is subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    Start,
    Progress,
    Complete,
    Error,
}

/// Post-run quality scores, populated from tool stderr when the job
/// requested quality analysis; absent otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub vmaf: Option<f64>,
    pub psnr: Option<f64>,
    pub ssim: Option<f64>,
}

/// Output-global settings that apply across all operations in a job, rather
/// than to one operation specifically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub container_format: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub thread_count: Option<u32>,
}

/// The central entity. See the module-level data model for invariants;
/// construction outside of submit (§4.2 validate, §4.8 store) should go
/// through [`Job::new`] so timestamps and defaults stay consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub priority: Priority,
    pub queue: QueueName,
    pub tenant_key: String,
    pub input_uri: String,
    pub output_uri: String,
    pub operations: Vec<Operation>,
    pub options: JobOptions,
    pub progress: f64,
    pub stage: String,
    pub fps: Option<f64>,
    pub eta_seconds: Option<f64>,
    pub quality: Option<QualityMetrics>,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_events: Vec<WebhookEvent>,
    pub batch_id: Option<Uuid>,
    pub batch_index: Option<u32>,
}

impl Job {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_key: String,
        input_uri: String,
        output_uri: String,
        operations: Vec<Operation>,
        options: JobOptions,
        priority: Priority,
        queue: QueueName,
        webhook_url: Option<String>,
        webhook_events: Vec<WebhookEvent>,
    ) -> Self {
        Job {
            id: Uuid::new_v4(),
            status: JobStatus::Queued,
            priority,
            queue,
            tenant_key,
            input_uri,
            output_uri,
            operations,
            options,
            progress: 0.0,
            stage: "queued".to_string(),
            fps: None,
            eta_seconds: None,
            quality: None,
            worker_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            retry_count: 0,
            webhook_url,
            webhook_events,
            batch_id: None,
            batch_index: None,
        }
    }

    pub fn is_non_terminal(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Derived batch status, computed from the set of jobs sharing a `batch_id`.
/// No separate persistent record exists; see [`batch_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    PartialSuccess,
}

/// Compute batch status per the rule in the scheduler design: `completed` if
/// all complete, `failed` if all failed, `partial_success` if mixed
/// terminal, `processing` if any non-terminal job has started, else `queued`.
pub fn batch_status(jobs: &[&Job]) -> BatchStatus {
    if jobs.is_empty() {
        return BatchStatus::Queued;
    }
    let total = jobs.len();
    let completed = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Completed)
        .count();
    let failed_or_cancelled = jobs
        .iter()
        .filter(|j| matches!(j.status, JobStatus::Failed | JobStatus::Cancelled))
        .count();
    let processing = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Processing)
        .count();

    if completed == total {
        BatchStatus::Completed
    } else if failed_or_cancelled == total {
        BatchStatus::Failed
    } else if completed + failed_or_cancelled == total {
        BatchStatus::PartialSuccess
    } else if processing > 0 {
        BatchStatus::Processing
    } else {
        BatchStatus::Queued
    }
}
