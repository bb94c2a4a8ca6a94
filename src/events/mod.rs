//! Event Fan-out (C7): an in-memory broadcast bus feeding SSE subscribers,
//! plus a webhook delivery task. Both sinks observe the same terminal-once
//! guarantee: exactly one of `completed` / `failed` / `cancelled` per job
//! (§4.7).

pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::job::JobStatus;
use crate::worker::ProgressBroadcaster;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Progress {
        job_id: Uuid,
        progress: f64,
        stage: String,
        at: DateTime<Utc>,
    },
    Completed {
        job_id: Uuid,
        at: DateTime<Utc>,
    },
    Failed {
        job_id: Uuid,
        error_message: String,
        at: DateTime<Utc>,
    },
    Cancelled {
        job_id: Uuid,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Cancelled { job_id, .. } => *job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress { .. })
    }
}

/// One broadcast channel per job, created lazily on first publish or first
/// subscribe and dropped once every sender/receiver side has gone away.
pub struct JobEventBus {
    channels: DashMap<Uuid, broadcast::Sender<JobEvent>>,
    /// The last event seen per job, so a late subscriber connecting after
    /// the job has already reached a terminal state still gets exactly one
    /// terminal event before the stream closes (§4.7).
    last_event: DashMap<Uuid, JobEvent>,
}

impl JobEventBus {
    pub fn new() -> Self {
        JobEventBus {
            channels: DashMap::new(),
            last_event: DashMap::new(),
        }
    }

    fn sender(&self, job_id: Uuid) -> broadcast::Sender<JobEvent> {
        self.channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    pub fn publish(&self, event: JobEvent) {
        let job_id = event.job_id();
        self.last_event.insert(job_id, event.clone());
        let _ = self.sender(job_id).send(event);
    }

    /// Subscribe to a job's event stream. If the job has already reached a
    /// terminal state, the returned receiver will yield that one event and
    /// nothing further is expected (the publisher side is naturally done).
    pub fn subscribe(&self, job_id: Uuid) -> (broadcast::Receiver<JobEvent>, Option<JobEvent>) {
        let receiver = self.sender(job_id).subscribe();
        let replay = self
            .last_event
            .get(&job_id)
            .filter(|e| e.is_terminal())
            .map(|e| e.clone());
        (receiver, replay)
    }

    pub fn forget(&self, job_id: Uuid) {
        self.channels.remove(&job_id);
        self.last_event.remove(&job_id);
    }
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressBroadcaster for JobEventBus {
    async fn publish_progress(&self, job_id: Uuid, progress: f64, stage: &str) {
        self.publish(JobEvent::Progress {
            job_id,
            progress,
            stage: stage.to_string(),
            at: Utc::now(),
        });
    }

    async fn publish_terminal(&self, job_id: Uuid, status: JobStatus, error_message: Option<&str>) {
        let event = match status {
            JobStatus::Completed => JobEvent::Completed {
                job_id,
                at: Utc::now(),
            },
            JobStatus::Cancelled => JobEvent::Cancelled {
                job_id,
                at: Utc::now(),
            },
            JobStatus::Failed => JobEvent::Failed {
                job_id,
                error_message: error_message.unwrap_or("processing failed").to_string(),
                at: Utc::now(),
            },
            JobStatus::Queued | JobStatus::Processing => return,
        };
        self.publish(event);
    }
}

pub type SharedEventBus = Arc<JobEventBus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscriber_gets_terminal_event_once() {
        let bus = JobEventBus::new();
        let job_id = Uuid::new_v4();
        bus.publish(JobEvent::Completed {
            job_id,
            at: Utc::now(),
        });
        let (_rx, replay) = bus.subscribe(job_id);
        assert!(matches!(replay, Some(JobEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn live_subscriber_receives_progress_then_terminal() {
        let bus = Arc::new(JobEventBus::new());
        let job_id = Uuid::new_v4();
        let (mut rx, replay) = bus.subscribe(job_id);
        assert!(replay.is_none());

        bus.publish(JobEvent::Progress {
            job_id,
            progress: 10.0,
            stage: "processing".to_string(),
            at: Utc::now(),
        });
        bus.publish(JobEvent::Completed {
            job_id,
            at: Utc::now(),
        });

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, JobEvent::Progress { .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, JobEvent::Completed { .. }));
    }
}
