pub mod job;
pub mod operation;

pub use job::{
    BatchStatus, Job, JobOptions, JobStatus, Priority, QualityMetrics, QueueName, WebhookEvent,
    batch_status,
};
pub use operation::{Operation, RawOperation};
