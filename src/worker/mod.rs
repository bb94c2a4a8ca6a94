//! Worker Execution Engine (C5): a single-job-at-a-time executor owned by a
//! worker process. Drives the tool through download → invoke → upload,
//! with guaranteed temp-file cleanup and cancellation at every suspension
//! point (§4.5, §5).

pub mod hwaccel;
pub mod probe;
pub mod process;
pub mod tempdir;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::command_builder::{self, HardwareCapabilities, PassStage};
use crate::domain::job::{Job, JobStatus};
use crate::error::{Error, Result};
use crate::storage::registry::StorageRegistry;
use process::ExitOutcome;
use tempdir::ScopedTempDir;

/// The subset of Job Store operations the worker needs; kept as a trait so
/// the worker doesn't depend on `sqlx` directly and can be exercised
/// against a fake in tests.
#[async_trait]
pub trait JobProgressSink: Send + Sync {
    async fn mark_processing(&self, job_id: uuid::Uuid, worker_id: &str) -> Result<()>;
    async fn update_progress(
        &self,
        job_id: uuid::Uuid,
        progress: f64,
        stage: &str,
        fps: Option<f64>,
        eta_seconds: Option<f64>,
    ) -> Result<()>;
    async fn mark_completed(&self, job_id: uuid::Uuid) -> Result<()>;
    async fn mark_failed(&self, job_id: uuid::Uuid, error_message: &str) -> Result<()>;
    async fn mark_cancelled(&self, job_id: uuid::Uuid) -> Result<()>;
}

/// Broadcast target for the Event Fan-out (C7); the worker only needs to
/// push samples, not manage subscribers.
#[async_trait]
pub trait ProgressBroadcaster: Send + Sync {
    async fn publish_progress(&self, job_id: uuid::Uuid, progress: f64, stage: &str);
    async fn publish_terminal(&self, job_id: uuid::Uuid, status: JobStatus, error_message: Option<&str>);
}

pub struct WorkerContext {
    pub worker_id: String,
    pub tool_path: String,
    pub probe_tool_path: String,
    pub storage: Arc<StorageRegistry>,
    pub hw_caps: Arc<HardwareCapabilities>,
    pub temp_root: std::path::PathBuf,
    pub job_timeout: Duration,
    pub store: Arc<dyn JobProgressSink>,
    pub events: Arc<dyn ProgressBroadcaster>,
}

/// Progress updates to the Job Store are throttled: at most every 500ms or
/// on a percentage change >= 0.5, per the design notes on progress
/// throttling. The final terminal update always force-flushes.
struct ProgressThrottle {
    last_flush: Instant,
    last_percentage: f64,
}

impl ProgressThrottle {
    fn new() -> Self {
        ProgressThrottle {
            last_flush: Instant::now() - Duration::from_secs(1),
            last_percentage: -1.0,
        }
    }

    fn should_flush(&mut self, percentage: f64) -> bool {
        let elapsed_ok = self.last_flush.elapsed() >= Duration::from_millis(500);
        let delta_ok = (percentage - self.last_percentage).abs() >= 0.5;
        if elapsed_ok || delta_ok {
            self.last_flush = Instant::now();
            self.last_percentage = percentage;
            true
        } else {
            false
        }
    }
}

#[instrument(skip(ctx, job, cancel), fields(job_id = %job.id))]
pub async fn execute_job(
    ctx: &WorkerContext,
    job: &mut Job,
    mut cancel: watch::Receiver<bool>,
) -> Result<()> {
    job.status = JobStatus::Processing;
    job.worker_id = Some(ctx.worker_id.clone());
    job.started_at = Some(chrono::Utc::now());
    ctx.store.mark_processing(job.id, &ctx.worker_id).await?;
    ctx.events.publish_progress(job.id, 0.0, "downloading").await;

    let result = run_job_inner(ctx, job, &mut cancel).await;

    match result {
        Ok(()) => {
            job.status = JobStatus::Completed;
            job.progress = 100.0;
            job.completed_at = Some(chrono::Utc::now());
            ctx.store.mark_completed(job.id).await?;
            ctx.events
                .publish_terminal(job.id, JobStatus::Completed, None)
                .await;
            info!("job completed");
            Ok(())
        }
        Err(err) if err.kind() == crate::error::Kind::Timeout => {
            job.status = JobStatus::Failed;
            job.error_message = Some("processing failed".to_string());
            job.completed_at = Some(chrono::Utc::now());
            ctx.store.mark_failed(job.id, "timeout").await?;
            ctx.events
                .publish_terminal(job.id, JobStatus::Failed, Some("timeout"))
                .await;
            warn!("job timed out");
            Err(err)
        }
        Err(err) if err.kind() == crate::error::Kind::Cancelled => {
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(chrono::Utc::now());
            ctx.store.mark_cancelled(job.id).await?;
            ctx.events
                .publish_terminal(job.id, JobStatus::Cancelled, None)
                .await;
            info!("job cancelled");
            Ok(())
        }
        Err(err) => {
            // Tool stderr is never surfaced to the client; log internally
            // and report a sanitized message (§7).
            error!(error = %err, "job failed");
            job.status = JobStatus::Failed;
            job.error_message = Some("processing failed".to_string());
            job.completed_at = Some(chrono::Utc::now());
            ctx.store.mark_failed(job.id, "processing failed").await?;
            ctx.events
                .publish_terminal(job.id, JobStatus::Failed, Some("processing failed"))
                .await;
            Err(err)
        }
    }
}

async fn run_job_inner(
    ctx: &WorkerContext,
    job: &mut Job,
    cancel: &mut watch::Receiver<bool>,
) -> Result<()> {
    let temp = ScopedTempDir::create(&ctx.temp_root, job.id)?;

    let (input_backend, input_path) = ctx.storage.resolve(&job.input_uri)?;
    let input_filename = Path::new(&input_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input")
        .to_string();
    let local_input = temp.input_path(&input_filename);

    let chunks = input_backend.read_stream(&input_path).await?;
    let local_input_clone = local_input.clone();
    write_stream_to_file(&local_input_clone, chunks).await?;

    if *cancel.borrow() {
        return Err(Error::cancelled("cancelled before processing started"));
    }

    let duration_secs = probe::probe_duration_seconds(&ctx.probe_tool_path, &local_input).await?;

    let uses_two_pass = job.operations.iter().any(|op| {
        matches!(op, crate::domain::operation::Operation::Transcode(t) if t.two_pass)
    });

    let output_filename = Path::new(&ctx.storage.resolve(&job.output_uri)?.1)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output")
        .to_string();
    let local_output = temp.output_path(&output_filename);

    let throttle = Arc::new(Mutex::new(ProgressThrottle::new()));

    if uses_two_pass {
        let log_prefix = temp.path().join("2pass").to_string_lossy().into_owned();
        let pass1_args = command_builder::build_args(
            &job.operations,
            &job.options,
            &local_input,
            &local_output,
            &ctx.hw_caps,
            Some(PassStage::First {
                log_prefix_path: log_prefix.clone(),
            }),
        )?;
        run_pass(ctx, job, &pass1_args, duration_secs, cancel, throttle.clone(), false).await?;

        let pass2_args = command_builder::build_args(
            &job.operations,
            &job.options,
            &local_input,
            &local_output,
            &ctx.hw_caps,
            Some(PassStage::Second {
                log_prefix_path: log_prefix,
            }),
        )?;
        run_pass(ctx, job, &pass2_args, duration_secs, cancel, throttle.clone(), true).await?;
    } else {
        let args = command_builder::build_args(
            &job.operations,
            &job.options,
            &local_input,
            &local_output,
            &ctx.hw_caps,
            None,
        )?;
        run_pass(ctx, job, &args, duration_secs, cancel, throttle, true).await?;
    }

    let (output_backend, output_path) = ctx.storage.resolve(&job.output_uri)?;
    if !ctx.storage.is_output_allowed(output_backend.name()) {
        return Err(Error::security("output backend is not in the allow-list").with_backend(output_backend.name()));
    }
    let file_stream = read_file_as_stream(&local_output).await?;
    output_backend.write_stream(&output_path, file_stream).await?;

    Ok(())
}

async fn run_pass(
    ctx: &WorkerContext,
    job: &Job,
    args: &[String],
    duration_secs: Option<f64>,
    cancel: &mut watch::Receiver<bool>,
    throttle: Arc<Mutex<ProgressThrottle>>,
    is_final_pass: bool,
) -> Result<()> {
    let job_id = job.id;
    let events = ctx.events.clone();
    let store = ctx.store.clone();

    let outcome = process::run_with_progress(
        &ctx.tool_path,
        args,
        duration_secs,
        ctx.job_timeout,
        cancel.clone(),
        move |sample| {
            let Some(mut pct) = sample.percentage else {
                return;
            };
            if !is_final_pass {
                pct = (pct / 2.0).min(50.0);
            } else if duration_secs.is_some() {
                pct = crate::progress::remap_second_pass_percentage(pct);
            }
            let should_flush = throttle.lock().unwrap().should_flush(pct);
            if should_flush {
                let events = events.clone();
                let store = store.clone();
                tokio::spawn(async move {
                    let _ = store
                        .update_progress(job_id, pct, "processing", sample.fps, None)
                        .await;
                    events.publish_progress(job_id, pct, "processing").await;
                });
            }
        },
    )
    .await?;

    match outcome {
        ExitOutcome::Success => Ok(()),
        ExitOutcome::Timeout => Err(Error::timeout("processing exceeded the configured time limit")),
        ExitOutcome::Cancelled => Err(Error::cancelled("processing was cancelled")),
    }
}

async fn write_stream_to_file(
    path: &Path,
    mut chunks: futures::stream::BoxStream<'static, Result<bytes::Bytes>>,
) -> Result<u64> {
    use tokio::io::AsyncWriteExt;
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| Error::internal("failed to create local input file").with_source(e))?;
    let mut total = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        total += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::internal("failed to write local input file").with_source(e))?;
    }
    file.flush().await.ok();
    Ok(total)
}

async fn read_file_as_stream(
    path: &Path,
) -> Result<futures::stream::BoxStream<'static, Result<bytes::Bytes>>> {
    use tokio::io::AsyncReadExt;
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::not_found("output file not found after processing").with_source(e))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .await
        .map_err(|e| Error::internal("failed to read local output file").with_source(e))?;
    let chunk_size = 8 * 1024;
    let chunks: Vec<Result<bytes::Bytes>> = buf
        .chunks(chunk_size)
        .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
        .collect();
    Ok(stream::iter(chunks).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_throttle_gates_on_time_and_delta() {
        let mut throttle = ProgressThrottle::new();
        assert!(throttle.should_flush(0.0));
        assert!(!throttle.should_flush(0.1));
        assert!(throttle.should_flush(1.0));
    }
}
