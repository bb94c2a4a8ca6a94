//! HTTP entry point. Wires the Validator, Scheduler, Storage registry, Job
//! Store, and Event Fan-out into an axum router. The HTTP layer itself is a
//! thin collaborator (§6) — it holds no business logic beyond request
//! parsing and response shaping.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post};
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use vodpipe::command_builder::HardwareCapabilities;
use vodpipe::config::Config;
use vodpipe::domain::job::{batch_status, Job, JobOptions, JobStatus, Priority, QueueName, WebhookEvent};
use vodpipe::domain::operation::RawOperation;
use vodpipe::events::{webhook, JobEvent, JobEventBus, SharedEventBus};
use vodpipe::scheduler::Scheduler;
use vodpipe::storage::registry::StorageRegistry;
use vodpipe::store::{JobStore, ListFilter};
use vodpipe::validator::{validate_job_submission, ValidatorLimits};
use vodpipe::worker::{self, WorkerContext};

struct AppState {
    config: Config,
    scheduler: Arc<Scheduler>,
    store: Arc<JobStore>,
    storage: Arc<StorageRegistry>,
    events: SharedEventBus,
    hw_caps: Arc<HardwareCapabilities>,
    webhook_client: reqwest::Client,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vodpipe::logging::init();

    let config_path = std::env::var("VODPIPE_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load(&PathBuf::from(&config_path))?;

    let database_url = config
        .database_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("config.database_url is required"))?;
    let store = Arc::new(JobStore::connect(&database_url).await?);

    let storage = Arc::new(StorageRegistry::build(
        &config.backends,
        config.default_backend.clone(),
        config.output_backends.clone(),
    )?);

    let scheduler = Arc::new(Scheduler::new(config.tenant_caps.default));
    for (tenant, cap) in &config.tenant_caps.overrides {
        scheduler.set_tenant_cap(tenant, *cap);
    }
    let restored = store.count_non_terminal_by_tenant().await?;
    scheduler.restore_tenant_counts(restored);

    let events: SharedEventBus = Arc::new(JobEventBus::new());
    let hw_caps = Arc::new(worker::hwaccel::discover(&config.tool_path).await);

    vodpipe::worker::tempdir::sweep_orphaned_temp_dirs(&PathBuf::from(&config.temp_root));

    let state = Arc::new(AppState {
        config: config.clone(),
        scheduler: scheduler.clone(),
        store: store.clone(),
        storage: storage.clone(),
        events: events.clone(),
        hw_caps: hw_caps.clone(),
        webhook_client: reqwest::Client::new(),
    });

    spawn_worker_loop(
        scheduler.clone(),
        store.clone(),
        storage.clone(),
        events.clone(),
        hw_caps.clone(),
        config.clone(),
        state.webhook_client.clone(),
    );

    let app = Router::new()
        .route("/convert", post(submit_job))
        .route("/batch", post(submit_batch))
        .route("/jobs/:id", get(get_job).delete(cancel_job))
        .route("/jobs/:id/events", get(job_events))
        .route("/jobs", get(list_jobs))
        .route("/health", get(health))
        .route("/admin/cleanup", post(admin_cleanup))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = std::env::var("VODPIPE_BIND")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// One worker loop per process for the zero-to-working case; production
/// deployments run many worker processes, each with its own loop, pointed
/// at the same store/scheduler backing services.
fn spawn_worker_loop(
    scheduler: Arc<Scheduler>,
    store: Arc<JobStore>,
    storage: Arc<StorageRegistry>,
    events: SharedEventBus,
    hw_caps: Arc<HardwareCapabilities>,
    config: Config,
    webhook_client: reqwest::Client,
) {
    tokio::spawn(async move {
        let worker_id = format!("worker-{}", Uuid::new_v4());
        loop {
            let job_id = scheduler
                .dequeue(&[QueueName::Default, QueueName::Analysis, QueueName::Streaming])
                .await;
            let mut job = match store.get(job_id).await {
                Ok(job) => job,
                Err(err) => {
                    error!(%job_id, error = %err, "failed to load dequeued job");
                    continue;
                }
            };
            let tenant_key = job.tenant_key.clone();
            let webhook_url = job.webhook_url.clone();
            let webhook_events = job.webhook_events.clone();

            let cancel_rx = scheduler.register_running(job_id);
            let ctx = WorkerContext {
                worker_id: worker_id.clone(),
                tool_path: config.tool_path.clone(),
                probe_tool_path: config.probe_tool_path.clone(),
                storage: storage.clone(),
                hw_caps: hw_caps.clone(),
                temp_root: PathBuf::from(&config.temp_root),
                job_timeout: config.job_timeout(),
                store: store.clone(),
                events: events.clone(),
            };

            if should_notify(&webhook_events, WebhookEvent::Start) {
                if let Some(ref url) = webhook_url {
                    deliver_webhook(&webhook_client, url, job_id, "start", job.status, None).await;
                }
            }

            let result = worker::execute_job(&ctx, &mut job, cancel_rx).await;
            scheduler.mark_terminal(job_id, &tenant_key);

            let (event_name, error_message) = match &result {
                Ok(()) => ("complete", None),
                Err(err) if job.status == JobStatus::Cancelled => ("cancelled", None),
                Err(_) => ("error", job.error_message.clone()),
            };
            let webhook_event = match event_name {
                "complete" => WebhookEvent::Complete,
                "error" => WebhookEvent::Error,
                _ => WebhookEvent::Complete,
            };
            if event_name != "cancelled" && should_notify(&webhook_events, webhook_event) {
                if let Some(ref url) = webhook_url {
                    deliver_webhook(&webhook_client, url, job_id, event_name, job.status, error_message.as_deref()).await;
                }
            }
        }
    });
}

fn should_notify(subscribed: &[WebhookEvent], event: WebhookEvent) -> bool {
    subscribed.contains(&event)
}

async fn deliver_webhook(
    client: &reqwest::Client,
    url: &str,
    job_id: Uuid,
    event: &str,
    status: JobStatus,
    error_message: Option<&str>,
) {
    let status_str = match status {
        JobStatus::Queued => "queued",
        JobStatus::Processing => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    };
    let payload = webhook::WebhookPayload {
        job_id,
        event,
        status: status_str,
        progress: None,
        error_message,
    };
    webhook::deliver(client, url, &payload).await;
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    tenant_key: String,
    input_uri: String,
    output_uri: String,
    #[serde(default)]
    operations: Vec<RawOperation>,
    #[serde(default)]
    options: JobOptions,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    queue: QueueName,
    webhook_url: Option<String>,
    #[serde(default)]
    webhook_events: Vec<WebhookEvent>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    job_id: Uuid,
    resource_url: String,
}

async fn submit_job(
    State(state): State<SharedState>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = build_validated_job(&state, req)?;
    persist_and_enqueue(&state, &job).await?;
    Ok(Json(SubmitResponse {
        job_id: job.id,
        resource_url: format!("/jobs/{}", job.id),
    }))
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    jobs: Vec<SubmitRequest>,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    batch_id: Uuid,
    job_ids: Vec<Uuid>,
}

async fn submit_batch(
    State(state): State<SharedState>,
    Json(req): Json<BatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let assignment = vodpipe::scheduler::assign_batch(req.jobs.len());
    let mut jobs = Vec::with_capacity(req.jobs.len());
    for (index, submit_req) in req.jobs.into_iter().enumerate() {
        let mut job = build_validated_job(&state, submit_req)?;
        job.batch_id = Some(assignment.batch_id);
        job.batch_index = Some(assignment.job_indices[index]);
        jobs.push(job);
    }
    // All-or-nothing: validate every job in the batch before persisting any.
    for job in &jobs {
        persist_and_enqueue(&state, job).await?;
    }
    Ok(Json(BatchResponse {
        batch_id: assignment.batch_id,
        job_ids: jobs.iter().map(|j| j.id).collect(),
    }))
}

fn build_validated_job(state: &AppState, req: SubmitRequest) -> Result<Job, ApiError> {
    let limits = ValidatorLimits {
        max_operations_per_job: state.config.max_operations_per_job,
    };
    let operations = validate_job_submission(req.operations, req.webhook_url.as_deref(), &limits)?;

    state.storage.resolve(&req.input_uri)?;
    let (output_backend, _) = state.storage.resolve(&req.output_uri)?;
    if !state.storage.is_output_allowed(output_backend.name()) {
        return Err(vodpipe::Error::security("output backend is not in the allow-list").into());
    }

    Ok(Job::new(
        req.tenant_key,
        req.input_uri,
        req.output_uri,
        operations,
        req.options,
        req.priority,
        req.queue,
        req.webhook_url,
        req.webhook_events,
    ))
}

async fn persist_and_enqueue(state: &AppState, job: &Job) -> Result<(), ApiError> {
    state.store.submit(job).await?;
    state
        .scheduler
        .enqueue(job.id, &job.tenant_key, job.priority, job.queue)?;
    Ok(())
}

async fn get_job(
    State(state): State<SharedState>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.store.get(id).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    tenant_key: Option<String>,
    status: Option<String>,
    batch_id: Option<Uuid>,
    page: Option<u32>,
    page_size: Option<u32>,
    sort_by: Option<String>,
    descending: Option<bool>,
}

async fn list_jobs(
    State(state): State<SharedState>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = q
        .status
        .map(|s| parse_status_query(&s))
        .transpose()
        .map_err(|_| vodpipe::Error::validation("unrecognized status filter").with_field("status"))?;
    let filter = ListFilter {
        tenant_key: q.tenant_key,
        status,
        batch_id: q.batch_id,
        page: q.page.unwrap_or(0),
        page_size: q.page_size.unwrap_or(0),
        sort_by: q.sort_by.unwrap_or_default(),
        descending: q.descending.unwrap_or(false),
    };
    let jobs = state.store.list(filter).await?;
    Ok(Json(jobs))
}

fn parse_status_query(s: &str) -> Result<JobStatus, ()> {
    match s {
        "queued" => Ok(JobStatus::Queued),
        "processing" => Ok(JobStatus::Processing),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" => Ok(JobStatus::Cancelled),
        _ => Err(()),
    }
}

async fn cancel_job(
    State(state): State<SharedState>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if state.scheduler.cancel_queued(id) {
        return Ok(Json(json!({ "cancelled": true, "was": "queued" })));
    }
    if state.scheduler.cancel_running(id) {
        return Ok(Json(json!({ "cancelled": true, "was": "running" })));
    }
    Ok(Json(json!({ "cancelled": false })))
}

async fn job_events(
    State(state): State<SharedState>,
    AxumPath(id): AxumPath<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (receiver, replay) = state.events.subscribe(id);

    let replay_stream = stream::iter(replay.into_iter().map(to_sse_event));
    let live_stream = tokio_stream::wrappers::BroadcastStream::new(receiver)
        .filter_map(|item| async move { item.ok().map(to_sse_event) });

    Sse::new(replay_stream.chain(live_stream))
}

fn to_sse_event(event: JobEvent) -> Result<Event, Infallible> {
    let name = match &event {
        JobEvent::Progress { .. } => "progress",
        JobEvent::Completed { .. } => "completed",
        JobEvent::Failed { .. } => "failed",
        JobEvent::Cancelled { .. } => "cancelled",
    };
    Ok(Event::default()
        .event(name)
        .json_data(&event)
        .unwrap_or_else(|_| Event::default().event(name)))
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    store_reachable: bool,
    backends: Vec<vodpipe::storage::BackendStatus>,
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let store_reachable = state.store.is_reachable().await;
    let backends = state.storage.statuses().await;
    let status = if store_reachable && backends.iter().all(|b| b.available) {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthReport {
        status,
        store_reachable,
        backends,
    })
}

#[derive(Debug, Deserialize)]
struct CleanupRequest {
    #[serde(default)]
    dry_run: bool,
    retention_days: Option<i64>,
}

async fn admin_cleanup(
    State(state): State<SharedState>,
    Json(req): Json<CleanupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let retention_days = req.retention_days.unwrap_or(7);
    let threshold = chrono::Utc::now() - Duration::from_secs((retention_days.max(0) as u64) * 86_400);
    let affected = state.store.cleanup(threshold, req.dry_run).await?;
    info!(affected, dry_run = req.dry_run, "cleanup pass complete");
    Ok(Json(json!({ "affected": affected, "dry_run": req.dry_run })))
}

/// Computes a batch's derived status on demand; exposed so a future
/// `GET /batches/{id}` handler (outside this sketch's route table) has a
/// single place to call into (§4.6).
#[allow(dead_code)]
async fn batch_status_for(state: &AppState, batch_id: Uuid) -> Result<vodpipe::domain::job::BatchStatus, ApiError> {
    let jobs = state
        .store
        .list(ListFilter {
            batch_id: Some(batch_id),
            page_size: 1000,
            ..Default::default()
        })
        .await?;
    let refs: Vec<&Job> = jobs.iter().collect();
    Ok(batch_status(&refs))
}

struct ApiError(vodpipe::Error);

impl From<vodpipe::Error> for ApiError {
    fn from(err: vodpipe::Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.0.kind().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            warn!(error = %self.0, "request rejected");
        }
        let body = Json(json!({
            "error": self.0.kind().code(),
            "message": self.0.client_message(),
            "field": self.0.field,
        }));
        (status, body).into_response()
    }
}
