//! Job Store (C8): the durable record backing the operations named in §3,
//! on top of PostgreSQL. Progress updates are issued outside a transaction;
//! enqueue and terminal transitions are not (§4.8).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::job::{Job, JobOptions, JobStatus, Priority, QueueName, WebhookEvent};
use crate::domain::operation::Operation;
use crate::error::{Error, Result};
use crate::worker::JobProgressSink;

const MAX_PAGE_SIZE: u32 = 200;
const DEFAULT_PAGE_SIZE: u32 = 50;

/// Whitelisted sort fields, per §4.8 ("sort by a whitelisted field").
const SORTABLE_FIELDS: &[&str] = &["created_at", "completed_at", "status", "priority"];

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub tenant_key: Option<String>,
    pub status: Option<JobStatus>,
    pub batch_id: Option<Uuid>,
    pub page: u32,
    pub page_size: u32,
    pub sort_by: String,
    pub descending: bool,
}

impl ListFilter {
    pub fn normalized(mut self) -> Result<Self> {
        if self.page_size == 0 {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(Error::validation("page_size exceeds the maximum page size")
                .with_field("page_size"));
        }
        if self.sort_by.is_empty() {
            self.sort_by = "created_at".to_string();
        }
        if !SORTABLE_FIELDS.contains(&self.sort_by.as_str()) {
            return Err(Error::validation(format!(
                "'{}' is not a sortable field",
                self.sort_by
            ))
            .with_field("sort_by"));
        }
        Ok(self)
    }
}

pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .map_err(|e| Error::internal("failed to connect to the job store database").with_source(e))?;
        Ok(JobStore { pool })
    }

    #[cfg(test)]
    pub fn from_pool(pool: PgPool) -> Self {
        JobStore { pool }
    }

    #[instrument(skip(self, job))]
    pub async fn submit(&self, job: &Job) -> Result<()> {
        let operations_json = serde_json::to_value(&job.operations)
            .map_err(|e| Error::internal("failed to serialize job operations").with_source(e))?;
        let options_json = serde_json::to_value(&job.options)
            .map_err(|e| Error::internal("failed to serialize job options").with_source(e))?;
        let webhook_events_json = serde_json::to_value(&job.webhook_events)
            .map_err(|e| Error::internal("failed to serialize webhook events").with_source(e))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::internal("failed to start submit transaction").with_source(e))?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, status, priority, queue, tenant_key, input_uri, output_uri,
                operations, options, progress, stage, created_at,
                webhook_url, webhook_events, batch_id, batch_index
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
            "#,
        )
        .bind(job.id)
        .bind(status_str(job.status))
        .bind(priority_str(job.priority))
        .bind(queue_str(job.queue))
        .bind(&job.tenant_key)
        .bind(&job.input_uri)
        .bind(&job.output_uri)
        .bind(operations_json)
        .bind(options_json)
        .bind(job.progress)
        .bind(&job.stage)
        .bind(job.created_at)
        .bind(&job.webhook_url)
        .bind(webhook_events_json)
        .bind(job.batch_id)
        .bind(job.batch_index.map(|i| i as i32))
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::internal("failed to insert job").with_source(e).with_job_id(job.id.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO tenant_counters (tenant_key, non_terminal_count)
            VALUES ($1, 1)
            ON CONFLICT (tenant_key) DO UPDATE SET non_terminal_count = tenant_counters.non_terminal_count + 1
            "#,
        )
        .bind(&job.tenant_key)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::internal("failed to increment tenant counter").with_source(e))?;

        tx.commit()
            .await
            .map_err(|e| Error::internal("failed to commit submit transaction").with_source(e))?;

        info!(job_id = %job.id, tenant_key = %job.tenant_key, "job submitted");
        Ok(())
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Job> {
        let row = sqlx::query(
            r#"SELECT * FROM jobs WHERE id = $1"#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::internal("failed to fetch job").with_source(e))?
        .ok_or_else(|| Error::not_found("job not found").with_job_id(job_id.to_string()))?;

        row_to_job(&row)
    }

    pub async fn list(&self, filter: ListFilter) -> Result<Vec<Job>> {
        let filter = filter.normalized()?;
        let offset = filter.page.saturating_mul(filter.page_size);

        let mut query = String::from("SELECT * FROM jobs WHERE 1 = 1");
        let mut next_param = 1;
        if filter.tenant_key.is_some() {
            query.push_str(&format!(" AND tenant_key = ${next_param}"));
            next_param += 1;
        }
        if filter.status.is_some() {
            query.push_str(&format!(" AND status = ${next_param}"));
            next_param += 1;
        }
        if filter.batch_id.is_some() {
            query.push_str(&format!(" AND batch_id = ${next_param}"));
        }
        query.push_str(&format!(
            " ORDER BY {} {} LIMIT {} OFFSET {}",
            filter.sort_by,
            if filter.descending { "DESC" } else { "ASC" },
            filter.page_size,
            offset,
        ));

        let mut q = sqlx::query(&query);
        if let Some(tenant_key) = &filter.tenant_key {
            q = q.bind(tenant_key);
        }
        if let Some(status) = filter.status {
            q = q.bind(status_str(status));
        }
        if let Some(batch_id) = filter.batch_id {
            q = q.bind(batch_id);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::internal("failed to list jobs").with_source(e))?;

        rows.iter().map(row_to_job).collect()
    }

    /// Non-terminal job counts per tenant, used by the scheduler to restore
    /// its in-memory concurrency counters at startup (§4.6).
    pub async fn count_non_terminal_by_tenant(&self) -> Result<BTreeMap<String, u32>> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_key, COUNT(*) AS count FROM jobs
            WHERE status IN ('queued', 'processing')
            GROUP BY tenant_key
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::internal("failed to count non-terminal jobs").with_source(e))?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let tenant_key: String = row
                .try_get("tenant_key")
                .map_err(|e| Error::internal("malformed tenant counter row").with_source(e))?;
            let count: i64 = row
                .try_get("count")
                .map_err(|e| Error::internal("malformed tenant counter row").with_source(e))?;
            counts.insert(tenant_key, count as u32);
        }
        Ok(counts)
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        worker_id: Option<&str>,
        error_message: Option<&str>,
        decrement_tenant: bool,
    ) -> Result<()> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::internal("failed to start status transaction").with_source(e))?;

        sqlx::query(
            r#"
            UPDATE jobs SET
                status = $1,
                worker_id = COALESCE($2, worker_id),
                started_at = CASE WHEN $1 = 'processing' THEN $3 ELSE started_at END,
                completed_at = CASE WHEN $1 IN ('completed','failed','cancelled') THEN $3 ELSE completed_at END,
                error_message = COALESCE($4, error_message)
            WHERE id = $5
            "#,
        )
        .bind(status_str(status))
        .bind(worker_id)
        .bind(now)
        .bind(error_message)
        .bind(job_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::internal("failed to update job status").with_source(e).with_job_id(job_id.to_string()))?;

        if decrement_tenant {
            sqlx::query(
                r#"
                UPDATE tenant_counters SET non_terminal_count = GREATEST(non_terminal_count - 1, 0)
                WHERE tenant_key = (SELECT tenant_key FROM jobs WHERE id = $1)
                "#,
            )
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::internal("failed to decrement tenant counter").with_source(e))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::internal("failed to commit status transaction").with_source(e))?;
        Ok(())
    }

    pub async fn update_progress(
        &self,
        job_id: Uuid,
        progress: f64,
        stage: &str,
        fps: Option<f64>,
        eta_seconds: Option<f64>,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE jobs SET progress = $1, stage = $2, fps = $3, eta_seconds = $4 WHERE id = $5"#,
        )
        .bind(progress)
        .bind(stage)
        .bind(fps)
        .bind(eta_seconds)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::internal("failed to update job progress").with_source(e).with_job_id(job_id.to_string()))?;
        Ok(())
    }

    /// Delete terminal jobs older than `older_than`. In `dry_run`, counts
    /// but does not delete (§4.8).
    pub async fn cleanup(&self, older_than: DateTime<Utc>, dry_run: bool) -> Result<u64> {
        if dry_run {
            let row = sqlx::query(
                r#"SELECT COUNT(*) AS count FROM jobs WHERE status IN ('completed','failed','cancelled') AND completed_at < $1"#,
            )
            .bind(older_than)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::internal("failed to count cleanup candidates").with_source(e))?;
            let count: i64 = row
                .try_get("count")
                .map_err(|e| Error::internal("malformed cleanup count row").with_source(e))?;
            return Ok(count as u64);
        }

        let result = sqlx::query(
            r#"DELETE FROM jobs WHERE status IN ('completed','failed','cancelled') AND completed_at < $1"#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::internal("failed to delete expired jobs").with_source(e))?;
        Ok(result.rows_affected())
    }

    pub async fn is_reachable(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

#[async_trait]
impl JobProgressSink for JobStore {
    async fn mark_processing(&self, job_id: Uuid, worker_id: &str) -> Result<()> {
        self.update_status(job_id, JobStatus::Processing, Some(worker_id), None, false)
            .await
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        progress: f64,
        stage: &str,
        fps: Option<f64>,
        eta_seconds: Option<f64>,
    ) -> Result<()> {
        JobStore::update_progress(self, job_id, progress, stage, fps, eta_seconds).await
    }

    async fn mark_completed(&self, job_id: Uuid) -> Result<()> {
        self.update_status(job_id, JobStatus::Completed, None, None, true).await
    }

    async fn mark_failed(&self, job_id: Uuid, error_message: &str) -> Result<()> {
        self.update_status(job_id, JobStatus::Failed, None, Some(error_message), true)
            .await
    }

    async fn mark_cancelled(&self, job_id: Uuid) -> Result<()> {
        self.update_status(job_id, JobStatus::Cancelled, None, None, true).await
    }
}

fn status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Processing => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

fn priority_str(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Normal => "normal",
        Priority::High => "high",
    }
}

fn queue_str(queue: QueueName) -> &'static str {
    match queue {
        QueueName::Default => "default",
        QueueName::Analysis => "analysis",
        QueueName::Streaming => "streaming",
    }
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job> {
    let malformed = |e: sqlx::Error| Error::internal("malformed job row").with_source(e);

    let status: String = row.try_get("status").map_err(malformed)?;
    let priority: String = row.try_get("priority").map_err(malformed)?;
    let queue: String = row.try_get("queue").map_err(malformed)?;
    let operations: Value = row.try_get("operations").map_err(malformed)?;
    let options: Value = row.try_get("options").map_err(malformed)?;
    let webhook_events: Value = row.try_get("webhook_events").map_err(malformed)?;
    let quality: Option<Value> = row.try_get("quality").map_err(malformed)?;

    Ok(Job {
        id: row.try_get("id").map_err(malformed)?,
        status: parse_status(&status)?,
        priority: parse_priority(&priority)?,
        queue: parse_queue(&queue)?,
        tenant_key: row.try_get("tenant_key").map_err(malformed)?,
        input_uri: row.try_get("input_uri").map_err(malformed)?,
        output_uri: row.try_get("output_uri").map_err(malformed)?,
        operations: serde_json::from_value::<Vec<Operation>>(operations).map_err(|e| {
            Error::internal("malformed operations column").with_source(e)
        })?,
        options: serde_json::from_value::<JobOptions>(options)
            .map_err(|e| Error::internal("malformed options column").with_source(e))?,
        progress: row.try_get("progress").map_err(malformed)?,
        stage: row.try_get("stage").map_err(malformed)?,
        fps: row.try_get("fps").map_err(malformed)?,
        eta_seconds: row.try_get("eta_seconds").map_err(malformed)?,
        quality: quality
            .map(|v| serde_json::from_value(v).map_err(|e| Error::internal("malformed quality column").with_source(e)))
            .transpose()?,
        worker_id: row.try_get("worker_id").map_err(malformed)?,
        created_at: row.try_get("created_at").map_err(malformed)?,
        started_at: row.try_get("started_at").map_err(malformed)?,
        completed_at: row.try_get("completed_at").map_err(malformed)?,
        error_message: row.try_get("error_message").map_err(malformed)?,
        retry_count: row
            .try_get::<i32, _>("retry_count")
            .map(|v| v as u32)
            .unwrap_or(0),
        webhook_url: row.try_get("webhook_url").map_err(malformed)?,
        webhook_events: serde_json::from_value::<Vec<WebhookEvent>>(webhook_events)
            .unwrap_or_default(),
        batch_id: row.try_get("batch_id").map_err(malformed)?,
        batch_index: row
            .try_get::<Option<i32>, _>("batch_index")
            .map_err(malformed)?
            .map(|v| v as u32),
    })
}

fn parse_status(s: &str) -> Result<JobStatus> {
    match s {
        "queued" => Ok(JobStatus::Queued),
        "processing" => Ok(JobStatus::Processing),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" => Ok(JobStatus::Cancelled),
        other => Err(Error::internal(format!("unknown job status '{other}' in store"))),
    }
}

fn parse_priority(s: &str) -> Result<Priority> {
    match s {
        "low" => Ok(Priority::Low),
        "normal" => Ok(Priority::Normal),
        "high" => Ok(Priority::High),
        other => Err(Error::internal(format!("unknown priority '{other}' in store"))),
    }
}

fn parse_queue(s: &str) -> Result<QueueName> {
    match s {
        "default" => Ok(QueueName::Default),
        "analysis" => Ok(QueueName::Analysis),
        "streaming" => Ok(QueueName::Streaming),
        other => Err(Error::internal(format!("unknown queue '{other}' in store"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_filter_rejects_unsortable_field() {
        let filter = ListFilter {
            sort_by: "secret_column".to_string(),
            ..Default::default()
        };
        assert!(filter.normalized().is_err());
    }

    #[test]
    fn list_filter_rejects_oversized_page() {
        let filter = ListFilter {
            page_size: 10_000,
            ..Default::default()
        };
        assert!(filter.normalized().is_err());
    }

    #[test]
    fn list_filter_defaults_sort_and_page_size() {
        let filter = ListFilter::default().normalized().unwrap();
        assert_eq!(filter.sort_by, "created_at");
        assert_eq!(filter.page_size, DEFAULT_PAGE_SIZE);
    }
}
