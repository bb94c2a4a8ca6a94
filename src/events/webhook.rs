//! Webhook delivery task. Fires for jobs with a `webhook_url` on events the
//! job subscribed to; retries are a fixed, non-extending budget — delivery
//! failure never changes job status (§4.7, §7).

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_ATTEMPTS: u32 = 3;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const USER_AGENT: &str = concat!("vodpipe-webhook/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub job_id: Uuid,
    pub event: &'a str,
    pub status: &'a str,
    pub progress: Option<f64>,
    pub error_message: Option<&'a str>,
}

/// Attempt delivery up to [`MAX_ATTEMPTS`] times with exponential backoff
/// `1s, 2s, 4s`. Returns whether any attempt got a 2xx response; the caller
/// is expected to log-and-discard the result, never to surface it as job
/// failure.
pub async fn deliver(client: &Client, url: &str, payload: &WebhookPayload<'_>) -> bool {
    let mut delay = BACKOFF_BASE;
    for attempt in 1..=MAX_ATTEMPTS {
        match client
            .post(url)
            .timeout(ATTEMPT_TIMEOUT)
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT)
            .json(payload)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!(
                    job_id = %payload.job_id,
                    attempt,
                    status = response.status().as_u16(),
                    "webhook delivered"
                );
                return true;
            }
            Ok(response) => {
                warn!(
                    job_id = %payload.job_id,
                    attempt,
                    status = response.status().as_u16(),
                    "webhook delivery returned a non-success status"
                );
            }
            Err(err) => {
                warn!(job_id = %payload.job_id, attempt, error = %err, "webhook delivery failed");
            }
        }
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }
    warn!(job_id = %payload.job_id, "webhook delivery exhausted its retry budget");
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_expected_fields() {
        let payload = WebhookPayload {
            job_id: Uuid::nil(),
            event: "progress",
            status: "processing",
            progress: Some(42.0),
            error_message: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["event"], "progress");
        assert_eq!(json["progress"], 42.0);
    }
}
