//! Invokes the tool's probing sibling to extract input duration for
//! progress scaling (§4.5 step 4). The sibling must produce JSON on stdout.

use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

pub async fn probe_duration_seconds(probe_tool_path: &str, input: &Path) -> Result<Option<f64>> {
    let output = Command::new(probe_tool_path)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
        ])
        .arg(input)
        .output()
        .await
        .map_err(|e| Error::tool_failure("failed to invoke probing tool").with_source(e))?;

    if !output.status.success() {
        return Ok(None);
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::internal("probe tool produced malformed JSON").with_source(e))?;

    Ok(parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok()))
}
