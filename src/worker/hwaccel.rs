//! Hardware-capability discovery (§4.5): run once per worker at startup by
//! invoking the tool with an encoder-list argument and scanning for known
//! encoder names.

use std::collections::HashSet;

use tokio::process::Command;
use tracing::{info, warn};

use crate::command_builder::HardwareCapabilities;

const KNOWN_ENCODERS: &[&str] = &[
    "h264_nvenc",
    "hevc_nvenc",
    "av1_nvenc",
    "h264_qsv",
    "hevc_qsv",
    "av1_qsv",
    "h264_vaapi",
    "hevc_vaapi",
    "h264_videotoolbox",
    "hevc_videotoolbox",
    "h264_amf",
    "hevc_amf",
    "av1_amf",
];

pub async fn discover(tool_path: &str) -> HardwareCapabilities {
    let output = Command::new(tool_path).arg("-encoders").output().await;
    let mut available = HashSet::new();
    match output {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            for encoder in KNOWN_ENCODERS {
                if stdout.contains(encoder) {
                    available.insert(encoder.to_string());
                }
            }
            info!(count = available.len(), "discovered hardware encoders");
        }
        Err(err) => {
            warn!(error = %err, "failed to invoke tool for hardware-capability discovery; assuming software-only");
        }
    }
    HardwareCapabilities {
        available_encoders: available,
    }
}
