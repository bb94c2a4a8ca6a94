//! Configuration (§10.3): a single YAML document read once at startup and
//! cached for the process lifetime. An invalid or unparsable document is a
//! startup-fatal error; there is no partial/degraded start.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::storage::config::NamedBackendConfig;
use crate::validator::rules::MAX_OPERATIONS_PER_JOB_DEFAULT;

fn default_job_timeout_secs() -> u64 {
    6 * 60 * 60
}

fn default_max_operations_per_job() -> usize {
    MAX_OPERATIONS_PER_JOB_DEFAULT
}

fn default_tenant_cap() -> u32 {
    10
}

fn default_temp_root() -> String {
    "/tmp/vodpipe".to_string()
}

fn default_tool_path() -> String {
    "ffmpeg".to_string()
}

fn default_probe_tool_path() -> String {
    "ffprobe".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantCaps {
    #[serde(default = "default_tenant_cap")]
    pub default: u32,
    #[serde(default)]
    pub overrides: BTreeMap<String, u32>,
}

impl Default for TenantCaps {
    fn default() -> Self {
        TenantCaps {
            default: default_tenant_cap(),
            overrides: BTreeMap::new(),
        }
    }
}

/// Top-level configuration document (§6 "Environment & config", §10.3).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub backends: Vec<NamedBackendConfig>,
    pub default_backend: String,
    #[serde(default)]
    pub output_backends: Vec<String>,
    #[serde(default)]
    pub tenant_caps: TenantCaps,
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    #[serde(default = "default_max_operations_per_job")]
    pub max_operations_per_job: usize,
    #[serde(default = "default_temp_root")]
    pub temp_root: String,
    #[serde(default = "default_tool_path")]
    pub tool_path: String,
    #[serde(default = "default_probe_tool_path")]
    pub probe_tool_path: String,
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Config {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Load and validate a YAML config document from disk. Failure here is
    /// meant to be startup-fatal; callers should not attempt a degraded
    /// start on error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::internal(format!("failed to read config file {}", path.display())).with_source(e))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(raw)
            .map_err(|e| Error::internal("failed to parse config document").with_source(e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(Error::internal("config must declare at least one storage backend"));
        }
        if !self.backends.iter().any(|b| b.name == self.default_backend) {
            return Err(Error::internal(format!(
                "default_backend '{}' is not among the declared backends",
                self.default_backend
            )));
        }
        for name in &self.output_backends {
            if !self.backends.iter().any(|b| &b.name == name) {
                return Err(Error::internal(format!(
                    "output_backends entry '{name}' is not among the declared backends"
                )));
            }
        }
        if self.max_operations_per_job == 0 {
            return Err(Error::internal("max_operations_per_job must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_default_backend() {
        let raw = r#"
backends:
  - name: local
    kind: local
    base_dir: /data
default_backend: nonexistent
"#;
        assert!(Config::parse(raw).is_err());
    }

    #[test]
    fn parses_a_minimal_valid_document() {
        let raw = r#"
backends:
  - name: local
    kind: local
    base_dir: /data
default_backend: local
output_backends: [local]
"#;
        let config = Config::parse(raw).unwrap();
        assert_eq!(config.default_backend, "local");
        assert_eq!(config.max_operations_per_job, MAX_OPERATIONS_PER_JOB_DEFAULT);
        assert_eq!(config.job_timeout(), Duration::from_secs(6 * 60 * 60));
    }
}
