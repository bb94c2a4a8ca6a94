//! Static per-backend configuration, as read from the YAML config document.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Local {
        base_dir: String,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: String,
        region: Option<String>,
        endpoint: Option<String>,
        access_key_env: Option<String>,
        secret_key_env: Option<String>,
    },
    AzureBlob {
        account: String,
        container: String,
        #[serde(default)]
        prefix: String,
        account_key_env: Option<String>,
    },
    Gcs {
        bucket: String,
        #[serde(default)]
        prefix: String,
        credentials_path: Option<String>,
    },
}

impl BackendConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            BackendConfig::Local { .. } => "local",
            BackendConfig::S3 { .. } => "s3",
            BackendConfig::AzureBlob { .. } => "azblob",
            BackendConfig::Gcs { .. } => "gcs",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedBackendConfig {
    pub name: String,
    #[serde(flatten)]
    pub backend: BackendConfig,
}
