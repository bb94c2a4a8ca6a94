//! Constructs a [`StorageBackend`] from a [`BackendConfig`] by dispatching
//! on its `kind` field. Cyclic ownership is not needed: every backend is
//! built once at startup and held behind an `Arc` in the registry.

use std::sync::Arc;

use opendal::Operator;
use opendal::services::{Azblob, Gcs, S3};

use super::config::BackendConfig;
use super::opendal_backend::OpendalBackend;
use super::StorageBackend;
use crate::error::{Error, Result};
use crate::validator::path_security;

fn env_or_err(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| Error::internal(format!("missing required environment variable {var}")))
}

pub fn build_backend(name: &str, config: &BackendConfig) -> Result<Arc<dyn StorageBackend>> {
    let kind = config.kind_name();
    match config {
        BackendConfig::Local { base_dir } => {
            let base = std::path::Path::new(base_dir);
            if !base.is_absolute() {
                return Err(Error::internal(format!(
                    "local backend '{name}' base_dir must be an absolute path"
                )));
            }
            path_security::reject_traversal(base_dir)?;
            let builder = opendal::services::Fs::default().root(base_dir);
            let operator = Operator::new(builder)
                .map_err(|e| Error::internal(format!("failed to construct local backend '{name}'")).with_source(e))?
                .finish();
            Ok(Arc::new(OpendalBackend::new(
                name.to_string(),
                kind,
                operator,
                Some(base.to_path_buf()),
            )))
        }
        BackendConfig::S3 {
            bucket,
            prefix,
            region,
            endpoint,
            access_key_env,
            secret_key_env,
        } => {
            let mut builder = S3::default().bucket(bucket).root(prefix);
            if let Some(region) = region {
                builder = builder.region(region);
            }
            if let Some(endpoint) = endpoint {
                builder = builder.endpoint(endpoint);
            }
            if let Some(var) = access_key_env {
                builder = builder.access_key_id(&env_or_err(var)?);
            }
            if let Some(var) = secret_key_env {
                builder = builder.secret_access_key(&env_or_err(var)?);
            }
            let operator = Operator::new(builder)
                .map_err(|e| Error::internal(format!("failed to construct s3 backend '{name}'")).with_source(e))?
                .finish();
            Ok(Arc::new(OpendalBackend::new(name.to_string(), kind, operator, None)))
        }
        BackendConfig::AzureBlob {
            account,
            container,
            prefix,
            account_key_env,
        } => {
            let mut builder = Azblob::default()
                .account_name(account)
                .container(container)
                .root(prefix);
            if let Some(var) = account_key_env {
                builder = builder.account_key(&env_or_err(var)?);
            }
            let operator = Operator::new(builder)
                .map_err(|e| Error::internal(format!("failed to construct azblob backend '{name}'")).with_source(e))?
                .finish();
            Ok(Arc::new(OpendalBackend::new(name.to_string(), kind, operator, None)))
        }
        BackendConfig::Gcs {
            bucket,
            prefix,
            credentials_path,
        } => {
            let mut builder = Gcs::default().bucket(bucket).root(prefix);
            if let Some(path) = credentials_path {
                builder = builder.credential_path(path);
            }
            let operator = Operator::new(builder)
                .map_err(|e| Error::internal(format!("failed to construct gcs backend '{name}'")).with_source(e))?
                .finish();
            Ok(Arc::new(OpendalBackend::new(name.to_string(), kind, operator, None)))
        }
    }
}
