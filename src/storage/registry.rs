//! Registered backend lookup by name, built once at startup from config.

use std::collections::HashMap;
use std::sync::Arc;

use super::config::NamedBackendConfig;
use super::factory::build_backend;
use super::{parse_uri, StorageBackend};
use crate::error::{Error, Result};
use crate::validator::path_security;

pub struct StorageRegistry {
    backends: HashMap<String, Arc<dyn StorageBackend>>,
    pub default_backend: String,
    pub output_backends: Vec<String>,
}

impl StorageRegistry {
    pub fn build(
        configs: &[NamedBackendConfig],
        default_backend: String,
        output_backends: Vec<String>,
    ) -> Result<Self> {
        let mut backends = HashMap::new();
        for entry in configs {
            let backend = build_backend(&entry.name, &entry.backend)?;
            backends.insert(entry.name.clone(), backend);
        }
        if !backends.contains_key(&default_backend) {
            return Err(Error::internal(format!(
                "default_backend '{default_backend}' is not among the registered backends"
            )));
        }
        for name in &output_backends {
            if !backends.contains_key(name) {
                return Err(Error::internal(format!(
                    "output_backends entry '{name}' is not among the registered backends"
                )));
            }
        }
        Ok(StorageRegistry {
            backends,
            default_backend,
            output_backends,
        })
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn StorageBackend>> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| Error::validation(format!("storage backend '{name}' is not registered")).with_field("backend"))
    }

    /// Resolve a `<backend>://<path>` URI into a registered backend and its
    /// relative path, defaulting an unprefixed path to `local`. Every path
    /// is run through the traversal checks before it ever reaches a
    /// backend: a `local`-kind backend additionally has to resolve inside
    /// its configured base directory (§4.1, spec.md:83).
    pub fn resolve(&self, uri: &str) -> Result<(Arc<dyn StorageBackend>, String)> {
        let (name, path) = parse_uri(uri);
        let backend = self.get(name)?;
        match backend.local_base_dir() {
            Some(base_dir) => {
                path_security::resolve_under_base(base_dir, path)?;
            }
            None => {
                path_security::reject_traversal(path)?;
            }
        }
        Ok((backend, path.to_string()))
    }

    pub fn is_output_allowed(&self, name: &str) -> bool {
        self.output_backends.iter().any(|b| b == name)
    }

    pub async fn statuses(&self) -> Vec<super::BackendStatus> {
        let mut out = Vec::with_capacity(self.backends.len());
        for backend in self.backends.values() {
            out.push(backend.status().await);
        }
        out
    }
}
