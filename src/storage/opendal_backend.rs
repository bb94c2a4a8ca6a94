//! A single [`StorageBackend`] implementation backed by an `opendal::Operator`,
//! shared across all four backend kinds (local/s3/azblob/gcs). opendal
//! already unifies their capability sets; the factory only needs to pick
//! the right service builder per [`BackendConfig`] kind.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use opendal::Operator;

use super::{BackendStatus, FileStat, StorageBackend};
use crate::error::{Error, Result};

pub struct OpendalBackend {
    name: String,
    kind: &'static str,
    operator: Operator,
    /// Set only for the `local` kind, so the registry can canonicalize and
    /// bound-check request paths against it before they ever reach
    /// `operator` (§4.1, spec.md:83).
    base_dir: Option<PathBuf>,
}

impl OpendalBackend {
    pub fn new(name: String, kind: &'static str, operator: Operator, base_dir: Option<PathBuf>) -> Self {
        OpendalBackend {
            name,
            kind,
            operator,
            base_dir,
        }
    }

    fn wrap_err(&self, path: &str, source: opendal::Error) -> Error {
        use opendal::ErrorKind;
        match source.kind() {
            ErrorKind::NotFound => Error::not_found(format!("{path} not found"))
                .with_backend(self.name.clone())
                .with_source(source),
            _ => Error::internal(format!("storage backend '{}' failed for {path}", self.name))
                .with_backend(self.name.clone())
                .with_source(source),
        }
    }
}

#[async_trait]
impl StorageBackend for OpendalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.operator
            .exists(path)
            .await
            .map_err(|e| self.wrap_err(path, e))
    }

    async fn read_stream(&self, path: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        let reader = self
            .operator
            .reader(path)
            .await
            .map_err(|e| self.wrap_err(path, e))?;
        let backend_name = self.name.clone();
        let path_owned = path.to_string();
        let stream = reader
            .into_bytes_stream(..)
            .await
            .map_err(|e| self.wrap_err(path, e))?
            .map(move |chunk| {
                chunk.map_err(|e| {
                    Error::internal(format!("read error on {path_owned}"))
                        .with_backend(backend_name.clone())
                        .with_source(e)
                })
            });
        Ok(stream.boxed())
    }

    async fn write_stream(
        &self,
        path: &str,
        mut chunks: BoxStream<'static, Result<Bytes>>,
    ) -> Result<u64> {
        let mut writer = self
            .operator
            .writer(path)
            .await
            .map_err(|e| self.wrap_err(path, e))?;
        let mut total = 0u64;
        while let Some(chunk) = chunks.next().await {
            let bytes = chunk?;
            total += bytes.len() as u64;
            writer
                .write(bytes)
                .await
                .map_err(|e| self.wrap_err(path, e))?;
        }
        writer.close().await.map_err(|e| self.wrap_err(path, e))?;
        Ok(total)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.operator
            .delete(path)
            .await
            .map_err(|e| self.wrap_err(path, e))
    }

    async fn list(&self, path: &str, recursive: bool) -> Result<Vec<String>> {
        let lister = self
            .operator
            .lister_with(path)
            .recursive(recursive)
            .await
            .map_err(|e| self.wrap_err(path, e))?;
        let entries: Vec<_> = lister.collect::<Vec<_>>().await;
        let mut names = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry.map_err(|e| self.wrap_err(path, e))?;
            names.push(entry.path().to_string());
        }
        Ok(names)
    }

    async fn ensure_dir(&self, path: &str) -> Result<()> {
        let dir = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        self.operator
            .create_dir(&dir)
            .await
            .map_err(|e| self.wrap_err(path, e))
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        let meta = self
            .operator
            .stat(path)
            .await
            .map_err(|e| self.wrap_err(path, e))?;
        Ok(FileStat {
            size_bytes: meta.content_length(),
            is_dir: meta.is_dir(),
        })
    }

    async fn status(&self) -> BackendStatus {
        let available = self.operator.check().await.is_ok();
        BackendStatus {
            name: self.name.clone(),
            kind: self.kind,
            available,
        }
    }

    fn local_base_dir(&self) -> Option<&std::path::Path> {
        self.base_dir.as_deref()
    }
}

/// Adapts a `Result<Bytes, Error>` stream into the `Vec<u8>`-free empty
/// stream used by tests that don't need real I/O.
pub fn empty_stream() -> BoxStream<'static, Result<Bytes>> {
    stream::empty().boxed()
}
