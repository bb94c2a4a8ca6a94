//! Storage Abstraction (C1): a uniform async byte-stream interface over
//! local-filesystem and object-store backends, each constructed once at
//! boot from a static configuration and addressed by a registered name.

pub mod config;
pub mod factory;
pub mod opendal_backend;
pub mod registry;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub size_bytes: u64,
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    pub name: String,
    pub kind: &'static str,
    pub available: bool,
}

/// The capability set every backend must provide. `read_stream`/
/// `write_stream` are the hot path: callers drive the stream (backpressure
/// flows naturally through `Stream`/`Sink`-style polling) rather than the
/// backend buffering whole files in memory.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// Lazy byte-chunk sequence; chunk size is a backend hint (typically
    /// 8 KiB for local files; object stores yield whatever their client
    /// library buffers).
    async fn read_stream(&self, path: &str) -> Result<BoxStream<'static, Result<Bytes>>>;

    /// Consumes a byte-chunk sequence, returns bytes written.
    async fn write_stream(
        &self,
        path: &str,
        chunks: BoxStream<'static, Result<Bytes>>,
    ) -> Result<u64>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Optionally recursive listing; for object stores, pagination happens
    /// internally and names are returned relative to any configured prefix.
    async fn list(&self, path: &str, recursive: bool) -> Result<Vec<String>>;

    async fn ensure_dir(&self, path: &str) -> Result<()>;

    async fn stat(&self, path: &str) -> Result<FileStat>;

    async fn status(&self) -> BackendStatus;

    /// `Some(base_dir)` for a backend rooted at a local filesystem
    /// directory; `None` for object-store backends, which have no
    /// filesystem base to canonicalize against (§4.1).
    fn local_base_dir(&self) -> Option<&Path> {
        None
    }
}

/// Split `name://rest` into `(backend_name, rest)`; unprefixed paths
/// default to `local`.
pub fn parse_uri(uri: &str) -> (&str, &str) {
    match uri.split_once("://") {
        Some((name, rest)) => (name, rest),
        None => ("local", uri),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_and_unprefixed_uris() {
        assert_eq!(parse_uri("s3://bucket/path/a.mp4"), ("s3", "bucket/path/a.mp4"));
        assert_eq!(parse_uri("local:///in/a.mp4"), ("local", "/in/a.mp4"));
        assert_eq!(parse_uri("/in/a.mp4"), ("local", "/in/a.mp4"));
    }
}
