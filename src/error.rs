//! Stable error-kind taxonomy shared by every component.
//!
//! Components return [`Error`] directly so callers can match on `kind()` to
//! decide retry/HTTP-status behavior. Glue code that crosses an unrelated
//! component boundary (e.g. storage I/O bubbling through the worker loop) is
//! free to wrap with `anyhow` at that outer boundary instead of threading
//! this type through every intermediate call.

use std::fmt;

use thiserror::Error;

/// One entry per row of the error-kind table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    ValidationError,
    SecurityError,
    NotFound,
    AccessDenied,
    RateLimitExceeded,
    QueueEnqueueFailed,
    ToolFailure,
    Timeout,
    Cancelled,
    TransportError,
    InternalError,
}

impl Kind {
    /// Stable short code, suitable for a client-visible JSON `error` field.
    pub fn code(self) -> &'static str {
        match self {
            Kind::ValidationError => "validation_error",
            Kind::SecurityError => "security_error",
            Kind::NotFound => "not_found",
            Kind::AccessDenied => "access_denied",
            Kind::RateLimitExceeded => "rate_limit_exceeded",
            Kind::QueueEnqueueFailed => "queue_enqueue_failed",
            Kind::ToolFailure => "tool_failure",
            Kind::Timeout => "timeout",
            Kind::Cancelled => "cancelled",
            Kind::TransportError => "transport_error",
            Kind::InternalError => "internal_error",
        }
    }

    /// The conventional HTTP status an out-of-scope HTTP layer would map
    /// this kind to. `tool_failure` and `timeout` are client-visible but
    /// sanitized, so they still get a status even though the message never
    /// carries tool stderr.
    pub fn http_status(self) -> u16 {
        match self {
            Kind::ValidationError | Kind::SecurityError => 400,
            Kind::AccessDenied => 403,
            Kind::NotFound => 404,
            Kind::RateLimitExceeded => 429,
            Kind::QueueEnqueueFailed => 503,
            Kind::ToolFailure | Kind::Timeout => 422,
            Kind::Cancelled => 409,
            Kind::TransportError | Kind::InternalError => 500,
        }
    }

    /// Whether this kind is retried locally (currently only webhook transport
    /// errors, handled by the delivery task itself).
    pub fn retried_locally(self) -> bool {
        matches!(self, Kind::TransportError)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The library-level error type. Carries enough structured context to
/// render both a client-safe message and a full internal log line.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: Kind,
    message: String,
    /// Field or parameter name implicated, when known (validation/security).
    pub field: Option<String>,
    /// Job id implicated, when known.
    pub job_id: Option<String>,
    /// Storage backend name implicated, when known.
    pub backend: Option<String>,
    #[source]
    source: Option<anyhow::Error>,
}

impl Error {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            field: None,
            job_id: None,
            backend: None,
            source: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(Kind::ValidationError, message)
    }

    pub fn security(message: impl Into<String>) -> Self {
        Self::new(Kind::SecurityError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Kind::NotFound, message)
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(Kind::AccessDenied, message)
    }

    pub fn rate_limit_exceeded(message: impl Into<String>) -> Self {
        Self::new(Kind::RateLimitExceeded, message)
    }

    pub fn queue_enqueue_failed(message: impl Into<String>) -> Self {
        Self::new(Kind::QueueEnqueueFailed, message)
    }

    pub fn tool_failure(message: impl Into<String>) -> Self {
        Self::new(Kind::ToolFailure, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(Kind::Timeout, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Kind::Cancelled, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(Kind::TransportError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Kind::InternalError, message)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Message safe to hand back to a client. `tool_failure`/`timeout`
    /// never carry raw tool stderr here; callers must have already
    /// sanitized `message` at construction time (see worker::process).
    pub fn client_message(&self) -> &str {
        &self.message
    }
}

pub type Result<T> = std::result::Result<T, Error>;
