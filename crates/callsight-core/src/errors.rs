//! Error hierarchy for the callsight pipeline.
//!
//! Built on [`thiserror`]:
//!
//! - [`CallsightError`]: top-level enum covering all error domains
//! - [`IngestError`]: demultiplexer / sink failures
//! - [`ExtractionError`]: dump parsing and feature extraction failures
//! - [`PoolError`]: execution pool failures
//! - [`StoreError`]: storage collaborator failures with operation context
//!
//! None of these ever reach the originating client; ingestion has already
//! completed by the time extraction runs. They surface to the operator via
//! logs, metrics, and ERROR messages on the pool's result channel.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// CallsightError — top-level error enum
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error type for the callsight pipeline.
#[derive(Debug, Error)]
pub enum CallsightError {
    /// Ingestion / demultiplexing error.
    #[error("{0}")]
    Ingest(#[from] IngestError),

    /// Dump parsing / feature extraction error.
    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    /// Execution pool error.
    #[error("{0}")]
    Pool(#[from] PoolError),

    /// Storage collaborator error.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Generic internal error with a machine-readable code.
    #[error("[{code}] {message}")]
    Internal {
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

impl CallsightError {
    /// Create an internal error with a code and message.
    #[must_use]
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Ingest(e) => e.code(),
            Self::Extraction(e) => e.code(),
            Self::Pool(e) => e.code(),
            Self::Store(e) => &e.code,
            Self::Internal { code, .. } => code,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IngestError
// ─────────────────────────────────────────────────────────────────────────────

/// Demultiplexer / sink failure.
///
/// `MalformedRequest` is the only recoverable variant: the offending event
/// is dropped and the demultiplexer keeps serving other clients.
#[derive(Debug, Error)]
pub enum IngestError {
    /// An inbound event was missing a required field.
    #[error("malformed request: missing {field}")]
    MalformedRequest {
        /// The missing field (`clientId` or `type`).
        field: &'static str,
    },

    /// Sink file creation failed after collision retries.
    #[error("sink create failed for {client_id}: {source}")]
    SinkCreate {
        /// Client the sink belongs to.
        client_id: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing an event to an open sink failed.
    #[error("sink write failed for {client_id}: {source}")]
    SinkWrite {
        /// Client the sink belongs to.
        client_id: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedRequest { .. } => "INGEST_MALFORMED_REQUEST",
            Self::SinkCreate { .. } => "INGEST_SINK_CREATE_ERROR",
            Self::SinkWrite { .. } => "INGEST_SINK_WRITE_ERROR",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ExtractionError
// ─────────────────────────────────────────────────────────────────────────────

/// Dump parsing / feature extraction failure.
///
/// Aborts extraction for one dump only; the pool reports it as ERROR with
/// the client id and keeps running.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// A dump line was not valid JSON or not the expected array shape.
    #[error("parse failure for {client_id} at line {line}: {message}")]
    ParseFailure {
        /// Client whose dump failed to parse.
        client_id: String,
        /// 1-based line number within the dump.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    /// The dump's first line was not a session metadata object.
    #[error("missing session metadata in dump for {client_id}")]
    MissingSessionMeta {
        /// Client whose dump lacked metadata.
        client_id: String,
    },

    /// Reading the dump file failed.
    #[error("dump read failed for {client_id}: {source}")]
    DumpRead {
        /// Client whose dump could not be read.
        client_id: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ExtractionError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseFailure { .. } => "EXTRACT_PARSE_FAILURE",
            Self::MissingSessionMeta { .. } => "EXTRACT_MISSING_META",
            Self::DumpRead { .. } => "EXTRACT_DUMP_READ_ERROR",
        }
    }

    /// Client id the failed dump belonged to.
    #[must_use]
    pub fn client_id(&self) -> &str {
        match self {
            Self::ParseFailure { client_id, .. }
            | Self::MissingSessionMeta { client_id }
            | Self::DumpRead { client_id, .. } => client_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PoolError
// ─────────────────────────────────────────────────────────────────────────────

/// Execution pool failure.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The dispatcher task is gone and can no longer accept submissions.
    #[error("pool dispatcher is not running")]
    DispatcherGone,

    /// An execution unit exited abnormally.
    #[error("worker {worker_id} exited abnormally")]
    WorkerExited {
        /// The unit that exited.
        worker_id: String,
    },
}

impl PoolError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DispatcherGone => "POOL_DISPATCHER_GONE",
            Self::WorkerExited { .. } => "POOL_WORKER_EXITED",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StoreError
// ─────────────────────────────────────────────────────────────────────────────

/// Storage collaborator operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOperation {
    /// Uploading a dump artifact.
    Put,
    /// Deleting a dump artifact.
    Delete,
    /// Registering a unique session key.
    Register,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Put => write!(f, "put"),
            Self::Delete => write!(f, "delete"),
            Self::Register => write!(f, "register"),
        }
    }
}

/// Storage collaborator failure.
#[derive(Debug, Error)]
#[error("store {operation} failed for {key}: {message}")]
pub struct StoreError {
    /// Key or client id the operation targeted.
    pub key: String,
    /// Operation that failed.
    pub operation: StoreOperation,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable error code.
    pub code: String,
    /// Artifact path involved, when known.
    pub path: Option<PathBuf>,
    /// Original cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    /// Create a new store error.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        operation: StoreOperation,
        message: impl Into<String>,
    ) -> Self {
        let op_upper = operation.to_string().to_uppercase();
        Self {
            key: key.into(),
            operation,
            message: message.into(),
            code: format!("STORE_{op_upper}_ERROR"),
            path: None,
            source: None,
        }
    }

    /// Set the artifact path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the error cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- CallsightError --

    #[test]
    fn internal_error_code_and_display() {
        let err = CallsightError::internal("MY_CODE", "my message");
        assert_eq!(err.code(), "MY_CODE");
        assert!(err.to_string().contains("MY_CODE"));
        assert!(err.to_string().contains("my message"));
    }

    #[test]
    fn from_ingest() {
        let err = CallsightError::from(IngestError::MalformedRequest { field: "clientId" });
        assert_eq!(err.code(), "INGEST_MALFORMED_REQUEST");
        assert!(err.to_string().contains("clientId"));
    }

    #[test]
    fn from_extraction() {
        let err = CallsightError::from(ExtractionError::MissingSessionMeta {
            client_id: "c1".into(),
        });
        assert_eq!(err.code(), "EXTRACT_MISSING_META");
        assert!(err.to_string().contains("c1"));
    }

    #[test]
    fn from_pool() {
        let err = CallsightError::from(PoolError::WorkerExited {
            worker_id: "w1".into(),
        });
        assert_eq!(err.code(), "POOL_WORKER_EXITED");
    }

    #[test]
    fn from_store() {
        let err = CallsightError::from(StoreError::new("c1", StoreOperation::Put, "denied"));
        assert_eq!(err.code(), "STORE_PUT_ERROR");
    }

    // -- IngestError --

    #[test]
    fn malformed_request_names_field() {
        let err = IngestError::MalformedRequest { field: "type" };
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn sink_write_carries_source() {
        let cause = std::io::Error::other("disk full");
        let err = IngestError::SinkWrite {
            client_id: "c1".into(),
            source: cause,
        };
        assert!(std::error::Error::source(&err).is_some());
    }

    // -- ExtractionError --

    #[test]
    fn parse_failure_reports_line() {
        let err = ExtractionError::ParseFailure {
            client_id: "c1".into(),
            line: 17,
            message: "not an array".into(),
        };
        assert!(err.to_string().contains("17"));
        assert_eq!(err.client_id(), "c1");
    }

    // -- StoreError --

    #[test]
    fn store_error_builder() {
        let cause = std::io::Error::other("timeout");
        let err = StoreError::new("c1", StoreOperation::Delete, "unlink failed")
            .with_path("/tmp/dumps/c1")
            .with_source(cause);
        assert_eq!(err.code, "STORE_DELETE_ERROR");
        assert_eq!(err.path.as_deref(), Some(std::path::Path::new("/tmp/dumps/c1")));
        assert!(err.source.is_some());
    }

    #[test]
    fn store_operation_display() {
        assert_eq!(StoreOperation::Put.to_string(), "put");
        assert_eq!(StoreOperation::Delete.to_string(), "delete");
        assert_eq!(StoreOperation::Register.to_string(), "register");
    }

    // -- Error trait impls --

    #[test]
    fn all_variants_are_std_error() {
        let _: &dyn std::error::Error = &CallsightError::internal("C", "m");
        let _: &dyn std::error::Error = &IngestError::MalformedRequest { field: "type" };
        let _: &dyn std::error::Error = &PoolError::DispatcherGone;
        let _: &dyn std::error::Error = &StoreError::new("k", StoreOperation::Put, "m");
    }
}
