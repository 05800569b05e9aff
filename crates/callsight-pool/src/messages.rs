//! Dispatcher ↔ unit protocol and subscriber events.

use callsight_core::{ClientId, SessionReport, WorkerId};
use callsight_events::CompletedDump;

/// Lifecycle state of one execution unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Ready for a task.
    Idle,
    /// Processing a task.
    Running,
    /// Exited; about to be removed from the pool.
    Stopped,
}

/// Request sent to an execution unit.
#[derive(Debug)]
pub enum WorkerRequest {
    /// Process one completed dump.
    Process(CompletedDump),
}

/// Message sent by an execution unit to the dispatcher.
#[derive(Clone, Debug)]
pub enum WorkerResponse {
    /// Registers the in-flight task for crash attribution. Does not change
    /// the unit's state and is not forwarded to subscribers.
    StateUpdate {
        /// The task now in flight.
        dump: CompletedDump,
    },
    /// Non-terminal progress notification, forwarded to subscribers.
    Processing {
        /// Client being processed.
        client_id: ClientId,
    },
    /// Terminal success: frees the unit.
    Done {
        /// The processed dump.
        dump: CompletedDump,
        /// The mined report; `None` for sessions that produce no report
        /// (no getUserMedia events and no connections).
        report: Option<Box<SessionReport>>,
    },
    /// Terminal failure: frees the unit. Reported exactly once per task.
    Error {
        /// The dump whose extraction failed.
        dump: CompletedDump,
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
    /// Extraction observability payload, forwarded to subscribers.
    Metrics {
        /// Client the metrics belong to.
        client_id: ClientId,
        /// Wall-clock extraction duration.
        extract_duration_ms: u64,
        /// Input dump size.
        dump_size_bytes: u64,
    },
}

/// Internal dispatcher inbox: unit responses, exit notifications, and the
/// delayed regeneration tick.
#[derive(Debug)]
pub(crate) enum PoolMessage {
    FromWorker(WorkerId, WorkerResponse),
    Exited(WorkerId),
    Regenerate,
}

/// Event delivered to pool subscribers.
///
/// Everything except STATE_UPDATE is forwarded; each subscriber gets its
/// own unbounded channel and registers independently of the core.
#[derive(Clone, Debug)]
pub enum PoolEvent {
    /// A unit started processing a dump.
    Processing {
        /// Client being processed.
        client_id: ClientId,
    },
    /// Extraction finished.
    Done {
        /// The processed dump; the receiver now owns the file.
        dump: CompletedDump,
        /// The mined report, when the session produced one.
        report: Option<Box<SessionReport>>,
    },
    /// Extraction failed, including failures synthesized for crashed units.
    Error {
        /// The dump whose extraction failed.
        dump: CompletedDump,
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
    /// Extraction observability payload.
    Metrics {
        /// Client the metrics belong to.
        client_id: ClientId,
        /// Wall-clock extraction duration.
        extract_duration_ms: u64,
        /// Input dump size.
        dump_size_bytes: u64,
    },
}
