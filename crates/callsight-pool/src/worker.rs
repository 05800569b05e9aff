//! Execution unit threads.
//!
//! Each unit is a dedicated OS thread owning one processor instance. It
//! receives tasks over a private channel, reports over the shared response
//! channel, and runs each dump to completion or error — there is no
//! mid-task cancellation. A panic inside the processor kills only this
//! unit; the exit guard tells the dispatcher, which synthesizes the ERROR
//! for the registered in-flight task and regenerates the unit.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc as std_mpsc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use callsight_core::{CallsightError, SessionReport, WorkerId};
use callsight_events::CompletedDump;

use crate::messages::{PoolMessage, WorkerRequest, WorkerResponse};

/// Processes one dump inside an execution unit.
///
/// A processor is created per unit by the pool's factory, owns whatever
/// state it needs, and shares nothing. Returning `Ok(None)` means the
/// session produced no report (nothing to mine); an `Err` aborts only this
/// dump.
pub trait DumpProcessor: Send {
    /// Run one dump to completion.
    fn process(&mut self, dump: &CompletedDump) -> Result<Option<SessionReport>, CallsightError>;
}

/// Factory creating one processor per unit; the unit equivalent of the
/// worker script path.
pub type ProcessorFactory = std::sync::Arc<dyn Fn() -> Box<dyn DumpProcessor> + Send + Sync>;

/// Sends the exit notification when the unit thread ends for any reason,
/// panic included.
struct ExitGuard {
    worker_id: WorkerId,
    tx: mpsc::UnboundedSender<PoolMessage>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        // The dispatcher may already be gone during shutdown.
        let _ = self.tx.send(PoolMessage::Exited(self.worker_id.clone()));
    }
}

/// Spawn one execution unit thread.
///
/// Returns the task sender; dropping it ends the unit cleanly.
pub(crate) fn spawn_unit(
    worker_id: WorkerId,
    factory: &ProcessorFactory,
    tx: mpsc::UnboundedSender<PoolMessage>,
) -> std_mpsc::Sender<WorkerRequest> {
    let (req_tx, req_rx) = std_mpsc::channel::<WorkerRequest>();
    let factory = std::sync::Arc::clone(factory);

    let thread_id = worker_id.clone();
    let thread_tx = tx.clone();
    let builder = std::thread::Builder::new().name(format!("extract-{thread_id}"));
    let spawned = builder.spawn(move || {
        let tx = thread_tx;
        let _guard = ExitGuard {
            worker_id: thread_id.clone(),
            tx: tx.clone(),
        };
        let mut processor = factory();
        info!(worker_id = %thread_id, "execution unit started");

        while let Ok(WorkerRequest::Process(dump)) = req_rx.recv() {
            let _ = tx.send(PoolMessage::FromWorker(
                thread_id.clone(),
                WorkerResponse::StateUpdate { dump: dump.clone() },
            ));
            let _ = tx.send(PoolMessage::FromWorker(
                thread_id.clone(),
                WorkerResponse::Processing {
                    client_id: dump.client_id.clone(),
                },
            ));

            let started = Instant::now();
            let dump_size_bytes = std::fs::metadata(&dump.dump_path)
                .map(|m| m.len())
                .unwrap_or_default();

            let outcome = catch_unwind(AssertUnwindSafe(|| processor.process(&dump)));

            let response = match outcome {
                Ok(Ok(report)) => {
                    let _ = tx.send(PoolMessage::FromWorker(
                        thread_id.clone(),
                        WorkerResponse::Metrics {
                            client_id: dump.client_id.clone(),
                            extract_duration_ms: u64::try_from(started.elapsed().as_millis())
                                .unwrap_or(u64::MAX),
                            dump_size_bytes,
                        },
                    ));
                    WorkerResponse::Done {
                        dump,
                        report: report.map(Box::new),
                    }
                }
                Ok(Err(err)) => {
                    debug!(worker_id = %thread_id, "extraction failed: {err}");
                    WorkerResponse::Error {
                        code: err.code().to_owned(),
                        message: err.to_string(),
                        dump,
                    }
                }
                Err(_panic) => {
                    // The unit is no longer trustworthy. Die without a
                    // terminal response; the exit guard notifies the
                    // dispatcher, which attributes the crash through the
                    // STATE_UPDATE it recorded.
                    error!(worker_id = %thread_id, "processor panicked, unit exiting");
                    return;
                }
            };
            let _ = tx.send(PoolMessage::FromWorker(thread_id.clone(), response));
        }
        info!(worker_id = %thread_id, "execution unit stopped");
    });

    if let Err(err) = spawned {
        // Thread creation failed outright; surface it as an instant exit so
        // the dispatcher schedules regeneration.
        error!(worker_id = %worker_id, "failed to spawn execution unit: {err}");
        let _ = tx.send(PoolMessage::Exited(worker_id));
    }

    req_tx
}
