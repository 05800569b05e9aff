//! The extraction worker plugged into the execution pool.

use tracing::{debug, info};

use callsight_core::{CallsightError, SessionReport};
use callsight_events::CompletedDump;
use callsight_pool::{DumpProcessor, ProcessorFactory};

use crate::catalog::FeatureCatalog;
use crate::parse::parse_dump;

/// Runs inside one execution unit: parses a dump, rebuilds per-connection
/// logs, runs the feature engine, and reports the result.
///
/// The worker is self-contained per unit; a fresh one is created by the
/// pool's factory for every (re)spawned unit.
pub struct ExtractionWorker {
    catalog: FeatureCatalog,
}

impl ExtractionWorker {
    /// Create a worker with the full production catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            catalog: FeatureCatalog::standard(),
        }
    }
}

impl Default for ExtractionWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl DumpProcessor for ExtractionWorker {
    fn process(&mut self, dump: &CompletedDump) -> Result<Option<SessionReport>, CallsightError> {
        let view = parse_dump(dump.client_id.as_str(), &dump.dump_path)?;

        let Some(report) = self.catalog.generate(&view) else {
            debug!(client_id = %dump.client_id, "session has nothing to mine, no report");
            return Ok(None);
        };

        info!(
            client_id = %dump.client_id,
            connections = report.connections.len(),
            entries = report.metrics.total_count(),
            "dump mined"
        );
        Ok(Some(report))
    }
}

/// Factory handed to the execution pool; the equivalent of the worker
/// script path.
#[must_use]
pub fn processor_factory() -> ProcessorFactory {
    std::sync::Arc::new(|| Box::new(ExtractionWorker::new()) as Box<dyn DumpProcessor>)
}
