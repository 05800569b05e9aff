//! The execution pool dispatcher.
//!
//! The dispatcher keeps the configured number of units alive: a unit that
//! exits for any reason is removed and a replacement is created after a
//! short delay, so repeated crashes cannot spin the pool. All pool state
//! is owned by one task and mutated one message at a time.

use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use callsight_core::metric_names::{
    POOL_QUEUE_DEPTH, POOL_WORKERS_ALIVE, POOL_WORKER_EXITS_TOTAL,
};
use callsight_core::{PoolError, WorkerId};
use callsight_events::CompletedDump;

use crate::messages::{PoolEvent, PoolMessage, WorkerRequest, WorkerResponse, WorkerStatus};
use crate::worker::{spawn_unit, ProcessorFactory};

/// Pool size derived from the host: available parallelism minus two so
/// extraction never starves ingestion, minimum one.
#[must_use]
pub fn ideal_worker_count() -> usize {
    let cores = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    cores.saturating_sub(2).max(1)
}

enum PoolCommand {
    Submit(Box<CompletedDump>),
    Subscribe(oneshot::Sender<mpsc::UnboundedReceiver<PoolEvent>>),
    Introspect(oneshot::Sender<Vec<(WorkerId, WorkerStatus)>>),
    QueueDepth(oneshot::Sender<usize>),
}

/// Handle used to submit tasks and register subscribers.
///
/// Cloneable; the dispatcher stops when every handle is dropped.
#[derive(Clone)]
pub struct PoolHandle {
    cmd_tx: mpsc::UnboundedSender<PoolCommand>,
}

impl PoolHandle {
    /// Submit a task: dispatched to an idle unit immediately, otherwise
    /// appended to the FIFO pending queue.
    pub fn submit(&self, dump: CompletedDump) -> Result<(), PoolError> {
        self.cmd_tx
            .send(PoolCommand::Submit(Box::new(dump)))
            .map_err(|_| PoolError::DispatcherGone)
    }

    /// Register a subscriber; every event from now on is fanned out to it.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<PoolEvent>, PoolError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(PoolCommand::Subscribe(tx))
            .map_err(|_| PoolError::DispatcherGone)?;
        rx.await.map_err(|_| PoolError::DispatcherGone)
    }

    /// Current unit ids and states, for introspection and tests.
    pub async fn introspect(&self) -> Result<Vec<(WorkerId, WorkerStatus)>, PoolError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(PoolCommand::Introspect(tx))
            .map_err(|_| PoolError::DispatcherGone)?;
        rx.await.map_err(|_| PoolError::DispatcherGone)
    }

    /// Number of queued-but-undispatched tasks.
    pub async fn queue_depth(&self) -> Result<usize, PoolError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(PoolCommand::QueueDepth(tx))
            .map_err(|_| PoolError::DispatcherGone)?;
        rx.await.map_err(|_| PoolError::DispatcherGone)
    }
}

struct UnitHandle {
    worker_id: WorkerId,
    req_tx: std_mpsc::Sender<WorkerRequest>,
    status: WorkerStatus,
    /// In-flight task recorded from STATE_UPDATE, for crash attribution.
    current_task: Option<CompletedDump>,
}

/// The pool itself; owns the units, the pending queue, and the subscriber
/// registry.
pub struct ExecutionPool {
    factory: ProcessorFactory,
    pool_size: usize,
    regen_delay: Duration,
    units: Vec<UnitHandle>,
    task_queue: VecDeque<CompletedDump>,
    subscribers: Vec<mpsc::UnboundedSender<PoolEvent>>,
    msg_tx: mpsc::UnboundedSender<PoolMessage>,
}

impl ExecutionPool {
    /// Create the pool and start its dispatcher task.
    ///
    /// `pool_size` units are created up front; `regen_delay` is the pause
    /// before a crashed unit's replacement is created.
    #[must_use]
    pub fn spawn(factory: ProcessorFactory, pool_size: usize, regen_delay: Duration) -> PoolHandle {
        let pool_size = pool_size.max(1);
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let mut pool = Self {
            factory,
            pool_size,
            regen_delay,
            units: Vec::with_capacity(pool_size),
            task_queue: VecDeque::new(),
            subscribers: Vec::new(),
            msg_tx,
        };
        for _ in 0..pool_size {
            pool.add_unit();
        }

        drop(tokio::spawn(pool.run(cmd_rx, msg_rx)));
        PoolHandle { cmd_tx }
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<PoolCommand>,
        mut msg_rx: mpsc::UnboundedReceiver<PoolMessage>,
    ) {
        loop {
            tokio::select! {
                command = cmd_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    // Every handle is gone; stop dispatching. Dropping the
                    // units' request senders ends their threads cleanly.
                    None => break,
                },
                Some(message) = msg_rx.recv() => self.handle_message(message),
            }
        }
        info!("pool dispatcher stopped");
    }

    fn handle_command(&mut self, command: PoolCommand) {
        match command {
            PoolCommand::Submit(dump) => self.submit(*dump),
            PoolCommand::Subscribe(reply) => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.subscribers.push(tx);
                let _ = reply.send(rx);
            }
            PoolCommand::Introspect(reply) => {
                let states = self
                    .units
                    .iter()
                    .map(|unit| (unit.worker_id.clone(), unit.status))
                    .collect();
                let _ = reply.send(states);
            }
            PoolCommand::QueueDepth(reply) => {
                let _ = reply.send(self.task_queue.len());
            }
        }
    }

    fn handle_message(&mut self, message: PoolMessage) {
        match message {
            PoolMessage::FromWorker(worker_id, response) => {
                self.handle_response(&worker_id, response);
            }
            PoolMessage::Exited(worker_id) => self.handle_exit(&worker_id),
            PoolMessage::Regenerate => self.regenerate(),
        }
    }

    fn handle_response(&mut self, worker_id: &WorkerId, response: WorkerResponse) {
        match response {
            WorkerResponse::StateUpdate { dump } => {
                if let Some(unit) = self.unit_mut(worker_id) {
                    unit.current_task = Some(dump);
                }
            }
            WorkerResponse::Processing { client_id } => {
                self.publish(PoolEvent::Processing { client_id });
            }
            WorkerResponse::Metrics {
                client_id,
                extract_duration_ms,
                dump_size_bytes,
            } => {
                self.publish(PoolEvent::Metrics {
                    client_id,
                    extract_duration_ms,
                    dump_size_bytes,
                });
            }
            WorkerResponse::Done { dump, report } => {
                self.publish(PoolEvent::Done { dump, report });
                self.free_unit(worker_id);
            }
            WorkerResponse::Error {
                dump,
                code,
                message,
            } => {
                self.publish(PoolEvent::Error {
                    dump,
                    code,
                    message,
                });
                self.free_unit(worker_id);
            }
        }
    }

    /// A terminal response frees the unit and immediately hands it the
    /// queue head, if any.
    fn free_unit(&mut self, worker_id: &WorkerId) {
        let next = self.task_queue.pop_front();
        self.update_queue_gauge();
        let Some(unit) = self.unit_mut(worker_id) else {
            // Unit exited between the terminal response and now; the task
            // goes back to the queue front.
            if let Some(dump) = next {
                self.task_queue.push_front(dump);
                self.update_queue_gauge();
            }
            return;
        };
        unit.current_task = None;
        match next {
            Some(dump) => dispatch(unit, dump),
            None => unit.status = WorkerStatus::Idle,
        }
    }

    fn handle_exit(&mut self, worker_id: &WorkerId) {
        let Some(index) = self
            .units
            .iter()
            .position(|unit| &unit.worker_id == worker_id)
        else {
            return;
        };
        let mut unit = self.units.remove(index);
        unit.status = WorkerStatus::Stopped;
        counter!(POOL_WORKER_EXITS_TOTAL).increment(1);
        self.update_worker_gauge();
        warn!(worker_id = %worker_id, "execution unit exited, scheduling replacement");

        // The unit died without a terminal response: synthesize the ERROR
        // for the task the STATE_UPDATE registered, exactly once.
        if let Some(dump) = unit.current_task.take() {
            self.publish(PoolEvent::Error {
                dump,
                code: PoolError::WorkerExited {
                    worker_id: worker_id.to_string(),
                }
                .code()
                .to_owned(),
                message: format!("worker {worker_id} exited mid-task"),
            });
        }

        // Delay the replacement so repeated crashes cannot spin the pool,
        // and so nothing regenerates while the process is shutting down.
        let msg_tx = self.msg_tx.clone();
        let delay = self.regen_delay;
        drop(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = msg_tx.send(PoolMessage::Regenerate);
        }));
    }

    fn regenerate(&mut self) {
        if self.units.len() >= self.pool_size {
            warn!("pool already at capacity, not adding a unit");
            return;
        }
        let worker_id = self.add_unit();
        // Hand the fresh unit the queue head straight away.
        if let Some(dump) = self.task_queue.pop_front() {
            self.update_queue_gauge();
            if let Some(unit) = self.unit_mut(&worker_id) {
                dispatch(unit, dump);
            }
        }
    }

    fn submit(&mut self, dump: CompletedDump) {
        match self
            .units
            .iter_mut()
            .find(|unit| unit.status == WorkerStatus::Idle)
        {
            Some(unit) => dispatch(unit, dump),
            None => {
                self.task_queue.push_back(dump);
                self.update_queue_gauge();
                info!(queue_depth = self.task_queue.len(), "no idle unit, task queued");
            }
        }
    }

    fn add_unit(&mut self) -> WorkerId {
        let worker_id = WorkerId::new();
        let req_tx = spawn_unit(worker_id.clone(), &self.factory, self.msg_tx.clone());
        self.units.push(UnitHandle {
            worker_id: worker_id.clone(),
            req_tx,
            status: WorkerStatus::Idle,
            current_task: None,
        });
        self.update_worker_gauge();
        worker_id
    }

    fn unit_mut(&mut self, worker_id: &WorkerId) -> Option<&mut UnitHandle> {
        self.units
            .iter_mut()
            .find(|unit| &unit.worker_id == worker_id)
    }

    fn publish(&mut self, event: PoolEvent) {
        // Dead subscribers drop out of the registry on the way through.
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn update_queue_gauge(&self) {
        #[allow(clippy::cast_precision_loss)]
        gauge!(POOL_QUEUE_DEPTH).set(self.task_queue.len() as f64);
    }

    fn update_worker_gauge(&self) {
        #[allow(clippy::cast_precision_loss)]
        gauge!(POOL_WORKERS_ALIVE).set(self.units.len() as f64);
    }
}

fn dispatch(unit: &mut UnitHandle, dump: CompletedDump) {
    if unit.req_tx.send(WorkerRequest::Process(dump)).is_ok() {
        unit.status = WorkerStatus::Running;
    } else {
        // The thread is already gone; its exit notification will follow and
        // trigger regeneration. The task is lost only if the unit never
        // registered it, which cannot happen before dispatch.
        unit.status = WorkerStatus::Stopped;
        warn!(worker_id = %unit.worker_id, "dispatch to dead unit");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use callsight_core::{CallsightError, SessionReport};
    use callsight_events::SessionMeta;

    use crate::worker::DumpProcessor;

    fn dump(client_id: &str) -> CompletedDump {
        CompletedDump::new(
            client_id.into(),
            format!("/tmp/does-not-exist/{client_id}"),
            SessionMeta::default(),
        )
    }

    /// Processor that succeeds after an optional delay, panics on clients
    /// named `crash*`, and errors on clients named `fail*`.
    struct ScriptedProcessor {
        delay: Duration,
        processed: Arc<AtomicUsize>,
    }

    impl DumpProcessor for ScriptedProcessor {
        fn process(
            &mut self,
            dump: &CompletedDump,
        ) -> Result<Option<SessionReport>, CallsightError> {
            std::thread::sleep(self.delay);
            let _ = self.processed.fetch_add(1, Ordering::SeqCst);
            if dump.client_id.starts_with("crash") {
                panic!("scripted crash");
            }
            if dump.client_id.starts_with("fail") {
                return Err(CallsightError::internal("SCRIPTED", "scripted failure"));
            }
            Ok(Some(SessionReport::default()))
        }
    }

    fn scripted_pool(
        size: usize,
        delay: Duration,
        regen_delay: Duration,
    ) -> (PoolHandle, Arc<AtomicUsize>) {
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&processed);
        let factory: ProcessorFactory = Arc::new(move || {
            Box::new(ScriptedProcessor {
                delay,
                processed: Arc::clone(&counter),
            }) as Box<dyn DumpProcessor>
        });
        (ExecutionPool::spawn(factory, size, regen_delay), processed)
    }

    async fn next_terminal(rx: &mut mpsc::UnboundedReceiver<PoolEvent>) -> PoolEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("pool event expected")
                .expect("pool channel open");
            match event {
                PoolEvent::Processing { .. } | PoolEvent::Metrics { .. } => {}
                terminal => return terminal,
            }
        }
    }

    #[test]
    fn ideal_worker_count_is_at_least_one() {
        assert!(ideal_worker_count() >= 1);
    }

    #[tokio::test]
    async fn done_flows_to_subscriber() {
        let (pool, _) = scripted_pool(2, Duration::ZERO, Duration::from_millis(50));
        let mut events = pool.subscribe().await.unwrap();
        pool.submit(dump("c1")).unwrap();

        match next_terminal(&mut events).await {
            PoolEvent::Done { dump, report } => {
                assert_eq!(dump.client_id.as_str(), "c1");
                assert!(report.is_some());
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_reported_exactly_once() {
        let (pool, _) = scripted_pool(1, Duration::ZERO, Duration::from_millis(50));
        let mut events = pool.subscribe().await.unwrap();
        pool.submit(dump("fail-1")).unwrap();
        pool.submit(dump("c2")).unwrap();

        match next_terminal(&mut events).await {
            PoolEvent::Error { dump, code, .. } => {
                assert_eq!(dump.client_id.as_str(), "fail-1");
                assert_eq!(code, "SCRIPTED");
            }
            other => panic!("expected Error, got {other:?}"),
        }
        // The unit was freed by the error and still serves the next task.
        match next_terminal(&mut events).await {
            PoolEvent::Done { dump, .. } => assert_eq!(dump.client_id.as_str(), "c2"),
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fifo_dispatch_order_under_saturation() {
        let (pool, _) = scripted_pool(1, Duration::from_millis(20), Duration::from_millis(50));
        let mut events = pool.subscribe().await.unwrap();
        for name in ["c1", "c2", "c3"] {
            pool.submit(dump(name)).unwrap();
        }

        let mut order = Vec::new();
        for _ in 0..3 {
            match next_terminal(&mut events).await {
                PoolEvent::Done { dump, .. } => order.push(dump.client_id.to_string()),
                other => panic!("expected Done, got {other:?}"),
            }
        }
        assert_eq!(order, ["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn crash_synthesizes_error_and_regenerates() {
        let (pool, _) = scripted_pool(1, Duration::ZERO, Duration::from_millis(20));
        let mut events = pool.subscribe().await.unwrap();
        pool.submit(dump("crash-1")).unwrap();

        // The unit never sent a terminal response; the pool synthesizes it
        // from the recorded STATE_UPDATE.
        match next_terminal(&mut events).await {
            PoolEvent::Error { dump, code, .. } => {
                assert_eq!(dump.client_id.as_str(), "crash-1");
                assert_eq!(code, "POOL_WORKER_EXITED");
            }
            other => panic!("expected Error, got {other:?}"),
        }

        // After the regeneration delay the pool is back to capacity and
        // keeps serving.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let states = pool.introspect().await.unwrap();
        assert_eq!(states.len(), 1);
        pool.submit(dump("c2")).unwrap();
        match next_terminal(&mut events).await {
            PoolEvent::Done { dump, .. } => assert_eq!(dump.client_id.as_str(), "c2"),
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pool_invariant_idle_plus_running_bounded() {
        let (pool, _) = scripted_pool(2, Duration::from_millis(10), Duration::from_millis(50));
        for i in 0..6 {
            pool.submit(dump(&format!("c{i}"))).unwrap();
        }
        for _ in 0..10 {
            let states = pool.introspect().await.unwrap();
            let live = states
                .iter()
                .filter(|(_, s)| matches!(*s, WorkerStatus::Idle | WorkerStatus::Running))
                .count();
            assert!(live <= 2, "pool exceeded its size: {states:?}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn queue_drains_in_order_after_crash() {
        let (pool, processed) = scripted_pool(1, Duration::ZERO, Duration::from_millis(10));
        let mut events = pool.subscribe().await.unwrap();
        pool.submit(dump("crash-1")).unwrap();
        pool.submit(dump("c2")).unwrap();
        pool.submit(dump("c3")).unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            match next_terminal(&mut events).await {
                PoolEvent::Done { dump, .. } => seen.push(dump.client_id.to_string()),
                PoolEvent::Error { dump, .. } => seen.push(dump.client_id.to_string()),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(seen, ["crash-1", "c2", "c3"]);
        assert!(processed.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn queue_depth_is_observable() {
        let (pool, _) = scripted_pool(1, Duration::from_millis(50), Duration::from_millis(50));
        pool.submit(dump("c1")).unwrap();
        pool.submit(dump("c2")).unwrap();
        pool.submit(dump("c3")).unwrap();
        // c1 dispatched, two waiting.
        let depth = pool.queue_depth().await.unwrap();
        assert!(depth >= 1, "expected queued tasks, got {depth}");
    }
}
