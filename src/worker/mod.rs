//! Pair worker: one replication stream's lifecycle and timers.
//!
//! State machine: Idle → Connecting → InitialSync → Running → Stopping →
//! Stopped. After initial sync, one spawned task owns both poll timers in a
//! single select loop, so a data tick and a schema tick can never overlap on
//! the same pair and a tick that overruns its period delays the next fire
//! instead of stacking a backlog.

use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::adapter::{adapter_for, DatabaseAdapter, RetryPolicy};
use crate::config::{ConfigStore, PairSpec, Settings};
use crate::data::DataDiffer;
use crate::routine::RoutineSyncer;
use crate::schema::SchemaDiffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Connecting,
    InitialSync,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Idle => "idle",
            WorkerState::Connecting => "connecting",
            WorkerState::InitialSync => "initial-sync",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

pub struct PairWorker {
    pair: PairSpec,
    settings: Settings,
    store: Arc<ConfigStore>,
    /// Injected adapters (tests); resolved from the config store otherwise.
    adapters: Option<(Arc<dyn DatabaseAdapter>, Arc<dyn DatabaseAdapter>)>,
    state: Arc<Mutex<WorkerState>>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl PairWorker {
    pub fn new(pair: PairSpec, settings: Settings, store: Arc<ConfigStore>) -> Self {
        PairWorker {
            pair,
            settings,
            store,
            adapters: None,
            state: Arc::new(Mutex::new(WorkerState::Idle)),
            shutdown: None,
            handle: None,
        }
    }

    /// Construct with explicit adapters instead of resolving the pair's
    /// connection specs.
    pub fn with_adapters(
        pair: PairSpec,
        settings: Settings,
        store: Arc<ConfigStore>,
        source: Arc<dyn DatabaseAdapter>,
        target: Arc<dyn DatabaseAdapter>,
    ) -> Self {
        let mut worker = Self::new(pair, settings, store);
        worker.adapters = Some((source, target));
        worker
    }

    pub fn name(&self) -> &str {
        &self.pair.name
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().expect("state lock poisoned")
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.state(),
            WorkerState::Connecting | WorkerState::InitialSync | WorkerState::Running
        )
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().expect("state lock poisoned") = state;
    }

    /// Connect both sides, run the initial sync, then arm the poll timers.
    /// Any failure on the way up closes the adapters and propagates.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        info!("Starting pair worker: {}", self.pair.name);
        self.set_state(WorkerState::Connecting);

        let (source, target) = match &self.adapters {
            Some((source, target)) => (Arc::clone(source), Arc::clone(target)),
            None => {
                let retry = RetryPolicy::from(&self.settings);
                let source_spec = self.store.get_connection(&self.pair.source)?;
                let target_spec = self.store.get_connection(&self.pair.target)?;
                (
                    adapter_for(&source_spec, retry),
                    adapter_for(&target_spec, retry),
                )
            }
        };

        let differ = match self.bring_up(&source, &target).await {
            Ok(differ) => differ,
            Err(e) => {
                self.set_state(WorkerState::Stopping);
                let _ = source.close().await;
                let _ = target.close().await;
                self.set_state(WorkerState::Stopped);
                return Err(e);
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let context = RunContext {
            pair: self.pair.clone(),
            settings: self.settings.clone(),
            store: Arc::clone(&self.store),
            source,
            target,
            state: Arc::clone(&self.state),
        };
        self.handle = Some(tokio::spawn(run_loop(context, differ, shutdown_rx)));
        self.shutdown = Some(shutdown_tx);
        self.set_state(WorkerState::Running);
        info!("Pair worker running: {}", self.pair.name);
        Ok(())
    }

    async fn bring_up(
        &self,
        source: &Arc<dyn DatabaseAdapter>,
        target: &Arc<dyn DatabaseAdapter>,
    ) -> anyhow::Result<DataDiffer> {
        source
            .connect()
            .await
            .with_context(|| format!("pair {}: connecting source", self.pair.name))?;
        target
            .connect()
            .await
            .with_context(|| format!("pair {}: connecting target", self.pair.name))?;

        self.set_state(WorkerState::InitialSync);

        if self.pair.sync_schema {
            let report = SchemaDiffer::new(Arc::clone(source), Arc::clone(target))
                .sync(&self.pair)
                .await;
            if !report.success() {
                anyhow::bail!(
                    "pair {}: initial schema sync failed: {}",
                    self.pair.name,
                    report.errors.join("; ")
                );
            }
        }

        let routines = RoutineSyncer::new(Arc::clone(source), Arc::clone(target));
        if self.pair.sync_procedures {
            let report = routines.sync_routines().await;
            if !report.success() {
                anyhow::bail!(
                    "pair {}: initial routine sync failed: {}",
                    self.pair.name,
                    report.errors.join("; ")
                );
            }
        }
        if self.pair.sync_triggers {
            let report = routines.sync_triggers().await;
            if !report.success() {
                anyhow::bail!(
                    "pair {}: initial trigger sync failed: {}",
                    self.pair.name,
                    report.errors.join("; ")
                );
            }
        }

        let mut differ = DataDiffer::new(Arc::clone(source), Arc::clone(target));
        if self.pair.sync_data {
            let report = differ.initial_sync(&self.pair).await;
            if !report.success() {
                anyhow::bail!(
                    "pair {}: initial data sync failed: {}",
                    self.pair.name,
                    report.errors.join("; ")
                );
            }
            if report.mutated() {
                self.record_last_sync();
            }
        }
        Ok(differ)
    }

    /// Disarm the timers and close the adapters. Safe to call in any state;
    /// idempotent.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        self.set_state(WorkerState::Stopped);
    }

    fn record_last_sync(&self) {
        if let Err(e) = self.store.update_last_sync(&self.pair.name) {
            warn!("Could not record last sync for pair {}: {e}", self.pair.name);
        }
    }
}

struct RunContext {
    pair: PairSpec,
    settings: Settings,
    store: Arc<ConfigStore>,
    source: Arc<dyn DatabaseAdapter>,
    target: Arc<dyn DatabaseAdapter>,
    state: Arc<Mutex<WorkerState>>,
}

/// The worker's single task: both timers in one select loop. A tick in
/// flight blocks the other timer, and a fire landing during a tick is
/// coalesced into a delayed next deadline.
async fn run_loop(context: RunContext, mut differ: DataDiffer, mut shutdown: watch::Receiver<bool>) {
    let poll = context.settings.poll_interval();
    let schema_poll = context.settings.schema_check_interval();

    let mut data_timer = interval_at(Instant::now() + poll, poll);
    data_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut schema_timer = interval_at(Instant::now() + schema_poll, schema_poll);
    schema_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let schema_differ = SchemaDiffer::new(Arc::clone(&context.source), Arc::clone(&context.target));
    let routine_syncer = RoutineSyncer::new(Arc::clone(&context.source), Arc::clone(&context.target));

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = data_timer.tick() => {
                if context.pair.sync_data {
                    let report = differ.tick(&context.pair).await;
                    if !report.success() {
                        warn!(
                            "Data tick for pair {} finished with {} errors",
                            context.pair.name,
                            report.errors.len()
                        );
                    }
                    if report.mutated() {
                        record_last_sync(&context);
                    }
                }
            }
            _ = schema_timer.tick() => {
                let mut mutated = false;
                if context.pair.sync_schema {
                    let report = schema_differ.sync(&context.pair).await;
                    if !report.success() {
                        warn!(
                            "Schema tick for pair {} finished with {} errors",
                            context.pair.name,
                            report.errors.len()
                        );
                    }
                    mutated |= report.mutated();
                }
                if context.pair.sync_procedures {
                    let report = routine_syncer.sync_routines().await;
                    if !report.success() {
                        warn!(
                            "Routine tick for pair {} finished with {} errors",
                            context.pair.name,
                            report.errors.len()
                        );
                    }
                    mutated |= report.mutated();
                }
                if context.pair.sync_triggers {
                    let report = routine_syncer.sync_triggers().await;
                    if !report.success() {
                        warn!(
                            "Trigger tick for pair {} finished with {} errors",
                            context.pair.name,
                            report.errors.len()
                        );
                    }
                    mutated |= report.mutated();
                }
                if mutated {
                    record_last_sync(&context);
                }
            }
        }
    }

    *context.state.lock().expect("state lock poisoned") = WorkerState::Stopping;
    debug!("Closing adapters for pair {}", context.pair.name);
    if let Err(e) = context.source.close().await {
        warn!("Closing source for pair {}: {e}", context.pair.name);
    }
    if let Err(e) = context.target.close().await {
        warn!("Closing target for pair {}: {e}", context.pair.name);
    }
    *context.state.lock().expect("state lock poisoned") = WorkerState::Stopped;
    info!("Pair worker stopped: {}", context.pair.name);
}

fn record_last_sync(context: &RunContext) {
    if let Err(e) = context.store.update_last_sync(&context.pair.name) {
        warn!("Could not record last sync for pair {}: {e}", context.pair.name);
    }
}
