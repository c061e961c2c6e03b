//! Daemon supervisor.
//!
//! Enumerates the enabled pairs, starts a worker for each, and exposes the
//! programmatic control facade (`start_all` / `stop_all` / `status`). A pair
//! that fails to start is logged and skipped; the others still run. Workers
//! are never restarted within a process lifetime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::ConfigStore;
use crate::worker::PairWorker;

#[derive(Debug, Clone, Serialize)]
pub struct PairStatus {
    pub name: String,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub is_running: bool,
    pub active_workers: usize,
    pub pairs: Vec<PairStatus>,
}

pub struct SyncService {
    store: Arc<ConfigStore>,
    workers: Mutex<Vec<PairWorker>>,
    running: AtomicBool,
}

impl SyncService {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        SyncService {
            store,
            workers: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Start a worker for every enabled pair. Individual start failures are
    /// logged; the remaining pairs still come up.
    pub async fn start_all(&self) -> anyhow::Result<()> {
        let pairs = self.store.enabled_pairs();
        let settings = self.store.settings();
        settings.validate()?;

        let mut workers = self.workers.lock().await;
        let total = pairs.len();
        for pair in pairs {
            let mut worker =
                PairWorker::new(pair, settings.clone(), Arc::clone(&self.store));
            match worker.start().await {
                Ok(()) => workers.push(worker),
                Err(e) => error!("Failed to start pair {}: {e:#}", worker.name()),
            }
        }

        self.running.store(true, Ordering::SeqCst);
        info!("Sync service started {} of {total} enabled pairs", workers.len());
        Ok(())
    }

    /// Stop every worker in parallel, then mark the service stopped.
    pub async fn stop_all(&self) {
        self.running.store(false, Ordering::SeqCst);
        let workers = std::mem::take(&mut *self.workers.lock().await);

        let handles: Vec<_> = workers
            .into_iter()
            .map(|mut worker| {
                tokio::spawn(async move {
                    let name = worker.name().to_string();
                    worker.stop().await;
                    name
                })
            })
            .collect();
        for handle in handles {
            if let Ok(name) = handle.await {
                info!("Stopped pair worker: {name}");
            }
        }
        info!("Sync service stopped");
    }

    pub async fn status(&self) -> ServiceStatus {
        let workers = self.workers.lock().await;
        let pairs: Vec<PairStatus> = workers
            .iter()
            .map(|w| PairStatus {
                name: w.name().to_string(),
                running: w.is_running(),
            })
            .collect();
        ServiceStatus {
            is_running: self.running.load(Ordering::SeqCst),
            active_workers: pairs.iter().filter(|p| p.running).count(),
            pairs,
        }
    }
}
