//! Debounced batch persistence for the entity store.
//!
//! Edits are frequent and the entity document is rewritten wholesale, so
//! flushes are debounced: the first [`PersistenceHandle::schedule`] arms a
//! one-shot timer and further calls inside the window coalesce into the
//! same flush. `flush_now` bypasses the window for explicit saves and
//! shutdown.
//!
//! Failure policy: a failed write is logged and the pending flag is
//! cleared anyway — the next edit reschedules a flush, so a persistent
//! failure degrades to one error log per edit burst instead of a retry
//! storm.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, StoreError};

/// The flush callback: serialize current state to durable storage.
pub type FlushFn = Arc<dyn Fn() -> Result<()> + Send + Sync>;

struct Shared {
    pending: AtomicBool,
    shutting_down: AtomicBool,
    notify: Notify,
    flush: FlushFn,
}

impl Shared {
    /// Clear the pending flag and run one flush, regardless of outcome.
    fn run_flush(&self) {
        self.pending.store(false, Ordering::SeqCst);
        match (self.flush)() {
            Ok(()) => {
                counter!("skiff_store_flushes_total").increment(1);
                debug!("entity store flushed");
            }
            Err(error) => {
                // Pending flag stays cleared: the next edit reschedules.
                counter!("skiff_store_flush_failures_total").increment(1);
                error!(%error, "entity store flush failed");
            }
        }
    }
}

/// Owner of the background debounce worker.
pub struct BatchPersistence {
    shared: Arc<Shared>,
    debounce: Duration,
    shutdown_grace: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap clonable handle for scheduling flushes from the store.
#[derive(Clone)]
pub struct PersistenceHandle {
    shared: Arc<Shared>,
}

impl PersistenceHandle {
    /// Request a flush; calls within the debounce window coalesce.
    pub fn schedule(&self) {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            warn!("persistence scheduled after shutdown, ignoring");
            return;
        }
        self.shared.pending.store(true, Ordering::SeqCst);
        self.shared.notify.notify_one();
    }
}

impl BatchPersistence {
    /// Spawn the debounce worker. Must be called inside a tokio runtime.
    pub fn spawn(debounce: Duration, shutdown_grace: Duration, flush: FlushFn) -> Self {
        let shared = Arc::new(Shared {
            pending: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            notify: Notify::new(),
            flush,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = tokio::spawn(async move {
            loop {
                worker_shared.notify.notified().await;
                if worker_shared.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                if !worker_shared.pending.load(Ordering::SeqCst) {
                    continue;
                }
                tokio::time::sleep(debounce).await;
                if worker_shared.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                if worker_shared.pending.load(Ordering::SeqCst) {
                    worker_shared.run_flush();
                }
            }
            debug!("persistence worker stopped");
        });

        Self {
            shared,
            debounce,
            shutdown_grace,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// The scheduling handle given to the record store.
    pub fn handle(&self) -> PersistenceHandle {
        PersistenceHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Debounce window this service was spawned with.
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Flush synchronously, clearing any pending scheduled write.
    pub fn flush_now(&self) -> Result<()> {
        self.shared.pending.store(false, Ordering::SeqCst);
        (self.shared.flush)().inspect(|()| {
            counter!("skiff_store_flushes_total").increment(1);
        })
    }

    /// Flush, stop the worker, and wait a bounded interval for it to exit.
    ///
    /// The worker is force-aborted if it does not stop within the grace
    /// period. Idempotent; the second call is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return Err(StoreError::ShutDown);
        }
        let flushed = self.flush_now();
        self.shared.notify.notify_one();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            match tokio::time::timeout(self.shutdown_grace, worker).await {
                Ok(_) => info!("persistence worker shut down"),
                Err(_) => {
                    warn!("persistence worker missed shutdown deadline, aborting");
                }
            }
        }
        flushed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
