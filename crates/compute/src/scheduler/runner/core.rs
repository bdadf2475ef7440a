use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use threadsim_core::SchedulerConfig;
use tracing::{info, warn};

use crate::scheduler::queue::WorkQueue;
use crate::scheduler::types::SimThread;

/// Multiprocessor time-sliced scheduler.
///
/// Each [`run`](Scheduler::run) starts `processors` workers that pull
/// [`SimThread`]s from one shared FIFO and charge them slices of at most
/// `quantum_ms` until nothing is left.
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    /// Shutdown signal, checked by every processor between slices.
    pub(super) shutdown: Arc<AtomicBool>,
    /// Queue of the run in progress, so `shutdown` can wake blocked pops.
    pub(super) active_queue: Mutex<Option<Arc<WorkQueue<SimThread>>>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_queue: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Ask every processor to stop after its current slice.
    ///
    /// Units that still have work are returned in
    /// [`SchedulerReport::unfinished`](crate::scheduler::SchedulerReport).
    pub fn shutdown(&self) {
        info!("Scheduler shutdown requested");
        self.shutdown.store(true, Ordering::SeqCst);
        match self.active_queue.lock() {
            Ok(guard) => {
                if let Some(queue) = guard.as_ref() {
                    if let Err(e) = queue.close() {
                        warn!("Failed to close work queue: {}", e);
                    }
                }
            }
            Err(e) => warn!("Active queue lock poisoned: {}", e),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Clone of the shutdown flag, for signal handlers.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }
}
