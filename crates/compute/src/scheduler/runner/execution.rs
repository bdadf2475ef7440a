use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use threadsim_core::SchedulingPolicy;
use threadsim_graph::ScheduleUnit;
use tracing::{debug, error, info, warn};

use crate::scheduler::clock::{clock_for, Clock, Turn};
use crate::scheduler::error::SchedulerError;
use crate::scheduler::metrics::SchedulerMetrics;
use crate::scheduler::queue::WorkQueue;
use crate::scheduler::types::{as_millis, SchedulerReport, SimThread, SliceRecord, UnitCompletion};

use super::Scheduler;

/// Per-run bookkeeping, kept apart from the queue lock.
#[derive(Debug, Default)]
struct Ledger {
    busy_ms: Vec<u64>,
    slices: Vec<SliceRecord>,
    completions: Vec<UnitCompletion>,
    unfinished: Vec<SimThread>,
}

/// Fixed parameters shared by every processor of one run.
struct RunContext<'a> {
    queue: &'a WorkQueue<SimThread>,
    ledger: &'a Mutex<Ledger>,
    clock: &'a dyn Clock,
    quantum_ms: u64,
    policy: SchedulingPolicy,
}

fn lock_ledger(ledger: &Mutex<Ledger>) -> Result<MutexGuard<'_, Ledger>, SchedulerError> {
    ledger
        .lock()
        .map_err(|e| SchedulerError::LockPoisoned(format!("scheduler ledger: {}", e)))
}

impl Scheduler {
    /// Run schedule units produced by the analysis stage.
    pub fn run_units(&self, units: &[ScheduleUnit]) -> Result<SchedulerReport, SchedulerError> {
        self.run(units.iter().map(SimThread::from_unit).collect())
    }

    /// Run every thread to completion (or until shutdown) and report.
    ///
    /// Blocks the caller. Processors run on a dedicated `rayon` pool sized to
    /// the processor count.
    pub fn run(&self, threads: Vec<SimThread>) -> Result<SchedulerReport, SchedulerError> {
        let processors = self.config.resolved_processors();
        if processors == 0 {
            return Err(SchedulerError::InvalidConfig("processors must be at least 1".into()));
        }
        if self.config.quantum_ms == 0 {
            return Err(SchedulerError::InvalidConfig("quantum_ms must be at least 1".into()));
        }

        info!(
            processors,
            quantum_ms = self.config.quantum_ms,
            policy = %self.config.policy,
            clock = %self.config.clock,
            units = threads.len(),
            "Scheduler starting"
        );
        // Wall time and turnarounds share this origin.
        let clock = clock_for(self.config.clock, processors);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(processors)
            .thread_name(|i| format!("processor-{}", i))
            .build()
            .map_err(|e| SchedulerError::ThreadPool(e.to_string()))?;

        let queue = Arc::new(WorkQueue::with_items(threads));
        self.set_active_queue(Some(Arc::clone(&queue)))?;
        if self.is_shutdown() {
            queue.close()?;
        }

        let ledger = Mutex::new(Ledger {
            busy_ms: vec![0; processors],
            ..Ledger::default()
        });
        let failures: Mutex<Vec<SchedulerError>> = Mutex::new(Vec::new());

        let ctx = RunContext {
            queue: &queue,
            ledger: &ledger,
            clock: clock.as_ref(),
            quantum_ms: self.config.quantum_ms,
            policy: self.config.policy,
        };

        pool.scope(|s| {
            for processor in 0..processors {
                let ctx = &ctx;
                let failures = &failures;
                s.spawn(move |_| {
                    let result = self.processor_loop(processor, ctx);
                    ctx.clock.retire(processor);
                    if let Err(e) = result {
                        error!(processor, "Processor failed: {}", e);
                        // Unblock the others; the run is over.
                        if let Err(close_err) = ctx.queue.close() {
                            warn!(processor, "Failed to close work queue: {}", close_err);
                        }
                        match failures.lock() {
                            Ok(mut f) => f.push(e),
                            Err(poisoned) => {
                                warn!(processor, "Failure list lock poisoned: {}", poisoned);
                                poisoned.into_inner().push(e);
                            }
                        }
                    }
                });
            }
        });

        self.set_active_queue(None)?;

        let first_failure = failures
            .into_inner()
            .map_err(|e| SchedulerError::LockPoisoned(format!("failure list: {}", e)))?
            .into_iter()
            .next();
        if let Some(e) = first_failure {
            return Err(e);
        }

        let mut ledger = ledger
            .into_inner()
            .map_err(|e| SchedulerError::LockPoisoned(format!("scheduler ledger: {}", e)))?;
        ledger.unfinished.extend(queue.drain()?);
        ledger.unfinished.sort_by_key(|t| t.id);

        let metrics =
            SchedulerMetrics::compute(&ledger.completions, &ledger.busy_ms, processors, clock.elapsed());

        info!(
            completed = metrics.units_completed,
            unfinished = ledger.unfinished.len(),
            "Scheduler finished in {:.3}s: avg turnaround {:.1}ms, throughput {:.2}/s, utilization {:.1}%",
            metrics.execution_time_s,
            metrics.avg_turnaround_ms,
            metrics.throughput,
            metrics.cpu_utilization
        );

        Ok(SchedulerReport {
            metrics,
            slices: ledger.slices,
            completions: ledger.completions,
            busy_ms: ledger.busy_ms,
            unfinished: ledger.unfinished,
        })
    }

    fn set_active_queue(&self, queue: Option<Arc<WorkQueue<SimThread>>>) -> Result<(), SchedulerError> {
        let mut slot = self
            .active_queue
            .lock()
            .map_err(|e| SchedulerError::LockPoisoned(format!("active queue: {}", e)))?;
        *slot = queue;
        Ok(())
    }

    /// One processor: pop, slice, repeat until the queue runs dry.
    ///
    /// Each pass through the loop is one turn: take a unit (or keep the one
    /// held under run-to-completion), run at most one slice, then settle it.
    /// On a clock that takes turns, units are never held across a pop, so an
    /// empty queue means this processor has nothing left to do.
    fn processor_loop(&self, processor: usize, ctx: &RunContext<'_>) -> Result<(), SchedulerError> {
        debug!(processor, "Processor started");
        let mut held: Option<SimThread> = None;

        loop {
            let _turn = Turn::begin(ctx.clock, processor);

            let mut thread = match held.take() {
                Some(t) => t,
                None => {
                    let next = if ctx.clock.takes_turns() {
                        ctx.queue.try_pop()?
                    } else {
                        ctx.queue.pop()?
                    };
                    match next {
                        Some(t) => t,
                        None => break,
                    }
                }
            };

            if thread.is_finished() {
                // Never ran a slice, so it finishes whenever it was picked up.
                let finished_at = ctx.clock.now(processor);
                complete(processor, ctx, &thread, finished_at)?;
                continue;
            }

            if self.shutdown.load(Ordering::SeqCst) {
                lock_ledger(ctx.ledger)?.unfinished.push(thread);
                ctx.queue.close()?;
                break;
            }

            let slice_ms = thread.next_slice_ms(ctx.quantum_ms);
            let ended = ctx
                .clock
                .run_slice(processor, thread.ready_at, Duration::from_millis(slice_ms));
            thread.consume(slice_ms);
            thread.ready_at = ended;

            {
                let mut ledger = lock_ledger(ctx.ledger)?;
                ledger.busy_ms[processor] += slice_ms;
                ledger.slices.push(SliceRecord {
                    timestamp_ms: as_millis(ended),
                    processor,
                    unit: thread.name.clone(),
                    slice_ms,
                    remaining_ms: thread.remaining_ms,
                });
            }
            debug!(
                processor,
                unit = %thread.name,
                slice_ms,
                remaining_ms = thread.remaining_ms,
                "Slice executed"
            );

            if thread.is_finished() {
                complete(processor, ctx, &thread, ended)?;
            } else if ctx.policy == SchedulingPolicy::RoundRobin {
                ctx.queue.requeue(thread)?;
            } else {
                held = Some(thread);
            }
        }

        debug!(processor, "Processor exiting");
        Ok(())
    }
}

fn complete(
    processor: usize,
    ctx: &RunContext<'_>,
    thread: &SimThread,
    finished_at: Duration,
) -> Result<(), SchedulerError> {
    let turnaround_ms = as_millis(finished_at);
    lock_ledger(ctx.ledger)?.completions.push(UnitCompletion {
        id: thread.id,
        name: thread.name.clone(),
        burst_time_ms: thread.burst_time_ms,
        processor,
        turnaround_ms,
    });
    let left = ctx.queue.complete_one()?;
    debug!(processor, unit = %thread.name, turnaround_ms, left, "Unit completed");
    Ok(())
}
