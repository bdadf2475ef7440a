use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use threadsim_core::ClockKind;

/// Time source for a scheduler run.
///
/// Offsets are measured from the start of the run. A clock may also
/// serialize processors into turns; the wall clock lets them all run freely.
pub trait Clock: Send + Sync {
    /// Spend `slice` on `processor` for a unit that became ready at
    /// `ready_at`. Returns the offset at which the slice ended.
    fn run_slice(&self, processor: usize, ready_at: Duration, slice: Duration) -> Duration;

    /// Current offset as seen by `processor`.
    fn now(&self, processor: usize) -> Duration;

    /// Offset of the latest instant observed so far.
    fn elapsed(&self) -> Duration;

    /// True when processors take turns and a pop must never block.
    fn takes_turns(&self) -> bool {
        false
    }

    /// Block until `processor` may act.
    fn begin_turn(&self, _processor: usize) {}

    fn end_turn(&self, _processor: usize) {}

    /// `processor` will not act again in this run.
    fn retire(&self, _processor: usize) {}
}

/// Ends a turn when dropped, including on early returns.
pub struct Turn<'a> {
    clock: &'a dyn Clock,
    processor: usize,
}

impl<'a> Turn<'a> {
    pub fn begin(clock: &'a dyn Clock, processor: usize) -> Self {
        clock.begin_turn(processor);
        Self { clock, processor }
    }
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        self.clock.end_turn(self.processor);
    }
}

/// Real time. Each slice sleeps the calling thread.
#[derive(Debug)]
pub struct WallClock {
    start: Instant,
}

impl WallClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for WallClock {
    fn run_slice(&self, _processor: usize, _ready_at: Duration, slice: Duration) -> Duration {
        if !slice.is_zero() {
            std::thread::sleep(slice);
        }
        self.start.elapsed()
    }

    fn now(&self, _processor: usize) -> Duration {
        self.start.elapsed()
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[derive(Debug)]
struct Lanes {
    at: Vec<Duration>,
    retired: Vec<bool>,
    /// Processor currently acting, if any.
    turn: Option<usize>,
}

impl Lanes {
    fn ensure(&mut self, processor: usize) {
        if processor >= self.at.len() {
            self.at.resize(processor + 1, Duration::ZERO);
            self.retired.resize(processor + 1, false);
        }
    }

    /// Live processor with the smallest lane; ties go to the lower index.
    fn next_up(&self) -> Option<usize> {
        self.at
            .iter()
            .enumerate()
            .filter(|&(i, _)| !self.retired[i])
            .min_by_key(|&(i, at)| (*at, i))
            .map(|(i, _)| i)
    }
}

/// Simulated time. Every processor owns a lane that only moves when it runs
/// a slice, so results do not depend on OS scheduling.
///
/// Processors act one at a time, always the live one furthest behind in
/// virtual time. That is the order a real multiprocessor would see events
/// in, so work spreads across lanes the way sleeping slices would spread it.
#[derive(Debug)]
pub struct VirtualClock {
    lanes: Mutex<Lanes>,
    turns: Condvar,
}

impl VirtualClock {
    pub fn new(processors: usize) -> Self {
        let processors = processors.max(1);
        Self {
            lanes: Mutex::new(Lanes {
                at: vec![Duration::ZERO; processors],
                retired: vec![false; processors],
                turn: None,
            }),
            turns: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lanes> {
        match self.lanes.lock() {
            Ok(l) => l,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current position of `processor`'s lane.
    pub fn lane(&self, processor: usize) -> Duration {
        self.lock().at.get(processor).copied().unwrap_or_default()
    }
}

impl Clock for VirtualClock {
    fn run_slice(&self, processor: usize, ready_at: Duration, slice: Duration) -> Duration {
        let mut lanes = self.lock();
        lanes.ensure(processor);
        // A unit cannot start before its previous slice ended elsewhere.
        let start = lanes.at[processor].max(ready_at);
        lanes.at[processor] = start + slice;
        lanes.at[processor]
    }

    fn now(&self, processor: usize) -> Duration {
        self.lane(processor)
    }

    fn elapsed(&self) -> Duration {
        self.lock().at.iter().copied().max().unwrap_or_default()
    }

    fn takes_turns(&self) -> bool {
        true
    }

    fn begin_turn(&self, processor: usize) {
        let mut lanes = self.lock();
        lanes.ensure(processor);
        loop {
            if lanes.turn.is_none() && lanes.next_up() == Some(processor) {
                lanes.turn = Some(processor);
                return;
            }
            lanes = match self.turns.wait(lanes) {
                Ok(l) => l,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    fn end_turn(&self, processor: usize) {
        let mut lanes = self.lock();
        if lanes.turn == Some(processor) {
            lanes.turn = None;
        }
        self.turns.notify_all();
    }

    fn retire(&self, processor: usize) {
        let mut lanes = self.lock();
        lanes.ensure(processor);
        lanes.retired[processor] = true;
        if lanes.turn == Some(processor) {
            lanes.turn = None;
        }
        self.turns.notify_all();
    }
}

/// Build the clock selected in config. A wall clock starts counting here.
pub fn clock_for(kind: ClockKind, processors: usize) -> Box<dyn Clock> {
    match kind {
        ClockKind::Wall => Box::new(WallClock::start()),
        ClockKind::Virtual => Box::new(VirtualClock::new(processors)),
    }
}
