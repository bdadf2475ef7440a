use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

/// Error type for DAG execution.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("DAG deadlock: {completed}/{total} sub-tasks completed, still waiting on {pending:?}")]
    Deadlock {
        completed: usize,
        total: usize,
        pending: Vec<u32>,
    },
    #[error("Duplicate sub-task id {0}")]
    DuplicateSubTask(u32),
    #[error("Sub-task {id} depends on unknown sub-task {predecessor}")]
    UnknownPredecessor { id: u32, predecessor: u32 },
    #[error("Sub-task {0} panicked")]
    SubTaskPanicked(u32),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

type Work = Box<dyn FnOnce() + Send + 'static>;

/// One node of a DAG: a one-shot piece of work plus the ids it waits for.
pub struct SubTask {
    pub id: u32,
    pub predecessors: Vec<u32>,
    work: Work,
}

impl SubTask {
    pub fn new(id: u32, predecessors: Vec<u32>, work: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            predecessors,
            work: Box::new(work),
        }
    }

    /// A sub-task whose work is sleeping for `duration`.
    pub fn timed(id: u32, predecessors: Vec<u32>, duration: Duration) -> Self {
        Self::new(id, predecessors, move || thread::sleep(duration))
    }
}

impl fmt::Debug for SubTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubTask")
            .field("id", &self.id)
            .field("predecessors", &self.predecessors)
            .finish_non_exhaustive()
    }
}

/// The five-node diamond: `1:[] 2:[1] 3:[1] 4:[2,3] 5:[4]`, each sleeping
/// `100 + id * 50` ms.
pub fn diamond_subtasks() -> Vec<SubTask> {
    let shape: [(u32, &[u32]); 5] = [(1, &[]), (2, &[1]), (3, &[1]), (4, &[2, 3]), (5, &[4])];
    shape
        .into_iter()
        .map(|(id, preds)| {
            SubTask::timed(
                id,
                preds.to_vec(),
                Duration::from_millis(100 + u64::from(id) * 50),
            )
        })
        .collect()
}

/// Start and finish of one sub-task, as offsets from the start of `execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubTaskTiming {
    pub start: Duration,
    pub finish: Duration,
}

/// What one `execute` call did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DagReport {
    /// Ids run together, wave by wave; each wave in ascending id order.
    pub waves: Vec<Vec<u32>>,
    pub timings: BTreeMap<u32, SubTaskTiming>,
    pub elapsed: Duration,
}

impl DagReport {
    pub fn completed(&self) -> usize {
        self.timings.len()
    }
}

#[derive(Debug)]
struct DagState {
    in_degree: HashMap<u32, usize>,
    ready: VecDeque<u32>,
    completed: usize,
    timings: BTreeMap<u32, SubTaskTiming>,
}

/// Runs a DAG of sub-tasks wave by wave.
///
/// A wave is everything currently ready. Each member gets its own scoped
/// thread; finishing a member releases its dependents into the ready queue
/// for the next wave. The whole wave is joined before the next one starts.
#[derive(Debug, Default, Clone)]
pub struct DagExecutor {
    name: Option<String>,
}

impl DagExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor whose log lines carry `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("dag")
    }

    /// Run every sub-task exactly once, never before all its predecessors
    /// have finished.
    pub fn execute(&self, subtasks: Vec<SubTask>) -> Result<DagReport, DagError> {
        let total = subtasks.len();
        let known = validate(&subtasks)?;

        let mut in_degree: HashMap<u32, usize> = HashMap::with_capacity(total);
        let mut dependents: HashMap<u32, Vec<u32>> = HashMap::with_capacity(total);
        let mut work: HashMap<u32, Work> = HashMap::with_capacity(total);
        for task in subtasks {
            in_degree.insert(task.id, task.predecessors.len());
            for &pred in &task.predecessors {
                dependents.entry(pred).or_default().push(task.id);
            }
            work.insert(task.id, task.work);
        }

        let mut seeds: Vec<u32> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        seeds.sort_unstable();

        let state = Mutex::new(DagState {
            in_degree,
            ready: seeds.into(),
            completed: 0,
            timings: BTreeMap::new(),
        });

        info!(dag = self.label(), subtasks = total, "DAG execution starting");
        let start = Instant::now();
        let mut waves: Vec<Vec<u32>> = Vec::new();

        loop {
            let mut batch: Vec<u32> = {
                let mut s = lock_state(&state)?;
                if s.completed == total {
                    break;
                }
                s.ready.drain(..).collect()
            };

            if batch.is_empty() {
                let s = lock_state(&state)?;
                let mut pending: Vec<u32> = known
                    .iter()
                    .copied()
                    .filter(|id| !s.timings.contains_key(id))
                    .collect();
                pending.sort_unstable();
                return Err(DagError::Deadlock {
                    completed: s.completed,
                    total,
                    pending,
                });
            }

            batch.sort_unstable();
            debug!(dag = self.label(), wave = waves.len() + 1, members = ?batch, "Wave starting");

            let mut failure: Option<DagError> = None;
            thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .filter_map(|id| work.remove(id).map(|w| (*id, w)))
                    .map(|(id, w)| {
                        let state = &state;
                        let dependents = &dependents;
                        let handle = scope.spawn(move || {
                            let began = start.elapsed();
                            w();
                            let finished = start.elapsed();
                            release(state, dependents, id, began, finished)
                        });
                        (id, handle)
                    })
                    .collect();

                for (id, handle) in handles {
                    let outcome = match handle.join() {
                        Ok(result) => result,
                        Err(_) => Err(DagError::SubTaskPanicked(id)),
                    };
                    if let Err(e) = outcome {
                        failure.get_or_insert(e);
                    }
                }
            });

            if let Some(e) = failure {
                return Err(e);
            }
            waves.push(batch);
        }

        let elapsed = start.elapsed();
        let timings = state
            .into_inner()
            .map_err(|e| DagError::LockPoisoned(e.to_string()))?
            .timings;

        info!(
            dag = self.label(),
            subtasks = total,
            waves = waves.len(),
            "DAG execution complete in {:.3}s",
            elapsed.as_secs_f64()
        );

        Ok(DagReport {
            waves,
            timings,
            elapsed,
        })
    }
}

fn lock_state(state: &Mutex<DagState>) -> Result<MutexGuard<'_, DagState>, DagError> {
    state
        .lock()
        .map_err(|e| DagError::LockPoisoned(format!("DAG state: {}", e)))
}

/// Record a finished sub-task and queue every dependent it unblocks.
fn release(
    state: &Mutex<DagState>,
    dependents: &HashMap<u32, Vec<u32>>,
    id: u32,
    start: Duration,
    finish: Duration,
) -> Result<(), DagError> {
    let mut s = lock_state(state)?;
    s.completed += 1;
    s.timings.insert(id, SubTaskTiming { start, finish });
    for &next in dependents.get(&id).map(Vec::as_slice).unwrap_or_default() {
        if let Some(deg) = s.in_degree.get_mut(&next) {
            *deg = deg.saturating_sub(1);
            if *deg == 0 {
                s.ready.push_back(next);
            }
        }
    }
    Ok(())
}

/// Reject duplicate ids and dangling predecessors. Returns the id set.
fn validate(subtasks: &[SubTask]) -> Result<HashSet<u32>, DagError> {
    let mut ids = HashSet::with_capacity(subtasks.len());
    for task in subtasks {
        if !ids.insert(task.id) {
            return Err(DagError::DuplicateSubTask(task.id));
        }
    }
    for task in subtasks {
        if let Some(&missing) = task.predecessors.iter().find(|p| !ids.contains(p)) {
            return Err(DagError::UnknownPredecessor {
                id: task.id,
                predecessor: missing,
            });
        }
    }
    Ok(ids)
}
