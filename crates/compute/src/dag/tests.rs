use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;

fn counting(id: u32, preds: Vec<u32>, runs: &Arc<AtomicUsize>) -> SubTask {
    let runs = Arc::clone(runs);
    SubTask::new(id, preds, move || {
        runs.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn diamond_runs_in_four_waves() {
    let runs = Arc::new(AtomicUsize::new(0));
    let tasks = vec![
        counting(1, vec![], &runs),
        counting(2, vec![1], &runs),
        counting(3, vec![1], &runs),
        counting(4, vec![2, 3], &runs),
        counting(5, vec![4], &runs),
    ];
    let report = DagExecutor::new().execute(tasks).unwrap();

    assert_eq!(report.waves, vec![vec![1], vec![2, 3], vec![4], vec![5]]);
    assert_eq!(report.completed(), 5);
    assert_eq!(runs.load(Ordering::SeqCst), 5);
}

#[test]
fn dependents_released_after_first_wave() {
    // A chain only finishes if later waves are re-seeded from completions.
    let order = Arc::new(Mutex::new(Vec::new()));
    let tasks: Vec<SubTask> = (1..=6)
        .map(|id| {
            let order = Arc::clone(&order);
            let preds = if id == 1 { vec![] } else { vec![id - 1] };
            SubTask::new(id, preds, move || order.lock().unwrap().push(id))
        })
        .collect();
    let report = DagExecutor::new().execute(tasks).unwrap();

    assert_eq!(report.waves.len(), 6);
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn start_never_precedes_predecessor_finish() {
    let tasks = vec![
        SubTask::timed(1, vec![], Duration::from_millis(15)),
        SubTask::timed(2, vec![1], Duration::from_millis(5)),
        SubTask::timed(3, vec![1], Duration::from_millis(25)),
        SubTask::timed(4, vec![2, 3], Duration::from_millis(5)),
    ];
    let preds: Vec<(u32, Vec<u32>)> = tasks.iter().map(|t| (t.id, t.predecessors.clone())).collect();
    let report = DagExecutor::new().execute(tasks).unwrap();

    for (id, ps) in preds {
        let start = report.timings[&id].start;
        for p in ps {
            assert!(start >= report.timings[&p].finish, "{id} started before {p} finished");
        }
    }
}

#[test]
fn wave_members_overlap() {
    let tasks = vec![
        SubTask::timed(1, vec![], Duration::from_millis(80)),
        SubTask::timed(2, vec![], Duration::from_millis(80)),
        SubTask::timed(3, vec![], Duration::from_millis(80)),
    ];
    let report = DagExecutor::new().execute(tasks).unwrap();
    assert_eq!(report.waves, vec![vec![1, 2, 3]]);
    assert!(report.elapsed < Duration::from_millis(200));
}

#[test]
fn cycle_is_a_deadlock() {
    let runs = Arc::new(AtomicUsize::new(0));
    let tasks = vec![
        counting(1, vec![], &runs),
        counting(2, vec![3], &runs),
        counting(3, vec![2], &runs),
    ];
    match DagExecutor::new().execute(tasks) {
        Err(DagError::Deadlock {
            completed,
            total,
            pending,
        }) => {
            assert_eq!(completed, 1);
            assert_eq!(total, 3);
            assert_eq!(pending, vec![2, 3]);
        }
        other => panic!("expected deadlock, got {other:?}"),
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn self_dependency_never_runs() {
    let err = DagExecutor::new()
        .execute(vec![SubTask::new(7, vec![7], || {})])
        .unwrap_err();
    assert!(matches!(err, DagError::Deadlock { completed: 0, total: 1, .. }));
}

#[test]
fn invalid_inputs_are_rejected_before_running() {
    let err = DagExecutor::new()
        .execute(vec![SubTask::new(1, vec![], || {}), SubTask::new(1, vec![], || {})])
        .unwrap_err();
    assert!(matches!(err, DagError::DuplicateSubTask(1)));

    let err = DagExecutor::new()
        .execute(vec![SubTask::new(1, vec![9], || {})])
        .unwrap_err();
    assert!(matches!(
        err,
        DagError::UnknownPredecessor {
            id: 1,
            predecessor: 9
        }
    ));
}

#[test]
fn panicking_subtask_is_reported() {
    let tasks = vec![
        SubTask::new(1, vec![], || {}),
        SubTask::new(2, vec![1], || panic!("boom")),
        SubTask::new(3, vec![2], || {}),
    ];
    let err = DagExecutor::new().execute(tasks).unwrap_err();
    assert!(matches!(err, DagError::SubTaskPanicked(2)));
}

#[test]
fn empty_dag_is_trivially_complete() {
    let report = DagExecutor::new().execute(Vec::new()).unwrap();
    assert!(report.waves.is_empty());
    assert_eq!(report.completed(), 0);
}

#[test]
fn executor_is_reusable() {
    let executor = DagExecutor::named("reuse");
    for _ in 0..3 {
        let runs = Arc::new(AtomicUsize::new(0));
        let tasks = vec![counting(1, vec![], &runs), counting(2, vec![1], &runs)];
        let report = executor.execute(tasks).unwrap();
        assert_eq!(report.waves, vec![vec![1], vec![2]]);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}

#[test]
fn pool_runs_every_job_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let jobs: Vec<DagJob> = (0..5)
        .map(|job| {
            DagJob::new(
                job,
                vec![
                    counting(1, vec![], &runs),
                    counting(2, vec![1], &runs),
                    counting(3, vec![1], &runs),
                ],
            )
        })
        .collect();

    let outcomes = ProcessorPool::new(2).run(jobs).unwrap();
    assert_eq!(outcomes.len(), 5);
    assert_eq!(
        outcomes.iter().map(|o| o.job_id).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
    assert!(outcomes.iter().all(|o| o.result.is_ok() && o.processor < 2));
    assert_eq!(runs.load(Ordering::SeqCst), 15);
}

#[test]
fn pool_keeps_going_after_a_failed_job() {
    let jobs = vec![
        DagJob::new(0, vec![SubTask::new(1, vec![1], || {})]),
        DagJob::new(1, vec![SubTask::new(1, vec![], || {})]),
    ];
    let outcomes = ProcessorPool::new(1).run(jobs).unwrap();
    assert!(matches!(outcomes[0].result, Err(DagError::Deadlock { .. })));
    assert!(outcomes[1].result.is_ok());
}

#[test]
fn pool_without_processors_is_rejected() {
    assert!(matches!(
        ProcessorPool::new(0).run(Vec::new()),
        Err(PoolError::NoProcessors)
    ));
}
