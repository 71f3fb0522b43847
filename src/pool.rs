//! Bounded-concurrency task pool with pacing and per-task failure isolation
//!
//! `K` workers share an atomic claim counter. Each worker claims the next
//! index, runs that task, sleeps for the inter-task delay, and claims again
//! until every index is taken. A failing task yields an empty (default)
//! result in its slot; the pool itself never aborts.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;

/// A task that failed, reported alongside the pool results
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskFailure {
    /// Index of the failed task
    pub index: usize,
    /// Rendered error
    pub error: String,
}

/// Outcome of a pool run
#[derive(Debug)]
pub struct PoolOutput<T> {
    /// One result per task, aligned with the task index; failed tasks hold `T::default()`
    pub results: Vec<T>,
    /// Failed tasks in index order
    pub failures: Vec<TaskFailure>,
}

impl<T> PoolOutput<T> {
    /// Whether the task at `index` completed successfully
    pub fn succeeded(&self, index: usize) -> bool {
        index < self.results.len() && !self.failures.iter().any(|f| f.index == index)
    }
}

/// Run `tasks` on `concurrency` workers, returning once every task has finished
///
/// Tasks are claimed in strictly increasing index order and no index is
/// claimed twice. Completion order is unconstrained, but each result lands in
/// the slot of the index that produced it. A `concurrency` of zero is treated
/// as one.
pub async fn run_pool<F, Fut, T, E>(
    tasks: &[F],
    concurrency: usize,
    inter_task_delay: Duration,
) -> PoolOutput<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: Default,
    E: Display,
{
    let next = AtomicUsize::new(0);
    let workers = concurrency.max(1).min(tasks.len());

    let worker_runs = (0..workers).map(|worker| {
        let next = &next;
        async move {
            let mut completed: Vec<(usize, Result<T, String>)> = Vec::new();
            loop {
                let index = next.fetch_add(1, Ordering::SeqCst);
                let Some(task) = tasks.get(index) else {
                    break;
                };

                match task().await {
                    Ok(value) => completed.push((index, Ok(value))),
                    Err(e) => {
                        tracing::error!(worker, task = index, error = %e, "Task failed");
                        completed.push((index, Err(e.to_string())));
                    }
                }

                tokio::time::sleep(inter_task_delay).await;
            }
            completed
        }
    });

    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(tasks.len()).collect();
    let mut failures = Vec::new();

    for (index, outcome) in join_all(worker_runs).await.into_iter().flatten() {
        match outcome {
            Ok(value) => slots[index] = Some(value),
            Err(error) => failures.push(TaskFailure { index, error }),
        }
    }
    failures.sort_by_key(|f| f.index);

    PoolOutput {
        results: slots.into_iter().map(Option::unwrap_or_default).collect(),
        failures,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    #[tokio::test]
    async fn test_failing_task_leaves_empty_slot() {
        let tasks: Vec<_> = (0..5)
            .map(|i| {
                move || async move {
                    if i == 2 {
                        Err(format!("task {i} exploded"))
                    } else {
                        Ok(vec![i])
                    }
                }
            })
            .collect();

        let output = run_pool(&tasks, 2, Duration::ZERO).await;

        assert_eq!(output.results.len(), 5);
        assert!(output.results[2].is_empty());
        for i in [0usize, 1, 3, 4] {
            assert_eq!(output.results[i], vec![i]);
        }
        assert_eq!(
            output.failures,
            vec![TaskFailure {
                index: 2,
                error: "task 2 exploded".to_string()
            }]
        );
        assert!(!output.succeeded(2));
        assert!(output.succeeded(3));
        assert!(!output.succeeded(5));
    }

    #[tokio::test]
    async fn test_each_index_runs_exactly_once_in_claim_order() {
        let claims = Mutex::new(Vec::new());
        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let claims = &claims;
                move || async move {
                    claims.lock().unwrap().push(i);
                    tokio::time::sleep(Duration::from_millis((i % 3) as u64)).await;
                    Ok::<_, String>(i)
                }
            })
            .collect();

        let output = run_pool(&tasks, 4, Duration::ZERO).await;

        let claims = claims.into_inner().unwrap();
        assert_eq!(claims, (0..20).collect::<Vec<_>>());
        assert_eq!(output.results, (0..20).collect::<Vec<_>>());
        assert!(output.failures.is_empty());
    }

    #[tokio::test]
    async fn test_at_most_k_tasks_in_flight() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let in_flight = &in_flight;
                let peak = &peak;
                move || async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<u8, String>(0)
                }
            })
            .collect();

        run_pool(&tasks, 3, Duration::ZERO).await;
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_inter_task_delay_paces_workers() {
        let tasks: Vec<_> = (0..4).map(|_| || async { Ok::<u8, String>(1) }).collect();

        let start = Instant::now();
        run_pool(&tasks, 1, Duration::from_millis(50)).await;

        assert!(
            start.elapsed() >= Duration::from_millis(200),
            "single worker should pause after each of 4 tasks, took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let tasks: Vec<fn() -> std::future::Ready<Result<u8, String>>> = Vec::new();
        let output = run_pool(&tasks, 3, Duration::from_secs(10)).await;
        assert!(output.results.is_empty());
        assert!(output.failures.is_empty());
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_runs() {
        let tasks: Vec<_> = (0..3).map(|i| move || async move { Ok::<_, String>(i) }).collect();
        let output = run_pool(&tasks, 0, Duration::ZERO).await;
        assert_eq!(output.results, vec![0, 1, 2]);
    }
}
