// Bounded worker pool - at most `limit` jobs in flight, drained from a shared queue
use futures::future::join_all;
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

/// Results collected by [`run_bounded`]; failed jobs are counted, not kept.
#[derive(Debug)]
pub struct PoolOutcome<T> {
    pub results: Vec<T>,
    pub failures: usize,
}

/// Run `jobs` through `limit` cooperative workers.
///
/// Each worker pulls the next job from the shared queue until it is empty and
/// keeps its own results; the outcome is merged once every worker is done.
/// Completion order is unspecified, so callers merge by natural key afterwards.
pub async fn run_bounded<J, T, E, F, Fut>(jobs: Vec<J>, limit: usize, work: F) -> PoolOutcome<T>
where
    F: Fn(J) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let worker_count = limit.max(1).min(jobs.len());
    let queue = Mutex::new(VecDeque::from(jobs));
    let queue = &queue;
    let work = &work;

    let workers = (0..worker_count).map(|worker| async move {
        let mut results = Vec::new();
        let mut failures = 0;
        loop {
            let next = queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(job) = next else { break };

            match work(job).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::debug!(worker, error = %e, "Pool job failed");
                    failures += 1;
                }
            }
        }
        (results, failures)
    });

    let mut outcome = PoolOutcome {
        results: Vec::new(),
        failures: 0,
    };
    for (results, failures) in join_all(workers).await {
        outcome.results.extend(results);
        outcome.failures += failures;
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_never_exceeds_limit() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let outcome = run_bounded((0..20).collect(), 3, |job: u32| {
            let active = &active;
            let peak = &peak;
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(job * 2)
            }
        })
        .await;

        assert_eq!(outcome.results.len(), 20);
        assert_eq!(outcome.failures, 0);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(peak.load(Ordering::SeqCst), 3);

        let mut results = outcome.results;
        results.sort();
        assert_eq!(results, (0..20).map(|j| j * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let outcome = run_bounded(vec![1, 2, 3, 4, 5], 2, |job: i32| async move {
            if job % 2 == 0 {
                Err(format!("job {} failed", job))
            } else {
                Ok(job)
            }
        })
        .await;

        let mut results = outcome.results;
        results.sort();
        assert_eq!(results, vec![1, 3, 5]);
        assert_eq!(outcome.failures, 2);
    }

    #[tokio::test]
    async fn test_empty_queue_and_zero_limit() {
        let outcome = run_bounded(Vec::<u8>::new(), 4, |job| async move { Ok::<_, String>(job) }).await;
        assert!(outcome.results.is_empty());

        let outcome = run_bounded(vec![7u8], 0, |job| async move { Ok::<_, String>(job) }).await;
        assert_eq!(outcome.results, vec![7]);
    }
}
