//! Bulk-synchronous fan-out of per-section tasks.
//!
//! `run_batch` expands a set of section tasks into parallel tokio tasks and
//! blocks until every one has resolved (the barrier). Tasks never share
//! mutable state: each owns an immutable snapshot of its inputs and produces
//! exactly one value keyed to its own section. A task that times out, panics,
//! or never reports resolves to its fallback value, so the barrier always
//! completes with one result per job, in job order. There is no mid-batch
//! cancellation.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::warn;

use futures::future::BoxFuture;

use crate::config::DispatchConfig;

/// One unit of work in a batch: a section-scoped task and the fallback value
/// used when the task cannot produce a result.
pub struct DispatchJob<T> {
    /// Section this job belongs to, for logging.
    pub section_id: String,
    /// The task itself; owns everything it reads.
    pub task: BoxFuture<'static, T>,
    /// Value recorded if the task times out or is lost.
    pub fallback: T,
}

impl<T> DispatchJob<T> {
    /// Create a job from any future producing the batch's result type.
    pub fn new(
        section_id: impl Into<String>,
        task: impl Future<Output = T> + Send + 'static,
        fallback: T,
    ) -> Self {
        Self { section_id: section_id.into(), task: Box::pin(task), fallback }
    }
}

/// Run a batch of section jobs to completion and collect results in job order.
pub async fn run_batch<T>(jobs: Vec<DispatchJob<T>>, config: &DispatchConfig) -> Vec<T>
where
    T: Clone + Send + 'static,
{
    if jobs.is_empty() {
        return Vec::new();
    }

    let max_parallel = config.max_parallel.unwrap_or(jobs.len()).max(1);
    let semaphore = Arc::new(Semaphore::new(max_parallel));
    let results: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new(vec![None; jobs.len()]));

    let mut handles = Vec::with_capacity(jobs.len());
    let mut fallbacks = Vec::with_capacity(jobs.len());

    for (index, job) in jobs.into_iter().enumerate() {
        fallbacks.push((job.section_id.clone(), job.fallback.clone()));

        let semaphore = Arc::clone(&semaphore);
        let results = Arc::clone(&results);
        let task_timeout = config.task_timeout;
        let DispatchJob { section_id, task, fallback } = job;

        handles.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    store(&results, index, fallback);
                    return;
                }
            };

            let value = match timeout(task_timeout, task).await {
                Ok(value) => value,
                Err(_) => {
                    warn!(section = %section_id, "section task timed out, using fallback");
                    fallback
                }
            };
            store(&results, index, value);
        }));
    }

    // The barrier: every task runs to completion before any merge happens.
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "section task join failed");
        }
    }

    let slots = match Arc::try_unwrap(results) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
        Err(_) => return fallbacks.into_iter().map(|(_, fallback)| fallback).collect(),
    };

    slots
        .into_iter()
        .zip(fallbacks)
        .map(|(slot, (section_id, fallback))| {
            slot.unwrap_or_else(|| {
                warn!(section = %section_id, "section task did not report a result, using fallback");
                fallback
            })
        })
        .collect()
}

fn store<T>(results: &Mutex<Vec<Option<T>>>, index: usize, value: T) {
    let mut slots = results.lock().unwrap_or_else(PoisonError::into_inner);
    slots[index] = Some(value);
}
