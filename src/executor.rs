//! Parallel fan-out with a join barrier
//!
//! [`ParallelExecutor::run_all`] spawns one task per item and returns only
//! after every task has finished. A failing or panicking task never cancels
//! its siblings; each item gets its own [`TaskOutcome`].

use anyhow::{anyhow, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Result of running the action for one item
#[derive(Debug)]
pub struct TaskOutcome<T, R> {
    pub item: T,
    pub result: Result<R>,
}

impl<T, R> TaskOutcome<T, R> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParallelExecutor {
    /// 0 means unbounded: every item runs at once
    max_parallel: usize,
}

impl ParallelExecutor {
    pub fn new(max_parallel: usize) -> Self {
        Self { max_parallel }
    }

    /// Run `action` once per item concurrently and wait for all of them.
    ///
    /// Outcomes are returned in input order.
    pub async fn run_all<T, F, Fut, R>(
        &self,
        items: impl IntoIterator<Item = T>,
        action: F,
    ) -> Vec<TaskOutcome<T, R>>
    where
        T: Clone + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Send + 'static,
    {
        let action = Arc::new(action);
        let semaphore = (self.max_parallel > 0).then(|| Arc::new(Semaphore::new(self.max_parallel)));

        let mut tasks = FuturesUnordered::new();

        for (index, item) in items.into_iter().enumerate() {
            let action = Arc::clone(&action);
            let semaphore = semaphore.clone();
            let task_item = item.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => Some(semaphore.acquire_owned().await?),
                    None => None,
                };
                action(task_item).await
            });

            tasks.push(async move { (index, item, handle.await) });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());

        while let Some((index, item, joined)) = tasks.next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(anyhow!("task panicked")),
                Err(e) => Err(anyhow!("task did not complete: {}", e)),
            };
            outcomes.push((index, TaskOutcome { item, result }));
        }

        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}
