//! Failure aggregation over a growing set of concurrent tasks.

use futures::future::join_all;
use parking_lot::Mutex;
use std::{future::Future, mem::take, sync::Arc};
use tokio::task::JoinHandle;

use crate::error::BuildError;

type Pending = Vec<JoinHandle<Result<(), BuildError>>>;

/// A set of spawned tasks that may keep growing while it is being awaited.
///
/// Clones share the same set, so a task holding a clone can enqueue follow-up work that
/// [TaskGroup::gather_all] will pick up in its next wave.
#[derive(Clone, Default)]
pub struct TaskGroup {
    pending: Arc<Mutex<Pending>>,
}

impl TaskGroup {
    pub fn new() -> TaskGroup {
        TaskGroup::default()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Result<(), BuildError>> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.pending.lock().push(handle);
    }

    /// Await every task, including tasks spawned while waiting.
    ///
    /// Each wave drains the pending set and awaits all of it; a failing task never cancels its
    /// siblings. Ignorable failures are dropped. If any real failure remains, a single
    /// [BuildError::Aggregate] carrying all of them and `context` is returned.
    pub async fn gather_all<S: Into<String>>(&self, context: S) -> Result<(), BuildError> {
        let mut failures = Vec::new();
        let mut waves = 0usize;
        loop {
            let wave = take(&mut *self.pending.lock());
            if wave.is_empty() {
                break;
            }
            waves += 1;
            for outcome in join_all(wave).await {
                let err = match outcome {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => err,
                    Err(join_err) => BuildError::from(join_err),
                };
                if err.is_ignorable() {
                    tracing::trace!("[TaskGroup] Dropping reported failure: {err}");
                } else {
                    failures.push(err);
                }
            }
        }

        if failures.is_empty() {
            return Ok(());
        }
        let context = context.into();
        tracing::debug!(
            "[TaskGroup] {context}: {} failure(s) after {waves} wave(s)",
            failures.len()
        );
        Err(BuildError::Aggregate {
            context,
            causes: failures,
        })
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
