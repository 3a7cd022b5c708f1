//! Concurrency-limited fan-out.
//!
//! Both the ignore-file filter and directory discovery fan out one network
//! call per repository under a fixed concurrency ceiling and must report
//! partial results alongside the failures. This is the shared primitive
//! for that pattern.

use std::future::Future;
use std::sync::Arc;
use sweep_core::{Error, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Apply `f` to every item with at most `limit` invocations in flight.
///
/// Returns every successful output together with every error; the caller
/// decides whether partial success is usable. All spawned work is joined
/// before returning. Output order is not defined.
pub async fn parallel_map_limit<I, T, F, Fut>(limit: usize, items: Vec<I>, f: F) -> (Vec<T>, Vec<Error>)
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut tasks: JoinSet<Result<T>> = JoinSet::new();

    for item in items {
        let semaphore = Arc::clone(&semaphore);
        let f = f.clone();
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| Error::Internal(format!("semaphore closed: {e}")))?;
            f(item).await
        });
    }

    let mut outputs = Vec::new();
    let mut errors = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(output)) => outputs.push(output),
            Ok(Err(err)) => errors.push(err),
            Err(err) => errors.push(Error::Internal(format!("worker task failed: {err}"))),
        }
    }

    (outputs, errors)
}
