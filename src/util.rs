//! Bounded-concurrency fan-out helpers.
//!
//! Ported from `original_source/.../utils.py`'s `gather`/`as_completed`:
//! both let a caller run a batch of futures with at most `limit` in flight
//! at once, trading the `asyncio.Queue`-plus-worker-pool shape of the
//! original for a `tokio::sync::Semaphore` permit per future, which is the
//! idiomatic bounded-concurrency pattern on this stack. [`ConcurrentExecutor`](crate::executor::ConcurrentExecutor)
//! builds on [`select_bounded`] to cap how many handler tasks run at once.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Run every future in `futures`, at most `limit` concurrently (`0` means
/// unbounded), and return their outputs in the same order they were given —
/// the bounded analogue of `utils.py`'s `gather(*coroutines, num_workers=n)`.
pub async fn join_bounded<T: Send + 'static>(futures: Vec<BoxFuture<'static, T>>, limit: usize) -> Vec<T> {
    if limit == 0 {
        return futures::future::join_all(futures).await;
    }
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut tasks = FuturesUnordered::new();
    for (index, fut) in futures.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        tasks.push(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            (index, fut.await)
        });
    }
    let mut slots: Vec<Option<T>> = (0..tasks.len()).map(|_| None).collect();
    while let Some((index, value)) = tasks.next().await {
        slots[index] = Some(value);
    }
    slots.into_iter().map(|v| v.expect("every index is filled exactly once")).collect()
}

/// Run every future in `futures`, at most `limit` concurrently, yielding
/// each output as soon as it completes rather than waiting for all of them —
/// the bounded analogue of `utils.py`'s `as_completed`. Completion order is
/// not input order; callers that need priority order re-sort downstream
/// (see [`crate::executor::ConcurrentExecutor`]).
pub fn select_bounded<T: Send + 'static>(
    futures: Vec<BoxFuture<'static, T>>,
    limit: usize,
) -> impl futures::Stream<Item = T> {
    let limit = if limit == 0 { futures.len().max(1) } else { limit };
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut tasks = FuturesUnordered::new();
    for fut in futures {
        let semaphore = semaphore.clone();
        tasks.push(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            fut.await
        });
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_bounded_preserves_input_order() {
        let futures: Vec<BoxFuture<'static, i64>> = vec![
            Box::pin(async { 1 }),
            Box::pin(async { 2 }),
            Box::pin(async { 3 }),
        ];
        let results = join_bounded(futures, 2).await;
        assert_eq!(results, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn select_bounded_yields_every_item() {
        let futures: Vec<BoxFuture<'static, i64>> = (0..5i64).map(|i| Box::pin(async move { i }) as BoxFuture<'static, i64>).collect();
        let mut stream = Box::pin(select_bounded(futures, 2));
        let mut seen = Vec::new();
        while let Some(v) = stream.next().await {
            seen.push(v);
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }
}
