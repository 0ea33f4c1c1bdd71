use std::future::Future;

use futures_util::future::join_all;

/// Run `f` over `items` in sequential batches of `batch_size`, each batch concurrently.
///
/// Results come back in input order. Callers wanting per-item failure capture return a
/// `Result` from `f`; one failed item never aborts its batch.
pub async fn scatter_gather<T, R, F, Fut>(items: Vec<T>, batch_size: usize, mut f: F) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    let batch_size = batch_size.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        let batch: Vec<Fut> = items.by_ref().take(batch_size).map(&mut f).collect();
        results.extend(join_all(batch).await);
    }
    results
}
