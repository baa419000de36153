use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon_iter_concurrent_limit::iter_concurrent_limit;

/// Bounded-parallel map over a list of work items.
///
/// Items run on the rayon pool, at most `limit` concurrently when one is
/// given (the whole pool otherwise). Results preserve input order. The
/// first failing item fails the batch; items already in flight may run
/// to completion but their results are discarded.
pub fn concurrent_map<T, R, E, F>(items: Vec<T>, limit: Option<usize>, f: F) -> Result<Vec<R>, E>
where
    T: Send,
    R: Send,
    E: Send,
    F: Fn(T) -> Result<R, E> + Clone + Send + Sync,
{
    match limit {
        Some(n) => iter_concurrent_limit!(n.max(1), items.into_par_iter(), map, f.clone()).collect(),
        None => items.into_par_iter().map(f).collect(),
    }
}
