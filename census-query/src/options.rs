//! Worker pool configuration.

use std::env;

use census_result::{Error, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Environment variable overriding the worker count.
pub const THREADS_ENV: &str = "CENSUS_QUERY_THREADS";

/// Lower bound on worker threads, so a prefetch can overlap the consumer of
/// the chunk before it.
pub const MIN_THREADS: usize = 2;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Worker threads for this query's pool. Falls back to
    /// `CENSUS_QUERY_THREADS`, then to the available parallelism.
    pub num_threads: Option<usize>,
}

impl QueryOptions {
    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    pub fn resolved_threads(&self) -> usize {
        self.num_threads
            .or_else(|| parse_env_usize(THREADS_ENV))
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(MIN_THREADS)
            })
            .max(MIN_THREADS)
    }

    pub(crate) fn build_pool(&self, query_id: u64) -> Result<ThreadPool> {
        let threads = self.resolved_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("census-query-{i}"))
            .panic_handler(move |_| {
                tracing::warn!(query = query_id, "a query worker task panicked");
            })
            .build()
            .map_err(|e| Error::Internal(format!("failed to build worker pool: {e}")))?;
        tracing::debug!(query = query_id, threads, "created query worker pool");
        Ok(pool)
    }
}

fn parse_env_usize(key: &str) -> Option<usize> {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().replace('_', "").parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_count_respects_floor() {
        assert_eq!(QueryOptions::default().with_num_threads(1).resolved_threads(), 2);
        assert_eq!(QueryOptions::default().with_num_threads(6).resolved_threads(), 6);
        assert!(QueryOptions::default().resolved_threads() >= MIN_THREADS);
    }

    #[test]
    fn pool_threads_are_named() {
        let pool = QueryOptions::default().with_num_threads(2).build_pool(0).unwrap();
        let name = pool.install(|| std::thread::current().name().map(str::to_string));
        assert!(name.unwrap().starts_with("census-query-"));
        assert_eq!(pool.current_num_threads(), 2);
    }
}
