//! Reusable execution context.
//!
//! A `Resources` value owns the worker pool used by build, extend and search.
//! Create it once, pass it by reference into each call, drop it when done.

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{IvfError, Result};
use crate::params::ResourcesConfig;

#[derive(Debug)]
pub struct Resources {
    pool: ThreadPool,
    insert_batch_size: usize,
}

impl Resources {
    /// Create a context with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(&ResourcesConfig::default())
    }

    pub fn with_config(config: &ResourcesConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(|i| format!("ivf-worker-{}", i))
            .build()
            .map_err(|e| IvfError::ResourceError(e.to_string()))?;

        tracing::debug!(
            threads = pool.current_num_threads(),
            insert_batch_size = config.insert_batch_size,
            "created resources"
        );

        Ok(Self {
            pool,
            insert_batch_size: config.insert_batch_size,
        })
    }

    /// Run `op` inside the worker pool, blocking until it and all parallel
    /// work it spawned has finished.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn insert_batch_size(&self) -> usize {
        self.insert_batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_explicit_thread_count() {
        let res = Resources::with_config(&ResourcesConfig::default().with_num_threads(2)).unwrap();
        assert_eq!(res.num_threads(), 2);
        let sum: u64 = res.install(|| (0..1000u64).into_par_iter().sum());
        assert_eq!(sum, 499_500);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = ResourcesConfig::default().with_insert_batch_size(0);
        assert!(matches!(
            Resources::with_config(&config),
            Err(IvfError::InvalidParameter(_))
        ));
    }
}
