//! Work distribution for the pipeline stages.
//!
//! A stage is a batch of independent tasks; the distributor runs them and
//! returns one result per task, in input order.

/// Runs a batch of independent tasks
pub trait WorkDistributor: Send + Sync {
    fn map<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync;

    /// Number of tasks that may run at once
    fn parallelism(&self) -> usize;
}

/// Runs tasks one after another on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl WorkDistributor for Sequential {
    fn map<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        tasks.into_iter().map(f).collect()
    }

    fn parallelism(&self) -> usize {
        1
    }
}

/// Runs tasks on a dedicated rayon thread pool
#[cfg(feature = "parallel")]
#[derive(Debug)]
pub struct ThreadPoolDistributor {
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl ThreadPoolDistributor {
    /// Pool with `num_workers` threads, or one per core when `None`
    pub fn new(num_workers: Option<usize>) -> crate::types::TileResult<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("tilechron-{}", i));
        if let Some(workers) = num_workers {
            builder = builder.num_threads(workers);
        }
        let pool = builder
            .build()
            .map_err(|e| crate::types::TileError::Config(format!("Cannot start worker pool: {}", e)))?;
        log::debug!("Worker pool with {} thread(s)", pool.current_num_threads());
        Ok(Self { pool })
    }
}

#[cfg(feature = "parallel")]
impl WorkDistributor for ThreadPoolDistributor {
    fn map<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        use rayon::prelude::*;

        self.pool.install(|| tasks.into_par_iter().map(f).collect())
    }

    fn parallelism(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_keeps_order() {
        let results = Sequential.map(vec![3, 1, 2], |x| x * 10);
        assert_eq!(results, vec![30, 10, 20]);
        assert_eq!(Sequential.parallelism(), 1);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_thread_pool_keeps_order() {
        let pool = ThreadPoolDistributor::new(Some(2)).unwrap();
        assert_eq!(pool.parallelism(), 2);
        let results = pool.map((0..100).collect(), |x: u32| x * x);
        assert_eq!(results[7], 49);
        assert_eq!(results.len(), 100);
    }
}
