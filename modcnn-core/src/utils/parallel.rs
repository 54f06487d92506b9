use crate::error::ModCnnError;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

/// Size of the fixed worker pool that runs the data-parallel kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionConfig {
    /// Number of worker threads; `0` lets rayon pick (one per logical CPU).
    pub num_threads: usize,
}

impl ExecutionConfig {
    pub fn with_threads(num_threads: usize) -> Self {
        ExecutionConfig { num_threads }
    }

    /// Builds a dedicated pool for this configuration.
    pub fn build_pool(&self) -> Result<Arc<ThreadPool>, ModCnnError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .thread_name(|i| format!("modcnn-worker-{}", i))
            .build()
            .map_err(|e| ModCnnError::ThreadPool(e.to_string()))?;
        log::debug!("Built worker pool with {} threads", pool.current_num_threads());
        Ok(Arc::new(pool))
    }
}

/// Runs `op` inside `pool` when one is given, otherwise on rayon's global pool.
pub(crate) fn install<R, F>(pool: Option<&ThreadPool>, op: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match pool {
        Some(pool) => pool.install(op),
        None => op(),
    }
}
