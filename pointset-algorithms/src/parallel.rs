//! Thread pool management for the sampling and grouping kernels
//!
//! Every kernel parallelizes with rayon iterators and runs them through
//! [`install`], so the pool configured here (or the single-thread pool when
//! parallelism is disabled) applies whether a kernel is called directly or
//! from a set abstraction layer.

use pointset_core::{Error, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, warn};

static GLOBAL_THREAD_POOL: OnceLock<Arc<ThreadPool>> = OnceLock::new();
static SERIAL_THREAD_POOL: OnceLock<Arc<ThreadPool>> = OnceLock::new();
static THREAD_POOL_CONFIG: Mutex<ThreadPoolConfig> = Mutex::new(ThreadPoolConfig::new());

/// Thread pool configuration for parallel processing
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of threads to use (None = one per logical CPU)
    pub num_threads: Option<usize>,
    /// Thread stack size in bytes
    pub stack_size: Option<usize>,
    /// Thread name prefix
    pub thread_name_prefix: String,
    /// Enable parallel processing (disable for debugging)
    pub enabled: bool,
}

impl ThreadPoolConfig {
    const fn new() -> Self {
        Self {
            num_threads: None,
            stack_size: None,
            thread_name_prefix: String::new(),
            enabled: true,
        }
    }

    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Set the thread name prefix
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Enable or disable parallel processing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: "pointset".to_string(),
            ..Self::new()
        }
    }
}

fn build_pool(config: &ThreadPoolConfig) -> Result<ThreadPool> {
    let mut builder = ThreadPoolBuilder::new();

    if let Some(num_threads) = config.num_threads {
        builder = builder.num_threads(num_threads);
    }

    if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    if !config.thread_name_prefix.is_empty() {
        let prefix = config.thread_name_prefix.clone();
        builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
    }

    builder
        .build()
        .map_err(|e| Error::Algorithm(format!("Failed to create thread pool: {}", e)))
}

/// Initialize the global thread pool with custom configuration
///
/// The pool can only be built once per process. Later calls still update the
/// `enabled` flag but keep the existing pool.
pub fn init_thread_pool(config: ThreadPoolConfig) -> Result<()> {
    if GLOBAL_THREAD_POOL.get().is_some() {
        warn!("thread pool already initialized, only the enabled flag is updated");
        if let Ok(mut global_config) = THREAD_POOL_CONFIG.lock() {
            global_config.enabled = config.enabled;
        }
        return Ok(());
    }

    let pool = build_pool(&config)?;
    debug!(threads = pool.current_num_threads(), "initialized thread pool");

    if let Ok(mut global_config) = THREAD_POOL_CONFIG.lock() {
        *global_config = config;
    }

    GLOBAL_THREAD_POOL
        .set(Arc::new(pool))
        .map_err(|_| Error::Algorithm("Thread pool already initialized".to_string()))
}

/// Get the global thread pool, initializing with defaults if needed
pub fn get_thread_pool() -> Result<Arc<ThreadPool>> {
    if let Some(pool) = GLOBAL_THREAD_POOL.get() {
        return Ok(pool.clone());
    }

    let pool = Arc::new(build_pool(&ThreadPoolConfig::default())?);
    Ok(GLOBAL_THREAD_POOL.get_or_init(|| pool).clone())
}

fn get_serial_pool() -> Result<Arc<ThreadPool>> {
    if let Some(pool) = SERIAL_THREAD_POOL.get() {
        return Ok(pool.clone());
    }

    let config = ThreadPoolConfig::default()
        .with_threads(1)
        .with_thread_name_prefix("pointset-serial");
    let pool = Arc::new(build_pool(&config)?);
    Ok(SERIAL_THREAD_POOL.get_or_init(|| pool).clone())
}

/// Get current thread pool configuration
pub fn get_config() -> ThreadPoolConfig {
    THREAD_POOL_CONFIG
        .lock()
        .map(|config| config.clone())
        .unwrap_or_default()
}

/// Check if parallel processing is enabled
pub fn is_parallel_enabled() -> bool {
    get_config().enabled
}

/// Run `op` on the configured pool
///
/// With parallelism disabled the work runs on a single-thread pool. Kernels
/// collect results in index order, so both paths produce identical output.
pub fn install<F, R>(op: F) -> Result<R>
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    let pool = if is_parallel_enabled() {
        get_thread_pool()?
    } else {
        get_serial_pool()?
    };
    Ok(pool.install(op))
}
