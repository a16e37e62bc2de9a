//! Concurrency limiting and rate limiting for file operations
//!
//! # Overview
//!
//! Two kinds of controls are provided:
//!
//! 1. **Concurrency limit** - [`Limiter`] caps how many operations (e.g. file copies) may be in
//!    flight at the same time. It is an owned object, every run creates its own.
//! 2. **Rate throttles** - process-wide token buckets limiting operations per second and I/O
//!    operations per second. They are disabled unless explicitly initialized.
//!
//! # Concurrency limit
//!
//! ```rust,no_run
//! # async fn example() {
//! let limiter = throttle::Limiter::new(100);
//! let _guard = limiter.acquire().await;
//! // copy the file here - the slot is released when the guard is dropped
//! # }
//! ```
//!
//! # Rate throttles
//!
//! ```rust,no_run
//! use throttle::{get_ops_token, init_ops_tokens, replenish_schedule, run_ops_replenish_thread};
//!
//! # async fn example() {
//! // 100 operations per second
//! let (tokens, interval) = replenish_schedule(100);
//! init_ops_tokens(tokens);
//! tokio::spawn(run_ops_replenish_thread(tokens, interval));
//! get_ops_token().await;
//! # }
//! ```
//!
//! For I/O throttling the number of tokens required for a file is:
//!
//! ```text
//! tokens = ⌈file_size / chunk_size⌉
//! ```

mod limiter;
mod semaphore;

pub use limiter::{Limiter, LimiterGuard};

static OPS_THROTTLE: semaphore::Semaphore = semaphore::Semaphore::new();
static IOPS_THROTTLE: semaphore::Semaphore = semaphore::Semaphore::new();

pub fn init_ops_tokens(ops_tokens: usize) {
    OPS_THROTTLE.setup(ops_tokens);
}

pub fn init_iops_tokens(ops_tokens: usize) {
    IOPS_THROTTLE.setup(ops_tokens);
}

pub async fn get_ops_token() {
    OPS_THROTTLE.consume().await;
}

async fn get_iops_tokens(tokens: u32) {
    IOPS_THROTTLE.consume_many(tokens).await;
}

/// Number of I/O tokens needed to move `file_size` bytes in `chunk_size` pieces (at least one).
#[must_use]
pub fn file_iops_tokens(chunk_size: u64, file_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    1 + (std::cmp::max(1, file_size) - 1) / chunk_size
}

pub async fn get_file_iops_tokens(chunk_size: u64, file_size: u64) {
    let tokens = file_iops_tokens(chunk_size, file_size);
    if tokens == 0 {
        return;
    }
    match u32::try_from(tokens) {
        Ok(tokens) => get_iops_tokens(tokens).await,
        Err(_) => tracing::error!(
            "chunk size: {} is too small to limit throughput for files this big, size: {}",
            chunk_size,
            file_size,
        ),
    }
}

/// Split a per-second rate into (tokens, interval) for the replenish task.
///
/// Rates of 10/s and above are replenished every 100ms, slower rates get one token per interval.
#[must_use]
pub fn replenish_schedule(per_second: usize) -> (usize, std::time::Duration) {
    if per_second >= 10 {
        (per_second / 10, std::time::Duration::from_millis(100))
    } else {
        let per_second = std::cmp::max(per_second, 1) as u64;
        (1, std::time::Duration::from_millis(1000 / per_second))
    }
}

pub async fn run_ops_replenish_thread(replenish: usize, interval: std::time::Duration) {
    OPS_THROTTLE.run_replenish_thread(replenish, interval).await;
}

pub async fn run_iops_replenish_thread(replenish: usize, interval: std::time::Duration) {
    IOPS_THROTTLE
        .run_replenish_thread(replenish, interval)
        .await;
}
