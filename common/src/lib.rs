//! Common utilities and types for rsort tools
//!
//! This crate provides the shared functionality used by the `rsort` and `filegen` binaries.
//!
//! # Modules
//!
//! - [`classify`] - maps file names to extension folders
//! - [`sort`] - directory traversal, bounded concurrent streamed copy and run statistics
//! - [`filegen`] - random directory tree generator used to exercise the sorter
//! - [`progress`] - live counters and progress rendering
//! - [`config`] - runtime, throttling and output configuration
//!
//! # Running an operation
//!
//! Binaries hand their async main to [`run`] which sets up the tokio runtime, logging, throttles
//! and progress reporting, then prints the resulting summary:
//!
//! ```rust,no_run
//! # fn example() {
//! let res = common::run(
//!     None,
//!     common::OutputConfig::default(),
//!     common::RuntimeConfig::default(),
//!     common::ThrottleConfig::default(),
//!     || async { Ok::<_, anyhow::Error>("done") },
//! );
//! if res.is_none() {
//!     std::process::exit(1);
//! }
//! # }
//! ```

use std::io::IsTerminal;

use anyhow::Context;

pub mod classify;
pub mod config;
pub mod filegen;
pub mod progress;
pub mod sort;

#[cfg(test)]
pub mod testutils;

pub use config::{OutputConfig, RuntimeConfig, ThrottleConfig};

static PROGRESS: std::sync::LazyLock<progress::Progress> =
    std::sync::LazyLock::new(progress::Progress::new);

/// Process-wide live counters, for display only.
pub fn get_progress() -> &'static progress::Progress {
    &PROGRESS
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ProgressType {
    /// Pick `ProgressBar` when stderr is a terminal, `TextUpdates` otherwise
    #[default]
    Auto,
    /// Animated single line spinner
    ProgressBar,
    /// Periodic multi-line reports, appropriate for logging
    TextUpdates,
}

#[derive(Debug, Clone)]
pub struct ProgressSettings {
    pub progress_type: ProgressType,
    /// Human readable delay between updates, e.g. "200ms" or "10s"
    pub progress_delay: Option<String>,
}

impl ProgressSettings {
    fn resolve(&self) -> anyhow::Result<(ProgressType, std::time::Duration)> {
        let progress_type = match self.progress_type {
            ProgressType::Auto => {
                if std::io::stderr().is_terminal() {
                    ProgressType::ProgressBar
                } else {
                    ProgressType::TextUpdates
                }
            }
            other => other,
        };
        let delay = match &self.progress_delay {
            Some(delay) => humantime::parse_duration(delay)
                .with_context(|| format!("invalid progress delay: {delay:?}"))?,
            None if progress_type == ProgressType::ProgressBar => {
                std::time::Duration::from_millis(200)
            }
            None => std::time::Duration::from_secs(10),
        };
        Ok((progress_type, delay))
    }
}

fn progress_bar_style() -> indicatif::ProgressStyle {
    indicatif::ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner())
}

fn print_progress(
    progress_type: ProgressType,
    delay: std::time::Duration,
    done: &std::sync::mpsc::Receiver<()>,
) {
    let mut printer = progress::ProgressPrinter::new(get_progress());
    let bar = (progress_type == ProgressType::ProgressBar).then(|| {
        let bar = indicatif::ProgressBar::new_spinner();
        bar.set_style(progress_bar_style());
        bar
    });
    // the sender is dropped once the operation completes
    while let Err(std::sync::mpsc::RecvTimeoutError::Timeout) = done.recv_timeout(delay) {
        match &bar {
            Some(bar) => {
                bar.set_message(printer.print_line());
                bar.tick();
            }
            None => eprintln!("{}", printer.print()),
        }
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

fn setup_tracing(output: &OutputConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(output.log_level()));
    // a subscriber may already be installed, e.g. when running from tests
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn setup_throttle(throttle_config: &ThrottleConfig) {
    if throttle_config.ops_throttle > 0 {
        let (tokens, interval) = throttle::replenish_schedule(throttle_config.ops_throttle);
        throttle::init_ops_tokens(tokens);
        tokio::spawn(throttle::run_ops_replenish_thread(tokens, interval));
    }
    if throttle_config.iops_throttle > 0 {
        let (tokens, interval) = throttle::replenish_schedule(throttle_config.iops_throttle);
        throttle::init_iops_tokens(tokens);
        tokio::spawn(throttle::run_iops_replenish_thread(tokens, interval));
    }
}

/// Run `func` on a freshly built tokio runtime.
///
/// Returns `None` if the runtime could not be set up or `func` returned an error; the error is
/// printed to stderr unless running in quiet mode. On success the summary is printed to stdout
/// when `output.print_summary` is set.
pub fn run<Fut, Summary, Error>(
    progress: Option<ProgressSettings>,
    output: OutputConfig,
    runtime: RuntimeConfig,
    throttle_config: ThrottleConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Error: std::fmt::Display + std::fmt::Debug,
    Fut: std::future::Future<Output = Result<Summary, Error>>,
{
    setup_tracing(&output);
    let report_error = |error: &dyn std::fmt::Display| {
        if !output.quiet {
            eprintln!("{error:#}");
        }
    };
    if let Err(error) = throttle_config.validate() {
        report_error(&error);
        return None;
    }
    let progress = match progress.as_ref().map(ProgressSettings::resolve).transpose() {
        Ok(progress) => progress,
        Err(error) => {
            report_error(&error);
            return None;
        }
    };
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let tokio_runtime = match builder.build() {
        Ok(tokio_runtime) => tokio_runtime,
        Err(error) => {
            report_error(&error);
            return None;
        }
    };
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let printer = progress.map(|(progress_type, delay)| {
        std::thread::spawn(move || print_progress(progress_type, delay, &done_rx))
    });
    let res = tokio_runtime.block_on(async {
        setup_throttle(&throttle_config);
        func().await
    });
    drop(done_tx);
    if printer.is_some_and(|printer| printer.join().is_err()) {
        tracing::error!("progress printer thread panicked");
    }
    match res {
        Ok(summary) => {
            if output.print_summary {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            tracing::debug!("operation failed: {:?}", &error);
            report_error(&error);
            None
        }
    }
}
