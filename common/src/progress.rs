use std::sync::atomic::{AtomicU64, Ordering};

use tracing::instrument;

/// Live counter for progress display. Final results are never read from here.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicU64,
}

impl Counter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
        }
    }

    pub fn add(&self, value: u64) {
        self.count.fetch_add(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct ProgressCounter {
    started: Counter,
    finished: Counter,
}

pub struct ProgressGuard<'a> {
    progress: &'a ProgressCounter,
}

impl<'a> ProgressGuard<'a> {
    pub fn new(progress: &'a ProgressCounter) -> Self {
        progress.started.inc();
        Self { progress }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.progress.finished.inc();
    }
}

pub struct Status {
    pub started: u64,
    pub finished: u64,
}

impl ProgressCounter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            started: Counter::new(),
            finished: Counter::new(),
        }
    }

    pub fn guard(&self) -> ProgressGuard<'_> {
        ProgressGuard::new(self)
    }

    #[instrument]
    pub fn get(&self) -> Status {
        // read finished first, a concurrent start/finish pair may land between the two loads
        let finished = self.finished.get();
        let started = self.started.get();
        if finished > started {
            tracing::debug!(
                "Progress inversion - started: {}, finished {}",
                started,
                finished
            );
        }
        Status {
            started: std::cmp::max(started, finished),
            finished,
        }
    }
}

#[derive(Debug)]
pub struct Progress {
    pub ops: ProgressCounter,
    pub bytes_copied: Counter,
    pub files_copied: Counter,
    pub files_failed: Counter,
    pub files_skipped: Counter,
    pub files_created: Counter,
    pub directories_created: Counter,
    start_time: std::time::Instant,
}

impl Progress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ops: ProgressCounter::new(),
            bytes_copied: Counter::new(),
            files_copied: Counter::new(),
            files_failed: Counter::new(),
            files_skipped: Counter::new(),
            files_created: Counter::new(),
            directories_created: Counter::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn get_duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ProgressPrinter<'a> {
    progress: &'a Progress,
    last_ops: u64,
    last_bytes: u64,
    last_update: std::time::Instant,
}

impl<'a> ProgressPrinter<'a> {
    pub fn new(progress: &'a Progress) -> Self {
        Self {
            progress,
            last_ops: progress.ops.get().finished,
            last_bytes: progress.bytes_copied.get(),
            last_update: std::time::Instant::now(),
        }
    }

    pub fn print(&mut self) -> String {
        let time_now = std::time::Instant::now();
        let ops = self.progress.ops.get();
        let total_duration_secs = self.progress.get_duration().as_secs_f64();
        let curr_duration_secs = (time_now - self.last_update).as_secs_f64();
        let average_ops_rate = ops.finished as f64 / total_duration_secs;
        let current_ops_rate = (ops.finished - self.last_ops) as f64 / curr_duration_secs;
        let bytes = self.progress.bytes_copied.get();
        let average_bytes_rate = bytes as f64 / total_duration_secs;
        let current_bytes_rate = (bytes - self.last_bytes) as f64 / curr_duration_secs;
        self.last_ops = ops.finished;
        self.last_bytes = bytes;
        self.last_update = time_now;
        format!(
            "---------------------\n\
            OPS:\n\
            pending: {:>10}\n\
            average: {:>10.2} items/s\n\
            current: {:>10.2} items/s\n\
            -----------------------\n\
            COPIED:\n\
            average: {:>10}/s\n\
            current: {:>10}/s\n\
            total:   {:>10}\n\
            \n\
            files:   {:>10}\n\
            failed:  {:>10}\n\
            skipped: {:>10}\n\
            -----------------------\n\
            CREATED:\n\
            files:       {:>10}\n\
            directories: {:>10}",
            ops.started - ops.finished,
            average_ops_rate,
            current_ops_rate,
            bytesize::ByteSize(average_bytes_rate as u64),
            bytesize::ByteSize(current_bytes_rate as u64),
            bytesize::ByteSize(bytes),
            self.progress.files_copied.get(),
            self.progress.files_failed.get(),
            self.progress.files_skipped.get(),
            self.progress.files_created.get(),
            self.progress.directories_created.get(),
        )
    }

    /// One line variant used as the spinner message.
    pub fn print_line(&self) -> String {
        let ops = self.progress.ops.get();
        format!(
            "pending: {} | copied: {} ({}) | failed: {} | skipped: {} | created: {} files, {} dirs",
            ops.started - ops.finished,
            self.progress.files_copied.get(),
            bytesize::ByteSize(self.progress.bytes_copied.get()),
            self.progress.files_failed.get(),
            self.progress.files_skipped.get(),
            self.progress.files_created.get(),
            self.progress.directories_created.get(),
        )
    }
}
