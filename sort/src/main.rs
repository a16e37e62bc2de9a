use anyhow::Result;
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rsort",
    version,
    about = "Sort files into per-extension folders - copies a directory tree concurrently",
    long_about = "`rsort` walks a source directory tree and copies every regular file into
`<output>/<extension>/<file name>`. Extensions are lower-cased, files without an extension
go to `no_ext`. Symbolic links are never followed and are counted as skipped.

A single file failing to copy does not stop the run: it is reported and counted as an error
in the summary printed at the end.

EXAMPLES:
    # Sort a download folder
    rsort ~/Downloads /tmp/sorted

    # Limit to 8 simultaneous copies and show progress
    rsort /data /sorted --max-concurrent 8 --progress"
)]
struct Args {
    // Sort options
    /// Maximum number of files copied at the same time
    #[arg(
        long,
        default_value = "100",
        value_name = "N",
        value_parser = parse_max_concurrent,
        help_heading = "Sort options"
    )]
    max_concurrent: usize,

    /// Size of each read and write when copying file contents
    ///
    /// Accepts suffixes like "64KiB", "1MiB".
    #[arg(
        long,
        default_value = "64KiB",
        value_name = "SIZE",
        value_parser = parse_size,
        help_heading = "Sort options"
    )]
    chunk_size: u64,

    /// Give up on a single file if copying it takes longer than this, e.g. "30s", "5min"
    ///
    /// A timed out file counts as an error. No timeout by default.
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration, help_heading = "Sort options")]
    file_timeout: Option<std::time::Duration>,

    // Progress & output
    /// Show progress
    #[arg(long, help_heading = "Progress & output")]
    progress: bool,

    /// Toggles the type of progress to show
    ///
    /// If specified, --progress flag is implied.
    #[arg(long, value_name = "TYPE", help_heading = "Progress & output")]
    progress_type: Option<common::ProgressType>,

    /// Sets the delay between progress updates
    ///
    /// - For the interactive (--progress-type=progress-bar), the default is 200ms.
    /// - For the non-interactive (--progress-type=text-updates), the default is 10s.
    ///
    /// If specified, --progress flag is implied.
    #[arg(long, value_name = "DELAY", help_heading = "Progress & output")]
    progress_delay: Option<String>,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Performance & throttling
    /// Throttle the number of directory entries processed per second, 0 means no throttle
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    ops_throttle: usize,

    /// Throttle the number of I/O operations per second, 0 means no throttle
    ///
    /// Number of I/O operations for a file is calculated as: ((file size - 1) / chunk size) + 1
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    iops_throttle: usize,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    // ARGUMENTS
    /// Source directory
    #[arg()]
    src: std::path::PathBuf,

    /// Destination directory, created if missing
    #[arg()]
    dst: std::path::PathBuf,
}

fn parse_max_concurrent(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(error) => Err(error.to_string()),
    }
}

fn parse_size(value: &str) -> Result<u64, String> {
    let size = value.parse::<bytesize::ByteSize>()?.as_u64();
    if size == 0 {
        return Err("must be greater than zero".to_string());
    }
    Ok(size)
}

struct Report {
    destination: std::path::PathBuf,
    summary: common::sort::Summary,
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "destination: {}\n{}",
            self.destination.display(),
            &self.summary
        )
    }
}

#[instrument]
async fn async_main(args: Args) -> Result<Report> {
    let limiter = throttle::Limiter::new(args.max_concurrent);
    let settings = common::sort::Settings {
        chunk_size: args.chunk_size,
        file_timeout: args.file_timeout,
    };
    let summary = common::sort::sort(
        common::get_progress(),
        &args.src,
        &args.dst,
        &settings,
        &limiter,
    )
    .await?;
    tracing::info!(
        "peak concurrent copies: {} of {} allowed",
        limiter.peak(),
        limiter.capacity()
    );
    Ok(Report {
        destination: args.dst,
        summary,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: true,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let throttle = common::ThrottleConfig {
        ops_throttle: args.ops_throttle,
        iops_throttle: args.iops_throttle,
        chunk_size: args.chunk_size,
    };
    let res = common::run(
        if args.progress || args.progress_type.is_some() || args.progress_delay.is_some() {
            Some(common::ProgressSettings {
                progress_type: args.progress_type.unwrap_or_default(),
                progress_delay: args.progress_delay,
            })
        } else {
            None
        },
        output,
        runtime,
        throttle,
        func,
    );
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
