use anyhow::{Context, Result};
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "filegen",
    version,
    about = "Generate a random directory tree for exercising rsort",
    long_about = "`filegen` fills a directory with randomly named files and folders. Every level gets
--files files with a random extension from --extensions and --folders subfolders, down to --depth
levels. Folders at the deepest level stay empty.

EXAMPLES:
    # Default tree under ./random_structure
    filegen

    # Wide and shallow tree of log and csv files
    filegen /tmp/data --depth 1 --files 1000 --extensions log,csv"
)]
struct Args {
    /// Root directory where the tree is generated, created if missing
    #[arg(default_value = "random_structure")]
    root: std::path::PathBuf,

    // Generation options
    /// Number of directory levels that receive files
    #[arg(long, default_value = "3", value_name = "N", help_heading = "Generation options")]
    depth: usize,

    /// Number of files created in each directory
    #[arg(long, default_value = "4", value_name = "N", help_heading = "Generation options")]
    files: usize,

    /// Number of subfolders created in each directory
    #[arg(long, default_value = "2", value_name = "N", help_heading = "Generation options")]
    folders: usize,

    /// Number of random characters written to each file
    #[arg(long, default_value = "50", value_name = "N", help_heading = "Generation options")]
    content_length: usize,

    /// Comma separated list of extensions to pick from
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "txt,csv,pdf,doc,mp4,jpg,jpeg,png,mp3,xml",
        value_name = "EXT,...",
        help_heading = "Generation options"
    )]
    extensions: Vec<String>,

    // Progress & output
    /// Show progress
    #[arg(long, help_heading = "Progress & output")]
    progress: bool,

    /// Toggles the type of progress to show
    ///
    /// If specified, --progress flag is implied.
    #[arg(long, value_name = "TYPE", help_heading = "Progress & output")]
    progress_type: Option<common::ProgressType>,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Performance & throttling
    /// Throttle the number of files created per second, 0 means no throttle
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    ops_throttle: usize,

    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,
}

#[instrument]
async fn async_main(args: Args) -> Result<common::filegen::Summary> {
    let extensions = args
        .extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_string())
        .filter(|ext| !ext.is_empty())
        .collect();
    let settings = common::filegen::Settings {
        depth: args.depth,
        num_files: args.files,
        num_folders: args.folders,
        content_length: args.content_length,
        extensions,
    };
    tokio::fs::create_dir_all(&args.root)
        .await
        .with_context(|| format!("Error creating root directory {:?}", &args.root))?;
    let summary = common::filegen::filegen(
        common::get_progress(),
        &args.root,
        &settings,
        settings.depth,
    )
    .await?;
    Ok(summary)
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
        max_blocking_threads: 0,
    };
    let throttle = common::ThrottleConfig {
        ops_throttle: args.ops_throttle,
        ..Default::default()
    };
    let res = common::run(
        if args.progress || args.progress_type.is_some() {
            Some(common::ProgressSettings {
                progress_type: args.progress_type.unwrap_or_default(),
                progress_delay: None,
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
