use std::os::unix::fs::MetadataExt;

use anyhow::{Context, anyhow};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{Instrument, instrument};

use crate::classify;
use crate::progress;

pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024;
pub const DEFAULT_MAX_CONCURRENT: usize = 100;

/// Error type for sort operations that preserves operation summary even on failure.
///
/// The Display implementation shows the full error chain.
#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    #[source]
    pub source: anyhow::Error,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(source: anyhow::Error, summary: Summary) -> Self {
        Error { source, summary }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Settings {
    /// Size of each read/write while copying a file
    pub chunk_size: u64,
    /// Give up on a single file after this long (`None` = wait forever)
    pub file_timeout: Option<std::time::Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            file_timeout: None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub files_copied: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub bytes_copied: u64,
    pub directories_failed: usize,
}

impl Summary {
    #[must_use]
    pub fn total_processed(&self) -> usize {
        self.files_copied + self.files_failed + self.files_skipped
    }
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            files_copied: self.files_copied + other.files_copied,
            files_failed: self.files_failed + other.files_failed,
            files_skipped: self.files_skipped + other.files_skipped,
            bytes_copied: self.bytes_copied + other.bytes_copied,
            directories_failed: self.directories_failed + other.directories_failed,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "files copied: {}\n\
            errors: {}\n\
            skipped: {}\n\
            total processed: {}\n\
            bytes copied: {}\n\
            unreadable directories: {}",
            self.files_copied,
            self.files_failed,
            self.files_skipped,
            self.total_processed(),
            bytesize::ByteSize(self.bytes_copied),
            self.directories_failed,
        )
    }
}

/// A single file to be copied into `<destination root>/<extension key>/<file name>`.
#[derive(Debug, Clone)]
pub struct CopyTask {
    pub src: std::path::PathBuf,
    pub key: classify::ExtensionKey,
    pub dst: std::path::PathBuf,
}

impl CopyTask {
    pub fn new(src: std::path::PathBuf, dst_root: &std::path::Path) -> anyhow::Result<Self> {
        let file_name = src
            .file_name()
            .with_context(|| format!("source {:?} does not have a file name", &src))?;
        let key = classify::extension_key(&src);
        let dst = dst_root.join(&key).join(file_name);
        Ok(Self { src, key, dst })
    }
}

/// Identity of a filesystem object: recognizes the destination directory while walking the source
/// and sources that already are their own destination.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    #[must_use]
    pub fn of(metadata: &std::fs::Metadata) -> Self {
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }
}

/// Result of walking a source tree.
#[derive(Debug, Default)]
pub struct Walk {
    pub files: Vec<std::path::PathBuf>,
    pub skipped: usize,
    pub directories_failed: usize,
}

/// Collect all regular files under `src`.
///
/// Symlinks are never followed; they and other special files are counted as skipped.
/// Subdirectories that cannot be read are logged and counted, failing to read `src` itself is an
/// error. The directory identified by `exclude` is not descended into.
#[instrument(skip(prog_track))]
pub async fn walk(
    prog_track: &'static progress::Progress,
    src: &std::path::Path,
    exclude: Option<FileId>,
) -> anyhow::Result<Walk> {
    let mut walk = Walk::default();
    let mut pending = vec![src.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let _ops_guard = prog_track.ops.guard();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if dir == src => {
                return Err(error)
                    .with_context(|| format!("cannot open directory {:?} for reading", &dir));
            }
            Err(error) => {
                tracing::error!("cannot open directory {:?} for reading: {}", &dir, &error);
                walk.directories_failed += 1;
                continue;
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(error) => {
                    tracing::error!("failed traversing directory {:?}: {}", &dir, &error);
                    walk.directories_failed += 1;
                    break;
                }
            };
            // the ops-throttle never blocks on anything we hold, so it's safe to wait here
            throttle::get_ops_token().await;
            let entry_path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(error) => {
                    tracing::error!("failed reading file type of {:?}: {}", &entry_path, &error);
                    prog_track.files_skipped.inc();
                    walk.skipped += 1;
                    continue;
                }
            };
            if file_type.is_dir() {
                if let Some(exclude) = exclude {
                    let is_excluded = tokio::fs::symlink_metadata(&entry_path)
                        .await
                        .map(|metadata| FileId::of(&metadata) == exclude)
                        .unwrap_or(false);
                    if is_excluded {
                        tracing::info!("not descending into destination {:?}", &entry_path);
                        continue;
                    }
                }
                pending.push(entry_path);
            } else if file_type.is_file() {
                walk.files.push(entry_path);
            } else {
                tracing::debug!(
                    "skipping {:?}, not a regular file: {:?}",
                    &entry_path,
                    file_type
                );
                prog_track.files_skipped.inc();
                walk.skipped += 1;
            }
        }
    }
    Ok(walk)
}

async fn with_timeout<T, F>(timeout: Option<std::time::Duration>, fut: F) -> anyhow::Result<T>
where
    F: std::future::Future<Output = anyhow::Result<T>>,
{
    match timeout {
        None => fut.await,
        Some(timeout) => tokio::time::timeout(timeout, fut).await.map_err(|_| {
            anyhow!(
                "timed out after {}",
                humantime::format_duration(timeout)
            )
        })?,
    }
}

#[instrument(skip(prog_track))]
async fn copy_file(
    prog_track: &'static progress::Progress,
    task: &CopyTask,
    chunk_size: u64,
) -> anyhow::Result<u64> {
    let dst_dir = task
        .dst
        .parent()
        .with_context(|| format!("destination {:?} has no parent", &task.dst))?;
    // concurrent tasks race to create the same folder, create_dir_all tolerates that
    tokio::fs::create_dir_all(dst_dir)
        .await
        .with_context(|| format!("cannot create directory {:?}", dst_dir))?;
    tracing::debug!("opening 'src' for reading and 'dst' for writing");
    let mut reader = tokio::fs::File::open(&task.src)
        .await
        .with_context(|| format!("cannot open {:?} for reading", &task.src))?;
    let src_metadata = reader
        .metadata()
        .await
        .with_context(|| format!("failed reading metadata from {:?}", &task.src))?;
    let src_size = src_metadata.len();
    let in_place = tokio::fs::metadata(&task.dst)
        .await
        .is_ok_and(|dst_metadata| FileId::of(&dst_metadata) == FileId::of(&src_metadata));
    if in_place {
        // opening dst with truncate would wipe the source
        tracing::info!("{:?} is already in place", &task.src);
        return Ok(0);
    }
    throttle::get_file_iops_tokens(chunk_size, src_size).await;
    let mut writer = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&task.dst)
        .await
        .with_context(|| format!("cannot open {:?} for writing", &task.dst))?;
    let buffer_size = usize::try_from(chunk_size)
        .with_context(|| format!("chunk size {chunk_size} does not fit in memory"))?;
    let mut buffer = vec![0u8; buffer_size];
    let mut bytes_copied = 0;
    loop {
        let read = reader
            .read(&mut buffer)
            .await
            .with_context(|| format!("failed reading from {:?}", &task.src))?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..read])
            .await
            .with_context(|| format!("failed writing to {:?}", &task.dst))?;
        bytes_copied += read as u64;
        prog_track.bytes_copied.add(read as u64);
    }
    writer
        .flush()
        .await
        .with_context(|| format!("failed flushing {:?}", &task.dst))?;
    Ok(bytes_copied)
}

/// Copy one file into its extension folder.
///
/// Never fails: the outcome is reported in the returned summary (exactly one file copied or
/// failed) and failures are logged together with the source path.
#[instrument(skip(prog_track))]
pub async fn sort_file(
    prog_track: &'static progress::Progress,
    task: &CopyTask,
    settings: &Settings,
) -> Summary {
    let _ops_guard = prog_track.ops.guard();
    let copy = copy_file(prog_track, task, settings.chunk_size);
    match with_timeout(settings.file_timeout, copy).await {
        Ok(bytes_copied) => {
            prog_track.files_copied.inc();
            Summary {
                files_copied: 1,
                bytes_copied,
                ..Default::default()
            }
        }
        Err(error) => {
            tracing::error!(
                "copy: {:?} -> {:?} ({}) failed with: {:#}",
                &task.src,
                &task.dst,
                &task.key,
                &error
            );
            prog_track.files_failed.inc();
            Summary {
                files_failed: 1,
                ..Default::default()
            }
        }
    }
}

/// Group tasks sharing a destination, keeping the discovery order within and across groups.
fn group_by_destination(tasks: Vec<CopyTask>) -> Vec<Vec<CopyTask>> {
    let mut index: std::collections::HashMap<std::path::PathBuf, usize> = std::collections::HashMap::new();
    let mut groups: Vec<Vec<CopyTask>> = vec![];
    for task in tasks {
        match index.get(&task.dst) {
            Some(&idx) => groups[idx].push(task),
            None => {
                index.insert(task.dst.clone(), groups.len());
                groups.push(vec![task]);
            }
        }
    }
    groups
}

/// Run all tasks, at most `limiter.capacity()` at a time, and wait for every one of them.
///
/// Tasks with the same destination are copied one after another in the given order, so the last
/// of them ends up in the destination.
#[instrument(skip(prog_track, tasks, limiter))]
pub async fn dispatch(
    prog_track: &'static progress::Progress,
    tasks: Vec<CopyTask>,
    settings: &Settings,
    limiter: &throttle::Limiter,
) -> Summary {
    let groups = group_by_destination(tasks);
    tracing::debug!(
        "dispatching {} destinations, up to {} at a time",
        groups.len(),
        limiter.capacity()
    );
    let mut join_set = tokio::task::JoinSet::new();
    let mut group_sizes = std::collections::HashMap::new();
    for group in groups {
        // admission happens before spawning so that pending tasks don't pile up in the runtime
        let permit = limiter.acquire().await;
        let settings = *settings;
        let group_size = group.len();
        let do_copy = async move {
            let _permit = permit;
            let mut summary = Summary::default();
            for task in &group {
                summary = summary + sort_file(prog_track, task, &settings).await;
            }
            summary
        };
        let handle = join_set.spawn(do_copy.in_current_span());
        group_sizes.insert(handle.id(), group_size);
    }
    let mut summary = Summary::default();
    while let Some(res) = join_set.join_next().await {
        match res {
            Ok(group_summary) => summary = summary + group_summary,
            Err(error) => {
                // outcomes of the whole group are lost, count all of its files as failed
                let failed = group_sizes.get(&error.id()).copied().unwrap_or(1);
                tracing::error!("copy task failed to complete: {}", &error);
                prog_track.files_failed.add(failed as u64);
                summary.files_failed += failed;
            }
        }
    }
    summary
}

/// Sort every regular file under `src` into `dst/<extension key>/`.
///
/// Returns an error only if the run cannot start: `src` is missing or not a directory, or `dst`
/// cannot be created. Individual file failures are counted in the summary.
#[instrument(skip(prog_track, limiter))]
pub async fn sort(
    prog_track: &'static progress::Progress,
    src: &std::path::Path,
    dst: &std::path::Path,
    settings: &Settings,
    limiter: &throttle::Limiter,
) -> Result<Summary, Error> {
    if settings.chunk_size == 0 {
        return Err(Error::new(
            anyhow!("chunk size must be greater than zero"),
            Default::default(),
        ));
    }
    let src_metadata = match tokio::fs::metadata(src).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::new(
                anyhow!("source folder does not exist: {:?}", src),
                Default::default(),
            ));
        }
        Err(error) => {
            return Err(Error::new(
                anyhow::Error::new(error)
                    .context(format!("failed reading metadata from src: {:?}", src)),
                Default::default(),
            ));
        }
    };
    if !src_metadata.is_dir() {
        return Err(Error::new(
            anyhow!("source {:?} is not a directory", src),
            Default::default(),
        ));
    }
    tokio::fs::create_dir_all(dst)
        .await
        .with_context(|| format!("cannot create destination directory {:?}", dst))
        .map_err(|err| Error::new(err, Default::default()))?;
    let dst_metadata = tokio::fs::metadata(dst)
        .await
        .with_context(|| format!("failed reading metadata from dst: {:?}", dst))
        .map_err(|err| Error::new(err, Default::default()))?;
    let walk = walk(prog_track, src, Some(FileId::of(&dst_metadata)))
        .await
        .map_err(|err| Error::new(err, Default::default()))?;
    tracing::info!(
        "found {} files to sort, {} entries skipped",
        walk.files.len(),
        walk.skipped
    );
    let mut summary = Summary {
        files_skipped: walk.skipped,
        directories_failed: walk.directories_failed,
        ..Default::default()
    };
    let mut tasks = Vec::with_capacity(walk.files.len());
    for path in walk.files {
        match CopyTask::new(path, dst) {
            Ok(task) => tasks.push(task),
            Err(error) => {
                tracing::error!("{:#}", &error);
                prog_track.files_failed.inc();
                summary.files_failed += 1;
            }
        }
    }
    Ok(summary + dispatch(prog_track, tasks, settings, limiter).await)
}
