use anyhow::{Context, anyhow};
use async_recursion::async_recursion;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::instrument;

use crate::progress;

/// Extensions picked from when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "txt", "csv", "pdf", "doc", "mp4", "jpg", "jpeg", "png", "mp3", "xml",
];

const NAME_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const TEXT_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 ";
const NAME_LENGTH: usize = 8;

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

#[derive(Debug, Clone)]
pub struct Settings {
    /// Number of directory levels that receive files, the deepest level's folders stay empty
    pub depth: usize,
    /// Files created in each directory
    pub num_files: usize,
    /// Subfolders created in each directory
    pub num_folders: usize,
    /// Number of random characters written to each file
    pub content_length: usize,
    /// Extensions (without the leading dot) assigned to files at random
    pub extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            depth: 3,
            num_files: 4,
            num_folders: 2,
            content_length: 50,
            extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub files_created: usize,
    pub directories_created: usize,
    pub bytes_written: u64,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            files_created: self.files_created + other.files_created,
            directories_created: self.directories_created + other.directories_created,
            bytes_written: self.bytes_written + other.bytes_written,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "files created: {}\n\
            directories created: {}\n\
            bytes written: {}",
            self.files_created,
            self.directories_created,
            bytesize::ByteSize(self.bytes_written)
        )
    }
}

fn random_string(rng: &mut impl Rng, charset: &[u8], length: usize) -> String {
    (0..length)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

#[instrument(skip(prog_track, contents))]
async fn write_file(
    prog_track: &'static progress::Progress,
    path: std::path::PathBuf,
    contents: String,
) -> Result<Summary, Error> {
    let _ops_guard = prog_track.ops.guard();
    tokio::fs::write(&path, contents.as_bytes())
        .await
        .with_context(|| format!("Error writing to {:?}", &path))
        .map_err(|err| Error::new(err, Default::default()))?;
    prog_track.files_created.inc();
    Ok(Summary {
        files_created: 1,
        bytes_written: contents.len() as u64,
        ..Default::default()
    })
}

/// Fill `root` with a random tree: `num_files` files and `num_folders` folders per level,
/// recursing into each folder while `depth` levels remain.
#[async_recursion]
#[instrument(skip(prog_track))]
pub async fn filegen(
    prog_track: &'static progress::Progress,
    root: &std::path::Path,
    settings: &Settings,
    depth: usize,
) -> Result<Summary, Error> {
    if depth == 0 {
        return Ok(Summary::default());
    }
    if settings.num_files > 0 && settings.extensions.is_empty() {
        return Err(Error::new(
            anyhow!("at least one file extension is required to generate files"),
            Default::default(),
        ));
    }
    // make sure rng falls out of scope before any await
    let (files, folders) = {
        let mut rng = rand::thread_rng();
        let files = (0..settings.num_files)
            .map(|_| {
                let name = random_string(&mut rng, NAME_CHARS, NAME_LENGTH);
                let ext = settings
                    .extensions
                    .choose(&mut rng)
                    .map(String::as_str)
                    .unwrap_or_default();
                let contents = random_string(&mut rng, TEXT_CHARS, settings.content_length);
                (root.join(format!("{name}.{ext}")), contents)
            })
            .collect::<Vec<_>>();
        let folders = (0..settings.num_folders)
            .map(|_| root.join(random_string(&mut rng, NAME_CHARS, NAME_LENGTH)))
            .collect::<Vec<_>>();
        (files, folders)
    };
    let mut join_set = tokio::task::JoinSet::new();
    for (path, contents) in files {
        // it's better to await the token here so that we throttle how many tasks we spawn
        throttle::get_ops_token().await;
        join_set.spawn(write_file(prog_track, path, contents));
    }
    for path in folders {
        let settings = settings.clone();
        let recurse = || async move {
            tokio::fs::create_dir_all(&path)
                .await
                .with_context(|| format!("Error creating directory {:?}", &path))
                .map_err(|err| Error::new(err, Default::default()))?;
            prog_track.directories_created.inc();
            let dir_summary = Summary {
                directories_created: 1,
                ..Default::default()
            };
            let recurse_summary = filegen(prog_track, &path, &settings, depth - 1).await?;
            Ok(dir_summary + recurse_summary)
        };
        join_set.spawn(recurse());
    }
    let mut success = true;
    let mut filegen_summary = Summary::default();
    while let Some(res) = join_set.join_next().await {
        match res.map_err(|err| Error::new(anyhow::Error::msg(err), filegen_summary))? {
            Ok(summary) => filegen_summary = filegen_summary + summary,
            Err(error) => {
                tracing::error!("filegen: {:?} failed with: {:#}", root, &error);
                filegen_summary = filegen_summary + error.summary;
                success = false;
            }
        }
    }
    if !success {
        return Err(Error::new(
            anyhow!("filegen: {:?} failed!", &root),
            filegen_summary,
        ));
    }
    Ok(filegen_summary)
}

#[cfg(test)]
mod tests {
    use crate::testutils;
    use tracing_test::traced_test;

    use super::*;

    static PROGRESS: std::sync::LazyLock<progress::Progress> =
        std::sync::LazyLock::new(progress::Progress::new);

    #[tokio::test]
    #[traced_test]
    async fn test_nested_filegen() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let test_path = tmp_dir.as_path();
        let settings = Settings {
            depth: 2,
            num_files: 3,
            num_folders: 2,
            content_length: 20,
            ..Default::default()
        };
        let summary = filegen(&PROGRESS, test_path, &settings, settings.depth).await?;
        // files: 3 (root) + 3×2 (level 1), level 2 folders stay empty
        // directories: 2 (level 1) + 2×2 (level 2)
        assert_eq!(summary.files_created, 9);
        assert_eq!(summary.directories_created, 6);
        assert_eq!(summary.bytes_written, 9 * 20);
        let files = testutils::snapshot(test_path).await?;
        assert_eq!(files.len(), 9);
        for (path, contents) in &files {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            let (stem, ext) = name.split_once('.').unwrap();
            assert_eq!(stem.len(), NAME_LENGTH);
            assert!(stem.bytes().all(|c| c.is_ascii_alphanumeric()));
            assert!(DEFAULT_EXTENSIONS.contains(&ext));
            assert_eq!(contents.len(), 20);
            assert!(
                contents
                    .iter()
                    .all(|c| c.is_ascii_alphanumeric() || *c == b' ')
            );
        }
        tokio::fs::remove_dir_all(test_path).await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn test_zero_depth() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let summary = filegen(&PROGRESS, &tmp_dir, &Settings::default(), 0).await?;
        assert_eq!(summary, Summary::default());
        let mut entries = tokio::fs::read_dir(&tmp_dir).await?;
        assert!(entries.next_entry().await?.is_none());
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn test_custom_extensions() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let settings = Settings {
            depth: 1,
            num_files: 10,
            num_folders: 0,
            content_length: 0,
            extensions: vec!["log".to_string()],
        };
        let summary = filegen(&PROGRESS, &tmp_dir, &settings, settings.depth).await?;
        assert_eq!(summary.files_created, 10);
        assert_eq!(summary.directories_created, 0);
        assert_eq!(summary.bytes_written, 0);
        let files = testutils::snapshot(&tmp_dir).await?;
        assert!(
            files
                .keys()
                .all(|path| path.extension().is_some_and(|ext| ext == "log"))
        );
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_extensions() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let settings = Settings {
            extensions: vec![],
            ..Default::default()
        };
        assert!(filegen(&PROGRESS, &tmp_dir, &settings, 1).await.is_err());
        Ok(())
    }
}
