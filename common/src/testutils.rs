use anyhow::Context;

pub async fn create_temp_dir() -> anyhow::Result<std::path::PathBuf> {
    let mut idx = 0;
    loop {
        let tmp_dir = std::env::temp_dir().join(format!("rsort_test{}", &idx));
        if let Err(error) = tokio::fs::create_dir(&tmp_dir).await {
            match error.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    idx += 1;
                }
                _ => return Err(error.into()),
            }
        } else {
            return Ok(tmp_dir);
        }
    }
}

/// Total size of the regular files created by [`setup_test_dir`].
pub const TEST_TREE_BYTES: u64 = 32;

pub async fn setup_test_dir() -> anyhow::Result<std::path::PathBuf> {
    let tmp_dir = create_temp_dir().await?;
    // foo
    // |- 0.txt
    // |- report.CSV
    // |- .gitignore
    // |- bar
    //    |- 1.txt
    //    |- archive.tar.gz
    //    |- README
    // |- baz
    //    |- 2.txt
    //    |- photo.JPG
    //    |- link.txt -> ../bar/1.txt
    //    |- bar -> (absolute path) .../foo/bar
    let foo_path = tmp_dir.join("foo");
    tokio::fs::create_dir(&foo_path).await?;
    tokio::fs::write(foo_path.join("0.txt"), "0").await?;
    tokio::fs::write(foo_path.join("report.CSV"), "a,b\n1,2\n").await?;
    tokio::fs::write(foo_path.join(".gitignore"), "target/").await?;
    let bar_path = foo_path.join("bar");
    tokio::fs::create_dir(&bar_path).await?;
    tokio::fs::write(bar_path.join("1.txt"), "1").await?;
    tokio::fs::write(bar_path.join("archive.tar.gz"), "gzip").await?;
    tokio::fs::write(bar_path.join("README"), "readme").await?;
    let baz_path = foo_path.join("baz");
    tokio::fs::create_dir(&baz_path).await?;
    tokio::fs::write(baz_path.join("2.txt"), "2").await?;
    tokio::fs::write(baz_path.join("photo.JPG"), "jpeg").await?;
    tokio::fs::symlink("../bar/1.txt", baz_path.join("link.txt")).await?;
    tokio::fs::symlink(&bar_path, baz_path.join("bar")).await?;
    Ok(tmp_dir)
}

/// Contents of every regular file under `root`, keyed by path relative to `root`.
pub async fn snapshot(
    root: &std::path::Path,
) -> anyhow::Result<std::collections::BTreeMap<std::path::PathBuf, Vec<u8>>> {
    let mut files = std::collections::BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("cannot read directory {:?}", &dir))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let contents = tokio::fs::read(&path).await?;
                files.insert(path.strip_prefix(root)?.to_path_buf(), contents);
            }
        }
    }
    Ok(files)
}
