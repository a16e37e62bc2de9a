/// Folder name used for files without an extension.
pub const NO_EXTENSION: &str = "no_ext";

/// Name of the destination subfolder a file is sorted into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtensionKey(String);

impl ExtensionKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExtensionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<std::path::Path> for ExtensionKey {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(self.as_str())
    }
}

/// Derive the extension key of `path`: lower-cased text after the last dot of the file name.
///
/// A dot-file without any other dot (e.g. `.gitignore`) has no extension, same as a name ending
/// with a dot. Both map to [`NO_EXTENSION`].
#[must_use]
pub fn extension_key(path: &std::path::Path) -> ExtensionKey {
    match path.extension() {
        Some(ext) if !ext.is_empty() => ExtensionKey(ext.to_string_lossy().to_lowercase()),
        _ => ExtensionKey(NO_EXTENSION.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> String {
        extension_key(std::path::Path::new(path)).to_string()
    }

    #[test]
    fn lower_cases_extension() {
        assert_eq!(key("report.CSV"), "csv");
        assert_eq!(key("/data/photos/IMG_0001.JpEg"), "jpeg");
    }

    #[test]
    fn uses_last_suffix() {
        assert_eq!(key("archive.tar.gz"), "gz");
        assert_eq!(key("some.dir/notes.txt"), "txt");
    }

    #[test]
    fn missing_extension() {
        assert_eq!(key("README"), NO_EXTENSION);
        assert_eq!(key("trailing."), NO_EXTENSION);
        assert_eq!(key("some.dir/Makefile"), NO_EXTENSION);
        assert_eq!(key("/"), NO_EXTENSION);
    }

    #[test]
    fn dot_files_have_no_extension() {
        assert_eq!(key(".gitignore"), NO_EXTENSION);
        assert_eq!(key(".config.toml"), "toml");
    }
}
