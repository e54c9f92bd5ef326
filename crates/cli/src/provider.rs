//! A provider backed by a directory of files named by node id.

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use appfuse::{FileProvider, ProviderError};

/// Serves node `N` from the regular file `<root>/N`.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        if !fs::metadata(root)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_of(&self, node: u64) -> PathBuf {
        self.root.join(node.to_string())
    }

    fn open(&self, node: u64) -> Result<File, ProviderError> {
        File::open(self.path_of(node)).map_err(|e| not_found_or(node, e))
    }
}

fn not_found_or(node: u64, err: io::Error) -> ProviderError {
    if err.kind() == io::ErrorKind::NotFound {
        ProviderError::NotFound(node)
    } else {
        ProviderError::Io(err)
    }
}

impl FileProvider for DirectoryProvider {
    fn size_of(&self, node: u64) -> Result<u64, ProviderError> {
        let metadata = fs::metadata(self.path_of(node)).map_err(|e| not_found_or(node, e))?;
        if !metadata.is_file() {
            return Err(ProviderError::NotFound(node));
        }
        Ok(metadata.len())
    }

    fn read_range(&self, node: u64, offset: u64, len: u32) -> Result<Vec<u8>, ProviderError> {
        let file = self.open(node)?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populated() -> (TempDir, DirectoryProvider) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("42"), (0..100).collect::<Vec<u8>>()).unwrap();
        fs::create_dir(dir.path().join("7")).unwrap();
        let provider = DirectoryProvider::new(dir.path()).unwrap();
        (dir, provider)
    }

    #[test]
    fn size_of_regular_file() {
        let (_dir, provider) = populated();
        assert_eq!(provider.size_of(42).unwrap(), 100);
    }

    #[test]
    fn missing_and_non_regular_nodes_not_found() {
        let (_dir, provider) = populated();
        assert!(matches!(provider.size_of(43), Err(ProviderError::NotFound(43))));
        assert!(matches!(provider.size_of(7), Err(ProviderError::NotFound(7))));
    }

    #[test]
    fn read_range_exact() {
        let (_dir, provider) = populated();
        assert_eq!(provider.read_range(42, 90, 10).unwrap(), (90..100).collect::<Vec<u8>>());
    }

    #[test]
    fn read_past_end_fails() {
        let (_dir, provider) = populated();
        assert!(matches!(
            provider.read_range(42, 95, 10),
            Err(ProviderError::Io(_))
        ));
    }

    #[test]
    fn root_must_be_directory() {
        let (dir, _provider) = populated();
        assert!(DirectoryProvider::new(dir.path().join("42")).is_err());
        assert!(DirectoryProvider::new(dir.path().join("nope")).is_err());
    }
}
