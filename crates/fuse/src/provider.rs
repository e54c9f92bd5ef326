//! The capability that supplies file sizes and contents.

use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("node {0} not found")]
    NotFound(u64),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of file data behind the filesystem.
///
/// Calls may be slow or fail; the engine maps every failure to a protocol
/// error and never retries.
pub trait FileProvider {
    /// Returns the byte length of `node`.
    fn size_of(&self, node: u64) -> Result<u64, ProviderError>;

    /// Returns up to `len` bytes of `node` starting at `offset`.
    ///
    /// The engine only asks for ranges inside the last reported size and
    /// treats a reply of any other length as an I/O error.
    fn read_range(&self, node: u64, offset: u64, len: u32) -> Result<Vec<u8>, ProviderError>;
}

impl<P: FileProvider + ?Sized> FileProvider for &P {
    fn size_of(&self, node: u64) -> Result<u64, ProviderError> {
        (**self).size_of(node)
    }

    fn read_range(&self, node: u64, offset: u64, len: u32) -> Result<Vec<u8>, ProviderError> {
        (**self).read_range(node, offset, len)
    }
}

impl<P: FileProvider + ?Sized> FileProvider for Arc<P> {
    fn size_of(&self, node: u64) -> Result<u64, ProviderError> {
        (**self).size_of(node)
    }

    fn read_range(&self, node: u64, offset: u64, len: u32) -> Result<Vec<u8>, ProviderError> {
        (**self).read_range(node, offset, len)
    }
}

/// Serves files held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    files: HashMap<u64, Vec<u8>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, node: u64, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(node, contents);
        self
    }

    pub fn insert(&mut self, node: u64, contents: impl Into<Vec<u8>>) {
        self.files.insert(node, contents.into());
    }
}

impl FileProvider for MemoryProvider {
    fn size_of(&self, node: u64) -> Result<u64, ProviderError> {
        self.files
            .get(&node)
            .map(|f| f.len() as u64)
            .ok_or(ProviderError::NotFound(node))
    }

    fn read_range(&self, node: u64, offset: u64, len: u32) -> Result<Vec<u8>, ProviderError> {
        let file = self.files.get(&node).ok_or(ProviderError::NotFound(node))?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(file.len());
        let end = start.saturating_add(len as usize).min(file.len());
        Ok(file[start..end].to_vec())
    }
}
