//! Local File System Abstraction
//!
//! The sync engine writes two trees: downloaded objects (appended to chunk by
//! chunk) and audit batches (written whole). Both go through
//! [`FileSystemAccess`] so tests can run against a temporary directory.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File system access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn store_chunk(fs: &dyn FileSystemAccess, root: &Path, data: Bytes) -> Result<()> {
///     let target = root.join("job").join("photos/a.jpg");
///     fs.create_dir_all(target.parent().unwrap()).await?;
///     fs.append_file(&target, data).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating or truncating it
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Append data to an existing file or create it
    async fn append_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Resolve `path` against the current working directory without touching
    /// the file system.
    fn absolute_path(&self, path: &Path) -> Result<PathBuf>;
}
