use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

/// MIME type of files whose type cannot be told from the name.
pub const OCTET_STREAM: &str = "application/octet-stream";

pub type StorageResult<T> = Result<T, StorageError>;

/// Readable object body handed out by a storage client.
pub type ByteStream = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: Option<u64>,
    pub modified_time: Option<i64>,
}

impl FileEntry {
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// Hints passed along with a write. Backends ignore what they cannot store.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub mime_type: Option<String>,
    pub visibility: Option<Visibility>,
}

/// Uniform object-store capability consumed by the volume.
///
/// All paths are normalized and relative to the store root; `""` is the root.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// True for files, and for directories the backend tracks explicitly
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Read a whole object
    async fn read(&self, path: &str) -> StorageResult<Bytes>;

    /// Open an object for reading, returns a stream
    async fn read_stream(&self, path: &str) -> StorageResult<ByteStream>;

    /// Create or overwrite an object
    async fn write(&self, path: &str, contents: Bytes, opts: &WriteOptions) -> StorageResult<()>;

    async fn write_stream(
        &self,
        path: &str,
        stream: ByteStream,
        opts: &WriteOptions,
    ) -> StorageResult<()>;

    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// Remove a directory and everything below it
    async fn delete_directory(&self, path: &str) -> StorageResult<()>;

    async fn create_directory(&self, path: &str) -> StorageResult<()>;

    async fn copy(&self, source: &str, destination: &str) -> StorageResult<()>;

    async fn move_object(&self, source: &str, destination: &str) -> StorageResult<()>;

    /// List entries below `path`, immediate children only unless `recursive`
    async fn list_contents(&self, path: &str, recursive: bool) -> StorageResult<Vec<FileEntry>>;

    /// Unix timestamp of the last modification
    async fn last_modified(&self, path: &str) -> StorageResult<i64>;

    async fn file_size(&self, path: &str) -> StorageResult<u64>;

    async fn mime_type(&self, path: &str) -> StorageResult<String>;
}

/// Joins a listed child name onto its parent store path.
pub(crate) fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// MIME type guessed from the extension of `path`.
pub fn guess_mime(path: &str) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
}
