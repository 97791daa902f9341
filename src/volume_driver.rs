use crate::error::VolumeResult;
use crate::models::{Outcome, ResizeRequest, Stat};
use crate::storage_backend::ByteStream;
use async_trait::async_trait;
use bytes::Bytes;

/// Operations a file-manager host calls on a mounted volume.
///
/// Paths are relative to the store root. `Err` is reserved for conditions
/// that abort the request (bad paths, permission and type checks, listing
/// failures); expected absence and declined writes come back as
/// [`Outcome::NotFound`] and [`Outcome::Failed`].
#[async_trait]
pub trait VolumeDriver: Send + Sync {
    /// Display name of the volume root
    fn alias(&self) -> &str;

    /// Normalized root path inside the store
    fn root(&self) -> &str;

    fn dirname(&self, path: &str) -> VolumeResult<String>;
    fn basename(&self, path: &str) -> VolumeResult<String>;
    fn join_path(&self, dir: &str, name: &str) -> VolumeResult<String>;
    fn in_path(&self, path: &str, parent: &str) -> VolumeResult<bool>;
    /// Path as shown to the user, prefixed with the alias
    fn display_path(&self, path: &str) -> VolumeResult<String>;

    async fn stat(&self, path: &str) -> VolumeResult<Outcome<Stat>>;
    async fn subdirs(&self, path: &str) -> VolumeResult<bool>;
    async fn dimensions(&self, path: &str, mime: &str) -> VolumeResult<Option<String>>;
    async fn scandir(&self, path: &str) -> VolumeResult<Vec<String>>;
    async fn dir_exists(&self, path: &str) -> VolumeResult<bool>;

    async fn open(&self, path: &str) -> VolumeResult<ByteStream>;
    async fn get_contents(&self, path: &str) -> VolumeResult<Bytes>;
    async fn put_contents(&self, path: &str, contents: Bytes) -> VolumeResult<Outcome<()>>;
    async fn save(&self, stream: ByteStream, dir: &str, name: &str) -> VolumeResult<Outcome<String>>;

    async fn mkdir(&self, dir: &str, name: &str) -> VolumeResult<Outcome<String>>;
    async fn mkfile(&self, dir: &str, name: &str) -> VolumeResult<Outcome<String>>;
    async fn copy(&self, source: &str, target_dir: &str, name: &str) -> VolumeResult<Outcome<String>>;
    async fn rename(&self, source: &str, target_dir: &str, name: &str) -> VolumeResult<Outcome<String>>;
    async fn unlink(&self, path: &str) -> VolumeResult<Outcome<()>>;
    async fn rmdir(&self, path: &str) -> VolumeResult<Outcome<()>>;

    async fn resize(&self, path: &str, request: &ResizeRequest) -> VolumeResult<Outcome<Stat>>;
    async fn thumbnail(&self, path: &str) -> VolumeResult<Outcome<Bytes>>;

    async fn symlink(&self, _source: &str, _target_dir: &str, _name: &str) -> Outcome<String> {
        Outcome::Failed
    }

    async fn extract(&self, _path: &str) -> Outcome<String> {
        Outcome::Failed
    }

    async fn archive(&self, _dir: &str, _files: &[String], _name: &str) -> Outcome<String> {
        Outcome::Failed
    }

    async fn chmod(&self, _path: &str, _mode: &str) -> Outcome<()> {
        Outcome::Failed
    }
}
