use crate::error::StorageError;
use crate::storage_backend::{
    child_path, guess_mime, ByteStream, FileEntry, StorageClient, StorageResult, WriteOptions,
    OCTET_STREAM,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::UNIX_EPOCH;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Storage client backed by a directory on the local disk.
#[derive(Clone)]
pub struct LocalFileSystem {
    base_path: PathBuf,
}

impl LocalFileSystem {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    async fn ensure_parent(&self, full_path: &Path) -> io::Result<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn entry_from_metadata(parent: &str, name: String, metadata: &std::fs::Metadata) -> FileEntry {
        FileEntry {
            path: child_path(parent, &name),
            name,
            is_dir: metadata.is_dir(),
            size: metadata.is_file().then(|| metadata.len()),
            modified_time: modified_secs(metadata),
        }
    }

    fn collect<'a>(
        &'a self,
        path: &'a str,
        recursive: bool,
        entries: &'a mut Vec<FileEntry>,
    ) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut dir = fs::read_dir(self.resolve_path(path)).await?;
            while let Some(entry) = dir.next_entry().await? {
                let metadata = entry.metadata().await?;
                let name = entry.file_name().to_string_lossy().into_owned();
                let file_entry = Self::entry_from_metadata(path, name, &metadata);

                let sub_path = (recursive && file_entry.is_dir).then(|| file_entry.path.clone());
                entries.push(file_entry);

                if let Some(sub_path) = sub_path {
                    self.collect(&sub_path, true, entries).await?;
                }
            }
            Ok(())
        })
    }
}

fn modified_secs(metadata: &std::fs::Metadata) -> Option<i64> {
    metadata
        .modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs() as i64)
}

#[async_trait]
impl StorageClient for LocalFileSystem {
    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(fs::try_exists(self.resolve_path(path)).await?)
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        let contents = fs::read(self.resolve_path(path)).await?;
        Ok(Bytes::from(contents))
    }

    async fn read_stream(&self, path: &str) -> StorageResult<ByteStream> {
        let file = File::open(self.resolve_path(path)).await?;
        Ok(Box::new(file))
    }

    async fn write(&self, path: &str, contents: Bytes, _opts: &WriteOptions) -> StorageResult<()> {
        let full_path = self.resolve_path(path);
        self.ensure_parent(&full_path).await?;
        fs::write(full_path, contents).await?;
        Ok(())
    }

    async fn write_stream(
        &self,
        path: &str,
        mut stream: ByteStream,
        _opts: &WriteOptions,
    ) -> StorageResult<()> {
        let full_path = self.resolve_path(path);
        self.ensure_parent(&full_path).await?;

        let mut writer = File::create(&full_path).await?;
        tokio::io::copy(&mut stream, &mut writer).await?;
        writer.flush().await?;
        writer.sync_all().await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        fs::remove_file(self.resolve_path(path)).await?;
        Ok(())
    }

    async fn delete_directory(&self, path: &str) -> StorageResult<()> {
        fs::remove_dir_all(self.resolve_path(path)).await?;
        Ok(())
    }

    async fn create_directory(&self, path: &str) -> StorageResult<()> {
        fs::create_dir_all(self.resolve_path(path)).await?;
        Ok(())
    }

    async fn copy(&self, source: &str, destination: &str) -> StorageResult<()> {
        let target = self.resolve_path(destination);
        self.ensure_parent(&target).await?;
        fs::copy(self.resolve_path(source), target).await?;
        Ok(())
    }

    async fn move_object(&self, source: &str, destination: &str) -> StorageResult<()> {
        let target = self.resolve_path(destination);
        self.ensure_parent(&target).await?;
        fs::rename(self.resolve_path(source), target).await?;
        Ok(())
    }

    async fn list_contents(&self, path: &str, recursive: bool) -> StorageResult<Vec<FileEntry>> {
        let mut entries = Vec::new();
        self.collect(path, recursive, &mut entries).await?;
        Ok(entries)
    }

    async fn last_modified(&self, path: &str) -> StorageResult<i64> {
        let metadata = fs::metadata(self.resolve_path(path)).await?;
        modified_secs(&metadata).ok_or_else(|| StorageError::metadata("last modified", path))
    }

    async fn file_size(&self, path: &str) -> StorageResult<u64> {
        let metadata = fs::metadata(self.resolve_path(path)).await?;
        if metadata.is_dir() {
            return Ok(0);
        }
        Ok(metadata.len())
    }

    async fn mime_type(&self, path: &str) -> StorageResult<String> {
        let metadata = fs::metadata(self.resolve_path(path)).await?;
        if metadata.is_dir() {
            return Err(StorageError::metadata("mime type", path));
        }
        Ok(guess_mime(path).unwrap_or_else(|| OCTET_STREAM.to_string()))
    }
}
