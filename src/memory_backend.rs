use crate::error::StorageError;
use crate::paths;
use crate::storage_backend::{
    guess_mime, ByteStream, FileEntry, StorageClient, StorageResult, WriteOptions, OCTET_STREAM,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Cursor;
use tokio::io::AsyncReadExt;

#[derive(Debug, Clone)]
struct Object {
    data: Bytes,
    mime_type: Option<String>,
    modified: i64,
    is_marker: bool,
}

/// In-process object store with S3 style keys.
///
/// Only objects exist. A directory is either an explicit marker created by
/// `create_directory` or an implicit prefix of some object key, in which case
/// `exists` reports false for it.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Object>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&self, path: &str, data: Bytes, opts: &WriteOptions) {
        let object = Object {
            data,
            mime_type: opts.mime_type.clone().or_else(|| guess_mime(path)),
            modified: chrono::Utc::now().timestamp(),
            is_marker: false,
        };
        self.objects.write().insert(path.to_string(), object);
    }

    fn get(&self, path: &str) -> StorageResult<Object> {
        self.objects
            .read()
            .get(path)
            .filter(|o| !o.is_marker)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn prefix(path: &str) -> String {
        if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        }
    }

    /// Keys at or below `path`, markers included.
    fn keys_under(&self, path: &str) -> Vec<String> {
        let prefix = Self::prefix(path);
        self.objects
            .read()
            .keys()
            .filter(|k| k.as_str() == path || k.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StorageClient for MemoryStore {
    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.objects.read().contains_key(path))
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        Ok(self.get(path)?.data)
    }

    async fn read_stream(&self, path: &str) -> StorageResult<ByteStream> {
        let data = self.get(path)?.data;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn write(&self, path: &str, contents: Bytes, opts: &WriteOptions) -> StorageResult<()> {
        self.put(path, contents, opts);
        Ok(())
    }

    async fn write_stream(
        &self,
        path: &str,
        mut stream: ByteStream,
        opts: &WriteOptions,
    ) -> StorageResult<()> {
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;
        self.put(path, Bytes::from(buffer), opts);
        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        self.objects
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn delete_directory(&self, path: &str) -> StorageResult<()> {
        let keys = self.keys_under(path);
        let mut objects = self.objects.write();
        for key in keys {
            objects.remove(&key);
        }
        Ok(())
    }

    async fn create_directory(&self, path: &str) -> StorageResult<()> {
        let marker = Object {
            data: Bytes::new(),
            mime_type: None,
            modified: chrono::Utc::now().timestamp(),
            is_marker: true,
        };
        self.objects.write().insert(path.to_string(), marker);
        Ok(())
    }

    async fn copy(&self, source: &str, destination: &str) -> StorageResult<()> {
        let mut object = self.get(source)?;
        object.modified = chrono::Utc::now().timestamp();
        self.objects.write().insert(destination.to_string(), object);
        Ok(())
    }

    async fn move_object(&self, source: &str, destination: &str) -> StorageResult<()> {
        let mut objects = self.objects.write();
        let object = objects
            .remove(source)
            .ok_or_else(|| StorageError::NotFound(source.to_string()))?;
        objects.insert(destination.to_string(), object);
        Ok(())
    }

    async fn list_contents(&self, path: &str, recursive: bool) -> StorageResult<Vec<FileEntry>> {
        let prefix = Self::prefix(path);
        let objects = self.objects.read();
        let mut entries: BTreeMap<String, FileEntry> = BTreeMap::new();

        for (key, object) in objects.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            if rest.is_empty() {
                continue;
            }

            // Every intermediate prefix is a directory in its own right.
            let segments: Vec<&str> = rest.split('/').collect();
            let depth = if recursive { segments.len() } else { 1 };
            for i in 0..depth.min(segments.len()) {
                let sub = format!("{}{}", prefix, segments[..=i].join("/"));
                let is_leaf = i + 1 == segments.len();
                let is_dir = !is_leaf || object.is_marker;
                entries.entry(sub.clone()).or_insert_with(|| FileEntry {
                    name: paths::basename(&sub).to_string(),
                    path: sub.clone(),
                    is_dir,
                    size: (!is_dir).then(|| object.data.len() as u64),
                    modified_time: (!is_dir).then_some(object.modified),
                });
            }
        }

        Ok(entries.into_values().collect())
    }

    async fn last_modified(&self, path: &str) -> StorageResult<i64> {
        self.objects
            .read()
            .get(path)
            .map(|o| o.modified)
            .ok_or_else(|| StorageError::metadata("last modified", path))
    }

    async fn file_size(&self, path: &str) -> StorageResult<u64> {
        self.objects
            .read()
            .get(path)
            .map(|o| o.data.len() as u64)
            .ok_or_else(|| StorageError::metadata("file size", path))
    }

    async fn mime_type(&self, path: &str) -> StorageResult<String> {
        self.objects
            .read()
            .get(path)
            .filter(|o| !o.is_marker)
            .map(|o| o.mime_type.clone().unwrap_or_else(|| OCTET_STREAM.to_string()))
            .ok_or_else(|| StorageError::metadata("mime type", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let opts = WriteOptions::default();
        store.write("a.txt", Bytes::from_static(b"1"), &opts).await.unwrap();
        store.write("photos/2024/x.jpg", Bytes::from_static(b"22"), &opts).await.unwrap();
        store.write("photos/y.png", Bytes::from_static(b"333"), &opts).await.unwrap();
        store
    }

    #[tokio::test]
    async fn implicit_directories_are_listed_but_do_not_exist() {
        let store = seeded().await;

        let root = store.list_contents("", false).await.unwrap();
        let names: Vec<_> = root.iter().map(|e| (e.path.as_str(), e.is_dir)).collect();
        assert_eq!(names, vec![("a.txt", false), ("photos", true)]);

        assert!(!store.exists("photos").await.unwrap());
        assert!(store.exists("a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn listing_is_scoped_to_the_prefix() {
        let store = seeded().await;
        store.write("photosynthesis.txt", Bytes::new(), &WriteOptions::default()).await.unwrap();

        let photos = store.list_contents("photos", false).await.unwrap();
        let paths: Vec<_> = photos.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["photos/2024", "photos/y.png"]);

        let deep = store.list_contents("photos", true).await.unwrap();
        assert_eq!(deep.len(), 3);
    }

    #[tokio::test]
    async fn markers_count_as_directories() {
        let store = MemoryStore::new();
        store.create_directory("empty").await.unwrap();
        let root = store.list_contents("", false).await.unwrap();
        assert_eq!(root.len(), 1);
        assert!(root[0].is_dir);
        assert!(store.read("empty").await.is_err());
    }

    #[tokio::test]
    async fn delete_directory_removes_everything_below() {
        let store = seeded().await;
        store.delete_directory("photos").await.unwrap();
        let root = store.list_contents("", false).await.unwrap();
        assert_eq!(root.len(), 1);
    }

    #[tokio::test]
    async fn mime_type_comes_from_write_options_first() {
        let store = MemoryStore::new();
        let opts = WriteOptions {
            mime_type: Some("application/x-custom".to_string()),
            visibility: None,
        };
        store.write("blob.txt", Bytes::new(), &opts).await.unwrap();
        assert_eq!(store.mime_type("blob.txt").await.unwrap(), "application/x-custom");
    }
}
