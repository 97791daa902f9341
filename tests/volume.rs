use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageOutputFormat, RgbImage};
use objstore_volume::error::StorageError;
use objstore_volume::local_backend::LocalFileSystem;
use objstore_volume::memory_backend::MemoryStore;
use objstore_volume::models::{ResizeRequest, DIRECTORY_MIME};
use objstore_volume::storage_backend::{ByteStream, FileEntry, StorageResult, WriteOptions};
use objstore_volume::thumbnails::CacheMode;
use objstore_volume::{
    ObjectVolume, Outcome, PathError, StorageClient, VolumeDriver, VolumeError, VolumeOptions,
};
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

fn jpeg(width: u32, height: u32) -> Bytes {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut out, ImageOutputFormat::Jpeg(85))
        .unwrap();
    Bytes::from(out.into_inner())
}

fn memory_volume() -> (Arc<MemoryStore>, ObjectVolume) {
    let store = Arc::new(MemoryStore::new());
    let volume = ObjectVolume::mount(VolumeOptions::new(store.clone())).unwrap();
    (store, volume)
}

#[tokio::test]
async fn root_is_always_a_directory() {
    let (_, volume) = memory_volume();
    for root in ["", "/", "./"] {
        let stat = volume.stat(root).await.unwrap().success().unwrap();
        assert_eq!(stat.mime, DIRECTORY_MIME);
        assert_eq!(stat.size, Some(0));
        assert!(stat.perms.read && stat.perms.write);
    }
}

#[tokio::test]
async fn implicit_directory_stats_as_directory() {
    let (store, volume) = memory_volume();
    store
        .write("albums/2024/cover.jpg", jpeg(4, 4), &WriteOptions::default())
        .await
        .unwrap();

    assert!(!store.exists("albums").await.unwrap());
    let stat = volume.stat("albums").await.unwrap().success().unwrap();
    assert!(stat.is_dir());
    assert_eq!(stat.name, "albums");

    let nested = volume.stat("albums/2024").await.unwrap();
    assert!(nested.success().unwrap().is_dir());

    assert!(volume.dir_exists("albums").await.unwrap());
    assert!(!volume.dir_exists("albums/2024/cover.jpg").await.unwrap());
}

#[tokio::test]
async fn missing_entry_is_not_found() {
    let (_, volume) = memory_volume();
    assert_eq!(volume.stat("nothing/here").await.unwrap(), Outcome::NotFound);
}

#[tokio::test]
async fn traversal_aborts_before_the_client() {
    let (_, volume) = memory_volume();
    let err = volume.stat("../etc/passwd").await.unwrap_err();
    assert!(matches!(err, VolumeError::Path(PathError::OutsideRoot(_))));

    let err = volume.mkdir("", "bad\u{0000}name").await.unwrap_err();
    assert!(matches!(err, VolumeError::Path(PathError::Corrupted(_))));
}

#[tokio::test]
async fn save_then_read_round_trips() {
    let (store, volume) = memory_volume();
    let payload = Bytes::from_static(b"\x00\x01binary payload\xff");
    let stream: ByteStream = Box::new(Cursor::new(payload.clone()));

    let saved = volume.save(stream, "docs/./drafts", "blob.bin").await.unwrap();
    assert_eq!(saved, Outcome::Success("docs/drafts/blob.bin".to_string()));
    assert_eq!(volume.get_contents("docs/drafts/blob.bin").await.unwrap(), payload);

    let mut reader = volume.open("docs/drafts/blob.bin").await.unwrap();
    let mut streamed = Vec::new();
    reader.read_to_end(&mut streamed).await.unwrap();
    assert_eq!(streamed, payload.to_vec());

    assert_eq!(
        store.mime_type("docs/drafts/blob.bin").await.unwrap(),
        "application/octet-stream"
    );
}

#[tokio::test]
async fn save_picks_mime_from_extension() {
    let (store, volume) = memory_volume();
    let stream: ByteStream = Box::new(Cursor::new(Bytes::from_static(b"<p>hi</p>")));
    volume.save(stream, "", "Index.HTML").await.unwrap();
    assert_eq!(store.mime_type("Index.HTML").await.unwrap(), "text/html");
}

#[tokio::test]
async fn directory_operations() {
    let (_, volume) = memory_volume();
    assert_eq!(
        volume.mkdir("", "projects").await.unwrap(),
        Outcome::Success("projects".to_string())
    );
    assert_eq!(
        volume.mkfile("projects", "notes.md").await.unwrap(),
        Outcome::Success("projects/notes.md".to_string())
    );

    let notes = volume.stat("projects/notes.md").await.unwrap().success().unwrap();
    assert_eq!(notes.size, Some(0));
    assert_eq!(notes.mime, "text/markdown");

    let listing = volume.scandir("projects").await.unwrap();
    assert_eq!(listing, vec!["projects/notes.md".to_string()]);
    assert!(volume.subdirs("").await.unwrap());
    assert!(!volume.subdirs("projects").await.unwrap());

    assert_eq!(
        volume.copy("projects/notes.md", "archive", "notes-old.md").await.unwrap(),
        Outcome::Success("archive/notes-old.md".to_string())
    );
    assert_eq!(
        volume.rename("projects/notes.md", "projects", "todo.md").await.unwrap(),
        Outcome::Success("projects/todo.md".to_string())
    );
    assert_eq!(volume.stat("projects/notes.md").await.unwrap(), Outcome::NotFound);

    assert_eq!(volume.unlink("projects/todo.md").await.unwrap(), Outcome::Success(()));
    assert_eq!(volume.rmdir("archive").await.unwrap(), Outcome::Success(()));
    assert_eq!(volume.stat("archive").await.unwrap(), Outcome::NotFound);
}

#[tokio::test]
async fn copying_a_missing_source_is_not_found() {
    let (_, volume) = memory_volume();
    assert_eq!(volume.copy("ghost.txt", "", "copy.txt").await.unwrap(), Outcome::NotFound);
}

#[tokio::test]
async fn crop_resize_keeps_jpeg() {
    let (store, volume) = memory_volume();
    store.write("photo.jpg", jpeg(400, 300), &WriteOptions::default()).await.unwrap();

    let request = ResizeRequest {
        width: 100,
        height: 100,
        mode: "crop".to_string(),
        ..ResizeRequest::default()
    };
    let stat = volume.resize("photo.jpg", &request).await.unwrap().success().unwrap();
    assert_eq!((stat.width, stat.height), (Some(100), Some(100)));
    assert_eq!(stat.mime, "image/jpeg");

    let written = store.read("photo.jpg").await.unwrap();
    let decoded = image::load_from_memory(&written).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (100, 100));
    assert_eq!(image::guess_format(&written).unwrap(), image::ImageFormat::Jpeg);
}

#[tokio::test]
async fn resize_refuses_non_images_without_writing() {
    let (store, volume) = memory_volume();
    let original = Bytes::from_static(b"just some text");
    store.write("readme.txt", original.clone(), &WriteOptions::default()).await.unwrap();

    let request = ResizeRequest {
        width: 10,
        height: 10,
        ..ResizeRequest::default()
    };
    let err = volume.resize("readme.txt", &request).await.unwrap_err();
    assert!(matches!(err, VolumeError::UnsupportedType));
    assert_eq!(store.read("readme.txt").await.unwrap(), original);
}

#[tokio::test]
async fn resize_of_undecodable_image_fails_softly() {
    let (store, volume) = memory_volume();
    store
        .write("broken.png", Bytes::from_static(b"not a png"), &WriteOptions::default())
        .await
        .unwrap();
    let outcome = volume.resize("broken.png", &ResizeRequest::default()).await.unwrap();
    assert_eq!(outcome, Outcome::Failed);
    assert_eq!(volume.resize("gone.png", &ResizeRequest::default()).await.unwrap(), Outcome::NotFound);
}

#[tokio::test]
async fn resize_drops_the_cached_thumbnail() {
    let store = Arc::new(MemoryStore::new());
    let options = VolumeOptions {
        cache: CacheMode::Memory,
        ..VolumeOptions::new(store.clone())
    };
    let volume = ObjectVolume::mount(options).unwrap();
    store.write("pic.jpg", jpeg(200, 100), &WriteOptions::default()).await.unwrap();

    let first = volume.thumbnail("pic.jpg").await.unwrap().success().unwrap();
    let request = ResizeRequest {
        width: 20,
        height: 80,
        ..ResizeRequest::default()
    };
    volume.resize("pic.jpg", &request).await.unwrap().success().unwrap();

    let second = volume.thumbnail("pic.jpg").await.unwrap().success().unwrap();
    assert_ne!(first, second);
    let tmb = image::load_from_memory(&second).unwrap();
    assert_eq!((tmb.width(), tmb.height()), (12, 48));
}

#[tokio::test]
async fn writes_and_deletes_drop_cached_thumbnails() {
    let store = Arc::new(MemoryStore::new());
    let options = VolumeOptions {
        cache: CacheMode::Memory,
        ..VolumeOptions::new(store.clone())
    };
    let volume = ObjectVolume::mount(options).unwrap();
    store.write("pic.jpg", jpeg(200, 100), &WriteOptions::default()).await.unwrap();

    let wide = volume.thumbnail("pic.jpg").await.unwrap().success().unwrap();
    let tmb = image::load_from_memory(&wide).unwrap();
    assert_eq!((tmb.width(), tmb.height()), (48, 24));

    let stream: ByteStream = Box::new(Cursor::new(jpeg(100, 200)));
    volume.save(stream, "", "pic.jpg").await.unwrap().success().unwrap();
    let tall = volume.thumbnail("pic.jpg").await.unwrap().success().unwrap();
    let tmb = image::load_from_memory(&tall).unwrap();
    assert_eq!((tmb.width(), tmb.height()), (24, 48));

    volume.rename("pic.jpg", "", "moved.jpg").await.unwrap().success().unwrap();
    assert_eq!(volume.thumbnail("pic.jpg").await.unwrap(), Outcome::NotFound);
    volume.thumbnail("moved.jpg").await.unwrap().success().unwrap();

    volume.mkdir("", "album").await.unwrap().success().unwrap();
    volume.copy("moved.jpg", "album", "a.jpg").await.unwrap().success().unwrap();
    volume.thumbnail("album/a.jpg").await.unwrap().success().unwrap();
    volume.rmdir("album").await.unwrap().success().unwrap();
    assert_eq!(volume.thumbnail("album/a.jpg").await.unwrap(), Outcome::NotFound);

    volume.unlink("moved.jpg").await.unwrap().success().unwrap();
    assert_eq!(volume.thumbnail("moved.jpg").await.unwrap(), Outcome::NotFound);
}

#[tokio::test]
async fn dimensions_only_for_images() {
    let (store, volume) = memory_volume();
    store.write("a.jpg", jpeg(30, 20), &WriteOptions::default()).await.unwrap();
    assert_eq!(volume.dimensions("a.jpg", "image/jpeg").await.unwrap().as_deref(), Some("30x20"));
    assert_eq!(volume.dimensions("a.jpg", "text/plain").await.unwrap(), None);
}

/// Delegates to a memory store but never knows sizes or timestamps.
struct NoMetadata(MemoryStore);

#[async_trait]
impl StorageClient for NoMetadata {
    async fn exists(&self, path: &str) -> StorageResult<bool> {
        self.0.exists(path).await
    }
    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        self.0.read(path).await
    }
    async fn read_stream(&self, path: &str) -> StorageResult<ByteStream> {
        self.0.read_stream(path).await
    }
    async fn write(&self, path: &str, contents: Bytes, opts: &WriteOptions) -> StorageResult<()> {
        self.0.write(path, contents, opts).await
    }
    async fn write_stream(&self, path: &str, stream: ByteStream, opts: &WriteOptions) -> StorageResult<()> {
        self.0.write_stream(path, stream, opts).await
    }
    async fn delete(&self, path: &str) -> StorageResult<()> {
        self.0.delete(path).await
    }
    async fn delete_directory(&self, path: &str) -> StorageResult<()> {
        self.0.delete_directory(path).await
    }
    async fn create_directory(&self, path: &str) -> StorageResult<()> {
        self.0.create_directory(path).await
    }
    async fn copy(&self, source: &str, destination: &str) -> StorageResult<()> {
        self.0.copy(source, destination).await
    }
    async fn move_object(&self, source: &str, destination: &str) -> StorageResult<()> {
        self.0.move_object(source, destination).await
    }
    async fn list_contents(&self, path: &str, recursive: bool) -> StorageResult<Vec<FileEntry>> {
        self.0.list_contents(path, recursive).await
    }
    async fn last_modified(&self, path: &str) -> StorageResult<i64> {
        Err(StorageError::metadata("last modified", path))
    }
    async fn file_size(&self, path: &str) -> StorageResult<u64> {
        Err(StorageError::metadata("file size", path))
    }
    async fn mime_type(&self, path: &str) -> StorageResult<String> {
        self.0.mime_type(path).await
    }
}

#[tokio::test]
async fn unavailable_metadata_degrades_fields() {
    let store = Arc::new(NoMetadata(MemoryStore::new()));
    store.write("a.txt", Bytes::from_static(b"abc"), &WriteOptions::default()).await.unwrap();
    let volume = ObjectVolume::mount(VolumeOptions::new(store)).unwrap();

    let stat = volume.stat("a.txt").await.unwrap().success().unwrap();
    assert_eq!(stat.size, None);
    assert_eq!(stat.ts, None);
    assert_eq!(stat.mime, "text/plain");
}

#[tokio::test]
async fn works_over_the_local_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalFileSystem::new(dir.path().to_path_buf()));
    let options = VolumeOptions {
        path: Some("/site".to_string()),
        ..VolumeOptions::new(store)
    };
    let volume = ObjectVolume::mount(options).unwrap();

    assert!(volume.mkdir("", "site").await.unwrap().is_success());
    volume
        .put_contents("site/index.html", Bytes::from_static(b"<html></html>"))
        .await
        .unwrap();

    let root = volume.stat("site").await.unwrap().success().unwrap();
    assert_eq!(root.name, "Home");
    let page = volume.stat("site/index.html").await.unwrap().success().unwrap();
    assert_eq!(page.mime, "text/html");
    assert_eq!(page.size, Some(13));
    assert!(page.ts.is_some());

    assert!(matches!(
        volume.stat("elsewhere").await,
        Err(VolumeError::Path(PathError::OutsideRoot(_)))
    ));
    assert!(dir.path().join("site/index.html").exists());
}
