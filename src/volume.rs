use crate::config::VolumeOptions;
use crate::error::{ConfigError, PathError, StorageError, VolumeError, VolumeResult};
use crate::image_processor::{Geometry, ImageManager, ResizeMode};
use crate::models::{Outcome, ResizeRequest, Stat, DIRECTORY_MIME};
use crate::paths;
use crate::storage_backend::{guess_mime, ByteStream, StorageClient, WriteOptions};
use crate::thumbnails::{self, ThumbnailStore};
use crate::volume_driver::VolumeDriver;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Volume backed by a [`StorageClient`].
pub struct ObjectVolume {
    fs: Arc<dyn StorageClient>,
    root: String,
    images: ImageManager,
    thumbnails: Option<Box<dyn ThumbnailStore>>,
    options: VolumeOptions,
}

impl ObjectVolume {
    pub fn mount(options: VolumeOptions) -> Result<Self, ConfigError> {
        let fs = options.storage.clone().ok_or(ConfigError::MissingStorage)?;

        let root = match options.path.as_deref() {
            None | Some("") => "/",
            Some(path) => path,
        };
        let root = paths::normalize(root)?;

        let images = options.image_manager.clone().unwrap_or_default();
        let thumbnails = thumbnails::store_for(options.cache);

        tracing::info!(
            "Mounted volume {:?} at root {:?} (cache: {:?}, subfolder checks: {})",
            options.alias,
            root,
            options.cache,
            options.check_subfolders
        );

        Ok(Self {
            fs,
            root,
            images,
            thumbnails,
            options,
        })
    }

    /// Normalizes `path` and keeps it inside the volume root.
    fn resolve(&self, path: &str) -> VolumeResult<String> {
        let path = paths::normalize(path)?;
        if !paths::is_within(&path, &self.root) {
            return Err(PathError::OutsideRoot(path).into());
        }
        Ok(path)
    }

    /// Refuses `command` when it is disabled, or when it writes and the
    /// volume is read-only.
    fn require(&self, command: &str, write: bool) -> VolumeResult<()> {
        if self.options.command_disabled(command) {
            tracing::debug!("Command {} is disabled", command);
            return Err(VolumeError::PermissionDenied);
        }
        if write && !self.options.defaults.write {
            tracing::debug!("Refusing {} on a read-only volume", command);
            return Err(VolumeError::PermissionDenied);
        }
        Ok(())
    }

    fn require_unlocked(&self) -> VolumeResult<()> {
        if self.options.defaults.locked {
            return Err(VolumeError::PermissionDenied);
        }
        Ok(())
    }

    /// Joins a leaf `name` onto `dir`. The name must be a single segment.
    fn target(&self, dir: &str, name: &str) -> VolumeResult<String> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(PathError::InvalidName(name.to_string()).into());
        }
        self.resolve(&format!("{}/{}", dir, name))
    }

    /// Drops cached thumbnails at or below `path` once it changed.
    fn forget<T>(&self, path: &str, outcome: &Outcome<T>) {
        if !outcome.is_success() {
            return;
        }
        if let Some(store) = &self.thumbnails {
            store.remove(path);
        }
    }

    fn write_options(&self, path: &str) -> WriteOptions {
        WriteOptions {
            mime_type: guess_mime(path),
            visibility: self.options.visibility,
        }
    }

    /// Folds a client result into an outcome, logging what went wrong.
    fn settle<T>(&self, op: &str, path: &str, result: Result<T, StorageError>) -> Outcome<T> {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} {}: not found", op, path);
                Outcome::NotFound
            }
            Err(e) => {
                tracing::warn!("{} {} failed: {}", op, path, e);
                Outcome::Failed
            }
        }
    }

    async fn live_stat(&self, path: &str) -> Stat {
        let mut stat = Stat::directory(paths::basename(path), self.options.defaults);

        stat.ts = self.fs.last_modified(path).await.ok();
        stat.size = self.fs.file_size(path).await.ok();
        stat.mime = match self.fs.mime_type(path).await {
            Ok(mime) => mime,
            Err(e) => {
                tracing::debug!("No mime type for {}: {}", path, e);
                DIRECTORY_MIME.to_string()
            }
        };
        stat
    }

    async fn stat_inner(&self, path: &str) -> Outcome<Stat> {
        let mut stat = if path == self.root {
            Stat::directory(self.options.alias.clone(), self.options.defaults)
        } else {
            let exists = match self.fs.exists(path).await {
                Ok(exists) => exists,
                Err(e) => {
                    tracing::warn!("exists {} failed: {}", path, e);
                    false
                }
            };

            if exists {
                self.live_stat(path).await
            } else if self.dir_exists_inner(path).await {
                Stat::directory(paths::basename(path), self.options.defaults)
            } else {
                return Outcome::NotFound;
            }
        };

        if self.options.check_subfolders && stat.is_dir() {
            stat.dirs = Some(self.subdirs_inner(path).await);
        }
        Outcome::Success(stat)
    }

    async fn subdirs_inner(&self, path: &str) -> bool {
        match self.fs.list_contents(path, false).await {
            Ok(entries) => entries.iter().any(|e| e.is_dir),
            Err(e) => {
                tracing::debug!("Listing {} failed: {}", path, e);
                false
            }
        }
    }

    /// Object stores have directories that only exist as key prefixes, so
    /// look for `path` in its parent's listing.
    async fn dir_exists_inner(&self, path: &str) -> bool {
        let dir = paths::dirname(path);
        match self.fs.list_contents(dir, false).await {
            Ok(entries) => entries.iter().any(|e| !e.is_file() && e.path == path),
            Err(e) => {
                tracing::debug!("Listing {} failed: {}", dir, e);
                false
            }
        }
    }

    async fn resize_inner(&self, path: &str, request: &ResizeRequest) -> VolumeResult<Outcome<Stat>> {
        self.require("resize", true)?;

        let stat = match self.stat_inner(path).await {
            Outcome::Success(stat) => stat,
            _ => return Ok(Outcome::NotFound),
        };
        if !stat.perms.read || !stat.perms.write {
            return Err(VolumeError::PermissionDenied);
        }
        if stat.is_dir() || !stat.is_image() {
            return Err(VolumeError::UnsupportedType);
        }

        let contents = match self.fs.read(path).await {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!("resize: reading {} failed: {}", path, e);
                return Ok(Outcome::Failed);
            }
        };

        let geometry = Geometry {
            width: request.width,
            height: request.height,
            x: request.x,
            y: request.y,
            degree: request.degree,
        };
        let transformed = self.images.make(&contents).and_then(|mut picture| {
            picture.apply(ResizeMode::parse(&request.mode), &geometry)?;
            let encoded = picture.encode(request.quality)?;
            Ok((picture, encoded))
        });
        let (picture, encoded) = match transformed {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("resize {} failed: {}", path, e);
                return Ok(Outcome::Failed);
            }
        };

        let opts = WriteOptions {
            mime_type: Some(picture.mime()),
            visibility: self.options.visibility,
        };
        if let Err(e) = self.fs.write(path, Bytes::from(encoded), &opts).await {
            tracing::warn!("resize: writing {} failed: {}", path, e);
            return Ok(Outcome::Failed);
        }

        if let Some(store) = &self.thumbnails {
            store.remove(path);
        }

        Ok(self.stat_inner(path).await.map(|mut stat| {
            stat.width = Some(picture.width());
            stat.height = Some(picture.height());
            stat
        }))
    }
}

#[async_trait]
impl VolumeDriver for ObjectVolume {
    fn alias(&self) -> &str {
        &self.options.alias
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn dirname(&self, path: &str) -> VolumeResult<String> {
        let path = self.resolve(path)?;
        Ok(paths::dirname(&path).to_string())
    }

    fn basename(&self, path: &str) -> VolumeResult<String> {
        let path = self.resolve(path)?;
        Ok(paths::basename(&path).to_string())
    }

    fn join_path(&self, dir: &str, name: &str) -> VolumeResult<String> {
        self.target(dir, name)
    }

    fn in_path(&self, path: &str, parent: &str) -> VolumeResult<bool> {
        let path = self.resolve(path)?;
        let parent = self.resolve(parent)?;
        Ok(paths::is_within(&path, &parent))
    }

    fn display_path(&self, path: &str) -> VolumeResult<String> {
        let path = self.resolve(path)?;
        let rel = path[self.root.len()..].trim_start_matches('/');
        if rel.is_empty() {
            Ok(self.options.alias.clone())
        } else {
            Ok(format!("{}/{}", self.options.alias, rel))
        }
    }

    async fn stat(&self, path: &str) -> VolumeResult<Outcome<Stat>> {
        let path = self.resolve(path)?;
        Ok(self.stat_inner(&path).await)
    }

    async fn subdirs(&self, path: &str) -> VolumeResult<bool> {
        let path = self.resolve(path)?;
        Ok(self.subdirs_inner(&path).await)
    }

    async fn dimensions(&self, path: &str, mime: &str) -> VolumeResult<Option<String>> {
        let path = self.resolve(path)?;
        if !mime.is_empty() && !mime.to_ascii_lowercase().starts_with("image") {
            return Ok(None);
        }
        Ok(match self.fs.read(&path).await {
            Ok(contents) => self.images.dimensions(&contents),
            Err(e) => {
                tracing::debug!("dimensions: reading {} failed: {}", path, e);
                None
            }
        })
    }

    async fn scandir(&self, path: &str) -> VolumeResult<Vec<String>> {
        let path = self.resolve(path)?;
        let entries = self.fs.list_contents(&path, false).await?;
        Ok(entries.into_iter().map(|e| e.path).collect())
    }

    async fn dir_exists(&self, path: &str) -> VolumeResult<bool> {
        let path = self.resolve(path)?;
        Ok(self.dir_exists_inner(&path).await)
    }

    async fn open(&self, path: &str) -> VolumeResult<ByteStream> {
        let path = self.resolve(path)?;
        Ok(self.fs.read_stream(&path).await?)
    }

    async fn get_contents(&self, path: &str) -> VolumeResult<Bytes> {
        let path = self.resolve(path)?;
        Ok(self.fs.read(&path).await?)
    }

    async fn put_contents(&self, path: &str, contents: Bytes) -> VolumeResult<Outcome<()>> {
        self.require("put", true)?;
        let path = self.resolve(path)?;
        let opts = self.write_options(&path);
        let result = self.fs.write(&path, contents, &opts).await;
        let outcome = self.settle("write", &path, result);
        self.forget(&path, &outcome);
        Ok(outcome)
    }

    async fn save(&self, stream: ByteStream, dir: &str, name: &str) -> VolumeResult<Outcome<String>> {
        self.require("upload", true)?;
        let path = self.target(dir, name)?;
        let opts = self.write_options(&path);
        let result = self.fs.write_stream(&path, stream, &opts).await;
        let outcome = self.settle("save", &path, result);
        self.forget(&path, &outcome);
        Ok(outcome.map(|_| path))
    }

    async fn mkdir(&self, dir: &str, name: &str) -> VolumeResult<Outcome<String>> {
        self.require("mkdir", true)?;
        let path = self.target(dir, name)?;
        let result = self.fs.create_directory(&path).await;
        Ok(self.settle("mkdir", &path, result).map(|_| path))
    }

    async fn mkfile(&self, dir: &str, name: &str) -> VolumeResult<Outcome<String>> {
        self.require("mkfile", true)?;
        let path = self.target(dir, name)?;
        let opts = self.write_options(&path);
        let result = self.fs.write(&path, Bytes::new(), &opts).await;
        let outcome = self.settle("mkfile", &path, result);
        self.forget(&path, &outcome);
        Ok(outcome.map(|_| path))
    }

    async fn copy(&self, source: &str, target_dir: &str, name: &str) -> VolumeResult<Outcome<String>> {
        self.require("copy", true)?;
        let source = self.resolve(source)?;
        let path = self.target(target_dir, name)?;
        let result = self.fs.copy(&source, &path).await;
        let outcome = self.settle("copy", &source, result);
        self.forget(&path, &outcome);
        Ok(outcome.map(|_| path))
    }

    async fn rename(&self, source: &str, target_dir: &str, name: &str) -> VolumeResult<Outcome<String>> {
        self.require("rename", true)?;
        self.require_unlocked()?;
        let source = self.resolve(source)?;
        let path = self.target(target_dir, name)?;
        let result = self.fs.move_object(&source, &path).await;
        let outcome = self.settle("move", &source, result);
        self.forget(&source, &outcome);
        self.forget(&path, &outcome);
        Ok(outcome.map(|_| path))
    }

    async fn unlink(&self, path: &str) -> VolumeResult<Outcome<()>> {
        self.require("rm", true)?;
        self.require_unlocked()?;
        let path = self.resolve(path)?;
        let result = self.fs.delete(&path).await;
        let outcome = self.settle("delete", &path, result);
        self.forget(&path, &outcome);
        Ok(outcome)
    }

    async fn rmdir(&self, path: &str) -> VolumeResult<Outcome<()>> {
        self.require("rm", true)?;
        self.require_unlocked()?;
        let path = self.resolve(path)?;
        if path == self.root {
            tracing::warn!("Refusing to remove the volume root");
            return Ok(Outcome::Failed);
        }
        let result = self.fs.delete_directory(&path).await;
        let outcome = self.settle("rmdir", &path, result);
        self.forget(&path, &outcome);
        Ok(outcome)
    }

    async fn resize(&self, path: &str, request: &ResizeRequest) -> VolumeResult<Outcome<Stat>> {
        let path = self.resolve(path)?;
        self.resize_inner(&path, request).await
    }

    async fn thumbnail(&self, path: &str) -> VolumeResult<Outcome<Bytes>> {
        let path = self.resolve(path)?;
        if let Some(cached) = self.thumbnails.as_ref().and_then(|store| store.get(&path)) {
            return Ok(Outcome::Success(cached));
        }

        let contents = match self.settle("thumbnail", &path, self.fs.read(&path).await) {
            Outcome::Success(contents) => contents,
            Outcome::NotFound => return Ok(Outcome::NotFound),
            Outcome::Failed => return Ok(Outcome::Failed),
        };
        let tmb = match self
            .images
            .make(&contents)
            .and_then(|picture| picture.thumbnail(self.options.tmb_size))
        {
            Ok(tmb) => Bytes::from(tmb),
            Err(e) => {
                tracing::debug!("No thumbnail for {}: {}", path, e);
                return Ok(Outcome::Failed);
            }
        };

        if let Some(store) = &self.thumbnails {
            store.put(&path, tmb.clone());
        }
        Ok(Outcome::Success(tmb))
    }
}
