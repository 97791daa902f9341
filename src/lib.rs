//! Object-store volume driver for a web file manager.
//!
//! [`volume::ObjectVolume`] implements the host's [`volume_driver::VolumeDriver`]
//! contract on top of any [`storage_backend::StorageClient`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod image_processor;
pub mod local_backend;
pub mod memory_backend;
pub mod models;
pub mod paths;
pub mod server;
pub mod storage_backend;
pub mod thumbnails;
pub mod volume;
pub mod volume_driver;
pub mod webdav_backend;

pub use config::VolumeOptions;
pub use error::{ConfigError, PathError, StorageError, VolumeError};
pub use models::{Outcome, Stat};
pub use storage_backend::StorageClient;
pub use volume::ObjectVolume;
pub use volume_driver::VolumeDriver;
