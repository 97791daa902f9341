use crate::image_processor::ImageManager;
use crate::models::Permissions;
use crate::storage_backend::{StorageClient, Visibility};
use crate::thumbnails::CacheMode;
use std::sync::Arc;

pub const DEFAULT_TMB_SIZE: u32 = 48;

/// Mount-time options of an object volume.
#[derive(Clone)]
pub struct VolumeOptions {
    /// Storage client the volume delegates to. Mounting fails without one.
    pub storage: Option<Arc<dyn StorageClient>>,
    /// Root path inside the store. Missing or empty means `/`.
    pub path: Option<String>,
    pub alias: String,
    pub image_manager: Option<ImageManager>,
    pub cache: CacheMode,
    /// Report whether directories have sub-directories. Costs one listing
    /// per directory stat.
    pub check_subfolders: bool,
    pub visibility: Option<Visibility>,
    pub defaults: Permissions,
    /// Refused commands: `put`, `upload`, `mkdir`, `mkfile`, `copy`,
    /// `rename`, `rm` or `resize`.
    pub disabled_commands: Vec<String>,
    pub tmb_size: u32,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            storage: None,
            path: None,
            alias: "Home".to_string(),
            image_manager: None,
            cache: CacheMode::Disabled,
            check_subfolders: false,
            visibility: None,
            defaults: Permissions::default(),
            disabled_commands: Vec::new(),
            tmb_size: DEFAULT_TMB_SIZE,
        }
    }
}

impl VolumeOptions {
    pub fn new(storage: Arc<dyn StorageClient>) -> Self {
        Self {
            storage: Some(storage),
            ..Self::default()
        }
    }

    pub fn command_disabled(&self, command: &str) -> bool {
        self.disabled_commands.iter().any(|c| c == command)
    }
}
