use serde::{Deserialize, Serialize};

/// MIME sentinel for directories and entries of unknown type.
pub const DIRECTORY_MIME: &str = "directory";

/// Non-fatal result of a volume operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    NotFound,
    Failed,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::NotFound => Outcome::NotFound,
            Outcome::Failed => Outcome::Failed,
        }
    }
}

/// Access flags reported on every stat record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub locked: bool,
    pub hidden: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
            locked: false,
            hidden: false,
        }
    }
}

/// Metadata record handed to the host. `None` fields are metadata the
/// backend could not provide.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stat {
    pub name: String,
    pub size: Option<u64>,
    pub ts: Option<i64>,
    pub mime: String,
    #[serde(flatten)]
    pub perms: Permissions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Stat {
    pub fn directory(name: impl Into<String>, perms: Permissions) -> Self {
        Self {
            name: name.into(),
            size: Some(0),
            ts: Some(chrono::Utc::now().timestamp()),
            mime: DIRECTORY_MIME.to_string(),
            perms,
            dirs: None,
            width: None,
            height: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mime == DIRECTORY_MIME
    }

    pub fn is_image(&self) -> bool {
        self.mime.to_ascii_lowercase().starts_with("image")
    }
}

/// Geometry and mode of a resize request, as sent by the host.
#[derive(Debug, Clone, Deserialize)]
pub struct ResizeRequest {
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub bg: String,
    #[serde(default)]
    pub degree: i32,
    pub quality: Option<u8>,
}

fn default_mode() -> String {
    "resize".to_string()
}

impl Default for ResizeRequest {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            x: 0,
            y: 0,
            mode: default_mode(),
            bg: String::new(),
            degree: 0,
            quality: None,
        }
    }
}
