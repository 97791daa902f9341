use crate::error::VolumeError;
use crate::models::{Outcome, ResizeRequest, Stat};
use crate::storage_backend::ByteStream;
use crate::volume_driver::VolumeDriver;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use bytes::Bytes;
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the HTTP connector.
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error(transparent)]
    Volume(#[from] VolumeError),
    #[error("File not found")]
    NotFound,
    #[error("Unable to {0}")]
    Failed(&'static str),
}

impl ResponseError for ConnectorError {
    fn status_code(&self) -> StatusCode {
        match self {
            ConnectorError::NotFound => StatusCode::NOT_FOUND,
            ConnectorError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ConnectorError::Volume(VolumeError::Path(_)) => StatusCode::BAD_REQUEST,
            ConnectorError::Volume(VolumeError::PermissionDenied) => StatusCode::FORBIDDEN,
            ConnectorError::Volume(VolumeError::UnsupportedType) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ConnectorError::Volume(VolumeError::Storage(e)) if e.is_not_found() => {
                StatusCode::NOT_FOUND
            }
            ConnectorError::Volume(VolumeError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;

fn settle<T>(outcome: Outcome<T>, action: &'static str) -> ConnectorResult<T> {
    match outcome {
        Outcome::Success(value) => Ok(value),
        Outcome::NotFound => Err(ConnectorError::NotFound),
        Outcome::Failed => Err(ConnectorError::Failed(action)),
    }
}

/// Connector state shared by all request handlers.
#[derive(Clone)]
pub struct Server {
    volume: Arc<dyn VolumeDriver>,
}

impl Server {
    pub fn new(volume: Box<dyn VolumeDriver>) -> Self {
        Self {
            volume: Arc::from(volume),
        }
    }

    pub async fn stat(&self, path: &str) -> ConnectorResult<Stat> {
        settle(self.volume.stat(path).await?, "stat")
    }

    pub async fn list(&self, path: &str) -> ConnectorResult<Vec<String>> {
        let entries = self.volume.scandir(path).await?;
        tracing::debug!("Listing {:?}: {} entries", path, entries.len());
        Ok(entries)
    }

    pub async fn open(&self, path: &str) -> ConnectorResult<ByteStream> {
        Ok(self.volume.open(path).await?)
    }

    pub async fn upload(&self, path: &str, body: Bytes) -> ConnectorResult<String> {
        let dir = self.volume.dirname(path)?;
        let name = self.volume.basename(path)?;
        let stream: ByteStream = Box::new(Cursor::new(body));
        settle(self.volume.save(stream, &dir, &name).await?, "save")
    }

    pub async fn mkdir(&self, dir: &str, name: &str) -> ConnectorResult<String> {
        settle(self.volume.mkdir(dir, name).await?, "create directory")
    }

    pub async fn mkfile(&self, dir: &str, name: &str) -> ConnectorResult<String> {
        settle(self.volume.mkfile(dir, name).await?, "create file")
    }

    pub async fn copy(&self, source: &str, dst: &str, name: Option<&str>) -> ConnectorResult<String> {
        let name = self.target_name(source, name)?;
        settle(self.volume.copy(source, dst, &name).await?, "copy")
    }

    pub async fn rename(&self, source: &str, dst: &str, name: Option<&str>) -> ConnectorResult<String> {
        let name = self.target_name(source, name)?;
        settle(self.volume.rename(source, dst, &name).await?, "move")
    }

    pub async fn unlink(&self, path: &str) -> ConnectorResult<()> {
        settle(self.volume.unlink(path).await?, "delete")
    }

    pub async fn rmdir(&self, path: &str) -> ConnectorResult<()> {
        settle(self.volume.rmdir(path).await?, "remove directory")
    }

    pub async fn resize(&self, path: &str, request: &ResizeRequest) -> ConnectorResult<Stat> {
        settle(self.volume.resize(path, request).await?, "resize")
    }

    pub async fn thumbnail(&self, path: &str) -> ConnectorResult<Bytes> {
        settle(self.volume.thumbnail(path).await?, "create thumbnail")
    }

    pub async fn dimensions(&self, path: &str) -> ConnectorResult<Option<String>> {
        let stat = self.stat(path).await?;
        Ok(self.volume.dimensions(path, &stat.mime).await?)
    }

    fn target_name(&self, source: &str, name: Option<&str>) -> ConnectorResult<String> {
        match name {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => Ok(self.volume.basename(source)?),
        }
    }
}
