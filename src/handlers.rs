use crate::models::ResizeRequest;
use crate::server::Server;
use crate::storage_backend::ByteStream;
use actix_web::{web, HttpResponse, Result};
use bytes::Bytes;
use futures::Stream;
use serde::Deserialize;
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferQuery {
    pub dst: String,
    pub name: Option<String>,
}

fn body_stream(reader: ByteStream) -> impl Stream<Item = std::io::Result<Bytes>> {
    futures::stream::try_unfold(reader, |mut reader| async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok::<_, std::io::Error>(Some((Bytes::from(buf), reader)))
    })
}

pub async fn handle_stat(path: web::Path<String>, server: web::Data<Server>) -> Result<HttpResponse> {
    let stat = server.stat(&path).await?;
    Ok(HttpResponse::Ok().json(stat))
}

pub async fn handle_list(path: web::Path<String>, server: web::Data<Server>) -> Result<HttpResponse> {
    let entries = server.list(&path).await?;
    Ok(HttpResponse::Ok().json(entries))
}

pub async fn handle_download(
    path: web::Path<String>,
    server: web::Data<Server>,
) -> Result<HttpResponse> {
    let stat = server.stat(&path).await?;
    let reader = server.open(&path).await?;
    Ok(HttpResponse::Ok()
        .content_type(stat.mime)
        .streaming(body_stream(reader)))
}

pub async fn handle_upload(
    path: web::Path<String>,
    body: web::Bytes,
    server: web::Data<Server>,
) -> Result<HttpResponse> {
    let added = server.upload(&path, body).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "added": added })))
}

pub async fn handle_mkdir(
    path: web::Path<String>,
    query: web::Query<NameQuery>,
    server: web::Data<Server>,
) -> Result<HttpResponse> {
    let added = server.mkdir(&path, &query.name).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "added": added })))
}

pub async fn handle_mkfile(
    path: web::Path<String>,
    query: web::Query<NameQuery>,
    server: web::Data<Server>,
) -> Result<HttpResponse> {
    let added = server.mkfile(&path, &query.name).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "added": added })))
}

pub async fn handle_copy(
    path: web::Path<String>,
    query: web::Query<TransferQuery>,
    server: web::Data<Server>,
) -> Result<HttpResponse> {
    let added = server.copy(&path, &query.dst, query.name.as_deref()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "added": added })))
}

pub async fn handle_move(
    path: web::Path<String>,
    query: web::Query<TransferQuery>,
    server: web::Data<Server>,
) -> Result<HttpResponse> {
    let added = server.rename(&path, &query.dst, query.name.as_deref()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "added": added, "removed": path.as_str() })))
}

pub async fn handle_unlink(path: web::Path<String>, server: web::Data<Server>) -> Result<HttpResponse> {
    server.unlink(&path).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "removed": path.as_str() })))
}

pub async fn handle_rmdir(path: web::Path<String>, server: web::Data<Server>) -> Result<HttpResponse> {
    server.rmdir(&path).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "removed": path.as_str() })))
}

pub async fn handle_resize(
    path: web::Path<String>,
    request: web::Json<ResizeRequest>,
    server: web::Data<Server>,
) -> Result<HttpResponse> {
    let stat = server.resize(&path, &request).await?;
    Ok(HttpResponse::Ok().json(stat))
}

pub async fn handle_thumbnail(
    path: web::Path<String>,
    server: web::Data<Server>,
) -> Result<HttpResponse> {
    let tmb = server.thumbnail(&path).await?;
    Ok(HttpResponse::Ok().content_type("image/png").body(tmb))
}

pub async fn handle_dimensions(
    path: web::Path<String>,
    server: web::Data<Server>,
) -> Result<HttpResponse> {
    let dim = server.dimensions(&path).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "dim": dim })))
}

/// Registers the connector routes under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/stat/{path:.*}", web::get().to(handle_stat))
            .route("/ls/{path:.*}", web::get().to(handle_list))
            .route("/file/{path:.*}", web::get().to(handle_download))
            .route("/file/{path:.*}", web::put().to(handle_upload))
            .route("/file/{path:.*}", web::delete().to(handle_unlink))
            .route("/dir/{path:.*}", web::delete().to(handle_rmdir))
            .route("/mkdir/{path:.*}", web::post().to(handle_mkdir))
            .route("/mkfile/{path:.*}", web::post().to(handle_mkfile))
            .route("/copy/{path:.*}", web::post().to(handle_copy))
            .route("/move/{path:.*}", web::post().to(handle_move))
            .route("/resize/{path:.*}", web::post().to(handle_resize))
            .route("/tmb/{path:.*}", web::get().to(handle_thumbnail))
            .route("/dim/{path:.*}", web::get().to(handle_dimensions)),
    );
}
