use actix_web::{web, App, HttpServer};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use objstore_volume::handlers;
use objstore_volume::local_backend::LocalFileSystem;
use objstore_volume::memory_backend::MemoryStore;
use objstore_volume::models::Permissions;
use objstore_volume::server::Server;
use objstore_volume::storage_backend::{StorageClient, Visibility};
use objstore_volume::thumbnails::CacheMode;
use objstore_volume::webdav_backend::WebDAVBackend;
use objstore_volume::{ObjectVolume, VolumeOptions};

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Type of mount: local, webdav or memory
    #[arg(long, default_value = "local")]
    mount_type: String,

    /// Mount path (for local filesystem)
    #[arg(long)]
    mount: Option<PathBuf>,

    /// WebDAV server URL (for webdav)
    #[arg(long)]
    webdav_url: Option<String>,

    /// WebDAV username
    #[arg(long)]
    webdav_username: Option<String>,

    /// WebDAV password
    #[arg(long)]
    webdav_password: Option<String>,

    /// Root path of the volume inside the store
    #[arg(long)]
    root: Option<String>,

    /// Name shown for the volume root
    #[arg(long, default_value = "Home")]
    alias: String,

    /// Thumbnail cache
    #[arg(long, value_enum, default_value = "disabled")]
    cache: CacheMode,

    /// Report whether directories contain sub-directories
    #[arg(long)]
    check_subfolders: bool,

    /// Visibility passed to the store on writes
    #[arg(long, value_enum)]
    visibility: Option<Visibility>,

    /// Mount without write access
    #[arg(long)]
    read_only: bool,

    /// Commands to refuse, e.g. `resize,rm`
    #[arg(long = "disable", value_delimiter = ',')]
    disabled_commands: Vec<String>,

    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: String,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let storage: Arc<dyn StorageClient> = match args.mount_type.as_str() {
        "local" => {
            let mount_path = args.mount.as_ref().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "--mount is required for local mount type",
                )
            })?;

            if !mount_path.exists() {
                tracing::error!("Mount path must exist");
                std::process::exit(1);
            }

            Arc::new(LocalFileSystem::new(mount_path.clone()))
        }
        "webdav" => {
            let webdav_url = args.webdav_url.clone().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "--webdav-url is required for webdav mount type",
                )
            })?;

            match WebDAVBackend::new(
                webdav_url,
                args.webdav_username.clone(),
                args.webdav_password.clone(),
            ) {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    tracing::error!("Unable to set up WebDAV client: {}", e);
                    std::process::exit(1);
                }
            }
        }
        "memory" => Arc::new(MemoryStore::new()),
        _ => {
            tracing::error!("Invalid mount type. Use 'local', 'webdav' or 'memory'");
            std::process::exit(1);
        }
    };

    let options = VolumeOptions {
        path: args.root,
        alias: args.alias,
        cache: args.cache,
        check_subfolders: args.check_subfolders,
        visibility: args.visibility,
        defaults: Permissions {
            write: !args.read_only,
            ..Permissions::default()
        },
        disabled_commands: args.disabled_commands,
        ..VolumeOptions::new(storage)
    };

    let volume = match ObjectVolume::mount(options) {
        Ok(volume) => volume,
        Err(e) => {
            tracing::error!("Unable to mount volume: {}", e);
            std::process::exit(1);
        }
    };

    let server_data = web::Data::new(Server::new(Box::new(volume)));

    tracing::info!("Starting connector at http://{}", args.bind);

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(server_data.clone())
            .app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES))
            .configure(handlers::configure)
    })
    .bind(&args.bind)?
    .run()
    .await
}
