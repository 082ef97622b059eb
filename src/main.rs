mod config;
mod context;
mod db;
mod error;
mod handlers;
mod images;
mod ocr;
mod plate;
mod routes;
mod sensor;
mod types;

use config::Config;
use context::{Context, Policy};
use env_logger::Env;
use images::{ImagePipeline, ImageStore};
use log::{error, info};
use ocr::VisionClient;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let filter = if config::debug_enabled() { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(filter)).init();
    info!("Starting plate-ingest");

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
    info!("Exiting main");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let conn = db::open(
        &config.database_path,
        config.database_timeout,
        &config.collections.names(),
    )
    .map_err(|e| format!("Unable to open database {:?}: {}", config.database_path, e))?;
    info!("Opened document store at {:?}", config.database_path);

    let detector = VisionClient::new(
        config.vision_endpoint.clone(),
        config.vision_credential.clone(),
        config.ocr_timeout,
    )?;

    let store = match &config.image_dir {
        Some(dir) => {
            let store = ImageStore::create(dir)
                .map_err(|e| format!("Unable to create image directory {:?}: {}", dir, e))?;
            info!("Saving uploaded images under {:?}", store.dir());
            Some(store)
        }
        None => None,
    };
    let pipeline = ImagePipeline::new(config.mirror_images, config.jpeg_quality, store);

    let policy = Policy {
        strict_validation: config.strict_validation,
        fail_on_ocr_error: config.fail_on_ocr_error,
    };
    info!(
        "Device source {}, mirror images: {}, {:?}",
        config.device_source, config.mirror_images, policy
    );

    let ctx = Context::new(
        conn,
        Arc::new(detector),
        pipeline,
        config.collections.clone(),
        config.device_source,
        policy,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let (addr, server) = warp::serve(routes::api(ctx, config.max_image_bytes))
        .try_bind_with_graceful_shutdown(addr, shutdown_signal())?;
    info!("Listening on {}", addr);
    server.await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
