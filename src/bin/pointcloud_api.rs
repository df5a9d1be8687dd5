//! pointcloud_api - HTTP point cloud service
//!
//! This daemon:
//! 1. Loads configuration (POINTCLOUD_CONFIG + env overrides)
//! 2. Builds the detector backends
//! 3. Serves POST /pointcloud, POST /pointcloud2 and GET /

use anyhow::Result;
use std::sync::{mpsc, Arc};

use face_pointcloud::{
    api::{ApiConfig, ApiServer},
    BackendRegistry, ServiceConfig,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::load()?;
    if config.detect.landmark_model.is_none() {
        log::warn!("no landmark model configured; every request will use keypoints");
    }

    let registry = BackendRegistry::from_settings(&config.detect)?;
    let pipeline = Arc::new(registry.pipeline()?);

    let api_handle = ApiServer::new(ApiConfig::from(config.api.clone()), pipeline).spawn()?;
    log::info!("pointcloud api listening on {}", api_handle.addr);
    log::info!(
        "allowed origins: {}",
        config.api.allowed_origins.join(", ")
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    log::info!("pointcloud_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
