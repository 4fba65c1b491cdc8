// src/main.rs

mod annotate;
mod catalog;
mod config;
mod damage_detection;
mod error;
mod onnx;
mod part_detection;
mod pipeline;
mod preprocessing;
mod pricing;
mod server;
mod severity;
mod types;
mod vehicle_detection;
mod video;

use anyhow::{Context, Result};
use catalog::FileCatalog;
use config::Config;
use damage_detection::{DamageSegmentationStage, OnnxDamageDetector};
use part_detection::{OnnxPartDetector, PartDetectionStage};
use pipeline::Pipeline;
use severity::{OnnxSeverityClassifier, SeverityClassifierStage};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use vehicle_detection::{OnnxVehicleDetector, VehiclePresenceStage};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "damage_intake={},ort=warn,tower_http=info",
            config.logging.level
        ))
        .init();

    info!("Damage intake service starting");

    std::fs::create_dir_all(&config.storage.upload_dir)
        .context("Failed to create upload directory")?;
    std::fs::create_dir_all(&config.storage.processed_dir)
        .context("Failed to create processed-frames directory")?;

    let threads = config.inference.num_threads;
    let cuda = config.inference.use_cuda;

    let vehicle = OnnxVehicleDetector::new(&config.models.vehicle_path, threads, cuda)?;
    let severity = OnnxSeverityClassifier::new(&config.models.severity_path, threads, cuda)?;
    let damage = OnnxDamageDetector::new(&config.models.damage_path, threads, cuda)?;
    let parts = OnnxPartDetector::new(&config.models.parts_path, threads, cuda)?;
    info!("✓ All models loaded");

    let catalog = Arc::new(FileCatalog::load(&config.catalog.path)?);

    let pipeline = Pipeline::new(
        VehiclePresenceStage::new(Box::new(vehicle), config.detection.vehicle_confidence),
        SeverityClassifierStage::new(Box::new(severity)),
        DamageSegmentationStage::new(Box::new(damage), config.detection.damage_confidence),
        PartDetectionStage::new(Box::new(parts), config.detection.parts_confidence),
        catalog,
        PathBuf::from(&config.storage.processed_dir),
    );

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid server host")?,
        config.server.port,
    );

    let state = server::AppState::new(pipeline, config);
    let app = server::router(state);

    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind server address")?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
