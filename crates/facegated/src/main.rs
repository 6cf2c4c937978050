use anyhow::{Context, Result};
use facegate_core::{ScanMode, VerificationWorkflow, WorkflowConfig};
use facegate_models::OnnxFeatureExtractor;
use facegate_store::SqliteTemplateStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::Config;
use dbus_interface::{FacegateService, StatusInfo, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = Config::from_env();
    tracing::info!(
        db = %config.db_path.display(),
        model = %config.model_path(),
        threshold = config.similarity_threshold,
        "configuration loaded"
    );

    // Fail fast: store and model must both be usable before serving.
    let store = Arc::new(
        SqliteTemplateStore::open(&config.db_path).context("opening template store")?,
    );
    let extractor =
        OnnxFeatureExtractor::load(&config.model_path()).context("loading feature model")?;

    let workflow = VerificationWorkflow::new(
        store,
        extractor,
        WorkflowConfig {
            threshold: config.similarity_threshold,
            max_image_bytes: config.max_image_bytes,
        },
    );
    let engine = engine::spawn_engine(workflow)?;

    if config.scan_on_startup {
        match engine.scan(ScanMode::Repair).await {
            Ok(report) => tracing::info!(
                scanned = report.scanned,
                fixed = report.fixed,
                cleared = report.cleared,
                "startup integrity scan finished"
            ),
            Err(e) => tracing::warn!(error = %e, "startup integrity scan failed; continuing"),
        }
    }

    let service = FacegateService::new(
        engine,
        StatusInfo {
            version: env!("CARGO_PKG_VERSION"),
            threshold: config.similarity_threshold,
            max_image_bytes: config.max_image_bytes,
            db_path: config.db_path.display().to_string(),
            model_path: config.model_path(),
        },
    );

    let builder = if config.system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!(bus = BUS_NAME, system = config.system_bus, "facegated ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
