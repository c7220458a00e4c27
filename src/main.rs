mod aws;
mod config;
mod error;
mod models;
mod pipeline;
mod s3_uploader;
mod serializer;
mod steam;
mod twitch;
mod uploader;
mod utilities;

use std::sync::Arc;

use anyhow::{bail, Result};
use log::{error, info};

use crate::config::{EnvConfigProvider, PipelineSettings, StorageBackend, StorageSettings};
use crate::models::RunTimestamp;
use crate::pipeline::Pipeline;
use crate::s3_uploader::S3Uploader;
use crate::uploader::{LocalStore, ObjectStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // The scheduler passes its logical run time; a manual run uses the current time.
    let run_ts = match std::env::args().nth(1) {
        Some(raw) => RunTimestamp::parse(&raw)?,
        None => RunTimestamp::now(),
    };

    let settings = PipelineSettings::from_env()?;
    let storage = StorageSettings::from_env()?;

    let store: Arc<dyn ObjectStore> = match storage.backend {
        StorageBackend::S3 => {
            info!("Landing artifacts in S3 bucket '{}'", storage.bucket);
            Arc::new(S3Uploader::new(&storage).await)
        }
        StorageBackend::Local => {
            info!("Landing artifacts under '{}'", storage.local_root);
            Arc::new(LocalStore::new(&storage.local_root))
        }
    };

    let pipeline = Pipeline::new(Arc::new(EnvConfigProvider::new()), store, settings)?;

    let report = tokio::select! {
        report = pipeline.run(run_ts) => report,
        _ = tokio::signal::ctrl_c() => {
            error!("Run {} cancelled", run_ts);
            bail!("run {} cancelled", run_ts);
        }
    };

    if !report.is_success() {
        let failed: Vec<&str> = report.failures().into_iter().map(|(path, _)| path).collect();
        bail!("run {} failed for: {}", report.run_ts, failed.join(", "));
    }

    Ok(())
}
