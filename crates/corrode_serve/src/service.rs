//! Service startup and shutdown.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use corrode_models::{load_classifier, ResNet};
use corrode_vision::HeatmapStore;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::ServiceConfig;
use crate::error::{Result, ServeError};
use crate::pipeline::Pipeline;
use crate::pool::{InferencePool, PoolConfig};
use crate::routes::{router, AppState, RouterOptions};
use crate::ServeBackend;

/// Load the classifier described by `config` on a blocking thread.
///
/// Downloads the weights first when needed. Any failure here is fatal for
/// the service.
pub async fn load_model(config: &ServiceConfig) -> Result<ResNet<ServeBackend>> {
    let model_config = config.model.clone();
    let weights = config.weights.clone();

    let model = tokio::task::spawn_blocking(move || {
        let device = Default::default();
        load_classifier::<ServeBackend>(&model_config, &weights, &device)
    })
    .await
    .map_err(|e| ServeError::Internal(e.to_string()))??;

    Ok(model)
}

/// Build the pipeline, worker pool and router for an already loaded model.
///
/// Must be called within a Tokio runtime; the retention sweep runs as a
/// background task.
pub fn build_app(model: ResNet<ServeBackend>, config: &ServiceConfig) -> Result<axum::Router> {
    config.validate()?;

    let store = Arc::new(HeatmapStore::create(
        &config.output_dir,
        config.retention.clone(),
    )?);

    let pipeline = Pipeline::<ServeBackend, _>::new(
        model,
        Default::default(),
        config.attribution,
        config.compositor.clone(),
        Arc::clone(&store),
    )?;

    let pool = InferencePool::spawn(
        pipeline,
        PoolConfig {
            workers: config.workers,
            queue_depth: config.queue_depth,
            timeout: config.request_timeout,
        },
    )?;

    if !store.retention().is_unbounded() {
        spawn_sweeper(Arc::clone(&store), config.sweep_interval);
    }

    Ok(router(
        AppState::new(Arc::new(pool), store),
        RouterOptions {
            max_upload_bytes: config.max_upload_bytes,
            cors: config.cors,
        },
    ))
}

/// Sweep `store` once immediately and then every `period`.
fn spawn_sweeper(store: Arc<HeatmapStore>, period: Duration) -> JoinHandle<()> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tokio::spawn(async move {
        loop {
            interval.tick().await;
            let store = Arc::clone(&store);
            match tokio::task::spawn_blocking(move || store.sweep(SystemTime::now())).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Heatmap sweep failed"),
                Err(e) => tracing::warn!(error = %e, "Heatmap sweep task failed"),
            }
        }
    })
}

/// Run the prediction service until Ctrl-C.
pub async fn run(config: ServiceConfig) -> Result<()> {
    config.validate()?;
    let addr = config.socket_addr()?;

    let model = load_model(&config).await?;
    let app = build_app(model, &config)?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        output_dir = %config.output_dir.display(),
        layer = %config.attribution.layer,
        "Serving predictions"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use corrode_vision::RetentionPolicy;
    use image::{Rgb, RgbImage};
    use std::fs::{self, File};
    use std::path::Path;

    const PERIOD: Duration = Duration::from_secs(60);

    fn heatmap_count(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| HeatmapStore::is_valid_name(name))
            .count()
    }

    /// Poll without advancing the paused clock; sweeps run on the blocking
    /// pool in real time.
    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..500 {
            if done() {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
            tokio::task::yield_now().await;
        }
        panic!("sweeper did not reach the expected state");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_on_each_tick() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            HeatmapStore::create(
                dir.path(),
                RetentionPolicy {
                    ttl: Some(Duration::from_secs(3600)),
                    max_files: Some(2),
                },
            )
            .unwrap(),
        );
        let image = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));

        let stale = store.save(&image).unwrap();
        File::options()
            .write(true)
            .open(&stale.path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(7200))
            .unwrap();
        store.save(&image).unwrap();

        // The first tick fires immediately and drops the expired file.
        let sweeper = spawn_sweeper(Arc::clone(&store), PERIOD);
        wait_until(|| !stale.path.exists()).await;
        assert_eq!(heatmap_count(dir.path()), 1);

        for _ in 0..3 {
            store.save(&image).unwrap();
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(heatmap_count(dir.path()), 4);

        tokio::time::advance(PERIOD).await;
        wait_until(|| heatmap_count(dir.path()) == 2).await;

        sweeper.abort();
    }
}
