//! Bounded pool of blocking inference workers.
//!
//! Inference is CPU-bound and synchronous, so it runs on dedicated threads
//! rather than the async runtime. Each worker owns a clone of the
//! [`Pipeline`] and pulls jobs from one bounded queue; requests that find
//! the queue full are refused immediately.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use burn::tensor::backend::AutodiffBackend;
use corrode_core::CamClassifier;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, ServeError};
use crate::pipeline::{Pipeline, Prediction};

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Worker threads.
    pub workers: usize,
    /// Jobs that may wait for a free worker.
    pub queue_depth: usize,
    /// How long a caller waits for its result.
    pub timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_depth: 16,
            timeout: Duration::from_secs(120),
        }
    }
}

struct Job {
    bytes: Vec<u8>,
    reply: oneshot::Sender<Result<Prediction>>,
}

/// Handle for submitting jobs to the workers.
///
/// Dropping the last handle closes the queue; workers finish their current
/// job and exit.
pub struct InferencePool {
    sender: mpsc::Sender<Job>,
    config: PoolConfig,
}

impl InferencePool {
    /// Start `config.workers` threads, each with its own pipeline clone.
    pub fn spawn<B, M>(pipeline: Pipeline<B, M>, config: PoolConfig) -> Result<Self>
    where
        B: AutodiffBackend,
        M: CamClassifier<B> + 'static,
    {
        if config.workers == 0 || config.queue_depth == 0 {
            return Err(ServeError::InvalidConfig(
                "worker pool needs at least one worker and one queue slot".into(),
            ));
        }

        let (sender, receiver) = mpsc::channel::<Job>(config.queue_depth);
        let receiver = Arc::new(Mutex::new(receiver));

        for id in 0..config.workers {
            let receiver = Arc::clone(&receiver);
            let pipeline = pipeline.clone();
            thread::Builder::new()
                .name(format!("corrode-worker-{id}"))
                .spawn(move || worker_loop(id, pipeline, receiver))?;
        }

        tracing::info!(
            workers = config.workers,
            queue_depth = config.queue_depth,
            timeout_secs = config.timeout.as_secs_f64(),
            "Started inference pool"
        );

        Ok(Self { sender, config })
    }

    /// Pool sizing.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Run a prediction on one of the workers.
    ///
    /// # Errors
    ///
    /// - [`ServeError::Overloaded`] when the queue is full
    /// - [`ServeError::Timeout`] when no result arrives in time; the worker
    ///   still completes the job and its result is dropped
    /// - any error from the pipeline itself
    pub async fn submit(&self, bytes: Vec<u8>) -> Result<Prediction> {
        let (reply, result) = oneshot::channel();

        self.sender
            .try_send(Job { bytes, reply })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ServeError::Overloaded,
                mpsc::error::TrySendError::Closed(_) => {
                    ServeError::Internal("inference workers have stopped".into())
                }
            })?;

        match tokio::time::timeout(self.config.timeout, result).await {
            Ok(Ok(prediction)) => prediction,
            Ok(Err(_)) => Err(ServeError::Internal(
                "inference worker dropped the request".into(),
            )),
            Err(_) => Err(ServeError::Timeout(self.config.timeout)),
        }
    }
}

fn worker_loop<B, M>(id: usize, pipeline: Pipeline<B, M>, receiver: Arc<Mutex<mpsc::Receiver<Job>>>)
where
    B: AutodiffBackend,
    M: CamClassifier<B>,
{
    tracing::debug!(worker = id, "Worker started");

    loop {
        // Only one idle worker waits on the channel at a time.
        let job = receiver.lock().blocking_recv();
        let Some(job) = job else { break };

        if job.reply.is_closed() {
            tracing::debug!(worker = id, "Skipping abandoned job");
            continue;
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(&job.bytes)))
            .unwrap_or_else(|_| {
                tracing::error!(worker = id, "Inference panicked");
                Err(ServeError::Internal("inference failed unexpectedly".into()))
            });

        if job.reply.send(result).is_err() {
            tracing::warn!(worker = id, "Caller gave up before the result was ready");
        }
    }

    tracing::debug!(worker = id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServeBackend;
    use corrode_explain::AttributionConfig;
    use corrode_models::{ResNet, ResNetConfig};
    use corrode_vision::{CompositorConfig, HeatmapStore, RetentionPolicy};
    use std::io::Cursor;

    fn png_bytes(shade: u8) -> Vec<u8> {
        let image = image::RgbImage::from_fn(40, 40, |x, y| {
            image::Rgb([shade, x as u8 * 6, y as u8 * 6])
        });
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn pipeline(dir: &std::path::Path) -> Pipeline<ServeBackend, ResNet<ServeBackend>> {
        let device = Default::default();
        let model = ResNetConfig::resnet18(5)
            .with_stage_channels([4, 8, 8, 8])
            .with_blocks_per_stage([1, 1, 1, 1])
            .init::<ServeBackend>(&device);
        let store = Arc::new(HeatmapStore::create(dir, RetentionPolicy::keep_all()).unwrap());
        Pipeline::new(
            model,
            device,
            AttributionConfig::default(),
            CompositorConfig::default(),
            store,
        )
        .unwrap()
    }

    #[test]
    fn test_zero_workers_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = PoolConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(InferencePool::spawn(pipeline(dir.path()), config).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submit_matches_direct_run() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let expected = pipeline.run(&png_bytes(10)).unwrap();

        let pool = InferencePool::spawn(pipeline, PoolConfig::default()).unwrap();
        let got = pool.submit(png_bytes(10)).await.unwrap();

        assert_eq!(got.class_index, expected.class_index);
        assert_eq!(got.scores, expected.scores);
        assert_ne!(got.heatmap.name, expected.heatmap.name);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pipeline_errors_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let pool = InferencePool::spawn(pipeline(dir.path()), PoolConfig::default()).unwrap();

        let err = pool.submit(b"nope".to_vec()).await.unwrap_err();
        assert_eq!(err.status().as_u16(), 422);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overload_and_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let config = PoolConfig {
            workers: 1,
            queue_depth: 1,
            timeout: Duration::from_millis(1),
        };
        let pool = Arc::new(InferencePool::spawn(pipeline(dir.path()), config).unwrap());

        // Flood the single slot; at least one caller must be refused or time out.
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.submit(png_bytes(i * 20)).await })
            })
            .collect();

        let mut statuses = Vec::new();
        for handle in handles {
            if let Err(e) = handle.await.unwrap() {
                statuses.push(e.status().as_u16());
            }
        }
        assert!(!statuses.is_empty());
        assert!(statuses.iter().all(|s| *s == 503 || *s == 504));
    }
}
