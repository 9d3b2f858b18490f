//! Service configuration.
//!
//! Options come from command-line flags or `CORRODE_*` environment variables
//! (the port also honors `PORT`) and are folded into [`ServiceConfig`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use corrode_core::{TargetLayer, N_CLASSES};
use corrode_explain::{AttributionConfig, ChannelWeighting};
use corrode_models::{ResNetConfig, WeightsSpec};
use corrode_vision::{CompositorConfig, RetentionPolicy, Threshold};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServeError};

/// Default weights file name.
pub const DEFAULT_WEIGHTS: &str = "final_corrosion_model.mpk";

/// Default heatmap directory.
pub const DEFAULT_OUTPUT_DIR: &str = "/tmp/heatmaps";

/// Default upload limit (16 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Classifier and rendering options shared by `serve` and `predict`.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Weights file (burn MessagePack record)
    #[arg(long, env = "CORRODE_WEIGHTS", default_value = DEFAULT_WEIGHTS, value_name = "PATH")]
    pub weights: PathBuf,

    /// URL to download the weights from when the file is missing
    #[arg(long, env = "CORRODE_WEIGHTS_URL", value_name = "URL")]
    pub weights_url: Option<String>,

    /// Backbone record; when set, the weights file holds only the linear head
    #[arg(long, env = "CORRODE_BACKBONE", value_name = "PATH")]
    pub backbone: Option<PathBuf>,

    /// Directory heatmaps are written to
    #[arg(long, env = "CORRODE_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Zero importance below this value (0..=1) before rendering
    #[arg(long, env = "CORRODE_THRESHOLD", value_name = "CUTOFF")]
    pub threshold: Option<f32>,

    /// Layer used for attribution: layer1, layer2, layer3, layer4
    #[arg(long, env = "CORRODE_TARGET_LAYER", default_value = "layer4", value_name = "LAYER")]
    pub target_layer: TargetLayer,

    /// Channel weighting: mean_abs_gradient or mean_gradient
    #[arg(
        long,
        env = "CORRODE_WEIGHTING",
        default_value = "mean_abs_gradient",
        value_parser = parse_weighting,
        value_name = "MODE"
    )]
    pub weighting: ChannelWeighting,
}

impl ModelArgs {
    /// Where to load the weights from.
    pub fn weights_spec(&self) -> WeightsSpec {
        let spec = match &self.backbone {
            Some(backbone) => WeightsSpec::head_only(&self.weights, backbone),
            None => WeightsSpec::full(&self.weights),
        };
        match &self.weights_url {
            Some(url) => spec.with_url(url),
            None => spec,
        }
    }

    /// Threshold option.
    pub fn threshold(&self) -> Threshold {
        self.threshold.map_or(Threshold::Off, Threshold::Cutoff)
    }
}

fn parse_weighting(s: &str) -> std::result::Result<ChannelWeighting, String> {
    match s.to_ascii_lowercase().replace('-', "_").as_str() {
        "mean_abs_gradient" | "abs" => Ok(ChannelWeighting::MeanAbsGradient),
        "mean_gradient" | "gradcam" => Ok(ChannelWeighting::MeanGradient),
        other => Err(format!(
            "unknown weighting '{other}', expected mean_abs_gradient or mean_gradient"
        )),
    }
}

/// Options for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "CORRODE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 7860)]
    pub port: u16,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Number of inference worker threads
    #[arg(long, env = "CORRODE_WORKERS", default_value_t = 1, value_name = "N")]
    pub workers: usize,

    /// Jobs allowed to wait for a worker before requests are refused
    #[arg(long, env = "CORRODE_QUEUE_DEPTH", default_value_t = 16, value_name = "N")]
    pub queue_depth: usize,

    /// Seconds a request may wait for its prediction
    #[arg(long, env = "CORRODE_REQUEST_TIMEOUT_SECS", default_value_t = 120, value_name = "SECS")]
    pub request_timeout_secs: u64,

    /// Largest accepted upload in bytes
    #[arg(
        long,
        env = "CORRODE_MAX_UPLOAD_BYTES",
        default_value_t = DEFAULT_MAX_UPLOAD_BYTES,
        value_name = "BYTES"
    )]
    pub max_upload_bytes: usize,

    /// Delete heatmaps older than this many seconds (0 keeps them forever)
    #[arg(long, env = "CORRODE_RETENTION_SECS", default_value_t = 3600, value_name = "SECS")]
    pub retention_secs: u64,

    /// Keep at most this many heatmaps
    #[arg(long, env = "CORRODE_MAX_HEATMAPS", value_name = "N")]
    pub max_heatmaps: Option<usize>,

    /// Seconds between retention sweeps
    #[arg(long, env = "CORRODE_SWEEP_INTERVAL_SECS", default_value_t = 60, value_name = "SECS")]
    pub sweep_interval_secs: u64,

    /// Disable permissive CORS headers
    #[arg(long, env = "CORRODE_NO_CORS")]
    pub no_cors: bool,
}

impl ServeArgs {
    /// Fold the arguments into a validated [`ServiceConfig`].
    pub fn into_config(self) -> Result<ServiceConfig> {
        let ttl = (self.retention_secs > 0).then(|| Duration::from_secs(self.retention_secs));

        let config = ServiceConfig {
            host: self.host,
            port: self.port,
            model: ResNetConfig::resnet18(N_CLASSES),
            weights: self.model.weights_spec(),
            output_dir: self.model.output_dir.clone(),
            attribution: AttributionConfig::default()
                .with_layer(self.model.target_layer)
                .with_weighting(self.model.weighting),
            compositor: CompositorConfig {
                threshold: self.model.threshold(),
                ..Default::default()
            },
            workers: self.workers,
            queue_depth: self.queue_depth,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_upload_bytes: self.max_upload_bytes,
            retention: RetentionPolicy {
                ttl,
                max_files: self.max_heatmaps,
            },
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            cors: !self.no_cors,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Everything the prediction service needs to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Bind address.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Classifier topology.
    pub model: ResNetConfig,
    /// Classifier weights.
    pub weights: WeightsSpec,
    /// Heatmap directory.
    pub output_dir: PathBuf,
    /// Attribution options.
    pub attribution: AttributionConfig,
    /// Rendering options.
    pub compositor: CompositorConfig,
    /// Inference worker threads.
    pub workers: usize,
    /// Bounded queue capacity.
    pub queue_depth: usize,
    /// Per-request deadline.
    pub request_timeout: Duration,
    /// Upload body limit.
    pub max_upload_bytes: usize,
    /// Heatmap retention.
    pub retention: RetentionPolicy,
    /// Period of the retention sweep.
    pub sweep_interval: Duration,
    /// Send permissive CORS headers.
    pub cors: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
            model: ResNetConfig::resnet18(N_CLASSES),
            weights: WeightsSpec::full(DEFAULT_WEIGHTS),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            attribution: AttributionConfig::default(),
            compositor: CompositorConfig::default(),
            workers: 1,
            queue_depth: 16,
            request_timeout: Duration::from_secs(120),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            retention: RetentionPolicy {
                ttl: Some(Duration::from_secs(3600)),
                max_files: None,
            },
            sweep_interval: Duration::from_secs(60),
            cors: true,
        }
    }
}

impl ServiceConfig {
    /// Set the listening port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the heatmap directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the worker count and queue depth.
    #[must_use]
    pub fn with_workers(mut self, workers: usize, queue_depth: usize) -> Self {
        self.workers = workers;
        self.queue_depth = queue_depth;
        self
    }

    /// Set the per-request deadline.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retention policy.
    #[must_use]
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Set the importance threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.compositor.threshold = threshold;
        self
    }

    /// Address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ServeError::InvalidConfig(format!("bad bind address: {e}")))
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ServeError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.queue_depth == 0 {
            return Err(ServeError::InvalidConfig(
                "queue depth must be at least 1".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ServeError::InvalidConfig(
                "request timeout must be positive".into(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(ServeError::InvalidConfig(
                "sweep interval must be positive".into(),
            ));
        }
        if let Threshold::Cutoff(cutoff) = self.compositor.threshold {
            if !(0.0..=1.0).contains(&cutoff) {
                return Err(ServeError::InvalidConfig(format!(
                    "threshold must be within [0, 1], got {cutoff}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use corrode_models::WeightsLayout;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        serve: ServeArgs,
    }

    fn parse(args: &[&str]) -> ServiceConfig {
        let mut argv = vec!["corrode"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv)
            .unwrap()
            .serve
            .into_config()
            .unwrap()
    }

    #[test]
    fn test_flags() {
        let config = parse(&[
            "--port",
            "9000",
            "--threshold",
            "0.5",
            "--target-layer",
            "layer3",
            "--backbone",
            "resnet18.mpk",
            "--workers",
            "4",
            "--retention-secs",
            "0",
            "--max-heatmaps",
            "10",
            "--no-cors",
        ]);

        assert_eq!(config.port, 9000);
        assert_eq!(config.compositor.threshold, Threshold::Cutoff(0.5));
        assert_eq!(config.attribution.layer, TargetLayer::Layer3);
        assert!(matches!(config.weights.layout, WeightsLayout::HeadOnly { .. }));
        assert_eq!(config.workers, 4);
        assert_eq!(config.retention.ttl, None);
        assert_eq!(config.retention.max_files, Some(10));
        assert!(!config.cors);
    }

    #[test]
    fn test_unknown_layer_rejected() {
        assert!(TestCli::try_parse_from(["corrode", "--target-layer", "layer9"]).is_err());
    }

    #[test]
    fn test_weighting_parser() {
        assert_eq!(
            parse_weighting("mean-gradient").unwrap(),
            ChannelWeighting::MeanGradient
        );
        assert!(parse_weighting("max").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(ServiceConfig::default().validate().is_ok());
        assert!(ServiceConfig::default().with_workers(0, 4).validate().is_err());
        assert!(ServiceConfig::default()
            .with_threshold(Threshold::Cutoff(-0.1))
            .validate()
            .is_err());
    }

    #[test]
    fn test_socket_addr() {
        let addr = ServiceConfig::default().with_port(8080).socket_addr().unwrap();
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_config_serde() {
        let config = ServiceConfig::default().with_threshold(Threshold::Cutoff(0.3));
        let json = serde_json::to_string(&config).unwrap();
        let back: ServiceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
