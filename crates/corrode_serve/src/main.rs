//! corrode CLI: serve corrosion-level predictions with heatmaps, or run a
//! single prediction offline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use corrode_core::N_CLASSES;
use corrode_explain::AttributionConfig;
use corrode_models::{hub, load_classifier, ResNetConfig};
use corrode_serve::config::ModelArgs;
use corrode_serve::{Pipeline, PredictResponse, ServeArgs, ServeBackend};
use corrode_vision::{CompositorConfig, HeatmapStore, RetentionPolicy};

#[derive(Parser)]
#[command(name = "corrode")]
#[command(author, version)]
#[command(about = "Corrosion-level classifier with class-activation heatmaps")]
#[command(long_about = "corrode: classify corrosion severity (levels 5-9) from a photo and
render a heatmap of the regions that drove the decision.

EXAMPLES:
  # Serve on port 7860, downloading weights on first start
  corrode serve --weights-url https://host/final_corrosion_model.mpk

  # Fine-tuned head over a separate backbone, with a 0.5 threshold
  corrode serve --weights head.mpk --backbone resnet18.mpk --threshold 0.5

  # One-off prediction
  corrode predict rusty_pipe.jpg --output-dir ./heatmaps")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP prediction service
    Serve(ServeArgs),
    /// Predict the corrosion level of one image and write its heatmap
    Predict {
        /// Image file
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Download the weights file if it is not present
    FetchWeights {
        /// Weights file
        #[arg(
            long,
            env = "CORRODE_WEIGHTS",
            default_value = corrode_serve::config::DEFAULT_WEIGHTS
        )]
        weights: PathBuf,

        /// Source URL
        #[arg(long, env = "CORRODE_WEIGHTS_URL")]
        weights_url: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Serve(args) => cmd_serve(args),
        Commands::Predict { image, model } => cmd_predict(image, model),
        Commands::FetchWeights {
            weights,
            weights_url,
        } => cmd_fetch_weights(weights, weights_url),
    }
}

fn cmd_serve(args: ServeArgs) -> Result<()> {
    let config = args.into_config().context("Invalid service configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime
        .block_on(corrode_serve::service::run(config))
        .context("Prediction service failed")
}

fn cmd_predict(image: PathBuf, args: ModelArgs) -> Result<()> {
    let bytes = std::fs::read(&image)
        .with_context(|| format!("Failed to read {}", image.display()))?;

    let device = Default::default();
    let model = load_classifier::<ServeBackend>(
        &ResNetConfig::resnet18(N_CLASSES),
        &args.weights_spec(),
        &device,
    )
    .context("Failed to load classifier")?;

    let store = HeatmapStore::create(&args.output_dir, RetentionPolicy::keep_all())
        .context("Failed to open heatmap directory")?;

    let pipeline = Pipeline::<ServeBackend, _>::new(
        model,
        device,
        AttributionConfig::default()
            .with_layer(args.target_layer)
            .with_weighting(args.weighting),
        CompositorConfig {
            threshold: args.threshold(),
            ..Default::default()
        },
        Arc::new(store),
    )?;

    let prediction = pipeline
        .run(&bytes)
        .with_context(|| format!("Prediction failed for {}", image.display()))?;

    println!("Image:           {}", image.display());
    println!("Corrosion level: {}", prediction.level);
    println!("Class scores:    {:?}", prediction.scores);
    println!("Heatmap:         {}", prediction.heatmap.path.display());
    println!(
        "{}",
        serde_json::to_string_pretty(&PredictResponse::from(&prediction))?
    );

    Ok(())
}

fn cmd_fetch_weights(weights: PathBuf, url: String) -> Result<()> {
    let path = hub::ensure_weights(&weights, Some(&url))
        .with_context(|| format!("Failed to fetch weights from {url}"))?;
    println!("Weights available at {}", path.display());
    Ok(())
}
