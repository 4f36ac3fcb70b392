//! Stack Cuber - converts 2D tile stacks into a chunked volumetric dataset.
//!
//! This binary parses the configuration, discovers the tiles and runs the
//! cubing pipeline against the local raw cube store.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stack_cuber::{tile_cubing, Config, CubingError, ImageTileDecoder, RawCubeStore};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let settings = match config.cubing_settings() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Source pattern: {}", settings.input_path_pattern);
    info!("  Target: {}", settings.target_path.display());
    info!(
        "  Layer: {} ({})",
        settings.layer_name, settings.element_class
    );
    info!(
        "  Batch size: {}, jobs: {}",
        settings.batch_size, settings.parallelism
    );

    let store = RawCubeStore::new();
    let decoder = Arc::new(ImageTileDecoder::new());

    match tile_cubing(&settings, &store, decoder).await {
        Ok(summary) => {
            info!(
                "Wrote {} files into {} (bounding box {:?} + {:?})",
                summary.file_count,
                settings.target_path.display(),
                summary.bounding_box.offset(),
                summary.bounding_box.size()
            );
            ExitCode::SUCCESS
        }
        Err(CubingError::JobsFailed { failed, total }) => {
            error!(
                "{} of {} jobs failed; completed batches were kept, re-run to retry",
                failed, total
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Cubing failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "stack_cuber=debug"
    } else {
        "stack_cuber=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
