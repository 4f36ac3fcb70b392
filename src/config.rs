//! Command-line configuration for the cubing binary.
//!
//! Every option can also be set through an environment variable with the
//! `CUBER_` prefix:
//!
//! - `CUBER_SOURCE_PATH` - Directory holding the tile stack
//! - `CUBER_TARGET_PATH` - Dataset directory to write into
//! - `CUBER_LAYER_NAME` - Target layer (default: color)
//! - `CUBER_DTYPE` - Element class of the layer (default: uint8)
//! - `CUBER_BATCH_SIZE` - z-slices per write call (default: 32)
//! - `CUBER_INPUT_PATH_PATTERN` - Tile pattern relative to the source path
//! - `CUBER_JOBS` - Number of parallel jobs (default: available cores)
//! - `CUBER_SCALE` - Voxel size of a new dataset (default: 1,1,1)
//!
//! # Example
//!
//! ```text
//! stack-cuber /data/stack /data/dataset \
//!     --input-path-pattern '{zzzz}/{yy}/{xx}.jpg' --jobs 8
//! ```

use std::path::PathBuf;

use clap::Parser;

use crate::cubing::{CubingSettings, DEFAULT_BLOCK_LEN};
use crate::dataset::ElementClass;
use crate::pattern;

// =============================================================================
// Default Values
// =============================================================================

/// Default target layer.
pub const DEFAULT_LAYER_NAME: &str = "color";

/// Default element class.
pub const DEFAULT_DTYPE: &str = "uint8";

/// Default number of z-slices per write call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default tile pattern: ten digits per axis, one directory per z and y.
pub const DEFAULT_INPUT_PATH_PATTERN: &str = "{zzzzzzzzzz}/{yyyyyyyyyy}/{xxxxxxxxxx}.jpg";

// =============================================================================
// CLI Arguments
// =============================================================================

/// Stack Cuber - converts 2D tile stacks into a chunked volumetric dataset.
///
/// Tiles are located through a filename pattern whose repeated-letter tokens
/// (`{xxx}`, `{yyy}`, `{zzz}`) give the widest zero padding per axis.
#[derive(Parser, Debug, Clone)]
#[command(name = "stack-cuber")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Directory holding the source tiles.
    #[arg(env = "CUBER_SOURCE_PATH")]
    pub source_path: PathBuf,

    /// Dataset directory; created if it does not exist or is empty.
    #[arg(env = "CUBER_TARGET_PATH")]
    pub target_path: PathBuf,

    /// Name of the layer the tiles are written to.
    #[arg(long, default_value = DEFAULT_LAYER_NAME, env = "CUBER_LAYER_NAME")]
    pub layer_name: String,

    /// Element class of the target layer (uint8, uint16 or float32).
    #[arg(long, default_value = DEFAULT_DTYPE, env = "CUBER_DTYPE")]
    pub dtype: String,

    /// Number of z-slices written per call.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, env = "CUBER_BATCH_SIZE")]
    pub batch_size: usize,

    /// Tile path pattern relative to the source path, e.g. `{zzz}/{yy}/{xx}.png`.
    ///
    /// The number of letters is the longest number of digits on that axis.
    #[arg(long, default_value = DEFAULT_INPUT_PATH_PATTERN, env = "CUBER_INPUT_PATH_PATTERN")]
    pub input_path_pattern: String,

    /// Number of z-batches processed in parallel.
    ///
    /// Defaults to the number of available cores.
    #[arg(short, long, env = "CUBER_JOBS")]
    pub jobs: Option<usize>,

    /// Voxel size in nanometers, used when a new dataset is created.
    #[arg(long, value_delimiter = ',', default_value = "1,1,1", env = "CUBER_SCALE")]
    pub scale: Vec<f64>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.layer_name.trim().is_empty() {
            return Err("layer_name must not be empty".to_string());
        }

        self.element_class()?;

        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }

        if self.jobs == Some(0) {
            return Err("jobs must be greater than 0".to_string());
        }

        if self.scale.len() != 3 {
            return Err(format!(
                "scale needs exactly 3 components, got {}",
                self.scale.len()
            ));
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("scale components must be positive".to_string());
        }

        pattern::validate(&self.input_path_pattern).map_err(|e| e.to_string())?;

        Ok(())
    }

    /// Parsed element class.
    pub fn element_class(&self) -> Result<ElementClass, String> {
        self.dtype.parse()
    }

    /// Worker pool size: `--jobs`, or the number of available cores.
    pub fn parallelism(&self) -> usize {
        self.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// The pattern joined onto the source directory.
    pub fn full_pattern(&self) -> String {
        self.source_path
            .join(&self.input_path_pattern)
            .to_string_lossy()
            .into_owned()
    }

    /// Convert into the settings consumed by the pipeline (call validate() first).
    pub fn cubing_settings(&self) -> Result<CubingSettings, String> {
        let scale = match self.scale.as_slice() {
            [x, y, z] => [*x, *y, *z],
            _ => return Err("scale needs exactly 3 components".to_string()),
        };

        Ok(CubingSettings {
            target_path: self.target_path.clone(),
            layer_name: self.layer_name.clone(),
            element_class: self.element_class()?,
            batch_size: self.batch_size,
            input_path_pattern: self.full_pattern(),
            parallelism: self.parallelism(),
            scale,
            block_len: DEFAULT_BLOCK_LEN,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
