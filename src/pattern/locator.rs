//! Tile discovery and lookup.
//!
//! Source stacks are often padded inconsistently: `7.jpg` next to `0008.jpg`
//! in the same directory. Discovery therefore globs every combination of
//! candidate widths `0..=digit_counts[axis]` per axis. The cost is
//! `Π(max_width + 1)` glob scans, run once per ingestion.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::PatternError;

use super::matcher::{Axis, DigitWidths, TileCoordinate, TilePattern};

/// Populated coordinate interval of a source stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileExtent {
    /// Per-axis minimum coordinate over all files
    pub min: TileCoordinate,

    /// Per-axis maximum coordinate over all files
    pub max: TileCoordinate,

    /// One discovered file, used to probe tile geometry
    pub arbitrary_file: PathBuf,

    /// Number of matched files over all width combinations
    pub file_count: usize,
}

impl TileExtent {
    /// Number of tile columns along x and y.
    pub fn columns(&self) -> (i64, i64) {
        (self.max.x - self.min.x + 1, self.max.y - self.min.y + 1)
    }
}

/// Resolves tile coordinates to files on disk.
#[derive(Debug, Clone)]
pub struct TileLocator {
    pattern: TilePattern,
    widths: DigitWidths,
}

impl TileLocator {
    /// Create a locator using the pattern's own token lengths as padding widths.
    pub fn new(pattern: TilePattern) -> Self {
        let widths = pattern.digit_counts();
        Self { pattern, widths }
    }

    pub fn pattern(&self) -> &TilePattern {
        &self.pattern
    }

    /// The padded width per axis used by [`locate`](Self::locate).
    pub fn widths(&self) -> DigitWidths {
        self.widths
    }

    /// Enumerate every width combination and collect the populated interval.
    ///
    /// Fails with [`PatternError::NoSourceFiles`] if no combination matches.
    pub fn discover(&self) -> Result<TileExtent, PatternError> {
        let max = self.widths;
        let mut lower: Option<TileCoordinate> = None;
        let mut upper: Option<TileCoordinate> = None;
        let mut arbitrary_file = None;
        let mut file_count = 0usize;

        for x in 0..=max.x {
            for y in 0..=max.y {
                for z in 0..=max.z {
                    let widths = DigitWidths::new(x, y, z);
                    let expr = self.pattern.to_glob(widths);
                    let matcher = self.pattern.coordinate_regex(widths)?;
                    let entries = glob::glob(&expr).map_err(|e| PatternError::Glob {
                        glob: expr.clone(),
                        message: e.to_string(),
                    })?;

                    for entry in entries {
                        let path = entry.map_err(|e| PatternError::Io(e.into_error()))?;
                        let text = path.to_string_lossy();
                        let Some(coord) = self.pattern.extract(&matcher, &text) else {
                            warn!("Skipping {}: no coordinates for widths {:?}", text, widths);
                            continue;
                        };

                        file_count += 1;
                        let lo = lower.get_or_insert(coord);
                        let hi = upper.get_or_insert(coord);
                        for axis in Axis::ALL {
                            let value = coord.get(axis);
                            let min = lo.component_mut(axis);
                            *min = (*min).min(value);
                            let max = hi.component_mut(axis);
                            *max = (*max).max(value);
                        }
                        arbitrary_file = Some(path);
                    }
                }
            }
        }

        match (lower, upper, arbitrary_file) {
            (Some(min), Some(max), Some(arbitrary_file)) => {
                debug!(
                    "Discovered {} files spanning {:?}..={:?}",
                    file_count, min, max
                );
                Ok(TileExtent {
                    min,
                    max,
                    arbitrary_file,
                    file_count,
                })
            }
            _ => Err(PatternError::NoSourceFiles {
                pattern: self.pattern.to_string(),
            }),
        }
    }

    /// Resolve the file holding one tile.
    ///
    /// The unpadded path takes precedence over the zero-padded one. Returns
    /// `None` if neither exists.
    pub fn locate(&self, coord: TileCoordinate) -> Option<PathBuf> {
        let unpadded = self.pattern.render(coord, DigitWidths::unpadded());
        if Path::new(&unpadded).is_file() {
            return Some(PathBuf::from(unpadded));
        }

        let padded = self.pattern.render(coord, self.widths);
        if Path::new(&padded).is_file() {
            return Some(PathBuf::from(padded));
        }

        None
    }
}

// =============================================================================
// Tests
// =============================================================================
