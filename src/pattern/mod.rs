//! Tile filename patterns and tile discovery.
//!
//! # Pattern Syntax
//!
//! Patterns follow the ImageJ stack loader convention: literal path text with
//! one repeated-letter token per axis, e.g. `{zzz}/{yyy}/{xxx}.jpg`. The
//! number of letters is the widest zero-padding expected for that axis.
//!
//! ```text
//!   pattern ──► TilePattern ──► TileLocator::discover ──► TileExtent
//!                  │                     │
//!                  │ render / to_glob    │ locate(x, y, z)
//!                  ▼                     ▼
//!             "003/001/002.jpg"     unpadded ► padded ► missing
//! ```
//!
//! # Components
//!
//! - [`TilePattern`]: parses, validates, renders and globs a pattern
//! - [`TileLocator`]: discovers the populated interval and resolves tile paths

mod locator;
mod matcher;

pub use locator::{TileExtent, TileLocator};
pub use matcher::{digit_counts, validate, Axis, DigitWidths, TileCoordinate, TilePattern};
