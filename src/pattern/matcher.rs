//! Filename pattern parsing and rendering.
//!
//! A pattern is literal path text interleaved with repeated-letter tokens,
//! one letter per axis: `{xxx}`, `{yyyy}`, `{zz}`. The token length is the
//! widest zero-padding the source files are expected to use for that axis.
//! Files on disk may use any width up to that length, so the pattern is
//! rendered and globbed for explicit per-axis widths.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::PatternError;

// =============================================================================
// Axes and Coordinates
// =============================================================================

/// One of the three source stack axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in `x, y, z` order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// The letter used for this axis in pattern tokens.
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'x',
            Axis::Y => 'y',
            Axis::Z => 'z',
        }
    }

    fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'x' => Some(Axis::X),
            'y' => Some(Axis::Y),
            'z' => Some(Axis::Z),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Per-axis digit widths.
///
/// Used both for the longest token found in a pattern and for the concrete
/// width combination a single render or glob uses. A width of 0 means
/// "unpadded decimal" when rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DigitWidths {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl DigitWidths {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Widths of zero on every axis (unpadded rendering).
    pub fn unpadded() -> Self {
        Self::default()
    }

    pub fn get(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    fn set(&mut self, axis: Axis, width: usize) {
        match axis {
            Axis::X => self.x = width,
            Axis::Y => self.y = width,
            Axis::Z => self.z = width,
        }
    }
}

/// Logical `(x, y, z)` index of a tile in the source stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TileCoordinate {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl TileCoordinate {
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    pub fn get(&self, axis: Axis) -> i64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    fn set(&mut self, axis: Axis, value: i64) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
    }

    pub(crate) fn component_mut(&mut self, axis: Axis) -> &mut i64 {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }
}

// =============================================================================
// Pattern Parsing
// =============================================================================

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\{(x+|y+|z+)\}").expect("token regex is valid"))
}

/// Longest repeated-letter token per axis, 0 for an axis without a token.
pub fn digit_counts(pattern: &str) -> DigitWidths {
    let mut widths = DigitWidths::default();
    for caps in token_regex().captures_iter(pattern) {
        let run = &caps[1];
        if let Some(axis) = run.chars().next().and_then(Axis::from_letter) {
            let len = run.len().max(widths.get(axis));
            widths.set(axis, len);
        }
    }
    widths
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(Axis),
}

/// A validated tile filename pattern.
///
/// # Example
///
/// ```
/// use stack_cuber::pattern::{DigitWidths, TileCoordinate, TilePattern};
///
/// let pattern = TilePattern::parse("{zzz}/{yyy}/{xxx}.jpg").unwrap();
/// let coord = TileCoordinate::new(1, 2, 3);
///
/// assert_eq!(pattern.render(coord, DigitWidths::new(3, 3, 3)), "003/002/001.jpg");
/// assert_eq!(pattern.render(coord, DigitWidths::unpadded()), "3/2/1.jpg");
/// assert_eq!(pattern.to_glob(DigitWidths::new(1, 2, 0)), "/[0-9][0-9]/[0-9].jpg");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePattern {
    raw: String,
    segments: Vec<Segment>,
    digit_counts: DigitWidths,
}

impl TilePattern {
    /// Parse and validate a pattern.
    ///
    /// Fails with [`PatternError::InvalidPattern`] unless every axis has at
    /// least one token.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        validate(pattern)?;

        let mut segments = Vec::new();
        let mut last = 0;
        for caps in token_regex().captures_iter(pattern) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Literal(pattern[last..whole.start()].to_string()));
            }
            if let Some(axis) = caps[1].chars().next().and_then(Axis::from_letter) {
                segments.push(Segment::Token(axis));
            }
            last = whole.end();
        }
        if last < pattern.len() {
            segments.push(Segment::Literal(pattern[last..].to_string()));
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
            digit_counts: digit_counts(pattern),
        })
    }

    /// The pattern text as given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Longest token length per axis.
    pub fn digit_counts(&self) -> DigitWidths {
        self.digit_counts
    }

    /// Substitute the tokens of each axis with its coordinate, zero-padded to
    /// the axis width.
    pub fn render(&self, coord: TileCoordinate, widths: DigitWidths) -> String {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Token(axis) => {
                    let width = widths.get(*axis);
                    out.push_str(&format!("{:0width$}", coord.get(*axis), width = width));
                }
            }
        }
        out
    }

    /// Build a glob in which each token matches exactly `widths[axis]` digits.
    ///
    /// Literal text is escaped so that brackets or wildcards in directory
    /// names are matched verbatim.
    pub fn to_glob(&self, widths: DigitWidths) -> String {
        let mut out = String::with_capacity(self.raw.len() * 2);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(&glob::Pattern::escape(text)),
                Segment::Token(axis) => out.push_str(&"[0-9]".repeat(widths.get(*axis))),
            }
        }
        out
    }

    /// Regex extracting the coordinates from a path matched by
    /// [`to_glob`](Self::to_glob) with the same widths.
    ///
    /// The first token of each axis is captured under the axis letter. The
    /// expression is anchored at the end only, as glob results may carry a
    /// normalized prefix.
    pub(crate) fn coordinate_regex(&self, widths: DigitWidths) -> Result<Regex, PatternError> {
        let mut expr = String::new();
        let mut captured = [false; 3];
        let mut started = false;
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    if started {
                        expr.push_str(&regex::escape(text));
                    }
                }
                Segment::Token(axis) => {
                    started = true;
                    let width = widths.get(*axis);
                    if captured[axis.index()] {
                        expr.push_str(&format!(r"\d{{{}}}", width));
                    } else {
                        captured[axis.index()] = true;
                        expr.push_str(&format!(r"(?P<{}>\d{{{}}})", axis.letter(), width));
                    }
                }
            }
        }
        expr.push('$');

        Regex::new(&expr).map_err(|e| PatternError::Glob {
            glob: expr.clone(),
            message: e.to_string(),
        })
    }

    /// Parse a matched path back into a coordinate.
    ///
    /// Returns `None` if the path does not match or an axis captured no
    /// digits (a zero-width combination).
    pub(crate) fn extract(&self, matcher: &Regex, path: &str) -> Option<TileCoordinate> {
        let caps = matcher.captures(path)?;
        let mut coord = TileCoordinate::default();
        for axis in Axis::ALL {
            let digits = caps.name(&axis.letter().to_string())?.as_str();
            coord.set(axis, digits.parse().ok()?);
        }
        Some(coord)
    }
}

impl fmt::Display for TilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Check that every axis has at least one token.
pub fn validate(pattern: &str) -> Result<(), PatternError> {
    let counts = digit_counts(pattern);
    if Axis::ALL.iter().any(|axis| counts.get(*axis) == 0) {
        return Err(PatternError::InvalidPattern {
            pattern: pattern.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
