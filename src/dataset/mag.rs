//! Magnification vectors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DatasetError;

/// Downsampling factor per axis identifying one resolution level.
///
/// Rendered as `"1"` or `"2"` when uniform and `"2-2-1"` otherwise; this is
/// also the name of the magnification's directory inside a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mag([u32; 3]);

impl Mag {
    /// Full resolution.
    pub const ONE: Mag = Mag([1, 1, 1]);

    pub fn new(x: u32, y: u32, z: u32) -> Result<Self, DatasetError> {
        Self::from_array([x, y, z])
    }

    pub fn uniform(factor: u32) -> Result<Self, DatasetError> {
        Self::from_array([factor; 3])
    }

    fn from_array(factors: [u32; 3]) -> Result<Self, DatasetError> {
        if factors.contains(&0) {
            return Err(DatasetError::InvalidMag(format!(
                "factors must be positive, got {:?}",
                factors
            )));
        }
        Ok(Self(factors))
    }

    pub fn to_array(self) -> [u32; 3] {
        self.0
    }

    /// Largest factor over all axes.
    pub fn max_dim(self) -> u32 {
        self.0.iter().copied().max().unwrap_or(1)
    }

    /// Directory name of this magnification inside a layer.
    pub fn to_layer_name(self) -> String {
        let [x, y, z] = self.0;
        if x == y && y == z {
            x.to_string()
        } else {
            format!("{}-{}-{}", x, y, z)
        }
    }
}

impl fmt::Display for Mag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_layer_name())
    }
}

impl FromStr for Mag {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('-').collect();
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| DatasetError::InvalidMag(s.to_string()))
        };
        match parts.as_slice() {
            [factor] => Self::uniform(parse(factor)?),
            [x, y, z] => Self::new(parse(x)?, parse(y)?, parse(z)?),
            _ => Err(DatasetError::InvalidMag(s.to_string())),
        }
    }
}

impl Serialize for Mag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Accepted on-disk spellings of a magnification.
#[derive(Deserialize)]
#[serde(untagged)]
enum MagRepr {
    Array([u32; 3]),
    Factor(u32),
    Text(String),
}

impl<'de> Deserialize<'de> for Mag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mag = match MagRepr::deserialize(deserializer)? {
            MagRepr::Array(factors) => Mag::from_array(factors),
            MagRepr::Factor(factor) => Mag::uniform(factor),
            MagRepr::Text(text) => text.parse(),
        };
        mag.map_err(serde::de::Error::custom)
    }
}
