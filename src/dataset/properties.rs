//! Property file persistence.
//!
//! Every dataset has one `datasource-properties.json`. Two flavors share the
//! layer and bounding box schema and differ in their resolution records and
//! dataset-level fields:
//!
//! | Flavor | Resolution record | Dataset fields |
//! |---|---|---|
//! | [`CubeLayout`] | `resolution`, `cubeLength` | none |
//! | [`TiledLayout`] | `resolution` | `pattern`, `grid_shape`, `tile_size` |
//!
//! Every mutation goes through [`Properties::mutate`], which writes the file
//! before returning and restores the in-memory state if the write fails.

use std::fmt;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::error::DatasetError;
use crate::io::ChunkStore;

use super::Mag;

/// File name of the property file inside a dataset directory.
pub const PROPERTIES_FILE_NAME: &str = "datasource-properties.json";

// =============================================================================
// Layer Attributes
// =============================================================================

/// Kind of data a layer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Color,
    Segmentation,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Color => f.write_str("color"),
            Category::Segmentation => f.write_str("segmentation"),
        }
    }
}

/// Voxel element type of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementClass {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl ElementClass {
    /// Size of one sample in bytes.
    pub fn byte_size(self) -> usize {
        match self {
            ElementClass::UInt8 => 1,
            ElementClass::UInt16 => 2,
            ElementClass::UInt32 | ElementClass::Float32 => 4,
            ElementClass::UInt64 | ElementClass::Float64 => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ElementClass::UInt8 => "uint8",
            ElementClass::UInt16 => "uint16",
            ElementClass::UInt32 => "uint32",
            ElementClass::UInt64 => "uint64",
            ElementClass::Float32 => "float32",
            ElementClass::Float64 => "float64",
        }
    }
}

impl fmt::Display for ElementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uint8" => Ok(ElementClass::UInt8),
            "uint16" => Ok(ElementClass::UInt16),
            "uint32" => Ok(ElementClass::UInt32),
            "uint64" => Ok(ElementClass::UInt64),
            "float32" | "float" => Ok(ElementClass::Float32),
            "float64" | "double" => Ok(ElementClass::Float64),
            other => Err(format!("unknown element class: {}", other)),
        }
    }
}

/// Axis-aligned region known to contain a layer's written data.
///
/// A new layer starts empty: `topLeft` is the sentinel `(-1, -1, -1)` and all
/// sizes are 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub top_left: [i64; 3],
    pub width: u64,
    pub height: u64,
    pub depth: u64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            top_left: [-1, -1, -1],
            width: 0,
            height: 0,
            depth: 0,
        }
    }
}

impl BoundingBox {
    pub fn new(offset: [i64; 3], size: [u64; 3]) -> Self {
        Self {
            top_left: offset,
            width: size[0],
            height: size[1],
            depth: size[2],
        }
    }

    pub fn offset(&self) -> [i64; 3] {
        self.top_left
    }

    pub fn size(&self) -> [u64; 3] {
        [self.width, self.height, self.depth]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }

    /// Exclusive upper corner.
    pub fn end(&self) -> [i64; 3] {
        let size = self.size();
        [
            self.top_left[0] + size[0] as i64,
            self.top_left[1] + size[1] as i64,
            self.top_left[2] + size[2] as i64,
        ]
    }

    /// Smallest box enclosing both boxes. Empty boxes are ignored.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        let (a_end, b_end) = (self.end(), other.end());
        let mut offset = [0i64; 3];
        let mut size = [0u64; 3];
        for axis in 0..3 {
            offset[axis] = self.top_left[axis].min(other.top_left[axis]);
            size[axis] = (a_end[axis].max(b_end[axis]) - offset[axis]) as u64;
        }
        BoundingBox::new(offset, size)
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.union(other) == *self
    }
}

// =============================================================================
// Resolution Records
// =============================================================================

/// One magnification entry of a layer, as persisted by a flavor.
pub trait Resolution:
    Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static
{
    fn mag(&self) -> Mag;
}

/// Resolution record of the chunk-cube flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CubeResolution {
    pub resolution: Mag,

    #[serde(rename = "cubeLength")]
    pub cube_length: u32,
}

impl Resolution for CubeResolution {
    fn mag(&self) -> Mag {
        self.resolution
    }
}

/// Resolution record of the tiled-image flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TiledResolution {
    pub resolution: Mag,
}

impl Resolution for TiledResolution {
    fn mag(&self) -> Mag {
        self.resolution
    }
}

// =============================================================================
// Layer Properties
// =============================================================================

/// Persisted description of one layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(bound = "R: Resolution")]
pub struct LayerProperties<R> {
    name: String,
    category: Category,
    #[serde(rename = "elementClass")]
    element_class: ElementClass,
    num_channels: usize,
    #[serde(rename = "boundingBox")]
    bounding_box: BoundingBox,
    #[serde(rename = "wkwResolutions")]
    resolutions: Vec<R>,
}

impl<R: Resolution> LayerProperties<R> {
    pub(crate) fn new(
        name: &str,
        category: Category,
        element_class: ElementClass,
        num_channels: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            category,
            element_class,
            num_channels,
            bounding_box: BoundingBox::default(),
            resolutions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn element_class(&self) -> ElementClass {
        self.element_class
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    pub fn resolutions(&self) -> &[R] {
        &self.resolutions
    }

    pub fn mags(&self) -> impl Iterator<Item = Mag> + '_ {
        self.resolutions.iter().map(Resolution::mag)
    }

    pub fn has_mag(&self, mag: Mag) -> bool {
        self.mags().any(|m| m == mag)
    }

    /// Resolution with the smallest downsampling factor.
    pub fn finest_mag(&self) -> Option<Mag> {
        self.mags().min_by_key(|m| (m.max_dim(), m.to_array()))
    }

    pub(crate) fn set_bounding_box(&mut self, bounding_box: BoundingBox) {
        self.bounding_box = bounding_box;
    }

    pub(crate) fn resolutions_mut(&mut self) -> &mut Vec<R> {
        &mut self.resolutions
    }
}

/// Layer as read from disk; legacy files may omit the channel count.
#[derive(Deserialize)]
#[serde(bound = "R: Resolution")]
struct StoredLayer<R> {
    name: String,
    category: Category,
    #[serde(rename = "elementClass")]
    element_class: ElementClass,
    #[serde(default)]
    num_channels: Option<usize>,
    #[serde(rename = "boundingBox", default, deserialize_with = "empty_as_default")]
    bounding_box: BoundingBox,
    #[serde(rename = "wkwResolutions", default)]
    resolutions: Vec<R>,
}

/// Treat `{}` or `null` as the default value.
fn empty_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(T::default()),
        Value::Object(map) if map.is_empty() => Ok(T::default()),
        other => serde_json::from_value(other).map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// Flavors
// =============================================================================

/// Dataset-level fields and resolution record type of one dataset flavor.
pub trait Flavor:
    Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static
{
    type Resolution: Resolution;

    /// Short flavor name for logs and errors.
    const NAME: &'static str;
}

/// Chunk-cube flavor: no dataset-level fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CubeLayout {}

impl Flavor for CubeLayout {
    type Resolution = CubeResolution;
    const NAME: &'static str = "cube";
}

/// Name of the flavor a parsed property file belongs to.
///
/// Only tiled datasets carry a top-level `pattern`.
pub fn flavor_of(document: &Value) -> &'static str {
    if document.get("pattern").is_some() {
        TiledLayout::NAME
    } else {
        CubeLayout::NAME
    }
}

/// Default file pattern of a tiled dataset.
pub const DEFAULT_TILED_PATTERN: &str = "{z}.tif";

/// Tiled-image flavor: images laid out by a filename pattern on a grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TiledLayout {
    pub pattern: String,

    #[serde(default)]
    pub grid_shape: [u64; 2],

    /// Tile `(width, height)`; persisted as `{}` when untiled
    #[serde(
        default,
        serialize_with = "serialize_tile_size",
        deserialize_with = "empty_as_default"
    )]
    pub tile_size: Option<[u32; 2]>,
}

impl TiledLayout {
    pub fn new(pattern: &str, tile_size: Option<[u32; 2]>) -> Self {
        Self {
            pattern: pattern.to_string(),
            grid_shape: [0, 0],
            tile_size,
        }
    }
}

impl Flavor for TiledLayout {
    type Resolution = TiledResolution;
    const NAME: &'static str = "tiled";
}

fn serialize_tile_size<S: Serializer>(
    tile_size: &Option<[u32; 2]>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match tile_size {
        Some(size) => size.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

// =============================================================================
// Properties
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DatasetId {
    name: String,
    #[serde(default)]
    team: String,
}

#[derive(Serialize)]
#[serde(bound = "R: Resolution")]
struct Document<'a, R> {
    id: &'a DatasetId,
    scale: [f64; 3],
    #[serde(rename = "dataLayers")]
    data_layers: &'a [LayerProperties<R>],
}

#[derive(Deserialize)]
#[serde(bound = "R: Resolution")]
struct StoredDocument<R> {
    id: DatasetId,
    scale: [f64; 3],
    #[serde(rename = "dataLayers", default)]
    data_layers: Vec<StoredLayer<R>>,
}

/// In-memory image of a property file.
#[derive(Debug, Clone, PartialEq)]
pub struct Properties<F: Flavor> {
    path: PathBuf,
    id: DatasetId,
    scale: [f64; 3],
    data_layers: Vec<LayerProperties<F::Resolution>>,
    layout: F,
}

impl<F: Flavor> Properties<F> {
    /// Build properties for a new dataset; nothing is written yet.
    pub fn new(path: impl Into<PathBuf>, name: &str, scale: [f64; 3], layout: F) -> Self {
        Self {
            path: path.into(),
            id: DatasetId {
                name: name.to_string(),
                team: String::new(),
            },
            scale,
            data_layers: Vec::new(),
            layout,
        }
    }

    /// Load a property file.
    ///
    /// Layers without a `num_channels` attribute recover it from the storage
    /// header of their finest magnification.
    pub fn load<S: ChunkStore + ?Sized>(path: &Path, store: &S) -> Result<Self, DatasetError> {
        if !path.is_file() {
            return Err(DatasetError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let parse_error = |message: String| DatasetError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let value: Value =
            serde_json::from_slice(&fs::read(path)?).map_err(|e| parse_error(e.to_string()))?;
        let found = flavor_of(&value);
        if found != F::NAME {
            return Err(DatasetError::WrongFlavor {
                path: path.to_path_buf(),
                expected: F::NAME,
                found,
            });
        }
        let stored: StoredDocument<F::Resolution> =
            serde_json::from_value(value.clone()).map_err(|e| parse_error(e.to_string()))?;
        let layout: F = serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))?;

        let dataset_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut data_layers: Vec<LayerProperties<F::Resolution>> = Vec::new();
        for layer in stored.data_layers {
            if data_layers.iter().any(|l| l.name == layer.name) {
                return Err(parse_error(format!("duplicate layer {}", layer.name)));
            }
            for (i, resolution) in layer.resolutions.iter().enumerate() {
                if layer.resolutions[..i].iter().any(|r| r.mag() == resolution.mag()) {
                    return Err(parse_error(format!(
                        "duplicate magnification {} in layer {}",
                        resolution.mag(),
                        layer.name
                    )));
                }
            }

            let num_channels = match layer.num_channels {
                Some(n) => n,
                None => recover_num_channels(dataset_dir, &layer, store)?,
            };

            data_layers.push(LayerProperties {
                name: layer.name,
                category: layer.category,
                element_class: layer.element_class,
                num_channels,
                bounding_box: layer.bounding_box,
                resolutions: layer.resolutions,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            id: stored.id,
            scale: stored.scale,
            data_layers,
            layout,
        })
    }

    /// Write the property file.
    pub fn save(&self) -> Result<(), DatasetError> {
        let document = Document {
            id: &self.id,
            scale: self.scale,
            data_layers: &self.data_layers,
        };
        let parse_error = |e: serde_json::Error| DatasetError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        };

        let mut value = serde_json::to_value(&document).map_err(parse_error)?;
        if let (Value::Object(fields), Value::Object(extra)) =
            (&mut value, serde_json::to_value(&self.layout).map_err(parse_error)?)
        {
            fields.extend(extra);
        }

        let json = serde_json::to_vec_pretty(&value).map_err(parse_error)?;
        fs::write(&self.path, json)?;
        debug!("Wrote {} properties to {}", F::NAME, self.path.display());
        Ok(())
    }

    /// Apply a mutation and persist it.
    ///
    /// If the mutation or the write fails, the layers are restored to their
    /// previous state so memory and disk never diverge.
    pub(crate) fn mutate<T>(
        &mut self,
        change: impl FnOnce(&mut Vec<LayerProperties<F::Resolution>>) -> Result<T, DatasetError>,
    ) -> Result<T, DatasetError> {
        let snapshot = self.data_layers.clone();
        let result = change(&mut self.data_layers).and_then(|value| {
            self.save()?;
            Ok(value)
        });
        if result.is_err() {
            self.data_layers = snapshot;
        }
        result
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn team(&self) -> &str {
        &self.id.team
    }

    pub fn scale(&self) -> [f64; 3] {
        self.scale
    }

    pub fn layout(&self) -> &F {
        &self.layout
    }

    pub fn data_layers(&self) -> &[LayerProperties<F::Resolution>] {
        &self.data_layers
    }

    pub fn layer(&self, name: &str) -> Option<&LayerProperties<F::Resolution>> {
        self.data_layers.iter().find(|l| l.name == name)
    }
}

fn recover_num_channels<R: Resolution, S: ChunkStore + ?Sized>(
    dataset_dir: &Path,
    layer: &StoredLayer<R>,
    store: &S,
) -> Result<usize, DatasetError> {
    let layer_dir = dataset_dir.join(&layer.name);
    let finest = layer
        .resolutions
        .iter()
        .map(Resolution::mag)
        .min_by_key(|m| (m.max_dim(), m.to_array()));

    let Some(mag) = finest else {
        return Err(DatasetError::MissingMetadata {
            layer: layer.name.clone(),
            path: layer_dir,
        });
    };

    let mag_dir = layer_dir.join(mag.to_layer_name());
    match store.read_header(&mag_dir) {
        Ok(header) => {
            debug!(
                "Recovered num_channels={} for layer {} from {}",
                header.num_channels,
                layer.name,
                mag_dir.display()
            );
            Ok(header.num_channels)
        }
        Err(_) => Err(DatasetError::MissingMetadata {
            layer: layer.name.clone(),
            path: mag_dir,
        }),
    }
}

// =============================================================================
// Tests
// =============================================================================
