//! Dataset metadata model and property file persistence.
//!
//! ```text
//!   Dataset ──┬── Layer "color"  (category, element class, channels, bbox)
//!             │      ├── Mag 1      ──► <dataset>/color/1
//!             │      └── Mag 2-2-1  ──► <dataset>/color/2-2-1
//!             └── Layer "segmentation"
//!
//!   datasource-properties.json  ◄── written through on every mutation
//! ```
//!
//! Two flavors share the layer schema: [`CubeDataset`] stores resolution
//! records with a cube length, [`TiledDataset`] stores plain resolutions plus
//! a filename pattern and tile grid. [`AnyDataset`] picks the flavor from the
//! property file.

mod mag;
mod model;
mod properties;

pub use mag::Mag;
pub use model::{AnyDataset, AnyLayer, CubeDataset, Dataset, TiledDataset};
pub use properties::{
    flavor_of, BoundingBox, Category, CubeLayout, CubeResolution, ElementClass, Flavor, LayerProperties,
    Properties, Resolution, TiledLayout, TiledResolution, DEFAULT_TILED_PATTERN,
    PROPERTIES_FILE_NAME,
};
