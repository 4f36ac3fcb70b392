//! Dataset, layer and magnification model.
//!
//! A [`Dataset`] owns its [`Properties`] and is the only writer of the
//! property file. All mutations are written through synchronously.

use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::error::DatasetError;
use crate::io::{ChunkStore, RawCubeStore};

use super::properties::{
    flavor_of, BoundingBox, Category, CubeLayout, CubeResolution, ElementClass, Flavor,
    LayerProperties, Properties, Resolution, TiledLayout, TiledResolution,
    DEFAULT_TILED_PATTERN, PROPERTIES_FILE_NAME,
};
use super::Mag;

/// One on-disk volumetric dataset of flavor `F`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<F: Flavor> {
    path: PathBuf,
    properties: Properties<F>,
}

/// Chunk-cube dataset.
pub type CubeDataset = Dataset<CubeLayout>;

/// Tiled-image dataset.
pub type TiledDataset = Dataset<TiledLayout>;

/// Final component of the lexically normalized, absolute dataset path.
fn dataset_name(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_empty_dir(path: &Path) -> Result<bool, DatasetError> {
    Ok(path.is_dir() && fs::read_dir(path)?.next().is_none())
}

impl<F: Flavor> Dataset<F> {
    /// Create the dataset directory and write the initial property file.
    ///
    /// Fails with [`DatasetError::AlreadyExists`] if the directory exists.
    fn create_with_layout(
        path: &Path,
        scale: [f64; 3],
        layout: F,
        allow_empty_dir: bool,
    ) -> Result<Self, DatasetError> {
        if path.exists() && !(allow_empty_dir && is_empty_dir(path)?) {
            return Err(DatasetError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        let properties = Properties::new(
            path.join(PROPERTIES_FILE_NAME),
            &dataset_name(path),
            scale,
            layout,
        );

        fs::create_dir_all(path)?;
        properties.save()?;
        info!("Created {} dataset at {}", F::NAME, path.display());

        Ok(Self {
            path: path.to_path_buf(),
            properties,
        })
    }

    /// Open a dataset, using `store` to recover legacy channel counts.
    pub fn open_with<S: ChunkStore + ?Sized>(path: &Path, store: &S) -> Result<Self, DatasetError> {
        let properties = Properties::load(&path.join(PROPERTIES_FILE_NAME), store)?;
        Ok(Self {
            path: path.to_path_buf(),
            properties,
        })
    }

    /// Open a dataset stored with the local [`RawCubeStore`].
    pub fn open(path: &Path) -> Result<Self, DatasetError> {
        Self::open_with(path, &RawCubeStore)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.properties.name()
    }

    pub fn scale(&self) -> [f64; 3] {
        self.properties.scale()
    }

    pub fn properties(&self) -> &Properties<F> {
        &self.properties
    }

    pub fn layers(&self) -> &[LayerProperties<F::Resolution>] {
        self.properties.data_layers()
    }

    pub fn get_layer(&self, name: &str) -> Result<&LayerProperties<F::Resolution>, DatasetError> {
        self.properties
            .layer(name)
            .ok_or_else(|| DatasetError::LayerNotFound {
                name: name.to_string(),
            })
    }

    /// Register a new layer.
    ///
    /// Fails with [`DatasetError::DuplicateLayer`] if the name is taken.
    pub fn add_layer(
        &mut self,
        name: &str,
        category: Category,
        element_class: ElementClass,
        num_channels: usize,
    ) -> Result<&LayerProperties<F::Resolution>, DatasetError> {
        self.properties.mutate(|layers| {
            if layers.iter().any(|l| l.name() == name) {
                return Err(DatasetError::DuplicateLayer {
                    name: name.to_string(),
                });
            }
            layers.push(LayerProperties::new(name, category, element_class, num_channels));
            Ok(())
        })?;
        self.get_layer(name)
    }

    /// Return the existing layer if it matches the registration, add it otherwise.
    ///
    /// Fails with [`DatasetError::Conflict`] if the layer exists with a
    /// different category, element class or channel count.
    pub fn get_or_add_layer(
        &mut self,
        name: &str,
        category: Category,
        element_class: ElementClass,
        num_channels: usize,
    ) -> Result<&LayerProperties<F::Resolution>, DatasetError> {
        if self.properties.layer(name).is_none() {
            return self.add_layer(name, category, element_class, num_channels);
        }
        let existing = self.get_layer(name)?;

        let conflict = |field: &'static str, existing: String, requested: String| {
            Err(DatasetError::Conflict {
                name: name.to_string(),
                field,
                existing,
                requested,
            })
        };
        if existing.category() != category {
            return conflict(
                "category",
                existing.category().to_string(),
                category.to_string(),
            );
        }
        if existing.element_class() != element_class {
            return conflict(
                "element class",
                existing.element_class().to_string(),
                element_class.to_string(),
            );
        }
        if existing.num_channels() != num_channels {
            return conflict(
                "number of channels",
                existing.num_channels().to_string(),
                num_channels.to_string(),
            );
        }
        Ok(existing)
    }

    /// Remove a layer's record and its directory.
    pub fn delete_layer(&mut self, name: &str) -> Result<(), DatasetError> {
        self.properties.mutate(|layers| {
            let index = layers
                .iter()
                .position(|l| l.name() == name)
                .ok_or_else(|| DatasetError::LayerNotFound {
                    name: name.to_string(),
                })?;
            layers.remove(index);
            Ok(())
        })?;

        let layer_dir = self.path.join(name);
        if layer_dir.exists() {
            fs::remove_dir_all(&layer_dir)?;
        }
        Ok(())
    }

    fn add_resolution(&mut self, layer: &str, record: F::Resolution) -> Result<(), DatasetError> {
        self.properties.mutate(|layers| {
            let entry = find_layer_mut(layers, layer)?;
            let mag = record.mag();
            if entry.has_mag(mag) {
                return Err(DatasetError::DuplicateMag {
                    layer: layer.to_string(),
                    mag: mag.to_string(),
                });
            }
            entry.resolutions_mut().push(record);
            Ok(())
        })
    }

    /// Remove a magnification record and its directory.
    pub fn delete_mag(&mut self, layer: &str, mag: Mag) -> Result<(), DatasetError> {
        self.properties.mutate(|layers| {
            let entry = find_layer_mut(layers, layer)?;
            let resolutions = entry.resolutions_mut();
            let index = resolutions
                .iter()
                .position(|r| r.mag() == mag)
                .ok_or_else(|| DatasetError::MagNotFound {
                    layer: layer.to_string(),
                    mag: mag.to_string(),
                })?;
            resolutions.remove(index);
            Ok(())
        })?;

        let mag_dir = self.path.join(layer).join(mag.to_layer_name());
        if mag_dir.exists() {
            fs::remove_dir_all(&mag_dir)?;
        }
        Ok(())
    }

    /// Replace a layer's bounding box.
    pub fn set_bounding_box(
        &mut self,
        layer: &str,
        bounding_box: BoundingBox,
    ) -> Result<(), DatasetError> {
        self.properties.mutate(|layers| {
            find_layer_mut(layers, layer)?.set_bounding_box(bounding_box);
            Ok(())
        })
    }

    /// Grow a layer's bounding box to enclose a written region.
    ///
    /// Returns the resulting box. The box never shrinks.
    pub fn grow_bounding_box(
        &mut self,
        layer: &str,
        written: BoundingBox,
    ) -> Result<BoundingBox, DatasetError> {
        self.properties.mutate(|layers| {
            let entry = find_layer_mut(layers, layer)?;
            let grown = entry.bounding_box().union(&written);
            entry.set_bounding_box(grown);
            Ok(grown)
        })
    }

    /// Directory of one magnification, as handed to the storage engine.
    pub fn mag_path(&self, layer: &str, mag: Mag) -> Result<PathBuf, DatasetError> {
        let entry = self.get_layer(layer)?;
        if !entry.has_mag(mag) {
            return Err(DatasetError::MagNotFound {
                layer: layer.to_string(),
                mag: mag.to_string(),
            });
        }
        Ok(self.path.join(entry.name()).join(mag.to_layer_name()))
    }

    /// Delete the dataset directory and everything in it.
    pub fn delete(self) -> Result<(), DatasetError> {
        fs::remove_dir_all(&self.path)?;
        info!("Deleted dataset at {}", self.path.display());
        Ok(())
    }
}

fn find_layer_mut<'a, R: Resolution>(
    layers: &'a mut [LayerProperties<R>],
    name: &str,
) -> Result<&'a mut LayerProperties<R>, DatasetError> {
    layers
        .iter_mut()
        .find(|l| l.name() == name)
        .ok_or_else(|| DatasetError::LayerNotFound {
            name: name.to_string(),
        })
}

impl Dataset<CubeLayout> {
    pub fn create(path: &Path, scale: [f64; 3]) -> Result<Self, DatasetError> {
        Self::create_with_layout(path, scale, CubeLayout::default(), false)
    }

    /// Like [`create`](Self::create), but also accepts an existing empty directory.
    pub fn create_in_empty(path: &Path, scale: [f64; 3]) -> Result<Self, DatasetError> {
        Self::create_with_layout(path, scale, CubeLayout::default(), true)
    }

    /// Register a magnification stored in cubes of `cube_length` voxels.
    pub fn add_mag(&mut self, layer: &str, mag: Mag, cube_length: u32) -> Result<(), DatasetError> {
        self.add_resolution(
            layer,
            CubeResolution {
                resolution: mag,
                cube_length,
            },
        )
    }
}

impl Dataset<TiledLayout> {
    /// Create an untiled dataset with one image per z-slice.
    pub fn create(path: &Path, scale: [f64; 3], pattern: Option<&str>) -> Result<Self, DatasetError> {
        let layout = TiledLayout::new(pattern.unwrap_or(DEFAULT_TILED_PATTERN), None);
        Self::create_with_layout(path, scale, layout, false)
    }

    /// Create a dataset whose slices are split into tiles of `tile_size`.
    pub fn create_tiled(
        path: &Path,
        scale: [f64; 3],
        tile_size: [u32; 2],
        pattern: Option<&str>,
    ) -> Result<Self, DatasetError> {
        let layout = TiledLayout::new(pattern.unwrap_or(DEFAULT_TILED_PATTERN), Some(tile_size));
        Self::create_with_layout(path, scale, layout, false)
    }

    pub fn add_mag(&mut self, layer: &str, mag: Mag) -> Result<(), DatasetError> {
        self.add_resolution(layer, TiledResolution { resolution: mag })
    }

    pub fn pattern(&self) -> &str {
        &self.properties.layout().pattern
    }

    pub fn grid_shape(&self) -> [u64; 2] {
        self.properties.layout().grid_shape
    }

    pub fn tile_size(&self) -> Option<[u32; 2]> {
        self.properties.layout().tile_size
    }
}

// =============================================================================
// Flavor Dispatch
// =============================================================================

/// A dataset of either flavor.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyDataset {
    Cube(CubeDataset),
    Tiled(TiledDataset),
}

/// A layer of either flavor, borrowed from an [`AnyDataset`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnyLayer<'a> {
    Cube(&'a LayerProperties<CubeResolution>),
    Tiled(&'a LayerProperties<TiledResolution>),
}

impl AnyLayer<'_> {
    pub fn name(&self) -> &str {
        match self {
            AnyLayer::Cube(l) => l.name(),
            AnyLayer::Tiled(l) => l.name(),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            AnyLayer::Cube(l) => l.category(),
            AnyLayer::Tiled(l) => l.category(),
        }
    }

    pub fn element_class(&self) -> ElementClass {
        match self {
            AnyLayer::Cube(l) => l.element_class(),
            AnyLayer::Tiled(l) => l.element_class(),
        }
    }

    pub fn num_channels(&self) -> usize {
        match self {
            AnyLayer::Cube(l) => l.num_channels(),
            AnyLayer::Tiled(l) => l.num_channels(),
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            AnyLayer::Cube(l) => *l.bounding_box(),
            AnyLayer::Tiled(l) => *l.bounding_box(),
        }
    }

    pub fn mags(&self) -> Vec<Mag> {
        match self {
            AnyLayer::Cube(l) => l.mags().collect(),
            AnyLayer::Tiled(l) => l.mags().collect(),
        }
    }
}

impl AnyDataset {
    /// Open a dataset, picking the flavor from the property file.
    ///
    /// Files carrying a `pattern` field are tiled datasets.
    pub fn open(path: &Path) -> Result<Self, DatasetError> {
        Self::open_with(path, &RawCubeStore)
    }

    pub fn open_with<S: ChunkStore + ?Sized>(path: &Path, store: &S) -> Result<Self, DatasetError> {
        let file = path.join(PROPERTIES_FILE_NAME);
        if !file.is_file() {
            return Err(DatasetError::NotFound { path: file });
        }
        let value: Value =
            serde_json::from_slice(&fs::read(&file)?).map_err(|e| DatasetError::Parse {
                path: file.clone(),
                message: e.to_string(),
            })?;

        if flavor_of(&value) == TiledLayout::NAME {
            Ok(AnyDataset::Tiled(Dataset::open_with(path, store)?))
        } else {
            Ok(AnyDataset::Cube(Dataset::open_with(path, store)?))
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            AnyDataset::Cube(d) => d.path(),
            AnyDataset::Tiled(d) => d.path(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AnyDataset::Cube(d) => d.name(),
            AnyDataset::Tiled(d) => d.name(),
        }
    }

    pub fn layer_names(&self) -> Vec<&str> {
        match self {
            AnyDataset::Cube(d) => d.layers().iter().map(|l| l.name()).collect(),
            AnyDataset::Tiled(d) => d.layers().iter().map(|l| l.name()).collect(),
        }
    }

    pub fn get_layer(&self, name: &str) -> Result<AnyLayer<'_>, DatasetError> {
        match self {
            AnyDataset::Cube(d) => d.get_layer(name).map(AnyLayer::Cube),
            AnyDataset::Tiled(d) => d.get_layer(name).map(AnyLayer::Tiled),
        }
    }

    pub fn add_layer(
        &mut self,
        name: &str,
        category: Category,
        element_class: ElementClass,
        num_channels: usize,
    ) -> Result<AnyLayer<'_>, DatasetError> {
        match self {
            AnyDataset::Cube(d) => d
                .add_layer(name, category, element_class, num_channels)
                .map(AnyLayer::Cube),
            AnyDataset::Tiled(d) => d
                .add_layer(name, category, element_class, num_channels)
                .map(AnyLayer::Tiled),
        }
    }

    pub fn get_or_add_layer(
        &mut self,
        name: &str,
        category: Category,
        element_class: ElementClass,
        num_channels: usize,
    ) -> Result<AnyLayer<'_>, DatasetError> {
        match self {
            AnyDataset::Cube(d) => d
                .get_or_add_layer(name, category, element_class, num_channels)
                .map(AnyLayer::Cube),
            AnyDataset::Tiled(d) => d
                .get_or_add_layer(name, category, element_class, num_channels)
                .map(AnyLayer::Tiled),
        }
    }

    pub fn delete_layer(&mut self, name: &str) -> Result<(), DatasetError> {
        match self {
            AnyDataset::Cube(d) => d.delete_layer(name),
            AnyDataset::Tiled(d) => d.delete_layer(name),
        }
    }

    pub fn delete_mag(&mut self, layer: &str, mag: Mag) -> Result<(), DatasetError> {
        match self {
            AnyDataset::Cube(d) => d.delete_mag(layer, mag),
            AnyDataset::Tiled(d) => d.delete_mag(layer, mag),
        }
    }

    pub fn grow_bounding_box(
        &mut self,
        layer: &str,
        written: BoundingBox,
    ) -> Result<BoundingBox, DatasetError> {
        match self {
            AnyDataset::Cube(d) => d.grow_bounding_box(layer, written),
            AnyDataset::Tiled(d) => d.grow_bounding_box(layer, written),
        }
    }

    pub fn mag_path(&self, layer: &str, mag: Mag) -> Result<PathBuf, DatasetError> {
        match self {
            AnyDataset::Cube(d) => d.mag_path(layer, mag),
            AnyDataset::Tiled(d) => d.mag_path(layer, mag),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
