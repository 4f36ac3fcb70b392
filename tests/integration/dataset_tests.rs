//! Dataset model and property file tests.

use std::fs;

use serde_json::Value;
use stack_cuber::dataset::PROPERTIES_FILE_NAME;
use stack_cuber::io::StoreHeader;
use stack_cuber::{
    AnyDataset, BoundingBox, Category, ChunkStore, CubeDataset, DatasetError, ElementClass, Mag,
    RawCubeStore, TiledDataset,
};

use super::test_utils::MockStore;

fn read_properties(dir: &std::path::Path) -> Value {
    serde_json::from_slice(&fs::read(dir.join(PROPERTIES_FILE_NAME)).unwrap()).unwrap()
}

#[test]
fn test_round_trip_cube_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brain");

    let mut dataset = CubeDataset::create(&path, [11.24, 11.24, 25.0]).unwrap();
    dataset
        .add_layer("color", Category::Color, ElementClass::UInt8, 1)
        .unwrap();
    dataset
        .add_layer("segmentation", Category::Segmentation, ElementClass::UInt32, 1)
        .unwrap();
    dataset.add_mag("color", Mag::ONE, 32).unwrap();
    dataset.add_mag("color", Mag::uniform(2).unwrap(), 32).unwrap();
    dataset.add_mag("segmentation", Mag::new(2, 2, 1).unwrap(), 32).unwrap();
    dataset
        .set_bounding_box("color", BoundingBox::new([0, 0, 0], [1024, 1024, 512]))
        .unwrap();

    let reopened = CubeDataset::open(&path).unwrap();
    assert_eq!(reopened, dataset);
    assert_eq!(reopened.name(), "brain");
    assert_eq!(reopened.properties().team(), "");

    let color = reopened.get_layer("color").unwrap();
    assert_eq!(
        color.mags().collect::<Vec<_>>(),
        vec![Mag::ONE, Mag::uniform(2).unwrap()]
    );
    assert_eq!(color.bounding_box().size(), [1024, 1024, 512]);
}

#[test]
fn test_property_file_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema");

    let mut dataset = CubeDataset::create(&path, [1.0, 2.0, 3.0]).unwrap();
    dataset
        .add_layer("color", Category::Color, ElementClass::UInt16, 3)
        .unwrap();
    dataset.add_mag("color", Mag::new(2, 2, 1).unwrap(), 32).unwrap();

    let json = read_properties(&path);
    assert_eq!(json["id"]["name"], "schema");
    assert_eq!(json["scale"], serde_json::json!([1.0, 2.0, 3.0]));

    let layer = &json["dataLayers"][0];
    assert_eq!(layer["name"], "color");
    assert_eq!(layer["category"], "color");
    assert_eq!(layer["elementClass"], "uint16");
    assert_eq!(layer["num_channels"], 3);
    assert_eq!(layer["boundingBox"]["topLeft"], serde_json::json!([-1, -1, -1]));
    assert_eq!(
        layer["wkwResolutions"][0],
        serde_json::json!({"resolution": [2, 2, 1], "cubeLength": 32})
    );
}

#[test]
fn test_every_mutation_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ds");
    let mut dataset = CubeDataset::create(&path, [1.0; 3]).unwrap();

    dataset
        .add_layer("color", Category::Color, ElementClass::UInt8, 1)
        .unwrap();
    assert_eq!(CubeDataset::open(&path).unwrap(), dataset);

    dataset.add_mag("color", Mag::ONE, 32).unwrap();
    assert_eq!(CubeDataset::open(&path).unwrap(), dataset);

    dataset
        .grow_bounding_box("color", BoundingBox::new([0, 0, 0], [64, 64, 32]))
        .unwrap();
    assert_eq!(CubeDataset::open(&path).unwrap(), dataset);

    dataset.delete_mag("color", Mag::ONE).unwrap();
    assert_eq!(CubeDataset::open(&path).unwrap(), dataset);

    dataset.delete_layer("color").unwrap();
    assert_eq!(CubeDataset::open(&path).unwrap(), dataset);
}

#[test]
fn test_failed_mutation_leaves_state_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ds");
    let mut dataset = CubeDataset::create(&path, [1.0; 3]).unwrap();
    dataset
        .add_layer("color", Category::Color, ElementClass::UInt8, 1)
        .unwrap();
    dataset.add_mag("color", Mag::ONE, 32).unwrap();
    let before = dataset.clone();

    assert!(dataset.add_mag("color", Mag::ONE, 64).is_err());
    assert!(dataset
        .add_layer("color", Category::Color, ElementClass::UInt8, 1)
        .is_err());
    assert!(dataset.delete_mag("color", Mag::uniform(4).unwrap()).is_err());

    assert_eq!(dataset, before);
    assert_eq!(CubeDataset::open(&path).unwrap(), before);
}

#[test]
fn test_get_or_add_layer() {
    let dir = tempfile::tempdir().unwrap();
    let mut dataset = CubeDataset::create(&dir.path().join("ds"), [1.0; 3]).unwrap();

    for _ in 0..3 {
        let layer = dataset
            .get_or_add_layer("color", Category::Color, ElementClass::UInt8, 1)
            .unwrap();
        assert_eq!(layer.name(), "color");
    }
    assert_eq!(dataset.layers().len(), 1);

    let err = dataset
        .get_or_add_layer("color", Category::Color, ElementClass::Float32, 1)
        .unwrap_err();
    assert!(matches!(err, DatasetError::Conflict { .. }));
    assert!(err.to_string().contains("element class"));

    let err = dataset
        .get_or_add_layer("color", Category::Color, ElementClass::UInt8, 4)
        .unwrap_err();
    assert!(matches!(err, DatasetError::Conflict { .. }));
}

#[test]
fn test_lifecycle_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ds");

    assert!(matches!(
        CubeDataset::open(&path),
        Err(DatasetError::NotFound { .. })
    ));

    let dataset = CubeDataset::create(&path, [1.0; 3]).unwrap();
    assert!(matches!(
        CubeDataset::create(&path, [1.0; 3]),
        Err(DatasetError::AlreadyExists { .. })
    ));

    fs::write(path.join(PROPERTIES_FILE_NAME), "{\"id\": 3}").unwrap();
    assert!(matches!(
        CubeDataset::open(&path),
        Err(DatasetError::Parse { .. })
    ));

    dataset.delete().unwrap();
    assert!(!path.exists());
}

#[test]
fn test_tiled_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiled");

    let mut dataset = TiledDataset::create(&path, [5.0, 5.0, 40.0], None).unwrap();
    dataset
        .add_layer("color", Category::Color, ElementClass::UInt8, 1)
        .unwrap();
    dataset.add_mag("color", Mag::ONE).unwrap();
    dataset.add_mag("color", Mag::uniform(4).unwrap()).unwrap();

    let reopened = TiledDataset::open(&path).unwrap();
    assert_eq!(reopened, dataset);
    assert_eq!(reopened.pattern(), "{z}.tif");
    assert_eq!(reopened.tile_size(), None);

    let json = read_properties(&path);
    assert_eq!(
        json["dataLayers"][0]["wkwResolutions"][1],
        serde_json::json!({"resolution": [4, 4, 4]})
    );
}

#[test]
fn test_any_dataset_flavor_detection() {
    let dir = tempfile::tempdir().unwrap();
    let mut cube = CubeDataset::create(&dir.path().join("cube"), [1.0; 3]).unwrap();
    cube.add_layer("color", Category::Color, ElementClass::UInt8, 1)
        .unwrap();
    TiledDataset::create_tiled(&dir.path().join("tiled"), [1.0; 3], [512, 512], None).unwrap();

    match AnyDataset::open(&dir.path().join("cube")).unwrap() {
        AnyDataset::Cube(opened) => assert_eq!(opened, cube),
        other => panic!("expected cube dataset, got {:?}", other),
    }

    let tiled = AnyDataset::open(&dir.path().join("tiled")).unwrap();
    assert!(matches!(tiled, AnyDataset::Tiled(_)));
    assert!(tiled.layer_names().is_empty());
}

#[test]
fn test_legacy_channel_count_recovered_from_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy");
    fs::create_dir_all(&path).unwrap();

    let doc = serde_json::json!({
        "id": {"name": "legacy", "team": "lab"},
        "scale": [1.0, 1.0, 1.0],
        "dataLayers": [{
            "name": "color",
            "category": "color",
            "elementClass": "uint8",
            "boundingBox": {"topLeft": [0, 0, 0], "width": 64, "height": 64, "depth": 64},
            "wkwResolutions": [
                {"resolution": [4, 4, 4], "cubeLength": 32},
                {"resolution": [2, 2, 1], "cubeLength": 32}
            ]
        }]
    });
    fs::write(path.join(PROPERTIES_FILE_NAME), doc.to_string()).unwrap();

    let store = MockStore::new();
    assert!(matches!(
        CubeDataset::open_with(&path, &store),
        Err(DatasetError::MissingMetadata { .. })
    ));

    store
        .ensure(
            &path.join("color/2-2-1"),
            &StoreHeader::new(ElementClass::UInt8, 2),
        )
        .unwrap();
    let dataset = CubeDataset::open_with(&path, &store).unwrap();
    assert_eq!(dataset.get_layer("color").unwrap().num_channels(), 2);

    // the recovered attribute is written back on the next mutation
    let mut dataset = dataset;
    dataset
        .add_layer("other", Category::Color, ElementClass::UInt8, 1)
        .unwrap();
    let reopened = CubeDataset::open_with(&path, &RawCubeStore::new()).unwrap();
    assert_eq!(reopened.get_layer("color").unwrap().num_channels(), 2);
}
