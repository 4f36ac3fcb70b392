//! End-to-end cubing pipeline tests.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use stack_cuber::{
    tile_cubing, BoundingBox, Category, CubeDataset, CubingError, CubingSettings, DatasetError,
    ElementClass, ImageTileDecoder, Mag, RawCubeStore, TiledDataset,
};

use super::test_utils::{
    create_column_stack, create_scenario_stack, pattern_in, write_gray_tile, FailingDecoder,
    MockStore,
};

fn settings(target: &Path, pattern: String) -> CubingSettings {
    let mut settings = CubingSettings::new(target, "color", pattern);
    settings.parallelism = 4;
    settings
}

fn raw_blocks(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".raw"))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_scenario_stack_into_raw_store() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let dataset_path = target.path().join("dataset");
    let settings = settings(&dataset_path, create_scenario_stack(source.path()));

    let summary = tile_cubing(
        &settings,
        &RawCubeStore::new(),
        Arc::new(ImageTileDecoder::new()),
    )
    .await
    .unwrap();

    assert_eq!(summary.file_count, 16);
    assert_eq!(
        (
            summary.geometry.width,
            summary.geometry.height,
            summary.geometry.channels
        ),
        (128, 128, 1)
    );
    assert_eq!(summary.jobs, 1);
    assert_eq!(summary.columns_written, 4);
    assert_eq!(
        summary.bounding_box,
        BoundingBox::new([0, 0, 0], [256, 256, 5])
    );

    let mag_dir = dataset_path.join("color/1");
    assert_eq!(
        raw_blocks(&mag_dir),
        vec![
            "0_0_0.1x128x128x5.raw",
            "0_128_0.1x128x128x5.raw",
            "128_0_0.1x128x128x5.raw",
            "128_128_0.1x128x128x5.raw",
        ]
    );

    let dataset = CubeDataset::open(&dataset_path).unwrap();
    let layer = dataset.get_layer("color").unwrap();
    assert_eq!(layer.category(), Category::Color);
    assert_eq!(layer.element_class(), ElementClass::UInt8);
    assert_eq!(layer.num_channels(), 1);
    assert!(layer.has_mag(Mag::ONE));
    assert_eq!(*layer.bounding_box(), summary.bounding_box);
}

#[tokio::test]
async fn test_blank_columns_are_not_written() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    for z in 0..3 {
        write_gray_tile(&source.path().join(format!("{}/0/0.png", z)), 8, 8, 9);
        write_gray_tile(&source.path().join(format!("{}/1/1.png", z)), 8, 8, 9);
    }
    let store = MockStore::new();
    let settings = settings(
        &target.path().join("ds"),
        pattern_in(source.path(), "{z}/{y}/{x}.png"),
    );

    let summary = tile_cubing(&settings, &store, Arc::new(ImageTileDecoder::new()))
        .await
        .unwrap();
    assert_eq!(summary.columns_written, 2);
    assert_eq!(summary.columns_skipped, 2);

    let offsets: Vec<[i64; 3]> = store.writes().iter().map(|w| w.offset).collect();
    assert_eq!(offsets, vec![[0, 0, 0], [8, 8, 0]]);
    assert!(store.writes().iter().all(|w| w.nonzero == 8 * 8 * 3));
}

#[tokio::test]
async fn test_seventy_slices_make_three_jobs() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    let settings = settings(
        &target.path().join("ds"),
        create_column_stack(source.path(), 70),
    );

    let summary = tile_cubing(&settings, &store, Arc::new(ImageTileDecoder::new()))
        .await
        .unwrap();
    assert_eq!(summary.file_count, 70);
    assert_eq!(summary.jobs, 3);

    let writes = store.writes();
    let z_spans: Vec<(i64, usize)> = writes.iter().map(|w| (w.offset[2], w.shape[3])).collect();
    assert_eq!(z_spans, vec![(0, 32), (32, 32), (64, 6)]);
    assert_eq!(
        summary.bounding_box,
        BoundingBox::new([0, 0, 0], [4, 4, 70])
    );
}

#[tokio::test]
async fn test_small_batch_size_splits_writes() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    let mut settings = settings(
        &target.path().join("ds"),
        create_column_stack(source.path(), 40),
    );
    settings.batch_size = 16;

    let summary = tile_cubing(&settings, &store, Arc::new(ImageTileDecoder::new()))
        .await
        .unwrap();
    assert_eq!(summary.jobs, 2);

    let z_spans: Vec<(i64, usize)> = store
        .writes()
        .iter()
        .map(|w| (w.offset[2], w.shape[3]))
        .collect();
    assert_eq!(z_spans, vec![(0, 16), (16, 16), (32, 8)]);
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_siblings() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let dataset_path = target.path().join("ds");
    let store = MockStore::new();
    let settings = settings(&dataset_path, create_column_stack(source.path(), 70));

    let result = tile_cubing(&settings, &store, Arc::new(FailingDecoder::new("/40/"))).await;
    assert!(matches!(
        result,
        Err(CubingError::JobsFailed {
            failed: 1,
            total: 3
        })
    ));

    let z_starts: Vec<i64> = store.writes().iter().map(|w| w.offset[2]).collect();
    assert_eq!(z_starts, vec![0, 64]);

    // completed batches are still recorded in the layer's bounding box
    let dataset = CubeDataset::open(&dataset_path).unwrap();
    let bbox = *dataset.get_layer("color").unwrap().bounding_box();
    assert_eq!(bbox, BoundingBox::new([0, 0, 0], [4, 4, 70]));
}

#[tokio::test]
async fn test_failure_mid_job_records_written_slices() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let dataset_path = target.path().join("ds");
    let store = MockStore::new();
    let mut settings = settings(&dataset_path, create_column_stack(source.path(), 8));
    settings.batch_size = 4;

    let result = tile_cubing(&settings, &store, Arc::new(FailingDecoder::new("/6/"))).await;
    assert!(matches!(
        result,
        Err(CubingError::JobsFailed {
            failed: 1,
            total: 1
        })
    ));

    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!((writes[0].offset, writes[0].shape), ([0, 0, 0], [1, 4, 4, 4]));

    let dataset = CubeDataset::open(&dataset_path).unwrap();
    let bbox = *dataset.get_layer("color").unwrap().bounding_box();
    assert_eq!(bbox, BoundingBox::new([0, 0, 0], [4, 4, 4]));
}

#[tokio::test]
async fn test_worker_panic_still_grows_bounding_box() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let dataset_path = target.path().join("ds");
    let store = MockStore::new();
    let settings = settings(&dataset_path, create_column_stack(source.path(), 40));

    let decoder = Arc::new(FailingDecoder::panicking("/35/"));
    let result = tile_cubing(&settings, &store, decoder).await;
    assert!(matches!(result, Err(CubingError::Worker(_))));

    let z_starts: Vec<i64> = store.writes().iter().map(|w| w.offset[2]).collect();
    assert_eq!(z_starts, vec![0]);

    // the panicked batch 32-39 may hold writes, so it is enclosed as well
    let dataset = CubeDataset::open(&dataset_path).unwrap();
    let bbox = *dataset.get_layer("color").unwrap().bounding_box();
    assert_eq!(bbox, BoundingBox::new([0, 0, 0], [4, 4, 40]));
}

#[tokio::test]
async fn test_existing_empty_target_directory() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    let settings = settings(target.path(), create_column_stack(source.path(), 3));

    let summary = tile_cubing(&settings, &store, Arc::new(ImageTileDecoder::new()))
        .await
        .unwrap();
    assert_eq!(summary.columns_written, 1);

    let dataset = CubeDataset::open(target.path()).unwrap();
    assert!(dataset.get_layer("color").unwrap().has_mag(Mag::ONE));
}

#[tokio::test]
async fn test_non_empty_target_without_properties_is_rejected() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    fs::write(target.path().join("notes.txt"), "keep me").unwrap();
    let store = MockStore::new();
    let settings = settings(target.path(), create_column_stack(source.path(), 3));

    let result = tile_cubing(&settings, &store, Arc::new(ImageTileDecoder::new())).await;
    assert!(matches!(
        result,
        Err(CubingError::Dataset(DatasetError::AlreadyExists { .. }))
    ));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_tiled_target_is_left_untouched() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let dataset_path = target.path().join("tiled");
    TiledDataset::create_tiled(&dataset_path, [1.0; 3], [512, 512], Some("{z}/{y}/{x}.tif"))
        .unwrap();
    let store = MockStore::new();
    let settings = settings(&dataset_path, create_column_stack(source.path(), 3));

    let result = tile_cubing(&settings, &store, Arc::new(ImageTileDecoder::new())).await;
    assert!(matches!(
        result,
        Err(CubingError::Dataset(DatasetError::WrongFlavor { .. }))
    ));
    assert!(store.writes().is_empty());

    let tiled = TiledDataset::open(&dataset_path).unwrap();
    assert_eq!(tiled.pattern(), "{z}/{y}/{x}.tif");
    assert_eq!(tiled.tile_size(), Some([512, 512]));
    assert!(tiled.layers().is_empty());
}

#[tokio::test]
async fn test_rerun_reuses_dataset() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let dataset_path = target.path().join("ds");
    let store = MockStore::new();
    let settings = settings(&dataset_path, create_column_stack(source.path(), 5));
    let decoder = Arc::new(ImageTileDecoder::new());

    let first = tile_cubing(&settings, &store, Arc::clone(&decoder))
        .await
        .unwrap();
    let second = tile_cubing(&settings, &store, decoder).await.unwrap();
    assert_eq!(first, second);

    let dataset = CubeDataset::open(&dataset_path).unwrap();
    assert_eq!(dataset.layers().len(), 1);
    assert_eq!(dataset.get_layer("color").unwrap().mags().count(), 1);
}

#[tokio::test]
async fn test_layer_conflict_fails_before_writing() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let dataset_path = target.path().join("ds");
    let mut dataset = CubeDataset::create(&dataset_path, [1.0; 3]).unwrap();
    dataset
        .add_layer("color", Category::Color, ElementClass::UInt16, 1)
        .unwrap();

    let store = MockStore::new();
    let settings = settings(&dataset_path, create_column_stack(source.path(), 3));
    let result = tile_cubing(&settings, &store, Arc::new(ImageTileDecoder::new())).await;

    assert!(matches!(
        result,
        Err(CubingError::Dataset(DatasetError::Conflict { .. }))
    ));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_unsupported_element_class() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let dataset_path = target.path().join("ds");
    let mut settings = settings(&dataset_path, create_column_stack(source.path(), 3));
    settings.element_class = ElementClass::UInt64;

    let result = tile_cubing(&settings, &MockStore::new(), Arc::new(ImageTileDecoder::new())).await;
    assert!(matches!(
        result,
        Err(CubingError::UnsupportedElementClass(ElementClass::UInt64))
    ));
    assert!(!dataset_path.exists());
}

#[tokio::test]
async fn test_no_source_files() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let dataset_path = target.path().join("ds");
    let settings = settings(&dataset_path, pattern_in(source.path(), "{zz}/{yy}/{xx}.jpg"));

    let result = tile_cubing(&settings, &MockStore::new(), Arc::new(ImageTileDecoder::new())).await;
    assert!(matches!(result, Err(CubingError::Pattern(_))));
    assert!(!dataset_path.exists());
}

#[tokio::test]
async fn test_uint16_ingestion() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    let mut settings = settings(
        &target.path().join("ds"),
        create_column_stack(source.path(), 2),
    );
    settings.element_class = ElementClass::UInt16;

    let summary = tile_cubing(&settings, &store, Arc::new(ImageTileDecoder::new()))
        .await
        .unwrap();
    assert_eq!(summary.columns_written, 1);
    assert_eq!(store.writes()[0].shape, [1, 4, 4, 2]);
}
