//! Pattern parsing and tile discovery tests.

use std::fs;

use stack_cuber::error::PatternError;
use stack_cuber::pattern::{digit_counts, validate, DigitWidths, TileCoordinate};
use stack_cuber::{TileLocator, TilePattern};

use super::test_utils::{create_scenario_stack, pattern_in, write_gray_tile, SCENARIO_MISSING};

fn locator(pattern: &str) -> TileLocator {
    TileLocator::new(TilePattern::parse(pattern).unwrap())
}

// =============================================================================
// Pattern Matcher
// =============================================================================

#[test]
fn test_digit_counts_take_longest_run() {
    assert_eq!(
        digit_counts("{zzzz}/{yy}/{x}.png"),
        DigitWidths::new(1, 2, 4)
    );
    assert_eq!(
        digit_counts("{z}/{zzz}/{yy}_{xxxxx}.tif"),
        DigitWidths::new(5, 2, 3)
    );
    assert_eq!(digit_counts("no tokens here"), DigitWidths::new(0, 0, 0));
}

#[test]
fn test_validate_requires_every_axis() {
    assert!(validate("{zzz}/{yyy}/{xxx}.jpg").is_ok());
    assert!(validate("x_{xxx}_y_{yyy}_z_{zzz}.png").is_ok());

    for pattern in ["{zzz}/{yyy}.jpg", "{xx}{yy}", "{x}/{y}/{Z}.png", "{xy}/{y}/{z}"] {
        assert!(
            matches!(validate(pattern), Err(PatternError::InvalidPattern { .. })),
            "{} should be rejected",
            pattern
        );
        assert!(TilePattern::parse(pattern).is_err());
    }
}

#[test]
fn test_render_and_glob() {
    let pattern = TilePattern::parse("stack/{zzzz}/tile_{yy}_{xx}.tif").unwrap();
    let coord = TileCoordinate::new(7, 12, 305);

    assert_eq!(
        pattern.render(coord, pattern.digit_counts()),
        "stack/0305/tile_12_07.tif"
    );
    assert_eq!(
        pattern.render(coord, DigitWidths::unpadded()),
        "stack/305/tile_12_7.tif"
    );
    assert_eq!(
        pattern.to_glob(DigitWidths::new(1, 2, 3)),
        "stack/[0-9][0-9][0-9]/tile_[0-9][0-9]_[0-9].tif"
    );
}

#[test]
fn test_glob_escapes_literal_text() {
    let pattern = TilePattern::parse("scan[1]/{z}/{y}/{x}.png").unwrap();
    let glob = pattern.to_glob(DigitWidths::new(1, 1, 1));
    assert!(glob.starts_with("scan[[]1[]]/"));
}

// =============================================================================
// Tile Locator
// =============================================================================

#[test]
fn test_discover_scenario_stack() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = create_scenario_stack(dir.path());

    let extent = locator(&pattern).discover().unwrap();
    assert_eq!(extent.min, TileCoordinate::new(0, 0, 0));
    assert_eq!(extent.max, TileCoordinate::new(1, 1, 4));
    assert_eq!(extent.file_count, 16);
    assert_eq!(extent.columns(), (2, 2));
    assert!(extent.arbitrary_file.is_file());
}

#[test]
fn test_discover_nonzero_minimum() {
    let dir = tempfile::tempdir().unwrap();
    write_gray_tile(&dir.path().join("12/3/4.png"), 4, 4, 1);
    write_gray_tile(&dir.path().join("0013/0005/0002.png"), 4, 4, 1);

    let extent = locator(&pattern_in(dir.path(), "{zzzz}/{yyyy}/{xxxx}.png"))
        .discover()
        .unwrap();
    assert_eq!(extent.min, TileCoordinate::new(2, 3, 12));
    assert_eq!(extent.max, TileCoordinate::new(4, 5, 13));
    assert_eq!(extent.file_count, 2);
}

#[test]
fn test_discover_no_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("readme.txt"), "not a tile").unwrap();

    let result = locator(&pattern_in(dir.path(), "{zz}/{yy}/{xx}.jpg")).discover();
    assert!(matches!(result, Err(PatternError::NoSourceFiles { .. })));
}

#[test]
fn test_locate_prefers_unpadded() {
    let dir = tempfile::tempdir().unwrap();
    write_gray_tile(&dir.path().join("3/1/2.png"), 4, 4, 1);
    write_gray_tile(&dir.path().join("003/001/002.png"), 4, 4, 2);

    let locator = locator(&pattern_in(dir.path(), "{zzz}/{yyy}/{xxx}.png"));
    let found = locator.locate(TileCoordinate::new(2, 1, 3)).unwrap();
    assert_eq!(found, dir.path().join("3/1/2.png"));

    fs::remove_file(dir.path().join("3/1/2.png")).unwrap();
    let found = locator.locate(TileCoordinate::new(2, 1, 3)).unwrap();
    assert_eq!(found, dir.path().join("003/001/002.png"));
}

#[test]
fn test_locate_missing_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = create_scenario_stack(dir.path());
    let locator = locator(&pattern);

    for (x, y, z) in SCENARIO_MISSING {
        assert!(locator.locate(TileCoordinate::new(x, y, z)).is_none());
    }
    assert!(locator.locate(TileCoordinate::new(0, 0, 0)).is_some());
    assert!(locator.locate(TileCoordinate::new(1, 1, 4)).is_some());
}
