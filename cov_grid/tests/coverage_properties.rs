//! Property-based tests for DMS parsing and coverage analysis.
//!
//! Run with: cargo test -p cov_grid --test coverage_properties

use cov_grid::{
    analyze_coverage, analyze_coverage_with, parse_dms, AnalysisConfig, BoundingBox, CovError,
    DecimalCoordinate, Direction, DmsCoordinate, Engine, GridGeometry, METERS_PER_DEGREE,
};
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop::sample::select(Direction::ALL.to_vec())
}

/// A bounding box somewhere between 70S and 70N with a small extent.
fn arb_bbox() -> impl Strategy<Value = BoundingBox> {
    (-70.0..70.0f64, -170.0..170.0f64, 0.002..0.02f64, 0.002..0.02f64).prop_map(
        |(lat, lon, dlat, dlon)| BoundingBox::new(lat, lat + dlat, lon, lon + dlon),
    )
}

/// Points scattered over (and slightly beyond) the box.
fn arb_points(bbox: BoundingBox, max: usize) -> impl Strategy<Value = Vec<DecimalCoordinate>> {
    let lat_pad = bbox.lat_extent() * 0.2;
    let lon_pad = bbox.lon_extent() * 0.2;
    prop::collection::vec(
        (
            (bbox.min_lat - lat_pad)..(bbox.max_lat + lat_pad),
            (bbox.min_lon - lon_pad)..(bbox.max_lon + lon_pad),
        )
            .prop_map(|(lat, lon)| DecimalCoordinate::new(lat, lon)),
        0..max,
    )
}

fn arb_case() -> impl Strategy<Value = (BoundingBox, f64, Vec<DecimalCoordinate>)> {
    (arb_bbox(), 20.0..120.0f64)
        .prop_flat_map(|(bbox, radius)| (Just(bbox), Just(radius), arb_points(bbox, 200)))
}

fn with_engine(engine: Engine) -> AnalysisConfig {
    AnalysisConfig {
        engine,
        ..AnalysisConfig::default()
    }
}

// =============================================================================
// DMS
// =============================================================================

proptest! {
    #[test]
    fn dms_round_trip(degrees in 0u32..90, minutes in 0.0..60.0f64, direction in arb_direction()) {
        let text = DmsCoordinate { degrees: degrees as f64, minutes, direction }.to_string();
        let value = parse_dms(&text).unwrap();
        let magnitude = degrees as f64 + minutes / 60.0;
        let expected = if direction.is_negative() { -magnitude } else { magnitude };
        // Rendering keeps five decimals of minutes.
        prop_assert!((value - expected).abs() <= 1e-5 / 60.0 + 1e-12);
        if value != 0.0 {
            prop_assert_eq!(value < 0.0, direction.is_negative());
        }
    }

    #[test]
    fn dms_without_direction_is_format_error(degrees in 0u32..90, minutes in 0.0..60.0f64) {
        let text = format!("{degrees} град {minutes:.5} мин");
        prop_assert!(matches!(parse_dms(&text), Err(CovError::Format(_))));
    }

    #[test]
    fn dms_arbitrary_text_never_panics(text in "\\PC{0,40}") {
        match parse_dms(&text) {
            Ok(v) => prop_assert!(v.is_finite()),
            Err(CovError::Format(_)) | Err(CovError::DmsNumber(_)) => {}
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }
}

// =============================================================================
// Coverage grid
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn bucketed_matches_brute_force((bbox, radius, points) in arb_case()) {
        let brute = analyze_coverage_with(&points, &bbox, radius, &with_engine(Engine::BruteForce));
        let bucketed = analyze_coverage_with(&points, &bbox, radius, &with_engine(Engine::Bucketed));
        match (brute, bucketed) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a.cells(), b.cells()),
            (Err(CovError::DegenerateGrid { .. }), Err(CovError::DegenerateGrid { .. })) => {}
            (a, b) => prop_assert!(false, "engines disagree: {:?} vs {:?}", a.err(), b.err()),
        }
    }

    #[test]
    fn adding_points_never_uncovers((bbox, radius, points) in arb_case(), split in 0usize..200) {
        let split = split.min(points.len());
        let subset = &points[..split];
        let (Ok(small), Ok(large)) = (
            analyze_coverage(subset, &bbox, radius),
            analyze_coverage(&points, &bbox, radius),
        ) else {
            return Ok(());
        };
        for (row, col, covered) in small.iter_cells() {
            if covered {
                prop_assert!(large.is_covered(row, col));
            }
        }
    }

    #[test]
    fn corner_point_covers_its_cell((bbox, radius, _points) in arb_case(), r in 0.0..1.0f64, c in 0.0..1.0f64) {
        let Ok(geometry) = GridGeometry::new(bbox, radius) else {
            return Ok(());
        };
        let row = ((geometry.grid_size_lat as f64 - 1.0) * r) as usize;
        let col = ((geometry.grid_size_lon as f64 - 1.0) * c) as usize;
        let (lat, lon) = geometry.cell_corner(row, col);
        let grid = analyze_coverage(&[DecimalCoordinate::new(lat, lon)], &bbox, radius).unwrap();
        prop_assert!(grid.is_covered(row, col));
    }

    #[test]
    fn square_box_tenth_radius_is_ten_cells(side in 0.001..0.5f64) {
        let bbox = BoundingBox::new(0.0, side, 0.0, side);
        let radius = side / 10.0 * METERS_PER_DEGREE;
        let grid = analyze_coverage(&[], &bbox, radius).unwrap();
        prop_assert!((9..=10).contains(&grid.grid_size_lat()));
        prop_assert!((9..=10).contains(&grid.grid_size_lon()));
    }

    #[test]
    fn equator_box_tenth_radius_is_exactly_ten_cells(eighths in 1u32..64) {
        // Radius and side are multiples of 1/8 degree, so no truncation error.
        let radius_deg = eighths as f64 / 8.0;
        let side = radius_deg * 10.0;
        let bbox = BoundingBox::new(-side / 2.0, side / 2.0, 0.0, side);
        let grid = analyze_coverage(&[], &bbox, radius_deg * METERS_PER_DEGREE).unwrap();
        prop_assert_eq!(grid.grid_size_lat(), 10);
        prop_assert_eq!(grid.grid_size_lon(), 10);
    }

    #[test]
    fn radius_beyond_extent_is_degenerate(bbox in arb_bbox(), factor in 1.01..50.0f64) {
        let extent = bbox.lat_extent().max(bbox.lon_extent());
        let radius = extent * METERS_PER_DEGREE * factor;
        let result = analyze_coverage(&[], &bbox, radius);
        prop_assert!(
            matches!(result, Err(CovError::DegenerateGrid { .. })),
            "expected Err(CovError::DegenerateGrid)"
        );
    }
}
