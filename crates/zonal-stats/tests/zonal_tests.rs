//! End-to-end tests for the zonal statistics pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ndarray::{array, Array2};
use test_utils::{
    assert_approx_eq, create_category_grid, create_constant_grid, create_sequential_grid, documents, shapes,
    temp_geotiff, unit_transform,
};
use zonal_stats::{
    gen_zonal_stats, zonal_stats, AddStat, Affine, MaskedArray, PixelValue, StatValue, VectorInput, ZonalError,
    ZonalOptions, ZonalOutput, ZonalStats,
};

const WHOLE_4X4: &str = "POLYGON ((0 0, 4 0, 4 4, 0 4, 0 0))";

fn stats_for(vectors: impl Into<VectorInput>, data: Array2<f64>, options: ZonalOptions) -> Vec<ZonalStats> {
    let rows = data.nrows();
    zonal_stats(vectors, data, options.with_affine(unit_transform(rows)))
        .unwrap()
        .into_iter()
        .map(|o| o.into_stats().unwrap())
        .collect()
}

fn float(stats: &ZonalStats, key: &str) -> f64 {
    stats.get(key).and_then(StatValue::as_f64).unwrap()
}

// ============================================================================
// Masking
// ============================================================================

#[test]
fn test_nodata_and_nan_counted_separately() {
    let data = array![
        [f64::NAN, f64::NAN, f64::NAN],
        [0.0, 0.0, 0.0],
        [1.0, 4.0, 5.0]
    ];
    let options = ZonalOptions::new()
        .with_affine(Affine::new(1.0, 0.0, 1.0, 0.0, -1.0, 3.0))
        .with_nodata(0.0)
        .with_stats("count nodata nan");

    let out = zonal_stats("POLYGON ((1 0, 4 0, 4 3, 1 3, 1 0))", data, options).unwrap();
    let stats = out[0].stats().unwrap();
    assert_eq!(stats.get("count"), Some(&StatValue::Int(3)));
    assert_eq!(stats.get("nodata"), Some(&StatValue::Int(3)));
    assert_eq!(stats.get("nan"), Some(&StatValue::Int(3)));
}

#[test]
fn test_diagonal_polygon_uses_cell_centers() {
    let stats = stats_for(
        shapes::DIAGONAL,
        array![[100.0, 1.0], [100.0, 1.0]],
        ZonalOptions::new(),
    );
    assert_eq!(stats[0].get("count"), Some(&StatValue::Int(3)));
    assert_eq!(stats[0].get("mean"), Some(&StatValue::Float(34.0)));
}

#[test]
fn test_all_touched_is_superset() {
    let inner = "POLYGON ((0.6 0.6, 2.4 0.6, 2.4 2.4, 0.6 2.4, 0.6 0.6))";
    let centers = stats_for(inner, create_sequential_grid(4, 4), ZonalOptions::new());
    let touched = stats_for(
        inner,
        create_sequential_grid(4, 4),
        ZonalOptions::new().with_all_touched(true),
    );

    assert_eq!(centers[0].get("count"), Some(&StatValue::Int(1)));
    assert_eq!(touched[0].get("count"), Some(&StatValue::Int(9)));
    assert!(float(&touched[0], "min") <= float(&centers[0], "min"));
    assert!(float(&touched[0], "max") >= float(&centers[0], "max"));
}

#[test]
fn test_adjacent_zones_count_each_cell_once() {
    // the shared edge x = 1.5 runs through the centers of the middle column
    let zones = VectorInput::Features(vec![
        "POLYGON ((0 0, 1.5 0, 1.5 2, 0 2, 0 0))".into(),
        "POLYGON ((1.5 0, 3 0, 3 2, 1.5 2, 1.5 0))".into(),
    ]);
    let stats = stats_for(zones, create_constant_grid(2, 3, 1.0), ZonalOptions::new().with_stats("count"));

    assert_eq!(stats[0].get("count"), Some(&StatValue::Int(2)));
    assert_eq!(stats[1].get("count"), Some(&StatValue::Int(4)));
}

#[test]
fn test_partition_on_fine_grid_conserves_count() {
    let transform = Affine::new(0.1, 0.0, 0.0, 0.0, -0.1, 10.0);
    // vertical strips cut at arbitrary x, sharing their edges exactly
    let cuts = [0.0, 1.23, 4.55, 4.6, 7.01, 10.0];
    let strips: Vec<VectorInput> = cuts
        .windows(2)
        .map(|w| format!("POLYGON (({a} 0, {b} 0, {b} 10, {a} 10, {a} 0))", a = w[0], b = w[1]).into())
        .collect();

    let out = zonal_stats(
        VectorInput::Features(strips),
        create_constant_grid(100, 100, 1.0),
        ZonalOptions::new().with_stats("count").with_affine(transform),
    )
    .unwrap();
    let total: f64 = out.iter().map(|o| float(o.stats().unwrap(), "count")).sum();
    assert_eq!(total, 10000.0);
}

#[test]
fn test_hole_is_excluded() {
    let data = create_constant_grid(3, 3, 1.0);
    let stats = stats_for(shapes::SQUARE_WITH_HOLE, data, ZonalOptions::new().with_stats("count"));
    assert_eq!(stats[0].get("count"), Some(&StatValue::Int(8)));
}

#[test]
fn test_geometry_outside_raster_gives_empty_zone() {
    let stats = stats_for(
        shapes::FAR_AWAY,
        create_sequential_grid(4, 4),
        ZonalOptions::new().with_stats("count min max mean nodata"),
    );
    assert_eq!(stats[0].get("count"), Some(&StatValue::Int(0)));
    assert_eq!(stats[0].get("min"), Some(&StatValue::Null));
    assert_eq!(stats[0].get("mean"), Some(&StatValue::Null));
}

#[test]
fn test_point_is_boxified_to_its_cell() {
    let stats = stats_for(shapes::POINT, create_sequential_grid(4, 4), ZonalOptions::new());
    assert_eq!(stats[0].get("count"), Some(&StatValue::Int(1)));
    assert_eq!(stats[0].get("min"), Some(&StatValue::Float(13.0)));
}

// ============================================================================
// Statistics
// ============================================================================

#[test]
fn test_all_stats_on_whole_raster() {
    let stats = stats_for(WHOLE_4X4, create_sequential_grid(4, 4), ZonalOptions::new().with_stats("*"));
    let s = &stats[0];

    assert_eq!(s.get("count"), Some(&StatValue::Int(16)));
    assert_eq!(float(s, "sum"), 136.0);
    assert_eq!(float(s, "mean"), 8.5);
    assert_eq!(float(s, "median"), 8.5);
    assert_eq!(float(s, "range"), 15.0);
    assert_eq!(float(s, "unique"), 16.0);
    assert_approx_eq!(float(s, "std"), (255.0f64 / 12.0).sqrt(), 1e-12);
}

#[test]
fn test_percentile_50_matches_median() {
    let stats = stats_for(
        WHOLE_4X4,
        create_sequential_grid(4, 4),
        ZonalOptions::new().with_stats("median percentile_50 percentile_25"),
    );
    assert_eq!(float(&stats[0], "percentile_50"), float(&stats[0], "median"));
    assert_approx_eq!(float(&stats[0], "percentile_25"), 4.75, 1e-12);
}

#[test]
fn test_range_alone() {
    let stats = stats_for(WHOLE_4X4, create_sequential_grid(4, 4), ZonalOptions::new().with_stats("range"));
    assert_eq!(stats[0].keys().collect::<Vec<_>>(), vec!["range"]);
    assert_eq!(float(&stats[0], "range"), 15.0);
}

#[test]
fn test_categorical_with_map() {
    let data = create_category_grid(4, 4, &[1.0, 2.0, 3.0]);
    let mut category_map = BTreeMap::new();
    category_map.insert(PixelValue::new(1.0), "water".to_string());

    let stats = stats_for(
        WHOLE_4X4,
        data,
        ZonalOptions::new()
            .with_categorical(true)
            .with_category_map(category_map),
    );
    let s = &stats[0];

    assert_eq!(s.get("water"), Some(&StatValue::Int(6)));
    assert_eq!(s.get("count"), None);
    let total: f64 = s.iter().filter_map(|(_, v)| v.as_f64()).sum();
    assert_eq!(total, 16.0);
}

#[test]
fn test_categorical_keeps_requested_stats() {
    let data = create_category_grid(2, 2, &[5.0, 7.0]);
    let stats = stats_for(
        shapes::SQUARE_2,
        data,
        ZonalOptions::new().with_categorical(true).with_stats("majority"),
    );
    assert_eq!(float(&stats[0], "majority"), 5.0);
    assert_eq!(stats[0].category(5.0), Some(&StatValue::Int(2)));
    assert_eq!(stats[0].category(7.0), Some(&StatValue::Int(2)));
}

#[test]
fn test_percent_cover_weighting() {
    let polygon = "POLYGON ((0 0, 1.5 0, 1.5 1, 0 1, 0 0))";
    let stats = stats_for(
        polygon,
        create_constant_grid(4, 4, 2.0),
        ZonalOptions::new()
            .with_stats("count sum mean")
            .with_percent_cover_weighting(true),
    );
    assert_approx_eq!(float(&stats[0], "count"), 1.5, 1e-9);
    assert_approx_eq!(float(&stats[0], "sum"), 3.0, 1e-9);
    assert_approx_eq!(float(&stats[0], "mean"), 2.0, 1e-9);
}

#[test]
fn test_percent_cover_selection_drops_partial_cells() {
    let polygon = "POLYGON ((0 0, 1.5 0, 1.5 1, 0 1, 0 0))";
    let stats = stats_for(
        polygon,
        create_constant_grid(4, 4, 2.0),
        ZonalOptions::new()
            .with_stats("count")
            .with_percent_cover_selection(0.75),
    );
    assert_eq!(stats[0].get("count"), Some(&StatValue::Int(1)));
}

// ============================================================================
// Hooks and output shape
// ============================================================================

#[test]
fn test_prefix_add_stats_and_zone_fn() {
    let stats = stats_for(
        shapes::SQUARE_2,
        array![[1.0, 2.0], [3.0, 4.0]],
        ZonalOptions::new()
            .with_stats("max")
            .with_prefix("zone_")
            .with_zone_fn(|array: &mut MaskedArray| array.data.mapv_inplace(|v| v * 10.0))
            .with_add_stat(
                "cells",
                AddStat::masked(|array| StatValue::Int(array.count() as i64)),
            ),
    );
    assert_eq!(stats[0].get("zone_max"), Some(&StatValue::Float(40.0)));
    assert_eq!(stats[0].get("zone_cells"), Some(&StatValue::Int(4)));
    assert!(stats[0].get("max").is_none());
}

#[test]
fn test_raster_out_attaches_window() {
    let out = zonal_stats(
        shapes::SQUARE_OFFSET,
        create_sequential_grid(4, 4),
        ZonalOptions::new()
            .with_affine(unit_transform(4))
            .with_raster_out(true),
    )
    .unwrap();
    let ZonalOutput::Stats(result) = &out[0] else {
        panic!("expected stats output");
    };
    let mini = result.mini_raster.as_ref().unwrap();
    assert_eq!(mini.array.shape(), (2, 2));
    assert_eq!(mini.affine, Affine::new(1.0, 0.0, 1.0, 0.0, -1.0, 3.0));
    assert_eq!(mini.array.compressed(), vec![6.0, 7.0, 10.0, 11.0]);
}

#[test]
fn test_geojson_out_keeps_properties() {
    let (_dir, path) = temp_geotiff("grid.tif", &create_sequential_grid(4, 4), &unit_transform(4), None).unwrap();

    let out = zonal_stats(
        documents::TWO_POLYGONS,
        path,
        ZonalOptions::new().with_geojson_out(true).with_stats("count sum"),
    )
    .unwrap();

    assert_eq!(out.len(), 2);
    let west = out[0].clone().into_feature().unwrap();
    let properties = west.properties.unwrap();
    assert_eq!(properties["name"], "west");
    assert_eq!(properties["count"], 8);
    assert_eq!(properties["sum"], 60.0);
    assert_eq!(west.id, Some(geojson::feature::Id::Number(1.into())));
}

// ============================================================================
// Splitting
// ============================================================================

#[test]
fn test_split_conserves_composable_stats() {
    let request = "count sum min max mean range";
    let whole = stats_for(WHOLE_4X4, create_sequential_grid(4, 4), ZonalOptions::new().with_stats(request));
    let split = stats_for(
        WHOLE_4X4,
        create_sequential_grid(4, 4),
        ZonalOptions::new().with_stats(request).with_limit(4),
    );

    assert_eq!(split[0].get("count"), whole[0].get("count"));
    assert_eq!(split[0].get("min"), whole[0].get("min"));
    assert_eq!(split[0].get("max"), whole[0].get("max"));
    assert_eq!(split[0].get("range"), whole[0].get("range"));
    assert_approx_eq!(float(&split[0], "sum"), float(&whole[0], "sum"), 1e-9);
    assert_approx_eq!(float(&split[0], "mean"), float(&whole[0], "mean"), 1e-9);
    assert_eq!(split[0].keys().collect::<Vec<_>>(), whole[0].keys().collect::<Vec<_>>());
}

fn whole_and_split(polygon: &str, all_touched: bool) -> (ZonalStats, ZonalStats) {
    let request = "count sum min max mean";
    let options = || {
        ZonalOptions::new()
            .with_stats(request)
            .with_all_touched(all_touched)
            .with_affine(Affine::new(0.1, 0.0, 0.0, 0.0, -0.1, 10.0))
    };
    let run = |options: ZonalOptions| {
        zonal_stats(polygon, create_sequential_grid(100, 100), options)
            .unwrap()
            .remove(0)
            .into_stats()
            .unwrap()
    };
    (run(options()), run(options().with_limit(500)))
}

fn assert_split_matches(whole: &ZonalStats, split: &ZonalStats) {
    assert_eq!(split.get("count"), whole.get("count"));
    assert_eq!(split.get("min"), whole.get("min"));
    assert_eq!(split.get("max"), whole.get("max"));
    assert_approx_eq!(float(split, "sum"), float(whole, "sum"), 1e-6);
    assert_approx_eq!(float(split, "mean"), float(whole, "mean"), 1e-6);
}

#[test]
fn test_split_on_fine_grid_with_unaligned_rectangle() {
    // pixel extent cols 0.7..94.3, rows 5.7..99.3
    let rectangle = "POLYGON ((0.07 0.07, 9.43 0.07, 9.43 9.43, 0.07 9.43, 0.07 0.07))";

    let (whole, split) = whole_and_split(rectangle, false);
    assert_eq!(whole.get("count"), Some(&StatValue::Int(93 * 93)));
    assert_split_matches(&whole, &split);

    let (whole, split) = whole_and_split(rectangle, true);
    assert_eq!(whole.get("count"), Some(&StatValue::Int(95 * 95)));
    assert_split_matches(&whole, &split);
}

#[test]
fn test_split_on_fine_grid_with_irregular_polygon() {
    let polygon = "POLYGON ((0.07 0.13, 9.61 0.52, 8.77 9.38, 3.21 7.94, 0.33 5.06, 0.07 0.13))";
    for all_touched in [false, true] {
        let (whole, split) = whole_and_split(polygon, all_touched);
        assert!(float(&whole, "count") > 5000.0);
        assert_split_matches(&whole, &split);
    }
}

#[test]
fn test_limit_with_median_fails_before_raster_open() {
    let err = zonal_stats(
        WHOLE_4X4,
        PathBuf::from("/does/not/exist.tif"),
        ZonalOptions::new().with_stats("median").with_limit(10),
    )
    .unwrap_err();
    assert!(matches!(err, ZonalError::IncompatibleOptions(_)));
}

// ============================================================================
// Errors and iteration
// ============================================================================

#[test]
fn test_unknown_stat() {
    let err = zonal_stats(WHOLE_4X4, create_sequential_grid(4, 4), ZonalOptions::new().with_stats("mode"))
        .unwrap_err();
    assert!(matches!(err, ZonalError::InvalidStat { .. }));
}

#[test]
fn test_empty_feature_collection() {
    let err = zonal_stats(
        r#"{"type": "FeatureCollection", "features": []}"#,
        create_sequential_grid(4, 4),
        ZonalOptions::new().with_affine(unit_transform(4)),
    )
    .unwrap_err();
    assert!(matches!(err, ZonalError::InvalidFeatures(_)));
}

#[test]
fn test_iterator_stops_after_bad_feature() {
    let inputs = VectorInput::Features(vec![
        shapes::POINT.into(),
        VectorInput::Wkt("NOT WKT".to_string()),
        shapes::POINT.into(),
    ]);
    let mut iter = gen_zonal_stats(
        inputs,
        create_sequential_grid(4, 4),
        ZonalOptions::new().with_affine(unit_transform(4)),
    )
    .unwrap();

    assert!(iter.next().unwrap().is_ok());
    assert!(iter.next().unwrap().is_err());
    assert!(iter.next().is_none());
}

#[test]
fn test_results_follow_input_order() {
    let stats = stats_for(documents::TWO_POLYGONS, create_sequential_grid(4, 4), ZonalOptions::new());
    assert_eq!(stats.len(), 2);
    assert!(float(&stats[0], "min") < float(&stats[1], "min"));
}

#[test]
fn test_repeated_runs_are_identical() {
    let run = || stats_for(documents::TWO_POLYGONS, create_sequential_grid(4, 4), ZonalOptions::new().with_stats("*"));
    assert_eq!(run(), run());
}
