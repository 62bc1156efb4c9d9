// End-to-end pipeline over synthetic data: windowed read, cell transform,
// zonal aggregation, assembly, and the reporting invariants.

use geo::{polygon, MultiPolygon};
use ndarray::Array2;
use polars::frame::DataFrame;
use polars::prelude::Column;

use wasteshed::assemble;
use wasteshed::transform::{tonnes_per_week, WasteParams};
use wasteshed::vector::PolygonLayer;
use wasteshed::window::{union_bounds, window_for_bounds};
use wasteshed::zonal::{zonal_stats, ZonalStat};
use wasteshed::{GeoTransform, RasterSurface};

const NODATA: f64 = -1.0;

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
    MultiPolygon(vec![polygon![
        (x: x0, y: y0),
        (x: x1, y: y0),
        (x: x1, y: y1),
        (x: x0, y: y1),
        (x: x0, y: y0),
    ]])
}

/// 6x6 population raster, origin top-left (0, 6), 1-unit cells, with one
/// no-data hole.
fn population_surface() -> RasterSurface {
    let mut band = Array2::from_shape_fn((6, 6), |(r, c)| (r * 6 + c) as f64 + 1.0);
    band[[2, 3]] = NODATA;
    let transform =
        GeoTransform { origin_x: 0.0, origin_y: 6.0, pixel_width: 1.0, pixel_height: -1.0 };
    RasterSurface::from_parts(band, transform, Some(NODATA), 4326)
}

fn admin_layer() -> PolygonLayer {
    let data = DataFrame::new(vec![
        Column::new("region".into(), vec!["Lagos", "Lagos", "Lagos", "Ogun"]),
        Column::new("lga".into(), vec!["West", "Mid", "East", "Elsewhere"]),
    ])
    .unwrap();
    PolygonLayer::from_parts(
        vec![
            rect(0.0, 0.0, 2.0, 6.0),
            rect(2.0, 0.0, 4.0, 6.0),
            rect(4.0, 0.0, 6.0, 6.0),
            rect(20.0, 20.0, 24.0, 24.0),
        ],
        data,
        4326,
    )
    .unwrap()
}

fn service_layer() -> PolygonLayer {
    let data = DataFrame::new(vec![
        Column::new("provider".into(), vec!["North Co", "South Co"]),
        Column::new("collected".into(), vec![0.3, 0.8]),
    ])
    .unwrap();
    PolygonLayer::from_parts(
        vec![rect(0.0, 3.0, 6.0, 6.0), rect(0.0, 0.0, 6.0, 3.0)],
        data,
        4326,
    )
    .unwrap()
}

#[test]
fn generated_totals_conserve_the_masked_raster_sum() {
    let raster = population_surface();
    let admin = admin_layer().filter_eq("region", "Lagos").unwrap();

    let bounds = admin.total_bounds().unwrap();
    let window = window_for_bounds(raster.transform(), raster.shape(), &bounds).unwrap();
    let (population, win_transform) = raster.read_window(&window).unwrap();

    let params = WasteParams::default();
    let waste = tonnes_per_week(population, raster.nodata(), &params);
    let valid_total: f64 = waste.iter().filter(|v| v.is_finite()).sum();

    let zonal = zonal_stats(
        &admin.names("lga").unwrap(),
        &admin.geoms,
        &waste,
        &win_transform,
        None,
        ZonalStat::Sum,
        "lga",
        "generated_tpw",
    )
    .unwrap();

    let table = assemble::attach_zonal(&admin.data, &zonal, "lga").unwrap();
    let sums = table.column("generated_tpw").unwrap().f64().unwrap();
    let partition_total: f64 = sums.into_iter().flatten().sum();

    // The three jurisdictions partition the raster, so their zonal sums
    // must conserve the masked cell total.
    assert!((partition_total - valid_total).abs() < 1e-9);

    // And the per-cell model is what lands in each zone: West covers the
    // two left columns.
    let west_pop: f64 = (0..6).map(|r| (r * 6 + 1) as f64 + (r * 6 + 2) as f64).sum();
    let expected_west = west_pop * params.kg_per_capita_day * 7.0 / 1000.0;
    assert!((sums.get(0).unwrap() - expected_west).abs() < 1e-9);
}

#[test]
fn uncollected_ranking_is_descending_and_unclamped() {
    let raster = population_surface();
    let service = service_layer();

    let bounds = service.total_bounds().unwrap();
    let window = window_for_bounds(raster.transform(), raster.shape(), &bounds).unwrap();
    let (population, win_transform) = raster.read_window(&window).unwrap();
    let waste = tonnes_per_week(population, raster.nodata(), &WasteParams::default());

    let zonal = zonal_stats(
        &service.names("provider").unwrap(),
        &service.geoms,
        &waste,
        &win_transform,
        None,
        ZonalStat::Sum,
        "provider",
        "generated_tpw",
    )
    .unwrap();

    let mut table = assemble::attach_zonal(&service.data, &zonal, "provider").unwrap();
    assert_eq!(assemble::fill_null_with_zero(&mut table, "generated_tpw").unwrap(), 0);
    assemble::uncollected_column(&mut table, "generated_tpw", "collected", "uncollected_tpw")
        .unwrap();

    let ranking = assemble::ranking(&table, "provider", "uncollected_tpw").unwrap();
    assert_eq!(ranking.len(), 2);
    for pair in ranking.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }

    // South Co covers the heavier rows but reports more collection; the
    // backlog difference must reflect generated - collected exactly.
    let gen = table.column("generated_tpw").unwrap().f64().unwrap();
    let unc = table.column("uncollected_tpw").unwrap().f64().unwrap();
    assert!((unc.get(0).unwrap() - (gen.get(0).unwrap() - 0.3)).abs() < 1e-12);
    assert!((unc.get(1).unwrap() - (gen.get(1).unwrap() - 0.8)).abs() < 1e-12);
}

#[test]
fn zonal_values_attach_by_key_even_when_reordered() {
    let raster = population_surface();
    let admin = admin_layer().filter_eq("region", "Lagos").unwrap();

    let bounds = admin.total_bounds().unwrap();
    let window = window_for_bounds(raster.transform(), raster.shape(), &bounds).unwrap();
    let (population, win_transform) = raster.read_window(&window).unwrap();
    let waste = tonnes_per_week(population, raster.nodata(), &WasteParams::default());

    let zonal = zonal_stats(
        &admin.names("lga").unwrap(),
        &admin.geoms,
        &waste,
        &win_transform,
        None,
        ZonalStat::Sum,
        "lga",
        "generated_tpw",
    )
    .unwrap();

    // Reverse the zonal frame's rows; a positional join would misassign
    // every value, a key join must not.
    let reversed = zonal.reverse();
    let straight = assemble::attach_zonal(&admin.data, &zonal, "lga").unwrap();
    let shuffled = assemble::attach_zonal(&admin.data, &reversed, "lga").unwrap();

    let a = straight.column("generated_tpw").unwrap().f64().unwrap();
    let b = shuffled.column("generated_tpw").unwrap().f64().unwrap();
    for i in 0..admin.len() {
        assert_eq!(a.get(i), b.get(i));
    }
}

#[test]
fn shared_window_covers_service_areas_beyond_admin_bounds() {
    let raster = population_surface();

    // Admin reduced to the western strip while the providers between them
    // span the whole grid: the read window must be sized to both layers,
    // or every cell east of x = 2 silently drops out of the provider sums.
    let data = DataFrame::new(vec![Column::new("lga".into(), vec!["West"])]).unwrap();
    let admin = PolygonLayer::from_parts(vec![rect(0.0, 0.0, 2.0, 6.0)], data, 4326).unwrap();
    let service = service_layer();

    let bounds = union_bounds(&admin.total_bounds().unwrap(), &service.total_bounds().unwrap());
    let window = window_for_bounds(raster.transform(), raster.shape(), &bounds).unwrap();
    assert_eq!((window.rows, window.cols), raster.shape());

    let (population, win_transform) = raster.read_window(&window).unwrap();
    let params = WasteParams::default();
    let waste = tonnes_per_week(population, raster.nodata(), &params);

    let zonal = zonal_stats(
        &service.names("provider").unwrap(),
        &service.geoms,
        &waste,
        &win_transform,
        None,
        ZonalStat::Sum,
        "provider",
        "generated_tpw",
    )
    .unwrap();

    // Both providers together tile the raster, so their sums must equal
    // the full masked footprint total, not the part under the admin bbox.
    let full_pop: f64 = (1..=36).map(f64::from).filter(|v| *v != 16.0).sum();
    let expected = full_pop * params.kg_per_capita_day * 7.0 / 1000.0;
    let sums = zonal.column("generated_tpw").unwrap().f64().unwrap();
    let total: f64 = sums.into_iter().flatten().sum();
    assert!((total - expected).abs() < 1e-9);
}

#[test]
fn study_area_outside_raster_fails_loudly() {
    let raster = population_surface();
    let admin = admin_layer().filter_eq("region", "Ogun").unwrap();

    let bounds = admin.total_bounds().unwrap();
    assert!(window_for_bounds(raster.transform(), raster.shape(), &bounds).is_err());
}
