//! Tests for GeoTIFF raster I/O and raster arithmetic.

use nwp_common::{GeoTransform, RasterGrid};
use test_utils::{
    assert_approx_eq, bbox, create_constant_grid, create_test_grid, create_u_wind_grid,
    create_v_wind_grid, staging_root, write_geotiff,
};

fn small_transform() -> GeoTransform {
    let (left, top, _, _) = bbox::SMALL;
    [left, 0.5, 0.0, top, 0.0, -0.5]
}

fn grid(ncols: usize, nrows: usize, values: &[f32]) -> RasterGrid {
    RasterGrid::new(ncols, nrows, small_transform(), None, values.to_vec()).unwrap()
}

// ============================================================================
// GeoTIFF I/O
// ============================================================================

#[test]
fn test_read_fixture_raster() {
    let dir = staging_root();
    let path = dir.path().join("t2m.tif");
    let (left, top, _, _) = bbox::SMALL;
    write_geotiff(&path, 3, 2, left, top, 0.5, &create_test_grid(3, 2));

    let g = RasterGrid::read(&path).unwrap();

    assert_eq!(g.ncols, 3);
    assert_eq!(g.nrows, 2);
    assert_eq!(g.geo_transform, small_transform());
    // Row-major, north row first
    assert_eq!(g.data, vec![0.0, 1000.0, 2000.0, 1.0, 1001.0, 2001.0]);
}

#[test]
fn test_read_global_extent() {
    let dir = staging_root();
    let path = dir.path().join("global.tif");
    let (left, top, right, bottom) = bbox::GLOBAL;
    write_geotiff(&path, 4, 2, left, top, 90.0, &create_constant_grid(4, 2, 1.0));

    let t = RasterGrid::read(&path).unwrap().geo_transform;

    assert_eq!(t[0], left);
    assert_eq!(t[3], top);
    assert_eq!(t[0] + 4.0 * t[1], right);
    assert_eq!(t[3] + 2.0 * t[5], bottom);
}

#[test]
fn test_written_raster_keeps_transform_and_nodata() {
    let dir = staging_root();
    let path = dir.path().join("wind.tif");
    let mut values = create_u_wind_grid(5, 4);
    values[7] = -9999.0;
    let g = RasterGrid::new(5, 4, small_transform(), Some(-9999.0), values.clone()).unwrap();

    g.write_geotiff(&path).unwrap();
    let back = RasterGrid::read(&path).unwrap();

    assert_eq!(back.data, values);
    assert_eq!(back.geo_transform, g.geo_transform);
    assert_eq!(back.nodata, Some(-9999.0));
    assert!(back.is_nodata(back.data[7]));
}

#[test]
fn test_read_missing_file_fails() {
    let dir = staging_root();
    assert!(RasterGrid::read(&dir.path().join("absent.tif")).is_err());
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn test_precipitation_scaling() {
    let g = grid(3, 2, &create_constant_grid(3, 2, 1.5e-4));
    let scaled = g.scaled(12.0 * 3600.0);

    for v in &scaled.data {
        assert_approx_eq!(*v, 1.5e-4 * 12.0 * 3600.0, 1e-4);
    }
}

#[test]
fn test_wind_magnitude_cellwise() {
    let (w, h) = (6, 4);
    let u_values = create_u_wind_grid(w, h);
    let v_values = create_v_wind_grid(w, h);
    let u = grid(w, h, &u_values);
    let v = grid(w, h, &v_values);

    let speed = RasterGrid::magnitude(&u, &v).unwrap();

    for (i, s) in speed.data.iter().enumerate() {
        let expected = (u_values[i].powi(2) + v_values[i].powi(2)).sqrt();
        assert_approx_eq!(*s, expected, 1e-5);
        assert!(*s >= 0.0);
    }
}

#[test]
fn test_wind_magnitude_shape_mismatch() {
    let u = grid(3, 2, &create_u_wind_grid(3, 2));
    let v = grid(2, 3, &create_v_wind_grid(2, 3));

    assert!(RasterGrid::magnitude(&u, &v).is_err());
}
