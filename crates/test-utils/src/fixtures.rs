//! Common test fixtures for pipeline tests.

use std::io::Write;
use std::path::Path;

use bzip2::write::BzEncoder;
use bzip2::Compression;
use gdal::raster::Buffer;
use gdal::DriverManager;

/// Common clip windows for testing, as (left, top, right, bottom).
pub mod bbox {
    /// Global extent
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, 90.0, 180.0, -90.0);

    /// Eastern Europe / western Russia
    pub const EASTERN_EUROPE: (f64, f64, f64, f64) = (19.0, 70.0, 60.0, 40.0);

    /// A small window matching 3x2 [`super::write_geotiff`] fixtures at (20, 51) with 0.5 deg cells
    pub const SMALL: (f64, f64, f64, f64) = (20.0, 51.0, 21.5, 50.0);
}

/// Write a single-band Float32 GeoTIFF with a north-up geotransform.
///
/// `values` are row-major, north row first, and must hold `ncols * nrows`
/// cells. `(left, top)` is the outer corner of the upper-left cell.
pub fn write_geotiff(
    path: &Path,
    ncols: usize,
    nrows: usize,
    left: f64,
    top: f64,
    cellsize: f64,
    values: &[f32],
) {
    assert_eq!(values.len(), ncols * nrows, "cell count does not match shape");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture directory");
    }

    let driver = DriverManager::get_driver_by_name("GTiff").expect("GTiff driver");
    let mut ds = driver
        .create_with_band_type::<f32, _>(path, ncols, nrows, 1)
        .expect("create GeoTIFF fixture");
    ds.set_geo_transform(&[left, cellsize, 0.0, top, 0.0, -cellsize])
        .expect("set geotransform");

    let mut band = ds.rasterband(1).expect("fixture band");
    let mut buffer = Buffer::new((ncols, nrows), values.to_vec());
    band.write((0, 0), (ncols, nrows), &mut buffer)
        .expect("write fixture band");
}

/// Bytes of a GeoTIFF built by [`write_geotiff`], for serving as a payload.
pub fn geotiff_bytes(
    ncols: usize,
    nrows: usize,
    left: f64,
    top: f64,
    cellsize: f64,
    values: &[f32],
) -> Vec<u8> {
    let dir = tempfile::tempdir().expect("create fixture directory");
    let path = dir.path().join("fixture.tif");
    write_geotiff(&path, ncols, nrows, left, top, cellsize, values);
    std::fs::read(&path).expect("read GeoTIFF fixture")
}

/// Compress bytes the way the remote source publishes its archives.
pub fn bzip2_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("bzip2 encode");
    encoder.finish().expect("bzip2 finish")
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture directory");
    }
    std::fs::write(path, contents).expect("write fixture file");
}

/// A fresh temporary staging root.
pub fn staging_root() -> tempfile::TempDir {
    tempfile::tempdir().expect("create temporary staging root")
}
