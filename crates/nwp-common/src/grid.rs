//! Single-band Float32 rasters held in memory.
//!
//! Post-processing that has to touch cell values (accumulation scaling,
//! vector magnitude) reads band 1 of a raster through GDAL into a
//! [`RasterGrid`], transforms it and writes a Float32 GeoTIFF carrying the
//! source geotransform and projection.

use std::path::Path;

use gdal::errors::GdalError;
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager, GeoTransform};
use thiserror::Error;

/// Tolerance used when comparing the geotransforms of two grids.
pub const TRANSFORM_TOLERANCE: f64 = 1e-9;

const GTIFF_DRIVER: &str = "GTiff";

#[derive(Debug, Error)]
pub enum GridError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalError),

    #[error("expected {expected} cell values, found {found}")]
    CellCount { expected: usize, found: usize },

    #[error("grids do not line up: {0}")]
    Mismatch(String),
}

/// Band 1 of a raster, row-major, north row first.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    pub ncols: usize,
    pub nrows: usize,
    pub geo_transform: GeoTransform,
    /// WKT, empty when the source carries no spatial reference
    pub projection: String,
    pub nodata: Option<f64>,
    pub data: Vec<f32>,
}

impl RasterGrid {
    pub fn new(
        ncols: usize,
        nrows: usize,
        geo_transform: GeoTransform,
        nodata: Option<f64>,
        data: Vec<f32>,
    ) -> Result<Self, GridError> {
        if data.len() != ncols * nrows {
            return Err(GridError::CellCount {
                expected: ncols * nrows,
                found: data.len(),
            });
        }
        Ok(Self {
            ncols,
            nrows,
            geo_transform,
            projection: String::new(),
            nodata,
            data,
        })
    }

    /// Read band 1 of any raster GDAL can open.
    pub fn read(path: &Path) -> Result<Self, GridError> {
        let ds = Dataset::open(path)?;
        let (ncols, nrows) = ds.raster_size();
        let band = ds.rasterband(1)?;
        let buffer: Buffer<f32> = band.read_as((0, 0), (ncols, nrows), (ncols, nrows), None)?;

        Ok(Self {
            ncols,
            nrows,
            geo_transform: ds.geo_transform()?,
            projection: ds.projection(),
            nodata: band.no_data_value(),
            data: buffer.data().to_vec(),
        })
    }

    /// Write a single-band Float32 GeoTIFF with this grid's geotransform,
    /// projection and nodata value.
    pub fn write_geotiff(&self, path: &Path) -> Result<(), GridError> {
        let driver = DriverManager::get_driver_by_name(GTIFF_DRIVER)?;
        let mut ds = driver.create_with_band_type::<f32, _>(path, self.ncols, self.nrows, 1)?;
        ds.set_geo_transform(&self.geo_transform)?;
        if !self.projection.is_empty() {
            ds.set_projection(&self.projection)?;
        }

        let mut band = ds.rasterband(1)?;
        if let Some(nodata) = self.nodata {
            band.set_no_data_value(Some(nodata))?;
        }
        let mut buffer = Buffer::new((self.ncols, self.nrows), self.data.clone());
        band.write((0, 0), (self.ncols, self.nrows), &mut buffer)?;
        Ok(())
    }

    pub fn is_nodata(&self, value: f32) -> bool {
        match self.nodata {
            Some(nd) if nd.is_nan() => value.is_nan(),
            Some(nd) => value == nd as f32,
            None => false,
        }
    }

    /// Multiply every valid cell by `factor` in f32. Nodata cells are kept.
    pub fn scaled(&self, factor: f32) -> RasterGrid {
        let data = self
            .data
            .iter()
            .map(|&v| if self.is_nodata(v) { v } else { v * factor })
            .collect();
        RasterGrid {
            data,
            ..self.clone()
        }
    }

    /// Elementwise Euclidean norm `sqrt(u² + v²)` of two component grids.
    ///
    /// Both grids must have the same shape and geotransform; the result takes
    /// the geotransform and projection of `u`. A cell that is nodata in either
    /// input is nodata in the output.
    pub fn magnitude(u: &RasterGrid, v: &RasterGrid) -> Result<RasterGrid, GridError> {
        if u.ncols != v.ncols || u.nrows != v.nrows {
            return Err(GridError::Mismatch(format!(
                "shape {}x{} vs {}x{}",
                u.ncols, u.nrows, v.ncols, v.nrows
            )));
        }
        let aligned = u
            .geo_transform
            .iter()
            .zip(v.geo_transform.iter())
            .all(|(a, b)| (a - b).abs() <= TRANSFORM_TOLERANCE);
        if !aligned {
            return Err(GridError::Mismatch(format!(
                "geotransform {:?} vs {:?}",
                u.geo_transform, v.geo_transform
            )));
        }

        let nodata = u.nodata.or(v.nodata);
        let fill = nodata.map(|nd| nd as f32).unwrap_or(f32::NAN);
        let data = u
            .data
            .iter()
            .zip(v.data.iter())
            .map(|(&a, &b)| {
                if u.is_nodata(a) || v.is_nodata(b) {
                    fill
                } else {
                    (a * a + b * b).sqrt()
                }
            })
            .collect();

        Ok(RasterGrid {
            ncols: u.ncols,
            nrows: u.nrows,
            geo_transform: u.geo_transform,
            projection: u.projection.clone(),
            nodata,
            data,
        })
    }
}
