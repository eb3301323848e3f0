//! Common types shared across the ICON fetch / regrid / rasterize pipeline.

pub mod bbox;
pub mod error;
pub mod grid;
pub mod run;
pub mod unit;
pub mod variable;

pub use bbox::BoundingBox;
pub use error::ParseError;
pub use gdal::GeoTransform;
pub use grid::{GridError, RasterGrid};
pub use run::ModelRun;
pub use unit::{LeadTime, UnitId};
pub use variable::{DerivedProduct, FieldKind, Variable};
