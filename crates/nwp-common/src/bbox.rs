//! Bounding box used to clip output rasters.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in degrees.
///
/// Edges are named the way raster clipping tools take them: `left`/`right`
/// longitudes and `top`/`bottom` latitudes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl BoundingBox {
    /// Create a new bounding box from its four edges.
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    /// A box is usable for clipping when all edges are finite and it has
    /// positive extent in both directions.
    pub fn is_valid(&self) -> bool {
        [self.left, self.right, self.top, self.bottom]
            .iter()
            .all(|v| v.is_finite())
            && self.left < self.right
            && self.bottom < self.top
    }

    /// Edges in `-projwin` order: upper-left x, upper-left y, lower-right x, lower-right y.
    pub fn projwin_args(&self) -> [String; 4] {
        [
            self.left.to_string(),
            self.top.to_string(),
            self.right.to_string(),
            self.bottom.to_string(),
        ]
    }
}
