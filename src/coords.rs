//! Web Mercator tile addressing.
//!
//! Converts geographic positions and bounding boxes into slippy-map tile
//! indices. Boxes that straddle the antimeridian or reach past the poles are
//! not split or wrapped; they produce whatever clamped rectangle the formulas
//! give.

use std::f64::consts::PI;
use std::fmt;

use serde::Deserialize;

use crate::error::CoordError;

/// Deepest zoom level whose grid indices still fit a `u32`.
pub const MAX_ZOOM: u8 = 30;

/// A geographic rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub const fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// The whole Mercator world, trimmed to ±85° latitude.
    pub const fn world() -> Self {
        Self::new(-85.0, 85.0, -180.0, 180.0)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.6}, {:.6}) to ({:.6}, {:.6})",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }
}

/// Identifies one tile of one cache layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    layer: String,
    zoom: u8,
    x: u32,
    y: u32,
}

impl TileKey {
    pub fn new(layer: impl Into<String>, zoom: u8, x: u32, y: u32) -> Result<Self, CoordError> {
        if zoom > MAX_ZOOM || x > max_index(zoom) || y > max_index(zoom) {
            return Err(CoordError::OutOfRange { zoom, x, y });
        }
        Ok(Self {
            layer: layer.into(),
            zoom,
            x,
            y,
        })
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    /// Substitutes `{z}`, `{x}` and `{y}` in a tile server template.
    pub fn url(&self, template: &str) -> String {
        template
            .replace("{z}", &self.zoom.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Inclusive range of tile indices at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRectangle {
    pub zoom: u8,
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl TileRectangle {
    pub fn width(&self) -> u64 {
        u64::from(self.x_max - self.x_min) + 1
    }

    pub fn height(&self) -> u64 {
        u64::from(self.y_max - self.y_min) + 1
    }

    /// Number of tiles covered.
    pub fn area(&self) -> u64 {
        self.width() * self.height()
    }

    /// Every key inside the rectangle, column by column.
    pub fn keys(self, layer: &str) -> impl Iterator<Item = TileKey> + '_ {
        let rect = self;
        (rect.x_min..=rect.x_max).flat_map(move |x| {
            (rect.y_min..=rect.y_max).map(move |y| TileKey {
                layer: layer.to_owned(),
                zoom: rect.zoom,
                x,
                y,
            })
        })
    }
}

#[inline]
fn max_index(zoom: u8) -> u32 {
    ((1u64 << zoom) - 1) as u32
}

/// Tile containing a point, without clamping to the grid.
///
/// Latitudes near or past the poles and longitudes past ±180° give indices
/// outside `[0, 2^zoom - 1]`; callers clamp.
pub fn tile_for_point(lat: f64, lon: f64, zoom: u8) -> (i64, i64) {
    let n = 2f64.powi(i32::from(zoom));
    let lat_rad = lat.to_radians();
    let x = ((lon + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();
    (x as i64, y as i64)
}

/// Tile rectangle covering `bbox` at `zoom`, clamped to the grid.
///
/// Zooms past [`MAX_ZOOM`] are rejected: their indices no longer fit a `u32`.
pub fn tile_rectangle(bbox: &BoundingBox, zoom: u8) -> Result<TileRectangle, CoordError> {
    if zoom > MAX_ZOOM {
        return Err(CoordError::ZoomTooDeep(zoom));
    }

    let (x_a, y_a) = tile_for_point(bbox.max_lat, bbox.min_lon, zoom);
    let (x_b, y_b) = tile_for_point(bbox.min_lat, bbox.max_lon, zoom);

    let max = i64::from(max_index(zoom));
    let clamp = |v: i64| v.clamp(0, max) as u32;

    Ok(TileRectangle {
        zoom,
        x_min: clamp(x_a.min(x_b)),
        x_max: clamp(x_a.max(x_b)),
        y_min: clamp(y_a.min(y_b)),
        y_max: clamp(y_a.max(y_b)),
    })
}
