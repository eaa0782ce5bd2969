//! Vision Layer
//!
//! OCR record model plus the region classification and text filtering that
//! separate real screen content from keyboard and status-bar noise.
//! Per-image records are produced by an external recognizer (see `ocr`).

pub mod filter;
pub mod keyboard;
pub mod regions;

pub use filter::{filter, FilterResult, FilterSettings};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Height assumed for a record with nothing to infer it from
const FALLBACK_HEIGHT: f64 = 1000.0;

/// Headroom added to inferred dimensions so the lowest box isn't on the edge
const INFER_MARGIN: f64 = 1.01;

/// Bounding geometry as delivered by the recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoxGeometry {
    /// Polygon points, usually the four corners clockwise from top-left
    Quad(Vec<[f64; 2]>),
    /// Axis-aligned rectangle
    Rect { x: f64, y: f64, width: f64, height: f64 },
}

impl BoxGeometry {
    /// Axis-aligned rectangle from polygon corners
    #[cfg(test)]
    pub fn rect(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        BoxGeometry::Quad(vec![[left, top], [right, top], [right, bottom], [left, bottom]])
    }

    /// Normalize to an axis-aligned bounding box
    pub fn bounds(&self) -> PipelineResult<BoundingBox> {
        let bounds = match self {
            BoxGeometry::Quad(points) => polygon_to_bounds(points)?,
            BoxGeometry::Rect { x, y, width, height } => BoundingBox {
                left: *x,
                top: *y,
                right: x + width,
                bottom: y + height,
            },
        };

        if [bounds.left, bounds.top, bounds.right, bounds.bottom]
            .iter()
            .any(|v| !v.is_finite())
        {
            return Err(PipelineError::invalid_geometry("non-finite coordinate"));
        }

        Ok(bounds)
    }
}

/// Axis-aligned bounding box in image pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn center_y(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }
}

/// Pixel dimensions of a screenshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageDimensions {
    pub width: f64,
    pub height: f64,
}

impl ImageDimensions {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// One detected text fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Recognized text
    pub text: String,
    /// Bounding geometry in image pixels
    #[serde(alias = "box")]
    pub bbox: BoxGeometry,
    /// Recognition confidence (0.0 - 1.0)
    #[serde(alias = "conf")]
    pub confidence: f64,
}

impl Fragment {
    #[cfg(test)]
    pub fn new(text: impl Into<String>, bbox: BoxGeometry, confidence: f64) -> Self {
        Self {
            text: text.into(),
            bbox,
            confidence,
        }
    }
}

/// OCR result for one screenshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Screenshot filename, unique within a run
    #[serde(default)]
    pub filename: String,
    /// Image width in pixels, when the recognizer knew it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Image height in pixels, when the recognizer knew it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Fragments in detection order
    #[serde(default, alias = "items")]
    pub fragments: Vec<Fragment>,
}

impl ImageRecord {
    pub fn new(filename: impl Into<String>, fragments: Vec<Fragment>) -> Self {
        Self {
            filename: filename.into(),
            width: None,
            height: None,
            fragments,
        }
    }

    /// Attach known pixel dimensions
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Recorded dimensions, or dimensions inferred from the given fragments
    pub fn dimensions_for<'a>(&self, fragments: impl IntoIterator<Item = &'a Fragment>) -> ImageDimensions {
        let bounds: Vec<BoundingBox> = fragments
            .into_iter()
            .filter_map(|f| f.bbox.bounds().ok())
            .collect();

        let height = match self.height {
            Some(h) => h as f64,
            None => infer_extent(bounds.iter().map(|b| b.bottom)),
        };
        let width = match self.width {
            Some(w) => w as f64,
            None => infer_extent(bounds.iter().map(|b| b.right)),
        };

        ImageDimensions::new(width, height)
    }
}

/// Estimate an image extent from the furthest box edge; the edge itself always fits
fn infer_extent(edges: impl Iterator<Item = f64>) -> f64 {
    match edges.fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v)))) {
        Some(max) => (max * INFER_MARGIN).floor().max(max.ceil()).max(1.0),
        None => FALLBACK_HEIGHT,
    }
}

/// Convert polygon points to bounding box
fn polygon_to_bounds(polygon: &[[f64; 2]]) -> PipelineResult<BoundingBox> {
    if polygon.is_empty() {
        return Err(PipelineError::invalid_geometry("polygon has no points"));
    }

    let left = polygon.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min);
    let top = polygon.iter().map(|p| p[1]).fold(f64::INFINITY, f64::min);
    let right = polygon.iter().map(|p| p[0]).fold(f64::NEG_INFINITY, f64::max);
    let bottom = polygon.iter().map(|p| p[1]).fold(f64::NEG_INFINITY, f64::max);

    Ok(BoundingBox {
        left,
        top,
        right,
        bottom,
    })
}
