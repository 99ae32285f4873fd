//! Coordinate transform: source pixel space → target page space.
//!
//! Pixel space has its origin top-left with y growing downward; the target
//! space has its origin bottom-left with y growing upward. Each axis is
//! scaled by `target / pixel`, and the y axis is flipped:
//!
//! ```text
//! x0' = x0 · sx                 x1' = x1 · sx
//! y0' = H − y1 · sy             y1' = H − y0 · sy
//! ```
//!
//! The flip swaps which pixel edge becomes the lower target edge, so the
//! mapped box keeps `y0' <= y1'`.

use crate::error::PageError;
use crate::zone::{BBox, PageSize, PageTree};
use tracing::debug;

/// Per-page mapping from pixel space into target space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    scale_x: f64,
    scale_y: f64,
    target_height: f64,
}

impl CoordinateTransform {
    /// `None` when either size has a zero dimension.
    pub fn new(pixel: PageSize, target: PageSize) -> Option<Self> {
        if pixel.is_empty() || target.is_empty() {
            return None;
        }
        Some(Self {
            scale_x: f64::from(target.width) / f64::from(pixel.width),
            scale_y: f64::from(target.height) / f64::from(pixel.height),
            target_height: f64::from(target.height),
        })
    }

    /// Map `[x0, y0, x1, y1]` without rounding.
    pub fn map_rect(&self, [x0, y0, x1, y1]: [f64; 4]) -> [f64; 4] {
        [
            x0 * self.scale_x,
            self.target_height - y1 * self.scale_y,
            x1 * self.scale_x,
            self.target_height - y0 * self.scale_y,
        ]
    }

    /// Map a bbox, rounding each edge to the nearest integer.
    pub fn map_bbox(&self, bbox: &BBox) -> BBox {
        let [x0, y0, x1, y1] = self.map_rect([
            f64::from(bbox.x0),
            f64::from(bbox.y0),
            f64::from(bbox.x1),
            f64::from(bbox.y1),
        ]);
        // Rounding is monotonic, so the corners stay ordered.
        BBox {
            x0: round(x0),
            y0: round(y0),
            x1: round(x1),
            y1: round(y1),
        }
    }
}

fn round(v: f64) -> i32 {
    v.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

/// Remap every bbox of `tree` in place.
///
/// The pixel size comes from the tree, or is inferred from the root bbox's
/// far corner. `target` defaults to the pixel size.
pub fn transform_tree(tree: &mut PageTree, target: Option<PageSize>) -> Result<(), PageError> {
    let pixel = tree.pixel_size.or_else(|| {
        let root = tree.root_zone().bbox;
        match (u32::try_from(root.x1), u32::try_from(root.y1)) {
            (Ok(w), Ok(h)) => Some(PageSize::new(w, h)),
            _ => None,
        }
    });
    let Some(pixel) = pixel.filter(|p| !p.is_empty()) else {
        return Err(PageError::geometry(
            tree.page,
            tree.root_zone().describe(),
            "page pixel size is zero or unknown",
        ));
    };
    let target = target.unwrap_or(pixel);
    let transform = CoordinateTransform::new(pixel, target).ok_or_else(|| {
        PageError::geometry(
            tree.page,
            tree.root_zone().describe(),
            format!("cannot map {pixel} pixels onto {target}"),
        )
    })?;

    debug!(page = tree.page, %pixel, %target, "mapping page coordinates");
    for zone in &mut tree.zones {
        zone.bbox = transform.map_bbox(&zone.bbox);
    }
    tree.pixel_size = Some(pixel);
    Ok(())
}
