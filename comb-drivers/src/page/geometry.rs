use serde::{Deserialize, Serialize};

/// A viewport coordinate that is safe to hover, click, or wheel at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusPoint {
    pub x: f64,
    pub y: f64,
}

impl FocusPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Integer pixel coordinates as the input service expects them.
    pub fn rounded(&self) -> (i64, i64) {
        (self.x.round() as i64, self.y.round() as i64)
    }
}

/// Viewport-relative bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub inner_width: f64,
    pub inner_height: f64,
}

impl Viewport {
    pub fn center(&self) -> FocusPoint {
        FocusPoint::new(self.inner_width / 2.0, self.inner_height / 2.0)
    }
}

/// Margins that keep pointer activity away from fixed headers, footers and
/// the viewport edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafeBand {
    pub edge_x: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Default for SafeBand {
    fn default() -> Self {
        Self {
            edge_x: 20.0,
            top: 160.0,
            bottom: 120.0,
        }
    }
}

/// Resolve `rect` into a point inside the safe band of `viewport`.
///
/// The x coordinate is the rect's horizontal centre clamped to
/// `[20, innerWidth - 20]`; the y coordinate is the centre of the
/// intersection between the rect and `[160, innerHeight - 120]`. Returns
/// `None` when that intersection is empty.
///
/// ```
/// use comb_drivers::page::geometry::{compute_visible_focus_point, Rect, Viewport};
///
/// let viewport = Viewport { inner_width: 1280.0, inner_height: 800.0 };
/// let rect = Rect { x: 900.0, y: 100.0, width: 400.0, height: 2000.0 };
/// let p = compute_visible_focus_point(&rect, &viewport).unwrap();
/// assert_eq!(p.x, 1100.0);
/// assert_eq!(p.y, (160.0 + 680.0) / 2.0);
///
/// let offscreen = Rect { x: 0.0, y: 900.0, width: 100.0, height: 100.0 };
/// assert!(compute_visible_focus_point(&offscreen, &viewport).is_none());
/// ```
pub fn compute_visible_focus_point(rect: &Rect, viewport: &Viewport) -> Option<FocusPoint> {
    compute_focus_in_band(rect, viewport, SafeBand::default())
}

pub fn compute_focus_in_band(rect: &Rect, viewport: &Viewport, band: SafeBand) -> Option<FocusPoint> {
    let band_top = band.top;
    let band_bottom = viewport.inner_height - band.bottom;
    if band_bottom <= band_top {
        return None;
    }
    let top = rect.y.max(band_top);
    let bottom = (rect.y + rect.height).min(band_bottom);
    if bottom <= top {
        return None;
    }
    let x = clamp_soft(
        rect.x + rect.width / 2.0,
        band.edge_x,
        viewport.inner_width - band.edge_x,
    );
    Some(FocusPoint::new(x, (top + bottom) / 2.0))
}

/// Pull a point back inside the safe band. Used every round because the
/// scroll container's visual footprint moves as the list virtualizes.
pub fn clamp_to_safe_band(point: FocusPoint, viewport: &Viewport, band: SafeBand) -> FocusPoint {
    FocusPoint::new(
        clamp_soft(point.x, band.edge_x, viewport.inner_width - band.edge_x),
        clamp_soft(point.y, band.top, viewport.inner_height - band.bottom),
    )
}

// `f64::clamp` panics when min > max, which happens on tiny viewports.
fn clamp_soft(v: f64, min: f64, max: f64) -> f64 {
    if max < min {
        return (min + max) / 2.0;
    }
    v.max(min).min(max)
}
