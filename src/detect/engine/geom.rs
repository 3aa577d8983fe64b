use crate::detect::BBoxPx;

pub(super) fn union_bbox(a: &BBoxPx, b: &BBoxPx) -> BBoxPx {
    let x1 = a.x.min(b.x);
    let y1 = a.y.min(b.y);
    let x2 = a.right().max(b.right());
    let y2 = a.bottom().max(b.bottom());
    BBoxPx {
        x: x1,
        y: y1,
        w: x2 - x1,
        h: y2 - y1,
    }
}

/// Grows `bbox` by `dx` left and right and `dy` above and below, then clips
/// it to a `width` x `height` page.
pub(super) fn expand_clamped(bbox: &BBoxPx, dx: u32, dy: u32, width: u32, height: u32) -> BBoxPx {
    let x1 = bbox.x.saturating_sub(dx).min(width);
    let y1 = bbox.y.saturating_sub(dy).min(height);
    let x2 = bbox.right().saturating_add(dx).min(width).max(x1);
    let y2 = bbox.bottom().saturating_add(dy).min(height).max(y1);
    BBoxPx {
        x: x1,
        y: y1,
        w: x2 - x1,
        h: y2 - y1,
    }
}

pub(super) fn margin(extent: u32, ratio: f64) -> u32 {
    (extent as f64 * ratio) as u32
}
