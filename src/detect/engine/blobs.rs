use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};

use crate::detect::BBoxPx;
use crate::settings::{ContourSettings, LineSettings};

/// Bounding rectangles of the outermost foreground components, in the order
/// the border follower meets them (raster order of their first pixel).
pub(super) fn external_blobs(binary: &GrayImage) -> Vec<BBoxPx> {
    find_contours::<u32>(binary)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .filter_map(|contour| {
            let mut points = contour.points.iter();
            let first = points.next()?;
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
            for point in points {
                min_x = min_x.min(point.x);
                min_y = min_y.min(point.y);
                max_x = max_x.max(point.x);
                max_y = max_y.max(point.y);
            }
            Some(BBoxPx::new(
                min_x,
                min_y,
                max_x - min_x + 1,
                max_y - min_y + 1,
            ))
        })
        .collect()
}

/// Keeps horizontally elongated, mid-sized blobs that look like text lines.
pub(super) fn is_text_fragment(
    blob: &BBoxPx,
    width: u32,
    height: u32,
    rules: &ContourSettings,
) -> bool {
    if blob.w <= rules.min_width || blob.h <= rules.min_height {
        return false;
    }
    let aspect = blob.w as f64 / blob.h as f64;
    if aspect <= rules.min_aspect || aspect >= rules.max_aspect {
        return false;
    }
    let relative_area = blob.area() as f64 / (width as f64 * height as f64);
    relative_area > rules.min_area_ratio && relative_area < rules.max_area_ratio
}

pub(super) fn is_printed_line(blob: &BBoxPx, height: u32, rules: &LineSettings) -> bool {
    blob.w > rules.min_width
        && blob.h > rules.min_height
        && (blob.h as f64) < height as f64 * rules.max_height_ratio
}
