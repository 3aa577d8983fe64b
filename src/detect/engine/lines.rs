use anyhow::{Context, Result};
use image::GrayImage;

use crate::detect::QuestionBox;
use crate::settings::LineSettings;

use super::binarize::otsu_inv;
use super::blobs::{external_blobs, is_printed_line};
use super::geom::{expand_clamped, margin};
use super::merge::merge_overlapping_column;
use super::morph::{RectElement, dilate};

/// Globally thresholded ink, smeared horizontally until each printed line is
/// one blob; padded lines that overlap within a column are joined.
pub(super) fn detect_by_lines(gray: &GrayImage, rules: &LineSettings) -> Result<Vec<QuestionBox>> {
    let (width, height) = gray.dimensions();
    let binary = otsu_inv(gray);
    let element = RectElement::new(rules.kernel_width, rules.kernel_height)?;
    let shaped = dilate(&binary, element, rules.iterations).with_context(|| "dilation failed")?;

    let mut lines = external_blobs(&shaped)
        .into_iter()
        .filter(|blob| is_printed_line(blob, height, rules))
        .map(|blob| {
            let dy = margin(blob.h, rules.margin_ratio);
            expand_clamped(&blob, rules.margin_x, dy, width, height)
        })
        .collect::<Vec<_>>();
    lines.sort_by_key(|line| line.y);

    let regions = merge_overlapping_column(&lines, width as f64 * rules.column_ratio);
    Ok(regions
        .into_iter()
        .map(|region| QuestionBox::from_bbox(region, rules.confidence))
        .collect())
}
