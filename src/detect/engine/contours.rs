use anyhow::{Context, Result};
use image::GrayImage;

use crate::detect::QuestionBox;
use crate::settings::ContourSettings;

use super::binarize::adaptive_gaussian_inv;
use super::blobs::{external_blobs, is_text_fragment};
use super::geom::{expand_clamped, margin};
use super::merge::merge_by_top_distance;
use super::morph::{RectElement, close};

/// Locally thresholded text fragments, closed into line blobs, grouped into
/// regions by how far each blob starts below the region's top.
pub(super) fn detect_by_contours(
    gray: &GrayImage,
    rules: &ContourSettings,
) -> Result<Vec<QuestionBox>> {
    let (width, height) = gray.dimensions();
    let binary = adaptive_gaussian_inv(gray, rules.block_size, rules.offset)
        .with_context(|| "adaptive threshold failed")?;
    let element = RectElement::new(rules.kernel_width, rules.kernel_height)?;
    let shaped = close(&binary, element).with_context(|| "closing failed")?;

    let mut fragments = external_blobs(&shaped)
        .into_iter()
        .filter(|blob| is_text_fragment(blob, width, height, rules))
        .collect::<Vec<_>>();
    fragments.sort_by_key(|blob| blob.y);

    let regions = merge_by_top_distance(&fragments, height as f64 * rules.merge_gap_ratio);
    let mut questions = regions
        .iter()
        .map(|region| {
            let dy = margin(region.h, rules.margin_ratio);
            let expanded = expand_clamped(region, 0, dy, width, height);
            QuestionBox::from_bbox(expanded, rules.confidence)
        })
        .collect::<Vec<_>>();
    questions.sort_by_key(|question| question.y);
    Ok(questions)
}
