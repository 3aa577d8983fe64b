use crate::detect::{DetectionMethod, QuestionBox};
use crate::settings::FallbackSettings;

/// The strategy with more regions wins; ties go to contours.
pub(super) fn select_regions(
    contours: Vec<QuestionBox>,
    lines: Vec<QuestionBox>,
) -> (DetectionMethod, Vec<QuestionBox>) {
    if contours.len() >= lines.len() {
        (DetectionMethod::Contours, contours)
    } else {
        (DetectionMethod::Lines, lines)
    }
}

/// Equal full-width horizontal bands; the last one runs to the bottom edge.
pub(super) fn fallback_bands(width: u32, height: u32, rules: &FallbackSettings) -> Vec<QuestionBox> {
    let bands = rules.bands.max(1);
    let band_height = height / bands;
    (0..bands)
        .map(|index| {
            let y = index * band_height;
            let h = if index + 1 == bands {
                height - y
            } else {
                band_height
            };
            QuestionBox {
                x: 0,
                y,
                width,
                height: h,
                confidence: rules.confidence,
            }
        })
        .collect()
}
