mod binarize;
mod blobs;
mod contours;
mod geom;
mod lines;
mod merge;
mod morph;
mod preprocess;
mod select;

use anyhow::anyhow;
use image::{GenericImageView, GrayImage};
use tracing::{debug, info, warn};

use crate::detect::{DetectError, DetectionMethod, DetectionResult, QuestionBox};
use crate::settings::DetectorSettings;

/// Outcome of one detection together with what each strategy produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionReport {
    pub result: DetectionResult,
    pub contour_regions: usize,
    pub line_regions: usize,
    /// Decode or strategy errors that were absorbed into the result.
    pub errors: Vec<String>,
}

/// Owns the detector configuration so callers can share one instance.
#[derive(Debug, Clone, Default)]
pub struct Detector {
    settings: DetectorSettings,
}

impl Detector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn detect(&self, image_bytes: &[u8]) -> DetectionResult {
        detect_questions(image_bytes, &self.settings)
    }

    pub fn detect_with_report(&self, image_bytes: &[u8]) -> DetectionReport {
        detect_with_report(image_bytes, &self.settings)
    }
}

pub fn detect_questions(image_bytes: &[u8], settings: &DetectorSettings) -> DetectionResult {
    detect_with_report(image_bytes, settings).result
}

pub fn detect_with_report(image_bytes: &[u8], settings: &DetectorSettings) -> DetectionReport {
    let image = match preprocess::decode_image(image_bytes) {
        Ok(image) => image,
        Err(err) => {
            warn!("detect: {}", err);
            return DetectionReport {
                result: DetectionResult::failed(),
                contour_regions: 0,
                line_regions: 0,
                errors: vec![err.to_string()],
            };
        }
    };
    let (width, height) = image.dimensions();
    debug!("detect: decoded {}x{} image", width, height);
    let gray = preprocess::to_intensity(&image);
    drop(image);

    let mut errors = Vec::new();
    let (contour_output, line_output) = run_strategies(&gray, settings);
    let contours = absorb_failure(DetectionMethod::Contours, contour_output, &mut errors);
    let lines = absorb_failure(DetectionMethod::Lines, line_output, &mut errors);
    let contour_regions = contours.len();
    let line_regions = lines.len();
    debug!(
        "detect: contours={} lines={}",
        contour_regions, line_regions
    );

    let (mut method, mut questions) = select::select_regions(contours, lines);
    if questions.is_empty() {
        method = DetectionMethod::Fallback;
        questions = select::fallback_bands(width, height, &settings.fallback);
    }
    info!("detect: {} regions via {}", questions.len(), method);

    DetectionReport {
        result: DetectionResult {
            success: true,
            questions,
            image_width: width,
            image_height: height,
            method,
        },
        contour_regions,
        line_regions,
        errors,
    }
}

type StrategyOutput = anyhow::Result<Vec<QuestionBox>>;

fn run_strategies(gray: &GrayImage, settings: &DetectorSettings) -> (StrategyOutput, StrategyOutput) {
    if !settings.parallel_strategies {
        return (
            contours::detect_by_contours(gray, &settings.contours),
            lines::detect_by_lines(gray, &settings.lines),
        );
    }

    std::thread::scope(|scope| {
        let line_worker = scope.spawn(|| lines::detect_by_lines(gray, &settings.lines));
        let contour_output = contours::detect_by_contours(gray, &settings.contours);
        let line_output = line_worker
            .join()
            .unwrap_or_else(|_| Err(anyhow!("line strategy worker panicked")));
        (contour_output, line_output)
    })
}

fn absorb_failure(
    method: DetectionMethod,
    output: StrategyOutput,
    errors: &mut Vec<String>,
) -> Vec<QuestionBox> {
    match output {
        Ok(questions) => questions,
        Err(err) => {
            let err = DetectError::strategy(method, format!("{:#}", err));
            warn!("detect: {}", err);
            errors.push(err.to_string());
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Luma};
    use std::io::Cursor;

    fn blank_png(width: u32, height: u32) -> Vec<u8> {
        let page = GrayImage::from_pixel(width, height, Luma([255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(page)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    #[test]
    fn failing_strategy_does_not_stop_the_other() {
        let mut settings = DetectorSettings::default();
        settings.contours.block_size = 4;
        let report = detect_with_report(&blank_png(120, 90), &settings);
        assert!(report.result.success);
        assert_eq!(report.result.method, DetectionMethod::Fallback);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("contours strategy failed"));
    }

    #[test]
    fn sequential_and_parallel_runs_agree() {
        let bytes = blank_png(200, 150);
        let parallel = DetectorSettings::default();
        let sequential = DetectorSettings {
            parallel_strategies: false,
            ..DetectorSettings::default()
        };
        assert_eq!(
            detect_questions(&bytes, &parallel),
            detect_questions(&bytes, &sequential)
        );
    }

    #[test]
    fn decode_failure_is_reported() {
        let report = detect_with_report(b"\x89PNG\r\n\x1a\ntruncated", &DetectorSettings::default());
        assert_eq!(report.result, DetectionResult::failed());
        assert_eq!(report.errors.len(), 1);
    }
}
