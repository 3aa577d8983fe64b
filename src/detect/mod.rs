mod engine;
mod render;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use engine::{DetectionReport, Detector, detect_questions, detect_with_report};
pub use render::{render_overlay_png, render_overlay_svg};

/// Axis-aligned pixel rectangle. Used both for raw blobs and merged regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BBoxPx {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BBoxPx {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuestionBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

impl QuestionBox {
    pub fn from_bbox(bbox: BBoxPx, confidence: f32) -> Self {
        Self {
            x: bbox.x,
            y: bbox.y,
            width: bbox.w,
            height: bbox.h,
            confidence,
        }
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Contours,
    Lines,
    Fallback,
    Error,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Contours => "contours",
            DetectionMethod::Lines => "lines",
            DetectionMethod::Fallback => "fallback",
            DetectionMethod::Error => "error",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub success: bool,
    pub questions: Vec<QuestionBox>,
    pub image_width: u32,
    pub image_height: u32,
    pub method: DetectionMethod,
}

impl DetectionResult {
    pub fn failed() -> Self {
        Self {
            success: false,
            questions: Vec::new(),
            image_width: 0,
            image_height: 0,
            method: DetectionMethod::Error,
        }
    }
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has zero area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("{strategy} strategy failed: {message}")]
    Strategy {
        strategy: DetectionMethod,
        message: String,
    },
}

impl DetectError {
    pub(crate) fn strategy(strategy: DetectionMethod, message: impl Into<String>) -> Self {
        DetectError::Strategy {
            strategy,
            message: message.into(),
        }
    }
}
