use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::detect::{self, DetectionResult};
use crate::settings;

#[derive(Debug, Clone)]
pub(crate) struct DebugConfig {
    output_dir: PathBuf,
    base_name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct DebugOutput {
    pub(crate) image: PathBuf,
    pub(crate) json: PathBuf,
}

impl DebugConfig {
    pub(crate) fn image_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_questions.png", self.base_name))
    }

    pub(crate) fn json_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_questions.json", self.base_name))
    }
}

/// Debug files go next to the source image, or under the cache directory for
/// stdin input.
pub(crate) fn build_debug_config(src_path: Option<&Path>) -> Result<DebugConfig> {
    let (dir, base) = match src_path {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let base = path
                .file_stem()
                .and_then(|value| value.to_str())
                .unwrap_or("input");
            (dir.to_path_buf(), base.to_string())
        }
        None => (default_debug_dir(), "stdin".to_string()),
    };
    build_debug_config_in(dir, &base)
}

fn build_debug_config_in(dir: PathBuf, base: &str) -> Result<DebugConfig> {
    let dir = if dir.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        dir
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create debug dir: {}", dir.display()))?;
    Ok(DebugConfig {
        output_dir: dir,
        base_name: sanitize_filename_component(base),
    })
}

pub(crate) fn write_overlay(
    config: &DebugConfig,
    image_bytes: &[u8],
    result: &DetectionResult,
) -> Result<DebugOutput> {
    let png = detect::render_overlay_png(image_bytes, result)?;
    let image = config.image_path();
    std::fs::write(&image, png)
        .with_context(|| format!("failed to write debug overlay: {}", image.display()))?;

    let json = config.json_path();
    let body = serde_json::to_string_pretty(result)?;
    std::fs::write(&json, body)
        .with_context(|| format!("failed to write debug json: {}", json.display()))?;
    Ok(DebugOutput { image, json })
}

fn default_debug_dir() -> PathBuf {
    settings::home_dir()
        .map(|home| home.join(".cache").join("debug"))
        .unwrap_or_else(|| PathBuf::from(".question-detector/.cache/debug"))
}

fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else if ch.is_whitespace() {
            out.push('_');
        }
    }
    if out.is_empty() {
        "input".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectionMethod, QuestionBox};
    use image::{DynamicImage, GrayImage, Luma};
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn sanitizes_base_names() {
        assert_eq!(sanitize_filename_component("page 1 (final)"), "page_1_final");
        assert_eq!(sanitize_filename_component("???"), "input");
    }

    #[test]
    fn debug_files_follow_the_source_name() {
        let dir = tempdir().expect("tempdir");
        let config =
            build_debug_config(Some(&dir.path().join("exam sheet.jpg"))).expect("debug config");
        assert_eq!(config.image_path(), dir.path().join("exam_sheet_questions.png"));
        assert_eq!(config.json_path(), dir.path().join("exam_sheet_questions.json"));
    }

    #[test]
    fn writes_overlay_and_json() {
        let dir = tempdir().expect("tempdir");
        let config = build_debug_config_in(dir.path().to_path_buf(), "page").expect("config");
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(GrayImage::from_pixel(30, 30, Luma([255])))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        let result = DetectionResult {
            success: true,
            questions: vec![QuestionBox {
                x: 0,
                y: 0,
                width: 30,
                height: 10,
                confidence: 0.3,
            }],
            image_width: 30,
            image_height: 30,
            method: DetectionMethod::Fallback,
        };

        let output = write_overlay(&config, &bytes, &result).expect("write overlay");
        let overlay = image::open(&output.image).expect("overlay decodes");
        assert_eq!((overlay.width(), overlay.height()), (30, 30));
        let json = std::fs::read_to_string(&output.json).expect("read json");
        assert!(json.contains("\"method\": \"fallback\""));
    }
}
