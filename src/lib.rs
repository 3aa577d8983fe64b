use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tracing::info;

mod debug;
pub mod detect;
pub mod logging;
pub mod server;
pub mod settings;

pub use detect::{
    BBoxPx, DetectError, DetectionMethod, DetectionReport, DetectionResult, Detector,
    QuestionBox, detect_questions, detect_with_report,
};
pub use settings::{DetectorSettings, Settings};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub data: Option<String>,
    pub settings_path: Option<String>,
    pub pretty: bool,
    pub debug_overlay: bool,
    pub print_default_settings: bool,
}

/// Runs one detection for the CLI and returns the text to print.
pub fn run(config: Config, input: Option<Vec<u8>>) -> Result<String> {
    if config.print_default_settings {
        return Ok(settings::DEFAULT_SETTINGS_TOML.trim_end().to_string());
    }

    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;

    let bytes = match config.data.as_deref() {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("failed to read image: {}", path))?,
        None => input.unwrap_or_default(),
    };
    if bytes.is_empty() {
        return Err(anyhow!("no image data (use --data or pipe an image to stdin)"));
    }

    let detector = Detector::new(settings.detector);
    let report = detector.detect_with_report(&bytes);
    info!(
        "strategies: contours={} lines={} -> {}",
        report.contour_regions, report.line_regions, report.result.method
    );

    if config.debug_overlay {
        write_debug_overlay(&config, &bytes, &report.result)?;
    }

    format_result(&report.result, config.pretty)
}

pub fn format_result(result: &DetectionResult, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(result)
    } else {
        serde_json::to_string(result)
    };
    json.with_context(|| "failed to serialize detection result")
}

fn write_debug_overlay(config: &Config, bytes: &[u8], result: &DetectionResult) -> Result<()> {
    if !result.success {
        eprintln!("debug: skipped overlay, image could not be decoded");
        return Ok(());
    }
    let debug = debug::build_debug_config(config.data.as_deref().map(Path::new))?;
    let written = debug::write_overlay(&debug, bytes, result)?;
    eprintln!(
        "debug: wrote overlay {} and {}",
        written.image.display(),
        written.json.display()
    );
    Ok(())
}

/// Starts the HTTP service with settings from the usual lookup paths.
pub async fn serve(settings_path: Option<&Path>, addr: Option<String>) -> Result<()> {
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(addr) = addr {
        settings.server.addr = addr;
    }
    server::run_server(settings).await
}
