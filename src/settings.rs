use anyhow::{Context, Result, anyhow, ensure};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub detector: DetectorSettings,
    pub server: ServerSettings,
}

/// Tunables of the detection pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub parallel_strategies: bool,
    pub contours: ContourSettings,
    pub lines: LineSettings,
    pub fallback: FallbackSettings,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            parallel_strategies: true,
            contours: ContourSettings::default(),
            lines: LineSettings::default(),
            fallback: FallbackSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContourSettings {
    /// Side of the Gaussian neighbourhood; odd.
    pub block_size: u32,
    /// Subtracted from the local mean before comparing.
    pub offset: i32,
    pub kernel_width: u32,
    pub kernel_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub min_area_ratio: f64,
    pub max_area_ratio: f64,
    /// Blobs whose top lies within this fraction of the page height of the
    /// running region's top join that region.
    pub merge_gap_ratio: f64,
    pub margin_ratio: f64,
    pub confidence: f32,
}

impl Default for ContourSettings {
    fn default() -> Self {
        Self {
            block_size: 11,
            offset: 2,
            kernel_width: 20,
            kernel_height: 3,
            min_width: 50,
            min_height: 10,
            min_aspect: 1.5,
            max_aspect: 20.0,
            min_area_ratio: 0.001,
            max_area_ratio: 0.5,
            merge_gap_ratio: 0.15,
            margin_ratio: 0.1,
            confidence: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineSettings {
    pub kernel_width: u32,
    pub kernel_height: u32,
    pub iterations: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub max_height_ratio: f64,
    pub margin_ratio: f64,
    pub margin_x: u32,
    /// Maximum left-edge drift, as a fraction of page width, for two
    /// overlapping lines to be treated as one column.
    pub column_ratio: f64,
    pub confidence: f32,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            kernel_width: 25,
            kernel_height: 1,
            iterations: 2,
            min_width: 100,
            min_height: 20,
            max_height_ratio: 0.3,
            margin_ratio: 0.3,
            margin_x: 10,
            column_ratio: 0.3,
            confidence: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSettings {
    pub bands: u32,
    pub confidence: f32,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            bands: 3,
            confidence: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub addr: String,
    /// Concurrent detections; 0 means one per CPU core.
    pub workers: usize,
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8003".to_string(),
            workers: 0,
            max_body_bytes: 20 * 1024 * 1024,
        }
    }
}

impl ServerSettings {
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    detector: Option<DetectorSection>,
    contours: Option<ContourSection>,
    lines: Option<LineSection>,
    fallback: Option<FallbackSection>,
    server: Option<ServerSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DetectorSection {
    parallel_strategies: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContourSection {
    block_size: Option<u32>,
    offset: Option<i32>,
    kernel_width: Option<u32>,
    kernel_height: Option<u32>,
    min_width: Option<u32>,
    min_height: Option<u32>,
    min_aspect: Option<f64>,
    max_aspect: Option<f64>,
    min_area_ratio: Option<f64>,
    max_area_ratio: Option<f64>,
    merge_gap_ratio: Option<f64>,
    margin_ratio: Option<f64>,
    confidence: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LineSection {
    kernel_width: Option<u32>,
    kernel_height: Option<u32>,
    iterations: Option<u32>,
    min_width: Option<u32>,
    min_height: Option<u32>,
    max_height_ratio: Option<f64>,
    margin_ratio: Option<f64>,
    margin_x: Option<u32>,
    column_ratio: Option<f64>,
    confidence: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FallbackSection {
    bands: Option<u32>,
    confidence: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerSection {
    addr: Option<String>,
    workers: Option<usize>,
    max_body_bytes: Option<usize>,
}

macro_rules! merge_fields {
    ($target:expr, $section:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $section.$field {
                $target.$field = value;
            }
        )+
    };
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    load_settings_from(&ordered_paths)
}

/// Merges every existing file of `paths` over the defaults, later files
/// winning, then validates the result.
pub fn load_settings_from(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    for path in paths {
        if !path.exists() {
            continue;
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let parsed = parse_settings_file(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        settings.merge(parsed);
    }
    settings
        .validate()
        .with_context(|| "invalid detector settings")?;
    Ok(settings)
}

pub fn parse_settings(content: &str) -> Result<Settings> {
    let mut settings = Settings::default();
    settings.merge(parse_settings_file(content)?);
    settings.validate()?;
    Ok(settings)
}

fn parse_settings_file(content: &str) -> Result<SettingsFile> {
    Ok(toml::from_str(content)?)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(detector) = incoming.detector {
            merge_fields!(self.detector, detector, parallel_strategies);
        }
        if let Some(contours) = incoming.contours {
            merge_fields!(
                self.detector.contours,
                contours,
                block_size,
                offset,
                kernel_width,
                kernel_height,
                min_width,
                min_height,
                min_aspect,
                max_aspect,
                min_area_ratio,
                max_area_ratio,
                merge_gap_ratio,
                margin_ratio,
                confidence,
            );
        }
        if let Some(lines) = incoming.lines {
            merge_fields!(
                self.detector.lines,
                lines,
                kernel_width,
                kernel_height,
                iterations,
                min_width,
                min_height,
                max_height_ratio,
                margin_ratio,
                margin_x,
                column_ratio,
                confidence,
            );
        }
        if let Some(fallback) = incoming.fallback {
            merge_fields!(self.detector.fallback, fallback, bands, confidence);
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = server.addr {
                if !addr.trim().is_empty() {
                    self.server.addr = addr.trim().to_string();
                }
            }
            merge_fields!(self.server, server, workers, max_body_bytes);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let contours = &self.detector.contours;
        ensure!(
            contours.block_size >= 3 && contours.block_size % 2 == 1,
            "contours.block_size must be an odd number >= 3 (got {})",
            contours.block_size
        );
        ensure!(
            contours.kernel_width > 0 && contours.kernel_height > 0,
            "contours kernel must be at least 1x1"
        );
        ensure!(
            contours.min_aspect < contours.max_aspect,
            "contours.min_aspect must be below contours.max_aspect"
        );
        ensure!(
            contours.min_area_ratio < contours.max_area_ratio,
            "contours.min_area_ratio must be below contours.max_area_ratio"
        );
        ensure!(
            contours.merge_gap_ratio >= 0.0 && contours.margin_ratio >= 0.0,
            "contours ratios must not be negative"
        );

        let lines = &self.detector.lines;
        ensure!(
            lines.kernel_width > 0 && lines.kernel_height > 0,
            "lines kernel must be at least 1x1"
        );
        ensure!(lines.iterations > 0, "lines.iterations must be positive");
        ensure!(
            lines.max_height_ratio > 0.0 && lines.margin_ratio >= 0.0 && lines.column_ratio >= 0.0,
            "lines ratios must not be negative"
        );

        ensure!(
            self.detector.fallback.bands > 0,
            "fallback.bands must be positive"
        );
        for (name, value) in [
            ("contours.confidence", contours.confidence),
            ("lines.confidence", lines.confidence),
            ("fallback.confidence", self.detector.fallback.confidence),
        ] {
            ensure!(
                (0.0..=1.0).contains(&value),
                "{} must be within [0, 1] (got {})",
                name,
                value
            );
        }
        ensure!(
            self.server.max_body_bytes > 0,
            "server.max_body_bytes must be positive"
        );
        Ok(())
    }
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".question-detector"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bundled_settings_match_defaults() {
        let settings = parse_settings(DEFAULT_SETTINGS_TOML).expect("bundled settings");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn later_files_override_earlier_ones() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path().join("settings.toml");
        let local = dir.path().join("settings.local.toml");
        fs::write(&base, "[contours]\nconfidence = 0.5\nmin_width = 40\n").expect("write base");
        fs::write(&local, "[contours]\nconfidence = 0.6\n[server]\nworkers = 2\n")
            .expect("write local");

        let settings = load_settings_from(&[base, local, dir.path().join("missing.toml")])
            .expect("load settings");
        assert_eq!(settings.detector.contours.confidence, 0.6);
        assert_eq!(settings.detector.contours.min_width, 40);
        assert_eq!(settings.detector.contours.block_size, 11);
        assert_eq!(settings.server.workers, 2);
        assert_eq!(settings.server.worker_count(), 2);
    }

    #[test]
    fn rejects_even_block_size() {
        let err = parse_settings("[contours]\nblock_size = 10\n").unwrap_err();
        assert!(err.to_string().contains("block_size"));
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let err = parse_settings("[fallback]\nconfidence = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("fallback.confidence"));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(parse_settings("[lines]\nkernel_depth = 3\n").is_err());
    }

    #[test]
    fn missing_explicit_settings_path_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        let err = load_settings(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("settings file not found"));
    }

    #[test]
    fn auto_worker_count_uses_cpu_count() {
        let server = ServerSettings::default();
        assert_eq!(server.worker_count(), num_cpus::get().max(1));
    }
}
