//! Application configuration loading.
//!
//! One YAML file wraps the renderer settings plus output and logging
//! locations. Every key is optional; a missing file yields defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use lform_models::RenderSettings;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    renderer: RenderSettings,
    output: OutputConfig,
    logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct OutputConfig {
    directory: PathBuf,
    assets_directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            assets_directory: PathBuf::from("assets"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LoggingConfig {
    level: String,
    file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: PathBuf::from("logs/run.log"),
        }
    }
}

/// Resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub renderer: RenderSettings,
    pub output_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub log_level: String,
    pub log_file: PathBuf,
}

impl AppConfig {
    /// Load from a YAML file, or defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let raw = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    PipelineError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                serde_yaml::from_str::<RawConfig>(&text).map_err(|e| {
                    PipelineError::Config(format!("invalid config {}: {e}", path.display()))
                })?
            }
            None => RawConfig::default(),
        };

        // Surface colour typos at startup rather than mid-render.
        raw.renderer
            .text
            .text_color()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        raw.renderer
            .text
            .band_color()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        Ok(Self {
            renderer: raw.renderer,
            output_dir: raw.output.directory,
            assets_dir: raw.output.assets_directory,
            log_level: raw.logging.level,
            log_file: raw.logging.file,
        })
    }
}
