// SPDX-License-Identifier: MIT OR Apache-2.0
//! Application settings, stored as RON next to the working directory.

use crate::error::{AppError, Result};
use modsynth_graph::{RenderContext, RenderSettings, SharedRenderContext, ValidatingBackend, WgpuBackend};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings file looked up when none is given
pub const SETTINGS_FILE_NAME: &str = "modsynth.ron";

/// Which backend renders the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendChoice {
    /// Headless `wgpu`, falling back to validation when no adapter exists
    #[default]
    Gpu,
    /// Validate programs only
    Validating,
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Render configuration passed to the graph
    pub render: RenderSettings,
    /// Directory receiving exported PNGs
    pub output_dir: PathBuf,
    /// Backend selection
    pub backend: BackendChoice,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            render: RenderSettings::default(),
            output_dir: PathBuf::from("output"),
            backend: BackendChoice::default(),
        }
    }
}

impl AppSettings {
    /// Load settings from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(AppError::io(path, e)),
        };
        ron::from_str(&content).map_err(|e| AppError::ron(path, e))
    }

    /// Save settings as pretty RON
    pub fn save(&self, path: &Path) -> Result<()> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        let content = ron::ser::to_string_pretty(self, config).map_err(|e| AppError::ron(path, e))?;
        std::fs::write(path, content).map_err(|e| AppError::io(path, e))
    }

    /// Create the render context for the configured backend
    pub fn create_context(&self) -> SharedRenderContext {
        let context = match self.backend {
            BackendChoice::Gpu => match WgpuBackend::headless(&self.render) {
                Ok(backend) => RenderContext::new(backend, self.render.clone()),
                Err(e) => {
                    tracing::warn!("GPU backend unavailable ({e}), validating only");
                    RenderContext::new(ValidatingBackend::new(), self.render.clone())
                }
            },
            BackendChoice::Validating => RenderContext::new(ValidatingBackend::new(), self.render.clone()),
        };
        tracing::info!("Rendering with the {} backend", context.backend_name());
        context.into_shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("modsynth_settings_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert_eq!(settings.output_dir, PathBuf::from("output"));
        assert_eq!(settings.backend, BackendChoice::Gpu);
        assert_eq!(settings.render.preview_size, modsynth_graph::PREVIEW_SIZE);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = scratch_dir("missing");
        let settings = AppSettings::load(&dir.join("absent.ron")).unwrap();
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = scratch_dir("roundtrip");
        let path = dir.join(SETTINGS_FILE_NAME);
        let mut settings = AppSettings {
            backend: BackendChoice::Validating,
            ..Default::default()
        };
        settings.render.preview_size = 64;
        settings.save(&path).unwrap();

        assert_eq!(AppSettings::load(&path).unwrap(), settings);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: AppSettings = ron::from_str("(backend: Validating)").unwrap();
        assert_eq!(settings.backend, BackendChoice::Validating);
        assert_eq!(settings.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = scratch_dir("invalid");
        let path = dir.join("bad.ron");
        std::fs::write(&path, "(backend: Quantum)").unwrap();
        assert!(matches!(AppSettings::load(&path), Err(AppError::Ron { .. })));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_validating_context() {
        let settings = AppSettings {
            backend: BackendChoice::Validating,
            ..Default::default()
        };
        assert_eq!(settings.create_context().lock().backend_name(), "validating");
    }
}
