use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::pipeline::{ContentFit, Dimensions};

const DEFAULT_MODEL_PATH: &str = "assets/model/model.json";
const DEFAULT_MIN_SCORE: f32 = 0.5;
const DEFAULT_MAX_DETECTIONS: usize = 20;
const DEFAULT_STAGE_TIMEOUT_MS: u64 = 10_000;

/// Configuration for the capture pipeline.
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Path of the model topology descriptor; weight shards sit next to it.
    pub model_path: PathBuf,
    pub min_score: f32,
    pub max_detections: usize,
    /// Fixed model input size. Frames are resized to it when set.
    pub input_shape: Option<Dimensions>,
    pub stage_timeout_ms: u64,
    pub content_fit: ContentFit,
    pub mirrored: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            min_score: DEFAULT_MIN_SCORE,
            max_detections: DEFAULT_MAX_DETECTIONS,
            input_shape: None,
            stage_timeout_ms: DEFAULT_STAGE_TIMEOUT_MS,
            content_fit: ContentFit::default(),
            mirrored: false,
        }
    }
}

impl PipelineConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var("NANOMATRIX_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model_path = PathBuf::from(path);
            }
        }
        if let Ok(raw) = std::env::var("NANOMATRIX_STAGE_TIMEOUT_MS") {
            self.stage_timeout_ms = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "NANOMATRIX_STAGE_TIMEOUT_MS",
                reason: format!("'{raw}' is not a number of milliseconds"),
            })?;
        }
        if let Ok(raw) = std::env::var("NANOMATRIX_MIN_SCORE") {
            self.min_score = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "NANOMATRIX_MIN_SCORE",
                reason: format!("'{raw}' is not a number"),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(ConfigError::Invalid {
                key: "min_score",
                reason: format!("{} is outside [0, 1]", self.min_score),
            });
        }
        if self.max_detections == 0 {
            return Err(ConfigError::Invalid {
                key: "max_detections",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.stage_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "stage_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(shape) = self.input_shape {
            if shape.is_empty() {
                return Err(ConfigError::Invalid {
                    key: "input_shape",
                    reason: format!("{}x{} has a zero side", shape.width, shape.height),
                });
            }
        }
        if self.model_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                key: "model_path",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let cfg = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.stage_timeout(), Duration::from_secs(10));
        cfg.validate().unwrap();
    }

    #[test]
    fn test_parse_full_document() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
            model_path = "models/ssd/model.json"
            min_score = 0.3
            max_detections = 5
            stage_timeout_ms = 2500
            content_fit = "cover"
            mirrored = true

            [input_shape]
            width = 300
            height = 300
            "#,
        )
        .unwrap();

        assert_eq!(cfg.model_path, PathBuf::from("models/ssd/model.json"));
        assert_eq!(cfg.min_score, 0.3);
        assert_eq!(cfg.max_detections, 5);
        assert_eq!(cfg.input_shape, Some(Dimensions::new(300, 300)));
        assert_eq!(cfg.content_fit, ContentFit::Cover);
        assert!(cfg.mirrored);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_values() {
        let cfg = PipelineConfig::from_toml_str("min_score = 1.5").unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "min_score", .. })
        ));

        let cfg = PipelineConfig::from_toml_str("stage_timeout_ms = 0").unwrap();
        assert!(cfg.validate().is_err());

        assert!(matches!(
            PipelineConfig::from_toml_str("content_fit = \"zoom\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "max_detections = 3\n").unwrap();

        let cfg = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.max_detections, 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = PipelineConfig::load(Some(Path::new("/nonexistent/pipeline.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
