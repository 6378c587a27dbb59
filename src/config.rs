//! Runtime configuration: equipment limits and player constants loaded from
//! ~/.patchlang/config.yaml.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::oscillator::midi_to_freq;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Longest shared noise buffer a config may ask for.
pub const MAX_NOISE_SECONDS: f64 = 60.0;

/// Bounds and defaults of the implicit `pitch` and `level` parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub pitch_min: f64,
    pub pitch_max: f64,
    pub pitch_default: f64,
    pub level_min: f64,
    pub level_max: f64,
    pub level_default: f64,
}

impl Default for Limits {
    /// Pitch spans the MIDI note range in Hz.
    fn default() -> Self {
        Self {
            pitch_min: midi_to_freq(0),
            pitch_max: midi_to_freq(127),
            pitch_default: 440.0,
            level_min: 0.0,
            level_max: 1.0,
            level_default: 0.8,
        }
    }
}

/// Patch runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    pub limits: Limits,
    /// Level at which a DECAY envelope counts as silent.
    pub decay_floor: f64,
    /// Fraction of the note duration a pitch bend takes when no time is given.
    pub bend_fraction: f64,
    pub noise_seed: u64,
    /// Length of the shared noise buffer.
    pub noise_seconds: f64,
    pub sample_rate: u32,
    /// JSON file of named wavetables.
    pub wavetables: Option<PathBuf>,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            decay_floor: 0.001,
            bend_fraction: 0.75,
            noise_seed: 42,
            noise_seconds: 1.0,
            sample_rate: 44_100,
            wavetables: None,
        }
    }
}

impl PatchConfig {
    /// Standard config path: ~/.patchlang/config.yaml.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".patchlang").join("config.yaml"))
    }

    /// Load from the standard path, falling back to defaults when the file
    /// does not exist. A file that exists but does not parse is an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the envelopes and noise buffer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.decay_floor > 0.0 && self.decay_floor < 1.0) {
            return Err(ConfigError::Invalid {
                field: "decay_floor",
                reason: format!("must be between 0 and 1 exclusive, got {}", self.decay_floor),
            });
        }
        if !(self.bend_fraction.is_finite() && self.bend_fraction > 0.0) {
            return Err(ConfigError::Invalid {
                field: "bend_fraction",
                reason: format!("must be positive, got {}", self.bend_fraction),
            });
        }
        if !(0.0..=MAX_NOISE_SECONDS).contains(&self.noise_seconds) {
            return Err(ConfigError::Invalid {
                field: "noise_seconds",
                reason: format!(
                    "must be between 0 and {MAX_NOISE_SECONDS}, got {}",
                    self.noise_seconds
                ),
            });
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "sample_rate",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Number of samples in the shared noise buffer.
    pub fn noise_len(&self) -> usize {
        let seconds = if self.noise_seconds.is_nan() {
            0.0
        } else {
            self.noise_seconds.clamp(0.0, MAX_NOISE_SECONDS)
        };
        (seconds * f64::from(self.sample_rate)).round() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let config = PatchConfig::default();
        assert_eq!(config.decay_floor, 0.001);
        assert_eq!(config.bend_fraction, 0.75);
        assert_eq!(config.limits.pitch_default, 440.0);
        assert_eq!(config.limits.level_default, 0.8);
        assert!(config.wavetables.is_none());
    }

    #[test]
    fn pitch_limits_cover_midi_range() {
        let limits = Limits::default();
        assert!((limits.pitch_min - 8.1758).abs() < 1e-3);
        assert!((limits.pitch_max - 12543.85).abs() < 1e-2);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "decay_floor: 0.01\nlimits:\n  level_max: 2.0\n";
        let config = PatchConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.decay_floor, 0.01);
        assert_eq!(config.limits.level_max, 2.0);
        assert_eq!(config.limits.level_min, 0.0);
        assert_eq!(config.bend_fraction, 0.75);
    }

    #[test]
    fn serialize_deserialize() {
        let config = PatchConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = PatchConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "noise_seed: 7\nwavetables: tables.json").unwrap();
        let config = PatchConfig::load_from(file.path()).unwrap();
        assert_eq!(config.noise_seed, 7);
        assert_eq!(config.wavetables, Some(PathBuf::from("tables.json")));
    }

    #[test]
    fn load_from_missing_file_is_io_error() {
        let err = PatchConfig::load_from(Path::new("/nonexistent/patchlang.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_yaml_is_error() {
        assert!(PatchConfig::from_yaml("decay_floor: [").is_err());
    }

    #[test]
    fn decay_floor_out_of_range_is_rejected() {
        for floor in ["0", "-0.5", "1", "2.0", ".nan"] {
            let err = PatchConfig::from_yaml(&format!("decay_floor: {floor}\n")).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { field: "decay_floor", .. }),
                "{floor}: {err}"
            );
        }
    }

    #[test]
    fn oversized_noise_buffer_is_rejected() {
        let err = PatchConfig::from_yaml("noise_seconds: 1e12\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "noise_seconds", .. }));
        assert!(PatchConfig::from_yaml("noise_seconds: -1\n").is_err());
        assert!(PatchConfig::from_yaml("sample_rate: 0\n").is_err());
    }

    #[test]
    fn noise_len_is_clamped() {
        let config = PatchConfig {
            noise_seconds: f64::INFINITY,
            sample_rate: 10,
            ..PatchConfig::default()
        };
        assert_eq!(config.noise_len(), 600);
    }

    #[test]
    fn noise_len_from_seconds() {
        let config = PatchConfig {
            noise_seconds: 0.5,
            sample_rate: 1000,
            ..PatchConfig::default()
        };
        assert_eq!(config.noise_len(), 500);
    }
}
