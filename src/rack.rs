//! The equipment a patch is compiled and played against.

use crate::config::{Limits, PatchConfig};
use crate::module::{Registry, WavetableError, WavetableSet};

/// Module registry, wavetables and configuration, bundled.
#[derive(Debug)]
pub struct Rack {
    pub config: PatchConfig,
    pub registry: Registry,
    pub wavetables: WavetableSet,
}

impl Rack {
    pub fn new(config: PatchConfig, wavetables: WavetableSet) -> Self {
        let registry = Registry::standard(&config);
        Self {
            config,
            registry,
            wavetables,
        }
    }

    /// Build from config, loading the wavetable file it names, if any.
    pub fn load(config: PatchConfig) -> Result<Self, WavetableError> {
        let wavetables = match &config.wavetables {
            Some(path) => WavetableSet::load(path)?,
            None => WavetableSet::new(),
        };
        Ok(Self::new(config, wavetables))
    }

    pub fn limits(&self) -> &Limits {
        &self.config.limits
    }
}

impl Default for Rack {
    fn default() -> Self {
        Self::new(PatchConfig::default(), WavetableSet::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_without_wavetables() {
        let rack = Rack::load(PatchConfig::default()).unwrap();
        assert!(rack.wavetables.is_empty());
    }

    #[test]
    fn load_named_wavetables() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "organ": {{ "real": [0, 1], "imag": [0, 0] }} }}"#).unwrap();
        let config = PatchConfig {
            wavetables: Some(file.path().to_path_buf()),
            ..PatchConfig::default()
        };
        let rack = Rack::load(config).unwrap();
        assert!(rack.wavetables.contains("organ"));
    }

    #[test]
    fn missing_wavetable_file_is_error() {
        let config = PatchConfig {
            wavetables: Some("/nonexistent/tables.json".into()),
            ..PatchConfig::default()
        };
        assert!(matches!(Rack::load(config), Err(WavetableError::Io { .. })));
    }
}
