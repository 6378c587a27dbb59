//! Named wavetables for `CUSTOM-OSC`, as Fourier coefficients.
//!
//! The JSON form maps each name to its coefficient arrays:
//!
//! ```json
//! { "organ": { "real": [0, 1, 0.5], "imag": [0, 0, 0] } }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WavetableError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid wavetable file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("wavetable '{name}' has {real} real and {imag} imaginary coefficients")]
    LengthMismatch {
        name: String,
        real: usize,
        imag: usize,
    },
    #[error("wavetable '{name}' needs at least two coefficients")]
    TooShort { name: String },
}

/// Cosine (`real`) and sine (`imag`) terms; index 0 is the DC offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wavetable {
    pub real: Vec<f64>,
    pub imag: Vec<f64>,
}

impl Wavetable {
    pub fn new(real: Vec<f64>, imag: Vec<f64>) -> Self {
        Self { real, imag }
    }

    fn validate(&self, name: &str) -> Result<(), WavetableError> {
        if self.real.len() != self.imag.len() {
            return Err(WavetableError::LengthMismatch {
                name: name.to_string(),
                real: self.real.len(),
                imag: self.imag.len(),
            });
        }
        if self.real.len() < 2 {
            return Err(WavetableError::TooShort {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Name → wavetable lookup shared by the compiler and players.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WavetableSet {
    tables: BTreeMap<String, Wavetable>,
}

impl WavetableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, WavetableError> {
        let set: WavetableSet = serde_json::from_str(json)?;
        for (name, table) in &set.tables {
            table.validate(name)?;
        }
        Ok(set)
    }

    pub fn load(path: &Path) -> Result<Self, WavetableError> {
        let content = std::fs::read_to_string(path).map_err(|source| WavetableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Add or replace a table.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        table: Wavetable,
    ) -> Result<(), WavetableError> {
        let name = name.into();
        table.validate(&name)?;
        self.tables.insert(name, table);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Wavetable> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ORGAN: &str = r#"{
        "organ": { "real": [0, 1, 0.5, 0.25], "imag": [0, 0, 0, 0] },
        "buzz": { "real": [0, 0], "imag": [0, 1] }
    }"#;

    #[test]
    fn parse_json() {
        let set = WavetableSet::from_json_str(ORGAN).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("organ").unwrap().real[2], 0.5);
        assert!(set.contains("buzz"));
        assert!(set.get("flute").is_none());
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["buzz", "organ"]);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let json = r#"{ "bad": { "real": [0, 1, 2], "imag": [0, 1] } }"#;
        let err = WavetableSet::from_json_str(json).unwrap_err();
        assert!(matches!(err, WavetableError::LengthMismatch { real: 3, imag: 2, .. }));
    }

    #[test]
    fn single_coefficient_rejected() {
        let mut set = WavetableSet::new();
        let err = set.insert("dc", Wavetable::new(vec![1.0], vec![0.0]));
        assert!(matches!(err, Err(WavetableError::TooShort { .. })));
        assert!(set.is_empty());
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(matches!(
            WavetableSet::from_json_str("{ \"organ\": [1, 2] }"),
            Err(WavetableError::Json(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{ORGAN}").unwrap();
        let set = WavetableSet::load(file.path()).unwrap();
        assert!(set.contains("organ"));
    }
}
