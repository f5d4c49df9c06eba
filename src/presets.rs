//! Country bounding-box presets.
//!
//! Loaded once at startup from a JSON object keyed by country code and passed
//! to job planning; nothing here is global.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::warn;

use crate::coords::BoundingBox;
use crate::error::ConfigError;

pub const DEFAULT_PRESETS_FILE: &str = "country_bbox.json";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Presets {
    entries: HashMap<String, BoundingBox>,
}

impl Presets {
    /// Table used when no presets file can be read.
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();
        entries.insert("SG".to_string(), BoundingBox::new(1.15, 1.47, 103.5, 104.2));
        Self { entries }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, BoundingBox> = serde_json::from_str(json)?;
        let entries = raw
            .into_iter()
            .map(|(code, bbox)| (code.to_uppercase(), bbox))
            .collect();
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::ReadPresets {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json).map_err(|source| ConfigError::ParsePresets {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`Presets::load`], falling back to [`Presets::builtin`].
    pub fn load_or_builtin(path: &Path) -> Self {
        match Self::load(path) {
            Ok(presets) => presets,
            Err(err) => {
                warn!(error = %err, "Using built-in country presets");
                Self::builtin()
            }
        }
    }

    /// Looks up a country code, ignoring case.
    pub fn get(&self, code: &str) -> Result<BoundingBox, ConfigError> {
        self.entries
            .get(&code.to_uppercase())
            .copied()
            .ok_or_else(|| ConfigError::UnknownCountry(code.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builtin_has_singapore() {
        let presets = Presets::builtin();
        assert_eq!(
            presets.get("sg").unwrap(),
            BoundingBox::new(1.15, 1.47, 103.5, 104.2)
        );
    }

    #[test]
    fn parses_json_case_insensitively() {
        let presets = Presets::from_json(
            r#"{"my": {"min_lat": 0.85, "max_lat": 7.36, "min_lon": 99.64, "max_lon": 119.27}}"#,
        )
        .unwrap();
        assert_eq!(presets.len(), 1);
        assert_eq!(presets.get("MY").unwrap().max_lon, 119.27);
    }

    #[test]
    fn unknown_code_is_config_error() {
        let err = Presets::builtin().get("xx").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCountry(ref c) if c == "xx"));
        assert_eq!(err.to_string(), "no bounding box found for country 'xx'");
    }

    #[test]
    fn missing_or_broken_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            Presets::load(&missing),
            Err(ConfigError::ReadPresets { .. })
        ));
        assert_eq!(Presets::load_or_builtin(&missing), Presets::builtin());

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{not json").unwrap();
        assert!(matches!(
            Presets::load(&broken),
            Err(ConfigError::ParsePresets { .. })
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_PRESETS_FILE);
        fs::write(
            &path,
            r#"{"SG": {"min_lat": 1.15, "max_lat": 1.47, "min_lon": 103.5, "max_lon": 104.2},
                "NZ": {"min_lat": -47.3, "max_lat": -34.4, "min_lon": 166.4, "max_lon": 178.6}}"#,
        )
        .unwrap();

        let presets = Presets::load(&path).unwrap();
        assert_eq!(presets.len(), 2);
        assert!(presets.get("nz").is_ok());
    }
}
