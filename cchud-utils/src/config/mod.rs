//! Config-file loading
//!
//! The format is picked from the file extension: `.toml`, `.json`,
//! `.yaml`/`.yml`. Values missing from the file fall back to the target
//! type's serde defaults.

use serde::Deserialize;
use std::path::Path;

/// Load and deserialize a configuration file (format auto-detected)
pub fn load_config<T>(path: &Path) -> crate::Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    let content = std::fs::read_to_string(path)?;
    parse_config(&extension, &content)
}

/// Parse configuration text in the format named by `extension`
pub fn parse_config<T>(extension: &str, content: &str) -> crate::Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    match extension {
        "toml" => toml::from_str(content)
            .map_err(|e| crate::UtilError::Config(format!("TOML parse error: {e}"))),
        "json" => serde_json::from_str(content)
            .map_err(|e| crate::UtilError::Config(format!("JSON parse error: {e}"))),
        "yml" | "yaml" => serde_yaml::from_str(content)
            .map_err(|e| crate::UtilError::Config(format!("YAML parse error: {e}"))),
        _ => Err(crate::UtilError::Config(format!(
            "Unsupported config format: '{extension}'"
        ))),
    }
}

/// Layered configuration: defaults, then an optional file, then overrides
#[derive(Debug)]
pub struct ConfigBuilder<T> {
    config: T,
}

impl<T> ConfigBuilder<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    /// Start from `T::default()`
    pub fn new() -> Self {
        Self {
            config: T::default(),
        }
    }

    /// Replace the current values with the contents of `path`, if given
    pub fn load_file(mut self, path: Option<&Path>) -> crate::Result<Self> {
        if let Some(path) = path {
            self.config = load_config(path)?;
        }
        Ok(self)
    }

    /// Apply an in-place override
    #[must_use]
    pub fn apply<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut T),
    {
        f(&mut self.config);
        self
    }

    pub fn build(self) -> T {
        self.config
    }
}

impl<T> Default for ConfigBuilder<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        limit: u32,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "default".to_string(),
                limit: 7,
            }
        }
    }

    #[test]
    fn test_load_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "name = \"x\"\nlimit = 3\n").unwrap();

        let sample: Sample = load_config(&path).unwrap();
        assert_eq!(sample, Sample { name: "x".to_string(), limit: 3 });
    }

    #[test]
    fn test_load_json_with_missing_field_uses_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"limit": 20}"#).unwrap();

        let sample: Sample = load_config(&path).unwrap();
        assert_eq!(sample.name, "default");
        assert_eq!(sample.limit, 20);
    }

    #[test]
    fn test_load_yaml() {
        let sample: Sample = parse_config("yaml", "name: y\n").unwrap();
        assert_eq!(sample.name, "y");
        assert_eq!(sample.limit, 7);
    }

    #[test]
    fn test_unsupported_extension() {
        let result: crate::Result<Sample> = parse_config("ini", "name=x");
        assert!(matches!(result, Err(crate::UtilError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result: crate::Result<Sample> = load_config(Path::new("/nonexistent/cchud.toml"));
        assert!(matches!(result, Err(crate::UtilError::Io(_))));
    }

    #[test]
    fn test_builder_layers_overrides() {
        let sample: Sample = ConfigBuilder::new()
            .load_file(None)
            .unwrap()
            .apply(|s: &mut Sample| s.limit = 99)
            .build();
        assert_eq!(sample.name, "default");
        assert_eq!(sample.limit, 99);
    }
}
