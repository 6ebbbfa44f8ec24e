//! Settings file loading

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::config::Settings;

pub fn load_settings(anchor: &Path, explicit: Option<&Path>) -> Result<Settings> {
    let explicitly_provided = explicit.is_some();

    let discovered = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => discover_settings(anchor),
    };

    let Some(settings_file) = discovered else {
        return Ok(Settings::default());
    };

    let content = fs::read_to_string(&settings_file)
        .with_context(|| format!("Failed reading config file: {}", settings_file.display()))?;

    let ext = settings_file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "toml" => parse_toml_settings(&content, &settings_file),
        "yaml" | "yml" => parse_yaml_settings(&content, &settings_file),
        other => Err(anyhow::anyhow!(
            "Unsupported config extension '.{}' for file {}",
            other,
            settings_file.display()
        )),
    };

    match parsed {
        Ok(settings) => Ok(settings),
        Err(e) if explicitly_provided => Err(e),
        Err(e) => {
            // Auto-discovered: warn and fall back to defaults.
            tracing::warn!(
                "Failed to parse auto-discovered config {}: {}",
                settings_file.display(),
                e
            );
            Ok(Settings::default())
        }
    }
}

/// Parse TOML settings, tolerating a nested `[filedex]` section.
fn parse_toml_settings(content: &str, settings_file: &Path) -> Result<Settings> {
    let raw: toml::Value = toml::from_str(content)
        .with_context(|| format!("Invalid TOML syntax: {}", settings_file.display()))?;

    let value = match raw.get("filedex") {
        Some(nested) => nested.clone(),
        None => raw,
    };

    value
        .try_into()
        .with_context(|| format!("Invalid TOML config: {}", settings_file.display()))
}

/// Parse YAML settings, tolerating a nested `filedex` section.
fn parse_yaml_settings(content: &str, settings_file: &Path) -> Result<Settings> {
    let raw: serde_yaml::Value = serde_yaml::from_str(content)
        .with_context(|| format!("Invalid YAML syntax: {}", settings_file.display()))?;

    let value = match raw.get("filedex") {
        Some(nested) => nested.clone(),
        None => raw,
    };

    serde_yaml::from_value(value)
        .with_context(|| format!("Invalid YAML config: {}", settings_file.display()))
}

fn discover_settings(anchor: &Path) -> Option<std::path::PathBuf> {
    let candidates = [
        "filedex.toml",
        ".filedex.toml",
        "filedex.yml",
        ".filedex.yml",
        "filedex.yaml",
        ".filedex.yaml",
    ];

    for candidate in candidates {
        let path = anchor.join(candidate);
        if path.exists() {
            return Some(path);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_no_config_present() {
        let tmp = TempDir::new().expect("tmp");
        let settings = load_settings(tmp.path(), None).expect("settings");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn loads_toml_settings() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(
            tmp.path().join("filedex.toml"),
            "batch_size = 50\nmax_depth = 10\nignore = [\"dist\"]\n",
        )
        .expect("write");

        let settings = load_settings(tmp.path(), None).expect("settings");
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.max_depth, 10);
        assert_eq!(settings.ignore, vec!["dist".to_string()]);
    }

    #[test]
    fn loads_nested_filedex_section() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("filedex.toml"), "[filedex]\nthreads = 2\n").expect("write");

        let settings = load_settings(tmp.path(), None).expect("settings");
        assert_eq!(settings.threads, 2);
    }

    #[test]
    fn loads_yaml_settings() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("filedex.yml"), "queue_capacity: 128\n").expect("write");

        let settings = load_settings(tmp.path(), None).expect("settings");
        assert_eq!(settings.queue_capacity, Some(128));
    }

    #[test]
    fn explicit_invalid_config_returns_err() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("bad.toml");
        fs::write(&path, "batch_size = \"lots\"\n").expect("write");

        let result = load_settings(tmp.path(), Some(&path));
        assert!(result.is_err(), "explicit config with invalid type should return Err");
    }

    #[test]
    fn auto_discovered_invalid_config_returns_default() {
        let tmp = TempDir::new().expect("tmp");
        fs::write(tmp.path().join("filedex.toml"), "batch_size = \"lots\"\n").expect("write");

        let settings = load_settings(tmp.path(), None).expect("should not error");
        assert_eq!(settings.batch_size, Settings::default().batch_size);
    }

    #[test]
    fn explicit_unsupported_extension_returns_err() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("filedex.ini");
        fs::write(&path, "batch_size = 1\n").expect("write");

        let result = load_settings(tmp.path(), Some(&path));
        assert!(result.is_err());
    }
}
