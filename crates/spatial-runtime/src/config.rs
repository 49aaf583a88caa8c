//! Engine configuration file – reads/writes a TOML [`EngineConfig`].
//!
//! Hosts own the file location; the engine itself never persists anything.

use std::fs;
use std::path::Path;

use spatial_types::EngineConfig;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Load the config from `path`, apply `SPATIAL_*` overrides and clamp it.
/// Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<EngineConfig>, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file; using defaults");
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut cfg: EngineConfig = toml::from_str(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg.validate()))
}

/// Like [`load_from`], falling back to defaults (with overrides) when the
/// file is missing.
pub fn load_or_default(path: &Path) -> Result<EngineConfig, ConfigError> {
    match load_from(path)? {
        Some(cfg) => Ok(cfg),
        None => {
            let mut cfg = EngineConfig::default();
            apply_env_overrides(&mut cfg);
            Ok(cfg.validate())
        }
    }
}

/// Apply `SPATIAL_*` environment variable overrides to `cfg`.
///
/// Unparseable values are ignored with a warning.
///
/// | Variable | Config field |
/// |---|---|
/// | `SPATIAL_COVERAGE_TARGET` | `coverage_target` |
/// | `SPATIAL_CONFIDENCE_THRESHOLD` | `confidence_threshold` |
/// | `SPATIAL_CONFIDENCE_GAP` | `confidence_gap_threshold` |
/// | `SPATIAL_MAX_TURNS` | `max_clarification_turns` |
/// | `SPATIAL_CLARIFICATION_TIMEOUT` | `clarification_timeout_seconds` |
pub fn apply_env_overrides(cfg: &mut EngineConfig) {
    apply_overrides_from(cfg, |name| std::env::var(name).ok());
}

/// Apply the `SPATIAL_*` overrides found by `lookup`.
///
/// [`apply_env_overrides`] passes the process environment; tests and
/// embedding hosts can pass any other source.
pub fn apply_overrides_from(cfg: &mut EngineConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = parse_override(&lookup, "SPATIAL_COVERAGE_TARGET") {
        cfg.coverage_target = v;
    }
    if let Some(v) = parse_override(&lookup, "SPATIAL_CONFIDENCE_THRESHOLD") {
        cfg.confidence_threshold = v;
    }
    if let Some(v) = parse_override(&lookup, "SPATIAL_CONFIDENCE_GAP") {
        cfg.confidence_gap_threshold = v;
    }
    if let Some(v) = parse_override(&lookup, "SPATIAL_MAX_TURNS") {
        cfg.max_clarification_turns = v;
    }
    if let Some(v) = parse_override(&lookup, "SPATIAL_CLARIFICATION_TIMEOUT") {
        cfg.clarification_timeout_seconds = v;
    }
}

fn parse_override<T: std::str::FromStr>(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparseable override");
            None
        }
    }
}

/// Save the config to `path`, creating parent directories as needed.
pub fn save_to(cfg: &EngineConfig, path: &Path) -> Result<(), ConfigError> {
    let io_err = |source: std::io::Error| ConfigError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let raw = toml::to_string_pretty(cfg)?;
    fs::write(path, raw).map_err(io_err)?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("nested").join("spatial.toml");
        let cfg = EngineConfig {
            max_viewpoints: 4,
            ..EngineConfig::default()
        };
        save_to(&cfg, &path).expect("save ok");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.max_viewpoints, 4);
        assert_eq!(loaded.landmark_types, cfg.landmark_types);
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let result = load_from(&dir.path().join("missing.toml")).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn partial_file_keeps_defaults_and_clamps() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("spatial.toml");
        fs::write(&path, "max_viewpoints = 9\nlandmark_radius = 3.0\n").unwrap();
        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.max_viewpoints, 5);
        assert!((cfg.landmark_radius - 3.0).abs() < 1e-6);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("spatial.toml");
        fs::write(&path, "coverage_target = \"lots\"").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse(_))));
    }

    fn overrides(pairs: &[(&str, &str)]) -> EngineConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut cfg = EngineConfig::default();
        apply_overrides_from(&mut cfg, |name| vars.get(name).cloned());
        cfg
    }

    #[test]
    fn override_changes_coverage_target() {
        let cfg = overrides(&[("SPATIAL_COVERAGE_TARGET", "0.6")]);
        assert!((cfg.coverage_target - 0.6).abs() < 1e-6);
    }

    #[test]
    fn override_changes_turns_and_thresholds() {
        let cfg = overrides(&[
            ("SPATIAL_MAX_TURNS", " 5 "),
            ("SPATIAL_CONFIDENCE_THRESHOLD", "0.8"),
            ("SPATIAL_CONFIDENCE_GAP", "0.2"),
        ]);
        assert_eq!(cfg.max_clarification_turns, 5);
        assert!((cfg.confidence_threshold - 0.8).abs() < 1e-6);
        assert!((cfg.confidence_gap_threshold - 0.2).abs() < 1e-6);
    }

    #[test]
    fn unparseable_override_is_ignored() {
        let cfg = overrides(&[("SPATIAL_CLARIFICATION_TIMEOUT", "soon")]);
        assert_eq!(cfg.clarification_timeout_seconds, 30);
    }

    #[test]
    fn no_overrides_leaves_defaults() {
        let cfg = overrides(&[]);
        assert_eq!(cfg, EngineConfig::default());
    }
}
