//! Engine configuration.
//!
//! # Responsibility
//! - Hold numeric tolerances and behavior switches for geometry and sync.
//! - Load them from camelCase JSON with every field optional.
//!
//! # Invariants
//! - A config that passed [`EngineConfig::validate`] has strictly positive,
//!   finite tolerances.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Relative tolerance for equal basis lengths.
pub const LENGTH_TOL: f64 = 1e-6;
/// Absolute tolerance, in degrees, for the right-angle and collinearity checks.
pub const ANGLE_TOL: f64 = 0.1;
/// Absolute tolerance, in degrees, around 60° and 120°.
pub const TRIANGULAR_TOL: f64 = 0.5;
/// Determinant/volume threshold for singular matrices and degenerate cells.
pub const EPSILON: f64 = 1e-14;
/// |z| below which a scaled basis vector counts as in-plane.
pub const PLANAR_TOL: f64 = 1e-10;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid { field: &'static str, value: f64 },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid { field, value } => {
                write!(f, "config field `{field}` must be positive and finite, got {value}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Tolerances used by the symmetry classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierTolerances {
    pub length: f64,
    pub angle: f64,
    pub triangular: f64,
}

impl Default for ClassifierTolerances {
    fn default() -> Self {
        Self {
            length: LENGTH_TOL,
            angle: ANGLE_TOL,
            triangular: TRIANGULAR_TOL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub tolerances: ClassifierTolerances,
    pub epsilon: f64,
    pub planar_tolerance: f64,
    /// Fall back to built-in numerics when the native module fails.
    pub allow_pure_fallback: bool,
    /// Merge queued sync tasks that target the same lattice.
    pub coalesce_sync_tasks: bool,
    /// Optional `log` level name (`error` .. `trace`).
    pub log_level: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tolerances: ClassifierTolerances::default(),
            epsilon: EPSILON,
            planar_tolerance: PLANAR_TOL,
            allow_pure_fallback: true,
            coalesce_sync_tasks: true,
            log_level: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let checks = [
            ("tolerances.length", self.tolerances.length),
            ("tolerances.angle", self.tolerances.angle),
            ("tolerances.triangular", self.tolerances.triangular),
            ("epsilon", self.epsilon),
            ("planarTolerance", self.planar_tolerance),
        ];
        for (field, value) in checks {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid { field, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{"tolerances":{"angle":0.5},"allowPureFallback":false}"#,
        )
        .unwrap();
        assert_eq!(config.tolerances.angle, 0.5);
        assert_eq!(config.tolerances.length, LENGTH_TOL);
        assert!(!config.allow_pure_fallback);
        assert!(config.coalesce_sync_tasks);
    }

    #[test]
    fn non_positive_tolerance_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{"epsilon":0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "epsilon", .. }));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = EngineConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"logLevel":"debug"}"#).unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }
}
