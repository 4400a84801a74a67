//! # Config Module
//!
//! Settings consumed by the grouping and escalation passes.
//!
//! A `DedupConfig` is built once per pass (defaults, or a JSON file written by the
//! settings dialog) and never mutated afterwards.
//!
//! ```json
//! {
//!   "performance_preset": "Balanced",
//!   "sha256_confirmation": true,
//!   "exif_strict_mode": false,
//!   "dimension_tolerance": 0.5,
//!   "escalation": { "datetime_tolerance_secs": 2.0, "camera_check_enabled": true }
//! }
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Performance presets and their near-duplicate distance thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PerformancePreset {
    /// Strictest matching, fewest candidates
    UltraLite,
    /// Default trade-off
    Balanced,
    /// Most permissive, catches heavier edits
    Accurate,
}

impl PerformancePreset {
    /// Maximum Hamming distance used for default-threshold queries
    pub fn max_distance(&self) -> u32 {
        match self {
            PerformancePreset::UltraLite => 6,
            PerformancePreset::Balanced => 8,
            PerformancePreset::Accurate => 12,
        }
    }

    /// Parse a preset name as written by the settings dialog
    ///
    /// Accepts "Ultra-Lite", "ultra_lite", "UltraLite" and so on.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "ultralite" => Some(PerformancePreset::UltraLite),
            "balanced" => Some(PerformancePreset::Balanced),
            "accurate" => Some(PerformancePreset::Accurate),
            _ => None,
        }
    }

    /// Resolve a preset name, falling back to Balanced for unknown names
    ///
    /// Silent; [`DedupConfig::validate`] reports unknown names once.
    pub fn resolve(name: &str) -> Self {
        Self::from_name(name).unwrap_or(PerformancePreset::Balanced)
    }
}

impl Default for PerformancePreset {
    fn default() -> Self {
        PerformancePreset::Balanced
    }
}

impl std::fmt::Display for PerformancePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PerformancePreset::UltraLite => write!(f, "Ultra-Lite"),
            PerformancePreset::Balanced => write!(f, "Balanced"),
            PerformancePreset::Accurate => write!(f, "Accurate"),
        }
    }
}

/// Settings for the safe-duplicate escalation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Maximum capture-time difference, inclusive
    pub datetime_tolerance_secs: f64,
    /// Require matching camera models
    pub camera_check_enabled: bool,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            datetime_tolerance_secs: 2.0,
            camera_check_enabled: true,
        }
    }
}

/// Settings for a grouping pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Preset name; unknown names resolve to Balanced
    pub performance_preset: String,
    /// Require matching SHA-256 before admitting Tier-1 members
    pub sha256_confirmation: bool,
    /// Reject Tier-2 candidates captured at clearly different moments
    pub exif_strict_mode: bool,
    /// Allowed resolution mismatch for Tier-2 candidates (0 = identical pixel count)
    pub dimension_tolerance: f64,
    pub escalation: EscalationConfig,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            performance_preset: PerformancePreset::Balanced.to_string(),
            sha256_confirmation: true,
            exif_strict_mode: false,
            dimension_tolerance: 0.5,
            escalation: EscalationConfig::default(),
        }
    }
}

impl DedupConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: DedupConfig =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check numeric ranges; an unknown preset only warns
    pub fn validate(&self) -> Result<(), ConfigError> {
        if PerformancePreset::from_name(&self.performance_preset).is_none() {
            tracing::warn!(
                preset = %self.performance_preset,
                "Unknown performance preset, using Balanced"
            );
        }

        if !(0.0..=1.0).contains(&self.dimension_tolerance) {
            return Err(ConfigError::InvalidValue {
                field: "dimension_tolerance",
                reason: format!("{} is not between 0 and 1", self.dimension_tolerance),
            });
        }

        let tolerance = self.escalation.datetime_tolerance_secs;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "escalation.datetime_tolerance_secs",
                reason: format!("{} must be a non-negative number of seconds", tolerance),
            });
        }

        Ok(())
    }

    /// The resolved performance preset
    pub fn preset(&self) -> PerformancePreset {
        PerformancePreset::resolve(&self.performance_preset)
    }

    /// Near-duplicate threshold for the resolved preset
    pub fn max_distance(&self) -> u32 {
        self.preset().max_distance()
    }

    /// Builder-style preset override
    pub fn with_preset(mut self, preset: PerformancePreset) -> Self {
        self.performance_preset = preset.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn preset_thresholds() {
        assert_eq!(PerformancePreset::UltraLite.max_distance(), 6);
        assert_eq!(PerformancePreset::Balanced.max_distance(), 8);
        assert_eq!(PerformancePreset::Accurate.max_distance(), 12);
    }

    #[test]
    fn preset_names_parse_loosely() {
        assert_eq!(PerformancePreset::from_name("Ultra-Lite"), Some(PerformancePreset::UltraLite));
        assert_eq!(PerformancePreset::from_name("ultra_lite"), Some(PerformancePreset::UltraLite));
        assert_eq!(PerformancePreset::from_name(" ACCURATE "), Some(PerformancePreset::Accurate));
        assert_eq!(PerformancePreset::from_name("turbo"), None);
    }

    #[test]
    fn unknown_preset_falls_back_to_balanced() {
        let config = DedupConfig {
            performance_preset: "Ludicrous".to_string(),
            ..DedupConfig::default()
        };
        assert_eq!(config.preset(), PerformancePreset::Balanced);
        assert_eq!(config.max_distance(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn display_round_trips_through_from_name() {
        for preset in [
            PerformancePreset::UltraLite,
            PerformancePreset::Balanced,
            PerformancePreset::Accurate,
        ] {
            assert_eq!(PerformancePreset::from_name(&preset.to_string()), Some(preset));
        }
    }

    #[test]
    fn load_fills_missing_fields_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "performance_preset": "Accurate",
                "escalation": {{ "camera_check_enabled": false }} }}"#
        )
        .unwrap();

        let config = DedupConfig::load(file.path()).unwrap();

        assert_eq!(config.preset(), PerformancePreset::Accurate);
        assert!(config.sha256_confirmation);
        assert!(!config.escalation.camera_check_enabled);
        assert_eq!(config.escalation.datetime_tolerance_secs, 2.0);
    }

    #[test]
    fn load_rejects_out_of_range_tolerance() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "dimension_tolerance": 1.5 }}"#).unwrap();

        let error = DedupConfig::load(file.path()).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { field: "dimension_tolerance", .. }));
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let error = DedupConfig::load(file.path()).unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
    }
}
