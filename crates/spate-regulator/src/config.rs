//! # Regulator Configuration
//!
//! Bitrate bounds, strategy selection, and the TOML input layer. Input
//! structs accept partial files with `serde(default)` and `resolve()` into
//! the validated runtime config; malformed bounds are construction-time
//! errors, never runtime panics.

use serde::Deserialize;
use thiserror::Error;

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Construction-time configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("bitrate range lower bound {lower} is above upper bound {upper}")]
    InvertedRange { lower: i64, upper: i64 },
    #[error("minimum bitrate {minimum} must be positive and no higher than the upper bound {upper}")]
    MinimumOutOfRange { minimum: i64, upper: i64 },
    #[error("unknown regulator algorithm {0:?}")]
    UnknownAlgorithm(String),
    #[error("unknown settings profile {0:?}")]
    UnknownProfile(String),
    #[error("invalid regulator config TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

// ─── Bounds ─────────────────────────────────────────────────────────────────

/// Inclusive video bitrate bounds in bits/sec.
///
/// `upper` is both the user's hard ceiling and the initial target the
/// strategies climb toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitrateRange {
    pub lower: i64,
    pub upper: i64,
}

impl BitrateRange {
    pub fn new(lower: i64, upper: i64) -> Result<Self, ConfigError> {
        if lower > upper {
            return Err(ConfigError::InvertedRange { lower, upper });
        }
        Ok(BitrateRange { lower, upper })
    }

    /// Bound a bitrate into this range.
    pub fn clamp(&self, bitrate_bps: i64) -> i64 {
        bitrate_bps.clamp(self.lower, self.upper)
    }
}

// ─── Selection ──────────────────────────────────────────────────────────────

/// Which regulation strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegulatorKind {
    /// Send-buffer/RTT threshold cascade with cooldown timers.
    CongestionThreshold,
    /// Dual-speed packets-in-flight and RTT smoothing with an adaptive ceiling.
    DualRate,
}

/// Named tunables preset. Swapping the profile mid-stream changes step
/// magnitudes without resetting any smoothing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsProfile {
    /// React quickly: tighter congestion thresholds, larger climb steps.
    Fast,
    /// React gently: looser thresholds, smaller climb steps.
    Slow,
}

// ─── Runtime config ─────────────────────────────────────────────────────────

/// Immutable per-session regulator configuration.
#[derive(Debug, Clone, Copy)]
pub struct RegulatorConfig {
    /// Hard video bitrate bounds in bits/sec.
    pub video_bitrate_range: BitrateRange,
    /// Floor the severe-congestion path snaps to, in bits/sec.
    pub minimum_bitrate: i64,
    /// Strategy to construct.
    pub kind: RegulatorKind,
    /// Initial tunables preset.
    pub profile: SettingsProfile,
}

impl Default for RegulatorConfig {
    fn default() -> Self {
        RegulatorConfig {
            video_bitrate_range: BitrateRange {
                lower: 250_000,
                upper: 6_000_000,
            },
            minimum_bitrate: 250_000,
            kind: RegulatorKind::CongestionThreshold,
            profile: SettingsProfile::Fast,
        }
    }
}

impl RegulatorConfig {
    /// Check the bound invariants. Called by the controller constructor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let BitrateRange { lower, upper } = self.video_bitrate_range;
        if lower > upper {
            return Err(ConfigError::InvertedRange { lower, upper });
        }
        if self.minimum_bitrate <= 0 || self.minimum_bitrate > upper {
            return Err(ConfigError::MinimumOutOfRange {
                minimum: self.minimum_bitrate,
                upper,
            });
        }
        Ok(())
    }

    /// Parse a TOML config file. Empty input yields the defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(RegulatorConfig::default());
        }
        let parsed: RegulatorConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }
}

// ─── TOML input layer ───────────────────────────────────────────────────────

/// Raw TOML shape; every field optional, defaults filled in by `resolve`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegulatorConfigInput {
    pub algorithm: Option<String>,
    pub profile: Option<String>,
    pub lower_bitrate_bps: Option<i64>,
    pub upper_bitrate_bps: Option<i64>,
    pub minimum_bitrate_bps: Option<i64>,
}

impl RegulatorConfigInput {
    pub fn resolve(self) -> Result<RegulatorConfig, ConfigError> {
        let defaults = RegulatorConfig::default();

        let kind = match self.algorithm.as_deref() {
            None => defaults.kind,
            Some("congestion-threshold") => RegulatorKind::CongestionThreshold,
            Some("dual-rate") => RegulatorKind::DualRate,
            Some(other) => return Err(ConfigError::UnknownAlgorithm(other.to_string())),
        };

        let profile = match self.profile.as_deref() {
            None => defaults.profile,
            Some("fast") => SettingsProfile::Fast,
            Some("slow") => SettingsProfile::Slow,
            Some(other) => return Err(ConfigError::UnknownProfile(other.to_string())),
        };

        let lower = self
            .lower_bitrate_bps
            .unwrap_or(defaults.video_bitrate_range.lower);
        let upper = self
            .upper_bitrate_bps
            .unwrap_or(defaults.video_bitrate_range.upper);
        let minimum = self.minimum_bitrate_bps.unwrap_or(lower);

        let config = RegulatorConfig {
            video_bitrate_range: BitrateRange { lower, upper },
            minimum_bitrate: minimum,
            kind,
            profile,
        };
        config.validate()?;
        Ok(config)
    }
}
