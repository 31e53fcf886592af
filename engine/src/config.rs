//! # config
//!
//! Detector thresholds and host settings.
//!
//! Thresholds are fixed at construction: each detector receives its own
//! immutable struct, which keeps unit tests deterministic and lets a host
//! override values from a TOML file without touching code.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

// ── Primary (spike-then-validate) ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryThresholds {
    /// TAM above which a sample counts as a spike (m/s²)
    pub impact_tam_mps2: f32,
    /// Jerk that must accompany the TAM spike in the same sample (m/s³)
    pub impact_jerk_mps3: f32,
    /// SMA below which the gravity-at-rest reference is refreshed
    pub rest_sma_mps2: f32,
    /// SMA below which the device is considered motionless
    pub still_sma_mps2: f32,
    /// Orientation swing that marks a fall/rollover (degrees)
    pub orientation_change_deg: f32,
    /// Settle window after the spike
    pub impact_window_ms: u64,
    /// Final stillness window before confirming
    pub validation_window_ms: u64,
    /// SMA ring buffer length (≈1 s at 50 Hz)
    pub sma_window: usize,
    /// Interval assumed when timestamps cannot provide one (50 Hz)
    pub default_dt_secs: f32,
}

impl Default for PrimaryThresholds {
    fn default() -> Self {
        Self {
            impact_tam_mps2: 20.0,
            impact_jerk_mps3: 100.0,
            rest_sma_mps2: 1.5,
            still_sma_mps2: 1.0,
            orientation_change_deg: 60.0,
            impact_window_ms: 2_000,
            validation_window_ms: 30_000,
            sma_window: 50,
            default_dt_secs: 0.02,
        }
    }
}

// ── Cascade (free-fall → impact → stillness → orientation) ───────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeThresholds {
    /// One g in m/s²; SMV is expressed in multiples of this
    pub gravity_mps2: f32,
    pub free_fall_g: f32,
    pub impact_g: f32,
    /// Max time between free-fall and impact
    pub impact_window_ms: u64,
    /// Post-impact stillness sampling window
    pub stillness_window_ms: u64,
    /// SMV std-dev below which the device is still (g)
    pub stillness_std_g: f32,
    /// Mean |pitch| below which the person is lying down (degrees)
    pub lying_pitch_deg: f32,
}

impl Default for CascadeThresholds {
    fn default() -> Self {
        Self {
            gravity_mps2: 9.81,
            free_fall_g: 0.6,
            impact_g: 1.8,
            impact_window_ms: 1_600,
            stillness_window_ms: 333,
            stillness_std_g: 0.1,
            lying_pitch_deg: 50.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub primary: PrimaryThresholds,
    pub cascade: CascadeThresholds,
}

impl DetectorConfig {
    pub fn from_toml_str(raw: &str, origin: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|source| EngineError::ConfigParse {
            path: origin.to_string(),
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
            path: display.clone(),
            source,
        })?;
        Self::from_toml_str(&raw, &display)
    }
}

// ── Host settings ─────────────────────────────────────────────────────────────

pub struct EngineConfig {
    /// UDP port for sensor envelopes (default 5556)
    pub udp_port: u16,
    /// HTTP status port (default 3002)
    pub http_port: u16,
    /// Recent events kept for diagnostics (default 500)
    pub history_capacity: usize,
    /// Append-only incident chain (default incidents.jsonl)
    pub incident_log_path: String,
    /// Optional TOML overriding detector thresholds
    pub detector_config_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            udp_port: std::env::var("SENTINEL_UDP_PORT")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(5556),
            http_port: std::env::var("SENTINEL_HTTP_PORT")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(3002),
            history_capacity: std::env::var("SENTINEL_HISTORY_CAPACITY")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(500),
            incident_log_path: std::env::var("SENTINEL_INCIDENT_LOG")
                .unwrap_or_else(|_| "incidents.jsonl".to_string()),
            detector_config_path: std::env::var("SENTINEL_DETECTOR_CONFIG").ok(),
        }
    }
}
