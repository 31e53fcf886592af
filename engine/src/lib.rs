//! # sentinel-engine
//!
//! On-device fall and crash detection. Two independent detectors read the
//! same sensor stream:
//!
//! - [`primary::PrimaryDetector`]: spike → settle → validate state machine over
//!   linear acceleration, gyroscope and gravity (vehicle crashes, hard falls).
//! - [`cascade::CascadeFallDetector`]: free fall → impact → still-and-lying
//!   over the raw accelerometer and magnetometer.
//!
//! [`sequencer`] serializes events from any number of producer threads into a
//! single consumer task that owns both detectors. The host binary adds a UDP
//! [`sensor_bridge`], an HTTP [`status_api`] and a chained [`incident_log`].

pub mod cascade;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod incident_log;
pub mod orientation;
pub mod primary;
pub mod sensor_bridge;
pub mod sequencer;
pub mod signal;
pub mod status_api;

pub use config::{DetectorConfig, EngineConfig};
pub use engine::{DetectionEngine, DispatchOutcome};
pub use error::{EngineError, Result};
pub use sequencer::{spawn_sequencer, SequencerHandle, SequencerOutputs, SequencerTask};
