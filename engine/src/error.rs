use sentinel_types::SensorKind;
use thiserror::Error;

/// Failures at the engine boundary. The detectors themselves never fail;
/// everything here happens before a sample reaches them or around them.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("non-finite {kind:?} sample at t={timestamp_ns}ns")]
    NonFiniteSample { kind: SensorKind, timestamp_ns: u64 },

    #[error("sequencer has shut down")]
    SequencerClosed,

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("incident log: {0}")]
    IncidentLog(#[from] std::io::Error),

    #[error("incident log serialization: {0}")]
    IncidentEncode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
