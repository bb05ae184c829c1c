//! Error types for the visual regression harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Cannot decode image {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("Element never appeared: {locator} (waited {timeout_ms} ms)")]
    NotReady { locator: String, timeout_ms: u64 },

    #[error("Page load exceeded {timeout_ms} ms: {url}")]
    LoadTimeout { url: String, timeout_ms: u64 },

    #[error("Version query failed: {0}")]
    VersionUnavailable(String),

    #[error("Image dimensions differ: reference {reference:?} vs candidate {candidate:?}")]
    DimensionMismatch {
        reference: (u32, u32),
        candidate: (u32, u32),
    },

    #[error("Metric name is reserved: {0}")]
    ReservedMetric(String),

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl E2eError {
    /// Errors that abort the whole session rather than a single scenario.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, E2eError::VersionUnavailable(_))
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
