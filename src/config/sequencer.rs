//! Sequencer configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Task runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Timeout applied by `spawn` when set. `None` means no default timeout.
    pub default_timeout_ms: Option<u64>,
    /// Capture the debug rendering of failures (backtrace when enabled).
    pub capture_trace: bool,
    /// Warn when a task fails while nothing observes its handle.
    pub warn_unobserved: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: None,
            capture_trace: true,
            warn_unobserved: true,
        }
    }
}

impl RunnerConfig {
    /// Default timeout as a duration.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Validate runner configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_timeout_ms == Some(0) {
            return Err("default_timeout_ms must be greater than 0 when set".into());
        }
        Ok(())
    }
}

/// Batch coordinator configuration: the status texts shown per item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Text of an item that has not settled yet.
    pub pending_text: String,
    /// Text of an item that completed successfully.
    pub success_text: String,
    /// Text of an item that was cancelled.
    pub cancelled_text: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            pending_text: "Pending…".into(),
            success_text: "Done".into(),
            cancelled_text: "Cancelled".into(),
        }
    }
}

impl BatchConfig {
    /// Validate batch configuration values.
    pub fn validate(&self) -> Result<(), String> {
        for (field, text) in [
            ("pending_text", &self.pending_text),
            ("success_text", &self.success_text),
            ("cancelled_text", &self.cancelled_text),
        ] {
            if text.trim().is_empty() {
                return Err(format!("{field} must not be empty"));
            }
        }
        Ok(())
    }
}

/// Root sequencer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Task runner section.
    pub runner: RunnerConfig,
    /// Batch coordinator section.
    pub batch: BatchConfig,
}

impl SequencerConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.runner
            .validate()
            .map_err(|e| format!("runner invalid: {e}"))?;
        self.batch
            .validate()
            .map_err(|e| format!("batch invalid: {e}"))?;
        Ok(())
    }

    /// Parse sequencer configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read `{}`: {e}", path.display()))?;
        Self::from_json_str(&input)
    }
}
