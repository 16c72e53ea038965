use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Faults raised by the ambient machinery: configuration, filesystem,
/// and the commit cache.
///
/// Temporal data being unavailable is not a fault; that case is
/// [`HistoryUnavailable`].
///
/// # Examples
///
/// ```
/// use chronos_core::ChronosError;
///
/// let err = ChronosError::Config("window_weeks must be positive".into());
/// assert!(err.to_string().contains("window_weeks"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ChronosError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Commit cache failure.
    #[error("database error: {0}")]
    Database(String),
}

/// Why temporal signals could not be produced.
///
/// Returned as the `Err` side of every temporal output so callers omit the
/// corresponding signals instead of substituting zeros.
///
/// # Examples
///
/// ```
/// use chronos_core::HistoryUnavailable;
///
/// let reason = HistoryUnavailable::InsufficientHistory { found: 5, required: 10 };
/// assert_eq!(reason.to_string(), "insufficient history: 5 commits (need 10)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HistoryUnavailable {
    /// No version-control metadata at or above the path.
    #[error("not a git repository: {}", .path.display())]
    NotARepository {
        /// Path that was probed.
        path: PathBuf,
    },

    /// Fewer commits than the configured minimum.
    #[error("insufficient history: {found} commits (need {required})")]
    InsufficientHistory {
        /// Commits with at least one changed file.
        found: usize,
        /// Configured minimum.
        required: usize,
    },

    /// The git binary was missing, exited non-zero, or timed out.
    #[error("external tool failure: {message}")]
    ExternalToolFailure {
        /// Human-readable cause.
        message: String,
    },

    /// A single builder task aborted; the other builders are unaffected.
    #[error("{builder} builder failed: {reason}")]
    BuilderFailed {
        /// Builder name (`churn`, `cochange`, `authorship`).
        builder: String,
        /// Human-readable cause.
        reason: String,
    },

    /// The run configuration failed validation; no statistic was computed.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// The validation error.
        message: String,
    },
}

impl HistoryUnavailable {
    /// Shorthand for [`HistoryUnavailable::ExternalToolFailure`].
    ///
    /// # Examples
    ///
    /// ```
    /// use chronos_core::HistoryUnavailable;
    ///
    /// let reason = HistoryUnavailable::tool_failure("git log timed out after 30s");
    /// assert!(matches!(reason, HistoryUnavailable::ExternalToolFailure { .. }));
    /// ```
    pub fn tool_failure(message: impl Into<String>) -> Self {
        Self::ExternalToolFailure {
            message: message.into(),
        }
    }
}
