//! Crate-wide error taxonomy (§7, §3.1).
//!
//! Configuration errors are raised at job-construction time, before any
//! [`crate::battle::BattleState`] exists, so they can never surface mid-tick.
//! Instantiation failures are not errors at all — they are `None` returns
//! from [`crate::unit::instantiate`] — so they do not appear here.

use thiserror::Error;

/// The crate's single error type.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Unknown family id, malformed `CompositeSpec`, or a schema violation.
    /// Raised at job construction; never retried.
    #[error("config error: {0}")]
    Config(String),

    /// A worker failed to complete a match (simulation step error, panic,
    /// or a propagated `Config` error surfaced late). Never crashes the pool;
    /// always returned to the awaiting caller.
    #[error("worker error: {0}")]
    Worker(String),

    /// Artifact or snapshot I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact or snapshot JSON shape failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate's public surface.
pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_displays_message() {
        let e = HarnessError::Config("unknown familyId 'nope-target'".to_string());
        assert!(e.to_string().contains("unknown familyId"));
    }

    #[test]
    fn io_error_converts_via_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: HarnessError = io.into();
        assert!(matches!(e, HarnessError::Io(_)));
    }

    #[test]
    fn json_error_converts_via_from() {
        let bad: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let e: HarnessError = bad.unwrap_err().into();
        assert!(matches!(e, HarnessError::Json(_)));
    }
}
