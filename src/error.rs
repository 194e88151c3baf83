use thiserror::Error;

/// Errors raised by the resampling core.
///
/// None of these are transient: they describe malformed input or a bad
/// configuration and are surfaced to the caller as-is.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BootstrapError {
    #[error("schema error: {0}")]
    Schema(String),
    #[error("source series is empty")]
    EmptySeries,
    #[error("replicate count must be positive, got {0}")]
    InvalidCount(usize),
    #[error("invalid percentile band {lower}..{upper} (need 0 <= lower < upper <= 100)")]
    InvalidRange { lower: f64, upper: f64 },
    #[error("invalid block length {length} (must be in 1..={max})")]
    InvalidLength { length: usize, max: usize },
    #[error("percentile band {lower}..{upper} selected no rows")]
    EmptySelection { lower: f64, upper: f64 },
}

pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;
