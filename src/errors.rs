use std::fmt;

/// Error taxonomy for the tuning pipeline.
///
/// Per-match and per-probe failures (`Protocol`, `Io`) are isolated to their
/// worker task; `ContractViolation` aborts the whole run because it indicates
/// an engine build/version mismatch rather than transient flakiness.
#[derive(Debug, Clone)]
pub enum TunerError {
    /// Malformed or absent engine response, including a read timeout
    Protocol(String),
    /// Engine proposed an illegal move or reported an inconsistent terminal state
    ContractViolation(String),
    /// Missing input file, unwritable output path, invalid configuration
    Resource(String),
    /// Dataset or model file inconsistent with its declared layout
    DataIntegrity(String),
    /// Operation on an engine handle after `shutdown()`
    ClosedHandle,
    /// Underlying I/O failure
    Io(String),
}

impl fmt::Display for TunerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunerError::Protocol(msg) => write!(f, "Engine protocol error: {}", msg),
            TunerError::ContractViolation(msg) => {
                write!(f, "Engine contract violation: {}", msg)
            }
            TunerError::Resource(msg) => write!(f, "Resource error: {}", msg),
            TunerError::DataIntegrity(msg) => write!(f, "Data integrity error: {}", msg),
            TunerError::ClosedHandle => {
                write!(f, "Engine handle used after shutdown")
            }
            TunerError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for TunerError {}

// Convenience type alias
pub type Result<T> = std::result::Result<T, TunerError>;

impl From<std::io::Error> for TunerError {
    fn from(error: std::io::Error) -> Self {
        TunerError::Io(error.to_string())
    }
}

impl From<std::num::ParseIntError> for TunerError {
    fn from(error: std::num::ParseIntError) -> Self {
        TunerError::DataIntegrity(format!("invalid integer: {}", error))
    }
}

impl From<std::num::ParseFloatError> for TunerError {
    fn from(error: std::num::ParseFloatError) -> Self {
        TunerError::DataIntegrity(format!("invalid float: {}", error))
    }
}
