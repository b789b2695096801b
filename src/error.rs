// for error definitions
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtectionError {
    /// The backing-store liveness probe reported a failure
    #[error("Probe failed: {0}")]
    Probe(String),

    /// The backing-store liveness probe did not answer within its deadline
    #[error("Probe timed out after {0} ms")]
    ProbeTimeout(u64),

    /// The wrapped query executor failed
    #[error("Executor failed: {0}")]
    Executor(String),

    /// Data serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),
}

// implement conversions from serde_json::Error to ProtectionError
impl From<serde_json::Error> for ProtectionError {
    fn from(err: serde_json::Error) -> Self {
        ProtectionError::Serialization(err.to_string())
    }
}

// define a Result type alias for convenience
pub type Result<T> = std::result::Result<T, ProtectionError>;
