//! Engine bridge error types

use thiserror::Error;

/// Errors that can occur on engine bridge calls
#[derive(Error, Debug)]
pub enum EngineError {
    /// The bridge did not answer within the bounded window
    #[error("Engine request timed out after {0}ms")]
    Timeout(u64),

    /// The bridge side of the request channel is gone
    #[error("Engine bridge disconnected")]
    Disconnected,

    /// The bridge accepted the request but dropped the reply (engine returned null)
    #[error("Engine returned no reply")]
    NoReply,
}

/// Result type for engine bridge calls
pub type EngineResult<T> = Result<T, EngineError>;
