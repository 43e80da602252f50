use thiserror::Error;

/// Errors surfaced by the Just-Magic engine client.
///
/// `Submission` is terminal for the operation that caused it; `Transport`
/// is retryable and is counted against the consecutive-failure budget by
/// the job tracker.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine accepted the request but rejected it with an error code
    /// (bad parameters, insufficient balance, unknown task).
    #[error("engine rejected the request ({code}): {message}")]
    Submission { code: String, message: String },

    /// Network-level failure: the engine never produced a usable answer.
    #[error("engine transport error: {0}")]
    Transport(String),

    /// The engine answered with a body this client could not decode.
    #[error("failed to decode engine response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Transport(err.to_string())
    }
}
