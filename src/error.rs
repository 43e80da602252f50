use thiserror::Error;

use crate::anthropic::AnthropicError;
use crate::engine::EngineError;

/// Failure classes a tool invocation can report back into the conversation.
///
/// These never abort the HTTP request: each becomes a ToolResult failure
/// descriptor the model phrases for the user.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The model asked for a tool that is not in the registry.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments did not satisfy the tool's schema. Reported to the model
    /// so it can correct itself; nothing was sent over the network.
    #[error("invalid arguments for {tool}: {message}")]
    Validation { tool: String, message: String },

    /// The engine refused to create the job.
    #[error("submission rejected: {message}")]
    Submission { job_id: String, message: String },

    /// The job reached Failed (engine-side failure or transport exhausted).
    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// The dispatch budget elapsed or the job hit its wait ceiling. The job
    /// may still finish remotely; the id lets the user check later.
    #[error("job {job_id} is still running; check the task list later")]
    StillRunning { job_id: String },

    /// A synchronous engine call failed outright.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ToolError {
    /// Stable machine-readable tag used in failure descriptors.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::Validation { .. } => "validation_error",
            ToolError::Submission { .. } => "submission_error",
            ToolError::JobFailed { .. } => "job_failed",
            ToolError::StillRunning { .. } => "timed_out",
            ToolError::Engine(EngineError::Submission { .. }) => "submission_error",
            ToolError::Engine(_) => "transport_error",
        }
    }

    /// The job id to surface alongside the failure, when one exists.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            ToolError::Submission { job_id, .. }
            | ToolError::JobFailed { job_id, .. }
            | ToolError::StillRunning { job_id } => Some(job_id),
            _ => None,
        }
    }
}

/// Request-level failures of a conversation turn. Everything else is folded
/// into ToolResults and handed back to the model.
#[derive(Debug, Error)]
pub enum TurnError {
    /// The language model is unreachable or errored. The session history up
    /// to this point is preserved.
    #[error("language model invocation failed: {0}")]
    Model(#[from] AnthropicError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_tags() {
        let err = ToolError::Validation {
            tool: "justmagic_cluster".into(),
            message: "`queries` is required".into(),
        };
        assert_eq!(err.kind(), "validation_error");
        assert!(err.job_id().is_none());

        let err = ToolError::StillRunning {
            job_id: "8812".into(),
        };
        assert_eq!(err.kind(), "timed_out");
        assert_eq!(err.job_id(), Some("8812"));
    }

    #[test]
    fn engine_submission_maps_to_submission_kind() {
        let err = ToolError::Engine(EngineError::Submission {
            code: "no_balance".into(),
            message: "balance exhausted".into(),
        });
        assert_eq!(err.kind(), "submission_error");

        let err = ToolError::Engine(EngineError::Transport("reset".into()));
        assert_eq!(err.kind(), "transport_error");
    }
}
