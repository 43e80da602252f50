//! Executes validated tool invocations against the engine and the tracker.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use super::registry::{self, ToolKind, ToolPlan};
use crate::anthropic::ContentBlock;
use crate::engine::EngineApi;
use crate::error::ToolError;
use crate::tracker::{JobState, JobTracker};

/// One invocation requested by the model within a conversation turn.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Correlation id from the model's `tool_use` block.
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Success payload or failure descriptor. Never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(Value),
    Failure {
        kind: &'static str,
        message: String,
        job_id: Option<String>,
    },
}

/// The normalized outcome of one [`ToolCall`].
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub tool: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success(_))
    }

    /// The job id attached to this result, if the tool ran (or tried to
    /// run) as an engine job.
    pub fn job_id(&self) -> Option<&str> {
        match &self.outcome {
            ToolOutcome::Success(payload) => payload["job_id"].as_str(),
            ToolOutcome::Failure { job_id, .. } => job_id.as_deref(),
        }
    }

    /// Render as the `tool_result` content block fed back to the model.
    pub fn to_block(&self) -> ContentBlock {
        match &self.outcome {
            ToolOutcome::Success(payload) => ContentBlock::ToolResult {
                tool_use_id: self.call_id.clone(),
                content: payload.to_string(),
                is_error: false,
            },
            ToolOutcome::Failure {
                kind,
                message,
                job_id,
            } => ContentBlock::ToolResult {
                tool_use_id: self.call_id.clone(),
                content: json!({
                    "error": kind,
                    "message": message,
                    "job_id": job_id,
                })
                .to_string(),
                is_error: true,
            },
        }
    }
}

/// Routes tool calls: validation first, then either a synchronous engine
/// call or a tracked job awaited under the per-call budget.
///
/// `dispatch` never blocks past the budget; unresolved work comes back as a
/// "still running" failure descriptor carrying the job id.
pub struct Dispatcher {
    tracker: JobTracker,
    engine: Arc<dyn EngineApi>,
    budget: Duration,
}

impl Dispatcher {
    pub fn new(tracker: JobTracker, engine: Arc<dyn EngineApi>, budget: Duration) -> Self {
        Self {
            tracker,
            engine,
            budget,
        }
    }

    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        match self.run(call).await {
            Ok(payload) => ToolResult {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                outcome: ToolOutcome::Success(payload),
            },
            Err(error) => {
                debug!(tool = %call.name, kind = error.kind(), "tool call failed: {error}");
                ToolResult {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    outcome: ToolOutcome::Failure {
                        kind: error.kind(),
                        message: error.to_string(),
                        job_id: error.job_id().map(str::to_string),
                    },
                }
            }
        }
    }

    async fn run(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let kind = ToolKind::from_name(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        let plan = registry::plan(kind, &call.input)?;

        match plan {
            ToolPlan::AccountInfo => Ok(self.engine.account_info().await?),

            ToolPlan::ListTasks { limit, offset } => {
                Ok(self.engine.list_tasks(limit, offset).await?)
            }

            ToolPlan::TaskStatus { job_id } => {
                // Prefer the tracker's snapshot when we own the job; fall
                // back to asking the engine about foreign task ids.
                if let Some(job) = self.tracker.query(&job_id).await {
                    return Ok(json!({
                        "job_id": job.id,
                        "kind": job.kind.to_string(),
                        "state": job.state,
                        "submitted_at": job.submitted_at,
                        "info": job.result,
                        "error": job.error,
                    }));
                }
                let status = self.engine.poll(&job_id).await?;
                Ok(status.payload)
            }

            ToolPlan::DownloadResult { job_id, max_rows } => {
                Ok(self.engine.download_result(&job_id, max_rows).await?)
            }

            ToolPlan::Job {
                kind,
                fields,
                just_ask,
            } => {
                if just_ask {
                    return Ok(self.engine.quote(kind, &fields).await?);
                }

                let job = self.tracker.register(kind, fields).await;
                if job.state == JobState::Failed {
                    return Err(ToolError::Submission {
                        job_id: job.id,
                        message: job.error.unwrap_or_else(|| "submission failed".into()),
                    });
                }

                let awaited = self
                    .tracker
                    .await_result(&job.id, self.budget)
                    .await
                    .unwrap_or(job);

                match awaited.state {
                    JobState::Succeeded => {
                        let payload = awaited.result.unwrap_or(Value::Null);
                        Ok(registry::normalize_result(kind, &awaited.id, &payload))
                    }
                    JobState::Failed => Err(ToolError::JobFailed {
                        job_id: awaited.id,
                        message: awaited.error.unwrap_or_else(|| "job failed".into()),
                    }),
                    // TimedOut or still live past the budget: same answer.
                    _ => Err(ToolError::StillRunning { job_id: awaited.id }),
                }
            }
        }
    }
}
