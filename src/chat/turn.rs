//! One conversation turn: model call, tool dispatch, model again, until a
//! final text reply or the round limit.

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info};

use super::session::SessionStore;
use crate::anthropic::{ContentBlock, Message, MessageSender, MessagesRequest};
use crate::error::TurnError;
use crate::tools::{Dispatcher, ToolCall, ToolKind, tool_definitions};

/// Persona and ground rules handed to the model on every call.
pub const SYSTEM_PROMPT: &str = "\
You are an SEO analyst assistant backed by the Just-Magic analysis engine.

You can cluster semantics, collect Wordstat frequencies, parse search \
suggestions, analyze on-page texts, run LSI analysis and generation, \
classify queries by topic, distribute queries across pages, expand semantic \
cores, search the keyword base by regex, and inspect tasks and the account.

Important:
1. Most analyses run asynchronously. If a tool reports that a job is still \
running, give the user its task id and tell them the result will be ready \
in a while; they can ask for the task list at any time.
2. Region 213 = Moscow, 2 = Saint Petersburg.
3. Frequencies come from Yandex Wordstat.
4. Clustering expects a list of queries, one phrase per query.

Answer briefly and to the point. Use the tools whenever an SEO task calls \
for them.";

/// Per-turn limits, derived from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Rounds of tool calls allowed before the turn falls back to a
    /// partial-results reply.
    pub max_tool_rounds: u32,
}

/// What one tool call did, for the front end's summary strip.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallSummary {
    pub tool: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// The outcome of a full conversation-loop cycle.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub tool_calls: Vec<ToolCallSummary>,
}

/// Drive one user message through the loop: AwaitingModel, then either a
/// final reply or rounds of tool calls until the model stops asking (or the
/// round limit turns the rest into a partial reply).
///
/// History is appended at every step, including intermediate rounds, so a
/// model failure mid-turn loses nothing already recorded.
pub async fn run_turn(
    model: &impl MessageSender,
    dispatcher: &Dispatcher,
    sessions: &SessionStore,
    session_id: &str,
    user_message: &str,
    config: &TurnConfig,
) -> Result<TurnOutcome, TurnError> {
    sessions
        .append(session_id, vec![Message::user_text(user_message)])
        .await;

    let mut summaries: Vec<ToolCallSummary> = Vec::new();

    for round in 0..config.max_tool_rounds {
        let request = MessagesRequest {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system: Some(SYSTEM_PROMPT.to_string()),
            messages: sessions.history(session_id).await,
            tools: tool_definitions(),
        };

        let response = model.send_message(&request).await?;
        sessions
            .append(session_id, vec![Message::assistant(response.content.clone())])
            .await;

        let calls: Vec<ToolCall> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect();

        if !response.wants_tools() || calls.is_empty() {
            return Ok(TurnOutcome {
                reply: response.text(),
                tool_calls: summaries,
            });
        }

        info!(session = %session_id, round, count = calls.len(), "dispatching tool calls");

        // Concurrent dispatch; join_all keeps the model's request order, so
        // results land in history in that order even when completion order
        // differs.
        let results = join_all(calls.iter().map(|call| dispatcher.dispatch(call))).await;

        let mut blocks = Vec::with_capacity(results.len());
        for result in results {
            let job_backed = ToolKind::from_name(&result.tool)
                .and_then(|kind| kind.job_kind())
                .is_some();
            if job_backed && let Some(job_id) = result.job_id() {
                sessions.add_job(session_id, job_id.to_string()).await;
            }
            summaries.push(ToolCallSummary {
                tool: result.tool.clone(),
                ok: result.is_success(),
                job_id: result.job_id().map(str::to_string),
            });
            blocks.push(result.to_block());
        }
        sessions
            .append(session_id, vec![Message::tool_results(blocks)])
            .await;
    }

    // Round limit hit: stop asking the model and report what we have.
    debug!(session = %session_id, "tool round limit reached, synthesizing partial reply");
    let reply = partial_reply(&summaries);
    sessions
        .append(
            session_id,
            vec![Message::assistant(vec![ContentBlock::Text {
                text: reply.clone(),
            }])],
        )
        .await;

    Ok(TurnOutcome {
        reply,
        tool_calls: summaries,
    })
}

fn partial_reply(summaries: &[ToolCallSummary]) -> String {
    let mut reply = String::from(
        "I hit the tool-call limit for this turn, so here is where things stand:\n",
    );
    for summary in summaries {
        let status = if summary.ok { "finished" } else { "not finished" };
        match &summary.job_id {
            Some(job_id) => {
                reply.push_str(&format!("- {} ({status}, task {job_id})\n", summary.tool));
            }
            None => reply.push_str(&format!("- {} ({status})\n", summary.tool)),
        }
    }
    reply.push_str("Ask for the task list to check anything still running.");
    reply
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::anthropic::{AnthropicError, MessagesResponse, Usage};
    use crate::engine::{EngineApi, EngineError, JobKind, RemoteState, TaskStatus};
    use crate::tracker::{JobTracker, PollConfig, TrackerConfig};

    /// Model double answering from a script.
    struct ScriptedModel {
        responses: StdMutex<Vec<Result<MessagesResponse, ()>>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<MessagesResponse, ()>>) -> Self {
            Self {
                responses: StdMutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl MessageSender for ScriptedModel {
        async fn send_message(
            &self,
            _req: &MessagesRequest,
        ) -> Result<MessagesResponse, AnthropicError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(AnthropicError::ApiError {
                    status: 500,
                    message: "script exhausted".into(),
                });
            }
            responses.remove(0).map_err(|_| AnthropicError::ApiError {
                status: 503,
                message: "model unavailable".into(),
            })
        }
    }

    fn text_response(text: &str) -> MessagesResponse {
        MessagesResponse {
            id: "msg".into(),
            content: vec![ContentBlock::Text { text: text.into() }],
            model: "test".into(),
            stop_reason: Some("end_turn".into()),
            usage: Usage {
                input_tokens: 0,
                output_tokens: 0,
            },
        }
    }

    fn tool_response(calls: &[(&str, &str, Value)]) -> MessagesResponse {
        MessagesResponse {
            id: "msg".into(),
            content: calls
                .iter()
                .map(|(id, name, input)| ContentBlock::ToolUse {
                    id: (*id).into(),
                    name: (*name).into(),
                    input: input.clone(),
                })
                .collect(),
            model: "test".into(),
            stop_reason: Some("tool_use".into()),
            usage: Usage {
                input_tokens: 0,
                output_tokens: 0,
            },
        }
    }

    /// Engine double: ids derived from the kind, per-job scripted poll
    /// counts so completion order can differ from submission order.
    struct KindedEngine {
        /// Polls a job needs before it reports Done, keyed by job id.
        polls_until_done: HashMap<&'static str, usize>,
        polls_seen: StdMutex<HashMap<String, usize>>,
    }

    impl KindedEngine {
        fn new(polls_until_done: HashMap<&'static str, usize>) -> Arc<Self> {
            Arc::new(Self {
                polls_until_done,
                polls_seen: StdMutex::new(HashMap::new()),
            })
        }
    }

    #[async_trait]
    impl EngineApi for KindedEngine {
        async fn submit(
            &self,
            kind: JobKind,
            _fields: &[(String, String)],
        ) -> Result<String, EngineError> {
            Ok(format!("{kind}-1"))
        }

        async fn poll(&self, job_id: &str) -> Result<TaskStatus, EngineError> {
            let seen = {
                let mut polls = self.polls_seen.lock().unwrap();
                let seen = polls.entry(job_id.to_string()).or_insert(0);
                *seen += 1;
                *seen
            };
            let needed = self.polls_until_done.get(job_id).copied().unwrap_or(1);
            if seen >= needed {
                Ok(TaskStatus {
                    state: RemoteState::Done,
                    payload: json!({"status": "done", "rows": 5}),
                    error: None,
                })
            } else {
                Ok(TaskStatus {
                    state: RemoteState::Running,
                    payload: json!({"status": "work"}),
                    error: None,
                })
            }
        }

        async fn quote(
            &self,
            _kind: JobKind,
            _fields: &[(String, String)],
        ) -> Result<Value, EngineError> {
            unimplemented!("not used by turn tests")
        }

        async fn account_info(&self) -> Result<Value, EngineError> {
            Ok(json!({"err": 0, "balance": 10.0}))
        }

        async fn list_tasks(&self, _limit: u32, _offset: u32) -> Result<Value, EngineError> {
            unimplemented!("not used by turn tests")
        }

        async fn download_result(
            &self,
            _job_id: &str,
            _max_rows: usize,
        ) -> Result<Value, EngineError> {
            unimplemented!("not used by turn tests")
        }
    }

    fn fixture(engine: Arc<KindedEngine>, budget_secs: u64) -> (Dispatcher, SessionStore) {
        let config = TrackerConfig {
            poll: PollConfig {
                initial_ms: 1000,
                max_ms: 30_000,
                jitter: 0.0,
                max_consecutive_failures: 3,
            },
            ..Default::default()
        };
        let tracker = JobTracker::new(engine.clone(), config);
        let dispatcher = Dispatcher::new(tracker, engine, Duration::from_secs(budget_secs));
        (dispatcher, SessionStore::new(40))
    }

    fn turn_config() -> TurnConfig {
        TurnConfig {
            model: "test-model".into(),
            max_tokens: 4096,
            max_tool_rounds: 8,
        }
    }

    #[tokio::test]
    async fn plain_reply_without_tools() {
        let model = ScriptedModel::new(vec![Ok(text_response("Hello! Send me your queries."))]);
        let (dispatcher, sessions) = fixture(KindedEngine::new(HashMap::new()), 5);
        let id = sessions.ensure(None).await;

        let outcome = run_turn(&model, &dispatcher, &sessions, &id, "hi", &turn_config())
            .await
            .unwrap();

        assert_eq!(outcome.reply, "Hello! Send me your queries.");
        assert!(outcome.tool_calls.is_empty());
        let history = sessions.history(&id).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].role, "assistant");
    }

    #[tokio::test(start_paused = true)]
    async fn tool_round_then_final_reply() {
        let model = ScriptedModel::new(vec![
            Ok(tool_response(&[(
                "toolu_a",
                "justmagic_cluster",
                json!({"queries": ["buy shoes"]}),
            )])),
            Ok(text_response("Clustering finished: 5 rows.")),
        ]);
        let (dispatcher, sessions) = fixture(KindedEngine::new(HashMap::new()), 10);
        let id = sessions.ensure(None).await;

        let outcome = run_turn(
            &model,
            &dispatcher,
            &sessions,
            &id,
            "cluster these",
            &turn_config(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.reply, "Clustering finished: 5 rows.");
        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(outcome.tool_calls[0].ok);
        assert_eq!(outcome.tool_calls[0].job_id.as_deref(), Some("cluster-1"));

        // The session now owns the job the turn created.
        assert_eq!(sessions.job_ids(&id).await, vec!["cluster-1"]);

        // user, assistant(tool_use), user(tool_result), assistant(text).
        let history = sessions.history(&id).await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[2].role, "user");
        assert!(matches!(
            &history[2].content[0],
            ContentBlock::ToolResult { is_error: false, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn results_follow_request_order_not_completion_order() {
        // Cluster needs 2 polls (done at ~3s), frequency 1 poll (~1s):
        // frequency finishes first, but cluster was requested first.
        let engine = KindedEngine::new(HashMap::from([("cluster-1", 2), ("frequency-1", 1)]));
        let model = ScriptedModel::new(vec![
            Ok(tool_response(&[
                ("toolu_a", "justmagic_cluster", json!({"queries": ["q"]})),
                (
                    "toolu_b",
                    "justmagic_wordstat_frequency",
                    json!({"queries": ["q"]}),
                ),
            ])),
            Ok(text_response("Both done.")),
        ]);
        let (dispatcher, sessions) = fixture(engine, 10);
        let id = sessions.ensure(None).await;

        let outcome = run_turn(
            &model,
            &dispatcher,
            &sessions,
            &id,
            "cluster and frequency",
            &turn_config(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.tool_calls.len(), 2);
        assert_eq!(outcome.tool_calls[0].tool, "justmagic_cluster");
        assert_eq!(outcome.tool_calls[1].tool, "justmagic_wordstat_frequency");

        let history = sessions.history(&id).await;
        let results = &history[2].content;
        assert_eq!(results.len(), 2);
        assert!(matches!(
            &results[0],
            ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "toolu_a"
        ));
        assert!(matches!(
            &results[1],
            ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "toolu_b"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn round_limit_synthesizes_partial_reply() {
        let always_tools = || {
            Ok(tool_response(&[(
                "toolu_x",
                "justmagic_info",
                json!({}),
            )]))
        };
        let model = ScriptedModel::new(vec![always_tools(), always_tools(), always_tools()]);
        let (dispatcher, sessions) = fixture(KindedEngine::new(HashMap::new()), 5);
        let id = sessions.ensure(None).await;

        let mut config = turn_config();
        config.max_tool_rounds = 2;

        let outcome = run_turn(&model, &dispatcher, &sessions, &id, "loop", &config)
            .await
            .unwrap();

        assert!(outcome.reply.contains("tool-call limit"));
        assert_eq!(outcome.tool_calls.len(), 2);
        // The model was consulted exactly max_tool_rounds times.
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn model_failure_is_request_level_and_preserves_history() {
        let model = ScriptedModel::new(vec![Err(())]);
        let (dispatcher, sessions) = fixture(KindedEngine::new(HashMap::new()), 5);
        let id = sessions.ensure(None).await;

        let result = run_turn(&model, &dispatcher, &sessions, &id, "hello", &turn_config()).await;
        assert!(matches!(result, Err(TurnError::Model(_))));

        // The user's message survives for the retry.
        let history = sessions.history(&id).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, "user");
    }
}
