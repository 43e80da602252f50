//! In-memory conversation state: history plus the jobs a session owns.

use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::anthropic::{ContentBlock, Message};

#[derive(Default)]
struct Session {
    history: Vec<Message>,
    job_ids: Vec<String>,
}

/// Holds every active conversation. History is capped to a window; the cap
/// never splits a tool_use/tool_result pair in a way the model API would
/// reject.
pub struct SessionStore {
    history_cap: usize,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(history_cap: usize) -> Self {
        Self {
            history_cap: history_cap.max(2),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a session id, creating the session on first contact.
    pub async fn ensure(&self, id: Option<String>) -> String {
        let id = id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("sess-{}", Uuid::new_v4()));
        self.sessions
            .lock()
            .await
            .entry(id.clone())
            .or_default();
        id
    }

    pub async fn history(&self, id: &str) -> Vec<Message> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(id)
            .map(|session| session.history.clone())
            .unwrap_or_default()
    }

    /// Append messages and re-apply the history cap.
    pub async fn append(&self, id: &str, messages: Vec<Message>) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(id.to_string()).or_default();
        session.history.extend(messages);
        trim_history(&mut session.history, self.history_cap);
    }

    /// Associate a tracked job with this session.
    pub async fn add_job(&self, id: &str, job_id: String) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(id.to_string()).or_default();
        if !session.job_ids.contains(&job_id) {
            session.job_ids.push(job_id);
        }
    }

    /// The job ids owned by this session, in submission order.
    pub async fn job_ids(&self, id: &str) -> Vec<String> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(id)
            .map(|session| session.job_ids.clone())
            .unwrap_or_default()
    }

    /// Drop a session entirely, returning the job ids it owned so the
    /// tracker can release them.
    pub async fn clear(&self, id: &str) -> Vec<String> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .remove(id)
            .map(|session| session.job_ids)
            .unwrap_or_default()
    }
}

/// Keep the most recent `cap` messages, then drop any leading messages the
/// model API would reject: history must open with a plain user message, not
/// an orphaned tool_result or an assistant turn.
fn trim_history(history: &mut Vec<Message>, cap: usize) {
    if history.len() > cap {
        history.drain(..history.len() - cap);
    }
    while let Some(first) = history.first() {
        let orphaned = first.role != "user"
            || first
                .content
                .iter()
                .any(|block| matches!(block, ContentBlock::ToolResult { .. }));
        if orphaned {
            history.remove(0);
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_result_message() -> Message {
        Message::tool_results(vec![ContentBlock::ToolResult {
            tool_use_id: "toolu_1".into(),
            content: "{}".into(),
            is_error: false,
        }])
    }

    #[tokio::test]
    async fn ensure_generates_and_reuses_ids() {
        let store = SessionStore::new(40);
        let id = store.ensure(None).await;
        assert!(id.starts_with("sess-"));

        let same = store.ensure(Some(id.clone())).await;
        assert_eq!(same, id);
    }

    #[tokio::test]
    async fn append_and_history_roundtrip() {
        let store = SessionStore::new(40);
        let id = store.ensure(None).await;
        store.append(&id, vec![Message::user_text("hello")]).await;

        let history = store.history(&id).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, "user");
    }

    #[tokio::test]
    async fn history_cap_drops_oldest() {
        let store = SessionStore::new(4);
        let id = store.ensure(None).await;
        for i in 0..6 {
            store
                .append(&id, vec![Message::user_text(format!("m{i}"))])
                .await;
        }

        let history = store.history(&id).await;
        assert_eq!(history.len(), 4);
        assert!(matches!(
            &history[0].content[0],
            ContentBlock::Text { text } if text == "m2"
        ));
    }

    #[tokio::test]
    async fn trim_never_leads_with_orphaned_tool_results() {
        let store = SessionStore::new(3);
        let id = store.ensure(None).await;
        store
            .append(
                &id,
                vec![
                    Message::user_text("analyze this"),
                    Message::assistant(vec![ContentBlock::ToolUse {
                        id: "toolu_1".into(),
                        name: "justmagic_cluster".into(),
                        input: serde_json::json!({}),
                    }]),
                    tool_result_message(),
                    Message::assistant(vec![ContentBlock::Text {
                        text: "done".into(),
                    }]),
                    Message::user_text("thanks"),
                ],
            )
            .await;

        let history = store.history(&id).await;
        // Cap of 3 would start at the tool_result message; trimming walks
        // forward to the next plain user message instead.
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, "user");
        assert!(matches!(
            &history[0].content[0],
            ContentBlock::Text { text } if text == "thanks"
        ));
    }

    #[tokio::test]
    async fn jobs_are_tracked_per_session_in_order() {
        let store = SessionStore::new(40);
        let id = store.ensure(None).await;
        store.add_job(&id, "101".into()).await;
        store.add_job(&id, "102".into()).await;
        store.add_job(&id, "101".into()).await;

        assert_eq!(store.job_ids(&id).await, vec!["101", "102"]);
    }

    #[tokio::test]
    async fn clear_returns_owned_jobs() {
        let store = SessionStore::new(40);
        let id = store.ensure(None).await;
        store.add_job(&id, "101".into()).await;

        let released = store.clear(&id).await;
        assert_eq!(released, vec!["101"]);
        assert!(store.history(&id).await.is_empty());
        assert!(store.job_ids(&id).await.is_empty());
    }
}
