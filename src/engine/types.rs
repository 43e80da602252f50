use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The analysis operations the Just-Magic engine runs as asynchronous jobs.
///
/// Each kind maps to one of the engine's `task` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Semantic clustering of queries by SERP overlap (`grp_onl`).
    Cluster,
    /// Wordstat frequency collection (`wsfreq`).
    Frequency,
    /// Search-suggestion parsing (`sug_par`).
    Suggestions,
    /// On-page text optimization analysis (`txt_anlz`).
    TextAnalysis,
    /// Word-by-word LSI relevance analysis of a text (`aqua`).
    Lsi,
    /// LSI vocabulary generation for writing new copy (`aqua_gen`).
    LsiGenerate,
    /// Thematic classification of queries (`temakl`).
    TopicClassify,
    /// Query-to-page distribution based on SERPs (`mark_onl`).
    Markers,
    /// Semantic expansion against the keyword base (`grp_deep`).
    Expand,
    /// Regex search over the keyword base (`rexp`).
    RegexSearch,
}

impl JobKind {
    /// The engine's `task` field value for this kind.
    pub fn task_code(&self) -> &'static str {
        match self {
            JobKind::Cluster => "grp_onl",
            JobKind::Frequency => "wsfreq",
            JobKind::Suggestions => "sug_par",
            JobKind::TextAnalysis => "txt_anlz",
            JobKind::Lsi => "aqua",
            JobKind::LsiGenerate => "aqua_gen",
            JobKind::TopicClassify => "temakl",
            JobKind::Markers => "mark_onl",
            JobKind::Expand => "grp_deep",
            JobKind::RegexSearch => "rexp",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Cluster => "cluster",
            JobKind::Frequency => "frequency",
            JobKind::Suggestions => "suggestions",
            JobKind::TextAnalysis => "text-analysis",
            JobKind::Lsi => "lsi",
            JobKind::LsiGenerate => "lsi-generate",
            JobKind::TopicClassify => "topic-classify",
            JobKind::Markers => "markers",
            JobKind::Expand => "expand",
            JobKind::RegexSearch => "regex-search",
        };
        write!(f, "{name}")
    }
}

/// The engine's view of a task, as reported by `get_task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteState {
    /// Accepted, waiting for a worker.
    Queued,
    /// A worker is processing the task.
    Running,
    /// Finished successfully; results are downloadable.
    Done,
    /// The engine gave up on the task.
    Error,
}

impl RemoteState {
    /// Map the engine's `status` string onto a state.
    ///
    /// Unknown statuses are treated as still running so a new engine-side
    /// status never strands a job as falsely terminal.
    pub fn parse(status: &str) -> Self {
        match status {
            "new" | "queue" => RemoteState::Queued,
            "work" | "run" => RemoteState::Running,
            "done" | "ok" => RemoteState::Done,
            "err" | "error" => RemoteState::Error,
            _ => RemoteState::Running,
        }
    }
}

/// One poll observation: the remote state plus the raw info payload.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub state: RemoteState,
    /// Full `get_task` info body (row counts, label, price, ...).
    pub payload: Value,
    /// Engine-reported failure text when `state` is [`RemoteState::Error`].
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_codes_match_engine_contract() {
        assert_eq!(JobKind::Cluster.task_code(), "grp_onl");
        assert_eq!(JobKind::Frequency.task_code(), "wsfreq");
        assert_eq!(JobKind::Suggestions.task_code(), "sug_par");
        assert_eq!(JobKind::TextAnalysis.task_code(), "txt_anlz");
        assert_eq!(JobKind::Lsi.task_code(), "aqua");
        assert_eq!(JobKind::LsiGenerate.task_code(), "aqua_gen");
        assert_eq!(JobKind::TopicClassify.task_code(), "temakl");
        assert_eq!(JobKind::Markers.task_code(), "mark_onl");
        assert_eq!(JobKind::Expand.task_code(), "grp_deep");
        assert_eq!(JobKind::RegexSearch.task_code(), "rexp");
    }

    #[test]
    fn kind_serializes_kebab_case() {
        let json = serde_json::to_string(&JobKind::TextAnalysis).unwrap();
        assert_eq!(json, r#""text-analysis""#);
        let parsed: JobKind = serde_json::from_str(r#""topic-classify""#).unwrap();
        assert_eq!(parsed, JobKind::TopicClassify);
    }

    #[test]
    fn remote_state_parsing() {
        assert_eq!(RemoteState::parse("new"), RemoteState::Queued);
        assert_eq!(RemoteState::parse("queue"), RemoteState::Queued);
        assert_eq!(RemoteState::parse("work"), RemoteState::Running);
        assert_eq!(RemoteState::parse("done"), RemoteState::Done);
        assert_eq!(RemoteState::parse("err"), RemoteState::Error);
        // Forward compatibility: unknown statuses keep the job alive.
        assert_eq!(RemoteState::parse("something_new"), RemoteState::Running);
    }
}
