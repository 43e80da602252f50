//! The closed table of tools the model may invoke.
//!
//! Each tool maps a name to an argument schema (announced to the model), an
//! execution plan (a job submission or a synchronous engine call) and a
//! result normalizer. Unknown names and schema violations are rejected here,
//! before anything touches the network.

use serde_json::{Value, json};

use crate::anthropic::ToolDefinition;
use crate::engine::JobKind;
use crate::error::ToolError;

/// Every tool the assistant can call, as a closed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    // Job-backed analysis operations.
    Cluster,
    Frequency,
    Suggestions,
    TextAnalyzer,
    Lsi,
    LsiGenerator,
    TopicClassifier,
    Markers,
    ExpandSemantics,
    RegexSearch,
    // Synchronous engine passthroughs.
    AccountInfo,
    ListTasks,
    TaskStatus,
    DownloadResult,
}

impl ToolKind {
    pub const ALL: [ToolKind; 14] = [
        ToolKind::Cluster,
        ToolKind::Frequency,
        ToolKind::Suggestions,
        ToolKind::TextAnalyzer,
        ToolKind::Lsi,
        ToolKind::LsiGenerator,
        ToolKind::TopicClassifier,
        ToolKind::Markers,
        ToolKind::ExpandSemantics,
        ToolKind::RegexSearch,
        ToolKind::AccountInfo,
        ToolKind::ListTasks,
        ToolKind::TaskStatus,
        ToolKind::DownloadResult,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Cluster => "justmagic_cluster",
            ToolKind::Frequency => "justmagic_wordstat_frequency",
            ToolKind::Suggestions => "justmagic_suggestions_parser",
            ToolKind::TextAnalyzer => "justmagic_text_analyzer",
            ToolKind::Lsi => "justmagic_aquarelle",
            ToolKind::LsiGenerator => "justmagic_aquarelle_generator",
            ToolKind::TopicClassifier => "justmagic_thematic_classifier",
            ToolKind::Markers => "justmagic_markers_online",
            ToolKind::ExpandSemantics => "justmagic_expand_semantics",
            ToolKind::RegexSearch => "justmagic_regex_search",
            ToolKind::AccountInfo => "justmagic_info",
            ToolKind::ListTasks => "justmagic_list_tasks",
            ToolKind::TaskStatus => "justmagic_get_task",
            ToolKind::DownloadResult => "justmagic_download_result",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// The job kind this tool submits, or `None` for synchronous tools.
    pub fn job_kind(&self) -> Option<JobKind> {
        match self {
            ToolKind::Cluster => Some(JobKind::Cluster),
            ToolKind::Frequency => Some(JobKind::Frequency),
            ToolKind::Suggestions => Some(JobKind::Suggestions),
            ToolKind::TextAnalyzer => Some(JobKind::TextAnalysis),
            ToolKind::Lsi => Some(JobKind::Lsi),
            ToolKind::LsiGenerator => Some(JobKind::LsiGenerate),
            ToolKind::TopicClassifier => Some(JobKind::TopicClassify),
            ToolKind::Markers => Some(JobKind::Markers),
            ToolKind::ExpandSemantics => Some(JobKind::Expand),
            ToolKind::RegexSearch => Some(JobKind::RegexSearch),
            ToolKind::AccountInfo
            | ToolKind::ListTasks
            | ToolKind::TaskStatus
            | ToolKind::DownloadResult => None,
        }
    }
}

/// How to execute one validated tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPlan {
    /// Submit (or price-quote) an asynchronous engine task.
    Job {
        kind: JobKind,
        fields: Vec<(String, String)>,
        just_ask: bool,
    },
    AccountInfo,
    ListTasks {
        limit: u32,
        offset: u32,
    },
    TaskStatus {
        job_id: String,
    },
    DownloadResult {
        job_id: String,
        max_rows: usize,
    },
}

/// Tool definitions announced to the model.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ToolKind::ALL.iter().map(definition).collect()
}

fn definition(kind: &ToolKind) -> ToolDefinition {
    let (description, input_schema) = match kind {
        ToolKind::Cluster => (
            "Cluster queries semantically by SERP overlap. Asynchronous; returns a task id.",
            json!({
                "type": "object",
                "properties": {
                    "queries": {"type": "array", "items": {"type": "string"},
                                "description": "Queries to cluster, one phrase each"},
                    "search_engine": {"type": "string", "enum": ["yandex", "google"], "default": "yandex"},
                    "region": {"type": "integer", "description": "Yandex region code (213 = Moscow)", "default": 213},
                    "google_lr": {"type": "string", "description": "Google region"},
                    "lang": {"type": "string", "enum": ["ru", "en"], "default": "ru"},
                    "label": {"type": "string", "description": "Task label"},
                    "collect_frequency": {"type": "boolean", "default": false},
                    "domain": {"type": "string", "description": "Domain to find relevant pages for"},
                    "just_ask": {"type": "boolean", "description": "Only estimate the price", "default": false}
                },
                "required": ["queries"]
            }),
        ),
        ToolKind::Frequency => (
            "Collect query frequencies from Yandex Wordstat. Asynchronous; returns a task id.",
            json!({
                "type": "object",
                "properties": {
                    "queries": {"type": "array", "items": {"type": "string"}},
                    "region": {"type": "integer", "description": "Region code"},
                    "device": {"type": "string", "enum": ["all", "desktop", "tablet_phone"], "default": "all"},
                    "label": {"type": "string"},
                    "s_std": {"type": "boolean", "description": "Collect base frequency", "default": true},
                    "s_q": {"type": "boolean", "description": "Collect exact-form frequency", "default": false},
                    "just_ask": {"type": "boolean", "default": false}
                },
                "required": ["queries"]
            }),
        ),
        ToolKind::Suggestions => (
            "Parse Yandex search suggestions for seed queries. Asynchronous; returns a task id.",
            json!({
                "type": "object",
                "properties": {
                    "queries": {"type": "array", "items": {"type": "string"}},
                    "region": {"type": "integer", "default": 213},
                    "lang": {"type": "string", "enum": ["ru", "en"], "default": "ru"},
                    "iterations": {"type": "integer", "description": "Depth, 1-3", "default": 1},
                    "add_russian_letters": {"type": "boolean", "default": false},
                    "just_ask": {"type": "boolean", "default": false}
                },
                "required": ["queries"]
            }),
        ),
        ToolKind::TextAnalyzer => (
            "Analyze on-page text optimization of URLs against their queries. Asynchronous.",
            json!({
                "type": "object",
                "properties": {
                    "pages": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "url": {"type": "string"},
                                "queries": {"type": "array", "items": {"type": "string"}}
                            },
                            "required": ["url", "queries"]
                        }
                    },
                    "search_engine": {"type": "string", "enum": ["yandex", "google"], "default": "yandex"},
                    "region": {"type": "integer", "default": 213},
                    "just_ask": {"type": "boolean", "default": false}
                },
                "required": ["pages"]
            }),
        ),
        ToolKind::Lsi => (
            "Word-by-word LSI relevance analysis of a text against a keyword. Asynchronous.",
            json!({
                "type": "object",
                "properties": {
                    "keyword": {"type": "string", "description": "Key phrase"},
                    "text": {"type": "string", "description": "Text to analyze"},
                    "search_engine": {"type": "string", "enum": ["yandex", "google"], "default": "yandex"},
                    "lang": {"type": "string", "enum": ["ru", "en"], "default": "ru"}
                },
                "required": ["keyword", "text"]
            }),
        ),
        ToolKind::LsiGenerator => (
            "Generate LSI vocabulary for writing on-topic copy. Asynchronous; returns a task id.",
            json!({
                "type": "object",
                "properties": {
                    "queries": {"type": "array", "items": {"type": "string"}},
                    "search_engine": {"type": "string", "enum": ["yandex", "google"], "default": "yandex"},
                    "lang": {"type": "string", "enum": ["ru", "en"], "default": "ru"},
                    "just_ask": {"type": "boolean", "default": false}
                },
                "required": ["queries"]
            }),
        ),
        ToolKind::TopicClassifier => (
            "Classify queries into thematic categories. Asynchronous; returns a task id.",
            json!({
                "type": "object",
                "properties": {
                    "queries": {"type": "array", "items": {"type": "string"}},
                    "show_all_categories": {"type": "boolean", "default": false},
                    "just_ask": {"type": "boolean", "default": false}
                },
                "required": ["queries"]
            }),
        ),
        ToolKind::Markers => (
            "Distribute queries across pages based on live SERPs. Asynchronous.",
            json!({
                "type": "object",
                "properties": {
                    "pages": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "url": {"type": "string"},
                                "queries": {"type": "array", "items": {"type": "string"}}
                            },
                            "required": ["url"]
                        }
                    },
                    "base_queries": {"type": "array", "items": {"type": "string"}},
                    "region": {"type": "integer", "default": 213},
                    "mode": {"type": "string", "enum": ["hard", "soft"], "default": "hard"},
                    "min_power": {"type": "integer", "default": 3},
                    "just_ask": {"type": "boolean", "default": false}
                },
                "required": ["pages", "base_queries"]
            }),
        ),
        ToolKind::ExpandSemantics => (
            "Expand a seed semantic core from the keyword base. Asynchronous.",
            json!({
                "type": "object",
                "properties": {
                    "queries": {"type": "array", "items": {"type": "string"}},
                    "base": {"type": "integer", "default": 3},
                    "depth": {"type": "integer", "description": "Expansion depth, 0-9", "default": 1},
                    "min_power": {"type": "integer", "default": 3},
                    "just_ask": {"type": "boolean", "default": false}
                },
                "required": ["queries"]
            }),
        ),
        ToolKind::RegexSearch => (
            "Search the keyword base with a POSIX regular expression. Asynchronous.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "POSIX regex"},
                    "exclude_pattern": {"type": "string"},
                    "base": {"type": "integer", "default": 3},
                    "just_ask": {"type": "boolean", "default": false}
                },
                "required": ["pattern"]
            }),
        ),
        ToolKind::AccountInfo => (
            "Account tariff, balance and validity of the analysis engine.",
            json!({"type": "object", "properties": {}, "required": []}),
        ),
        ToolKind::ListTasks => (
            "List the user's analysis tasks with their statuses.",
            json!({
                "type": "object",
                "properties": {
                    "limit": {"type": "integer", "description": "Tasks to return (max 100)", "default": 10},
                    "offset": {"type": "integer", "default": 0}
                },
                "required": []
            }),
        ),
        ToolKind::TaskStatus => (
            "Current status of one analysis task.",
            json!({
                "type": "object",
                "properties": {
                    "tid": {"type": "string", "description": "Task id"}
                },
                "required": ["tid"]
            }),
        ),
        ToolKind::DownloadResult => (
            "Download a finished task's result as a table.",
            json!({
                "type": "object",
                "properties": {
                    "tid": {"type": "string", "description": "Task id"},
                    "max_rows": {"type": "integer", "default": 100}
                },
                "required": ["tid"]
            }),
        ),
    };

    ToolDefinition {
        name: kind.name().to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Validate `args` against the tool's schema and produce its execution plan.
///
/// Fails fast with [`ToolError::Validation`]; no plan, no network call.
pub fn plan(kind: ToolKind, args: &Value) -> Result<ToolPlan, ToolError> {
    plan_inner(kind, args).map_err(|message| ToolError::Validation {
        tool: kind.name().to_string(),
        message,
    })
}

fn plan_inner(kind: ToolKind, args: &Value) -> Result<ToolPlan, String> {
    if !args.is_object() && !args.is_null() {
        return Err("arguments must be a JSON object".into());
    }

    match kind {
        ToolKind::Cluster => {
            let queries = str_array(args, "queries")?;
            let engine = str_enum(args, "search_engine", &["yandex", "google"], "yandex")?;
            let lang = str_enum(args, "lang", &["ru", "en"], "ru")?;

            let mut fields = vec![
                field("data", queries.join("\n")),
                field("search_engine", &engine),
                field("lang", lang),
            ];
            match (engine.as_str(), opt_str(args, "google_lr")?) {
                ("google", Some(google_lr)) => fields.push(field("google_lr", google_lr)),
                _ => fields.push(field("ya_lr", opt_u64(args, "region")?.unwrap_or(213))),
            }
            if opt_bool(args, "collect_frequency")?.unwrap_or(false) {
                fields.push(field("s_std", 1));
            }
            if let Some(label) = opt_str(args, "label")? {
                fields.push(field("label", label));
            }
            if let Some(domain) = opt_str(args, "domain")? {
                fields.push(field("domain", domain));
            }
            job_plan(JobKind::Cluster, fields, args)
        }

        ToolKind::Frequency => {
            let queries = str_array(args, "queries")?;
            let device = str_enum(args, "device", &["all", "desktop", "tablet_phone"], "all")?;

            let mut fields = vec![field("data", queries.join("\n")), field("device", device)];
            if let Some(region) = opt_u64(args, "region")? {
                fields.push(field("ya_lrws", region));
            }
            if let Some(label) = opt_str(args, "label")? {
                fields.push(field("label", label));
            }
            if opt_bool(args, "s_std")?.unwrap_or(true) {
                fields.push(field("s_std", 1));
            }
            if opt_bool(args, "s_q")?.unwrap_or(false) {
                fields.push(field("s_q", 1));
            }
            job_plan(JobKind::Frequency, fields, args)
        }

        ToolKind::Suggestions => {
            let queries = str_array(args, "queries")?;
            let lang = str_enum(args, "lang", &["ru", "en"], "ru")?;
            let iterations = opt_u64(args, "iterations")?.unwrap_or(1).clamp(1, 3);

            let mut fields = vec![
                field("data", queries.join("\n")),
                field("ya_lr", opt_u64(args, "region")?.unwrap_or(213)),
                field("lang", lang),
                field("iter", iterations),
            ];
            if opt_bool(args, "add_russian_letters")?.unwrap_or(false) {
                fields.push(field("f_rus", 1));
            }
            job_plan(JobKind::Suggestions, fields, args)
        }

        ToolKind::TextAnalyzer => {
            let pages = pages(args, true)?;
            let engine = str_enum(args, "search_engine", &["yandex", "google"], "yandex")?;

            let mut lines = Vec::new();
            for page in &pages {
                for query in &page.queries {
                    lines.push(format!("{}\t{}", page.url, query));
                }
            }
            let fields = vec![
                field("data", lines.join("\n")),
                field("search_engine", engine),
                field("ya_lr", opt_u64(args, "region")?.unwrap_or(213)),
            ];
            job_plan(JobKind::TextAnalysis, fields, args)
        }

        ToolKind::Lsi => {
            let keyword = required_str(args, "keyword")?;
            let text = required_str(args, "text")?;
            let engine = str_enum(args, "search_engine", &["yandex", "google"], "yandex")?;
            let lang = str_enum(args, "lang", &["ru", "en"], "ru")?;

            let fields = vec![
                field("key", keyword),
                field("data", text),
                field("search_engine", engine),
                field("lang", lang),
            ];
            // The LSI analyzer has no price-quote mode.
            Ok(ToolPlan::Job {
                kind: JobKind::Lsi,
                fields,
                just_ask: false,
            })
        }

        ToolKind::LsiGenerator => {
            let queries = str_array(args, "queries")?;
            let engine = str_enum(args, "search_engine", &["yandex", "google"], "yandex")?;
            let lang = str_enum(args, "lang", &["ru", "en"], "ru")?;

            let fields = vec![
                field("data", queries.join("\n")),
                field("search_engine", engine),
                field("lang", lang),
            ];
            job_plan(JobKind::LsiGenerate, fields, args)
        }

        ToolKind::TopicClassifier => {
            let queries = str_array(args, "queries")?;
            let mut fields = vec![field("data", queries.join("\n"))];
            if opt_bool(args, "show_all_categories")?.unwrap_or(false) {
                fields.push(field("f_gall", 1));
            }
            job_plan(JobKind::TopicClassify, fields, args)
        }

        ToolKind::Markers => {
            let pages = pages(args, false)?;
            let base_queries = str_array(args, "base_queries")?;
            let mode = str_enum(args, "mode", &["hard", "soft"], "hard")?;
            let min_power = opt_u64(args, "min_power")?.unwrap_or(3).clamp(3, 9);

            let lines: Vec<String> = pages
                .iter()
                .map(|page| {
                    if page.queries.is_empty() {
                        page.url.clone()
                    } else {
                        format!("{}\t{}", page.url, page.queries.join("\t"))
                    }
                })
                .collect();
            let fields = vec![
                field("data", lines.join("\n")),
                field("data_base", base_queries.join("\n")),
                field("ya_lr", opt_u64(args, "region")?.unwrap_or(213)),
                field("mode", mode),
                field("min_pwr", min_power),
            ];
            job_plan(JobKind::Markers, fields, args)
        }

        ToolKind::ExpandSemantics => {
            let queries = str_array(args, "queries")?;
            let depth = opt_u64(args, "depth")?.unwrap_or(1).min(9);
            let min_power = opt_u64(args, "min_power")?.unwrap_or(3).clamp(3, 9);

            let fields = vec![
                field("data", queries.join("\n")),
                field("base", opt_u64(args, "base")?.unwrap_or(3)),
                field("deep", depth),
                field("min_pwr", min_power),
            ];
            job_plan(JobKind::Expand, fields, args)
        }

        ToolKind::RegexSearch => {
            let pattern = required_str(args, "pattern")?;
            let mut fields = vec![
                field("base", opt_u64(args, "base")?.unwrap_or(3)),
                field("rexpa", pattern),
            ];
            if let Some(exclude) = opt_str(args, "exclude_pattern")? {
                fields.push(field("rexpd", exclude));
            }
            job_plan(JobKind::RegexSearch, fields, args)
        }

        ToolKind::AccountInfo => Ok(ToolPlan::AccountInfo),

        ToolKind::ListTasks => Ok(ToolPlan::ListTasks {
            limit: opt_u64(args, "limit")?.unwrap_or(10).min(100) as u32,
            offset: opt_u64(args, "offset")?.unwrap_or(0) as u32,
        }),

        ToolKind::TaskStatus => Ok(ToolPlan::TaskStatus {
            job_id: required_tid(args)?,
        }),

        ToolKind::DownloadResult => Ok(ToolPlan::DownloadResult {
            job_id: required_tid(args)?,
            max_rows: opt_u64(args, "max_rows")?.unwrap_or(100) as usize,
        }),
    }
}

/// Shape a succeeded job's raw info payload for the model.
pub fn normalize_result(kind: JobKind, job_id: &str, payload: &Value) -> Value {
    let summary = match kind {
        JobKind::Cluster => "queries grouped by SERP overlap",
        JobKind::Frequency => "Wordstat frequencies collected",
        JobKind::Suggestions => "search suggestions parsed",
        JobKind::TextAnalysis => "on-page text analysis finished",
        JobKind::Lsi => "LSI relevance analysis finished",
        JobKind::LsiGenerate => "LSI vocabulary generated",
        JobKind::TopicClassify => "queries classified by topic",
        JobKind::Markers => "queries distributed across pages",
        JobKind::Expand => "semantic core expanded",
        JobKind::RegexSearch => "keyword base searched",
    };

    json!({
        "job_id": job_id,
        "kind": kind.to_string(),
        "summary": summary,
        "rows": payload.get("rows").cloned().unwrap_or(Value::Null),
        "info": payload,
        "next": "call justmagic_download_result with this task id for the full table",
    })
}

// -- validation helpers --

struct Page {
    url: String,
    queries: Vec<String>,
}

fn field(name: &str, value: impl ToString) -> (String, String) {
    (name.to_string(), value.to_string())
}

fn job_plan(kind: JobKind, fields: Vec<(String, String)>, args: &Value) -> Result<ToolPlan, String> {
    Ok(ToolPlan::Job {
        kind,
        fields,
        just_ask: opt_bool(args, "just_ask")?.unwrap_or(false),
    })
}

fn str_array(args: &Value, key: &str) -> Result<Vec<String>, String> {
    match args.get(key) {
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("`{key}` must contain only strings"))
            })
            .collect(),
        Some(Value::Array(_)) => Err(format!("`{key}` must not be empty")),
        Some(_) => Err(format!("`{key}` must be an array of strings")),
        None => Err(format!("`{key}` is required")),
    }
}

fn required_str(args: &Value, key: &str) -> Result<String, String> {
    match args.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(format!("`{key}` must not be empty")),
        Some(_) => Err(format!("`{key}` must be a string")),
        None => Err(format!("`{key}` is required")),
    }
}

fn required_tid(args: &Value) -> Result<String, String> {
    match args.get("tid") {
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err("`tid` is required".into()),
    }
}

fn opt_str(args: &Value, key: &str) -> Result<Option<String>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("`{key}` must be a string")),
    }
}

fn opt_u64(args: &Value, key: &str) -> Result<Option<u64>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| format!("`{key}` must be a non-negative integer")),
        Some(_) => Err(format!("`{key}` must be an integer")),
    }
}

fn opt_bool(args: &Value, key: &str) -> Result<Option<bool>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(format!("`{key}` must be a boolean")),
    }
}

fn str_enum(
    args: &Value,
    key: &str,
    allowed: &[&str],
    default: &str,
) -> Result<String, String> {
    match opt_str(args, key)? {
        None => Ok(default.to_string()),
        Some(value) if allowed.contains(&value.as_str()) => Ok(value),
        Some(value) => Err(format!(
            "`{key}` must be one of {allowed:?}, got \"{value}\""
        )),
    }
}

fn pages(args: &Value, require_queries: bool) -> Result<Vec<Page>, String> {
    let items = match args.get("pages") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        Some(Value::Array(_)) => return Err("`pages` must not be empty".into()),
        Some(_) => return Err("`pages` must be an array of objects".into()),
        None => return Err("`pages` is required".into()),
    };

    items
        .iter()
        .map(|item| {
            let url = required_str(item, "url").map_err(|e| format!("in `pages`: {e}"))?;
            let queries = match item.get("queries") {
                Some(_) => str_array(item, "queries").map_err(|e| format!("in `pages`: {e}"))?,
                None if require_queries => return Err("in `pages`: `queries` is required".into()),
                None => Vec::new(),
            };
            Ok(Page { url, queries })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields_of(plan: ToolPlan) -> Vec<(String, String)> {
        match plan {
            ToolPlan::Job { fields, .. } => fields,
            other => panic!("expected a job plan, got {other:?}"),
        }
    }

    fn get<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
        fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn every_tool_name_roundtrips() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("justmagic_nonsense"), None);
    }

    #[test]
    fn definitions_cover_all_tools() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), ToolKind::ALL.len());
        for def in &defs {
            assert!(def.input_schema["type"] == "object");
        }
    }

    #[test]
    fn cluster_plan_defaults_to_yandex_moscow() {
        let plan = plan(
            ToolKind::Cluster,
            &serde_json::json!({"queries": ["buy shoes", "shoes online"]}),
        )
        .unwrap();
        let fields = fields_of(plan);
        assert_eq!(get(&fields, "data"), Some("buy shoes\nshoes online"));
        assert_eq!(get(&fields, "search_engine"), Some("yandex"));
        assert_eq!(get(&fields, "ya_lr"), Some("213"));
        assert_eq!(get(&fields, "google_lr"), None);
    }

    #[test]
    fn cluster_plan_google_region() {
        let plan = plan(
            ToolKind::Cluster,
            &serde_json::json!({
                "queries": ["a"],
                "search_engine": "google",
                "google_lr": "us",
                "collect_frequency": true
            }),
        )
        .unwrap();
        let fields = fields_of(plan);
        assert_eq!(get(&fields, "google_lr"), Some("us"));
        assert_eq!(get(&fields, "ya_lr"), None);
        assert_eq!(get(&fields, "s_std"), Some("1"));
    }

    #[test]
    fn cluster_rejects_missing_queries() {
        let err = plan(ToolKind::Cluster, &serde_json::json!({})).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("`queries` is required"));
    }

    #[test]
    fn cluster_rejects_non_string_queries() {
        let err = plan(ToolKind::Cluster, &serde_json::json!({"queries": [1, 2]})).unwrap_err();
        assert!(err.to_string().contains("only strings"));
    }

    #[test]
    fn frequency_maps_wordstat_fields() {
        let plan = plan(
            ToolKind::Frequency,
            &serde_json::json!({"queries": ["q"], "region": 2, "s_q": true}),
        )
        .unwrap();
        let fields = fields_of(plan);
        assert_eq!(get(&fields, "ya_lrws"), Some("2"));
        assert_eq!(get(&fields, "s_std"), Some("1"));
        assert_eq!(get(&fields, "s_q"), Some("1"));
    }

    #[test]
    fn suggestions_clamps_iterations() {
        let plan = plan(
            ToolKind::Suggestions,
            &serde_json::json!({"queries": ["q"], "iterations": 9}),
        )
        .unwrap();
        assert_eq!(get(&fields_of(plan), "iter"), Some("3"));
    }

    #[test]
    fn text_analyzer_flattens_pages() {
        let plan = plan(
            ToolKind::TextAnalyzer,
            &serde_json::json!({
                "pages": [{"url": "https://a.example", "queries": ["x", "y"]}]
            }),
        )
        .unwrap();
        assert_eq!(
            get(&fields_of(plan), "data"),
            Some("https://a.example\tx\nhttps://a.example\ty")
        );
    }

    #[test]
    fn text_analyzer_requires_page_queries() {
        let err = plan(
            ToolKind::TextAnalyzer,
            &serde_json::json!({"pages": [{"url": "https://a.example"}]}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("`queries` is required"));
    }

    #[test]
    fn lsi_has_no_quote_mode() {
        let plan = plan(
            ToolKind::Lsi,
            &serde_json::json!({"keyword": "shoes", "text": "text", "just_ask": true}),
        )
        .unwrap();
        assert!(matches!(plan, ToolPlan::Job { just_ask: false, .. }));
    }

    #[test]
    fn markers_clamps_min_power_and_allows_bare_urls() {
        let plan = plan(
            ToolKind::Markers,
            &serde_json::json!({
                "pages": [{"url": "https://a.example"}],
                "base_queries": ["q"],
                "min_power": 20
            }),
        )
        .unwrap();
        let fields = fields_of(plan);
        assert_eq!(get(&fields, "min_pwr"), Some("9"));
        assert_eq!(get(&fields, "data"), Some("https://a.example"));
    }

    #[test]
    fn regex_search_optional_exclude() {
        let plan = plan(
            ToolKind::RegexSearch,
            &serde_json::json!({"pattern": "^buy .*", "exclude_pattern": "cheap"}),
        )
        .unwrap();
        let fields = fields_of(plan);
        assert_eq!(get(&fields, "rexpa"), Some("^buy .*"));
        assert_eq!(get(&fields, "rexpd"), Some("cheap"));
    }

    #[test]
    fn list_tasks_caps_limit() {
        let plan = plan(ToolKind::ListTasks, &serde_json::json!({"limit": 500})).unwrap();
        assert_eq!(
            plan,
            ToolPlan::ListTasks {
                limit: 100,
                offset: 0
            }
        );
    }

    #[test]
    fn task_status_accepts_numeric_tid() {
        let plan = plan(ToolKind::TaskStatus, &serde_json::json!({"tid": 8812})).unwrap();
        assert_eq!(
            plan,
            ToolPlan::TaskStatus {
                job_id: "8812".into()
            }
        );
    }

    #[test]
    fn normalize_carries_job_id_and_kind() {
        let payload = serde_json::json!({"status": "done", "rows": 17});
        let normalized = normalize_result(JobKind::Cluster, "8812", &payload);
        assert_eq!(normalized["job_id"], "8812");
        assert_eq!(normalized["kind"], "cluster");
        assert_eq!(normalized["rows"], 17);
        assert_eq!(normalized["info"]["status"], "done");
    }
}
