use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::Client;
use reqwest::multipart::Form;
use serde_json::{Value, json};

use super::error::EngineError;
use super::types::{JobKind, RemoteState, TaskStatus};

const API_URL: &str = "https://api.just-magic.org/api_v1.php";

/// Everything the rest of the service needs from the analysis engine.
///
/// The tracker holds this as a trait object so tests can script engine
/// behavior without a network.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Queue a task; returns the engine-issued task id.
    async fn submit(&self, kind: JobKind, fields: &[(String, String)])
    -> Result<String, EngineError>;

    /// Read the current state of a task. Idempotent.
    async fn poll(&self, job_id: &str) -> Result<TaskStatus, EngineError>;

    /// Ask for the price of a task without queueing it (`justask=1`).
    async fn quote(&self, kind: JobKind, fields: &[(String, String)])
    -> Result<Value, EngineError>;

    /// Account tariff, balance and validity.
    async fn account_info(&self) -> Result<Value, EngineError>;

    /// The user's recent tasks with statuses.
    async fn list_tasks(&self, limit: u32, offset: u32) -> Result<Value, EngineError>;

    /// Download a finished task's tabular result, capped at `max_rows` rows.
    async fn download_result(&self, job_id: &str, max_rows: usize) -> Result<Value, EngineError>;
}

/// Stateless HTTP wrapper around the Just-Magic API.
///
/// Every call is a multipart form post against a single endpoint with an
/// `action` discriminator, per the engine's contract. No state is retained
/// between calls.
pub struct EngineClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl EngineClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, API_URL.to_string())
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to build HTTP client");
        Self {
            api_key,
            client,
            base_url,
        }
    }

    fn form(&self, action: &str, fields: &[(String, String)]) -> Form {
        let mut form = Form::new()
            .text("action", action.to_string())
            .text("apikey", self.api_key.clone());
        for (name, value) in fields {
            form = form.text(name.clone(), value.clone());
        }
        form
    }

    async fn request(
        &self,
        action: &str,
        fields: &[(String, String)],
    ) -> Result<Value, EngineError> {
        let response = self
            .client
            .post(&self.base_url)
            .multipart(self.form(action, fields))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Transport(format!(
                "engine returned HTTP {status}"
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| EngineError::Decode(e.to_string()))
    }

    async fn request_bytes(
        &self,
        action: &str,
        fields: &[(String, String)],
    ) -> Result<Vec<u8>, EngineError> {
        let response = self
            .client
            .post(&self.base_url)
            .multipart(self.form(action, fields))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Transport(format!(
                "engine returned HTTP {status}"
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Reject envelopes carrying a non-zero `err` code.
fn check_envelope(value: Value) -> Result<Value, EngineError> {
    let code = &value["err"];
    let rejected = match code {
        Value::Number(n) => n.as_i64() != Some(0),
        Value::String(s) => !s.is_empty() && s != "0",
        _ => false,
    };
    if rejected {
        let code = match code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let message = value["errtxt"].as_str().unwrap_or("no detail").to_string();
        return Err(EngineError::Submission { code, message });
    }
    Ok(value)
}

fn field(name: &str, value: impl ToString) -> (String, String) {
    (name.to_string(), value.to_string())
}

#[async_trait]
impl EngineApi for EngineClient {
    async fn submit(
        &self,
        kind: JobKind,
        fields: &[(String, String)],
    ) -> Result<String, EngineError> {
        let mut all = vec![field("task", kind.task_code())];
        all.extend_from_slice(fields);
        let body = check_envelope(self.request("put_task", &all).await?)?;

        match &body["tid"] {
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) if !s.is_empty() => Ok(s.clone()),
            _ => Err(EngineError::Decode(
                "put_task answered without a task id".to_string(),
            )),
        }
    }

    async fn poll(&self, job_id: &str) -> Result<TaskStatus, EngineError> {
        let fields = [field("tid", job_id), field("mode", "info")];
        let body = self.request("get_task", &fields).await?;

        // Envelope errors during a poll are transport-class: the task itself
        // is not known to have failed, so the tracker may retry.
        let body = match check_envelope(body) {
            Ok(body) => body,
            Err(e) => return Err(EngineError::Transport(e.to_string())),
        };

        let status = body["status"].as_str().unwrap_or("");
        let state = RemoteState::parse(status);
        let error = match state {
            RemoteState::Error => Some(
                body["errtxt"]
                    .as_str()
                    .unwrap_or("task failed without detail")
                    .to_string(),
            ),
            _ => None,
        };

        Ok(TaskStatus {
            state,
            payload: body,
            error,
        })
    }

    async fn quote(
        &self,
        kind: JobKind,
        fields: &[(String, String)],
    ) -> Result<Value, EngineError> {
        let mut all = vec![field("task", kind.task_code()), field("justask", 1)];
        all.extend_from_slice(fields);
        check_envelope(self.request("put_task", &all).await?)
    }

    async fn account_info(&self) -> Result<Value, EngineError> {
        check_envelope(self.request("info", &[]).await?)
    }

    async fn list_tasks(&self, limit: u32, offset: u32) -> Result<Value, EngineError> {
        let fields = [field("limit", limit.min(100)), field("offset", offset)];
        check_envelope(self.request("list_tasks", &fields).await?)
    }

    async fn download_result(&self, job_id: &str, max_rows: usize) -> Result<Value, EngineError> {
        let fields = [
            field("tid", job_id),
            field("mode", "csv"),
            field("system", "unix"),
        ];
        let bytes = self.request_bytes("get_task", &fields).await?;

        // A small JSON body here is the engine refusing, not a result.
        if let Ok(envelope) = serde_json::from_slice::<Value>(&bytes) {
            check_envelope(envelope)?;
        }

        // Results come gzip-compressed; older tasks may be plain text.
        let text = match decompress(&bytes) {
            Some(text) => text,
            None => String::from_utf8(bytes)
                .map_err(|_| EngineError::Decode("result is neither gzip nor UTF-8".into()))?,
        };

        let rows: Vec<Vec<&str>> = text
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.split('\t').collect())
            .collect();

        let returned = rows.len().min(max_rows);
        let data = serde_json::to_value(&rows[..returned])
            .map_err(|e| EngineError::Decode(e.to_string()))?;

        Ok(json!({
            "total_rows": rows.len(),
            "returned_rows": returned,
            "data": data,
        }))
    }
}

fn decompress(bytes: &[u8]) -> Option<String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut text = String::new();
    decoder.read_to_string(&mut text).ok()?;
    Some(text)
}
