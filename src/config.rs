//! Configuração do SEOPILOT carregada a partir de `seopilot.toml`.
//!
//! A struct [`Config`] contém todos os parâmetros configuráveis do serviço.
//! Valores não presentes no arquivo usam defaults sensíveis. As variáveis de
//! ambiente `ANTHROPIC_API_KEY`, `JUSTMAGIC_API_KEY` e `SEOPILOT_PORT` têm
//! precedência sobre o arquivo.

use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

/// Configuração de nível superior carregada de `seopilot.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Chave da API Anthropic.
    #[serde(default)]
    pub anthropic_api_key: String,

    /// Chave da API do motor de análise Just-Magic.
    #[serde(default)]
    pub engine_api_key: String,

    /// Identificador do modelo Claude usado na conversa.
    #[serde(default = "default_model")]
    pub model: String,

    /// Porta HTTP do serviço.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Intervalo inicial em milissegundos entre polls de uma tarefa.
    #[serde(default = "default_poll_initial_ms")]
    pub poll_initial_ms: u64,

    /// Teto em milissegundos para o intervalo de poll (backoff exponencial).
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,

    /// Fração de jitter aplicada a cada intervalo de poll (0.1 = ±10%).
    #[serde(default = "default_poll_jitter")]
    pub poll_jitter: f64,

    /// Falhas de transporte consecutivas toleradas antes de marcar a tarefa
    /// como falha.
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,

    /// Orçamento em segundos que uma chamada de ferramenta espera pelo
    /// resultado antes de responder "ainda em execução".
    #[serde(default = "default_dispatch_budget_secs")]
    pub dispatch_budget_secs: u64,

    /// Tempo máximo total em segundos que uma tarefa pode ficar em
    /// andamento antes de ser forçada a TimedOut.
    #[serde(default = "default_max_job_wait_secs")]
    pub max_job_wait_secs: u64,

    /// Número máximo de chamadas simultâneas ao motor de análise.
    #[serde(default = "default_max_engine_concurrency")]
    pub max_engine_concurrency: usize,

    /// Número máximo de rodadas de ferramentas por turno de conversa.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    /// Número máximo de mensagens retidas no histórico de uma sessão.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    /// Segundos que uma tarefa terminal permanece no registro antes de ser
    /// removida.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

// Modelo padrão para o turno de conversa.
fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_poll_initial_ms() -> u64 {
    1000
}

fn default_poll_max_ms() -> u64 {
    30_000
}

fn default_poll_jitter() -> f64 {
    0.1
}

fn default_max_poll_failures() -> u32 {
    3
}

fn default_dispatch_budget_secs() -> u64 {
    45
}

fn default_max_job_wait_secs() -> u64 {
    900
}

fn default_max_engine_concurrency() -> usize {
    4
}

fn default_max_tool_rounds() -> u32 {
    8
}

fn default_history_cap() -> usize {
    40
}

fn default_retention_secs() -> u64 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize")
    }
}

impl Config {
    /// Carrega a configuração de `seopilot.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("seopilot.toml"))
    }

    /// Carrega a configuração do caminho fornecido, aplicando em seguida a
    /// precedência das variáveis de ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<Config>(&contents)?
        } else {
            Self::default()
        };

        // Variáveis de ambiente têm precedência sobre o arquivo.
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY")
            && !key.is_empty()
        {
            config.anthropic_api_key = key;
        }
        if let Ok(key) = std::env::var("JUSTMAGIC_API_KEY")
            && !key.is_empty()
        {
            config.engine_api_key = key;
        }
        if let Ok(port) = std::env::var("SEOPILOT_PORT")
            && let Ok(port) = port.parse()
        {
            config.port = port;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.model, "claude-sonnet-4-5-20250929");
        assert_eq!(config.port, 8000);
        assert_eq!(config.poll_initial_ms, 1000);
        assert_eq!(config.poll_max_ms, 30_000);
        assert_eq!(config.max_poll_failures, 3);
        assert_eq!(config.max_tool_rounds, 8);
        assert_eq!(config.history_cap, 40);
        assert!(config.anthropic_api_key.is_empty());
        assert!(config.engine_api_key.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            engine_api_key = "jm-test-123"
            dispatch_budget_secs = 10
            max_engine_concurrency = 2
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine_api_key, "jm-test-123");
        assert_eq!(config.dispatch_budget_secs, 10);
        assert_eq!(config.max_engine_concurrency, 2);
        // Campos omitidos mantêm os defaults.
        assert_eq!(config.poll_initial_ms, 1000);
        assert_eq!(config.retention_secs, 3600);
    }

    #[test]
    fn load_from_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 9001\nmax_tool_rounds = 3").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.max_tool_rounds, 3);
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let config = Config::load_from(Path::new("does-not-exist.toml")).unwrap();
        assert_eq!(config.max_job_wait_secs, 900);
    }
}
