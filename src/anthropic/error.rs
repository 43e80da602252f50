//! Erros do cliente da API Anthropic.
//!
//! Uma falha aqui é sempre de nível de requisição para o turno de conversa:
//! o histórico da sessão é preservado e o usuário é orientado a tentar de
//! novo. Nada aqui vira um ToolResult.

use thiserror::Error;

/// Falhas ao invocar o modelo de linguagem.
#[derive(Debug, Error)]
pub enum AnthropicError {
    /// HTTP 429. `retry_after_ms` vem do cabeçalho `retry-after` quando o
    /// servidor o envia; caso contrário assume 1000ms.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Qualquer outro erro HTTP (chave inválida, sobrecarga, erro interno),
    /// com o corpo da resposta como mensagem.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Falha na camada de rede (DNS, conexão recusada, timeout), antes de
    /// qualquer resposta da API.
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}
