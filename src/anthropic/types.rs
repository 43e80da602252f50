//! Tipos de dados para requisições e respostas da API Anthropic Messages.
//!
//! Todas as structs derivam `Serialize` e `Deserialize` para conversão JSON
//! conforme o formato esperado pelo endpoint `v1/messages` da Anthropic,
//! incluindo os blocos de conteúdo `tool_use` e `tool_result` usados no
//! ciclo de chamadas de ferramentas.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Corpo da requisição para o endpoint `/v1/messages` da API Anthropic.
///
/// Contém o modelo desejado, o limite de tokens, o prompt de sistema,
/// a lista de mensagens da conversa e as definições de ferramentas que o
/// modelo pode invocar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    /// Identificador do modelo a ser usado (ex.: "claude-sonnet-4-5-20250929").
    pub model: String,
    /// Número máximo de tokens na resposta gerada pelo modelo.
    pub max_tokens: u32,
    /// Prompt de sistema estabelecendo o papel do assistente.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Lista de mensagens compondo a conversa (usuário e assistente).
    pub messages: Vec<Message>,
    /// Definições das ferramentas disponíveis para o modelo.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// Uma única mensagem em uma conversa com a API Anthropic.
///
/// O conteúdo é sempre uma lista de blocos; mensagens de texto simples
/// usam um único bloco [`ContentBlock::Text`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Papel do remetente: "user" ou "assistant".
    pub role: String,
    /// Blocos de conteúdo da mensagem.
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Mensagem de usuário contendo apenas texto.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Mensagem de assistente com os blocos retornados pelo modelo.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: "assistant".into(),
            content,
        }
    }

    /// Mensagem de usuário carregando resultados de ferramentas.
    pub fn tool_results(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: "user".into(),
            content: blocks,
        }
    }
}

/// Um bloco de conteúdo dentro de uma mensagem ou resposta.
///
/// O campo `type` do JSON seleciona a variante via `serde(tag)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Texto simples.
    Text { text: String },
    /// Pedido do modelo para invocar uma ferramenta com os argumentos dados.
    ToolUse {
        /// Identificador de correlação emitido pelo modelo.
        id: String,
        /// Nome da ferramenta solicitada.
        name: String,
        /// Argumentos da invocação.
        input: Value,
    },
    /// Resultado de uma ferramenta, devolvido ao modelo.
    ToolResult {
        /// Correlaciona com o `id` do bloco `tool_use` correspondente.
        tool_use_id: String,
        /// Conteúdo serializado do resultado.
        content: String,
        /// Indica ao modelo que a ferramenta falhou.
        #[serde(default, skip_serializing_if = "is_false")]
        is_error: bool,
    },
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Definição de uma ferramenta anunciada ao modelo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Nome da ferramenta (ex.: "justmagic_cluster").
    pub name: String,
    /// Descrição do que a ferramenta faz.
    pub description: String,
    /// JSON Schema dos argumentos aceitos.
    pub input_schema: Value,
}

/// Resposta retornada pelo endpoint `/v1/messages` da API Anthropic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    /// Identificador único da resposta (gerado pela API).
    pub id: String,
    /// Blocos de conteúdo na resposta (texto e/ou pedidos de ferramenta).
    pub content: Vec<ContentBlock>,
    /// Modelo que gerou a resposta.
    pub model: String,
    /// Motivo da parada da geração (ex.: "end_turn", "tool_use").
    /// `None` se ainda em progresso.
    pub stop_reason: Option<String>,
    /// Estatísticas de uso de tokens (entrada e saída).
    pub usage: Usage,
}

impl MessagesResponse {
    /// Concatena todos os blocos de texto da resposta.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// `true` quando o modelo parou para invocar ferramentas.
    pub fn wants_tools(&self) -> bool {
        self.stop_reason.as_deref() == Some("tool_use")
    }
}

/// Estatísticas de consumo de tokens para uma chamada à API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    /// Número de tokens consumidos na entrada (prompt).
    pub input_tokens: u32,
    /// Número de tokens gerados na saída (resposta).
    pub output_tokens: u32,
}
