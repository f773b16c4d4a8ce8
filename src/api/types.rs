//! Tipos de dados trocados com a API de jobs do serviço de otimização.
//!
//! As structs derivam `Serialize`/`Deserialize` conforme o formato JSON do
//! serviço (`camelCase` nos campos de status). Objetos de job e listas de jobs
//! não são modelados: são devolvidos como [`serde_json::Value`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parâmetros opcionais de um job (nome → valor).
pub type Parameters = BTreeMap<String, Value>;

/// Estado de execução de um job, como reportado pelo serviço.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Created,
    NotStarted,
    Running,
    Interrupting,
    Interrupted,
    Failed,
    Processed,
    /// Qualquer valor ainda desconhecido por este cliente.
    #[serde(other)]
    Unknown,
}

impl ExecutionStatus {
    /// `true` para FAILED, PROCESSED e INTERRUPTED: o job não muda mais de estado.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Failed | ExecutionStatus::Processed | ExecutionStatus::Interrupted
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Created => "CREATED",
            ExecutionStatus::NotStarted => "NOT_STARTED",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Interrupting => "INTERRUPTING",
            ExecutionStatus::Interrupted => "INTERRUPTED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Processed => "PROCESSED",
            ExecutionStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Objeto de status retornado por `GET /jobs/{id}/execute`.
///
/// Somente `executionStatus` é interpretado; os demais campos do serviço
/// são preservados em `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecutionStatus {
    pub execution_status: ExecutionStatus,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Entrada do manifesto de anexos enviado na criação do job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentManifest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

/// Corpo de `POST /jobs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub attachments: Vec<AttachmentManifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

/// Um registro de log: data em milissegundos desde a época, nível e mensagem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub date: i64,
    pub level: String,
    pub message: String,
}

/// Grupo de registros identificado por `seqid`.
///
/// `stop` indica que o log do job terminou e não haverá mais itens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogItem {
    pub seqid: u64,
    #[serde(default)]
    pub records: Vec<LogRecord>,
    #[serde(default)]
    pub stop: bool,
}
