//! Interface de linha de comando do `docloud` baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (operações sobre jobs,
//! anexos e logs) e flags globais (--url, --client-id, --config, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

/// docloud: cliente do serviço de otimização na nuvem.
#[derive(Debug, Parser)]
#[command(name = "docloud", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// URL base da API (sobrepõe docloud.toml e DOCLOUD_URL).
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Identificador do cliente (sobrepõe docloud.toml e DOCLOUD_CLIENT_ID).
    #[arg(long, global = true)]
    pub client_id: Option<String>,

    /// Caminho alternativo para o arquivo de configuração.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Lista os jobs.
    List,

    /// Remove todos os jobs.
    DeleteAll,

    /// Mostra um job.
    Get { job_id: String },

    /// Remove um job.
    Delete { job_id: String },

    /// Mostra o status de execução de um job.
    Status { job_id: String },

    /// Interrompe a execução de um job.
    Abort {
        job_id: String,

        /// Mata o processo em vez de aguardar uma parada limpa.
        #[arg(long)]
        kill: bool,
    },

    /// Cria um job e envia os anexos, sem executá-lo.
    Create(JobArgs),

    /// Cria, envia os anexos e inicia a execução sem acompanhar.
    Submit(JobArgs),

    /// Cria, executa e acompanha o job até o fim.
    Execute {
        #[command(flatten)]
        job: JobArgs,

        /// Exibe o log do job enquanto ele executa.
        #[arg(long)]
        log: bool,
    },

    /// Aguarda o fim de um job já submetido.
    Wait {
        job_id: String,

        /// Exibe o log do job enquanto aguarda.
        #[arg(long)]
        log: bool,
    },

    /// Baixa um anexo de um job.
    Download {
        job_id: String,
        attachment: String,

        /// Arquivo de destino (saída padrão se omitido).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Baixa o log completo de um job.
    Log {
        job_id: String,

        /// Arquivo de destino (saída padrão se omitido).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Anexos e parâmetros de um novo job.
#[derive(Debug, Args)]
pub struct JobArgs {
    /// Arquivos a anexar, enviados na ordem dada.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Parâmetro do job no formato `nome=valor` (valor em JSON ou texto).
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,
}

// Interpreta `nome=valor`; o valor vira JSON quando possível, senão texto.
fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    if name.is_empty() {
        return Err(format!("missing parameter name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}
