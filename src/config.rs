//! Configuração do cliente carregada a partir de `docloud.toml`.
//!
//! A struct [`DocloudConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `DOCLOUD_URL` e `DOCLOUD_CLIENT_ID` têm
//! precedência sobre o arquivo.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::DocloudError;

/// Arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "docloud.toml";

/// Configuração de nível superior carregada de `docloud.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct DocloudConfig {
    /// URL base da API (ex.: `https://api-oaas.docloud.ibmcloud.com/job_manager/rest/v1/`).
    #[serde(default)]
    pub url: String,

    /// Identificador do cliente, enviado no cabeçalho `X-IBM-Client-Id`.
    #[serde(default)]
    pub client_id: String,

    /// Intervalo fixo entre consultas de status ou de log, em milissegundos.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Tempo limite para abrir a conexão, em segundos.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Tempo máximo sem receber dados durante uma requisição, em segundos.
    /// Transferências longas continuam enquanto os dados chegarem.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// Intervalo padrão de polling: 2000ms.
fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for DocloudConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            client_id: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DocloudConfig {
    /// Configuração mínima para uma URL e um client id.
    pub fn new(url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Carrega a configuração de `docloud.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self, DocloudError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de um arquivo e aplica as variáveis de ambiente.
    pub fn load_from(path: &Path) -> Result<Self, DocloudError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                DocloudError::Config(format!("failed to read {}: {e}", path.display()))
            })?;
            toml::from_str::<DocloudConfig>(&contents).map_err(|e| {
                DocloudError::Config(format!("failed to parse {}: {e}", path.display()))
            })?
        } else {
            Self::default()
        };

        // Variáveis de ambiente têm precedência sobre o arquivo de configuração.
        if let Some(url) = non_empty_env("DOCLOUD_URL") {
            config.url = url;
        }
        if let Some(client_id) = non_empty_env("DOCLOUD_CLIENT_ID") {
            config.client_id = client_id;
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
