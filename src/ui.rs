//! Interface de terminal do `docloud`: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`JobProgress`] acompanha visualmente os
//! eventos de um job no terminal.

use console::Style;
use docloud::JobEvent;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

/// Indicador visual de progresso para um job no terminal.
///
/// Exibe um spinner enquanto o workflow avança e mensagens coloridas para
/// sucesso (verde), falha (vermelho) e interrupção (amarelo).
pub struct JobProgress {
    // Barra de progresso/spinner do indicatif.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl JobProgress {
    /// Inicia o spinner com a descrição do job e retorna a instância de progresso.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("CREATING: {description}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza o spinner a partir de um evento do job.
    ///
    /// Retorna `true` quando o evento indica sucesso ou ainda não é final.
    pub fn event(&self, event: &JobEvent) -> bool {
        match event {
            JobEvent::Created(job_id) => {
                self.pb.println(format!("  {} Job {job_id} created", self.green.apply_to("+")));
                self.pb.set_message(format!("RUNNING: job {job_id}"));
                true
            }
            JobEvent::Processed(job_id) => {
                self.pb.finish_and_clear();
                println!("  {} Job {job_id} processed", self.green.apply_to("✓"));
                true
            }
            JobEvent::Interrupted(job_id) => {
                self.pb.finish_and_clear();
                println!("  {} Job {job_id} interrupted", self.yellow.apply_to("■"));
                false
            }
            JobEvent::Failed(job_id) => {
                self.pb.finish_and_clear();
                println!("  {} Job {job_id} failed", self.red.apply_to("✗"));
                false
            }
            JobEvent::Error(err) => {
                self.pb.finish_and_clear();
                println!("  {} {err}", self.red.apply_to("✗"));
                false
            }
        }
    }

    /// Encerra o spinner quando o workflow termina sem evento final (create/submit).
    pub fn done(&self, message: &str) {
        if !self.pb.is_finished() {
            self.pb.finish_and_clear();
            println!("  {} {message}", self.green.apply_to("✓"));
        }
    }
}

/// Imprime um valor JSON formatado.
pub fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}
