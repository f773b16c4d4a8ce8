mod cli;
mod ui;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command, JobArgs};
use docloud::api::Parameters;
use docloud::{
    Attachment, Completion, DocloudClient, DocloudConfig, JobOrchestrator, JobSubmission,
};
use tokio::io::AsyncWrite;
use tracing_subscriber::EnvFilter;
use ui::JobProgress;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "docloud=debug" } else { "docloud=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<DocloudConfig> {
    let mut config = match &cli.config {
        Some(path) => DocloudConfig::load_from(path)?,
        None => DocloudConfig::load()?,
    };
    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(client_id) = &cli.client_id {
        config.client_id = client_id.clone();
    }
    if config.url.is_empty() {
        bail!("no API url configured (docloud.toml, DOCLOUD_URL or --url)");
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    let client = DocloudClient::new(&config)?;
    let orchestrator = JobOrchestrator::new(client.clone());

    match cli.command {
        Command::List => ui::print_json(&client.list_jobs().await?),
        Command::DeleteAll => client.delete_jobs().await?,
        Command::Get { job_id } => ui::print_json(&client.get_job(&job_id).await?),
        Command::Delete { job_id } => ui::print_json(&client.delete_job(&job_id).await?),
        Command::Status { job_id } => {
            let status = client.get_job_execution_status(&job_id).await?;
            println!("{}", status.execution_status);
        }
        Command::Abort { job_id, kill } => client.abort_job(&job_id, kill).await?,
        Command::Create(job) => {
            let observer = orchestrator.create(submission(&job).await?)?;
            return Ok(follow(observer, &job, "Attachments uploaded").await);
        }
        Command::Submit(job) => {
            let observer = orchestrator.submit(submission(&job).await?)?;
            return Ok(follow(observer, &job, "Job submitted").await);
        }
        Command::Execute { job, log } => {
            let sink: Option<docloud::LogSink> = if log {
                Some(Box::new(tokio::io::stdout()))
            } else {
                None
            };
            let observer = orchestrator.execute(submission(&job).await?, sink)?;
            return Ok(follow(observer, &job, "Job finished").await);
        }
        Command::Wait { job_id, log } => {
            let mut stdout = tokio::io::stdout();
            let sink = if log { Some(&mut stdout) } else { None };
            match orchestrator.wait_for_completion(&job_id, sink).await? {
                Completion::Status(status) => println!("{}", status.execution_status),
                Completion::Logged(job_id) => {
                    let status = client.get_job_execution_status(&job_id).await?;
                    println!("{}", status.execution_status);
                }
            }
        }
        Command::Download {
            job_id,
            attachment,
            output,
        } => {
            let mut sink = open_sink(output.as_deref()).await?;
            client
                .download_attachment(&job_id, &attachment, &mut sink)
                .await?;
        }
        Command::Log { job_id, output } => {
            let mut sink = open_sink(output.as_deref()).await?;
            client.download_log(&job_id, &mut sink).await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn submission(job: &JobArgs) -> Result<JobSubmission> {
    let mut attachments = Vec::with_capacity(job.files.len());
    for file in &job.files {
        let attachment = Attachment::from_file(file)
            .await
            .with_context(|| format!("cannot attach {}", file.display()))?;
        attachments.push(attachment);
    }
    let mut submission = JobSubmission::new(attachments);
    if !job.params.is_empty() {
        let parameters: Parameters = job.params.iter().cloned().collect();
        submission = submission.with_parameters(parameters);
    }
    Ok(submission)
}

async fn follow(mut observer: docloud::JobObserver, job: &JobArgs, done: &str) -> ExitCode {
    let progress = JobProgress::start(&describe(&job.files));
    let mut success = true;
    while let Some(event) = observer.next_event().await {
        success &= progress.event(&event);
    }
    if success {
        progress.done(done);
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn describe(files: &[PathBuf]) -> String {
    files
        .iter()
        .filter_map(|f| f.file_name().and_then(|n| n.to_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn open_sink(output: Option<&Path>) -> Result<Box<dyn AsyncWrite + Send + Unpin>> {
    let sink: Box<dyn AsyncWrite + Send + Unpin> = match output {
        Some(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("cannot create {}", path.display()))?;
            Box::new(file)
        }
        None => Box::new(tokio::io::stdout()),
    };
    Ok(sink)
}

