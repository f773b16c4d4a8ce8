use std::collections::HashSet;
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::api::{AttachmentManifest, DocloudClient, JobDefinition, Parameters};
use crate::error::{DocloudError, validate_id};
use crate::observer::{EventEmitter, JobEvent, JobObserver};
use crate::polling::{self, Completion};

/// Writable destination for a live job log.
pub type LogSink = Box<dyn AsyncWrite + Send + Unpin>;

/// A named attachment and the reader its content is uploaded from.
pub struct Attachment {
    pub name: String,
    pub content: Box<dyn AsyncRead + Send + Unpin>,
    /// Uncompressed size, announced in the job definition when known.
    pub length: Option<u64>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, content: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            name: name.into(),
            content: Box::new(content),
            length: None,
        }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let length = bytes.len() as u64;
        Self::new(name, Cursor::new(bytes)).with_length(length)
    }

    /// Opens a file; the attachment is named after the file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DocloudError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                DocloudError::Validation(format!("'{}' has no usable file name", path.display()))
            })?
            .to_string();
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        Ok(Self::new(name, file).with_length(length))
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Input of the create, submit and execute workflows.
#[derive(Debug, Default)]
pub struct JobSubmission {
    pub attachments: Vec<Attachment>,
    pub parameters: Option<Parameters>,
}

impl JobSubmission {
    pub fn new(attachments: Vec<Attachment>) -> Self {
        Self {
            attachments,
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Splits the submission into the definition sent on creation and the
    /// attachments to upload, rejecting input the service cannot accept.
    fn into_parts(self) -> Result<(JobDefinition, Vec<Attachment>), DocloudError> {
        if self.attachments.is_empty() {
            return Err(DocloudError::Validation(
                "attachment list must not be empty".into(),
            ));
        }
        let mut seen = HashSet::new();
        for attachment in &self.attachments {
            validate_id("attachment name", &attachment.name)?;
            if !seen.insert(attachment.name.as_str()) {
                return Err(DocloudError::Validation(format!(
                    "attachment '{}' is listed twice",
                    attachment.name
                )));
            }
        }

        let definition = JobDefinition {
            attachments: self
                .attachments
                .iter()
                .map(|a| AttachmentManifest {
                    name: a.name.clone(),
                    length: a.length,
                })
                .collect(),
            parameters: self.parameters,
        };
        Ok((definition, self.attachments))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Create,
    Submit,
    Execute,
}

/// Drives jobs through create → upload → execute → monitor, reporting
/// progress as [`JobEvent`]s.
///
/// Workflow methods validate their input, then return immediately while the
/// work continues in a spawned task. They need a Tokio runtime.
#[derive(Debug, Clone)]
pub struct JobOrchestrator {
    client: DocloudClient,
}

impl JobOrchestrator {
    pub fn new(client: DocloudClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DocloudClient {
        &self.client
    }

    /// Creates the job and uploads its attachments. Emits `Created`, and
    /// `Error` on failure.
    pub fn create(&self, submission: JobSubmission) -> Result<JobObserver, DocloudError> {
        self.spawn(submission, Stage::Create, None)
    }

    /// Like [`create`](Self::create), then starts the execution without monitoring it.
    pub fn submit(&self, submission: JobSubmission) -> Result<JobObserver, DocloudError> {
        self.spawn(submission, Stage::Submit, None)
    }

    /// Submits the job and monitors it to the end. Emits `Created` then exactly
    /// one of `Failed`, `Processed`, `Interrupted` or `Error`.
    ///
    /// With a log sink, the job log is streamed into it while waiting.
    pub fn execute(
        &self,
        submission: JobSubmission,
        log_sink: Option<LogSink>,
    ) -> Result<JobObserver, DocloudError> {
        self.spawn(submission, Stage::Execute, log_sink)
    }

    /// Waits for the job to finish, streaming its log into `log_sink` if given.
    pub async fn wait_for_completion<W>(
        &self,
        job_id: &str,
        log_sink: Option<&mut W>,
    ) -> Result<Completion, DocloudError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        polling::wait_for_completion(&self.client, job_id, log_sink, self.client.poll_interval())
            .await
    }

    fn spawn(
        &self,
        submission: JobSubmission,
        stage: Stage,
        log_sink: Option<LogSink>,
    ) -> Result<JobObserver, DocloudError> {
        let (definition, attachments) = submission.into_parts()?;
        let runtime = Handle::try_current().map_err(|_| DocloudError::NoRuntime)?;

        let (observer, mut emitter) = JobObserver::channel();
        let client = self.client.clone();
        runtime.spawn(async move {
            let outcome =
                run_workflow(&client, definition, attachments, stage, log_sink, &mut emitter).await;
            if let Err(err) = outcome {
                emitter.error(err);
            }
        });
        Ok(observer)
    }
}

async fn run_workflow(
    client: &DocloudClient,
    definition: JobDefinition,
    attachments: Vec<Attachment>,
    stage: Stage,
    mut log_sink: Option<LogSink>,
    emitter: &mut EventEmitter,
) -> Result<(), DocloudError> {
    let job_id = client.create_job(&definition).await?;
    emitter.created(&job_id);

    upload_in_order(client, &job_id, attachments).await?;
    if stage == Stage::Create {
        return Ok(());
    }

    client.execute_job(&job_id).await?;
    if stage == Stage::Submit {
        return Ok(());
    }

    let interval = client.poll_interval();
    polling::wait_for_completion(client, &job_id, log_sink.as_deref_mut(), interval).await?;
    let event = completion_event(client, &job_id, interval).await?;
    info!(job_id = %job_id, %event, "job finished");
    emitter.terminal(event);
    Ok(())
}

/// Each upload starts only after the previous one resolved.
async fn upload_in_order(
    client: &DocloudClient,
    job_id: &str,
    attachments: Vec<Attachment>,
) -> Result<(), DocloudError> {
    let total = attachments.len();
    for (index, attachment) in attachments.into_iter().enumerate() {
        debug!(job_id = %job_id, attachment = %attachment.name, index = index + 1, total, "uploading");
        client
            .upload_attachment(job_id, &attachment.name, attachment.content)
            .await?;
    }
    Ok(())
}

/// Re-fetches the status and maps it to the completion event. A log stream
/// can end before the status turns terminal, so polling resumes until it does.
async fn completion_event(
    client: &DocloudClient,
    job_id: &str,
    interval: Duration,
) -> Result<JobEvent, DocloudError> {
    let mut status = client.get_job_execution_status(job_id).await?;
    loop {
        if let Some(event) = JobEvent::for_status(job_id, status.execution_status) {
            return Ok(event);
        }
        debug!(job_id = %job_id, status = %status.execution_status, "status not final yet");
        status = polling::poll_status(client, job_id, interval).await?;
    }
}
