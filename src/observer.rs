use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::api::ExecutionStatus;
use crate::error::DocloudError;

const EVENT_CAPACITY: usize = 16;

/// Lifecycle notification emitted by a job workflow.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// The job exists on the service; attachments are not uploaded yet.
    Created(String),
    /// A step failed; the workflow stopped.
    Error(Arc<DocloudError>),
    Failed(String),
    Processed(String),
    Interrupted(String),
}

impl JobEvent {
    /// Every event but `Created` ends the workflow.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Created(_))
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            JobEvent::Created(id)
            | JobEvent::Failed(id)
            | JobEvent::Processed(id)
            | JobEvent::Interrupted(id) => Some(id),
            JobEvent::Error(_) => None,
        }
    }

    /// Completion event matching a terminal execution status.
    pub fn for_status(job_id: &str, status: ExecutionStatus) -> Option<JobEvent> {
        let job_id = job_id.to_string();
        match status {
            ExecutionStatus::Failed => Some(JobEvent::Failed(job_id)),
            ExecutionStatus::Processed => Some(JobEvent::Processed(job_id)),
            ExecutionStatus::Interrupted => Some(JobEvent::Interrupted(job_id)),
            _ => None,
        }
    }
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobEvent::Created(id) => write!(f, "created {id}"),
            JobEvent::Error(err) => write!(f, "error: {err}"),
            JobEvent::Failed(id) => write!(f, "failed {id}"),
            JobEvent::Processed(id) => write!(f, "processed {id}"),
            JobEvent::Interrupted(id) => write!(f, "interrupted {id}"),
        }
    }
}

/// Handle on the events of one workflow run.
///
/// The receiver is created before the workflow starts, so the handle sees
/// every event. Receivers from [`subscribe`](JobObserver::subscribe) only see
/// events sent after they were created. The channel closes once the workflow
/// task is done.
#[derive(Debug)]
pub struct JobObserver {
    rx: broadcast::Receiver<JobEvent>,
}

impl JobObserver {
    pub(crate) fn channel() -> (Self, EventEmitter) {
        let (tx, rx) = broadcast::channel(EVENT_CAPACITY);
        (
            Self { rx },
            EventEmitter {
                tx,
                terminated: false,
            },
        )
    }

    /// An additional listener on the same workflow.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.rx.resubscribe()
    }

    /// Next event, or `None` once the workflow finished and all events were read.
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "job observer lagged behind, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Collects every event until the workflow finishes.
    pub async fn wait(mut self) -> Vec<JobEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    /// Waits for the workflow to finish and returns its terminal event, if any.
    pub async fn outcome(mut self) -> Option<JobEvent> {
        let mut outcome = None;
        while let Some(event) = self.next_event().await {
            if event.is_terminal() {
                outcome = Some(event);
            }
        }
        outcome
    }
}

/// Sending side held by the workflow task. Lets at most one terminal event through.
#[derive(Debug)]
pub(crate) struct EventEmitter {
    tx: broadcast::Sender<JobEvent>,
    terminated: bool,
}

impl EventEmitter {
    pub(crate) fn created(&self, job_id: &str) {
        if !self.terminated {
            self.send(JobEvent::Created(job_id.to_string()));
        }
    }

    pub(crate) fn error(&mut self, err: DocloudError) {
        self.terminal(JobEvent::Error(Arc::new(err)));
    }

    /// Returns `false` when a terminal event was already emitted.
    pub(crate) fn terminal(&mut self, event: JobEvent) -> bool {
        if self.terminated {
            debug!(%event, "terminal event already emitted, dropping");
            return false;
        }
        self.terminated = true;
        self.send(event);
        true
    }

    fn send(&self, event: JobEvent) {
        if self.tx.send(event).is_err() {
            debug!("no job observer listening");
        }
    }
}
