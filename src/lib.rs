//! Client for the Decision Optimization job manager REST API.
//!
//! [`DocloudClient`] exposes one method per REST action. [`JobOrchestrator`]
//! chains them into the create / submit / execute workflows and reports job
//! progress through a [`JobObserver`].
//!
//! ```no_run
//! use docloud::{Attachment, DocloudClient, DocloudConfig, JobEvent, JobOrchestrator, JobSubmission};
//!
//! # async fn run() -> Result<(), docloud::DocloudError> {
//! let config = DocloudConfig::new("https://example.com/job_manager/rest/v1/", "my-client-id");
//! let orchestrator = JobOrchestrator::new(DocloudClient::new(&config)?);
//!
//! let model = Attachment::from_file("diet.lp").await?;
//! let mut observer = orchestrator.execute(JobSubmission::new(vec![model]), None)?;
//! while let Some(event) = observer.next_event().await {
//!     if let JobEvent::Processed(job_id) = event {
//!         println!("job {job_id} solved");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod observer;
pub mod orchestrator;
pub mod polling;

#[cfg(test)]
mod test_support;

pub use api::{DocloudClient, ExecutionStatus, JobExecutionStatus};
pub use config::DocloudConfig;
pub use error::{Call, DocloudError};
pub use observer::{JobEvent, JobObserver};
pub use orchestrator::{Attachment, JobOrchestrator, JobSubmission, LogSink};
pub use polling::Completion;
