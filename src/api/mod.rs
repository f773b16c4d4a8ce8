pub mod client;
pub mod types;

pub use client::{CLIENT_ID_HEADER, DocloudClient};
pub use types::{
    AttachmentManifest, ExecutionStatus, JobDefinition, JobExecutionStatus, LogItem, LogRecord,
    Parameters,
};
