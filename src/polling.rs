//! Fixed-interval polling of job status and job log.
//!
//! Both loops fetch, test a terminal condition and otherwise sleep for the
//! client's poll interval before fetching again. The first fetch happens
//! immediately. Any failure ends the loop and is returned as is.

use std::time::Duration;

use chrono::{Local, TimeZone};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::api::{DocloudClient, JobExecutionStatus, LogRecord};
use crate::error::{DocloudError, validate_id};

/// How a wait ended: with the final status, or with the end of the log stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Status(JobExecutionStatus),
    Logged(String),
}

/// Polls the execution status until it is FAILED, PROCESSED or INTERRUPTED.
pub async fn poll_status(
    client: &DocloudClient,
    job_id: &str,
    interval: Duration,
) -> Result<JobExecutionStatus, DocloudError> {
    validate_id("job id", job_id)?;
    loop {
        let status = client.get_job_execution_status(job_id).await?;
        info!(job_id = %job_id, status = %status.execution_status, "Job {job_id} is {}", status.execution_status);
        if status.execution_status.is_terminal() {
            return Ok(status);
        }
        sleep(interval).await;
    }
}

/// Streams the job log into `sink` until the service flags the last batch.
///
/// Resolves with the job id.
pub async fn poll_log<W>(
    client: &DocloudClient,
    job_id: &str,
    sink: &mut W,
    interval: Duration,
) -> Result<String, DocloudError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    validate_id("job id", job_id)?;
    let mut next = 0u64;
    loop {
        let items = client.get_log_items(job_id, next, true).await?;
        let mut stop = false;
        for item in &items {
            for record in &item.records {
                sink.write_all(format_log_record(record).as_bytes()).await?;
            }
            next = item.seqid.saturating_add(1);
            stop = item.stop;
        }
        sink.flush().await?;
        debug!(job_id = %job_id, batch = items.len(), next, stop, "log batch written");
        if stop {
            return Ok(job_id.to_string());
        }
        sleep(interval).await;
    }
}

/// Waits for the end of a job: status polling without a sink, log
/// polling with one.
pub async fn wait_for_completion<W>(
    client: &DocloudClient,
    job_id: &str,
    log_sink: Option<&mut W>,
    interval: Duration,
) -> Result<Completion, DocloudError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    match log_sink {
        Some(sink) => poll_log(client, job_id, sink, interval)
            .await
            .map(Completion::Logged),
        None => poll_status(client, job_id, interval)
            .await
            .map(Completion::Status),
    }
}

/// `[<local time>] <level> - <message>`, always newline terminated.
pub fn format_log_record(record: &LogRecord) -> String {
    let when = match Local.timestamp_millis_opt(record.date).single() {
        Some(date) => date.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => record.date.to_string(),
    };
    let mut line = format!("[{when}] {} - {}", record.level, record.message);
    if !line.ends_with('\n') {
        line.push('\n');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ExecutionStatus;
    use crate::test_support::{TEST_INTERVAL, client_for, mount_status_sequence};
    use serde_json::json;
    use std::time::Instant;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(message: &str) -> LogRecord {
        LogRecord {
            date: 1_500_000_000_000,
            level: "INFO".into(),
            message: message.into(),
        }
    }

    #[test]
    fn log_line_format() {
        let line = format_log_record(&record("solving"));
        assert!(line.starts_with('['));
        assert!(line.ends_with("] INFO - solving\n"));
    }

    #[test]
    fn log_line_keeps_single_newline() {
        let line = format_log_record(&record("done\n"));
        assert!(line.ends_with("INFO - done\n"));
        assert!(!line.ends_with("\n\n"));
    }

    #[tokio::test]
    async fn status_polling_stops_at_first_terminal_status() {
        let server = MockServer::start().await;
        mount_status_sequence(&server, "42", &["RUNNING", "RUNNING", "PROCESSED"]).await;

        let client = client_for(&server);
        let started = Instant::now();
        let status = poll_status(&client, "42", TEST_INTERVAL).await.unwrap();

        assert_eq!(status.execution_status, ExecutionStatus::Processed);
        assert!(started.elapsed() >= TEST_INTERVAL * 2);
        let fetches = server.received_requests().await.unwrap();
        assert_eq!(fetches.len(), 3);
    }

    #[tokio::test]
    async fn status_polling_aborts_on_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/42/execute"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"executionStatus": "RUNNING"})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs/42/execute"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = poll_status(&client, "42", TEST_INTERVAL).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn log_polling_writes_each_record_and_advances_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/42/log/items"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"seqid": 0, "records": [{"date": 1_500_000_000_000i64, "level": "INFO", "message": "model read"}], "stop": false}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs/42/log/items"))
            .and(query_param("start", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"seqid": 1, "records": [{"date": 1_500_000_001_000i64, "level": "WARNING", "message": "gap 0.1%"}], "stop": true}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut sink = Vec::new();
        let id = poll_log(&client, "42", &mut sink, TEST_INTERVAL)
            .await
            .unwrap();

        assert_eq!(id, "42");
        let text = String::from_utf8(sink).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("INFO - model read"));
        assert!(lines[1].ends_with("WARNING - gap 0.1%"));
    }

    #[tokio::test]
    async fn log_polling_retries_on_empty_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/42/log/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs/42/log/items"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"seqid": 0, "records": [], "stop": true}
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut sink = Vec::new();
        poll_log(&client, "42", &mut sink, TEST_INTERVAL)
            .await
            .unwrap();
        assert!(sink.is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn log_polling_propagates_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/42/log/items"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut sink = Vec::new();
        let err = poll_log(&client, "42", &mut sink, TEST_INTERVAL)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn polling_rejects_invalid_job_id_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(matches!(
            poll_status(&client, "", TEST_INTERVAL).await,
            Err(DocloudError::Validation(_))
        ));
        let mut sink = Vec::new();
        assert!(matches!(
            poll_log(&client, "a/b", &mut sink, TEST_INTERVAL).await,
            Err(DocloudError::Validation(_))
        ));
        assert!(matches!(
            wait_for_completion(&client, " ", Some(&mut sink), TEST_INTERVAL).await,
            Err(DocloudError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn log_polling_handles_largest_sequence_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/42/log/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"seqid": u64::MAX, "records": [{"date": 1_500_000_000_000i64, "level": "INFO", "message": "last"}], "stop": true}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut sink = Vec::new();
        poll_log(&client, "42", &mut sink, TEST_INTERVAL)
            .await
            .unwrap();
        assert!(String::from_utf8(sink).unwrap().ends_with("INFO - last\n"));
    }

    #[tokio::test]
    async fn wait_for_completion_without_sink_polls_status() {
        let server = MockServer::start().await;
        mount_status_sequence(&server, "42", &["FAILED"]).await;

        let client = client_for(&server);
        let completion = wait_for_completion::<Vec<u8>>(&client, "42", None, TEST_INTERVAL)
            .await
            .unwrap();
        match completion {
            Completion::Status(status) => {
                assert_eq!(status.execution_status, ExecutionStatus::Failed)
            }
            other => panic!("unexpected completion {other:?}"),
        }
    }
}
