use std::io::{self, Write};
use std::time::{Duration, Instant};

use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::header::{ACCEPT, CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderValue, LOCATION};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task;
use tracing::{debug, info};

use super::types::{JobDefinition, JobExecutionStatus, LogItem};
use crate::config::DocloudConfig;
use crate::error::{Call, DocloudError, classify, transport_failure, validate_id};

/// Header carrying the fixed client identifier on every call.
pub const CLIENT_ID_HEADER: &str = "x-ibm-client-id";

const OCTET_STREAM: &str = "application/octet-stream";

/// Client for the job manager REST API.
///
/// Cheap to clone: clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct DocloudClient {
    client: Client,
    base_url: Url,
    poll_interval: Duration,
}

impl DocloudClient {
    pub fn new(config: &DocloudConfig) -> Result<Self, DocloudError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| DocloudError::Config(format!("invalid url '{}': {e}", config.url)))?;
        if base_url.cannot_be_a_base() {
            return Err(DocloudError::Config(format!(
                "url '{}' cannot be used as a base url",
                config.url
            )));
        }

        let client_id = HeaderValue::from_str(&config.client_id)
            .map_err(|e| DocloudError::Config(format!("invalid client id: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_ID_HEADER, client_id);

        // Idle timeout: a transfer fails only when no data arrives for `timeout`.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| DocloudError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            poll_interval: config.poll_interval(),
        })
    }

    /// Fixed delay between two status or log fetches.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the list of jobs.
    pub async fn list_jobs(&self) -> Result<Value, DocloudError> {
        let (call, builder) = self.request(Method::GET, &["jobs"]);
        let response = self.send(&call, builder, &[200]).await?;
        read_json(&call, response).await
    }

    /// Deletes all the jobs.
    pub async fn delete_jobs(&self) -> Result<(), DocloudError> {
        let (call, builder) = self.request(Method::DELETE, &["jobs"]);
        self.send(&call, builder, &[204]).await?;
        info!("All jobs deleted");
        Ok(())
    }

    /// Creates a job and returns the id taken from the `location` header.
    pub async fn create_job(&self, definition: &JobDefinition) -> Result<String, DocloudError> {
        let (call, builder) = self.request(Method::POST, &["jobs"]);
        let response = self.send(&call, builder.json(definition), &[201]).await?;

        let job_id = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(job_id_from_location)
            .ok_or_else(|| DocloudError::Protocol {
                call: call.clone(),
                reason: "missing or malformed location header".into(),
            })?;
        info!(job_id = %job_id, "Job {job_id} created");
        Ok(job_id)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Value, DocloudError> {
        validate_id("job id", job_id)?;
        let (call, builder) = self.request(Method::GET, &["jobs", job_id]);
        let response = self.send(&call, builder, &[200]).await?;
        read_json(&call, response).await
    }

    /// Deletes a job, returning the deleted job as sent back by the service.
    pub async fn delete_job(&self, job_id: &str) -> Result<Value, DocloudError> {
        validate_id("job id", job_id)?;
        let (call, builder) = self.request(Method::DELETE, &["jobs", job_id]);
        let response = self.send(&call, builder, &[200]).await?;
        let job = read_json_or_null(&call, response).await?;
        info!(job_id = %job_id, "Job {job_id} deleted");
        Ok(job)
    }

    pub async fn execute_job(&self, job_id: &str) -> Result<(), DocloudError> {
        validate_id("job id", job_id)?;
        let (call, builder) = self.request(Method::POST, &["jobs", job_id, "execute"]);
        self.send(&call, builder, &[204]).await?;
        info!(job_id = %job_id, "Job {job_id} submitted");
        Ok(())
    }

    pub async fn get_job_execution_status(
        &self,
        job_id: &str,
    ) -> Result<JobExecutionStatus, DocloudError> {
        validate_id("job id", job_id)?;
        let (call, builder) = self.request(Method::GET, &["jobs", job_id, "execute"]);
        let response = self.send(&call, builder, &[200]).await?;
        read_json(&call, response).await
    }

    /// Fetches the log items of a job starting at sequence id `start`.
    pub async fn get_log_items(
        &self,
        job_id: &str,
        start: u64,
        continuous: bool,
    ) -> Result<Vec<LogItem>, DocloudError> {
        validate_id("job id", job_id)?;
        let (call, builder) = self.request(Method::GET, &["jobs", job_id, "log", "items"]);
        let builder = builder.query(&[
            ("start", start.to_string()),
            ("continuous", continuous.to_string()),
        ]);
        let response = self.send(&call, builder, &[200]).await?;
        read_json(&call, response).await
    }

    /// Aborts a running job. `kill` stops it immediately instead of
    /// letting the solve terminate gracefully.
    pub async fn abort_job(&self, job_id: &str, kill: bool) -> Result<(), DocloudError> {
        validate_id("job id", job_id)?;
        let (call, builder) = self.request(Method::DELETE, &["jobs", job_id, "execute"]);
        let builder = builder.query(&[("kill", kill.to_string())]);
        self.send(&call, builder, &[204]).await?;
        info!(job_id = %job_id, kill, "Job {job_id} aborted");
        Ok(())
    }

    /// Uploads an attachment. The content is read to the end and gzip
    /// compressed on the blocking pool before it is sent.
    pub async fn upload_attachment<R>(
        &self,
        job_id: &str,
        name: &str,
        mut content: R,
    ) -> Result<String, DocloudError>
    where
        R: AsyncRead + Unpin,
    {
        validate_id("job id", job_id)?;
        validate_id("attachment name", name)?;

        let started = Instant::now();
        info!(job_id = %job_id, attachment = %name, "Starting upload of '{name}' of job {job_id}");

        let mut raw = Vec::new();
        content.read_to_end(&mut raw).await?;
        let raw_len = raw.len();
        let compressed = task::spawn_blocking(move || gzip(&raw))
            .await
            .map_err(|e| DocloudError::Compression(io::Error::other(e)))??;
        debug!(raw = raw_len, compressed = compressed.len(), "attachment compressed");

        let (call, builder) =
            self.request(Method::PUT, &["jobs", job_id, "attachments", name, "blob"]);
        let builder = builder
            .header(CONTENT_TYPE, OCTET_STREAM)
            .header(CONTENT_ENCODING, "gzip")
            .body(compressed);
        self.send(&call, builder, &[204]).await?;

        info!(
            job_id = %job_id,
            attachment = %name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Attachment '{name}' of job {job_id} uploaded"
        );
        Ok(job_id.to_string())
    }

    /// Streams an attachment into `sink`.
    pub async fn download_attachment<W>(
        &self,
        job_id: &str,
        name: &str,
        sink: &mut W,
    ) -> Result<String, DocloudError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        validate_id("job id", job_id)?;
        validate_id("attachment name", name)?;

        let started = Instant::now();
        let (call, builder) =
            self.request(Method::GET, &["jobs", job_id, "attachments", name, "blob"]);
        let response = self
            .send(&call, builder.header(ACCEPT, OCTET_STREAM), &[200])
            .await?;
        let bytes = stream_into(&call, response, sink).await?;

        info!(
            job_id = %job_id,
            attachment = %name,
            bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Attachment '{name}' of job {job_id} downloaded"
        );
        Ok(job_id.to_string())
    }

    /// Streams the complete log of a job into `sink`.
    pub async fn download_log<W>(&self, job_id: &str, sink: &mut W) -> Result<String, DocloudError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        validate_id("job id", job_id)?;

        let started = Instant::now();
        let (call, builder) = self.request(Method::GET, &["jobs", job_id, "log", "blob"]);
        let response = self
            .send(&call, builder.header(ACCEPT, OCTET_STREAM), &[200])
            .await?;
        let bytes = stream_into(&call, response, sink).await?;

        info!(
            job_id = %job_id,
            bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Log of job {job_id} downloaded"
        );
        Ok(job_id.to_string())
    }

    fn request(&self, method: Method, segments: &[&str]) -> (Call, RequestBuilder) {
        let call = Call::new(method.clone(), format!("/{}", segments.join("/")));
        let mut url = self.base_url.clone();
        // cannot-be-a-base urls are rejected in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        (call, self.client.request(method, url))
    }

    async fn send(
        &self,
        call: &Call,
        builder: RequestBuilder,
        accepted: &[u16],
    ) -> Result<Response, DocloudError> {
        debug!(method = %call.method, path = %call.path, "sending request");
        classify(call, builder.send().await, accepted).await
    }
}

/// Last path segment of a `location` header, e.g. `.../jobs/42` → `42`.
pub(crate) fn job_id_from_location(location: &str) -> Option<String> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, DocloudError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(DocloudError::Compression)?;
    encoder.finish().map_err(DocloudError::Compression)
}

async fn read_json<T: DeserializeOwned>(call: &Call, response: Response) -> Result<T, DocloudError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|source| transport_failure(call, source))?;
    serde_json::from_slice(&bytes).map_err(|source| DocloudError::Decode {
        call: call.clone(),
        source,
    })
}

async fn read_json_or_null(call: &Call, response: Response) -> Result<Value, DocloudError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|source| transport_failure(call, source))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|source| DocloudError::Decode {
        call: call.clone(),
        source,
    })
}

async fn stream_into<W>(call: &Call, mut response: Response, sink: &mut W) -> Result<u64, DocloudError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|source| transport_failure(call, source))?
    {
        sink.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    sink.flush().await?;
    Ok(written)
}
