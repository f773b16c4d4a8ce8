use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::api::DocloudClient;
use crate::config::DocloudConfig;

pub const TEST_INTERVAL: Duration = Duration::from_millis(20);

pub fn client_for(server: &MockServer) -> DocloudClient {
    let config = DocloudConfig {
        poll_interval_ms: TEST_INTERVAL.as_millis() as u64,
        ..DocloudConfig::new(server.uri(), "test-client")
    };
    DocloudClient::new(&config).unwrap()
}

/// Answers successive status fetches with `statuses`, repeating the last one.
pub async fn mount_status_sequence(server: &MockServer, job_id: &str, statuses: &[&str]) {
    let route = format!("/jobs/{job_id}/execute");
    for (i, status) in statuses.iter().enumerate() {
        let mock = Mock::given(method("GET"))
            .and(path(route.as_str()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"executionStatus": status})),
            );
        let mock = if i + 1 < statuses.len() {
            mock.up_to_n_times(1)
        } else {
            mock
        };
        mock.mount(server).await;
    }
}
