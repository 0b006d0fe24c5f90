use async_trait::async_trait;
use fleet_agent_core::models::{
    BackendCredentials, DeploymentResource, DeploymentState, DeviceConfigFields,
    HeartbeatResponse, JobResource, JobState, ServiceSummary,
};
use fleet_agent_core::{AgentError, AgentResult, BackendClient, BackendConfig};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// Maps a transport error onto the backend error variant.
pub fn backend_error(context: &str, err: reqwest::Error) -> AgentError {
    if err.is_timeout() {
        AgentError::Timeout(format!("{context}: {err}"))
    } else {
        AgentError::backend(format!("{context}: {err}"))
    }
}

/// Body of a job state update. Terminal states carry full progress.
pub fn job_state_body(state: JobState, message: Option<&str>) -> Value {
    let mut body = json!({ "state": state });
    if matches!(state, JobState::Success | JobState::Failed) {
        body["progress"] = json!(100);
    }
    if let Some(message) = message {
        body["status-message"] = json!(message);
    }
    body
}

/// REST client for the fleet-management API.
pub struct HttpBackendClient {
    endpoint: String,
    device_id: String,
    api_key: String,
    api_secret: String,
    insecure: bool,
    http_client: reqwest::Client,
}

impl HttpBackendClient {
    pub fn new(config: &BackendConfig) -> AgentResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| AgentError::config_error(format!("HTTP客户端创建失败: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            device_id: config.device_id.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            insecure: config.insecure,
            http_client,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Resource URL for a backend id such as `job/123`.
    pub fn url(&self, resource: &str) -> String {
        format!("{}/api/{}", self.endpoint, resource.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.basic_auth(&self.api_key, Some(&self.api_secret))
        }
    }

    async fn send(&self, context: &str, request: RequestBuilder) -> AgentResult<reqwest::Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| backend_error(context, e))?;

        let status = response.status();
        if status.is_success() {
            debug!(context, status = %status, "backend request succeeded");
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(context, status = %status, "backend request failed");
        Err(AgentError::backend(format!("{context}: HTTP {status} - {body}")))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        context: &str,
        request: RequestBuilder,
    ) -> AgentResult<T> {
        self.send(context, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| backend_error(context, e))
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn heartbeat(&self) -> AgentResult<HeartbeatResponse> {
        let url = self.url(&format!("{}/heartbeat", self.device_id));
        self.send_json("heartbeat", self.http_client.post(&url).json(&json!({})))
            .await
    }

    async fn fetch_device_config(&self, fields: &[&str]) -> AgentResult<DeviceConfigFields> {
        let url = self.url(&self.device_id);
        let select = fields.join(",");
        self.send_json(
            "fetch device",
            self.http_client.get(&url).query(&[("select", select.as_str())]),
        )
        .await
    }

    async fn commission(&self, payload: Map<String, Value>) -> AgentResult<()> {
        let url = self.url(&format!("{}/commission", self.device_id));
        self.send("commission", self.http_client.post(&url).json(&payload))
            .await?;
        Ok(())
    }

    async fn fetch_job(&self, job_id: &str) -> AgentResult<JobResource> {
        self.send_json("fetch job", self.http_client.get(self.url(job_id)))
            .await
    }

    async fn set_job_state(
        &self,
        job_id: &str,
        state: JobState,
        message: Option<&str>,
    ) -> AgentResult<()> {
        let body = job_state_body(state, message);
        self.send("set job state", self.http_client.put(self.url(job_id)).json(&body))
            .await?;
        Ok(())
    }

    async fn fetch_deployment(&self, deployment_id: &str) -> AgentResult<DeploymentResource> {
        self.send_json("fetch deployment", self.http_client.get(self.url(deployment_id)))
            .await
    }

    async fn set_deployment_state(
        &self,
        deployment_id: &str,
        state: DeploymentState,
    ) -> AgentResult<()> {
        self.send(
            "set deployment state",
            self.http_client
                .put(self.url(deployment_id))
                .json(&json!({ "state": state })),
        )
        .await?;
        Ok(())
    }

    async fn push_deployment_logs(
        &self,
        deployment_id: &str,
        lines: Vec<String>,
    ) -> AgentResult<()> {
        let body = json!({ "parent": deployment_id, "log": lines });
        self.send(
            "push deployment logs",
            self.http_client.post(self.url("deployment-log")).json(&body),
        )
        .await?;
        Ok(())
    }

    async fn report_deployment_services(
        &self,
        deployment_id: &str,
        services: &[ServiceSummary],
    ) -> AgentResult<()> {
        self.send(
            "report deployment services",
            self.http_client
                .put(self.url(deployment_id))
                .json(&json!({ "deployment-services": services })),
        )
        .await?;
        Ok(())
    }

    fn credentials(&self) -> BackendCredentials {
        BackendCredentials {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
            insecure: self.insecure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackendConfig {
        BackendConfig {
            endpoint: "https://fleet.example.com/".to_string(),
            device_id: "device/42".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            ..BackendConfig::default()
        }
    }

    #[test]
    fn test_resource_urls() {
        let client = HttpBackendClient::new(&config()).expect("Failed to create client");
        assert_eq!(client.url("job/1"), "https://fleet.example.com/api/job/1");
        assert_eq!(client.url("/device/42"), "https://fleet.example.com/api/device/42");
        assert_eq!(client.device_id(), "device/42");
    }

    #[test]
    fn test_credentials_forwarded_to_helpers() {
        let client = HttpBackendClient::new(&config()).expect("Failed to create client");
        let credentials = client.credentials();
        assert_eq!(credentials.endpoint, "https://fleet.example.com");
        assert_eq!(credentials.api_key, "key");
        assert!(!credentials.insecure);
    }

    #[test]
    fn test_job_state_body() {
        assert_eq!(
            job_state_body(JobState::Running, None),
            json!({ "state": "RUNNING" })
        );
        assert_eq!(
            job_state_body(JobState::Failed, Some("boom")),
            json!({ "state": "FAILED", "progress": 100, "status-message": "boom" })
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transient() {
        let client = HttpBackendClient::new(&BackendConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            device_id: "device/42".to_string(),
            request_timeout_seconds: 2,
            ..BackendConfig::default()
        })
        .expect("Failed to create client");

        let err = client.heartbeat().await.expect_err("heartbeat should fail");
        assert!(err.is_transient());
    }
}
