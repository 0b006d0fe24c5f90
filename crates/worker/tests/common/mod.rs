#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleet_agent_core::models::{
    BackendCredentials, ContainerSpec, DeploymentModule, DeploymentResource, DeploymentSpec,
    DeploymentState, DeviceConfigFields, HeartbeatResponse, JobResource, JobState, ModuleContent,
    PruneTarget, ServiceSummary,
};
use fleet_agent_core::{
    AgentError, AgentResult, BackendClient, ContainerEngine, OrchestrationBackend,
};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// 轮询直到条件成立或超时
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub async fn within<T>(limit: Duration, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(limit, future)
        .await
        .expect("operation did not finish in time")
}

pub fn compose_deployment(id: &str, compatibility: Option<&str>) -> DeploymentResource {
    DeploymentResource {
        id: id.to_string(),
        module: DeploymentModule {
            subtype: "application".to_string(),
            compatibility: compatibility.map(str::to_string),
            content: ModuleContent {
                docker_compose: Some("services:\n  web:\n    image: nginx\n".to_string()),
                environmental_variables: Vec::new(),
            },
        },
        state: Some(DeploymentState::New),
    }
}

// Mock后端客户端, 记录所有调用
#[derive(Default)]
pub struct MockBackend {
    pub heartbeats: Mutex<VecDeque<HeartbeatResponse>>,
    pub heartbeat_calls: AtomicUsize,
    pub fail_heartbeat: AtomicBool,
    pub panic_heartbeat: AtomicBool,
    pub device_config: Mutex<DeviceConfigFields>,
    pub device_config_calls: AtomicUsize,
    pub commissions: Mutex<Vec<Map<String, Value>>>,
    pub fail_commission: AtomicBool,
    pub jobs: Mutex<HashMap<String, JobResource>>,
    pub job_fetches: AtomicUsize,
    pub job_fetch_delay_ms: AtomicI64,
    pub job_states: Mutex<Vec<(String, JobState, Option<String>)>>,
    pub deployments: Mutex<HashMap<String, DeploymentResource>>,
    pub deployment_states: Mutex<Vec<(String, DeploymentState)>>,
    pub fail_deployment_state: AtomicBool,
    pub pushed_logs: Mutex<Vec<(String, Vec<String>)>>,
    pub reported_services: Mutex<Vec<(String, Vec<ServiceSummary>)>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_job(&self, job: JobResource) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }

    pub fn add_deployment(&self, deployment: DeploymentResource) {
        self.deployments
            .lock()
            .unwrap()
            .insert(deployment.id.clone(), deployment);
    }

    pub fn queue_heartbeat(&self, response: HeartbeatResponse) {
        self.heartbeats.lock().unwrap().push_back(response);
    }

    pub fn job_states_for(&self, job_id: &str) -> Vec<JobState> {
        self.job_states
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| id == job_id)
            .map(|(_, state, _)| *state)
            .collect()
    }

    pub fn final_job_state(&self, job_id: &str) -> Option<JobState> {
        self.job_states_for(job_id).last().copied()
    }

    pub fn job_message(&self, job_id: &str) -> Option<String> {
        self.job_states
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _, _)| id == job_id)
            .and_then(|(_, _, message)| message.clone())
    }

    pub fn deployment_states_for(&self, deployment_id: &str) -> Vec<DeploymentState> {
        self.deployment_states
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == deployment_id)
            .map(|(_, state)| *state)
            .collect()
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn heartbeat(&self) -> AgentResult<HeartbeatResponse> {
        self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_heartbeat.load(Ordering::SeqCst) {
            panic!("heartbeat client crashed");
        }
        if self.fail_heartbeat.load(Ordering::SeqCst) {
            return Err(AgentError::backend("backend unreachable"));
        }
        Ok(self.heartbeats.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn fetch_device_config(&self, _fields: &[&str]) -> AgentResult<DeviceConfigFields> {
        self.device_config_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.device_config.lock().unwrap().clone())
    }

    async fn commission(&self, payload: Map<String, Value>) -> AgentResult<()> {
        if self.fail_commission.load(Ordering::SeqCst) {
            return Err(AgentError::backend("commission rejected"));
        }
        self.commissions.lock().unwrap().push(payload);
        Ok(())
    }

    async fn fetch_job(&self, job_id: &str) -> AgentResult<JobResource> {
        self.job_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = self.job_fetch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        self.jobs
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| AgentError::backend(format!("job {job_id} not found")))
    }

    async fn set_job_state(
        &self,
        job_id: &str,
        state: JobState,
        message: Option<&str>,
    ) -> AgentResult<()> {
        self.job_states.lock().unwrap().push((
            job_id.to_string(),
            state,
            message.map(str::to_string),
        ));
        Ok(())
    }

    async fn fetch_deployment(&self, deployment_id: &str) -> AgentResult<DeploymentResource> {
        self.deployments
            .lock()
            .unwrap()
            .get(deployment_id)
            .cloned()
            .ok_or_else(|| AgentError::backend(format!("deployment {deployment_id} not found")))
    }

    async fn set_deployment_state(
        &self,
        deployment_id: &str,
        state: DeploymentState,
    ) -> AgentResult<()> {
        self.deployment_states
            .lock()
            .unwrap()
            .push((deployment_id.to_string(), state));
        if self.fail_deployment_state.load(Ordering::SeqCst) {
            return Err(AgentError::backend("state update rejected"));
        }
        Ok(())
    }

    async fn push_deployment_logs(
        &self,
        deployment_id: &str,
        lines: Vec<String>,
    ) -> AgentResult<()> {
        self.pushed_logs
            .lock()
            .unwrap()
            .push((deployment_id.to_string(), lines));
        Ok(())
    }

    async fn report_deployment_services(
        &self,
        deployment_id: &str,
        services: &[ServiceSummary],
    ) -> AgentResult<()> {
        self.reported_services
            .lock()
            .unwrap()
            .push((deployment_id.to_string(), services.to_vec()));
        Ok(())
    }

    fn credentials(&self) -> BackendCredentials {
        BackendCredentials {
            endpoint: "https://fleet.example.com".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            insecure: false,
        }
    }
}

// Mock容器引擎
#[derive(Default)]
pub struct MockEngine {
    pub pulls: Mutex<Vec<String>>,
    pub created: Mutex<Vec<ContainerSpec>>,
    pub removed: Mutex<Vec<String>>,
    pub prunes: Mutex<Vec<PruneTarget>>,
    pub failing_prunes: Mutex<Vec<PruneTarget>>,
    pub exit_code: AtomicI64,
    pub wait_delay_ms: AtomicI64,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn pull_image(&self, image: &str) -> AgentResult<()> {
        self.pulls.lock().unwrap().push(image.to_string());
        Ok(())
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> AgentResult<String> {
        self.created.lock().unwrap().push(spec.clone());
        Ok(format!("container-{}", spec.name))
    }

    async fn wait_for_exit(&self, _container_id: &str, _timeout: Duration) -> AgentResult<i64> {
        let delay = self.wait_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        Ok(self.exit_code.load(Ordering::SeqCst))
    }

    async fn remove_container(&self, container_id: &str) -> AgentResult<()> {
        self.removed.lock().unwrap().push(container_id.to_string());
        Ok(())
    }

    async fn prune(&self, target: PruneTarget) -> AgentResult<()> {
        self.prunes.lock().unwrap().push(target);
        if self.failing_prunes.lock().unwrap().contains(&target) {
            return Err(AgentError::engine(format!("{target} prune failed")));
        }
        Ok(())
    }
}

// Mock编排后端
#[derive(Default)]
pub struct MockOrchestrator {
    pub starts: Mutex<Vec<DeploymentSpec>>,
    pub stops: Mutex<Vec<String>>,
    pub fail_start: AtomicBool,
    pub start_delay_ms: AtomicI64,
    pub log_lines: Mutex<Vec<String>>,
    pub services: Mutex<Vec<ServiceSummary>>,
}

impl MockOrchestrator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl OrchestrationBackend for MockOrchestrator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(&self, spec: &DeploymentSpec) -> AgentResult<()> {
        let delay = self.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        self.starts.lock().unwrap().push(spec.clone());
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(AgentError::orchestration("compose up failed"));
        }
        Ok(())
    }

    async fn stop(&self, project: &str) -> AgentResult<()> {
        self.stops.lock().unwrap().push(project.to_string());
        Ok(())
    }

    async fn list(&self, _project: &str) -> AgentResult<Vec<ServiceSummary>> {
        Ok(self.services.lock().unwrap().clone())
    }

    async fn logs(
        &self,
        _project: &str,
        tail: usize,
        consumer: mpsc::Sender<String>,
    ) -> AgentResult<()> {
        let lines: Vec<String> = self.log_lines.lock().unwrap().clone();
        for line in lines.into_iter().take(tail) {
            consumer
                .send(line)
                .await
                .map_err(|_| AgentError::ChannelClosed("log consumer".to_string()))?;
        }
        Ok(())
    }
}
