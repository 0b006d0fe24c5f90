mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{wait_until, within, MockBackend, MockEngine};
use fleet_agent_core::models::{JobResource, JobState};
use fleet_agent_core::{AgentError, AgentResult, BackendClient, WorkerConfig};
use fleet_agent_worker::components::{default_actions, ConfSync, LegacyJobRunner};
use fleet_agent_worker::{
    DeploymentJob, InMemoryJobRegistry, JobProcessor, JobRegistry, Worker,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(3);

struct Harness {
    backend: Arc<MockBackend>,
    engine: Arc<MockEngine>,
    registry: Arc<dyn JobRegistry>,
    job_tx: mpsc::Sender<String>,
    deploy_rx: mpsc::Receiver<DeploymentJob>,
    conf_sync_rx: mpsc::Receiver<ConfSync>,
    cancel: CancellationToken,
    handle: JoinHandle<AgentResult<()>>,
}

fn start_processor(legacy_jobs_enabled: bool) -> Harness {
    start_with_grace(legacy_jobs_enabled, Duration::from_millis(500))
}

fn start_with_grace(legacy_jobs_enabled: bool, grace: Duration) -> Harness {
    let backend = MockBackend::new();
    let engine = MockEngine::new();
    let registry = InMemoryJobRegistry::shared();
    let (job_tx, job_rx) = mpsc::channel(16);
    let (deploy_tx, deploy_rx) = mpsc::channel(16);
    let (conf_sync_tx, conf_sync_rx) = mpsc::channel(16);

    let config = WorkerConfig {
        legacy_jobs_enabled,
        legacy_job_image: "fleet/job-engine-lite:test".to_string(),
        ..WorkerConfig::default()
    };
    let processor = JobProcessor::new(
        backend.clone(),
        Arc::clone(&registry),
        default_actions(engine.clone(), "alpine:3", conf_sync_tx),
        LegacyJobRunner::new(engine.clone(), backend.credentials()),
        job_rx,
        deploy_tx,
        config,
        Duration::from_secs(5),
    )
    .with_shutdown_grace(grace);
    assert_eq!(processor.in_flight(), 0);

    let cancel = CancellationToken::new();
    let handle = processor.start(cancel.clone());

    Harness {
        backend,
        engine,
        registry,
        job_tx,
        deploy_rx,
        conf_sync_rx,
        cancel,
        handle,
    }
}

#[tokio::test]
async fn test_unsupported_job_fails_without_container_when_legacy_disabled() {
    let h = start_processor(false);
    h.backend.add_job(JobResource::new("job/1", "dct_check"));

    h.job_tx.send("job/1".to_string()).await.unwrap();

    assert!(
        wait_until(WAIT, || h.backend.final_job_state("job/1") == Some(JobState::Failed)).await
    );
    assert_eq!(h.engine.created_count(), 0);
    assert!(!h.backend.job_states_for("job/1").contains(&JobState::Running));
    assert!(h
        .backend
        .job_message("job/1")
        .unwrap_or_default()
        .contains("dct_check"));
    assert!(wait_until(WAIT, || h.registry.is_empty()).await);
    h.cancel.cancel();
}

#[tokio::test]
async fn test_legacy_job_success_mirrors_exit_code_zero() {
    let h = start_processor(true);
    h.backend.add_job(JobResource::new("job/2", "dct_check"));

    h.job_tx.send("job/2".to_string()).await.unwrap();

    assert!(
        wait_until(WAIT, || h.backend.final_job_state("job/2") == Some(JobState::Success)).await
    );
    let created = h.engine.created.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].image, "fleet/job-engine-lite:test");
    assert!(created[0].command.windows(2).any(|w| w[0] == "--job-id" && w[1] == "job/2"));
    assert!(created[0].command.contains(&"secret".to_string()));
    assert_eq!(h.engine.removed.lock().unwrap().len(), 1);
    assert!(wait_until(WAIT, || h.registry.is_empty()).await);
    h.cancel.cancel();
}

#[tokio::test]
async fn test_legacy_job_nonzero_exit_fails() {
    let h = start_processor(true);
    h.engine.exit_code.store(3, Ordering::SeqCst);
    h.backend.add_job(JobResource::new("job/3", "dct_check"));

    h.job_tx.send("job/3".to_string()).await.unwrap();

    assert!(
        wait_until(WAIT, || h.backend.final_job_state("job/3") == Some(JobState::Failed)).await
    );
    assert_eq!(h.engine.created_count(), 1);
    assert!(h.backend.job_message("job/3").unwrap_or_default().contains('3'));
    h.cancel.cancel();
}

#[tokio::test]
async fn test_duplicate_delivery_while_in_flight_is_dropped() {
    let h = start_processor(true);
    h.engine.wait_delay_ms.store(300, Ordering::SeqCst);
    h.backend.add_job(JobResource::new("job/4", "dct_check"));

    h.job_tx.send("job/4".to_string()).await.unwrap();
    assert!(wait_until(WAIT, || h.registry.exists("job/4")).await);
    h.job_tx.send("job/4".to_string()).await.unwrap();

    assert!(
        wait_until(WAIT, || h.backend.final_job_state("job/4") == Some(JobState::Success)).await
    );
    assert_eq!(h.backend.job_fetches.load(Ordering::SeqCst), 1);
    assert_eq!(h.engine.created_count(), 1);

    // 完成后同一任务可以再次被接收
    assert!(wait_until(WAIT, || h.registry.is_empty()).await);
    h.job_tx.send("job/4".to_string()).await.unwrap();
    assert!(wait_until(WAIT, || h.engine.created_count() == 2).await);
    h.cancel.cancel();
}

#[tokio::test]
async fn test_resync_action_signals_conf_updater() {
    let mut h = start_processor(false);
    h.backend
        .add_job(JobResource::new("job/5", "resync_configuration"));

    h.job_tx.send("job/5".to_string()).await.unwrap();

    let signal = within(WAIT, h.conf_sync_rx.recv()).await;
    assert_eq!(signal, Some(ConfSync::Force));
    assert!(
        wait_until(WAIT, || h.backend.final_job_state("job/5") == Some(JobState::Success)).await
    );
    assert_eq!(
        h.backend.job_states_for("job/5"),
        vec![JobState::Running, JobState::Success]
    );
    h.cancel.cancel();
}

#[tokio::test]
async fn test_reboot_runs_privileged_helper() {
    let h = start_processor(false);
    h.backend.add_job(JobResource::new("job/6", "reboot"));

    h.job_tx.send("job/6".to_string()).await.unwrap();

    assert!(
        wait_until(WAIT, || h.backend.final_job_state("job/6") == Some(JobState::Success)).await
    );
    let created = h.engine.created.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert!(created[0].privileged);
    assert_eq!(created[0].image, "alpine:3");
    h.cancel.cancel();
}

#[tokio::test]
async fn test_deployment_job_is_forwarded_with_its_admission() {
    let mut h = start_processor(false);
    h.backend.add_job(
        JobResource::new("job/7", "start_deployment").with_target("deployment/abc"),
    );

    h.job_tx.send("job/7".to_string()).await.unwrap();

    let forwarded = within(WAIT, h.deploy_rx.recv())
        .await
        .expect("deployment job not forwarded");
    assert_eq!(forwarded.job.id, "job/7");
    assert_eq!(forwarded.guard.job_id(), "job/7");
    assert!(h.registry.exists("job/7"));
    assert!(h.backend.job_states_for("job/7").is_empty());

    drop(forwarded);
    assert!(!h.registry.exists("job/7"));
    h.cancel.cancel();
}

#[tokio::test]
async fn test_unknown_job_is_not_admitted() {
    let h = start_processor(true);

    h.job_tx.send("job/404".to_string()).await.unwrap();

    assert!(wait_until(WAIT, || h.backend.job_fetches.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.registry.is_empty());
    assert_eq!(h.engine.created_count(), 0);
    h.cancel.cancel();
}

#[tokio::test]
async fn test_cancel_fails_job_still_running_after_grace() {
    let h = start_with_grace(true, Duration::from_millis(100));
    h.engine.wait_delay_ms.store(10_000, Ordering::SeqCst);
    h.backend.add_job(JobResource::new("job/8", "dct_check"));

    h.job_tx.send("job/8".to_string()).await.unwrap();
    assert!(
        wait_until(WAIT, || h.backend.job_states_for("job/8") == vec![JobState::Running]).await
    );

    h.cancel.cancel();
    let result = within(WAIT, h.handle).await.expect("task panicked");
    assert!(matches!(result, Err(AgentError::Cancelled)));

    assert_eq!(
        h.backend.job_states_for("job/8"),
        vec![JobState::Running, JobState::Failed]
    );
    // 取消后容器仍被清理
    assert_eq!(h.engine.removed.lock().unwrap().len(), 1);
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_cancel_waits_for_job_within_grace() {
    let h = start_with_grace(true, Duration::from_secs(2));
    h.engine.wait_delay_ms.store(200, Ordering::SeqCst);
    h.backend.add_job(JobResource::new("job/9", "dct_check"));

    h.job_tx.send("job/9".to_string()).await.unwrap();
    assert!(wait_until(WAIT, || h.registry.exists("job/9")).await);

    h.cancel.cancel();
    let result = within(WAIT, h.handle).await.expect("task panicked");
    assert!(matches!(result, Err(AgentError::Cancelled)));

    assert_eq!(
        h.backend.job_states_for("job/9"),
        vec![JobState::Running, JobState::Success]
    );
    assert!(h.registry.is_empty());
}
