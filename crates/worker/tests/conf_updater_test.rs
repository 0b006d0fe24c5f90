mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::{within, MockBackend};
use fleet_agent_core::models::DeviceConfigFields;
use fleet_agent_core::{AgentError, WorkerConfig};
use fleet_agent_worker::components::{ConfSync, ConfigMailbox};
use fleet_agent_worker::{ConfUpdater, Worker};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn remote_fields() -> DeviceConfigFields {
    DeviceConfigFields {
        refresh_interval: Some(30),
        heartbeat_interval: Some(10),
        updated: Some("2024-05-01T12:00:00Z".to_string()),
    }
}

#[tokio::test]
async fn test_older_signal_triggers_no_fetch() {
    let backend = MockBackend::new();
    let (_tx, rx) = mpsc::channel(1);
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut updater = ConfUpdater::new(backend.clone(), rx, WorkerConfig::default())
        .with_last_update(t0);
    let (mailbox, mut subscriber) = ConfigMailbox::channel("heartbeat");
    updater.subscribe(mailbox);

    let applied = updater
        .handle_signal("2024-05-01T11:59:59Z")
        .await
        .expect("signal handling failed");
    assert!(!applied);

    let applied = updater
        .handle_signal("2024-05-01T12:00:00Z")
        .await
        .expect("signal handling failed");
    assert!(!applied);

    assert_eq!(backend.device_config_calls.load(Ordering::SeqCst), 0);
    assert!(subscriber.try_recv().is_err());
    assert_eq!(updater.last_update(), Some(t0));
}

#[tokio::test]
async fn test_newer_signal_fetches_broadcasts_and_advances() {
    let backend = MockBackend::new();
    *backend.device_config.lock().unwrap() = remote_fields();
    let (_tx, rx) = mpsc::channel(1);
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut updater = ConfUpdater::new(backend.clone(), rx, WorkerConfig::default())
        .with_last_update(t0);
    let (mailbox, mut subscriber) = ConfigMailbox::channel("heartbeat");
    updater.subscribe(mailbox);

    let applied = updater
        .handle_signal("2024-05-01T12:05:00Z")
        .await
        .expect("signal handling failed");
    assert!(applied);

    assert_eq!(backend.device_config_calls.load(Ordering::SeqCst), 1);
    let delivered = subscriber.try_recv().expect("config not delivered");
    assert_eq!(delivered.telemetry_interval_seconds, 30);
    assert_eq!(delivered.heartbeat_interval_seconds, 10);
    assert_eq!(
        updater.last_update(),
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap())
    );
    assert_eq!(updater.config(), &delivered);
}

#[tokio::test]
async fn test_first_signal_is_always_applied() {
    let backend = MockBackend::new();
    let (_tx, rx) = mpsc::channel(1);
    let mut updater = ConfUpdater::new(backend.clone(), rx, WorkerConfig::default());

    assert!(updater
        .handle_signal("2020-01-01T00:00:00Z")
        .await
        .expect("signal handling failed"));
    assert!(updater.last_update().is_some());
}

#[tokio::test]
async fn test_invalid_signal_is_rejected() {
    let backend = MockBackend::new();
    let (_tx, rx) = mpsc::channel(1);
    let mut updater = ConfUpdater::new(backend.clone(), rx, WorkerConfig::default());

    let result = updater.handle_signal("not-a-timestamp").await;
    assert!(matches!(result, Err(AgentError::InvalidTimestamp(_))));
    assert_eq!(backend.device_config_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fan_out_times_out_on_stuck_subscriber() {
    let backend = MockBackend::new();
    let (_tx, rx) = mpsc::channel(1);
    let mut updater = ConfUpdater::new(backend.clone(), rx, WorkerConfig::default())
        .with_distribution_timeout(Duration::from_millis(200));

    let (first, mut first_rx) = ConfigMailbox::channel("heartbeat");
    let (second, mut second_rx) = ConfigMailbox::channel("commissioner");
    let (stuck, _stuck_rx) = ConfigMailbox::channel("resource-cleaner");
    // 占满邮箱且从不读取
    stuck
        .deliver(WorkerConfig::default())
        .await
        .expect("prefill failed");
    updater.subscribe(first);
    updater.subscribe(stuck);
    updater.subscribe(second);

    let next = WorkerConfig {
        heartbeat_interval_seconds: 5,
        ..WorkerConfig::default()
    };
    let result = within(Duration::from_secs(2), updater.distribute_config(&next)).await;

    match result {
        Err(AgentError::DistributionTimeout { delivered, total }) => {
            assert_eq!(delivered, 2);
            assert_eq!(total, 3);
        }
        other => panic!("expected distribution timeout, got {other:?}"),
    }
    assert_eq!(first_rx.try_recv().ok(), Some(next.clone()));
    assert_eq!(second_rx.try_recv().ok(), Some(next));
}

#[tokio::test]
async fn test_failed_distribution_does_not_advance_last_update() {
    let backend = MockBackend::new();
    let (_tx, rx) = mpsc::channel(1);
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut updater = ConfUpdater::new(backend.clone(), rx, WorkerConfig::default())
        .with_last_update(t0)
        .with_distribution_timeout(Duration::from_millis(100));

    let (stuck, _stuck_rx) = ConfigMailbox::channel("job-processor");
    stuck
        .deliver(WorkerConfig::default())
        .await
        .expect("prefill failed");
    updater.subscribe(stuck);

    let result = updater.handle_signal("2024-05-01T13:00:00Z").await;
    assert!(matches!(result, Err(AgentError::DistributionTimeout { .. })));
    assert_eq!(updater.last_update(), Some(t0));
    assert_eq!(updater.config(), &WorkerConfig::default());
}

#[tokio::test]
async fn test_closed_subscriber_fails_distribution() {
    let backend = MockBackend::new();
    let (_tx, rx) = mpsc::channel(1);
    let mut updater = ConfUpdater::new(backend, rx, WorkerConfig::default());
    let (gone, gone_rx) = ConfigMailbox::channel("heartbeat");
    drop(gone_rx);
    updater.subscribe(gone);

    let result = updater.distribute_config(&WorkerConfig::default()).await;
    assert!(matches!(result, Err(AgentError::ChannelClosed(_))));
}

#[tokio::test]
async fn test_run_loop_applies_signals() {
    let backend = MockBackend::new();
    *backend.device_config.lock().unwrap() = remote_fields();
    let (conf_sync_tx, conf_sync_rx) = mpsc::channel(4);
    let mut updater = ConfUpdater::new(backend.clone(), conf_sync_rx, WorkerConfig::default());
    let (mailbox, mut subscriber) = ConfigMailbox::channel("heartbeat");
    updater.subscribe(mailbox);
    assert_eq!(updater.subscriber_count(), 1);

    let cancel = CancellationToken::new();
    let handle = updater.start(cancel.clone());

    conf_sync_tx
        .send(ConfSync::Updated("2024-05-01T12:00:00Z".to_string()))
        .await
        .unwrap();
    let delivered = within(Duration::from_secs(2), subscriber.recv())
        .await
        .expect("config not delivered");
    assert_eq!(delivered.heartbeat_interval_seconds, 10);

    cancel.cancel();
    let result = within(Duration::from_secs(2), handle).await.expect("task panicked");
    assert!(matches!(result, Err(AgentError::Cancelled)));
}

#[tokio::test]
async fn test_forced_resync_keeps_backend_clock() {
    let backend = MockBackend::new();
    *backend.device_config.lock().unwrap() = remote_fields();
    let (_tx, rx) = mpsc::channel(1);
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut updater = ConfUpdater::new(backend.clone(), rx, WorkerConfig::default())
        .with_last_update(t0);
    let (mailbox, mut subscriber) = ConfigMailbox::channel("heartbeat");
    updater.subscribe(mailbox);

    // 强制刷新即使远端时间未变化也会重新拉取
    assert!(updater
        .handle_sync(ConfSync::Force)
        .await
        .expect("forced resync failed"));
    assert_eq!(backend.device_config_calls.load(Ordering::SeqCst), 1);
    assert!(subscriber.try_recv().is_ok());
    assert_eq!(updater.last_update(), Some(t0));

    // 本地时钟超前时, 之后的真实信号仍然生效
    *backend.device_config.lock().unwrap() = DeviceConfigFields {
        heartbeat_interval: Some(20),
        ..remote_fields()
    };
    assert!(updater
        .handle_sync(ConfSync::Updated("2024-05-01T12:00:01Z".to_string()))
        .await
        .expect("signal handling failed"));
    assert_eq!(backend.device_config_calls.load(Ordering::SeqCst), 2);
    let delivered = subscriber.try_recv().expect("config not delivered");
    assert_eq!(delivered.heartbeat_interval_seconds, 20);
    assert_eq!(
        updater.last_update(),
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap())
    );
}
