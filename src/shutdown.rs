use std::io;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// Owns the root cancellation token of the agent. Every worker task receives
/// a clone (or a child) of it; cancelling it once stops them all.
#[derive(Debug, Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅关闭信号
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发关闭, 重复调用无副作用
    pub fn shutdown(&self) {
        if self.token.is_cancelled() {
            debug!("关闭已经触发过");
            return;
        }
        info!("触发系统关闭");
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits for SIGINT or SIGTERM and then triggers the shutdown. Returns
    /// early when the shutdown was triggered from elsewhere.
    pub async fn listen(&self) -> io::Result<()> {
        tokio::select! {
            _ = self.token.cancelled() => Ok(()),
            received = wait_for_shutdown_signal() => {
                received?;
                self.shutdown();
                Ok(())
            }
        }
    }
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() -> io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            received = signal::ctrl_c() => {
                received?;
                info!("收到Ctrl+C信号");
            }
            _ = terminate.recv() => info!("收到SIGTERM信号"),
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("收到Ctrl+C信号");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_cancels_token_once() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        assert!(!manager.is_shutdown());

        manager.shutdown();
        manager.shutdown();

        assert!(token.is_cancelled());
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let manager = ShutdownManager::new();
        let clone = manager.clone();
        clone.shutdown();
        assert!(manager.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_listen_returns_when_shut_down_elsewhere() {
        let manager = ShutdownManager::new();
        let listener = manager.clone();
        let handle = tokio::spawn(async move { listener.listen().await });

        manager.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("listen did not return")
            .expect("listen task panicked");
        assert!(result.is_ok());
    }
}
