use thiserror::Error;

/// 代理错误类型定义
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("后端调用错误: {0}")]
    Backend(String),

    #[error("容器引擎错误: {0}")]
    ContainerEngine(String),

    #[error("编排后端错误: {0}")]
    Orchestration(String),

    #[error("不支持的任务类型: {0}")]
    UnsupportedJob(String),

    #[error("未实现: {0}")]
    NotImplemented(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("数据验证失败: {0}")]
    Validation(String),

    #[error("配置分发超时: 已送达 {delivered}/{total}")]
    DistributionTimeout { delivered: usize, total: usize },

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("无效的时间戳: {0}")]
    InvalidTimestamp(String),

    #[error("通道已关闭: {0}")]
    ChannelClosed(String),

    #[error("资源清理失败: {0}")]
    Cleanup(String),

    #[error("已取消")]
    Cancelled,

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type AgentResult<T> = std::result::Result<T, AgentError>;

impl AgentError {
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::Backend(msg.into())
    }
    pub fn engine<S: Into<String>>(msg: S) -> Self {
        Self::ContainerEngine(msg.into())
    }
    pub fn orchestration<S: Into<String>>(msg: S) -> Self {
        Self::Orchestration(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Root cancellation is the only expected way for a task to end.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_cancelled()
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentError::Backend(_)
                | AgentError::ContainerEngine(_)
                | AgentError::Orchestration(_)
                | AgentError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AgentError {
    fn from(err: config::ConfigError) -> Self {
        AgentError::Configuration(err.to_string())
    }
}

impl From<chrono::ParseError> for AgentError {
    fn from(err: chrono::ParseError) -> Self {
        AgentError::InvalidTimestamp(err.to_string())
    }
}
