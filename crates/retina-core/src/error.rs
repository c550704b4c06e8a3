//! 错误定义模块

use thiserror::Error;

/// 检查分析系统统一错误类型
#[derive(Error, Debug)]
pub enum RetinaError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("影像存储错误: {0}")]
    Storage(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("资源冲突: {0}")]
    Conflict(String),

    #[error("无法处理的请求: {0}")]
    UnprocessableEntity(String),

    /// 推理服务不可用，`upstream` 保存上游返回的原始响应体
    #[error("推理服务不可用: {message}")]
    ServiceUnavailable { message: String, upstream: String },

    #[error("系统内部错误: {0}")]
    Internal(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },
}

impl RetinaError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    pub fn unprocessable(what: impl Into<String>) -> Self {
        Self::UnprocessableEntity(what.into())
    }

    pub fn service_unavailable(message: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
            upstream: upstream.into(),
        }
    }

    /// 调用方可见的简短消息，内部错误原样透出底层信息
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::UnprocessableEntity(msg)
            | Self::Internal(msg)
            | Self::Database(msg)
            | Self::Storage(msg)
            | Self::Config(msg) => msg.clone(),
            Self::ServiceUnavailable { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// 检查分析系统统一结果类型
pub type Result<T> = std::result::Result<T, RetinaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_unavailable_keeps_upstream_body() {
        let err = RetinaError::service_unavailable("inference call failed", "model not loaded");
        match &err {
            RetinaError::ServiceUnavailable { upstream, .. } => assert_eq!(upstream, "model not loaded"),
            other => panic!("unexpected variant: {:?}", other),
        }
        assert_eq!(err.public_message(), "inference call failed");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: RetinaError = io.into();
        assert!(matches!(err, RetinaError::Io(_)));
        assert!(err.public_message().contains("disk full"));
    }
}
