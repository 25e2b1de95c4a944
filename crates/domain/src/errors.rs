//! 领域模型错误定义
//!
//! 定义了仓库操作可能返回的错误类型，失败的操作不会修改任何状态。

use thiserror::Error;

use crate::value_objects::MessageId;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 用户名已被注册
    #[error("用户已存在: {0}")]
    DuplicateUser(String),

    /// 用户不存在
    #[error("用户不存在: {0}")]
    UnknownUser(String),

    /// 消息不存在（或不属于请求者）
    #[error("消息不存在: {0}")]
    MessageNotFound(MessageId),

    /// 参数校验失败
    #[error("参数无效: {field}: {reason}")]
    InvalidArgument { field: String, reason: String },
}

impl DomainError {
    /// 创建参数校验错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 创建用户不存在错误
    pub fn unknown_user(username: impl Into<String>) -> Self {
        Self::UnknownUser(username.into())
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
