use thiserror::Error;
use uuid::Uuid;

/// 单个连接在分发器中的标识，用于区分同一用户的新旧连接
pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    QueueFull,
    #[error("transport error: {0}")]
    Transport(String),
}

/// 面向消息的双向连接的出站一侧
///
/// `send` 不得阻塞：实现应把负载放入有界队列，由传输层在超时约束下写出。
pub trait Connection: Send + Sync {
    fn send(&self, payload: String) -> Result<(), ConnectionError>;

    /// 请求关闭连接；对已关闭的连接调用应当无副作用
    fn close(&self);
}
