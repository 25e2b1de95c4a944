//! 应用层实现。
//!
//! 这里提供聊天核心的两个组件：权威的内存仓库（用户与消息，附带同步事件订阅），
//! 以及会话分发器（用户名到活动连接的映射，负责把仓库事件编码为协议信封并推送）。

pub mod clock;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod observers;
pub mod repository;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SupersedePolicy;
pub use connection::{Connection, ConnectionError, ConnectionId};
pub use dispatcher::{SessionDispatcher, SessionHandle};
pub use error::ApplicationError;
pub use observers::SubscriberError;
pub use repository::ChatRepository;
