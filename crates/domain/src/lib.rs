//! 聊天核心领域模型
//!
//! 包含用户、消息、领域事件以及 WebSocket 协议信封的定义与编解码。

pub mod errors;
pub mod events;
pub mod message;
pub mod protocol;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use message::Message;
pub use protocol::{MessageKind, ProtocolError, WireMessage, WireUser};
pub use user::User;
pub use value_objects::{MessageId, Timestamp, Username};
