//! WebSocket 协议信封
//!
//! 每个传输帧承载一个 JSON 对象，`type` 字段决定其余字段的含义。
//! 编解码是纯函数，不持有任何状态。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;
use crate::user::User;
use crate::value_objects::{MessageId, Timestamp, Username};

/// 协议错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// 入站数据无法解析为合法信封
    #[error("malformed protocol message: {0}")]
    MalformedProtocolMessage(String),

    /// 消息种类不在协议定义的集合内
    #[error("unknown message kind: {0}")]
    UnknownMessageKind(String),

    /// 出站信封序列化失败
    #[error("failed to serialize protocol message: {0}")]
    Serialization(String),
}

impl ProtocolError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedProtocolMessage(reason.into())
    }
}

/// 信封种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Delivery,
    Received,
    Read,
    Error,
    SessionExpired,
    UserJoined,
    UserOnline,
}

impl MessageKind {
    pub const ALL: [MessageKind; 7] = [
        MessageKind::Delivery,
        MessageKind::Received,
        MessageKind::Read,
        MessageKind::Error,
        MessageKind::SessionExpired,
        MessageKind::UserJoined,
        MessageKind::UserOnline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Delivery => "Delivery",
            MessageKind::Received => "Received",
            MessageKind::Read => "Read",
            MessageKind::Error => "Error",
            MessageKind::SessionExpired => "SessionExpired",
            MessageKind::UserJoined => "UserJoined",
            MessageKind::UserOnline => "UserOnline",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownMessageKind(s.to_owned()))
    }
}

/// `UserJoined` 信封中携带的用户视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireUser {
    pub username: Username,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(rename = "lastActivity")]
    pub last_activity: Timestamp,
    pub online: bool,
    #[serde(rename = "inboxSize", default)]
    pub inbox_size: u64,
}

impl WireUser {
    pub fn from_user(user: &User, inbox_size: u64) -> Self {
        Self {
            username: user.username.clone(),
            avatar: user.avatar.clone(),
            last_activity: user.last_activity,
            online: user.online,
            inbox_size,
        }
    }
}

/// 协议信封
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    /// 推送给接收方的新消息
    Delivery { message: Message },

    /// 接收方已获取消息
    Received {
        #[serde(rename = "ref")]
        reference: MessageId,
        who: Username,
    },

    /// 接收方已阅读消息
    Read {
        #[serde(rename = "ref")]
        reference: MessageId,
        who: Username,
    },

    /// 任意一方上报的诊断错误
    Error { error: String },

    /// 接收方的身份在服务端已无法解析
    SessionExpired,

    /// 新用户注册广播
    UserJoined { user: WireUser },

    /// 在线状态变化广播
    UserOnline {
        username: Username,
        online: bool,
        #[serde(rename = "lastActivity")]
        last_activity: Timestamp,
    },
}

impl WireMessage {
    pub fn delivery(message: &Message) -> Self {
        WireMessage::Delivery {
            message: message.clone(),
        }
    }

    pub fn received(message: &Message) -> Self {
        WireMessage::Received {
            reference: message.id,
            who: message.to.clone(),
        }
    }

    pub fn read(message: &Message) -> Self {
        WireMessage::Read {
            reference: message.id,
            who: message.to.clone(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        WireMessage::Error {
            error: error.into(),
        }
    }

    pub fn session_expired() -> Self {
        WireMessage::SessionExpired
    }

    pub fn user_joined(user: &User, inbox_size: u64) -> Self {
        WireMessage::UserJoined {
            user: WireUser::from_user(user, inbox_size),
        }
    }

    pub fn user_online(user: &User) -> Self {
        WireMessage::UserOnline {
            username: user.username.clone(),
            online: user.online,
            last_activity: user.last_activity,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            WireMessage::Delivery { .. } => MessageKind::Delivery,
            WireMessage::Received { .. } => MessageKind::Received,
            WireMessage::Read { .. } => MessageKind::Read,
            WireMessage::Error { .. } => MessageKind::Error,
            WireMessage::SessionExpired => MessageKind::SessionExpired,
            WireMessage::UserJoined { .. } => MessageKind::UserJoined,
            WireMessage::UserOnline { .. } => MessageKind::UserOnline,
        }
    }

    /// serde 只检查字段是否存在，这里补充空值检查
    fn validate(self) -> Result<Self, ProtocolError> {
        let empty_field = match &self {
            WireMessage::Delivery { message } if message.body.is_empty() => {
                Some("missing 'body' in 'message'")
            }
            WireMessage::Error { error } if error.is_empty() => Some("missing 'error'"),
            _ => None,
        };

        match empty_field {
            Some(reason) => Err(ProtocolError::malformed(reason)),
            None => Ok(self),
        }
    }
}

/// 解析客户端发来的原始负载
pub fn decode(payload: &str) -> Result<WireMessage, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|err| ProtocolError::malformed(format!("invalid json: {err}")))?;
    decode_value(value)
}

/// 解析已经是 JSON 值的负载
pub fn decode_value(value: serde_json::Value) -> Result<WireMessage, ProtocolError> {
    let kind = value
        .get("type")
        .ok_or_else(|| ProtocolError::malformed("could not find 'type' in payload"))?
        .as_str()
        .ok_or_else(|| ProtocolError::malformed("'type' must be a string"))?;

    if let Err(err) = kind.parse::<MessageKind>() {
        return Err(ProtocolError::malformed(err.to_string()));
    }

    let message: WireMessage =
        serde_json::from_value(value).map_err(|err| ProtocolError::malformed(err.to_string()))?;
    message.validate()
}

/// 序列化为可发送的文本帧
pub fn encode(message: &WireMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|err| ProtocolError::Serialization(err.to_string()))
}
