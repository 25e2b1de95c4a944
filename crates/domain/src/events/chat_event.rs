//! 聊天相关的领域事件
//!
//! 仓库每次成功修改状态后都会产生一个事件，事件集合是封闭的。

use crate::message::Message;
use crate::user::User;

/// 事件种类，用于按类别订阅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageCreated,
    MessageReceived,
    MessageRead,
    UserJoined,
    UserOnline,
}

/// 聊天相关的领域事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// 新消息已创建
    MessageCreated(Message),

    /// 接收方已获取消息
    MessageReceived(Message),

    /// 接收方已阅读消息
    MessageRead(Message),

    /// 新用户注册
    UserJoined(User),

    /// 用户上线或下线
    UserOnline(User),
}

impl ChatEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChatEvent::MessageCreated(_) => EventKind::MessageCreated,
            ChatEvent::MessageReceived(_) => EventKind::MessageReceived,
            ChatEvent::MessageRead(_) => EventKind::MessageRead,
            ChatEvent::UserJoined(_) => EventKind::UserJoined,
            ChatEvent::UserOnline(_) => EventKind::UserOnline,
        }
    }

    /// 事件携带的消息（仅消息类事件）
    pub fn message(&self) -> Option<&Message> {
        match self {
            ChatEvent::MessageCreated(message)
            | ChatEvent::MessageReceived(message)
            | ChatEvent::MessageRead(message) => Some(message),
            _ => None,
        }
    }

    /// 事件携带的用户（仅用户类事件）
    pub fn user(&self) -> Option<&User> {
        match self {
            ChatEvent::UserJoined(user) | ChatEvent::UserOnline(user) => Some(user),
            _ => None,
        }
    }
}
