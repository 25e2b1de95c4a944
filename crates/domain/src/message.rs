use crate::value_objects::{MessageId, Timestamp, Username};

/// 两个用户之间的一条私聊消息
///
/// `recv` 与 `read` 只会从 `false` 变为 `true`，不会回退。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from: Username,
    pub to: Username,
    pub body: String,
    pub datetime: Timestamp,
    #[serde(default)]
    pub recv: bool,
    #[serde(default)]
    pub read: bool,
}

impl Message {
    pub fn new(
        id: MessageId,
        from: Username,
        to: Username,
        body: impl Into<String>,
        datetime: Timestamp,
    ) -> Self {
        Self {
            id,
            from,
            to,
            body: body.into(),
            datetime,
            recv: false,
            read: false,
        }
    }

    /// 标记为已接收；返回状态是否发生了变化
    pub fn mark_received(&mut self) -> bool {
        if self.recv {
            return false;
        }
        self.recv = true;
        true
    }

    /// 标记为已读；返回状态是否发生了变化
    pub fn mark_read(&mut self) -> bool {
        if self.read {
            return false;
        }
        self.read = true;
        true
    }

    /// 消息是否属于 `a` 与 `b` 之间的会话（不区分方向）
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }
}
