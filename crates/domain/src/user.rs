use crate::value_objects::{Timestamp, Username};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: Username,
    pub avatar: Option<String>,
    #[serde(skip_serializing, default)] // 凭据哈希不暴露给客户端
    pub secret: String,
    pub online: bool,
    pub last_activity: Timestamp,
}

impl User {
    /// 注册新用户；注册即视为登录，因此初始状态为在线
    pub fn register(
        username: Username,
        avatar: Option<String>,
        secret: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            username,
            avatar,
            secret: secret.into(),
            online: true,
            last_activity: now,
        }
    }

    pub fn connect(&mut self, now: Timestamp) {
        self.online = true;
        self.last_activity = now;
    }

    pub fn disconnect(&mut self, now: Timestamp) {
        self.online = false;
        self.last_activity = now;
    }

    pub fn touch(&mut self, now: Timestamp) {
        self.last_activity = now;
    }
}
