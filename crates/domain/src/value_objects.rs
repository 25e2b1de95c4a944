use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

/// 用户名最大长度
pub const MAX_USERNAME_LEN: usize = 50;

/// 消息唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// 生成新的随机消息ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<MessageId> for Uuid {
    fn from(value: MessageId) -> Self {
        value.0
    }
}

impl FromStr for MessageId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| DomainError::invalid_argument("message_id", "not a valid uuid"))
    }
}

/// 经过验证的用户名。
///
/// 用户名是用户的唯一键，创建后不可修改。反序列化时同样经过校验。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl TryFrom<String> for Username {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

impl Username {
    /// 校验用户名；首尾带空白的名字直接拒绝，不做规整
    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::invalid_argument("username", "cannot be empty"));
        }
        if value.trim() != value {
            return Err(DomainError::invalid_argument(
                "username",
                "must not start or end with whitespace",
            ));
        }
        if value.chars().count() > MAX_USERNAME_LEN {
            return Err(DomainError::invalid_argument("username", "too long"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Username {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Username {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Username {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_with_surrounding_whitespace_is_rejected() {
        for raw in ["  alice ", " alice", "alice\t"] {
            let err = Username::parse(raw).unwrap_err();
            assert_eq!(
                err,
                DomainError::invalid_argument("username", "must not start or end with whitespace")
            );
        }
        assert_eq!(Username::parse("al ice").unwrap().as_str(), "al ice");
    }

    #[test]
    fn username_rejects_empty_and_long_values() {
        assert!(Username::parse("   ").is_err());
        assert!(Username::parse("a".repeat(MAX_USERNAME_LEN + 1)).is_err());
        assert!(Username::parse("a".repeat(MAX_USERNAME_LEN)).is_ok());
    }

    #[test]
    fn message_id_parses_uuid_strings() {
        let id = MessageId::generate();
        let parsed: MessageId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<MessageId>().is_err());
    }
}
