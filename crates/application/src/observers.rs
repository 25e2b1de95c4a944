//! 仓库事件的订阅者列表
//!
//! 订阅者按注册顺序同步调用。单个订阅者返回错误或 panic 都只会被记录，
//! 不会阻止后续订阅者执行，也不会传播给触发事件的调用方。

use std::panic::{self, AssertUnwindSafe};

use domain::{ChatEvent, EventKind, ProtocolError};
use thiserror::Error;

/// 订阅者执行失败；永远不会返回给仓库的调用方
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("subscriber failed: {0}")]
pub struct SubscriberError(pub String);

impl SubscriberError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<ProtocolError> for SubscriberError {
    fn from(err: ProtocolError) -> Self {
        Self(err.to_string())
    }
}

pub type Observer = Box<dyn Fn(&ChatEvent) -> Result<(), SubscriberError> + Send + Sync>;

struct Subscription {
    /// `None` 表示接收所有事件
    kind: Option<EventKind>,
    callback: Observer,
}

#[derive(Default)]
pub struct Observers {
    subscriptions: Vec<Subscription>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: Option<EventKind>, callback: Observer) {
        self.subscriptions.push(Subscription { kind, callback });
    }

    /// 通知所有关心该事件的订阅者，返回失败的订阅者数量
    pub fn notify(&self, event: &ChatEvent) -> usize {
        let kind = event.kind();
        let mut failures = 0;

        for (index, subscription) in self
            .subscriptions
            .iter()
            .enumerate()
            .filter(|(_, subscription)| {
                subscription.kind.is_none() || subscription.kind == Some(kind)
            })
        {
            match panic::catch_unwind(AssertUnwindSafe(|| (subscription.callback)(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    tracing::warn!(subscriber = index, event = ?kind, error = %err, "订阅者处理事件失败");
                }
                Err(_) => {
                    failures += 1;
                    tracing::error!(subscriber = index, event = ?kind, "订阅者处理事件时 panic");
                }
            }
        }

        failures
    }
}
