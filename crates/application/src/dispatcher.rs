//! 会话分发器
//!
//! 维护用户名到当前活动连接的绑定，每个用户名至多一个绑定。
//! 构造时向仓库订阅全部事件种类，把事件编码为协议信封后推送给相关连接；
//! 接收方没有绑定时直接丢弃，消息仍可通过会话历史获取。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use config::SupersedePolicy;
use domain::protocol::{self, ProtocolError, WireMessage};
use domain::User;
use uuid::Uuid;

use crate::connection::{Connection, ConnectionId};
use crate::observers::SubscriberError;
use crate::repository::ChatRepository;

struct Binding {
    id: ConnectionId,
    connection: Arc<dyn Connection>,
}

/// 用户名到连接的绑定表
///
/// 仓库的订阅回调只持有这张表，不持有分发器本身。
struct SessionRegistry {
    bindings: Mutex<HashMap<String, Binding>>,
    policy: SupersedePolicy,
}

impl SessionRegistry {
    fn new(policy: SupersedePolicy) -> Self {
        Self {
            bindings: Mutex::new(HashMap::new()),
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Binding>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 插入或替换绑定，返回被替换的旧绑定
    fn bind(
        &self,
        username: &str,
        connection: Arc<dyn Connection>,
    ) -> (ConnectionId, Option<Binding>) {
        let id = Uuid::new_v4();
        let previous = self
            .lock()
            .insert(username.to_owned(), Binding { id, connection });
        (id, previous)
    }

    /// 仅当 `id` 仍是当前绑定时才移除
    fn release(&self, username: &str, id: ConnectionId) -> bool {
        let mut bindings = self.lock();
        match bindings.get(username) {
            Some(binding) if binding.id == id => {
                bindings.remove(username);
                true
            }
            _ => false,
        }
    }

    fn connection_for(&self, username: &str) -> Option<Arc<dyn Connection>> {
        self.lock()
            .get(username)
            .map(|binding| binding.connection.clone())
    }

    fn others(&self, excluded: &str) -> Vec<(String, Arc<dyn Connection>)> {
        self.lock()
            .iter()
            .filter(|(username, _)| username.as_str() != excluded)
            .map(|(username, binding)| (username.clone(), binding.connection.clone()))
            .collect()
    }

    /// 发给单个用户；未绑定时丢弃
    fn send_to(&self, username: &str, message: &WireMessage) -> Result<(), SubscriberError> {
        let Some(connection) = self.connection_for(username) else {
            tracing::debug!(username, kind = %message.kind(), "用户没有活动连接，丢弃通知");
            return Ok(());
        };

        let payload = protocol::encode(message)?;
        if let Err(err) = connection.send(payload) {
            tracing::error!(username, kind = %message.kind(), error = %err, "发送通知失败");
            return Ok(());
        }
        tracing::info!(username, kind = %message.kind(), "通知已分发");
        Ok(())
    }

    /// 广播给除 `subject` 以外的所有已绑定用户
    fn broadcast_except(&self, subject: &str, message: &WireMessage) -> Result<(), SubscriberError> {
        let payload = protocol::encode(message)?;
        tracing::info!(subject, kind = %message.kind(), "广播用户状态");

        for (username, connection) in self.others(subject) {
            tracing::debug!(recipient = %username, subject, kind = %message.kind(), "通知用户");
            if let Err(err) = connection.send(payload.clone()) {
                tracing::error!(recipient = %username, error = %err, "发送广播失败");
            }
        }
        Ok(())
    }
}

pub struct SessionDispatcher {
    repository: Arc<ChatRepository>,
    registry: Arc<SessionRegistry>,
}

impl SessionDispatcher {
    /// 创建分发器并立即向仓库订阅事件
    pub fn new(repository: Arc<ChatRepository>, policy: SupersedePolicy) -> Self {
        let registry = Arc::new(SessionRegistry::new(policy));

        let sessions = registry.clone();
        repository.subscribe_message(move |message| {
            sessions.send_to(message.to.as_str(), &WireMessage::delivery(message))
        });

        let sessions = registry.clone();
        repository.subscribe_received(move |message| {
            sessions.send_to(message.from.as_str(), &WireMessage::received(message))
        });

        let sessions = registry.clone();
        repository.subscribe_read(move |message| {
            sessions.send_to(message.from.as_str(), &WireMessage::read(message))
        });

        let sessions = registry.clone();
        repository.subscribe_user_joined(move |user: &User| {
            // 刚注册的用户还没有发出任何消息
            sessions.broadcast_except(user.username.as_str(), &WireMessage::user_joined(user, 0))
        });

        let sessions = registry.clone();
        repository.subscribe_user_online(move |user: &User| {
            sessions.broadcast_except(user.username.as_str(), &WireMessage::user_online(user))
        });

        tracing::info!(policy = ?policy, "会话分发器已启动");
        Self {
            repository,
            registry,
        }
    }

    pub fn repository(&self) -> &Arc<ChatRepository> {
        &self.repository
    }

    /// 绑定一个已通过认证的连接
    ///
    /// 同一用户名已有绑定时直接替换；按替换策略决定是否关闭旧连接。
    pub fn accept_connection(
        &self,
        connection: Arc<dyn Connection>,
        username: &str,
    ) -> SessionHandle {
        let (id, previous) = self.registry.bind(username, connection);
        tracing::info!(username, connection_id = %id, "新的会话连接");

        if let Some(previous) = previous {
            match self.registry.policy {
                SupersedePolicy::Close => {
                    tracing::info!(username, replaced = %previous.id, "关闭被替换的旧连接");
                    previous.connection.close();
                }
                SupersedePolicy::KeepOpen => {
                    tracing::debug!(username, replaced = %previous.id, "旧连接已解除绑定");
                }
            }
        }

        SessionHandle {
            registry: self.registry.clone(),
            username: username.to_owned(),
            id,
        }
    }

    pub fn is_bound(&self, username: &str) -> bool {
        self.registry.lock().contains_key(username)
    }

    /// 已绑定的用户名，按字典序
    pub fn bound_users(&self) -> Vec<String> {
        let mut users: Vec<_> = self.registry.lock().keys().cloned().collect();
        users.sort();
        users
    }

    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    /// 关闭所有连接并清空绑定
    pub fn shutdown(&self) {
        tracing::info!("正在停止会话分发器");
        let bindings: Vec<_> = self.registry.lock().drain().collect();
        for (username, binding) in bindings {
            tracing::debug!(username = %username, "关闭连接");
            binding.connection.close();
        }
        tracing::info!("会话分发器已停止");
    }
}

/// 单个已接入连接的句柄
///
/// 传输层在连接关闭时丢弃句柄即可解除绑定；若该用户已被新连接替换，则不会影响新绑定。
pub struct SessionHandle {
    registry: Arc<SessionRegistry>,
    username: String,
    id: ConnectionId,
}

impl SessionHandle {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// 该连接是否仍是用户的当前绑定
    pub fn is_current(&self) -> bool {
        self.registry
            .lock()
            .get(&self.username)
            .is_some_and(|binding| binding.id == self.id)
    }

    /// 处理客户端发来的一帧
    ///
    /// 客户端到服务端方向只做诊断：解码失败只记录日志，不回复错误。
    pub fn handle_inbound(&self, payload: &str) -> Result<WireMessage, ProtocolError> {
        let message = protocol::decode(payload).map_err(|err| {
            tracing::error!(username = %self.username, error = %err, "无法解析客户端消息");
            err
        })?;
        tracing::debug!(username = %self.username, kind = %message.kind(), "收到客户端消息");

        match &message {
            WireMessage::Error { error } => {
                tracing::warn!(username = %self.username, error = %error, "客户端报告错误");
            }
            WireMessage::Delivery { message: delivery } if delivery.from == delivery.to => {
                tracing::error!(
                    username = %self.username,
                    message_id = %delivery.id,
                    "拒绝发给自己的消息"
                );
                return Err(ProtocolError::malformed("sender and recipient must differ"));
            }
            other => {
                tracing::debug!(kind = %other.kind(), "无需处理的客户端消息");
            }
        }
        Ok(message)
    }

    /// 关闭会话，等价于丢弃句柄
    pub fn close(self) {}
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.registry.release(&self.username, self.id) {
            tracing::info!(username = %self.username, connection_id = %self.id, "客户端离开聊天");
        } else {
            tracing::debug!(username = %self.username, connection_id = %self.id, "旧连接关闭，绑定已属于新连接");
        }
    }
}
