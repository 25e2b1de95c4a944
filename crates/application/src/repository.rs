//! 权威的内存仓库
//!
//! 持有全部用户与消息。每个成功的状态变更都会在同一临界区内同步通知订阅者，
//! 因此事件顺序与变更顺序一致；失败的变更不修改状态，也不产生事件。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use domain::{ChatEvent, DomainError, EventKind, Message, MessageId, User, Username};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::observers::{Observers, SubscriberError};

#[derive(Default)]
struct RepositoryState {
    /// 按用户名排序，`list_users` 直接按此顺序返回
    users: BTreeMap<Username, User>,
    /// 按插入顺序保存
    messages: Vec<Message>,
    message_index: HashMap<MessageId, usize>,
}

impl RepositoryState {
    fn require_user(&self, username: &str) -> Result<&User, DomainError> {
        self.users
            .get(username)
            .ok_or_else(|| DomainError::unknown_user(username))
    }

    fn require_user_mut(&mut self, username: &str) -> Result<&mut User, DomainError> {
        self.users
            .get_mut(username)
            .ok_or_else(|| DomainError::unknown_user(username))
    }
}

pub struct ChatRepository {
    state: Mutex<RepositoryState>,
    observers: RwLock<Observers>,
    clock: Arc<dyn Clock>,
}

impl ChatRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(RepositoryState::default()),
            observers: RwLock::new(Observers::new()),
            clock,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RepositoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 必须在持有状态锁时调用，保证事件顺序与变更顺序一致
    fn notify(&self, event: ChatEvent) {
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        observers.notify(&event);
    }

    fn push_observer(
        &self,
        kind: Option<EventKind>,
        callback: Box<dyn Fn(&ChatEvent) -> Result<(), SubscriberError> + Send + Sync>,
    ) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(kind, callback);
    }

    // 订阅

    /// 订阅全部事件
    ///
    /// 回调在触发变更的线程上同步执行，执行时仓库的状态锁与订阅者锁都被持有。
    /// 回调内不得调用本仓库的任何方法（包括 `subscribe*`），否则会死锁。
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&ChatEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.push_observer(None, Box::new(callback));
    }

    fn subscribe_message_kind<F>(&self, kind: EventKind, callback: F)
    where
        F: Fn(&Message) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.push_observer(
            Some(kind),
            Box::new(move |event| match event.message() {
                Some(message) => callback(message),
                None => Ok(()),
            }),
        );
    }

    fn subscribe_user_kind<F>(&self, kind: EventKind, callback: F)
    where
        F: Fn(&User) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.push_observer(
            Some(kind),
            Box::new(move |event| match event.user() {
                Some(user) => callback(user),
                None => Ok(()),
            }),
        );
    }

    /// 订阅新消息事件
    ///
    /// 与 [`ChatRepository::subscribe`] 相同：回调内不得回调本仓库，否则会死锁。
    pub fn subscribe_message<F>(&self, callback: F)
    where
        F: Fn(&Message) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribe_message_kind(EventKind::MessageCreated, callback);
    }

    /// 订阅消息已接收事件
    ///
    /// 与 [`ChatRepository::subscribe`] 相同：回调内不得回调本仓库，否则会死锁。
    pub fn subscribe_received<F>(&self, callback: F)
    where
        F: Fn(&Message) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribe_message_kind(EventKind::MessageReceived, callback);
    }

    /// 订阅消息已读事件
    ///
    /// 与 [`ChatRepository::subscribe`] 相同：回调内不得回调本仓库，否则会死锁。
    pub fn subscribe_read<F>(&self, callback: F)
    where
        F: Fn(&Message) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribe_message_kind(EventKind::MessageRead, callback);
    }

    /// 订阅新用户注册事件
    ///
    /// 与 [`ChatRepository::subscribe`] 相同：回调内不得回调本仓库，否则会死锁。
    pub fn subscribe_user_joined<F>(&self, callback: F)
    where
        F: Fn(&User) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribe_user_kind(EventKind::UserJoined, callback);
    }

    /// 订阅在线状态变化事件
    ///
    /// 与 [`ChatRepository::subscribe`] 相同：回调内不得回调本仓库，否则会死锁。
    pub fn subscribe_user_online<F>(&self, callback: F)
    where
        F: Fn(&User) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribe_user_kind(EventKind::UserOnline, callback);
    }

    // 用户

    /// 注册新用户；用户名已存在时失败
    pub fn register_user(
        &self,
        username: &str,
        avatar: Option<String>,
        secret: impl Into<String>,
    ) -> Result<User, ApplicationError> {
        let username = Username::parse(username)?;
        let mut state = self.lock_state();

        if state.users.contains_key(&username) {
            return Err(DomainError::DuplicateUser(username.to_string()).into());
        }

        let user = User::register(username.clone(), avatar, secret, self.clock.now());
        state.users.insert(username, user.clone());

        tracing::info!(username = %user.username, "注册新用户");
        self.notify(ChatEvent::UserJoined(user.clone()));
        Ok(user)
    }

    /// 标记用户上线
    pub fn connect_user(&self, username: &str) -> Result<User, ApplicationError> {
        self.set_presence(username, true)
    }

    /// 标记用户下线
    pub fn disconnect_user(&self, username: &str) -> Result<User, ApplicationError> {
        self.set_presence(username, false)
    }

    fn set_presence(&self, username: &str, online: bool) -> Result<User, ApplicationError> {
        let now = self.clock.now();
        let mut state = self.lock_state();
        let user = state.require_user_mut(username)?;

        if online {
            user.connect(now);
        } else {
            user.disconnect(now);
        }
        let user = user.clone();

        tracing::debug!(username = %user.username, online, "用户在线状态变化");
        self.notify(ChatEvent::UserOnline(user.clone()));
        Ok(user)
    }

    /// 按用户名升序返回用户；`online` 为 `Some` 时按在线状态过滤
    pub fn list_users(&self, online: Option<bool>) -> Vec<User> {
        self.lock_state()
            .users
            .values()
            .filter(|user| online.map_or(true, |online| user.online == online))
            .cloned()
            .collect()
    }

    /// 精确匹配查找用户
    pub fn find_user(&self, username: &str) -> Option<User> {
        self.lock_state().users.get(username).cloned()
    }

    // 消息

    /// 创建一条新消息；发送方与接收方都必须存在
    pub fn push_message(
        &self,
        sender: &str,
        recipient: &str,
        body: impl Into<String>,
    ) -> Result<Message, ApplicationError> {
        let body = body.into();
        if body.is_empty() {
            return Err(DomainError::invalid_argument("body", "cannot be empty").into());
        }

        let now = self.clock.now();
        let mut state = self.lock_state();
        let from = state.require_user(sender)?.username.clone();
        let to = state.require_user(recipient)?.username.clone();

        let message = Message::new(MessageId::generate(), from, to, body, now);
        state.require_user_mut(sender)?.touch(now);

        let index = state.messages.len();
        state.message_index.insert(message.id, index);
        state.messages.push(message.clone());

        tracing::info!(
            message_id = %message.id,
            from = %message.from,
            to = %message.to,
            "新消息已创建"
        );
        self.notify(ChatEvent::MessageCreated(message.clone()));
        Ok(message)
    }

    /// 返回 `username` 与 `other` 之间的会话，按时间升序
    ///
    /// 副作用：会话中发给 `username` 且尚未接收的消息会被标记为已接收，
    /// 每条消息产生一次 `MessageReceived` 事件。`username` 自己发出的消息不受影响。
    pub fn get_conversation(
        &self,
        username: &str,
        other: &str,
    ) -> Result<Vec<Message>, ApplicationError> {
        let mut state = self.lock_state();
        state.require_user(username)?;
        state.require_user(other)?;

        let mut conversation = Vec::new();
        for index in 0..state.messages.len() {
            let message = &mut state.messages[index];
            if !message.is_between(username, other) {
                continue;
            }
            if message.to == username && message.mark_received() {
                tracing::debug!(message_id = %message.id, recipient = %username, "获取会话时确认接收");
                let received = message.clone();
                conversation.push(received.clone());
                self.notify(ChatEvent::MessageReceived(received));
            } else {
                conversation.push(message.clone());
            }
        }

        // 稳定排序：时间相同的消息保持插入顺序
        conversation.sort_by_key(|message| message.datetime);
        Ok(conversation)
    }

    /// `other` 发给 `username` 的未读消息数量
    ///
    /// 基于 `get_conversation` 实现，因此同样会确认接收。
    pub fn get_inbox_size(&self, username: &str, other: &str) -> Result<usize, ApplicationError> {
        let conversation = self.get_conversation(username, other)?;
        Ok(conversation
            .iter()
            .filter(|message| message.from == other && message.to == username && !message.read)
            .count())
    }

    /// 由接收方把消息标记为已读；消息不存在或不是发给 `requester` 的都视为不存在
    pub fn mark_message_as_read(
        &self,
        requester: &str,
        id: MessageId,
    ) -> Result<Message, ApplicationError> {
        let mut state = self.lock_state();
        let index = state
            .message_index
            .get(&id)
            .copied()
            .filter(|&index| state.messages[index].to == requester)
            .ok_or(DomainError::MessageNotFound(id))?;

        let message = &mut state.messages[index];
        if !message.mark_read() {
            return Ok(message.clone());
        }

        let message = message.clone();
        tracing::debug!(message_id = %id, reader = %requester, "消息已读");
        self.notify(ChatEvent::MessageRead(message.clone()));
        Ok(message)
    }

    /// 显式确认接收
    pub fn mark_message_as_received(&self, id: MessageId) -> Result<Message, ApplicationError> {
        let mut state = self.lock_state();
        let index = state
            .message_index
            .get(&id)
            .copied()
            .ok_or(DomainError::MessageNotFound(id))?;

        let message = &mut state.messages[index];
        if !message.mark_received() {
            return Ok(message.clone());
        }

        let message = message.clone();
        tracing::debug!(message_id = %id, "消息已接收");
        self.notify(ChatEvent::MessageReceived(message.clone()));
        Ok(message)
    }

    /// 根据 ID 查找消息
    pub fn find_message(&self, id: MessageId) -> Option<Message> {
        let state = self.lock_state();
        state
            .message_index
            .get(&id)
            .map(|&index| state.messages[index].clone())
    }
}
