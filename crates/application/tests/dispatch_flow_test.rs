//! 仓库与会话分发器协作的端到端流程测试
//!
//! 使用内存连接记录推送的帧，验证消息生命周期与在线广播。

use std::sync::{Arc, Mutex};
use std::thread;

use application::{
    ChatRepository, Connection, ConnectionError, SessionDispatcher, SupersedePolicy, SystemClock,
};
use domain::protocol::decode;
use domain::{MessageKind, Username, WireMessage};

/// 把推送的帧记录在内存中的连接
#[derive(Default)]
struct MemoryConnection {
    frames: Mutex<Vec<String>>,
    closed: Mutex<bool>,
}

impl MemoryConnection {
    fn received(&self) -> Vec<WireMessage> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|frame| decode(frame).expect("dispatcher only sends valid envelopes"))
            .collect()
    }

    fn kinds(&self) -> Vec<MessageKind> {
        self.received().iter().map(WireMessage::kind).collect()
    }

    fn clear(&self) {
        self.frames.lock().unwrap().clear();
    }
}

impl Connection for MemoryConnection {
    fn send(&self, payload: String) -> Result<(), ConnectionError> {
        if *self.closed.lock().unwrap() {
            return Err(ConnectionError::Closed);
        }
        self.frames.lock().unwrap().push(payload);
        Ok(())
    }

    fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }
}

/// 测试辅助结构：注册好 alice 与 bob 的仓库和分发器
struct ChatFixture {
    repository: Arc<ChatRepository>,
    dispatcher: SessionDispatcher,
}

impl ChatFixture {
    fn new(policy: SupersedePolicy) -> Self {
        let repository = Arc::new(ChatRepository::new(Arc::new(SystemClock)));
        let dispatcher = SessionDispatcher::new(repository.clone(), policy);
        repository
            .register_user("alice", None, "alice-hash")
            .unwrap();
        repository.register_user("bob", None, "bob-hash").unwrap();
        Self {
            repository,
            dispatcher,
        }
    }
}

#[test]
fn test_message_lifecycle_reaches_sender() {
    let fixture = ChatFixture::new(SupersedePolicy::Close);
    let alice = Arc::new(MemoryConnection::default());
    let bob = Arc::new(MemoryConnection::default());

    fixture.repository.connect_user("alice").unwrap();
    fixture.repository.connect_user("bob").unwrap();
    let _alice_session = fixture.dispatcher.accept_connection(alice.clone(), "alice");
    let _bob_session = fixture.dispatcher.accept_connection(bob.clone(), "bob");

    // 1. alice 发送消息，bob 收到 Delivery
    let message = fixture
        .repository
        .push_message("alice", "bob", "hello")
        .unwrap();
    match bob.received().as_slice() {
        [WireMessage::Delivery { message: delivered }] => {
            assert_eq!(delivered.id, message.id);
            assert_eq!(delivered.body, "hello");
            assert!(!delivered.recv);
        }
        other => panic!("unexpected frames for bob: {other:?}"),
    }

    // 2. bob 获取历史，alice 收到 Received
    fixture.repository.get_conversation("bob", "alice").unwrap();
    assert_eq!(
        alice.received(),
        vec![WireMessage::Received {
            reference: message.id,
            who: Username::parse("bob").unwrap(),
        }]
    );

    // 3. bob 标记已读，alice 收到 Read
    fixture
        .repository
        .mark_message_as_read("bob", message.id)
        .unwrap();
    assert_eq!(
        alice.received().last(),
        Some(&WireMessage::Read {
            reference: message.id,
            who: Username::parse("bob").unwrap(),
        })
    );

    // 重复操作不再产生通知
    fixture.repository.get_conversation("bob", "alice").unwrap();
    fixture
        .repository
        .mark_message_as_read("bob", message.id)
        .unwrap();
    assert_eq!(alice.kinds(), vec![MessageKind::Received, MessageKind::Read]);
    assert_eq!(bob.kinds(), vec![MessageKind::Delivery]);
}

#[test]
fn test_user_joined_broadcast_excludes_newcomer() {
    let fixture = ChatFixture::new(SupersedePolicy::Close);
    let alice = Arc::new(MemoryConnection::default());
    let bob = Arc::new(MemoryConnection::default());
    let _alice_session = fixture.dispatcher.accept_connection(alice.clone(), "alice");
    let _bob_session = fixture.dispatcher.accept_connection(bob.clone(), "bob");

    fixture
        .repository
        .register_user("carol", Some("carol.png".into()), "carol-hash")
        .unwrap();

    for connection in [&alice, &bob] {
        match connection.received().as_slice() {
            [WireMessage::UserJoined { user }] => {
                assert_eq!(user.username, "carol");
                assert_eq!(user.avatar.as_deref(), Some("carol.png"));
                assert!(user.online);
                assert_eq!(user.inbox_size, 0);
            }
            other => panic!("unexpected frames: {other:?}"),
        }
    }

    // carol 之后接入，只会收到接入之后的事件
    let carol = Arc::new(MemoryConnection::default());
    let _carol_session = fixture.dispatcher.accept_connection(carol.clone(), "carol");
    assert!(carol.received().is_empty());

    alice.clear();
    bob.clear();
    fixture.repository.disconnect_user("bob").unwrap();
    assert_eq!(alice.kinds(), vec![MessageKind::UserOnline]);
    assert_eq!(carol.kinds(), vec![MessageKind::UserOnline]);
    assert!(bob.received().is_empty());
}

#[test]
fn test_reconnect_closes_previous_connection() {
    let fixture = ChatFixture::new(SupersedePolicy::Close);
    let first = Arc::new(MemoryConnection::default());
    let second = Arc::new(MemoryConnection::default());

    let first_session = fixture.dispatcher.accept_connection(first.clone(), "bob");
    let _second_session = fixture.dispatcher.accept_connection(second.clone(), "bob");
    assert!(*first.closed.lock().unwrap());

    // 旧连接的关闭回调晚于新连接接入
    first_session.close();
    assert!(fixture.dispatcher.is_bound("bob"));

    fixture
        .repository
        .push_message("alice", "bob", "which socket?")
        .unwrap();
    assert!(first.received().is_empty());
    assert_eq!(second.kinds(), vec![MessageKind::Delivery]);
}

#[test]
fn test_reconnect_keep_open_only_unbinds() {
    let fixture = ChatFixture::new(SupersedePolicy::KeepOpen);
    let first = Arc::new(MemoryConnection::default());
    let second = Arc::new(MemoryConnection::default());

    let _first_session = fixture.dispatcher.accept_connection(first.clone(), "bob");
    let _second_session = fixture.dispatcher.accept_connection(second.clone(), "bob");
    assert!(!*first.closed.lock().unwrap());
    assert_eq!(fixture.dispatcher.len(), 1);

    fixture.repository.push_message("alice", "bob", "hi").unwrap();
    assert!(first.received().is_empty());
    assert_eq!(second.kinds(), vec![MessageKind::Delivery]);
}

#[test]
fn test_concurrent_reconnects_leave_single_binding() {
    let fixture = ChatFixture::new(SupersedePolicy::Close);
    let dispatcher = Arc::new(fixture.dispatcher);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                let connection = Arc::new(MemoryConnection::default());
                let session = dispatcher.accept_connection(connection, "bob");
                // 一半连接立即关闭，另一半保持
                if session.id().as_u128() % 2 == 0 {
                    session.close();
                    None
                } else {
                    Some(session)
                }
            })
        })
        .collect();

    let sessions: Vec<_> = handles
        .into_iter()
        .filter_map(|handle| handle.join().unwrap())
        .collect();

    assert!(dispatcher.len() <= 1);
    let current = sessions.iter().filter(|session| session.is_current()).count();
    assert_eq!(current, dispatcher.len());

    drop(sessions);
    assert!(dispatcher.is_empty());
}

#[test]
fn test_offline_recipient_still_sees_history() {
    let fixture = ChatFixture::new(SupersedePolicy::Close);
    let alice = Arc::new(MemoryConnection::default());
    let _alice_session = fixture.dispatcher.accept_connection(alice.clone(), "alice");

    let message = fixture
        .repository
        .push_message("alice", "bob", "while you were away")
        .unwrap();
    assert!(alice.received().is_empty());

    // bob 稍后接入并拉取历史，alice 收到接收确认
    let bob = Arc::new(MemoryConnection::default());
    let _bob_session = fixture.dispatcher.accept_connection(bob.clone(), "bob");
    let history = fixture.repository.get_conversation("bob", "alice").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, message.id);
    assert!(bob.received().is_empty());
    assert_eq!(alice.kinds(), vec![MessageKind::Received]);
}
