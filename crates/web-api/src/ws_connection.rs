use std::sync::Arc;
use std::time::Duration;

use application::{Connection, ConnectionError, SessionHandle};
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::protocol::{self, WireMessage};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::timeout;

use crate::state::AppState;

/// WebSocket 写操作命令
///
/// 数据帧经由有界队列交给发送任务；关闭请求走独立的信号，不占用队列容量。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Pong(Bytes),
    Close,
}

/// 创建一对连接与出站接收端
pub fn outbound_channel(capacity: usize) -> (ChannelConnection, OutboundReceiver) {
    let (frames_tx, frames_rx) = mpsc::channel(capacity);
    let (close_tx, close_rx) = watch::channel(false);
    let connection = ChannelConnection {
        outbound: frames_tx,
        close: Arc::new(close_tx),
    };
    let receiver = OutboundReceiver {
        frames: frames_rx,
        close: close_rx,
        close_dropped: false,
        finished: false,
    };
    (connection, receiver)
}

/// 分发器看到的连接：只负责把帧放进出站队列，从不阻塞
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    outbound: mpsc::Sender<OutboundFrame>,
    close: Arc<watch::Sender<bool>>,
}

impl ChannelConnection {
    /// 是否已经请求关闭
    pub fn is_closing(&self) -> bool {
        *self.close.borrow()
    }

    fn enqueue(&self, frame: OutboundFrame) -> Result<(), ConnectionError> {
        if self.is_closing() {
            return Err(ConnectionError::Closed);
        }
        self.outbound.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => ConnectionError::QueueFull,
            TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }

    /// 回应客户端的 ping
    pub fn pong(&self, data: Bytes) -> Result<(), ConnectionError> {
        self.enqueue(OutboundFrame::Pong(data))
    }
}

impl Connection for ChannelConnection {
    fn send(&self, payload: String) -> Result<(), ConnectionError> {
        self.enqueue(OutboundFrame::Text(payload))
    }

    fn close(&self) {
        // 没有接收端时同样记录状态
        self.close.send_replace(true);
    }
}

/// 发送任务一侧的出站接收端
///
/// 关闭请求优先于队列中积压的数据帧；交出 `Close` 之后不再产出任何帧。
#[derive(Debug)]
pub struct OutboundReceiver {
    frames: mpsc::Receiver<OutboundFrame>,
    close: watch::Receiver<bool>,
    close_dropped: bool,
    finished: bool,
}

impl OutboundReceiver {
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        if self.finished {
            return None;
        }
        loop {
            if *self.close.borrow_and_update() {
                self.finished = true;
                return Some(OutboundFrame::Close);
            }
            if self.close_dropped {
                return self.frames.recv().await;
            }
            tokio::select! {
                biased;
                changed = self.close.changed() => {
                    if changed.is_err() {
                        self.close_dropped = true;
                    }
                }
                frame = self.frames.recv() => return frame,
            }
        }
    }
}

/// 单个 WebSocket 连接
///
/// 身份已经由上游认证；这里只负责会话检查、绑定以及读写循环。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    username: String,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState, username: String) -> Self {
        Self {
            socket,
            state,
            username,
        }
    }

    /// 运行连接的主循环，直到任意一侧结束
    pub async fn run(self) {
        let Self {
            socket,
            state,
            username,
        } = self;
        let (mut sender, mut incoming) = socket.split();
        let send_timeout = state.session.send_timeout();

        // 身份在服务端已无法解析：通知客户端后关闭，不建立绑定
        if state.repository.find_user(&username).is_none() {
            tracing::warn!(username = %username, "会话已过期，拒绝连接");
            Self::expire(&mut sender, send_timeout).await;
            return;
        }

        let (connection, mut outbound_rx) = outbound_channel(state.session.outbound_capacity);
        let connection = Arc::new(connection);
        let session = state
            .dispatcher
            .accept_connection(connection.clone(), &username);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn({
            let username = username.clone();
            async move {
                while let Some(frame) = outbound_rx.recv().await {
                    let closing = frame == OutboundFrame::Close;
                    let message = match frame {
                        OutboundFrame::Text(text) => WsMessage::Text(text.into()),
                        OutboundFrame::Pong(data) => WsMessage::Pong(data),
                        OutboundFrame::Close => WsMessage::Close(None),
                    };

                    match timeout(send_timeout, sender.send(message)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            tracing::error!(username = %username, error = %err, "写入 WebSocket 失败");
                            break;
                        }
                        Err(_) => {
                            tracing::error!(username = %username, timeout_ms = send_timeout.as_millis() as u64, "写入 WebSocket 超时");
                            break;
                        }
                    }

                    if closing {
                        tracing::debug!(username = %username, "已发送关闭帧");
                        break;
                    }
                }
            }
        });

        // 接收任务：处理来自客户端的帧；任务结束时句柄被丢弃，绑定随之释放
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                if Self::handle_incoming(&session, message, &connection).is_err() {
                    break;
                }
            }
        });

        // 等待任意一个任务完成（连接断开）
        tokio::select! {
            _ = &mut send_task => {
                recv_task.abort();
            }
            _ = &mut recv_task => {
                send_task.abort();
            }
        }

        tracing::info!(username = %username, "WebSocket 连接已断开");
    }

    async fn expire(
        sender: &mut SplitSink<WebSocket, WsMessage>,
        send_timeout: Duration,
    ) {
        let payload = match protocol::encode(&WireMessage::session_expired()) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "无法编码会话过期通知");
                return;
            }
        };

        let notify = async {
            sender.send(WsMessage::Text(payload.into())).await?;
            sender.send(WsMessage::Close(None)).await
        };
        match timeout(send_timeout, notify).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(error = %err, "发送会话过期通知失败"),
            Err(_) => tracing::error!("发送会话过期通知超时"),
        }
    }

    /// 处理来自客户端的一帧；返回 `Err` 表示连接应当结束
    fn handle_incoming(
        session: &SessionHandle,
        message: WsMessage,
        connection: &ChannelConnection,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Text(text) => {
                // 解码失败已在会话中记录，连接保持打开
                let _ = session.handle_inbound(text.as_str());
            }
            WsMessage::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    let _ = session.handle_inbound(text);
                }
                Err(err) => {
                    tracing::error!(username = %session.username(), error = %err, "二进制帧不是合法的 UTF-8");
                }
            },
            WsMessage::Ping(data) => {
                tracing::debug!(username = %session.username(), "收到ping消息，发送pong回应");
                if let Err(ConnectionError::Closed) = connection.pong(data) {
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {
                tracing::debug!(username = %session.username(), "收到pong消息");
            }
            WsMessage::Close(_) => {
                tracing::info!(username = %session.username(), "WebSocket收到关闭消息");
                return Err(());
            }
        }
        Ok(())
    }
}
