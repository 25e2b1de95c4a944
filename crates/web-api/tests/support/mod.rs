use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use application::{ChatRepository, SessionDispatcher, SupersedePolicy, SystemClock};
use axum::middleware;
use config::SessionConfig;
use domain::protocol::decode;
use domain::WireMessage;
use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use web_api::{router, trusted_identity_header, AppState, VERIFIED_USER_HEADER};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// 运行在随机端口上的测试服务器
pub struct TestServer {
    pub addr: SocketAddr,
    pub repository: Arc<ChatRepository>,
    pub dispatcher: Arc<SessionDispatcher>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start(policy: SupersedePolicy) -> Self {
        let repository = Arc::new(ChatRepository::new(Arc::new(SystemClock)));
        let dispatcher = Arc::new(SessionDispatcher::new(repository.clone(), policy));
        let state = AppState::new(dispatcher.clone(), SessionConfig::default());
        let app = router(state).layer(middleware::from_fn(trusted_identity_header));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            repository,
            dispatcher,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn register(&self, names: &[&str]) {
        for name in names {
            self.repository
                .register_user(name, None, format!("{name}-hash"))
                .expect("register user");
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/api/chat/ws", self.addr)
    }

    /// 以给定身份连接，并等待分发器完成绑定
    pub async fn connect(&self, username: &str) -> Client {
        let before = self.dispatcher.is_bound(username);
        let client = self.connect_raw(username).await;
        if !before {
            self.wait_until_bound(username).await;
        }
        client
    }

    pub async fn connect_raw(&self, username: &str) -> Client {
        let mut request = self.ws_url().into_client_request().expect("request");
        request.headers_mut().insert(
            VERIFIED_USER_HEADER,
            HeaderValue::from_str(username).expect("header"),
        );
        let (client, _) = connect_async(request).await.expect("connect websocket");
        client
    }

    pub async fn wait_until_bound(&self, username: &str) {
        timeout(FRAME_TIMEOUT, async {
            while !self.dispatcher.is_bound(username) {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection was never bound");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// 读取下一条协议信封，跳过控制帧
pub async fn next_envelope(client: &mut Client) -> WireMessage {
    timeout(FRAME_TIMEOUT, async {
        loop {
            match client.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => {
                    return decode(text.as_str()).expect("server sends valid envelopes");
                }
                Some(Ok(_)) => continue,
                other => panic!("connection ended unexpectedly: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for envelope")
}

/// 断言在短时间内没有收到任何协议信封
pub async fn assert_silent(client: &mut Client) {
    let result = timeout(Duration::from_millis(200), async {
        loop {
            match client.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => return Some(text.as_str().to_owned()),
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await;
    if let Ok(Some(text)) = result {
        panic!("unexpected envelope: {text}");
    }
}
