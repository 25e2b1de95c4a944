//! 主应用程序入口
//!
//! 加载配置，构建仓库与会话分发器，启动 Axum WebSocket 服务。

use std::sync::Arc;

use application::{ChatRepository, SessionDispatcher, SystemClock};
use axum::middleware;
use config::AppConfig;
use tracing_subscriber::EnvFilter;
use web_api::{router, trusted_identity_header, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // 初始化日志：RUST_LOG 优先于配置文件
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let repository = Arc::new(ChatRepository::new(Arc::new(SystemClock)));
    let dispatcher = Arc::new(SessionDispatcher::new(
        repository,
        config.session.supersede_policy,
    ));

    let state = AppState::new(dispatcher.clone(), config.session.clone());
    let app = router(state).layer(middleware::from_fn(trusted_identity_header));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("聊天服务启动在 ws://{}/api/chat/ws", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(dispatcher))
        .await?;

    tracing::info!("服务已停止");
    Ok(())
}

/// 等待 ctrl-c，随后关闭所有 WebSocket 连接
async fn shutdown_signal(dispatcher: Arc<SessionDispatcher>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，正在关闭");
    dispatcher.shutdown();
}
