//! Web API 层。
//!
//! 提供 Axum 路由与 WebSocket 传输适配：把已通过认证的连接交给会话分发器，
//! 并在有界写超时内把分发器推送的帧写回 socket。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{trusted_identity_header, VerifiedUser, VERIFIED_USER_HEADER};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
pub use ws_connection::{outbound_channel, ChannelConnection, OutboundFrame, OutboundReceiver};
