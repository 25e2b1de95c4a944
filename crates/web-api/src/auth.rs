//! 已认证身份的接入点
//!
//! 凭证的签发与校验由上游网关完成，这里只读取网关写入的用户名。
//! 服务必须部署在会剥离客户端同名请求头的网关之后。

use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;

/// 上游网关写入已认证用户名的请求头
pub const VERIFIED_USER_HEADER: &str = "x-verified-user";

/// 已通过认证的用户名，以请求扩展的形式传给处理器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser(pub String);

impl VerifiedUser {
    /// 从 headers 中提取身份；缺失、非 UTF-8 或为空都视为未认证
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(VERIFIED_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|username| !username.is_empty())
            .map(|username| Self(username.to_owned()))
    }
}

impl<S> FromRequestParts<S> for VerifiedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<VerifiedUser>().cloned().ok_or_else(|| {
            tracing::warn!("request without verified identity");
            ApiError::unauthorized("missing verified identity")
        })
    }
}

/// 把网关写入的身份放进请求扩展
pub async fn trusted_identity_header(mut request: Request, next: Next) -> Response {
    if let Some(user) = VerifiedUser::from_headers(request.headers()) {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}
