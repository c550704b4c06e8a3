//! 调用者身份识别
//!
//! 认证由上游网关完成，网关把已认证用户的 ID 写入 `X-User-Id` 请求头。
//! 这里只负责解析该请求头并放入请求扩展，供处理器以 `Extension<Caller>` 取用。

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use retina_core::Caller;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

/// 网关写入的用户 ID 请求头
pub const USER_ID_HEADER: &str = "x-user-id";

/// 从请求头解析调用者，缺失或格式错误返回 `None`
pub fn caller_from_headers(headers: &HeaderMap) -> Option<Caller> {
    let value = headers.get(USER_ID_HEADER)?.to_str().ok()?;
    Uuid::parse_str(value.trim()).ok().map(Caller::new)
}

/// 认证中间件
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    match caller_from_headers(request.headers()) {
        Some(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        None => {
            warn!("Rejected {} {}: missing or invalid caller identity", request.method(), request.uri());
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "success": false,
                    "message": "Missing or invalid X-User-Id header"
                })),
            )
                .into_response()
        }
    }
}
