//! 检查分析 HTTP 接口

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::{auth_middleware, caller_from_headers, USER_ID_HEADER};
pub use handlers::ApiError;
pub use server::{create_router, AppState, WebServer};
