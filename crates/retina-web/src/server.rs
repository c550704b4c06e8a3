//! Web服务器

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use retina_core::Result;
use retina_workflow::ExamAnalysisOrchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::auth_middleware;
use crate::handlers::{
    analyze_exam, delete_result, diagnosis_distribution, health, list_results,
    migrate_legacy_results, record_manual_diagnosis, show_result, update_result,
};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ExamAnalysisOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<ExamAnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, orchestrator: Arc<ExamAnalysisOrchestrator>) -> Self {
        let app = create_router(AppState::new(orchestrator));
        Self { addr, app }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app).await?;

        Ok(())
    }
}

/// 构建完整路由
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // 健康检查（无需身份）
        .route("/health", get(health))
        // API路由
        .nest("/api/v1", api_routes())
        .with_state(state)
        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}

/// API v1 路由
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/exam-results", get(list_results))
        .route(
            "/exam-results/:id",
            get(show_result).put(update_result).delete(delete_result),
        )
        .route("/exam-results/:id/analyze", post(analyze_exam))
        .route("/exam-results/:id/manual", post(record_manual_diagnosis))
        .route("/dashboard/diagnosis-distribution", get(diagnosis_distribution))
        .route("/maintenance/migrate-legacy-results", post(migrate_legacy_results))
        .route_layer(middleware::from_fn(auth_middleware))
}
