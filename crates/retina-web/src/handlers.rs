//! HTTP处理器

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use retina_core::{
    parse_request, AnalysisResponse, Caller, ExamResult, ManualDiagnosisRequest, RetinaError,
    UpdateResultRequest,
};
use retina_workflow::DiagnosisDistribution;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::server::AppState;

/// 处理器返回类型
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 列出调用者的全部结果
pub async fn list_results(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<ExamResult>>> {
    let results = state.orchestrator.list_results(&caller).await?;
    info!("Listed {} results for user {}", results.len(), caller.user_id);
    Ok(Json(results))
}

/// 自动分析
pub async fn analyze_exam(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(exam_id): Path<Uuid>,
) -> ApiResult<Json<AnalysisResponse>> {
    let response = state.orchestrator.analyze_exam(&caller, exam_id).await?;
    Ok(Json(response))
}

/// 手工诊断
///
/// 请求体在这里只解析不拒绝，错误交给编排器在存在性和冲突检查之后返回。
pub async fn record_manual_diagnosis(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(exam_id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<AnalysisResponse>)> {
    let request = parse_request::<ManualDiagnosisRequest>(&body);
    let response = state
        .orchestrator
        .record_manual_diagnosis(&caller, exam_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn show_result(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(result_id): Path<Uuid>,
) -> ApiResult<Json<ExamResult>> {
    let result = state.orchestrator.show_result(&caller, result_id).await?;
    Ok(Json(result))
}

pub async fn update_result(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(result_id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<ExamResult>> {
    let request = parse_request::<UpdateResultRequest>(&body);
    let result = state
        .orchestrator
        .update_result(&caller, result_id, request)
        .await?;
    Ok(Json(result))
}

pub async fn delete_result(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(result_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let exam = state.orchestrator.delete_result(&caller, result_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Result deleted",
        "exam": exam
    })))
}

/// 仪表盘诊断分布
pub async fn diagnosis_distribution(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<DiagnosisDistribution>> {
    let distribution = state.orchestrator.diagnosis_distribution(&caller).await?;
    Ok(Json(distribution))
}

/// 历史结果回填
pub async fn migrate_legacy_results(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Value>> {
    let report = state.orchestrator.migrate_legacy_results(&caller).await?;
    Ok(Json(json!({
        "success": true,
        "migrated_count": report.migrated_count
    })))
}

/// 错误响应包装
#[derive(Debug)]
pub struct ApiError(pub RetinaError);

impl From<RetinaError> for ApiError {
    fn from(err: RetinaError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RetinaError::NotFound(_) => StatusCode::NOT_FOUND,
            RetinaError::Conflict(_) | RetinaError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            RetinaError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RetinaError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RetinaError::Config(_)
            | RetinaError::Database(_)
            | RetinaError::Storage(_)
            | RetinaError::Io(_)
            | RetinaError::Serialization(_)
            | RetinaError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// 错误处理
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed with {}: {}", status, self.0);
        } else {
            warn!("Request rejected with {}: {}", status, self.0);
        }

        let mut body = json!({
            "success": false,
            "message": self.0.public_message(),
        });
        if let RetinaError::ServiceUnavailable { upstream, .. } = &self.0 {
            body["error"] = Value::String(upstream.clone());
        }

        (status, Json(body)).into_response()
    }
}
