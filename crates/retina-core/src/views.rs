//! 对外响应视图
//!
//! 自动分析与手工诊断接口必须保持旧客户端使用的响应结构：`result` 中不出现
//! `detailed_diagnosis`。这里用独立的投影结构体表达，而不是在序列化时删字段。

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{BinaryDiagnosis, Exam, ExamResult};

/// 旧版结果视图（不含分级诊断）
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExamResultView {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub diagnosis: BinaryDiagnosis,
    pub probability_dr: Option<f64>,
    pub probability_no_dr: Option<f64>,
    pub class_predicted: Option<i32>,
    pub recommendation: Option<String>,
    pub doctor_notes: Option<String>,
    pub ml_api_response: Option<serde_json::Value>,
    pub is_auto_diagnosis: bool,
    pub analyzed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ExamResult> for ExamResultView {
    fn from(result: &ExamResult) -> Self {
        Self {
            id: result.id,
            exam_id: result.exam_id,
            diagnosis: result.diagnosis,
            probability_dr: result.probability_dr,
            probability_no_dr: result.probability_no_dr,
            class_predicted: result.class_predicted,
            recommendation: result.recommendation.clone(),
            doctor_notes: result.doctor_notes.clone(),
            ml_api_response: result.raw_response.clone(),
            is_auto_diagnosis: result.is_auto_diagnosis,
            analyzed_at: result.analyzed_at,
            created_at: result.created_at,
            updated_at: result.updated_at,
        }
    }
}

/// 分析/手工诊断响应：`{exam, result}`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisResponse {
    pub exam: Exam,
    pub result: ExamResultView,
}

impl AnalysisResponse {
    pub fn new(exam: Exam, result: &ExamResult) -> Self {
        Self {
            exam,
            result: ExamResultView::from(result),
        }
    }
}
