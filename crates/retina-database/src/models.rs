//! 数据库模型

use chrono::{DateTime, NaiveDate, Utc};
use retina_core::models::*;
use sqlx::FromRow;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库检查表
#[derive(Debug, FromRow)]
pub struct DbExam {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub exam_type: String,
    pub description: Option<String>,
    pub image_path: Option<String>,
    pub exam_date: NaiveDate,
    pub status: String, // 存储为字符串，转换为ExamStatus枚举
    pub notes: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbExam> for Exam {
    fn from(db_exam: DbExam) -> Self {
        Exam {
            id: db_exam.id,
            patient_id: db_exam.patient_id,
            exam_type: db_exam.exam_type,
            description: db_exam.description,
            image_url: db_exam.image_path,
            exam_date: db_exam.exam_date,
            status: ExamStatus::from_db(&db_exam.status),
            notes: db_exam.notes,
            deleted_at: db_exam.deleted_at,
            created_at: db_exam.created_at,
            updated_at: db_exam.updated_at,
        }
    }
}

/// 数据库结果表
#[derive(Debug, FromRow)]
pub struct DbExamResult {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub diagnosis: Option<String>,
    pub detailed_diagnosis: Option<String>,
    pub probability_dr: Option<f64>,
    pub probability_no_dr: Option<f64>,
    pub class_predicted: Option<i32>,
    pub recommendation: Option<String>,
    pub doctor_notes: Option<String>,
    pub ml_api_response: Option<String>, // 原始JSON文本
    pub is_auto_diagnosis: bool,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbExamResult> for ExamResult {
    fn from(db_result: DbExamResult) -> Self {
        ExamResult {
            id: db_result.id,
            exam_id: db_result.exam_id,
            diagnosis: BinaryDiagnosis::from_db(db_result.diagnosis.as_deref()),
            detailed_diagnosis: db_result.detailed_diagnosis.as_deref().and_then(Severity::parse),
            probability_dr: db_result.probability_dr,
            probability_no_dr: db_result.probability_no_dr,
            class_predicted: db_result.class_predicted,
            recommendation: db_result.recommendation,
            doctor_notes: db_result.doctor_notes,
            // 审计字段损坏时按原文保存为字符串
            raw_response: db_result.ml_api_response.map(|text| {
                serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
            }),
            is_auto_diagnosis: db_result.is_auto_diagnosis,
            analyzed_at: db_result.analyzed_at.unwrap_or(db_result.created_at),
            created_at: db_result.created_at,
            updated_at: db_result.updated_at,
        }
    }
}
