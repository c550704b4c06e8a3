//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{Result, RetinaError};

/// 当前请求的调用者（已由上游网关完成认证）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Uuid,
}

impl Caller {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }
}

/// 检查状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExamStatus {
    Pending,   // 待分析
    Completed, // 已出结果
    Cancelled, // 已取消
}

impl ExamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamStatus::Pending => "pending",
            ExamStatus::Completed => "completed",
            ExamStatus::Cancelled => "cancelled",
        }
    }

    /// 从存储中的字符串解析，未知值视为待分析
    pub fn from_db(value: &str) -> Self {
        match value {
            "completed" => ExamStatus::Completed,
            "cancelled" => ExamStatus::Cancelled,
            _ => ExamStatus::Pending,
        }
    }
}

/// 视网膜检查
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exam {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub exam_type: String,
    pub description: Option<String>,
    /// 外部可访问的影像地址，旧客户端使用 `image_path` 字段名
    #[serde(rename = "image_path")]
    pub image_url: Option<String>,
    pub exam_date: NaiveDate,
    pub status: ExamStatus,
    pub notes: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Exam {
    /// 创建一个待分析的新检查
    pub fn new(patient_id: Uuid, exam_type: impl Into<String>, image_url: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            exam_type: exam_type.into(),
            description: None,
            image_url,
            exam_date: now.date_naive(),
            status: ExamStatus::Pending,
            notes: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// 返回非空的影像地址
    pub fn image_reference(&self) -> Option<&str> {
        self.image_url.as_deref().map(str::trim).filter(|url| !url.is_empty())
    }
}

/// 二分类诊断（兼容旧客户端）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BinaryDiagnosis {
    #[serde(rename = "DR")]
    Dr,
    #[serde(rename = "No_DR")]
    NoDr,
}

impl BinaryDiagnosis {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryDiagnosis::Dr => "DR",
            BinaryDiagnosis::NoDr => "No_DR",
        }
    }

    /// 严格解析，用于校验调用方提交的数据
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "DR" => Some(BinaryDiagnosis::Dr),
            "No_DR" => Some(BinaryDiagnosis::NoDr),
            _ => None,
        }
    }

    /// 从存储解析：只有 `No_DR` 表示未见病变，其余历史取值一律视为 DR
    pub fn from_db(value: Option<&str>) -> Self {
        match value {
            Some("No_DR") => BinaryDiagnosis::NoDr,
            _ => BinaryDiagnosis::Dr,
        }
    }
}

/// 糖尿病视网膜病变严重程度分级
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    NoDr,
    Mild,
    Moderate,
    Severe,
    Proliferate,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::NoDr,
        Severity::Mild,
        Severity::Moderate,
        Severity::Severe,
        Severity::Proliferate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::NoDr => "no_dr",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
            Severity::Proliferate => "proliferate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Severity::ALL.into_iter().find(|s| s.as_str() == value.trim())
    }

    /// 仪表盘展示用标签
    pub fn label(&self) -> &'static str {
        match self {
            Severity::NoDr => "No retinopathy",
            Severity::Mild => "Mild",
            Severity::Moderate => "Moderate",
            Severity::Severe => "Severe",
            Severity::Proliferate => "Proliferative",
        }
    }
}

/// 检查结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExamResult {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub diagnosis: BinaryDiagnosis,
    /// 分级诊断，分级器上线前创建的记录为空
    pub detailed_diagnosis: Option<Severity>,
    pub probability_dr: Option<f64>,
    pub probability_no_dr: Option<f64>,
    pub class_predicted: Option<i32>,
    pub recommendation: Option<String>,
    pub doctor_notes: Option<String>,
    /// 推理服务原始响应，仅用于审计
    #[serde(rename = "ml_api_response")]
    pub raw_response: Option<serde_json::Value>,
    pub is_auto_diagnosis: bool,
    pub analyzed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新结果插入模型
#[derive(Debug, Clone)]
pub struct NewExamResult {
    pub exam_id: Uuid,
    pub diagnosis: BinaryDiagnosis,
    pub detailed_diagnosis: Option<Severity>,
    pub probability_dr: Option<f64>,
    pub probability_no_dr: Option<f64>,
    pub class_predicted: Option<i32>,
    pub recommendation: Option<String>,
    pub doctor_notes: Option<String>,
    pub raw_response: Option<serde_json::Value>,
    pub is_auto_diagnosis: bool,
    pub analyzed_at: DateTime<Utc>,
}

impl NewExamResult {
    /// 由推理结果构造自动诊断
    pub fn automatic(exam_id: Uuid, prediction: &Prediction) -> Self {
        Self {
            exam_id,
            diagnosis: crate::classifier::binary(prediction.probability_dr),
            detailed_diagnosis: Some(crate::classifier::classify(
                prediction.probability_dr,
                prediction.probability_no_dr,
            )),
            probability_dr: Some(prediction.probability_dr),
            probability_no_dr: Some(prediction.probability_no_dr),
            class_predicted: prediction.class_predicted,
            recommendation: prediction.recommendation.clone(),
            doctor_notes: None,
            raw_response: Some(prediction.raw.clone()),
            is_auto_diagnosis: true,
            analyzed_at: Utc::now(),
        }
    }

    /// 由医生手工诊断构造
    pub fn manual(exam_id: Uuid, diagnosis: ManualDiagnosis) -> Self {
        Self {
            exam_id,
            diagnosis: diagnosis.diagnosis,
            detailed_diagnosis: None,
            probability_dr: diagnosis.probability_dr,
            probability_no_dr: diagnosis.probability_no_dr,
            class_predicted: diagnosis.class_predicted,
            recommendation: Some(diagnosis.recommendation),
            doctor_notes: diagnosis.doctor_notes,
            raw_response: None,
            is_auto_diagnosis: false,
            analyzed_at: Utc::now(),
        }
    }

    /// 补全存储层生成的字段
    pub fn into_result(self, id: Uuid) -> ExamResult {
        let now = Utc::now();
        ExamResult {
            id,
            exam_id: self.exam_id,
            diagnosis: self.diagnosis,
            detailed_diagnosis: self.detailed_diagnosis,
            probability_dr: self.probability_dr,
            probability_no_dr: self.probability_no_dr,
            class_predicted: self.class_predicted,
            recommendation: self.recommendation,
            doctor_notes: self.doctor_notes,
            raw_response: self.raw_response,
            is_auto_diagnosis: self.is_auto_diagnosis,
            analyzed_at: self.analyzed_at,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 推理服务返回的预测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub probability_dr: f64,
    pub probability_no_dr: f64,
    pub class_predicted: Option<i32>,
    pub recommendation: Option<String>,
    pub raw: serde_json::Value,
}

impl Prediction {
    /// 宽松解析推理响应：缺失的数值字段取 0.0，缺失的文本字段为空
    pub fn from_json(raw: serde_json::Value) -> Self {
        let number = |key: &str| raw.get(key).and_then(lenient_f64).unwrap_or(0.0);

        Self {
            probability_dr: number("probability_dr"),
            probability_no_dr: number("probability_no_dr"),
            class_predicted: raw
                .get("class_predicted")
                .and_then(lenient_f64)
                .map(|v| v as i32),
            recommendation: raw
                .get("recommendation")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            raw,
        }
    }
}

fn lenient_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// 解析 JSON 请求体，语法或类型错误一律视为无法处理的请求
pub fn parse_request<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| RetinaError::unprocessable(format!("Invalid request body: {}", e)))
}

/// 区分“字段缺失”（外层 `None`）与“显式为 null”（`Some(None)`）
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// 手工诊断请求
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManualDiagnosisRequest {
    pub diagnosis: Option<String>,
    pub probability_dr: Option<f64>,
    pub probability_no_dr: Option<f64>,
    pub class_predicted: Option<i32>,
    pub recommendation: Option<String>,
    pub doctor_notes: Option<String>,
}

/// 校验通过的手工诊断
#[derive(Debug, Clone, PartialEq)]
pub struct ManualDiagnosis {
    pub diagnosis: BinaryDiagnosis,
    pub probability_dr: Option<f64>,
    pub probability_no_dr: Option<f64>,
    pub class_predicted: Option<i32>,
    pub recommendation: String,
    pub doctor_notes: Option<String>,
}

impl ManualDiagnosisRequest {
    pub fn validate(self) -> Result<ManualDiagnosis> {
        let mut errors = Vec::new();

        let diagnosis = match self.diagnosis.as_deref() {
            None => {
                errors.push("diagnosis is required".to_string());
                None
            }
            Some(value) => parse_diagnosis(value, &mut errors),
        };

        check_probability("probability_dr", self.probability_dr, &mut errors);
        check_probability("probability_no_dr", self.probability_no_dr, &mut errors);

        let recommendation = match self.recommendation {
            Some(text) if !text.trim().is_empty() => Some(text),
            _ => {
                errors.push("recommendation is required".to_string());
                None
            }
        };

        match (diagnosis, recommendation) {
            (Some(diagnosis), Some(recommendation)) if errors.is_empty() => Ok(ManualDiagnosis {
                diagnosis,
                probability_dr: self.probability_dr,
                probability_no_dr: self.probability_no_dr,
                class_predicted: self.class_predicted,
                recommendation,
                doctor_notes: self.doctor_notes,
            }),
            _ => Err(RetinaError::unprocessable(errors.join("; "))),
        }
    }
}

/// 结果部分更新请求
///
/// 可为空的字段使用 `Option<Option<T>>`：缺失表示不变，`null` 表示清空。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateResultRequest {
    pub diagnosis: Option<String>,
    pub detailed_diagnosis: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub probability_dr: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub probability_no_dr: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub class_predicted: Option<Option<i32>>,
    pub recommendation: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub doctor_notes: Option<Option<String>>,
}

/// 校验通过的结果变更，外层 `None` 表示该字段保持不变
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultChanges {
    pub diagnosis: Option<BinaryDiagnosis>,
    pub detailed_diagnosis: Option<Severity>,
    pub probability_dr: Option<Option<f64>>,
    pub probability_no_dr: Option<Option<f64>>,
    pub class_predicted: Option<Option<i32>>,
    pub recommendation: Option<String>,
    pub doctor_notes: Option<Option<String>>,
}

impl UpdateResultRequest {
    pub fn validate(self) -> Result<ResultChanges> {
        let mut errors = Vec::new();

        let diagnosis = self
            .diagnosis
            .as_deref()
            .and_then(|value| parse_diagnosis(value, &mut errors));

        let detailed_diagnosis = self.detailed_diagnosis.as_deref().and_then(|value| {
            let parsed = Severity::parse(value);
            if parsed.is_none() {
                errors.push(format!("detailed_diagnosis '{}' is not a severity level", value));
            }
            parsed
        });

        check_probability("probability_dr", self.probability_dr.flatten(), &mut errors);
        check_probability("probability_no_dr", self.probability_no_dr.flatten(), &mut errors);

        if matches!(self.recommendation.as_deref(), Some(text) if text.trim().is_empty()) {
            errors.push("recommendation must not be empty".to_string());
        }

        if !errors.is_empty() {
            return Err(RetinaError::unprocessable(errors.join("; ")));
        }

        Ok(ResultChanges {
            diagnosis,
            detailed_diagnosis,
            probability_dr: self.probability_dr,
            probability_no_dr: self.probability_no_dr,
            class_predicted: self.class_predicted,
            recommendation: self.recommendation,
            doctor_notes: self.doctor_notes,
        })
    }
}

impl ResultChanges {
    pub fn is_empty(&self) -> bool {
        *self == ResultChanges::default()
    }

    /// 将变更写入已有结果，不重新运行分级器
    pub fn apply_to(&self, result: &mut ExamResult) {
        if let Some(diagnosis) = self.diagnosis {
            result.diagnosis = diagnosis;
        }
        if let Some(severity) = self.detailed_diagnosis {
            result.detailed_diagnosis = Some(severity);
        }
        if let Some(p) = self.probability_dr {
            result.probability_dr = p;
        }
        if let Some(p) = self.probability_no_dr {
            result.probability_no_dr = p;
        }
        if let Some(class) = self.class_predicted {
            result.class_predicted = class;
        }
        if let Some(text) = &self.recommendation {
            result.recommendation = Some(text.clone());
        }
        if let Some(notes) = &self.doctor_notes {
            result.doctor_notes = notes.clone();
        }
        result.updated_at = Utc::now();
    }
}

fn parse_diagnosis(value: &str, errors: &mut Vec<String>) -> Option<BinaryDiagnosis> {
    if value.len() > 255 {
        errors.push("diagnosis must be at most 255 characters".to_string());
        return None;
    }
    let parsed = BinaryDiagnosis::parse(value);
    if parsed.is_none() {
        errors.push(format!("diagnosis '{}' must be DR or No_DR", value));
    }
    parsed
}

fn check_probability(field: &str, value: Option<f64>, errors: &mut Vec<String>) {
    if let Some(p) = value {
        if !(0.0..=1.0).contains(&p) {
            errors.push(format!("{} must be between 0 and 1", field));
        }
    }
}
