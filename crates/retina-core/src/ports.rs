//! 外部协作方接口
//!
//! 编排器只通过这些 trait 访问存储与授权，具体实现位于 `retina-database`。

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Caller, Exam, ExamResult, NewExamResult, ResultChanges, Severity};

/// 检查存储
#[async_trait]
pub trait ExamStore: Send + Sync {
    /// 查找未被软删除的检查
    async fn find_exam(&self, exam_id: Uuid) -> Result<Option<Exam>>;
}

/// 结果存储
///
/// 每个检查至多一个结果由存储层的唯一约束保证；违反约束时 `create` 返回
/// `RetinaError::Conflict`。结果的创建和删除与父检查的状态变更在同一事务内完成：
/// 创建后检查为 `completed`，删除后检查为 `pending`。
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn find(&self, result_id: Uuid) -> Result<Option<ExamResult>>;

    async fn find_by_exam(&self, exam_id: Uuid) -> Result<Option<ExamResult>>;

    async fn create(&self, result: NewExamResult) -> Result<ExamResult>;

    async fn update(&self, result_id: Uuid, changes: &ResultChanges) -> Result<ExamResult>;

    /// 删除结果并返回已回退为 `pending` 的父检查
    async fn delete(&self, result_id: Uuid) -> Result<Exam>;

    /// 调用者名下的全部结果，按创建时间倒序
    async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<ExamResult>>;

    /// 调用者名下尚未分级的历史结果
    async fn list_unclassified_for_owner(&self, owner_id: Uuid) -> Result<Vec<ExamResult>>;

    async fn set_detailed_diagnosis(&self, result_id: Uuid, severity: Severity) -> Result<()>;
}

/// 授权能力：调用者是否拥有某位患者
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn owns_patient(&self, caller: &Caller, patient_id: Uuid) -> Result<bool>;
}
