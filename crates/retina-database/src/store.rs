//! PostgreSQL 存储实现

use async_trait::async_trait;
use retina_core::{
    Authorizer, Caller, Exam, ExamResult, ExamStore, NewExamResult, Result, ResultChanges,
    ResultStore, RetinaError, Severity,
};
use uuid::Uuid;

use crate::connection::DatabasePool;
use crate::queries::DatabaseQueries;

/// 基于 PostgreSQL 的检查/结果存储与授权
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DatabasePool,
}

impl PgStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn queries(&self) -> DatabaseQueries<'_> {
        DatabaseQueries::new(&self.pool)
    }

    /// 初始化表结构
    pub async fn migrate(&self) -> Result<()> {
        self.queries().create_tables().await
    }
}

#[async_trait]
impl ExamStore for PgStore {
    async fn find_exam(&self, exam_id: Uuid) -> Result<Option<Exam>> {
        self.queries().get_exam_by_id(&exam_id).await
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn find(&self, result_id: Uuid) -> Result<Option<ExamResult>> {
        self.queries().get_result_by_id(&result_id).await
    }

    async fn find_by_exam(&self, exam_id: Uuid) -> Result<Option<ExamResult>> {
        self.queries().get_result_by_exam_id(&exam_id).await
    }

    async fn create(&self, result: NewExamResult) -> Result<ExamResult> {
        self.queries().create_result(&result).await
    }

    async fn update(&self, result_id: Uuid, changes: &ResultChanges) -> Result<ExamResult> {
        self.queries()
            .update_result(&result_id, changes)
            .await?
            .ok_or_else(|| RetinaError::not_found(format!("Result {} not found", result_id)))
    }

    async fn delete(&self, result_id: Uuid) -> Result<Exam> {
        self.queries()
            .delete_result(&result_id)
            .await?
            .ok_or_else(|| RetinaError::not_found(format!("Result {} not found", result_id)))
    }

    async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<ExamResult>> {
        self.queries().get_results_by_owner(&owner_id, false).await
    }

    async fn list_unclassified_for_owner(&self, owner_id: Uuid) -> Result<Vec<ExamResult>> {
        self.queries().get_results_by_owner(&owner_id, true).await
    }

    async fn set_detailed_diagnosis(&self, result_id: Uuid, severity: Severity) -> Result<()> {
        self.queries().update_detailed_diagnosis(&result_id, severity).await
    }
}

#[async_trait]
impl Authorizer for PgStore {
    async fn owns_patient(&self, caller: &Caller, patient_id: Uuid) -> Result<bool> {
        let owner = self.queries().get_patient_owner(&patient_id).await?;
        Ok(owner == Some(caller.user_id))
    }
}
