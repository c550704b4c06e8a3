//! 内存存储实现
//!
//! 与 `PgStore` 遵守相同的约定：结果插入在写锁内完成“检查-插入”，
//! 因此并发创建同一检查的结果时只有一个成功。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use retina_core::{
    Authorizer, Caller, Exam, ExamResult, ExamStatus, ExamStore, NewExamResult, Result,
    ResultChanges, ResultStore, RetinaError, Severity,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    /// 患者ID -> 所属用户ID
    patients: HashMap<Uuid, Uuid>,
    exams: HashMap<Uuid, Exam>,
    results: HashMap<Uuid, ExamResult>,
    /// 检查ID -> 结果ID，相当于唯一索引
    results_by_exam: HashMap<Uuid, Uuid>,
    writes: usize,
}

impl MemoryState {
    fn owned_results(&self, owner_id: Uuid) -> Vec<ExamResult> {
        let mut results: Vec<ExamResult> = self
            .results
            .values()
            .filter(|result| {
                self.exams
                    .get(&result.exam_id)
                    .filter(|exam| !exam.is_deleted())
                    .and_then(|exam| self.patients.get(&exam.patient_id))
                    == Some(&owner_id)
            })
            .cloned()
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        results
    }
}

/// 内存中的检查/结果存储与授权
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一位患者并返回其ID
    pub async fn add_patient(&self, owner_id: Uuid) -> Uuid {
        let patient_id = Uuid::new_v4();
        self.state.write().await.patients.insert(patient_id, owner_id);
        patient_id
    }

    pub async fn add_exam(&self, exam: Exam) {
        self.state.write().await.exams.insert(exam.id, exam);
    }

    /// 直接写入一条已有结果（例如分级器上线前的历史数据），检查随之置为 completed
    pub async fn import_result(&self, result: ExamResult) {
        let mut state = self.state.write().await;
        if let Some(exam) = state.exams.get_mut(&result.exam_id) {
            exam.status = ExamStatus::Completed;
        }
        state.results_by_exam.insert(result.exam_id, result.id);
        state.results.insert(result.id, result);
    }

    /// 读取检查（包括已软删除的）
    pub async fn exam(&self, exam_id: Uuid) -> Option<Exam> {
        self.state.read().await.exams.get(&exam_id).cloned()
    }

    pub async fn result_count(&self) -> usize {
        self.state.read().await.results.len()
    }

    /// 通过存储接口发生的写操作次数
    pub async fn write_count(&self) -> usize {
        self.state.read().await.writes
    }
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn find_exam(&self, exam_id: Uuid) -> Result<Option<Exam>> {
        let state = self.state.read().await;
        Ok(state.exams.get(&exam_id).filter(|exam| !exam.is_deleted()).cloned())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn find(&self, result_id: Uuid) -> Result<Option<ExamResult>> {
        Ok(self.state.read().await.results.get(&result_id).cloned())
    }

    async fn find_by_exam(&self, exam_id: Uuid) -> Result<Option<ExamResult>> {
        let state = self.state.read().await;
        Ok(state
            .results_by_exam
            .get(&exam_id)
            .and_then(|id| state.results.get(id))
            .cloned())
    }

    async fn create(&self, result: NewExamResult) -> Result<ExamResult> {
        let mut state = self.state.write().await;

        if state.results_by_exam.contains_key(&result.exam_id) {
            return Err(RetinaError::conflict(format!(
                "Exam {} already has a result",
                result.exam_id
            )));
        }

        let exam = state
            .exams
            .get_mut(&result.exam_id)
            .ok_or_else(|| RetinaError::not_found(format!("Exam {} not found", result.exam_id)))?;
        exam.status = ExamStatus::Completed;
        exam.updated_at = Utc::now();

        let created = result.into_result(Uuid::new_v4());
        state.results_by_exam.insert(created.exam_id, created.id);
        state.results.insert(created.id, created.clone());
        state.writes += 1;
        Ok(created)
    }

    async fn update(&self, result_id: Uuid, changes: &ResultChanges) -> Result<ExamResult> {
        let mut state = self.state.write().await;
        let result = state
            .results
            .get_mut(&result_id)
            .ok_or_else(|| RetinaError::not_found(format!("Result {} not found", result_id)))?;
        changes.apply_to(result);
        let updated = result.clone();
        state.writes += 1;
        Ok(updated)
    }

    async fn delete(&self, result_id: Uuid) -> Result<Exam> {
        let mut state = self.state.write().await;
        let removed = state
            .results
            .remove(&result_id)
            .ok_or_else(|| RetinaError::not_found(format!("Result {} not found", result_id)))?;
        state.results_by_exam.remove(&removed.exam_id);
        state.writes += 1;

        let exam = state
            .exams
            .get_mut(&removed.exam_id)
            .ok_or_else(|| RetinaError::Internal(format!("Exam {} missing for result {}", removed.exam_id, result_id)))?;
        exam.status = ExamStatus::Pending;
        exam.updated_at = Utc::now();
        Ok(exam.clone())
    }

    async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<ExamResult>> {
        Ok(self.state.read().await.owned_results(owner_id))
    }

    async fn list_unclassified_for_owner(&self, owner_id: Uuid) -> Result<Vec<ExamResult>> {
        Ok(self
            .state
            .read()
            .await
            .owned_results(owner_id)
            .into_iter()
            .filter(|result| result.detailed_diagnosis.is_none())
            .collect())
    }

    async fn set_detailed_diagnosis(&self, result_id: Uuid, severity: Severity) -> Result<()> {
        let mut state = self.state.write().await;
        let result = state
            .results
            .get_mut(&result_id)
            .ok_or_else(|| RetinaError::not_found(format!("Result {} not found", result_id)))?;
        result.detailed_diagnosis = Some(severity);
        result.updated_at = Utc::now();
        state.writes += 1;
        Ok(())
    }
}

#[async_trait]
impl Authorizer for MemoryStore {
    async fn owns_patient(&self, caller: &Caller, patient_id: Uuid) -> Result<bool> {
        Ok(self.state.read().await.patients.get(&patient_id) == Some(&caller.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retina_core::{BinaryDiagnosis, ManualDiagnosis};

    fn manual(exam_id: Uuid) -> NewExamResult {
        NewExamResult::manual(
            exam_id,
            ManualDiagnosis {
                diagnosis: BinaryDiagnosis::Dr,
                probability_dr: Some(0.7),
                probability_no_dr: Some(0.3),
                class_predicted: None,
                recommendation: "Refer to retina specialist".to_string(),
                doctor_notes: None,
            },
        )
    }

    async fn seeded() -> (MemoryStore, Uuid, Exam) {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let patient = store.add_patient(owner).await;
        let exam = Exam::new(patient, "retinography", None);
        store.add_exam(exam.clone()).await;
        (store, owner, exam)
    }

    #[tokio::test]
    async fn test_create_enforces_one_result_per_exam() {
        let (store, _, exam) = seeded().await;

        store.create(manual(exam.id)).await.unwrap();
        assert_eq!(store.exam(exam.id).await.unwrap().status, ExamStatus::Completed);

        let second = store.create(manual(exam.id)).await;
        assert!(matches!(second, Err(RetinaError::Conflict(_))));
        assert_eq!(store.result_count().await, 1);
        assert_eq!(store.write_count().await, 1);
    }

    #[tokio::test]
    async fn test_delete_reverts_exam_to_pending() {
        let (store, _, exam) = seeded().await;
        let result = store.create(manual(exam.id)).await.unwrap();

        let reverted = store.delete(result.id).await.unwrap();
        assert_eq!(reverted.status, ExamStatus::Pending);
        assert!(store.find_by_exam(exam.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_can_clear_nullable_fields() {
        let (store, _, exam) = seeded().await;
        let mut new = manual(exam.id);
        new.doctor_notes = Some("Microaneurysms".to_string());
        let result = store.create(new).await.unwrap();

        let changes = ResultChanges {
            doctor_notes: Some(None),
            probability_dr: Some(None),
            ..Default::default()
        };
        let updated = store.update(result.id, &changes).await.unwrap();
        assert_eq!(updated.doctor_notes, None);
        assert_eq!(updated.probability_dr, None);
        assert_eq!(updated.probability_no_dr, Some(0.3));
    }

    #[tokio::test]
    async fn test_owner_scoping() {
        let (store, owner, exam) = seeded().await;
        store.create(manual(exam.id)).await.unwrap();

        assert_eq!(store.list_for_owner(owner).await.unwrap().len(), 1);
        assert!(store.list_for_owner(Uuid::new_v4()).await.unwrap().is_empty());
        assert!(store.owns_patient(&Caller::new(owner), exam.patient_id).await.unwrap());
        assert!(!store.owns_patient(&Caller::new(Uuid::new_v4()), exam.patient_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_soft_deleted_exam_is_hidden() {
        let (store, owner, mut exam) = seeded().await;
        exam.deleted_at = Some(Utc::now());
        store.add_exam(exam.clone()).await;

        assert!(store.find_exam(exam.id).await.unwrap().is_none());
        assert!(store.list_for_owner(owner).await.unwrap().is_empty());
    }
}
