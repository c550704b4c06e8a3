//! 检查分析编排器
//!
//! 协调存储、授权、影像存储、推理服务与分级器，实现自动分析、手工诊断、
//! 结果维护和历史数据回填。每个检查至多一个结果由存储层唯一约束保证，
//! 这里的存在性检查只是快速路径。

use std::sync::Arc;

use chrono::Utc;
use retina_core::{
    classify, AnalysisResponse, Authorizer, Caller, Exam, ExamResult, ExamStatus, ExamStore,
    ManualDiagnosisRequest, NewExamResult, Prediction, Result, ResultStore, RetinaError,
    UpdateResultRequest,
};
use retina_integration::{ImageStore, InferenceClient};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dashboard::{DashboardAggregator, DiagnosisDistribution};
use crate::staging::ImageStaging;
use crate::state_machine::{ExamEvent, ExamStateMachine};

/// 回填结果
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct BackfillReport {
    pub migrated_count: usize,
}

/// 检查分析编排器
pub struct ExamAnalysisOrchestrator {
    exams: Arc<dyn ExamStore>,
    results: Arc<dyn ResultStore>,
    authorizer: Arc<dyn Authorizer>,
    images: Arc<dyn ImageStore>,
    inference: Arc<dyn InferenceClient>,
    staging: ImageStaging,
    state_machine: ExamStateMachine,
    dashboard: DashboardAggregator,
}

impl ExamAnalysisOrchestrator {
    pub fn new(
        exams: Arc<dyn ExamStore>,
        results: Arc<dyn ResultStore>,
        authorizer: Arc<dyn Authorizer>,
        images: Arc<dyn ImageStore>,
        inference: Arc<dyn InferenceClient>,
    ) -> Self {
        Self {
            exams,
            results,
            authorizer,
            images,
            inference,
            staging: ImageStaging::new(),
            state_machine: ExamStateMachine::new(),
            dashboard: DashboardAggregator::new(),
        }
    }

    /// 指定影像暂存目录
    pub fn with_staging(mut self, staging: ImageStaging) -> Self {
        self.staging = staging;
        self
    }

    /// 自动分析：读取影像、调用推理服务、分级并写入结果
    pub async fn analyze_exam(&self, caller: &Caller, exam_id: Uuid) -> Result<AnalysisResponse> {
        info!("Analyzing exam {} for user {}", exam_id, caller.user_id);

        let mut exam = self.authorized_exam(caller, exam_id).await?;
        self.ensure_no_result(&exam).await?;
        let next_status = self.ensure_can_record(&exam)?;

        let image_url = exam
            .image_reference()
            .ok_or_else(|| RetinaError::unprocessable(format!("Exam {} has no image to analyze", exam.id)))?
            .to_string();

        let bytes = self.images.fetch(&image_url).await?;
        let prediction = self.run_inference(&bytes).await?;

        let result = self
            .results
            .create(NewExamResult::automatic(exam.id, &prediction))
            .await?;

        exam.status = next_status;
        exam.updated_at = Utc::now();

        info!(
            "Exam {} analyzed: diagnosis={} detailed={:?}",
            exam.id,
            result.diagnosis.as_str(),
            result.detailed_diagnosis
        );
        Ok(AnalysisResponse::new(exam, &result))
    }

    /// 手工诊断：不调用推理服务，分级留空等待回填
    ///
    /// `request` 是请求体的解析结果，解析错误在存在性与冲突检查之后才返回。
    pub async fn record_manual_diagnosis(
        &self,
        caller: &Caller,
        exam_id: Uuid,
        request: Result<ManualDiagnosisRequest>,
    ) -> Result<AnalysisResponse> {
        info!("Recording manual diagnosis for exam {}", exam_id);

        let mut exam = self.authorized_exam(caller, exam_id).await?;
        self.ensure_no_result(&exam).await?;
        let diagnosis = request?.validate()?;
        let next_status = self.ensure_can_record(&exam)?;

        let result = self
            .results
            .create(NewExamResult::manual(exam.id, diagnosis))
            .await?;

        exam.status = next_status;
        exam.updated_at = Utc::now();

        info!("Manual diagnosis {} recorded for exam {}", result.id, exam.id);
        Ok(AnalysisResponse::new(exam, &result))
    }

    /// 部分更新结果；不改变检查状态，也不重新分级
    ///
    /// 与手工诊断相同，请求体解析错误在归属检查之后才返回。空变更不写存储。
    pub async fn update_result(
        &self,
        caller: &Caller,
        result_id: Uuid,
        request: Result<UpdateResultRequest>,
    ) -> Result<ExamResult> {
        let (current, _) = self.authorized_result(caller, result_id).await?;
        let changes = request?.validate()?;

        if changes.is_empty() {
            debug!("Result {} update carries no changes", result_id);
            return Ok(current);
        }

        let updated = self.results.update(result_id, &changes).await?;
        info!("Result {} updated", result_id);
        Ok(updated)
    }

    /// 删除结果，父检查回到待分析
    pub async fn delete_result(&self, caller: &Caller, result_id: Uuid) -> Result<Exam> {
        self.authorized_result(caller, result_id).await?;

        let exam = self.results.delete(result_id).await?;

        info!("Result {} deleted, exam {} is {}", result_id, exam.id, exam.status.as_str());
        Ok(exam)
    }

    pub async fn show_result(&self, caller: &Caller, result_id: Uuid) -> Result<ExamResult> {
        let (result, _) = self.authorized_result(caller, result_id).await?;
        Ok(result)
    }

    pub async fn list_results(&self, caller: &Caller) -> Result<Vec<ExamResult>> {
        self.results.list_for_owner(caller.user_id).await
    }

    /// 回填分级器上线前创建的结果，再次执行不会产生写入
    pub async fn migrate_legacy_results(&self, caller: &Caller) -> Result<BackfillReport> {
        let legacy = self.results.list_unclassified_for_owner(caller.user_id).await?;

        for result in &legacy {
            let severity = classify(
                result.probability_dr.unwrap_or(0.0),
                result.probability_no_dr.unwrap_or(0.0),
            );
            debug!("Backfilling result {} as {}", result.id, severity.as_str());
            self.results.set_detailed_diagnosis(result.id, severity).await?;
        }

        info!("Backfilled {} legacy results for user {}", legacy.len(), caller.user_id);
        Ok(BackfillReport {
            migrated_count: legacy.len(),
        })
    }

    pub async fn diagnosis_distribution(&self, caller: &Caller) -> Result<DiagnosisDistribution> {
        let results = self.results.list_for_owner(caller.user_id).await?;
        Ok(self.dashboard.aggregate(&results))
    }

    /// 暂存影像并调用推理服务；暂存文件在返回前释放
    async fn run_inference(&self, bytes: &[u8]) -> Result<Prediction> {
        let staged = self.staging.stage(bytes).await?;
        let outcome = self.inference.predict(staged.path()).await;

        if let Err(e) = staged.release() {
            warn!("Failed to remove staged image: {}", e);
        }

        if let Err(e) = &outcome {
            warn!("Inference failed: {}", e);
        }
        outcome
    }

    /// 查找调用者拥有的检查；不存在与无权访问一律报告为未找到
    async fn authorized_exam(&self, caller: &Caller, exam_id: Uuid) -> Result<Exam> {
        let not_found = || RetinaError::not_found(format!("Exam {} not found", exam_id));

        let exam = self.exams.find_exam(exam_id).await?.ok_or_else(not_found)?;
        if !self.authorizer.owns_patient(caller, exam.patient_id).await? {
            debug!("User {} does not own exam {}", caller.user_id, exam_id);
            return Err(not_found());
        }
        Ok(exam)
    }

    async fn authorized_result(&self, caller: &Caller, result_id: Uuid) -> Result<(ExamResult, Exam)> {
        let not_found = || RetinaError::not_found(format!("Result {} not found", result_id));

        let result = self.results.find(result_id).await?.ok_or_else(not_found)?;
        let exam = self.exams.find_exam(result.exam_id).await?.ok_or_else(not_found)?;
        if !self.authorizer.owns_patient(caller, exam.patient_id).await? {
            return Err(not_found());
        }
        Ok((result, exam))
    }

    async fn ensure_no_result(&self, exam: &Exam) -> Result<()> {
        if self.results.find_by_exam(exam.id).await?.is_some() {
            return Err(RetinaError::conflict(format!("Exam {} already has a result", exam.id)));
        }
        Ok(())
    }

    fn ensure_can_record(&self, exam: &Exam) -> Result<ExamStatus> {
        self.state_machine
            .transition(&exam.status, &ExamEvent::ResultRecorded)
            .map_err(|_| {
                RetinaError::conflict(format!(
                    "Exam {} is {} and cannot receive a result",
                    exam.id,
                    exam.status.as_str()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use retina_core::{BinaryDiagnosis, ExamResultView, NewExamResult, Severity};
    use retina_database::MemoryStore;
    use serde_json::{json, Value};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::Barrier;

    const IMAGE_URL: &str = "https://images.example/exam-1.png";

    struct StaticImages;

    #[async_trait]
    impl ImageStore for StaticImages {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            Ok(b"png-bytes".to_vec())
        }
    }

    /// 推理服务替身：记录收到的暂存路径，可选地在屏障处等待另一请求
    struct StubInference {
        response: std::result::Result<Value, String>,
        seen: Mutex<Vec<(PathBuf, bool)>>,
        barrier: Option<Barrier>,
    }

    impl StubInference {
        fn ok(body: Value) -> Self {
            Self { response: Ok(body), seen: Mutex::new(Vec::new()), barrier: None }
        }

        fn failing(upstream: &str) -> Self {
            Self { response: Err(upstream.to_string()), seen: Mutex::new(Vec::new()), barrier: None }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl InferenceClient for StubInference {
        async fn predict(&self, image_path: &Path) -> Result<Prediction> {
            self.seen
                .lock()
                .unwrap()
                .push((image_path.to_path_buf(), image_path.exists()));
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            match &self.response {
                Ok(body) => Ok(Prediction::from_json(body.clone())),
                Err(upstream) => Err(RetinaError::service_unavailable("inference failed", upstream.clone())),
            }
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        inference: Arc<StubInference>,
        orchestrator: Arc<ExamAnalysisOrchestrator>,
        caller: Caller,
        staging_dir: TempDir,
    }

    impl Fixture {
        async fn new(inference: StubInference) -> Self {
            let store = Arc::new(MemoryStore::new());
            let inference = Arc::new(inference);
            let staging_dir = tempfile::tempdir().unwrap();
            let orchestrator = ExamAnalysisOrchestrator::new(
                store.clone(),
                store.clone(),
                store.clone(),
                Arc::new(StaticImages),
                inference.clone(),
            )
            .with_staging(ImageStaging::in_dir(staging_dir.path()));

            Self {
                store,
                inference,
                orchestrator: Arc::new(orchestrator),
                caller: Caller::new(Uuid::new_v4()),
                staging_dir,
            }
        }

        async fn exam_with_image(&self, image: Option<&str>) -> Exam {
            let patient = self.store.add_patient(self.caller.user_id).await;
            let exam = Exam::new(patient, "retinography", image.map(str::to_string));
            self.store.add_exam(exam.clone()).await;
            exam
        }

        fn staged_files(&self) -> usize {
            std::fs::read_dir(self.staging_dir.path()).unwrap().count()
        }
    }

    fn proliferative_body() -> Value {
        json!({
            "probability_dr": 0.85,
            "probability_no_dr": 0.05,
            "class_predicted": 1,
            "recommendation": "Urgent referral"
        })
    }

    fn manual_request() -> ManualDiagnosisRequest {
        ManualDiagnosisRequest {
            diagnosis: Some("No_DR".to_string()),
            probability_dr: Some(0.2),
            probability_no_dr: Some(0.8),
            recommendation: Some("Routine screening in 12 months".to_string()),
            doctor_notes: Some("Clear fundus".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_analyze_creates_classified_result() {
        let fx = Fixture::new(StubInference::ok(proliferative_body())).await;
        let exam = fx.exam_with_image(Some(IMAGE_URL)).await;

        let response = fx.orchestrator.analyze_exam(&fx.caller, exam.id).await.unwrap();
        assert_eq!(response.exam.status, ExamStatus::Completed);
        assert_eq!(response.result.diagnosis, BinaryDiagnosis::Dr);
        assert!(response.result.is_auto_diagnosis);

        let stored = fx.store.find_by_exam(exam.id).await.unwrap().unwrap();
        assert_eq!(stored.detailed_diagnosis, Some(Severity::Proliferate));
        assert_eq!(stored.recommendation.as_deref(), Some("Urgent referral"));
        assert_eq!(stored.raw_response, Some(proliferative_body()));
        assert_eq!(fx.store.exam(exam.id).await.unwrap().status, ExamStatus::Completed);
    }

    #[tokio::test]
    async fn test_staged_image_removed_after_success() {
        let fx = Fixture::new(StubInference::ok(proliferative_body())).await;
        let exam = fx.exam_with_image(Some(IMAGE_URL)).await;

        fx.orchestrator.analyze_exam(&fx.caller, exam.id).await.unwrap();

        let seen = fx.inference.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].1, "staged file must exist during inference");
        assert!(!seen[0].0.exists());
        assert_eq!(fx.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_inference_failure_cleans_up_and_writes_nothing() {
        let fx = Fixture::new(StubInference::failing("model not loaded")).await;
        let exam = fx.exam_with_image(Some(IMAGE_URL)).await;

        let err = fx.orchestrator.analyze_exam(&fx.caller, exam.id).await.unwrap_err();
        match err {
            RetinaError::ServiceUnavailable { upstream, .. } => assert_eq!(upstream, "model not loaded"),
            other => panic!("unexpected error: {:?}", other),
        }

        assert_eq!(fx.staged_files(), 0);
        assert_eq!(fx.store.write_count().await, 0);
        assert_eq!(fx.store.exam(exam.id).await.unwrap().status, ExamStatus::Pending);
    }

    #[tokio::test]
    async fn test_second_analysis_conflicts_without_writes() {
        let fx = Fixture::new(StubInference::ok(proliferative_body())).await;
        let exam = fx.exam_with_image(Some(IMAGE_URL)).await;

        fx.orchestrator.analyze_exam(&fx.caller, exam.id).await.unwrap();
        let writes = fx.store.write_count().await;

        let err = fx.orchestrator.analyze_exam(&fx.caller, exam.id).await.unwrap_err();
        assert!(matches!(err, RetinaError::Conflict(_)));
        assert_eq!(fx.store.write_count().await, writes);
        assert_eq!(fx.inference.calls(), 1);
    }

    #[tokio::test]
    async fn test_preconditions_in_order() {
        let fx = Fixture::new(StubInference::ok(proliferative_body())).await;

        // 不存在
        let err = fx.orchestrator.analyze_exam(&fx.caller, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RetinaError::NotFound(_)));

        // 他人的检查同样报告未找到
        let exam = fx.exam_with_image(None).await;
        let stranger = Caller::new(Uuid::new_v4());
        let err = fx.orchestrator.analyze_exam(&stranger, exam.id).await.unwrap_err();
        assert!(matches!(err, RetinaError::NotFound(_)));

        // 已有结果优先于缺少影像
        fx.orchestrator
            .record_manual_diagnosis(&fx.caller, exam.id, Ok(manual_request()))
            .await
            .unwrap();
        let err = fx.orchestrator.analyze_exam(&fx.caller, exam.id).await.unwrap_err();
        assert!(matches!(err, RetinaError::Conflict(_)));

        // 缺少影像
        let bare = fx.exam_with_image(Some("   ")).await;
        let err = fx.orchestrator.analyze_exam(&fx.caller, bare.id).await.unwrap_err();
        assert!(matches!(err, RetinaError::UnprocessableEntity(_)));
        assert_eq!(fx.inference.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_exam_cannot_be_analyzed() {
        let fx = Fixture::new(StubInference::ok(proliferative_body())).await;
        let mut exam = fx.exam_with_image(Some(IMAGE_URL)).await;
        exam.status = ExamStatus::Cancelled;
        fx.store.add_exam(exam.clone()).await;

        let err = fx.orchestrator.analyze_exam(&fx.caller, exam.id).await.unwrap_err();
        assert!(matches!(err, RetinaError::Conflict(_)));
        assert_eq!(fx.inference.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_analyses_create_exactly_one_result() {
        let mut inference = StubInference::ok(proliferative_body());
        inference.barrier = Some(Barrier::new(2));
        let fx = Fixture::new(inference).await;
        let exam = fx.exam_with_image(Some(IMAGE_URL)).await;

        // 两个请求都通过快速路径检查，在推理处汇合后同时写入
        let (first, second) = tokio::join!(
            fx.orchestrator.analyze_exam(&fx.caller, exam.id),
            fx.orchestrator.analyze_exam(&fx.caller, exam.id),
        );

        let outcomes = [first, second];
        let successes = outcomes.iter().filter(|o| o.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|o| matches!(o, Err(RetinaError::Conflict(_))))
            .count();
        assert_eq!((successes, conflicts), (1, 1));
        assert_eq!(fx.inference.calls(), 2);
        assert_eq!(fx.store.result_count().await, 1);
        assert_eq!(fx.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_manual_diagnosis() {
        let fx = Fixture::new(StubInference::ok(proliferative_body())).await;
        let exam = fx.exam_with_image(None).await;

        let response = fx
            .orchestrator
            .record_manual_diagnosis(&fx.caller, exam.id, Ok(manual_request()))
            .await
            .unwrap();
        assert_eq!(response.exam.status, ExamStatus::Completed);
        assert!(!response.result.is_auto_diagnosis);
        assert_eq!(response.result.doctor_notes.as_deref(), Some("Clear fundus"));

        let stored = fx.store.find_by_exam(exam.id).await.unwrap().unwrap();
        assert_eq!(stored.detailed_diagnosis, None);
        assert_eq!(fx.inference.calls(), 0);
    }

    #[tokio::test]
    async fn test_manual_diagnosis_validation() {
        let fx = Fixture::new(StubInference::ok(proliferative_body())).await;
        let exam = fx.exam_with_image(None).await;

        let request = ManualDiagnosisRequest {
            recommendation: None,
            ..manual_request()
        };
        let err = fx
            .orchestrator
            .record_manual_diagnosis(&fx.caller, exam.id, Ok(request))
            .await
            .unwrap_err();
        assert!(matches!(err, RetinaError::UnprocessableEntity(_)));
        assert_eq!(fx.store.exam(exam.id).await.unwrap().status, ExamStatus::Pending);
    }

    #[tokio::test]
    async fn test_malformed_body_reported_after_existence_and_conflict() {
        let fx = Fixture::new(StubInference::ok(proliferative_body())).await;
        let malformed = || Err(RetinaError::unprocessable("Invalid request body"));

        let err = fx
            .orchestrator
            .record_manual_diagnosis(&fx.caller, Uuid::new_v4(), malformed())
            .await
            .unwrap_err();
        assert!(matches!(err, RetinaError::NotFound(_)));

        let exam = fx.exam_with_image(None).await;
        fx.orchestrator
            .record_manual_diagnosis(&fx.caller, exam.id, Ok(manual_request()))
            .await
            .unwrap();
        let err = fx
            .orchestrator
            .record_manual_diagnosis(&fx.caller, exam.id, malformed())
            .await
            .unwrap_err();
        assert!(matches!(err, RetinaError::Conflict(_)));

        let fresh = fx.exam_with_image(None).await;
        let err = fx
            .orchestrator
            .record_manual_diagnosis(&fx.caller, fresh.id, malformed())
            .await
            .unwrap_err();
        assert!(matches!(err, RetinaError::UnprocessableEntity(_)));

        let err = fx
            .orchestrator
            .update_result(&fx.caller, Uuid::new_v4(), Err(RetinaError::unprocessable("Invalid request body")))
            .await
            .unwrap_err();
        assert!(matches!(err, RetinaError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_update_skips_store_write() {
        let fx = Fixture::new(StubInference::ok(proliferative_body())).await;
        let exam = fx.exam_with_image(Some(IMAGE_URL)).await;
        let response = fx.orchestrator.analyze_exam(&fx.caller, exam.id).await.unwrap();
        let writes = fx.store.write_count().await;

        let unchanged = fx
            .orchestrator
            .update_result(&fx.caller, response.result.id, Ok(UpdateResultRequest::default()))
            .await
            .unwrap();

        assert_eq!(ExamResultView::from(&unchanged), response.result);
        assert_eq!(fx.store.write_count().await, writes);
    }

    #[tokio::test]
    async fn test_update_does_not_reclassify_or_touch_status() {
        let fx = Fixture::new(StubInference::ok(proliferative_body())).await;
        let exam = fx.exam_with_image(Some(IMAGE_URL)).await;
        let response = fx.orchestrator.analyze_exam(&fx.caller, exam.id).await.unwrap();

        let updated = fx
            .orchestrator
            .update_result(
                &fx.caller,
                response.result.id,
                Ok(UpdateResultRequest {
                    probability_dr: Some(Some(0.1)),
                    doctor_notes: Some(Some("Reviewed".to_string())),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        assert_eq!(updated.probability_dr, Some(0.1));
        assert_eq!(updated.detailed_diagnosis, Some(Severity::Proliferate));
        assert_eq!(updated.diagnosis, BinaryDiagnosis::Dr);
        assert_eq!(fx.store.exam(exam.id).await.unwrap().status, ExamStatus::Completed);
    }

    #[tokio::test]
    async fn test_delete_reverts_exam_to_pending() {
        let fx = Fixture::new(StubInference::ok(proliferative_body())).await;
        let exam = fx.exam_with_image(Some(IMAGE_URL)).await;
        let response = fx.orchestrator.analyze_exam(&fx.caller, exam.id).await.unwrap();

        let stranger = Caller::new(Uuid::new_v4());
        let err = fx.orchestrator.delete_result(&stranger, response.result.id).await.unwrap_err();
        assert!(matches!(err, RetinaError::NotFound(_)));

        let reverted = fx.orchestrator.delete_result(&fx.caller, response.result.id).await.unwrap();
        assert_eq!(reverted.status, ExamStatus::Pending);
        assert_eq!(fx.store.exam(exam.id).await.unwrap().status, ExamStatus::Pending);

        // 回到待分析后可以再次分析
        fx.orchestrator.analyze_exam(&fx.caller, exam.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_backfill_is_idempotent() {
        let fx = Fixture::new(StubInference::ok(proliferative_body())).await;

        let legacy = [(Some(0.85), Some(0.20)), (Some(0.10), Some(0.80)), (None, None)];
        for (p_dr, p_no_dr) in legacy {
            let exam = fx.exam_with_image(Some(IMAGE_URL)).await;
            let mut new = NewExamResult::automatic(exam.id, &Prediction::from_json(json!({})));
            new.diagnosis = BinaryDiagnosis::Dr;
            new.detailed_diagnosis = None;
            new.probability_dr = p_dr;
            new.probability_no_dr = p_no_dr;
            fx.store.import_result(new.into_result(Uuid::new_v4())).await;
        }

        let before = fx.orchestrator.diagnosis_distribution(&fx.caller).await.unwrap();
        assert_eq!(before.distribution.mild, 3);

        let first = fx.orchestrator.migrate_legacy_results(&fx.caller).await.unwrap();
        assert_eq!(first.migrated_count, 3);
        let after_first = fx.orchestrator.diagnosis_distribution(&fx.caller).await.unwrap();
        assert_eq!(after_first.distribution.severe, 1);
        assert_eq!(after_first.distribution.no_dr, 2);

        let writes = fx.store.write_count().await;
        let second = fx.orchestrator.migrate_legacy_results(&fx.caller).await.unwrap();
        assert_eq!(second.migrated_count, 0);
        assert_eq!(fx.store.write_count().await, writes);
        let after_second = fx.orchestrator.diagnosis_distribution(&fx.caller).await.unwrap();
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn test_backfill_only_touches_callers_results() {
        let fx = Fixture::new(StubInference::ok(proliferative_body())).await;
        let other = Caller::new(Uuid::new_v4());
        let patient = fx.store.add_patient(other.user_id).await;
        let exam = Exam::new(patient, "retinography", None);
        fx.store.add_exam(exam.clone()).await;
        let mut new = NewExamResult::automatic(exam.id, &Prediction::from_json(json!({})));
        new.detailed_diagnosis = None;
        fx.store.import_result(new.into_result(Uuid::new_v4())).await;

        let report = fx.orchestrator.migrate_legacy_results(&fx.caller).await.unwrap();
        assert_eq!(report.migrated_count, 0);
        let untouched = fx.store.find_by_exam(exam.id).await.unwrap().unwrap();
        assert_eq!(untouched.detailed_diagnosis, None);
    }
}
