//! 检查分析演示程序
//!
//! 使用内存存储和模拟推理服务，展示自动分析、手工诊断、重复分析冲突、
//! 结果删除、历史回填与仪表盘统计。

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use retina::retina_core::{
    Caller, Exam, ExamResult, ManualDiagnosisRequest, NewExamResult, Prediction, Result, Severity,
};
use retina::retina_database::MemoryStore;
use retina::retina_integration::{ImageStore, InferenceClient};
use retina::retina_workflow::ExamAnalysisOrchestrator;
use serde_json::json;
use uuid::Uuid;

/// 以 URL 作为影像内容的模拟影像存储
struct DemoImageStore;

#[async_trait]
impl ImageStore for DemoImageStore {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        Ok(url.as_bytes().to_vec())
    }
}

/// 根据影像内容返回固定概率的模拟推理服务
struct DemoInference;

#[async_trait]
impl InferenceClient for DemoInference {
    async fn predict(&self, image_path: &Path) -> Result<Prediction> {
        let content = tokio::fs::read_to_string(image_path).await?;
        let (p_dr, p_no_dr) = if content.contains("severe") {
            (0.85, 0.20)
        } else if content.contains("moderate") {
            (0.65, 0.30)
        } else {
            (0.10, 0.80)
        };

        Ok(Prediction::from_json(json!({
            "probability_dr": p_dr,
            "probability_no_dr": p_no_dr,
            "class_predicted": if p_dr >= 0.5 { 1 } else { 0 },
            "recommendation": if p_dr >= 0.5 { "Refer to ophthalmologist" } else { "Routine screening" }
        })))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("视网膜检查分析演示\n");

    let store = Arc::new(MemoryStore::new());
    let orchestrator = ExamAnalysisOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(DemoImageStore),
        Arc::new(DemoInference),
    );

    let caller = Caller::new(Uuid::new_v4());
    let patient = store.add_patient(caller.user_id).await;

    // 1. 自动分析
    let mut exams = Vec::new();
    for image in ["severe", "moderate", "healthy"] {
        let exam = Exam::new(patient, "retinography", Some(format!("https://images.example/{}.png", image)));
        store.add_exam(exam.clone()).await;
        exams.push(exam);
    }

    for exam in &exams {
        let response = orchestrator.analyze_exam(&caller, exam.id).await?;
        println!(
            "检查 {} -> 诊断 {}，状态 {}",
            exam.id,
            response.result.diagnosis.as_str(),
            response.exam.status.as_str()
        );
    }

    // 2. 重复分析返回冲突
    match orchestrator.analyze_exam(&caller, exams[0].id).await {
        Ok(_) => println!("意外：重复分析成功"),
        Err(e) => println!("重复分析被拒绝: {}", e),
    }

    // 3. 手工诊断
    let manual_exam = Exam::new(patient, "retinography", None);
    store.add_exam(manual_exam.clone()).await;
    let manual = orchestrator
        .record_manual_diagnosis(
            &caller,
            manual_exam.id,
            Ok(ManualDiagnosisRequest {
                diagnosis: Some("DR".to_string()),
                probability_dr: Some(0.85),
                probability_no_dr: Some(0.05),
                recommendation: Some("Urgent referral".to_string()),
                doctor_notes: Some("Neovascularization observed".to_string()),
                ..Default::default()
            }),
        )
        .await?;
    println!("手工诊断已记录: {}", manual.result.id);

    // 4. 导入一条分级器上线前的历史结果
    let legacy_exam = Exam::new(patient, "retinography", None);
    store.add_exam(legacy_exam.clone()).await;
    let mut legacy = NewExamResult::automatic(legacy_exam.id, &Prediction::from_json(json!({})));
    legacy.detailed_diagnosis = None;
    legacy.probability_dr = Some(0.85);
    legacy.probability_no_dr = Some(0.40);
    store.import_result(legacy.into_result(Uuid::new_v4())).await;

    print_distribution("回填前", &orchestrator, &caller).await?;

    let report = orchestrator.migrate_legacy_results(&caller).await?;
    println!("\n回填了 {} 条历史结果", report.migrated_count);
    print_distribution("回填后", &orchestrator, &caller).await?;

    // 5. 删除结果，检查回到待分析
    let results: Vec<ExamResult> = orchestrator.list_results(&caller).await?;
    if let Some(first) = results.first() {
        let exam = orchestrator.delete_result(&caller, first.id).await?;
        println!("\n删除结果 {}，检查 {} 状态为 {}", first.id, exam.id, exam.status.as_str());
    }

    println!("\n演示完成");
    Ok(())
}

async fn print_distribution(
    title: &str,
    orchestrator: &ExamAnalysisOrchestrator,
    caller: &Caller,
) -> anyhow::Result<()> {
    let report = orchestrator.diagnosis_distribution(caller).await?;
    println!("\n{} 诊断分布（共 {} 例）:", title, report.total_exams);
    for (bucket, label) in &report.labels {
        let count = Severity::parse(bucket).map_or(0, |s| report.distribution.get(s));
        println!("  {:<12} {:<16} {}", bucket, label, count);
    }
    Ok(())
}
