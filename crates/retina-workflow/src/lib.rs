//! # 检查分析工作流模块
//!
//! 提供检查分析的完整编排功能，包括：
//! - 检查状态机：约束检查在待分析、已完成、已取消之间的转换
//! - 影像暂存：推理前把影像写入临时文件，任何退出路径都会删除
//! - 分析编排器：自动分析、手工诊断、结果维护与历史数据回填
//! - 仪表盘统计：按严重程度分布汇总结果

pub mod dashboard;
pub mod orchestrator;
pub mod staging;
pub mod state_machine;

// 重新导出主要类型
pub use dashboard::{DashboardAggregator, DiagnosisDistribution, SeverityCounts};
pub use orchestrator::{BackfillReport, ExamAnalysisOrchestrator};
pub use staging::{ImageStaging, StagedImage};
pub use state_machine::{ExamEvent, ExamStateMachine};
