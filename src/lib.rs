//! 视网膜检查自动分析服务
//!
//! 汇总各子 crate，供演示程序和外部集成直接使用。

pub use retina_core;
pub use retina_database;
pub use retina_integration;
pub use retina_workflow;
