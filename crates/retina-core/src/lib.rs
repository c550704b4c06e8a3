//! # Retina Core
//!
//! 视网膜检查分析系统的核心模块，提供基础数据结构、错误定义、严重程度分类器
//! 以及各外部协作方（存储、授权）的接口定义。

pub mod classifier;
pub mod error;
pub mod models;
pub mod ports;
pub mod views;

pub use classifier::{binary, classify};
pub use error::{RetinaError, Result};
pub use models::*;
pub use ports::{Authorizer, ExamStore, ResultStore};
pub use views::{AnalysisResponse, ExamResultView};
