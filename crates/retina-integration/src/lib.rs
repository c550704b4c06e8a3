//! # 外部服务集成模块
//!
//! 提供检查分析所依赖的外部服务客户端：
//! - 推理服务客户端：上传视网膜影像并解析预测概率
//! - 影像存储客户端：按地址读取检查影像

pub mod image_store;
pub mod inference;

pub use image_store::{HttpImageStore, ImageStore, ImageStoreConfig};
pub use inference::{HttpInferenceClient, InferenceClient, InferenceConfig};
