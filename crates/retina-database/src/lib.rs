//! # 检查结果存储模块
//!
//! 提供检查与结果的持久化：基于 PostgreSQL 的 `PgStore`（唯一约束保证每个检查至多一个结果），
//! 以及用于测试和演示的内存实现 `MemoryStore`。

pub mod connection;
pub mod memory;
pub mod models;
pub mod queries;
pub mod store;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use queries::DatabaseQueries;
pub use store::PgStore;
