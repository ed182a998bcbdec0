// ==========================================
// 排班草案引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 持久化协作者接口 + SQLite 参考实现
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod schedule_store;
pub mod sqlite_store;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use schedule_store::ScheduleStore;
pub use sqlite_store::SqliteScheduleStore;
