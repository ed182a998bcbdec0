// ==========================================
// 排班草案引擎 - 引擎层
// ==========================================
// 职责: 约束评估、分配排序、策略加权、生命周期事件
// 红线: Engine 不拼 SQL, 只通过 ScheduleStore 访问存储
// 红线: 所有自动分配必须输出理由与置信度
// ==========================================

pub mod cancel;
pub mod constraint;
pub mod error;
pub mod events;
pub mod oracle;
pub mod ranker;
pub mod strategy;

// 重导出核心引擎
pub use cancel::CancelSignal;
pub use constraint::{ConstraintEvaluator, ScheduleIndex};
pub use error::{EngineError, EngineResult};
pub use events::{
    DraftEvent, DraftEventPublisher, DraftEventType, NoOpEventPublisher, OptionalEventPublisher,
};
pub use oracle::{OracleContext, OracleError, OracleStatus, OracleSuggestion, RankingOracle};
pub use ranker::{
    AssignmentRanker, DiagnosticCode, GenerationOutcome, GenerationRequest, ShiftDiagnostic,
};
pub use strategy::{AssignmentStrategy, StrategyWeights};
