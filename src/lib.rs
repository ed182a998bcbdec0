// ==========================================
// 排班草案引擎 - 核心库
// ==========================================
// 技术栈: Rust + Tokio + SQLite
// 系统定位: 决策支持系统 (草案由人工审阅、编辑、发布)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 约束评估与分配排序
pub mod engine;

// 草案编辑层 - 状态机与自动同步
pub mod draft;

// 协同编辑层 - 在线状态/编辑锁/冲突裁决
pub mod collab;

// 发布层 - 发布编排
pub mod publish;

// 员工通知接口
pub mod notify;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域实体
pub use domain::{
    Actor, Assignment, ConstraintViolation, DateRange, DraftStatus, EditAction, ScheduleDraft,
    Shift, ShiftStatus, StaffCandidate,
};

// 引擎
pub use engine::{AssignmentRanker, ConstraintEvaluator, GenerationRequest};

// 草案编辑与协同
pub use collab::{CollaborationClient, CollaborativeEditor, LocalHub};
pub use draft::{DraftAction, DraftStateMachine};

// 发布
pub use publish::PublishOrchestrator;

// API
pub use api::{ApiError, ApiResult, SchedulingApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "排班草案引擎";
