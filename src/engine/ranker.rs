// ==========================================
// 排班草案引擎 - 分配排序引擎
// ==========================================
// 职责: 逐班次构建候选池、评分、选取前 N 名,生成排班草案
// 输入: 存储快照 + 特殊事件 + 员工备注 + 约束 + 策略
// 输出: ScheduleDraft + 覆盖诊断 + 预言机状态
// ==========================================
// 注: 贪心而非全局最优,草案发布前由人工审阅编辑
// ==========================================

mod core;
mod request;
mod scoring;

#[cfg(test)]
mod tests;

pub use core::AssignmentRanker;
pub use request::{DiagnosticCode, GenerationOutcome, GenerationRequest, ShiftDiagnostic};
