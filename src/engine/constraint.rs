// ==========================================
// 排班草案引擎 - 约束评估器
// ==========================================
// 红线: 硬约束 (技能/不可用/重叠) 阻断自动分配,仅允许人工覆盖并打标
// 红线: 软约束 (周工时/休息/连续天数/均衡/成本) 只产生警告与惩罚
// ==========================================
// 职责: 单笔分配校验 + 整份草案批量校验
// 输入: 班次 + 员工候选 + 已提交分配
// 输出: 违规列表 + 惩罚向量 + 置信度
// ==========================================

mod core;
mod rules;
mod timeline;

#[cfg(test)]
mod tests;

pub use core::ConstraintEvaluator;
pub(crate) use core::staff_lookup;
pub use timeline::{ScheduleIndex, TimelineEntry};
