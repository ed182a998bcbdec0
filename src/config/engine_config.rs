// ==========================================
// 排班草案引擎 - 引擎配置
// ==========================================
// 职责: 约束阈值、惩罚权重、超时与退避参数
// 说明: 所有时长以毫秒存储,通过访问器转换为 Duration
// ==========================================

use crate::domain::types::ConstraintType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ==========================================
// ConstraintConfig - 约束配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// 周工时目标 (小时)
    pub weekly_hour_target: f64,
    /// 相邻班次最小休息 (小时)
    pub min_rest_hours: f64,
    /// 最大连续工作天数
    pub max_consecutive_days: u32,
    /// 周期人工成本上限 (None 表示不限)
    pub labor_cost_ceiling: Option<f64>,
    /// 分配均衡容差: 超过同技能最少者的班次数
    pub distribution_tolerance: u32,
    /// 各约束惩罚权重
    pub penalty_weights: BTreeMap<ConstraintType, f64>,
    /// 惩罚归一化分母
    pub penalty_normalizer: f64,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            weekly_hour_target: 40.0,
            min_rest_hours: 10.0,
            max_consecutive_days: 6,
            labor_cost_ceiling: None,
            distribution_tolerance: 2,
            penalty_weights: default_penalty_weights(),
            penalty_normalizer: 1.0,
        }
    }
}

impl ConstraintConfig {
    /// 约束权重 (未配置时硬约束为 1.0, 软约束为 0.2)
    pub fn weight_of(&self, constraint: ConstraintType) -> f64 {
        self.penalty_weights
            .get(&constraint)
            .copied()
            .unwrap_or(if constraint.is_hard() { 1.0 } else { 0.2 })
    }
}

fn default_penalty_weights() -> BTreeMap<ConstraintType, f64> {
    BTreeMap::from([
        (ConstraintType::SkillMismatch, 1.0),
        (ConstraintType::Unavailable, 1.0),
        (ConstraintType::DoubleBooking, 1.0),
        (ConstraintType::UnknownStaff, 1.0),
        (ConstraintType::WeeklyHours, 0.3),
        (ConstraintType::MinRest, 0.25),
        (ConstraintType::ConsecutiveDays, 0.2),
        (ConstraintType::Distribution, 0.1),
        (ConstraintType::LaborCost, 0.25),
        (ConstraintType::Understaffed, 0.0),
    ])
}

// ==========================================
// RankerConfig - 排序引擎配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// 外部排序预言机超时
    pub oracle_timeout_ms: u64,
    /// 预言机排名在综合得分中的权重 [0,1]
    pub oracle_weight: f64,
    /// 是否允许无冲突班次组并行评分
    pub parallel_groups: bool,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            oracle_timeout_ms: 8_000,
            oracle_weight: 0.5,
            parallel_groups: true,
        }
    }
}

impl RankerConfig {
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }
}

// ==========================================
// SyncConfig - 自动同步配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 静默窗口: 最后一次编辑后等待多久再同步
    pub quiet_window_ms: u64,
    /// 单次保存超时
    pub save_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            quiet_window_ms: 1_500,
            save_timeout_ms: 10_000,
        }
    }
}

impl SyncConfig {
    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.quiet_window_ms)
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_millis(self.save_timeout_ms)
    }
}

// ==========================================
// ReconnectPolicy - 重连退避策略
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            max_attempts: 5,
        }
    }
}

// ==========================================
// CollaborationConfig - 协同配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborationConfig {
    /// 加锁请求超时 (超时视为失败)
    pub lock_timeout_ms: u64,
    /// 锁自动过期时长
    pub lock_ttl_ms: u64,
    /// 冲突检测窗口
    pub conflict_window_ms: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            lock_ttl_ms: 60_000,
            conflict_window_ms: 2_000,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl CollaborationConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn conflict_window(&self) -> Duration {
        Duration::from_millis(self.conflict_window_ms)
    }
}

// ==========================================
// PublishConfig - 发布配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// 单个员工通知超时
    pub notification_timeout_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            notification_timeout_ms: 5_000,
        }
    }
}

impl PublishConfig {
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }
}

// ==========================================
// EngineConfig - 聚合配置
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub constraints: ConstraintConfig,
    pub ranker: RankerConfig,
    pub sync: SyncConfig,
    pub collaboration: CollaborationConfig,
    pub publish: PublishConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.collaboration.lock_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.constraints.weight_of(ConstraintType::SkillMismatch), 1.0);
        assert_eq!(cfg.constraints.weight_of(ConstraintType::WeeklyHours), 0.3);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"constraints":{"min_rest_hours":12.0}}"#).unwrap();
        assert_eq!(cfg.constraints.min_rest_hours, 12.0);
        assert_eq!(cfg.constraints.weekly_hour_target, 40.0);
        assert_eq!(cfg.ranker.oracle_timeout_ms, 8_000);
    }
}
