// ==========================================
// 排班草案引擎 - 分配策略定义
// ==========================================
// 用途:
// - 草案生成时对同一惩罚向量重新加权 (各策略共享约束规则);
// - 排序因子 (成本/可靠性/负载/偏好) 的权重随策略变化;
// - 自定义策略在预设策略基础上覆盖因子权重。
// ==========================================

use crate::config::{CustomStrategyParameters, CustomStrategyProfile};
use crate::domain::types::ConstraintType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 分配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    Balanced,
    CostOptimized,
    StaffPreferred,
    CoverageFocused,
}

impl AssignmentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStrategy::Balanced => "balanced",
            AssignmentStrategy::CostOptimized => "cost_optimized",
            AssignmentStrategy::StaffPreferred => "staff_preferred",
            AssignmentStrategy::CoverageFocused => "coverage_focused",
        }
    }

    pub fn title_cn(&self) -> &'static str {
        match self {
            AssignmentStrategy::Balanced => "均衡方案",
            AssignmentStrategy::CostOptimized => "成本优先",
            AssignmentStrategy::StaffPreferred => "员工偏好优先",
            AssignmentStrategy::CoverageFocused => "覆盖优先",
        }
    }

    /// 预设权重
    pub fn weights(&self) -> StrategyWeights {
        use ConstraintType::*;
        match self {
            AssignmentStrategy::Balanced => StrategyWeights::new(0.25, 0.25, 0.25, 0.25, &[]),
            AssignmentStrategy::CostOptimized => StrategyWeights::new(
                0.6,
                0.15,
                0.15,
                0.1,
                &[(LaborCost, 2.0), (Distribution, 0.5)],
            ),
            AssignmentStrategy::StaffPreferred => StrategyWeights::new(
                0.1,
                0.2,
                0.2,
                0.5,
                &[(WeeklyHours, 1.5), (MinRest, 1.5), (ConsecutiveDays, 1.5)],
            ),
            AssignmentStrategy::CoverageFocused => StrategyWeights::new(
                0.1,
                0.5,
                0.3,
                0.1,
                &[
                    (WeeklyHours, 0.5),
                    (MinRest, 0.5),
                    (ConsecutiveDays, 0.5),
                    (Distribution, 0.5),
                    (LaborCost, 0.5),
                ],
            ),
        }
    }
}

impl Default for AssignmentStrategy {
    fn default() -> Self {
        AssignmentStrategy::Balanced
    }
}

impl std::fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AssignmentStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "balanced" => Ok(AssignmentStrategy::Balanced),
            "cost_optimized" | "cost-optimized" => Ok(AssignmentStrategy::CostOptimized),
            "staff_preferred" | "staff-preferred" => Ok(AssignmentStrategy::StaffPreferred),
            "coverage_focused" | "coverage-focused" => Ok(AssignmentStrategy::CoverageFocused),
            other => Err(format!("未知策略类型: {}", other)),
        }
    }
}

// ==========================================
// StrategyWeights - 策略权重
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeights {
    /// 成本因子 (低时薪优先)
    pub cost_weight: f64,
    /// 可靠性因子
    pub reliability_weight: f64,
    /// 负载因子 (本周工时少者优先)
    pub load_weight: f64,
    /// 偏好因子 (偏好工作日)
    pub preference_weight: f64,
    /// 约束惩罚倍率 (未列出为 1.0)
    pub constraint_multipliers: BTreeMap<ConstraintType, f64>,
}

impl StrategyWeights {
    fn new(
        cost_weight: f64,
        reliability_weight: f64,
        load_weight: f64,
        preference_weight: f64,
        multipliers: &[(ConstraintType, f64)],
    ) -> Self {
        Self {
            cost_weight,
            reliability_weight,
            load_weight,
            preference_weight,
            constraint_multipliers: multipliers.iter().copied().collect(),
        }
    }

    /// 解析自定义策略: 预设权重 + 参数覆盖
    pub fn from_profile(profile: &CustomStrategyProfile) -> Result<Self, String> {
        let base: AssignmentStrategy = profile.base_strategy.parse()?;
        Ok(base.weights().with_parameters(&profile.parameters))
    }

    pub fn with_parameters(mut self, params: &CustomStrategyParameters) -> Self {
        if let Some(w) = params.cost_weight {
            self.cost_weight = w.max(0.0);
        }
        if let Some(w) = params.reliability_weight {
            self.reliability_weight = w.max(0.0);
        }
        if let Some(w) = params.load_weight {
            self.load_weight = w.max(0.0);
        }
        if let Some(w) = params.preference_weight {
            self.preference_weight = w.max(0.0);
        }
        self
    }

    pub fn multiplier(&self, constraint: ConstraintType) -> f64 {
        self.constraint_multipliers
            .get(&constraint)
            .copied()
            .unwrap_or(1.0)
    }

    /// 因子加权平均 (各因子取值 [0,1])
    pub fn factor_score(&self, cost: f64, reliability: f64, load: f64, preference: f64) -> f64 {
        let total =
            self.cost_weight + self.reliability_weight + self.load_weight + self.preference_weight;
        if total <= 0.0 {
            return 0.0;
        }
        (self.cost_weight * cost
            + self.reliability_weight * reliability
            + self.load_weight * load
            + self.preference_weight * preference)
            / total
    }
}

impl Default for StrategyWeights {
    fn default() -> Self {
        AssignmentStrategy::default().weights()
    }
}
