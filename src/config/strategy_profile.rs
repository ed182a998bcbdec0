use serde::{Deserialize, Serialize};

/// 自定义策略（持久化对象）
///
/// 存储位置：config_kv（scope_id='global'，key='custom_strategy/{strategy_id}'）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomStrategyProfile {
    /// 自定义策略 ID（用于选择/引用）
    pub strategy_id: String,

    /// 显示名称
    pub title: String,

    /// 说明（可选）
    #[serde(default)]
    pub description: Option<String>,

    /// 基于哪个预设策略（balanced/cost_optimized/staff_preferred/coverage_focused）
    pub base_strategy: String,

    /// 参数（排序因子权重，未设置的沿用预设值）
    #[serde(default)]
    pub parameters: CustomStrategyParameters,
}

/// 自定义策略参数
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CustomStrategyParameters {
    /// 成本因子权重（越大越偏向低时薪员工）
    #[serde(default)]
    pub cost_weight: Option<f64>,

    /// 可靠性因子权重（越大越偏向高可靠性员工）
    #[serde(default)]
    pub reliability_weight: Option<f64>,

    /// 负载因子权重（越大越偏向本周工时少的员工）
    #[serde(default)]
    pub load_weight: Option<f64>,

    /// 偏好因子权重（越大越尊重员工偏好工作日）
    #[serde(default)]
    pub preference_weight: Option<f64>,
}
