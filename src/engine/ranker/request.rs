use crate::config::ConstraintConfig;
use crate::domain::draft::{DateRange, ScheduleDraft, SpecialEvent, StaffNote};
use crate::engine::oracle::OracleStatus;
use crate::engine::strategy::{AssignmentStrategy, StrategyWeights};
use serde::{Deserialize, Serialize};

// ==========================================
// GenerationRequest - 草案生成请求
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub business_id: String,
    pub date_range: DateRange,
    #[serde(default)]
    pub special_events: Vec<SpecialEvent>,
    #[serde(default)]
    pub staff_notes: Vec<StaffNote>,
    /// 约束配置 (None 使用引擎默认)
    #[serde(default)]
    pub constraints: Option<ConstraintConfig>,
    #[serde(default)]
    pub strategy: AssignmentStrategy,
    /// 自定义策略权重 (覆盖 strategy 预设)
    #[serde(default)]
    pub custom_weights: Option<StrategyWeights>,
}

impl GenerationRequest {
    pub fn new(business_id: impl Into<String>, date_range: DateRange) -> Self {
        Self {
            business_id: business_id.into(),
            date_range,
            special_events: Vec::new(),
            staff_notes: Vec::new(),
            constraints: None,
            strategy: AssignmentStrategy::default(),
            custom_weights: None,
        }
    }

    pub fn with_strategy(mut self, strategy: AssignmentStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// 生效的策略权重
    pub fn weights(&self) -> StrategyWeights {
        self.custom_weights
            .clone()
            .unwrap_or_else(|| self.strategy.weights())
    }

    /// 某日的特殊事件紧急度加成
    pub fn urgency_boost(&self, date: chrono::NaiveDate) -> u32 {
        self.special_events
            .iter()
            .filter(|e| e.date == date)
            .map(|e| e.urgency_boost)
            .sum()
    }
}

// ==========================================
// 覆盖诊断
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    /// 没有候选通过硬约束
    InsufficientStaff,
    /// 候选不足需求人数
    PartiallyStaffed,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::InsufficientStaff => "INSUFFICIENT_STAFF",
            DiagnosticCode::PartiallyStaffed => "PARTIALLY_STAFFED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftDiagnostic {
    pub shift_id: String,
    pub code: DiagnosticCode,
    pub required: u32,
    pub assigned: u32,
    pub message: String,
}

// ==========================================
// GenerationOutcome - 生成结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub draft: ScheduleDraft,
    pub diagnostics: Vec<ShiftDiagnostic>,
    pub oracle_status: OracleStatus,
}

impl GenerationOutcome {
    pub fn diagnostic_for(&self, shift_id: &str) -> Option<&ShiftDiagnostic> {
        self.diagnostics.iter().find(|d| d.shift_id == shift_id)
    }
}
