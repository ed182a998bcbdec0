// ==========================================
// 排班草案引擎 - 约束违规领域模型
// ==========================================
// 红线: 违规只是临时提示,从不作为权威状态持久化
// ==========================================

use crate::domain::types::{ConstraintType, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// ConstraintViolation - 约束违规
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub constraint_type: ConstraintType,
    pub severity: Severity,
    pub message: String,
    pub staff_id: Option<String>,
    pub shift_id: Option<String>,
    pub suggested_resolution: Option<String>,
    /// 是否为人工覆盖后降级的硬约束
    #[serde(default)]
    pub overridden: bool,
}

impl ConstraintViolation {
    pub fn new(constraint_type: ConstraintType, message: impl Into<String>) -> Self {
        Self {
            constraint_type,
            severity: constraint_type.default_severity(),
            message: message.into(),
            staff_id: None,
            shift_id: None,
            suggested_resolution: None,
            overridden: false,
        }
    }

    pub fn for_staff(mut self, staff_id: impl Into<String>) -> Self {
        self.staff_id = Some(staff_id.into());
        self
    }

    pub fn for_shift(mut self, shift_id: impl Into<String>) -> Self {
        self.shift_id = Some(shift_id.into());
        self
    }

    pub fn with_resolution(mut self, resolution: Option<String>) -> Self {
        self.suggested_resolution = resolution;
        self
    }

    /// 人工覆盖: 硬约束降级为警告并打标
    pub fn downgrade_as_override(mut self, note: &str) -> Self {
        if self.severity == Severity::Error {
            self.severity = Severity::Warning;
            self.overridden = true;
            self.message = format!("{} (人工覆盖: {})", self.message, note);
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

// ==========================================
// PenaltyVector - 各约束惩罚分量 [0,1]
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PenaltyVector(pub BTreeMap<ConstraintType, f64>);

impl PenaltyVector {
    pub fn add(&mut self, constraint: ConstraintType, value: f64) {
        let entry = self.0.entry(constraint).or_insert(0.0);
        *entry = (*entry + value.clamp(0.0, 1.0)).min(1.0);
    }

    pub fn get(&self, constraint: ConstraintType) -> f64 {
        self.0.get(&constraint).copied().unwrap_or(0.0)
    }

    /// 加权求和
    pub fn weighted_sum(&self, weight_of: impl Fn(ConstraintType) -> f64) -> f64 {
        self.0.iter().map(|(c, v)| weight_of(*c) * v).sum()
    }

    pub fn is_zero(&self) -> bool {
        self.0.values().all(|v| *v == 0.0)
    }
}

// ==========================================
// ValidationResult - 单笔分配校验结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// 无 error 级违规
    pub is_valid: bool,
    pub violations: Vec<ConstraintViolation>,
    pub penalties: PenaltyVector,
    pub confidence_score: f64,
}

impl ValidationResult {
    pub fn errors(&self) -> impl Iterator<Item = &ConstraintViolation> {
        self.violations.iter().filter(|v| v.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ConstraintViolation> {
        self.violations.iter().filter(|v| !v.is_error())
    }

    /// 是否存在硬约束违规
    pub fn has_hard_violation(&self) -> bool {
        self.violations.iter().any(|v| v.constraint_type.is_hard())
    }
}

// ==========================================
// DraftValidation - 整份草案批量校验结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftValidation {
    /// error 级违规 (阻断发布)
    pub violations: Vec<ConstraintViolation>,
    /// warning 级违规 (发布前提示)
    pub warnings: Vec<ConstraintViolation>,
}

impl DraftValidation {
    pub fn push(&mut self, violation: ConstraintViolation) {
        if violation.is_error() {
            self.violations.push(violation);
        } else {
            self.warnings.push(violation);
        }
    }

    pub fn is_publishable(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn total(&self) -> usize {
        self.violations.len() + self.warnings.len()
    }
}
