// ==========================================
// 排班草案引擎 - 班次与分配领域模型
// ==========================================
// 红线: 班次状态只能通过 recompute_status 推导,不允许外部直接写
// ==========================================

use crate::domain::types::{AssignmentStatus, ShiftStatus};
use chrono::{Datelike, Duration, IsoWeek, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// Shift - 班次
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub shift_id: String,                // 班次ID
    pub date: NaiveDate,                 // 班次日期
    pub start_time: NaiveTime,           // 开始时间
    pub end_time: NaiveTime,             // 结束时间 (<= 开始时间视为跨夜)
    pub required_skill: Option<String>,  // 需求技能标签
    pub required_staff_count: u32,       // 需求人数
    pub hourly_rate: Option<f64>,        // 班次时薪 (覆盖员工时薪)
    pub status: ShiftStatus,             // 状态 (推导值)
    #[serde(default)]
    pub is_modified: bool,               // 草案内是否修改过
    #[serde(default)]
    pub assignments: Vec<Assignment>,    // 有序分配列表
}

impl Shift {
    /// 创建新的空班次
    pub fn new(
        shift_id: impl Into<String>,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        required_skill: Option<String>,
        required_staff_count: u32,
    ) -> Self {
        Self {
            shift_id: shift_id.into(),
            date,
            start_time,
            end_time,
            required_skill,
            required_staff_count,
            hourly_rate: None,
            status: ShiftStatus::derive(0, required_staff_count),
            is_modified: false,
            assignments: Vec::new(),
        }
    }

    /// 班次开始时刻
    pub fn start_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// 班次结束时刻 (跨夜班次顺延一天)
    pub fn end_at(&self) -> NaiveDateTime {
        if self.end_time <= self.start_time {
            (self.date + Duration::days(1)).and_time(self.end_time)
        } else {
            self.date.and_time(self.end_time)
        }
    }

    /// 班次时长 (小时)
    pub fn duration_hours(&self) -> f64 {
        (self.end_at() - self.start_at()).num_minutes() as f64 / 60.0
    }

    /// 班次所属 ISO 周
    pub fn iso_week(&self) -> IsoWeek {
        self.date.iso_week()
    }

    /// 与另一班次时间是否重叠
    pub fn overlaps(&self, other: &Shift) -> bool {
        self.start_at() < other.end_at() && other.start_at() < self.end_at()
    }

    /// 有效分配 (assigned / confirmed)
    pub fn active_assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter().filter(|a| a.status.is_active())
    }

    /// 有效分配人数
    pub fn assigned_count(&self) -> usize {
        self.active_assignments().count()
    }

    /// 剩余需求人数
    pub fn remaining_need(&self) -> u32 {
        (self.required_staff_count as usize).saturating_sub(self.assigned_count()) as u32
    }

    /// 员工是否已在本班次有有效分配
    pub fn has_staff(&self, staff_id: &str) -> bool {
        self.active_assignments().any(|a| a.staff_id == staff_id)
    }

    /// 按分配ID查找位置
    pub fn position_of(&self, assignment_id: &str) -> Option<usize> {
        self.assignments
            .iter()
            .position(|a| a.assignment_id == assignment_id)
    }

    /// 重新推导班次状态
    pub fn recompute_status(&mut self) {
        self.status = ShiftStatus::derive(self.assigned_count(), self.required_staff_count);
    }

    /// 标记为已发布排定 (仅发布时调用)
    pub fn mark_scheduled(&mut self) {
        if self.status == ShiftStatus::Filled {
            self.status = ShiftStatus::Scheduled;
        }
    }

    /// 班次人工成本估算 (按有效分配)
    pub fn labor_cost(&self, rate_of: impl Fn(&str) -> f64) -> f64 {
        let hours = self.duration_hours();
        self.active_assignments()
            .map(|a| hours * self.hourly_rate.unwrap_or_else(|| rate_of(&a.staff_id)))
            .sum()
    }
}

// ==========================================
// Assignment - 分配
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: String,             // 分配ID
    pub shift_id: String,                  // 所属班次
    pub staff_id: String,                  // 员工ID
    pub staff_name: String,                // 员工姓名 (冗余)
    pub status: AssignmentStatus,          // 分配状态
    pub confidence_score: Option<f64>,     // 置信度 [0,1]
    pub reasoning: Option<String>,         // 分配理由
    #[serde(default)]
    pub is_modified: bool,                 // 相对发布基线是否修改
    #[serde(default)]
    pub override_note: Option<String>,     // 人工覆盖硬约束的说明
}

impl Assignment {
    /// 创建新的分配 (草案内创建,默认标记为已修改)
    pub fn new(
        assignment_id: impl Into<String>,
        shift_id: impl Into<String>,
        staff_id: impl Into<String>,
        staff_name: impl Into<String>,
    ) -> Self {
        Self {
            assignment_id: assignment_id.into(),
            shift_id: shift_id.into(),
            staff_id: staff_id.into(),
            staff_name: staff_name.into(),
            status: AssignmentStatus::Assigned,
            confidence_score: None,
            reasoning: None,
            is_modified: true,
            override_note: None,
        }
    }

    /// 设置置信度 (截断到 [0,1])
    pub fn with_confidence(mut self, score: f64, reasoning: impl Into<String>) -> Self {
        self.confidence_score = Some(score.clamp(0.0, 1.0));
        self.reasoning = Some(reasoning.into());
        self
    }

    /// 是否为人工覆盖
    pub fn is_override(&self) -> bool {
        self.override_note.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shift(start: (u32, u32), end: (u32, u32)) -> Shift {
        Shift::new(
            "S1",
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            Some("kitchen".to_string()),
            2,
        )
    }

    #[test]
    fn test_overnight_duration() {
        let s = shift((22, 0), (6, 0));
        assert_eq!(s.duration_hours(), 8.0);
        assert_eq!(s.end_at().date(), NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
    }

    #[test]
    fn test_overlap() {
        let a = shift((9, 0), (17, 0));
        let b = shift((16, 0), (22, 0));
        let c = shift((17, 0), (23, 0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_status_ignores_inactive_assignments() {
        let mut s = shift((9, 0), (17, 0));
        s.assignments.push(Assignment::new("A1", "S1", "st1", "Ann"));
        let mut sick = Assignment::new("A2", "S1", "st2", "Bob");
        sick.status = AssignmentStatus::CalledInSick;
        s.assignments.push(sick);
        s.recompute_status();

        assert_eq!(s.assigned_count(), 1);
        assert_eq!(s.status, ShiftStatus::Understaffed);
        assert!(!s.has_staff("st2"));
        assert_eq!(s.remaining_need(), 1);
    }
}
