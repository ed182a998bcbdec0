// ==========================================
// 排班草案引擎 - 员工候选领域模型
// ==========================================
// 红线: 单次求解周期内为不可变快照
// ==========================================

use crate::domain::shift::Shift;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ==========================================
// AvailabilityWindow - 每周可用时段
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub weekday: Weekday,      // 星期
    pub start_time: NaiveTime, // 开始
    pub end_time: NaiveTime,   // 结束 (<= 开始视为跨夜)
}

impl AvailabilityWindow {
    /// 可用时段是否完整覆盖班次
    pub fn covers(&self, shift: &Shift) -> bool {
        if shift.date.weekday() != self.weekday {
            return false;
        }
        let window_start = shift.date.and_time(self.start_time);
        let window_end = if self.end_time <= self.start_time {
            (shift.date + chrono::Duration::days(1)).and_time(self.end_time)
        } else {
            shift.date.and_time(self.end_time)
        };
        window_start <= shift.start_at() && shift.end_at() <= window_end
    }
}

// ==========================================
// UnavailablePeriod - 不可用区间 (请假/备注)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailablePeriod {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub reason: Option<String>,
}

impl UnavailablePeriod {
    /// 整日不可用
    pub fn whole_day(date: NaiveDate, reason: Option<String>) -> Self {
        Self {
            start: date.and_time(NaiveTime::MIN),
            end: (date + chrono::Duration::days(1)).and_time(NaiveTime::MIN),
            reason,
        }
    }

    pub fn overlaps(&self, shift: &Shift) -> bool {
        self.start < shift.end_at() && shift.start_at() < self.end
    }
}

// ==========================================
// StaffCandidate - 员工候选快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffCandidate {
    pub staff_id: String,                        // 员工ID
    pub name: String,                            // 姓名
    pub skills: HashSet<String>,                 // 技能集合
    #[serde(default)]
    pub availability: Vec<AvailabilityWindow>,   // 每周可用时段 (空表示不限)
    #[serde(default)]
    pub unavailable: Vec<UnavailablePeriod>,     // 不可用区间
    #[serde(default)]
    pub committed_hours: f64,                    // 本周期已承诺工时 (草案外)
    #[serde(default)]
    pub max_weekly_hours: Option<f64>,           // 个人周工时上限 (覆盖全局目标)
    pub reliability_score: f64,                  // 可靠性 [0,1]
    pub hourly_rate: f64,                        // 时薪
    #[serde(default)]
    pub preferred_weekdays: Vec<Weekday>,        // 偏好工作日 (空表示无偏好)
    #[serde(default = "default_notifiable")]
    pub notifiable: bool,                        // 是否接收排班通知
}

fn default_notifiable() -> bool {
    true
}

impl StaffCandidate {
    pub fn new(staff_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            staff_id: staff_id.into(),
            name: name.into(),
            skills: HashSet::new(),
            availability: Vec::new(),
            unavailable: Vec::new(),
            committed_hours: 0.0,
            max_weekly_hours: None,
            reliability_score: 1.0,
            hourly_rate: 0.0,
            preferred_weekdays: Vec::new(),
            notifiable: true,
        }
    }

    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.skills.insert(skill.into());
        self
    }

    /// 是否具备班次所需技能 (无技能要求视为满足)
    pub fn has_skill_for(&self, shift: &Shift) -> bool {
        match &shift.required_skill {
            Some(skill) => self.skills.contains(skill),
            None => true,
        }
    }

    /// 是否可用于该班次时间段
    pub fn is_available_for(&self, shift: &Shift) -> bool {
        let window_ok =
            self.availability.is_empty() || self.availability.iter().any(|w| w.covers(shift));
        window_ok && !self.unavailable.iter().any(|p| p.overlaps(shift))
    }

    /// 导致不可用的原因 (若有)
    pub fn unavailability_reason(&self, shift: &Shift) -> Option<String> {
        if let Some(period) = self.unavailable.iter().find(|p| p.overlaps(shift)) {
            return Some(
                period
                    .reason
                    .clone()
                    .unwrap_or_else(|| "已登记不可用".to_string()),
            );
        }
        if !self.availability.is_empty() && !self.availability.iter().any(|w| w.covers(shift)) {
            return Some("不在每周可用时段内".to_string());
        }
        None
    }

    /// 是否偏好该班次日期
    pub fn prefers(&self, shift: &Shift) -> bool {
        self.preferred_weekdays.is_empty() || self.preferred_weekdays.contains(&shift.date.weekday())
    }
}
