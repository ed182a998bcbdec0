// ==========================================
// 排班草案引擎 - 排班草案领域模型
// ==========================================
// 红线: 草案生命周期单向 (draft → published → archived)
// 红线: 发布前草案独占其班次与分配
// ==========================================

use crate::domain::shift::Shift;
use crate::domain::staff::StaffCandidate;
use crate::domain::types::{DraftOrigin, DraftStatus};
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

// ==========================================
// DateRange - 日期范围 (闭区间)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// 创建日期范围 (自动纠正起止顺序)
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

// ==========================================
// ScheduleDraft - 排班草案
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDraft {
    pub draft_id: String,            // 草案ID
    pub business_id: String,         // 所属商户
    pub date_range: DateRange,       // 日期范围
    pub status: DraftStatus,         // 生命周期状态
    pub origin: DraftOrigin,         // 来源
    pub ai_generated: bool,          // 是否经外部排序预言机辅助
    pub overall_confidence: f64,     // 整体置信度 (按班次时长加权)
    pub shifts: Vec<Shift>,          // 班次列表
    pub created_at: DateTime<Utc>,   // 创建时间
    pub updated_at: DateTime<Utc>,   // 修改时间
}

impl ScheduleDraft {
    /// 创建空草案 (人工新建)
    pub fn new_manual(
        draft_id: impl Into<String>,
        business_id: impl Into<String>,
        date_range: DateRange,
        shifts: Vec<Shift>,
    ) -> Self {
        let now = Utc::now();
        let mut draft = Self {
            draft_id: draft_id.into(),
            business_id: business_id.into(),
            date_range,
            status: DraftStatus::Draft,
            origin: DraftOrigin::Manual,
            ai_generated: false,
            overall_confidence: 0.0,
            shifts,
            created_at: now,
            updated_at: now,
        };
        for shift in draft.shifts.iter_mut() {
            shift.recompute_status();
        }
        draft.recompute_overall_confidence();
        draft
    }

    pub fn is_editable(&self) -> bool {
        self.status == DraftStatus::Draft
    }

    pub fn find_shift(&self, shift_id: &str) -> Option<&Shift> {
        self.shifts.iter().find(|s| s.shift_id == shift_id)
    }

    pub fn find_shift_mut(&mut self, shift_id: &str) -> Option<&mut Shift> {
        self.shifts.iter_mut().find(|s| s.shift_id == shift_id)
    }

    /// 按分配ID定位 (班次ID, 位置)
    pub fn locate_assignment(&self, assignment_id: &str) -> Option<(String, usize)> {
        self.shifts.iter().find_map(|s| {
            s.position_of(assignment_id)
                .map(|pos| (s.shift_id.clone(), pos))
        })
    }

    /// 重新计算整体置信度: 按班次时长加权的分配置信度均值
    pub fn recompute_overall_confidence(&mut self) {
        let mut weighted = 0.0;
        let mut weight = 0.0;
        for shift in &self.shifts {
            let hours = shift.duration_hours();
            for assignment in shift.active_assignments() {
                if let Some(score) = assignment.confidence_score {
                    weighted += score * hours;
                    weight += hours;
                }
            }
        }
        self.overall_confidence = if weight > 0.0 {
            (weighted / weight).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// 受影响员工 (有有效分配的员工ID,去重保序)
    pub fn affected_staff_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut ids = Vec::new();
        for shift in &self.shifts {
            for a in shift.active_assignments() {
                if seen.insert(a.staff_id.clone()) {
                    ids.push(a.staff_id.clone());
                }
            }
        }
        ids
    }

    /// 此前排班中有分配、本草案中已无分配的员工 (去重保序)
    ///
    /// 只考虑落在本草案日期范围内的旧班次
    pub fn dropped_staff_ids<'a>(&self, previous: impl IntoIterator<Item = &'a Shift>) -> Vec<String> {
        let current: std::collections::HashSet<String> =
            self.affected_staff_ids().into_iter().collect();
        let mut seen = std::collections::HashSet::new();
        let mut ids = Vec::new();
        for shift in previous {
            if !self.date_range.contains(shift.date) {
                continue;
            }
            for a in shift.active_assignments() {
                if !current.contains(&a.staff_id) && seen.insert(a.staff_id.clone()) {
                    ids.push(a.staff_id.clone());
                }
            }
        }
        ids
    }
}

// ==========================================
// 生成输入: 特殊事件 / 员工备注
// ==========================================

/// 特殊事件 (提升当日班次紧急度)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialEvent {
    pub date: NaiveDate,
    pub name: String,
    #[serde(default = "default_urgency_boost")]
    pub urgency_boost: u32,
}

fn default_urgency_boost() -> u32 {
    1
}

/// 员工备注
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffNote {
    pub staff_id: String,
    pub note: String,
    #[serde(default)]
    pub unavailable_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub preferred_weekdays: Vec<Weekday>,
}

// ==========================================
// ScheduleSnapshot - 存储快照 (班次 + 员工)
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub shifts: Vec<Shift>,
    pub staff: Vec<StaffCandidate>,
}
