// ==========================================
// 排班草案引擎 - 员工时间线索引
// ==========================================
// 职责: 按员工聚合有效分配,供约束规则查询工时/间隔/连续天数
// 说明: 排序引擎逐步提交分配时增量更新 (record)
// ==========================================

use crate::domain::shift::Shift;
use crate::domain::staff::StaffCandidate;
use chrono::{Datelike, IsoWeek, NaiveDate, NaiveDateTime};
use std::collections::{BTreeSet, HashMap};

/// 时间线条目 (一次有效分配)
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub shift_id: String,
    pub assignment_id: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub date: NaiveDate,
    pub hours: f64,
    pub cost: f64,
}

impl TimelineEntry {
    pub fn week(&self) -> IsoWeek {
        self.date.iso_week()
    }

    pub fn overlaps(&self, shift: &Shift) -> bool {
        self.start < shift.end_at() && shift.start_at() < self.end
    }

    /// 与班次之间的休息间隔 (小时, 重叠返回 None)
    pub fn gap_hours_to(&self, shift: &Shift) -> Option<f64> {
        if self.end <= shift.start_at() {
            Some((shift.start_at() - self.end).num_minutes() as f64 / 60.0)
        } else if shift.end_at() <= self.start {
            Some((self.start - shift.end_at()).num_minutes() as f64 / 60.0)
        } else {
            None
        }
    }
}

// ==========================================
// ScheduleIndex - 排班索引
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ScheduleIndex {
    by_staff: HashMap<String, Vec<TimelineEntry>>,
    total_cost: f64,
}

impl ScheduleIndex {
    /// 由班次列表构建 (仅统计有效分配)
    pub fn build(shifts: &[Shift], staff: &HashMap<&str, &StaffCandidate>) -> Self {
        let mut index = Self::default();
        for shift in shifts {
            for assignment in shift.active_assignments() {
                let rate = shift.hourly_rate.unwrap_or_else(|| {
                    staff
                        .get(assignment.staff_id.as_str())
                        .map(|s| s.hourly_rate)
                        .unwrap_or(0.0)
                });
                index.push(
                    &assignment.staff_id,
                    Some(assignment.assignment_id.clone()),
                    shift,
                    rate,
                );
            }
        }
        index
    }

    /// 记录一次新分配
    pub fn record(&mut self, shift: &Shift, staff: &StaffCandidate) {
        let rate = shift.hourly_rate.unwrap_or(staff.hourly_rate);
        self.push(&staff.staff_id, None, shift, rate);
    }

    fn push(&mut self, staff_id: &str, assignment_id: Option<String>, shift: &Shift, rate: f64) {
        let hours = shift.duration_hours();
        let entry = TimelineEntry {
            shift_id: shift.shift_id.clone(),
            assignment_id,
            start: shift.start_at(),
            end: shift.end_at(),
            date: shift.date,
            hours,
            cost: hours * rate,
        };
        self.total_cost += entry.cost;
        let entries = self.by_staff.entry(staff_id.to_string()).or_default();
        let pos = entries.partition_point(|e| e.start <= entry.start);
        entries.insert(pos, entry);
    }

    /// 员工时间线 (按开始时间升序)
    pub fn entries(&self, staff_id: &str) -> &[TimelineEntry] {
        self.by_staff.get(staff_id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// 员工已分配班次数
    pub fn shift_count(&self, staff_id: &str) -> usize {
        self.entries(staff_id).len()
    }

    /// 员工在某 ISO 周内的草案工时
    pub fn week_hours(&self, staff_id: &str, week: IsoWeek) -> f64 {
        self.entries(staff_id)
            .iter()
            .filter(|e| e.week() == week)
            .map(|e| e.hours)
            .sum()
    }

    /// 排班周期总人工成本
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// 有分配记录的员工
    pub fn staff_ids(&self) -> impl Iterator<Item = &str> {
        self.by_staff.keys().map(|k| k.as_str())
    }
}

/// 计算包含 date 的最长连续工作天数
pub fn consecutive_run(dates: &BTreeSet<NaiveDate>, date: NaiveDate) -> u32 {
    if !dates.contains(&date) {
        return 0;
    }
    let mut run = 1;
    let mut cursor = date;
    while let Some(prev) = cursor.pred_opt() {
        if !dates.contains(&prev) {
            break;
        }
        run += 1;
        cursor = prev;
    }
    cursor = date;
    while let Some(next) = cursor.succ_opt() {
        if !dates.contains(&next) {
            break;
        }
        run += 1;
        cursor = next;
    }
    run
}

/// 日期集合中的最长连续段 (长度, 起始日)
pub fn longest_run(dates: &BTreeSet<NaiveDate>) -> Option<(u32, NaiveDate)> {
    let mut best: Option<(u32, NaiveDate)> = None;
    let mut current: Option<(u32, NaiveDate, NaiveDate)> = None;
    for &date in dates {
        current = match current {
            Some((len, start, last)) if last.succ_opt() == Some(date) => Some((len + 1, start, date)),
            _ => Some((1, date, date)),
        };
        if let Some((len, start, _)) = current {
            if best.map_or(true, |(b, _)| len > b) {
                best = Some((len, start));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    #[test]
    fn test_consecutive_run() {
        let dates: BTreeSet<NaiveDate> = [d(1), d(2), d(3), d(5), d(6)].into_iter().collect();
        assert_eq!(consecutive_run(&dates, d(2)), 3);
        assert_eq!(consecutive_run(&dates, d(6)), 2);
        assert_eq!(consecutive_run(&dates, d(4)), 0);
        assert_eq!(longest_run(&dates), Some((3, d(1))));
        assert_eq!(longest_run(&BTreeSet::new()), None);
    }
}
