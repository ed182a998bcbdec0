use super::*;
use crate::config::ConstraintConfig;
use crate::domain::draft::{DateRange, ScheduleDraft};
use crate::domain::shift::{Assignment, Shift};
use crate::domain::staff::{StaffCandidate, UnavailablePeriod};
use crate::domain::types::{ConstraintType, Severity};
use chrono::{NaiveDate, NaiveTime};

// ==========================================
// 测试辅助函数
// ==========================================

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

fn t(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap()
}

/// 创建测试用班次 (2026-03-02 为周一)
fn create_test_shift(id: &str, day: u32, start: u32, end: u32, skill: &str, need: u32) -> Shift {
    Shift::new(id, d(day), t(start), t(end), Some(skill.to_string()), need)
}

/// 创建测试用员工
fn create_test_staff(id: &str, name: &str, skill: &str) -> StaffCandidate {
    let mut staff = StaffCandidate::new(id, name).with_skill(skill);
    staff.hourly_rate = 20.0;
    staff
}

fn assign(shift: &mut Shift, staff: &StaffCandidate) {
    let id = format!("A-{}-{}", shift.shift_id, staff.staff_id);
    shift
        .assignments
        .push(Assignment::new(id, &shift.shift_id, &staff.staff_id, &staff.name));
    shift.recompute_status();
}

fn evaluator() -> ConstraintEvaluator {
    ConstraintEvaluator::new(ConstraintConfig::default())
}

// ==========================================
// 单笔校验
// ==========================================

#[test]
fn test_skill_mismatch_is_error_with_suggestion() {
    let shift = create_test_shift("S1", 2, 9, 17, "kitchen", 1);
    let bar = create_test_staff("st1", "Ann", "bar");
    let cook = create_test_staff("st2", "Ben", "kitchen");
    let pool = vec![bar.clone(), cook];

    let result = evaluator().validate_assignment(&shift, &bar, &[], &pool);

    assert!(!result.is_valid);
    assert!(result.has_hard_violation());
    let v = result.errors().next().unwrap();
    assert_eq!(v.constraint_type, ConstraintType::SkillMismatch);
    assert_eq!(v.severity, Severity::Error);
    assert!(v.suggested_resolution.as_deref().unwrap().contains("Ben"));
    assert_eq!(result.confidence_score, 0.0);
}

#[test]
fn test_clean_assignment_has_full_confidence() {
    let shift = create_test_shift("S1", 2, 9, 17, "kitchen", 1);
    let cook = create_test_staff("st1", "Ann", "kitchen");

    let result = evaluator().validate_assignment(&shift, &cook, &[], &[cook.clone()]);

    assert!(result.is_valid);
    assert!(result.violations.is_empty());
    assert!(result.penalties.is_zero());
    assert_eq!(result.confidence_score, 1.0);
}

#[test]
fn test_unavailable_staff() {
    let shift = create_test_shift("S1", 2, 9, 17, "kitchen", 1);
    let mut cook = create_test_staff("st1", "Ann", "kitchen");
    cook.unavailable
        .push(UnavailablePeriod::whole_day(d(2), Some("病假".to_string())));

    let result = evaluator().validate_assignment(&shift, &cook, &[], &[cook.clone()]);

    assert!(!result.is_valid);
    assert_eq!(result.violations[0].constraint_type, ConstraintType::Unavailable);
    assert!(result.violations[0].message.contains("病假"));
}

#[test]
fn test_overlapping_shift_is_double_booking() {
    let cook = create_test_staff("st1", "Ann", "kitchen");
    let mut morning = create_test_shift("S1", 2, 9, 17, "kitchen", 1);
    assign(&mut morning, &cook);
    let overlap = create_test_shift("S2", 2, 15, 20, "kitchen", 1);

    let result = evaluator().validate_assignment(&overlap, &cook, &[morning.clone()], &[cook.clone()]);
    assert!(!result.is_valid);
    assert!(result
        .errors()
        .any(|v| v.constraint_type == ConstraintType::DoubleBooking));

    // 同一班次重复分配
    let again = evaluator().validate_assignment(&morning, &cook, &[morning.clone()], &[cook.clone()]);
    assert!(again
        .errors()
        .any(|v| v.message.contains("已分配在班次 S1")));
}

#[test]
fn test_weekly_hours_at_cap_is_warning() {
    let shift = create_test_shift("S1", 2, 9, 17, "kitchen", 1);
    let mut cook = create_test_staff("st1", "Ann", "kitchen");
    cook.committed_hours = 40.0;

    let result = evaluator().validate_assignment(&shift, &cook, &[], &[cook.clone()]);

    assert!(result.is_valid);
    let v = result.warnings().next().unwrap();
    assert_eq!(v.constraint_type, ConstraintType::WeeklyHours);
    assert_eq!(result.penalties.get(ConstraintType::WeeklyHours), 1.0);
    assert!((result.confidence_score - 0.7).abs() < 1e-9);
}

#[test]
fn test_personal_weekly_cap_overrides_target() {
    let shift = create_test_shift("S1", 2, 9, 17, "kitchen", 1);
    let mut cook = create_test_staff("st1", "Ann", "kitchen");
    cook.committed_hours = 16.0;
    cook.max_weekly_hours = Some(20.0);

    let result = evaluator().validate_assignment(&shift, &cook, &[], &[cook.clone()]);

    assert!((result.penalties.get(ConstraintType::WeeklyHours) - 0.5).abs() < 1e-9);
}

#[test]
fn test_min_rest_between_shifts() {
    let cook = create_test_staff("st1", "Ann", "kitchen");
    let mut late = create_test_shift("S1", 2, 14, 22, "kitchen", 1);
    assign(&mut late, &cook);
    let early = create_test_shift("S2", 3, 6, 12, "kitchen", 1);

    let result = evaluator().validate_assignment(&early, &cook, &[late], &[cook.clone()]);

    assert!(result.is_valid);
    let v = result.warnings().next().unwrap();
    assert_eq!(v.constraint_type, ConstraintType::MinRest);
    assert!((result.penalties.get(ConstraintType::MinRest) - 0.2).abs() < 1e-9);
    assert!((result.confidence_score - 0.95).abs() < 1e-9);
}

#[test]
fn test_consecutive_days_threshold() {
    let cook = create_test_staff("st1", "Ann", "kitchen");
    let mut existing = Vec::new();
    for day in 2..8 {
        let mut s = create_test_shift(&format!("S{}", day), day, 9, 13, "kitchen", 1);
        assign(&mut s, &cook);
        existing.push(s);
    }
    let seventh = create_test_shift("S8", 8, 9, 13, "kitchen", 1);

    let result = evaluator().validate_assignment(&seventh, &cook, &existing, &[cook.clone()]);

    assert!(result
        .warnings()
        .any(|v| v.constraint_type == ConstraintType::ConsecutiveDays));
}

#[test]
fn test_distribution_against_least_loaded_peer() {
    let busy = create_test_staff("st1", "Ann", "kitchen");
    let idle = create_test_staff("st2", "Ben", "kitchen");
    let mut existing = Vec::new();
    for day in 2..5 {
        let mut s = create_test_shift(&format!("S{}", day), day, 9, 13, "kitchen", 1);
        assign(&mut s, &busy);
        existing.push(s);
    }
    let next = create_test_shift("S9", 9, 9, 13, "kitchen", 1);
    let pool = vec![busy.clone(), idle];

    let result = evaluator().validate_assignment(&next, &busy, &existing, &pool);

    let v = result
        .warnings()
        .find(|v| v.constraint_type == ConstraintType::Distribution)
        .unwrap();
    assert!(v.suggested_resolution.as_deref().unwrap().contains("st2"));
}

#[test]
fn test_labor_cost_ceiling() {
    let config = ConstraintConfig {
        labor_cost_ceiling: Some(100.0),
        ..ConstraintConfig::default()
    };
    let shift = create_test_shift("S1", 2, 9, 17, "kitchen", 1);
    let cook = create_test_staff("st1", "Ann", "kitchen");
    let mut cheap = create_test_staff("st2", "Ben", "kitchen");
    cheap.hourly_rate = 10.0;
    let pool = vec![cook.clone(), cheap];

    let result = ConstraintEvaluator::new(config).validate_assignment(&shift, &cook, &[], &pool);

    let v = result
        .warnings()
        .find(|v| v.constraint_type == ConstraintType::LaborCost)
        .unwrap();
    assert!(v.suggested_resolution.as_deref().unwrap().contains("Ben"));
}

// ==========================================
// 批量校验
// ==========================================

fn draft_with(shifts: Vec<Shift>) -> ScheduleDraft {
    ScheduleDraft::new_manual("D1", "B1", DateRange::new(d(2), d(8)), shifts)
}

#[test]
fn test_validate_draft_reports_overlap_once() {
    let cook = create_test_staff("st1", "Ann", "kitchen");
    let mut a = create_test_shift("S1", 2, 9, 17, "kitchen", 1);
    let mut b = create_test_shift("S2", 2, 12, 20, "kitchen", 1);
    assign(&mut a, &cook);
    assign(&mut b, &cook);

    let result = evaluator().validate_draft(&draft_with(vec![a, b]), &[cook]);

    let overlaps: Vec<_> = result
        .violations
        .iter()
        .filter(|v| v.constraint_type == ConstraintType::DoubleBooking)
        .collect();
    assert_eq!(overlaps.len(), 1);
    assert_eq!(overlaps[0].shift_id.as_deref(), Some("S2"));
    assert!(!result.is_publishable());
}

#[test]
fn test_validate_draft_override_downgrades_hard_violation() {
    let bar = create_test_staff("st1", "Ann", "bar");
    let mut shift = create_test_shift("S1", 2, 9, 17, "kitchen", 1);
    assign(&mut shift, &bar);
    shift.assignments[0].override_note = Some("经理批准".to_string());

    let result = evaluator().validate_draft(&draft_with(vec![shift]), &[bar]);

    assert!(result.is_publishable());
    let flagged = result
        .warnings
        .iter()
        .find(|v| v.constraint_type == ConstraintType::SkillMismatch)
        .unwrap();
    assert!(flagged.overridden);
}

#[test]
fn test_validate_draft_unknown_staff_and_understaffed() {
    let mut shift = create_test_shift("S1", 2, 9, 17, "kitchen", 2);
    shift
        .assignments
        .push(Assignment::new("A1", "S1", "ghost", "Ghost"));
    shift.recompute_status();
    let cook = create_test_staff("st1", "Ann", "kitchen");

    let result = evaluator().validate_draft(&draft_with(vec![shift]), &[cook]);

    assert!(result
        .violations
        .iter()
        .any(|v| v.constraint_type == ConstraintType::UnknownStaff));
    let understaffed = result
        .warnings
        .iter()
        .find(|v| v.constraint_type == ConstraintType::Understaffed)
        .unwrap();
    assert!(understaffed
        .suggested_resolution
        .as_deref()
        .unwrap()
        .contains("Ann"));
}

#[test]
fn test_validate_draft_weekly_hours_reported_per_week() {
    let mut cook = create_test_staff("st1", "Ann", "kitchen");
    cook.committed_hours = 30.0;
    let mut shifts = Vec::new();
    for day in [2, 4] {
        let mut s = create_test_shift(&format!("S{}", day), day, 9, 17, "kitchen", 1);
        assign(&mut s, &cook);
        shifts.push(s);
    }

    let result = evaluator().validate_draft(&draft_with(shifts), &[cook]);

    let weekly: Vec<_> = result
        .warnings
        .iter()
        .filter(|v| v.constraint_type == ConstraintType::WeeklyHours)
        .collect();
    assert_eq!(weekly.len(), 1);
    assert!(result.is_publishable());
}
