// ==========================================
// 排班草案引擎 - 约束规则 (单笔分配)
// ==========================================
// 职责: 针对 (班次, 员工) 计算每条约束的违规与惩罚分量
// 红线: 纯函数,不修改索引,不做 I/O
// ==========================================

use super::timeline::{consecutive_run, ScheduleIndex};
use crate::config::ConstraintConfig;
use crate::domain::shift::Shift;
use crate::domain::staff::StaffCandidate;
use crate::domain::types::ConstraintType;
use crate::domain::violation::ConstraintViolation;
use std::collections::BTreeSet;

/// 规则上下文 (一次校验共享)
pub(crate) struct RuleContext<'a> {
    pub config: &'a ConstraintConfig,
    pub index: &'a ScheduleIndex,
    pub pool: &'a [StaffCandidate],
}

/// 单条规则命中
#[derive(Debug, Clone)]
pub(crate) struct RuleHit {
    pub violation: ConstraintViolation,
    pub penalty: f64,
}

impl RuleHit {
    fn new(violation: ConstraintViolation, penalty: f64) -> Self {
        Self {
            violation,
            penalty: penalty.clamp(0.0, 1.0),
        }
    }
}

// ==========================================
// 硬约束
// ==========================================

pub(crate) fn check_skill(shift: &Shift, staff: &StaffCandidate, ctx: &RuleContext) -> Option<RuleHit> {
    if staff.has_skill_for(shift) {
        return None;
    }
    let skill = shift.required_skill.as_deref().unwrap_or("-");
    let violation = ConstraintViolation::new(
        ConstraintType::SkillMismatch,
        format!("{} 不具备班次 {} 所需技能 {}", staff.name, shift.shift_id, skill),
    )
    .for_staff(&staff.staff_id)
    .for_shift(&shift.shift_id)
    .with_resolution(suggest_alternative(shift, &staff.staff_id, ctx));
    Some(RuleHit::new(violation, 1.0))
}

pub(crate) fn check_availability(
    shift: &Shift,
    staff: &StaffCandidate,
    ctx: &RuleContext,
) -> Option<RuleHit> {
    let reason = staff.unavailability_reason(shift)?;
    let violation = ConstraintViolation::new(
        ConstraintType::Unavailable,
        format!("{} 在班次 {} 时段不可用: {}", staff.name, shift.shift_id, reason),
    )
    .for_staff(&staff.staff_id)
    .for_shift(&shift.shift_id)
    .with_resolution(suggest_alternative(shift, &staff.staff_id, ctx));
    Some(RuleHit::new(violation, 1.0))
}

/// 同一员工重复分配到同一班次或时间重叠的班次
pub(crate) fn check_double_booking(
    shift: &Shift,
    staff: &StaffCandidate,
    ctx: &RuleContext,
) -> Option<RuleHit> {
    let entries = ctx.index.entries(&staff.staff_id);
    let message = if entries.iter().any(|e| e.shift_id == shift.shift_id) {
        format!("{} 已分配在班次 {}", staff.name, shift.shift_id)
    } else {
        let clash = entries.iter().find(|e| e.overlaps(shift))?;
        format!(
            "{} 在班次 {} 与班次 {} 时间重叠",
            staff.name, shift.shift_id, clash.shift_id
        )
    };
    let violation = ConstraintViolation::new(ConstraintType::DoubleBooking, message)
        .for_staff(&staff.staff_id)
        .for_shift(&shift.shift_id)
        .with_resolution(suggest_alternative(shift, &staff.staff_id, ctx));
    Some(RuleHit::new(violation, 1.0))
}

// ==========================================
// 软约束
// ==========================================

/// 周工时: 草案外承诺 + 同周草案工时 + 本班次
pub(crate) fn check_weekly_hours(
    shift: &Shift,
    staff: &StaffCandidate,
    ctx: &RuleContext,
) -> Option<RuleHit> {
    let target = staff
        .max_weekly_hours
        .unwrap_or(ctx.config.weekly_hour_target);
    let shift_hours = shift.duration_hours();
    let projected =
        staff.committed_hours + ctx.index.week_hours(&staff.staff_id, shift.iso_week()) + shift_hours;
    if projected <= target {
        return None;
    }
    let over = projected - target;
    let violation = ConstraintViolation::new(
        ConstraintType::WeeklyHours,
        format!(
            "{} 本周工时将达 {:.1}h,超过目标 {:.1}h",
            staff.name, projected, target
        ),
    )
    .for_staff(&staff.staff_id)
    .for_shift(&shift.shift_id)
    .with_resolution(suggest_alternative(shift, &staff.staff_id, ctx));
    Some(RuleHit::new(violation, over / shift_hours.max(1.0)))
}

/// 相邻班次最小休息
pub(crate) fn check_min_rest(shift: &Shift, staff: &StaffCandidate, ctx: &RuleContext) -> Option<RuleHit> {
    let min_rest = ctx.config.min_rest_hours;
    if min_rest <= 0.0 {
        return None;
    }
    let (gap, neighbour) = ctx
        .index
        .entries(&staff.staff_id)
        .iter()
        .filter(|e| e.shift_id != shift.shift_id)
        .filter_map(|e| e.gap_hours_to(shift).map(|g| (g, e.shift_id.as_str())))
        .min_by(|a, b| a.0.total_cmp(&b.0))?;
    if gap >= min_rest {
        return None;
    }
    let violation = ConstraintViolation::new(
        ConstraintType::MinRest,
        format!(
            "{} 在班次 {} 与班次 {} 之间仅休息 {:.1}h (最少 {:.1}h)",
            staff.name, neighbour, shift.shift_id, gap, min_rest
        ),
    )
    .for_staff(&staff.staff_id)
    .for_shift(&shift.shift_id)
    .with_resolution(suggest_alternative(shift, &staff.staff_id, ctx));
    Some(RuleHit::new(violation, (min_rest - gap) / min_rest))
}

/// 连续工作天数
pub(crate) fn check_consecutive_days(
    shift: &Shift,
    staff: &StaffCandidate,
    ctx: &RuleContext,
) -> Option<RuleHit> {
    let max_days = ctx.config.max_consecutive_days;
    let mut dates: BTreeSet<_> = ctx
        .index
        .entries(&staff.staff_id)
        .iter()
        .map(|e| e.date)
        .collect();
    dates.insert(shift.date);
    let run = consecutive_run(&dates, shift.date);
    if run <= max_days {
        return None;
    }
    let violation = ConstraintViolation::new(
        ConstraintType::ConsecutiveDays,
        format!(
            "{} 将连续工作 {} 天,超过上限 {} 天",
            staff.name, run, max_days
        ),
    )
    .for_staff(&staff.staff_id)
    .for_shift(&shift.shift_id)
    .with_resolution(suggest_alternative(shift, &staff.staff_id, ctx));
    Some(RuleHit::new(violation, (run - max_days) as f64 / 2.0))
}

/// 同技能员工之间的班次分布均衡
pub(crate) fn check_distribution(
    shift: &Shift,
    staff: &StaffCandidate,
    ctx: &RuleContext,
) -> Option<RuleHit> {
    let tolerance = ctx.config.distribution_tolerance as usize;
    let (least_id, least_count) = ctx
        .pool
        .iter()
        .filter(|peer| peer.staff_id != staff.staff_id && peer.has_skill_for(shift))
        .map(|peer| (peer.staff_id.as_str(), ctx.index.shift_count(&peer.staff_id)))
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))?;
    let projected = ctx.index.shift_count(&staff.staff_id) + 1;
    if projected <= least_count + tolerance {
        return None;
    }
    let excess = projected - least_count - tolerance;
    let violation = ConstraintViolation::new(
        ConstraintType::Distribution,
        format!(
            "{} 将有 {} 个班次,同技能员工最少仅 {} 个",
            staff.name, projected, least_count
        ),
    )
    .for_staff(&staff.staff_id)
    .for_shift(&shift.shift_id)
    .with_resolution(Some(format!("考虑改派 {}", least_id)));
    Some(RuleHit::new(violation, excess as f64 / (tolerance + 1) as f64))
}

/// 周期人工成本上限
pub(crate) fn check_labor_cost(
    shift: &Shift,
    staff: &StaffCandidate,
    ctx: &RuleContext,
) -> Option<RuleHit> {
    let ceiling = ctx.config.labor_cost_ceiling?;
    let cost = shift.duration_hours() * shift.hourly_rate.unwrap_or(staff.hourly_rate);
    let projected = ctx.index.total_cost() + cost;
    if projected <= ceiling {
        return None;
    }
    let violation = ConstraintViolation::new(
        ConstraintType::LaborCost,
        format!(
            "分配 {} 后人工成本 {:.2} 超过上限 {:.2}",
            staff.name, projected, ceiling
        ),
    )
    .for_staff(&staff.staff_id)
    .for_shift(&shift.shift_id)
    .with_resolution(cheaper_alternative(shift, staff, ctx));
    Some(RuleHit::new(violation, (projected - ceiling) / cost.max(1.0)))
}

// ==========================================
// 建议生成
// ==========================================

/// 满足全部硬约束的员工 (不计当前员工)
fn eligible_alternatives<'a>(
    shift: &Shift,
    exclude_staff_id: &str,
    ctx: &RuleContext<'a>,
) -> Vec<&'a StaffCandidate> {
    ctx.pool
        .iter()
        .filter(|peer| {
            peer.staff_id != exclude_staff_id
                && !shift.has_staff(&peer.staff_id)
                && peer.has_skill_for(shift)
                && peer.is_available_for(shift)
                && !ctx
                    .index
                    .entries(&peer.staff_id)
                    .iter()
                    .any(|e| e.shift_id == shift.shift_id || e.overlaps(shift))
        })
        .collect()
}

/// 建议改派: 同周工时最少的合格员工
pub(crate) fn suggest_alternative(
    shift: &Shift,
    exclude_staff_id: &str,
    ctx: &RuleContext,
) -> Option<String> {
    let week = shift.iso_week();
    eligible_alternatives(shift, exclude_staff_id, ctx)
        .into_iter()
        .map(|peer| {
            let load = peer.committed_hours + ctx.index.week_hours(&peer.staff_id, week);
            (peer, load)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.staff_id.cmp(&b.0.staff_id)))
        .map(|(peer, _)| format!("改派 {} ({})", peer.name, peer.staff_id))
}

/// 建议改派: 时薪更低的合格员工
fn cheaper_alternative(shift: &Shift, staff: &StaffCandidate, ctx: &RuleContext) -> Option<String> {
    if shift.hourly_rate.is_some() {
        return None;
    }
    eligible_alternatives(shift, &staff.staff_id, ctx)
        .into_iter()
        .filter(|peer| peer.hourly_rate < staff.hourly_rate)
        .min_by(|a, b| a.hourly_rate.total_cmp(&b.hourly_rate))
        .map(|peer| format!("改派 {} ({}) 以降低成本", peer.name, peer.staff_id))
}
