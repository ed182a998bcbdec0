use super::rules::{
    check_availability, check_consecutive_days, check_distribution, check_double_booking,
    check_labor_cost, check_min_rest, check_skill, check_weekly_hours, suggest_alternative,
    RuleContext, RuleHit,
};
use super::timeline::{longest_run, ScheduleIndex, TimelineEntry};
use crate::config::ConstraintConfig;
use crate::domain::draft::ScheduleDraft;
use crate::domain::shift::Shift;
use crate::domain::staff::StaffCandidate;
use crate::domain::types::ConstraintType;
use crate::domain::violation::{
    ConstraintViolation, DraftValidation, PenaltyVector, ValidationResult,
};
use chrono::IsoWeek;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, instrument};

type Rule = fn(&Shift, &StaffCandidate, &RuleContext) -> Option<RuleHit>;

/// 硬约束 (违反则不可自动分配)
const HARD_RULES: [Rule; 3] = [check_skill, check_availability, check_double_booking];

/// 软约束 (仅产生警告与惩罚)
const SOFT_RULES: [Rule; 5] = [
    check_weekly_hours,
    check_min_rest,
    check_consecutive_days,
    check_distribution,
    check_labor_cost,
];

// ==========================================
// ConstraintEvaluator - 约束评估器
// ==========================================
// 模式 A: 单笔待定编辑同步校验 (validate_assignment)
// 模式 B: 整份草案批量校验 (validate_draft)
// 两种模式共用 rules 中的规则函数与时间线索引
pub struct ConstraintEvaluator {
    config: ConstraintConfig,
}

impl ConstraintEvaluator {
    pub fn new(config: ConstraintConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConstraintConfig {
        &self.config
    }

    /// 校验一次待定分配
    ///
    /// # 参数
    /// - shift: 目标班次
    /// - staff: 候选员工
    /// - existing: 当前草案班次 (其中的有效分配视为已提交负载)
    /// - pool: 员工池 (用于均衡校验与改派建议)
    pub fn validate_assignment(
        &self,
        shift: &Shift,
        staff: &StaffCandidate,
        existing: &[Shift],
        pool: &[StaffCandidate],
    ) -> ValidationResult {
        let index = ScheduleIndex::build(existing, &staff_lookup(pool));
        self.evaluate(shift, staff, &index, pool)
    }

    /// 基于既有索引校验 (排序引擎逐步累积负载时使用)
    pub fn evaluate(
        &self,
        shift: &Shift,
        staff: &StaffCandidate,
        index: &ScheduleIndex,
        pool: &[StaffCandidate],
    ) -> ValidationResult {
        self.evaluate_weighted(shift, staff, index, pool, |_| 1.0)
    }

    /// 基于既有索引校验,惩罚分量按 multiplier 重新加权
    pub fn evaluate_weighted(
        &self,
        shift: &Shift,
        staff: &StaffCandidate,
        index: &ScheduleIndex,
        pool: &[StaffCandidate],
        multiplier: impl Fn(ConstraintType) -> f64,
    ) -> ValidationResult {
        let ctx = RuleContext {
            config: &self.config,
            index,
            pool,
        };
        let mut violations = Vec::new();
        let mut penalties = PenaltyVector::default();
        for rule in HARD_RULES.iter().chain(SOFT_RULES.iter()) {
            if let Some(hit) = rule(shift, staff, &ctx) {
                penalties.add(hit.violation.constraint_type, hit.penalty);
                violations.push(hit.violation);
            }
        }
        let confidence_score = self.confidence_weighted(&penalties, multiplier);
        ValidationResult {
            is_valid: !violations.iter().any(|v| v.is_error()),
            violations,
            penalties,
            confidence_score,
        }
    }

    /// 仅检查硬约束 (候选池过滤)
    pub fn passes_hard_constraints(
        &self,
        shift: &Shift,
        staff: &StaffCandidate,
        index: &ScheduleIndex,
    ) -> bool {
        // 过滤阶段不需要改派建议,员工池留空
        let ctx = RuleContext {
            config: &self.config,
            index,
            pool: &[],
        };
        HARD_RULES.iter().all(|rule| rule(shift, staff, &ctx).is_none())
    }

    /// 置信度 = 1 - 归一化加权惩罚, 截断到 [0,1]
    pub fn confidence(&self, penalties: &PenaltyVector) -> f64 {
        self.confidence_weighted(penalties, |_| 1.0)
    }

    fn confidence_weighted(
        &self,
        penalties: &PenaltyVector,
        multiplier: impl Fn(ConstraintType) -> f64,
    ) -> f64 {
        let normalizer = if self.config.penalty_normalizer > 0.0 {
            self.config.penalty_normalizer
        } else {
            1.0
        };
        let weighted = penalties.weighted_sum(|c| self.config.weight_of(c) * multiplier(c));
        (1.0 - weighted / normalizer).clamp(0.0, 1.0)
    }

    /// 整份草案批量校验 (发布前)
    ///
    /// # 返回
    /// - violations: error 级 (阻断发布)
    /// - warnings: warning 级 (含人工覆盖降级的硬约束)
    #[instrument(skip(self, draft, pool), fields(draft_id = %draft.draft_id))]
    pub fn validate_draft(&self, draft: &ScheduleDraft, pool: &[StaffCandidate]) -> DraftValidation {
        let lookup = staff_lookup(pool);
        let index = ScheduleIndex::build(&draft.shifts, &lookup);
        let mut result = DraftValidation::default();

        self.check_assignments(draft, pool, &lookup, &index, &mut result);
        self.check_staff_timelines(draft, &lookup, &index, &mut result);
        self.check_distribution_spread(draft, pool, &index, &mut result);
        self.check_period_cost(&index, &mut result);
        self.check_coverage(draft, pool, &index, &mut result);

        debug!(
            errors = result.violations.len(),
            warnings = result.warnings.len(),
            "草案批量校验完成"
        );
        result
    }

    // ===== 批量校验: 逐分配硬约束 =====

    fn check_assignments(
        &self,
        draft: &ScheduleDraft,
        pool: &[StaffCandidate],
        lookup: &HashMap<&str, &StaffCandidate>,
        index: &ScheduleIndex,
        result: &mut DraftValidation,
    ) {
        let ctx = RuleContext {
            config: &self.config,
            index,
            pool,
        };
        for shift in &draft.shifts {
            let mut seen = HashSet::new();
            for assignment in shift.active_assignments() {
                let override_note = assignment.override_note.as_deref();
                let Some(staff) = lookup.get(assignment.staff_id.as_str()) else {
                    result.push(with_override(
                        ConstraintViolation::new(
                            ConstraintType::UnknownStaff,
                            format!(
                                "班次 {} 中的员工 {} 不在员工池中",
                                shift.shift_id, assignment.staff_id
                            ),
                        )
                        .for_staff(&assignment.staff_id)
                        .for_shift(&shift.shift_id),
                        override_note,
                    ));
                    continue;
                };
                if !seen.insert(assignment.staff_id.as_str()) {
                    result.push(with_override(
                        ConstraintViolation::new(
                            ConstraintType::DoubleBooking,
                            format!("{} 在班次 {} 中被重复分配", staff.name, shift.shift_id),
                        )
                        .for_staff(&staff.staff_id)
                        .for_shift(&shift.shift_id),
                        override_note,
                    ));
                }
                for rule in [check_skill as Rule, check_availability] {
                    if let Some(hit) = rule(shift, staff, &ctx) {
                        result.push(with_override(hit.violation, override_note));
                    }
                }
            }
        }
    }

    // ===== 批量校验: 员工时间线 (重叠/休息/周工时/连续天数) =====

    fn check_staff_timelines(
        &self,
        draft: &ScheduleDraft,
        lookup: &HashMap<&str, &StaffCandidate>,
        index: &ScheduleIndex,
        result: &mut DraftValidation,
    ) {
        let overrides: HashMap<&str, &str> = draft
            .shifts
            .iter()
            .flat_map(|s| s.active_assignments())
            .filter_map(|a| {
                a.override_note
                    .as_deref()
                    .map(|note| (a.assignment_id.as_str(), note))
            })
            .collect();

        let mut staff_ids: Vec<&str> = index.staff_ids().collect();
        staff_ids.sort_unstable();

        for staff_id in staff_ids {
            let Some(staff) = lookup.get(staff_id) else {
                continue;
            };
            let entries = index.entries(staff_id);

            // 与此前结束最晚的条目比较: 重叠为硬约束, 间隔不足为软约束
            let mut latest: Option<&TimelineEntry> = None;
            for next in entries {
                let Some(prev) = latest else {
                    latest = Some(next);
                    continue;
                };
                if next.end > prev.end {
                    latest = Some(next);
                }
                if prev.shift_id == next.shift_id {
                    continue;
                }
                if prev.end > next.start {
                    let note = next
                        .assignment_id
                        .as_deref()
                        .and_then(|id| overrides.get(id).copied());
                    result.push(with_override(
                        ConstraintViolation::new(
                            ConstraintType::DoubleBooking,
                            format!(
                                "{} 在班次 {} 与班次 {} 时间重叠",
                                staff.name, prev.shift_id, next.shift_id
                            ),
                        )
                        .for_staff(staff_id)
                        .for_shift(&next.shift_id),
                        note,
                    ));
                } else {
                    let gap = (next.start - prev.end).num_minutes() as f64 / 60.0;
                    if gap < self.config.min_rest_hours {
                        result.push(
                            ConstraintViolation::new(
                                ConstraintType::MinRest,
                                format!(
                                    "{} 在班次 {} 与班次 {} 之间仅休息 {:.1}h (最少 {:.1}h)",
                                    staff.name,
                                    prev.shift_id,
                                    next.shift_id,
                                    gap,
                                    self.config.min_rest_hours
                                ),
                            )
                            .for_staff(staff_id)
                            .for_shift(&next.shift_id),
                        );
                    }
                }
            }

            // 周工时 (每周一条)
            let target = staff
                .max_weekly_hours
                .unwrap_or(self.config.weekly_hour_target);
            let weeks: BTreeSet<IsoWeek> = entries.iter().map(|e| e.week()).collect();
            for week in weeks {
                let total = staff.committed_hours + index.week_hours(staff_id, week);
                if total > target {
                    result.push(
                        ConstraintViolation::new(
                            ConstraintType::WeeklyHours,
                            format!(
                                "{} 第 {} 周工时 {:.1}h,超过目标 {:.1}h",
                                staff.name,
                                week.week(),
                                total,
                                target
                            ),
                        )
                        .for_staff(staff_id),
                    );
                }
            }

            // 连续工作天数
            let dates: BTreeSet<_> = entries.iter().map(|e| e.date).collect();
            if let Some((run, start)) = longest_run(&dates) {
                if run > self.config.max_consecutive_days {
                    result.push(
                        ConstraintViolation::new(
                            ConstraintType::ConsecutiveDays,
                            format!(
                                "{} 自 {} 起连续工作 {} 天,超过上限 {} 天",
                                staff.name, start, run, self.config.max_consecutive_days
                            ),
                        )
                        .for_staff(staff_id),
                    );
                }
            }
        }
    }

    // ===== 批量校验: 同技能分布均衡 =====

    fn check_distribution_spread(
        &self,
        draft: &ScheduleDraft,
        pool: &[StaffCandidate],
        index: &ScheduleIndex,
        result: &mut DraftValidation,
    ) {
        let skills: BTreeSet<&str> = draft
            .shifts
            .iter()
            .filter_map(|s| s.required_skill.as_deref())
            .collect();
        let tolerance = self.config.distribution_tolerance as usize;

        for skill in skills {
            let counts: BTreeMap<&str, usize> = pool
                .iter()
                .filter(|s| s.skills.contains(skill))
                .map(|s| (s.staff_id.as_str(), index.shift_count(&s.staff_id)))
                .collect();
            let Some((least_id, least)) = counts
                .iter()
                .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
                .map(|(id, c)| (*id, *c))
            else {
                continue;
            };
            for (staff_id, count) in &counts {
                if *count > least + tolerance {
                    result.push(
                        ConstraintViolation::new(
                            ConstraintType::Distribution,
                            format!(
                                "{} 技能员工分布不均: {} 有 {} 个班次, {} 仅 {} 个",
                                skill, staff_id, count, least_id, least
                            ),
                        )
                        .for_staff(*staff_id)
                        .with_resolution(Some(format!("将部分班次改派给 {}", least_id))),
                    );
                }
            }
        }
    }

    // ===== 批量校验: 周期人工成本 =====

    fn check_period_cost(&self, index: &ScheduleIndex, result: &mut DraftValidation) {
        if let Some(ceiling) = self.config.labor_cost_ceiling {
            let total = index.total_cost();
            if total > ceiling {
                result.push(ConstraintViolation::new(
                    ConstraintType::LaborCost,
                    format!("周期人工成本 {:.2} 超过上限 {:.2}", total, ceiling),
                ));
            }
        }
    }

    // ===== 批量校验: 未满员班次 (仅警告) =====

    fn check_coverage(
        &self,
        draft: &ScheduleDraft,
        pool: &[StaffCandidate],
        index: &ScheduleIndex,
        result: &mut DraftValidation,
    ) {
        let ctx = RuleContext {
            config: &self.config,
            index,
            pool,
        };
        for shift in &draft.shifts {
            let need = shift.remaining_need();
            if need == 0 {
                continue;
            }
            result.push(
                ConstraintViolation::new(
                    ConstraintType::Understaffed,
                    format!(
                        "班次 {} 需 {} 人, 当前 {} 人",
                        shift.shift_id,
                        shift.required_staff_count,
                        shift.assigned_count()
                    ),
                )
                .for_shift(&shift.shift_id)
                .with_resolution(
                    suggest_alternative(shift, "", &ctx).map(|s| s.replacen("改派", "补充", 1)),
                ),
            );
        }
    }
}

/// 人工覆盖时降级硬约束
fn with_override(violation: ConstraintViolation, note: Option<&str>) -> ConstraintViolation {
    match note {
        Some(note) => violation.downgrade_as_override(note),
        None => violation,
    }
}

pub(crate) fn staff_lookup(pool: &[StaffCandidate]) -> HashMap<&str, &StaffCandidate> {
    pool.iter().map(|s| (s.staff_id.as_str(), s)).collect()
}
