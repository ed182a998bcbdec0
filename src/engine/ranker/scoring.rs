use crate::domain::shift::Shift;
use crate::domain::staff::StaffCandidate;
use crate::engine::constraint::{ConstraintEvaluator, ScheduleIndex};
use crate::engine::oracle::OracleSuggestion;
use crate::engine::strategy::StrategyWeights;
use std::collections::HashSet;

/// 规则置信度与策略因子在规则得分中的占比
const CONFIDENCE_SHARE: f64 = 0.7;

/// 候选评分
#[derive(Debug, Clone)]
pub(crate) struct ScoredCandidate {
    /// 员工池下标
    pub pool_idx: usize,
    /// 约束置信度 (未经策略加权)
    pub confidence: f64,
    /// 规则得分 (策略加权置信度 + 因子)
    pub rule_score: f64,
    /// 综合得分 (规则得分与预言机排名混合)
    pub merged_score: f64,
    pub warnings: Vec<String>,
    pub oracle_reasoning: Option<String>,
}

/// 为班次构建候选并按规则评分
///
/// 候选 = 未在本班次且通过全部硬约束的员工
pub(crate) fn score_candidates(
    evaluator: &ConstraintEvaluator,
    weights: &StrategyWeights,
    shift: &Shift,
    pool: &[StaffCandidate],
    index: &ScheduleIndex,
) -> Vec<ScoredCandidate> {
    let eligible: Vec<usize> = pool
        .iter()
        .enumerate()
        .filter(|(_, staff)| {
            !shift.has_staff(&staff.staff_id)
                && evaluator.passes_hard_constraints(shift, staff, index)
        })
        .map(|(idx, _)| idx)
        .collect();

    let max_rate = eligible
        .iter()
        .map(|&idx| shift.hourly_rate.unwrap_or(pool[idx].hourly_rate))
        .fold(0.0_f64, f64::max);
    let target = evaluator.config().weekly_hour_target;
    let week = shift.iso_week();

    eligible
        .into_iter()
        .map(|idx| {
            let staff = &pool[idx];
            let result =
                evaluator.evaluate_weighted(shift, staff, index, pool, |c| weights.multiplier(c));

            let rate = shift.hourly_rate.unwrap_or(staff.hourly_rate);
            let cost = if max_rate > 0.0 { 1.0 - rate / max_rate } else { 1.0 };
            let cap = staff.max_weekly_hours.unwrap_or(target).max(1.0);
            let load = 1.0
                - ((staff.committed_hours + index.week_hours(&staff.staff_id, week)) / cap)
                    .clamp(0.0, 1.0);
            let preference = if staff.prefers(shift) { 1.0 } else { 0.0 };
            let factor = weights.factor_score(
                cost,
                staff.reliability_score.clamp(0.0, 1.0),
                load,
                preference,
            );

            let rule_score =
                CONFIDENCE_SHARE * result.confidence_score + (1.0 - CONFIDENCE_SHARE) * factor;
            ScoredCandidate {
                pool_idx: idx,
                confidence: evaluator.confidence(&result.penalties),
                rule_score,
                merged_score: rule_score,
                warnings: result.warnings().map(|v| v.message.clone()).collect(),
                oracle_reasoning: None,
            }
        })
        .collect()
}

/// 合并预言机排名: 只对已有候选重新排序,未知员工忽略
pub(crate) fn merge_oracle(
    candidates: &mut [ScoredCandidate],
    pool: &[StaffCandidate],
    suggestions: &[OracleSuggestion],
    oracle_weight: f64,
) {
    let known: HashSet<&str> = candidates
        .iter()
        .map(|c| pool[c.pool_idx].staff_id.as_str())
        .collect();
    let mut seen = HashSet::new();
    let ranked: Vec<&OracleSuggestion> = suggestions
        .iter()
        .filter(|s| known.contains(s.staff_id.as_str()) && seen.insert(s.staff_id.as_str()))
        .collect();
    if ranked.is_empty() {
        return;
    }

    let weight = oracle_weight.clamp(0.0, 1.0);
    let n = ranked.len() as f64;
    for candidate in candidates.iter_mut() {
        let staff_id = pool[candidate.pool_idx].staff_id.as_str();
        let position = ranked.iter().position(|s| s.staff_id == staff_id);
        let oracle_score = position.map(|r| 1.0 - r as f64 / n).unwrap_or(0.0);
        candidate.merged_score = (1.0 - weight) * candidate.rule_score + weight * oracle_score;
        candidate.oracle_reasoning = position.and_then(|r| ranked[r].reasoning.clone());
    }
}

/// 综合得分降序,同分按员工ID
pub(crate) fn sort_candidates(candidates: &mut [ScoredCandidate], pool: &[StaffCandidate]) {
    candidates.sort_by(|a, b| {
        b.merged_score
            .total_cmp(&a.merged_score)
            .then_with(|| pool[a.pool_idx].staff_id.cmp(&pool[b.pool_idx].staff_id))
    });
}

/// 分配理由
pub(crate) fn reasoning_for(candidate: &ScoredCandidate, strategy_title: &str) -> String {
    let mut text = format!(
        "{}: 规则得分 {:.2}, 约束置信度 {:.2}",
        strategy_title, candidate.rule_score, candidate.confidence
    );
    if !candidate.warnings.is_empty() {
        text.push_str("; 提示: ");
        text.push_str(&candidate.warnings.join(" / "));
    }
    if let Some(oracle) = &candidate.oracle_reasoning {
        text.push_str("; 预言机: ");
        text.push_str(oracle);
    }
    text
}

/// 划分可并行评分的班次组
///
/// 同组条件: 同一天, 且技能持有者集合两两不相交;
/// 存在周期成本上限或未开启并行时退化为逐班次顺序处理
pub(crate) fn build_groups(
    order: &[usize],
    shifts: &[Shift],
    pool: &[StaffCandidate],
    parallel: bool,
) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut group_staff: HashSet<&str> = HashSet::new();

    for &shift_idx in order {
        let shift = &shifts[shift_idx];
        let holders: HashSet<&str> = pool
            .iter()
            .filter(|s| s.has_skill_for(shift))
            .map(|s| s.staff_id.as_str())
            .collect();

        let joinable = parallel
            && groups.last().map_or(false, |group| {
                shifts[group[0]].date == shift.date && group_staff.is_disjoint(&holders)
            });

        if joinable {
            if let Some(group) = groups.last_mut() {
                group.push(shift_idx);
            }
            group_staff.extend(holders);
        } else {
            groups.push(vec![shift_idx]);
            group_staff = holders;
        }
    }
    groups
}
