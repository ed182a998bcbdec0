use super::request::{
    DiagnosticCode, GenerationOutcome, GenerationRequest, ShiftDiagnostic,
};
use super::scoring::{
    build_groups, merge_oracle, reasoning_for, score_candidates, sort_candidates, ScoredCandidate,
};
use crate::config::{ConstraintConfig, RankerConfig};
use crate::domain::draft::{ScheduleDraft, StaffNote};
use crate::domain::shift::{Assignment, Shift};
use crate::domain::staff::{StaffCandidate, UnavailablePeriod};
use crate::domain::types::DraftOrigin;
use crate::engine::cancel::CancelSignal;
use crate::engine::constraint::{staff_lookup, ConstraintEvaluator, ScheduleIndex};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::oracle::{OracleContext, OracleError, OracleStatus, OracleSuggestion, RankingOracle};
use crate::engine::strategy::StrategyWeights;
use crate::repository::ScheduleStore;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

type OracleOutcome = Result<Option<Vec<OracleSuggestion>>, OracleError>;

// ==========================================
// AssignmentRanker - 分配排序引擎
// ==========================================
// 红线: 按时间升序 + 紧急度降序逐班次贪心,后续班次看到前序已提交的工时/休息负载
// 红线: 预言机建议与规则得分合并,永不替代
pub struct AssignmentRanker {
    store: Arc<dyn ScheduleStore>,
    oracle: Option<Arc<dyn RankingOracle>>,
    config: RankerConfig,
    constraints: ConstraintConfig,
}

/// 一次生成的不变输入
struct FillPlan<'a> {
    baseline: &'a [Shift],
    groups: &'a [Vec<usize>],
    pool: &'a [StaffCandidate],
    evaluator: &'a ConstraintEvaluator,
    weights: &'a StrategyWeights,
    title: &'a str,
    context: &'a OracleContext,
}

/// 一轮填充的结果
#[derive(Default)]
struct FillPass {
    shifts: Vec<Shift>,
    diagnostics: Vec<ShiftDiagnostic>,
    oracle_calls: usize,
    oracle_failure: Option<String>,
}

impl AssignmentRanker {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        config: RankerConfig,
        constraints: ConstraintConfig,
    ) -> Self {
        Self {
            store,
            oracle: None,
            config,
            constraints,
        }
    }

    /// 配置外部排序预言机
    pub fn with_oracle(mut self, oracle: Arc<dyn RankingOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }

    /// 生成排班草案
    ///
    /// # 参数
    /// - request: 商户/日期范围/特殊事件/员工备注/约束/策略
    /// - cancel: 取消信号 (取消后不返回任何部分草案)
    ///
    /// # 返回
    /// - Ok(GenerationOutcome): 草案 + 覆盖诊断 + 预言机状态
    /// - Err(Cancelled): 调用方取消
    /// - Err(SnapshotLoad): 快照读取失败
    #[instrument(skip(self, request, cancel), fields(
        business_id = %request.business_id,
        strategy = %request.strategy
    ))]
    pub async fn generate_draft(
        &self,
        request: &GenerationRequest,
        cancel: &CancelSignal,
    ) -> EngineResult<GenerationOutcome> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            loaded = self.store.load_snapshot(&request.business_id, request.date_range) => loaded?,
        };

        let pool = apply_staff_notes(snapshot.staff, &request.staff_notes);
        let shifts: Vec<Shift> = snapshot
            .shifts
            .into_iter()
            .filter(|s| request.date_range.contains(s.date))
            .map(as_baseline)
            .collect();
        debug!(shifts = shifts.len(), staff = pool.len(), "快照加载完成");

        let constraints = request
            .constraints
            .clone()
            .unwrap_or_else(|| self.constraints.clone());
        let parallel = self.config.parallel_groups && constraints.labor_cost_ceiling.is_none();
        let evaluator = ConstraintEvaluator::new(constraints);
        let weights = request.weights();
        let title = if request.custom_weights.is_some() {
            "自定义策略"
        } else {
            request.strategy.title_cn()
        };

        let order = processing_order(&shifts, request);
        let groups = build_groups(&order, &shifts, &pool, parallel);
        let context = OracleContext {
            business_id: request.business_id.clone(),
            date_range: request.date_range,
            strategy: request.strategy,
            special_events: request.special_events.clone(),
            staff_notes: request.staff_notes.clone(),
        };
        let plan = FillPlan {
            baseline: &shifts,
            groups: &groups,
            pool: &pool,
            evaluator: &evaluator,
            weights: &weights,
            title,
            context: &context,
        };

        let mut pass = self.fill_pass(&plan, self.oracle.as_ref(), cancel).await?;
        let oracle_status = match (&self.oracle, pass.oracle_failure.take()) {
            (None, _) => OracleStatus::NotConfigured,
            (Some(_), Some(reason)) => {
                // 已按预言机合并的班次作废,整份草案按纯规则重排
                info!(reason = %reason, "预言机失败,按规则排序重新生成");
                pass = self.fill_pass(&plan, None, cancel).await?;
                OracleStatus::FellBack { reason }
            }
            (Some(_), None) => OracleStatus::Succeeded {
                calls: pass.oracle_calls,
            },
        };
        let FillPass {
            shifts, diagnostics, ..
        } = pass;

        let mut draft = ScheduleDraft::new_manual(
            Uuid::new_v4().to_string(),
            &request.business_id,
            request.date_range,
            shifts,
        );
        draft.origin = DraftOrigin::Generated;
        draft.ai_generated = oracle_status.is_ai_assisted();

        info!(
            draft_id = %draft.draft_id,
            shifts = draft.shifts.len(),
            diagnostics = diagnostics.len(),
            overall_confidence = draft.overall_confidence,
            ai_generated = draft.ai_generated,
            "草案生成完成"
        );

        Ok(GenerationOutcome {
            draft,
            diagnostics,
            oracle_status,
        })
    }

    /// 从基线班次出发完成一轮贪心填充
    ///
    /// 预言机首次失败即中止本轮,由调用方改用纯规则重来
    async fn fill_pass(
        &self,
        plan: &FillPlan<'_>,
        oracle: Option<&Arc<dyn RankingOracle>>,
        cancel: &CancelSignal,
    ) -> EngineResult<FillPass> {
        let mut shifts = plan.baseline.to_vec();
        let mut index = ScheduleIndex::build(&shifts, &staff_lookup(plan.pool));
        let mut pass = FillPass::default();

        for group in plan.groups {
            if cancel.is_cancelled() {
                info!("草案生成已取消,丢弃部分结果");
                return Err(EngineError::Cancelled);
            }

            let mut scored: Vec<Vec<ScoredCandidate>> = group
                .iter()
                .map(|&idx| {
                    score_candidates(plan.evaluator, plan.weights, &shifts[idx], plan.pool, &index)
                })
                .collect();

            if let Some(oracle) = oracle {
                let outcomes = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    outcomes = self.call_oracle(oracle, group, &shifts, &scored, plan.pool, plan.context) => outcomes,
                };
                for ((candidates, &shift_idx), outcome) in
                    scored.iter_mut().zip(group.iter()).zip(outcomes)
                {
                    match outcome {
                        Ok(Some(suggestions)) => {
                            pass.oracle_calls += 1;
                            merge_oracle(candidates, plan.pool, &suggestions, self.config.oracle_weight);
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(
                                shift_id = %shifts[shift_idx].shift_id,
                                oracle = oracle.name(),
                                error = %err,
                                "预言机调用失败,回退规则排序"
                            );
                            pass.oracle_failure.get_or_insert_with(|| err.to_string());
                        }
                    }
                }
                if pass.oracle_failure.is_some() {
                    return Ok(pass);
                }
            }

            for (candidates, &shift_idx) in scored.into_iter().zip(group.iter()) {
                if let Some(diagnostic) =
                    fill_shift(&mut shifts[shift_idx], candidates, plan.pool, &mut index, plan.title)
                {
                    pass.diagnostics.push(diagnostic);
                }
            }
        }

        pass.shifts = shifts;
        Ok(pass)
    }

    /// 对一组班次并发调用预言机,每次调用独立超时
    async fn call_oracle(
        &self,
        oracle: &Arc<dyn RankingOracle>,
        group: &[usize],
        shifts: &[Shift],
        scored: &[Vec<ScoredCandidate>],
        pool: &[StaffCandidate],
        context: &OracleContext,
    ) -> Vec<OracleOutcome> {
        let timeout = self.config.oracle_timeout();
        let candidate_lists: Vec<Vec<StaffCandidate>> = scored
            .iter()
            .map(|list| list.iter().map(|c| pool[c.pool_idx].clone()).collect())
            .collect();

        let calls = group
            .iter()
            .zip(candidate_lists.iter())
            .map(|(&shift_idx, candidates)| async move {
                if candidates.is_empty() {
                    return Ok(None);
                }
                match tokio::time::timeout(
                    timeout,
                    oracle.rank(&shifts[shift_idx], candidates, context),
                )
                .await
                {
                    Ok(Ok(suggestions)) => Ok(Some(suggestions)),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(OracleError::Timeout(timeout.as_millis() as u64)),
                }
            });
        join_all(calls).await
    }
}

/// 基线班次: 快照中的分配视为已发布状态
fn as_baseline(mut shift: Shift) -> Shift {
    shift.is_modified = false;
    for assignment in shift.assignments.iter_mut() {
        assignment.is_modified = false;
    }
    shift.recompute_status();
    shift
}

/// 员工备注并入候选快照: 不可用日期为硬约束,偏好工作日覆盖原偏好
fn apply_staff_notes(mut staff: Vec<StaffCandidate>, notes: &[StaffNote]) -> Vec<StaffCandidate> {
    for note in notes {
        let Some(candidate) = staff.iter_mut().find(|s| s.staff_id == note.staff_id) else {
            debug!(staff_id = %note.staff_id, "员工备注对应员工不在快照中,忽略");
            continue;
        };
        for date in &note.unavailable_dates {
            candidate
                .unavailable
                .push(UnavailablePeriod::whole_day(*date, Some(note.note.clone())));
        }
        if !note.preferred_weekdays.is_empty() {
            candidate.preferred_weekdays = note.preferred_weekdays.clone();
        }
    }
    staff
}

/// 处理顺序: 开始时间升序, 紧急度 (剩余需求 + 特殊事件加成) 降序
fn processing_order(shifts: &[Shift], request: &GenerationRequest) -> Vec<usize> {
    let mut order: Vec<usize> = (0..shifts.len())
        .filter(|&idx| shifts[idx].remaining_need() > 0)
        .collect();
    order.sort_by(|&a, &b| {
        let (sa, sb) = (&shifts[a], &shifts[b]);
        let urgency_a = sa.remaining_need() + request.urgency_boost(sa.date);
        let urgency_b = sb.remaining_need() + request.urgency_boost(sb.date);
        sa.start_at()
            .cmp(&sb.start_at())
            .then_with(|| urgency_b.cmp(&urgency_a))
            .then_with(|| sa.shift_id.cmp(&sb.shift_id))
    });
    order
}

/// 选取前 N 名候选写入班次并累积负载
fn fill_shift(
    shift: &mut Shift,
    mut candidates: Vec<ScoredCandidate>,
    pool: &[StaffCandidate],
    index: &mut ScheduleIndex,
    strategy_title: &str,
) -> Option<ShiftDiagnostic> {
    let need = shift.remaining_need();
    let available = candidates.len();
    sort_candidates(&mut candidates, pool);

    let mut picked = 0u32;
    for candidate in candidates.into_iter().take(need as usize) {
        let staff = &pool[candidate.pool_idx];
        let assignment = Assignment::new(
            Uuid::new_v4().to_string(),
            &shift.shift_id,
            &staff.staff_id,
            &staff.name,
        )
        .with_confidence(candidate.confidence, reasoning_for(&candidate, strategy_title));
        index.record(shift, staff);
        shift.assignments.push(assignment);
        picked += 1;
    }
    if picked > 0 {
        shift.is_modified = true;
    }
    shift.recompute_status();

    let assigned = shift.assigned_count() as u32;
    if available == 0 {
        warn!(shift_id = %shift.shift_id, "无候选通过硬约束");
        Some(ShiftDiagnostic {
            shift_id: shift.shift_id.clone(),
            code: DiagnosticCode::InsufficientStaff,
            required: shift.required_staff_count,
            assigned,
            message: format!("班次 {} 没有满足硬约束的候选员工", shift.shift_id),
        })
    } else if picked < need {
        Some(ShiftDiagnostic {
            shift_id: shift.shift_id.clone(),
            code: DiagnosticCode::PartiallyStaffed,
            required: shift.required_staff_count,
            assigned,
            message: format!(
                "班次 {} 仅找到 {} 名合格候选, 仍缺 {} 人",
                shift.shift_id,
                picked,
                need - picked
            ),
        })
    } else {
        None
    }
}
