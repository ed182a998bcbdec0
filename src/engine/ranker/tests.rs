use super::*;
use crate::config::{ConstraintConfig, RankerConfig};
use crate::domain::draft::{DateRange, StaffNote};
use crate::domain::shift::Shift;
use crate::domain::staff::StaffCandidate;
use crate::domain::types::{DraftOrigin, ShiftStatus};
use crate::engine::cancel::CancelSignal;
use crate::engine::error::EngineError;
use crate::engine::oracle::{OracleContext, OracleError, OracleStatus, OracleSuggestion, RankingOracle};
use crate::repository::SqliteScheduleStore;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==========================================
// 测试辅助函数
// ==========================================

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

fn t(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap()
}

fn week() -> DateRange {
    DateRange::new(d(2), d(8))
}

fn cook(id: &str, name: &str) -> StaffCandidate {
    let mut staff = StaffCandidate::new(id, name).with_skill("kitchen");
    staff.hourly_rate = 20.0;
    staff
}

fn kitchen_shift(id: &str, day: u32, need: u32) -> Shift {
    Shift::new(id, d(day), t(9), t(17), Some("kitchen".to_string()), need)
}

fn seeded_store(shifts: &[Shift], staff: &[StaffCandidate]) -> Arc<SqliteScheduleStore> {
    let store =
        SqliteScheduleStore::new(Arc::new(Mutex::new(Connection::open_in_memory().unwrap())))
            .unwrap();
    for shift in shifts {
        store.upsert_shift("B1", shift).unwrap();
    }
    for s in staff {
        store.upsert_staff("B1", s).unwrap();
    }
    Arc::new(store)
}

fn ranker(store: Arc<SqliteScheduleStore>) -> AssignmentRanker {
    AssignmentRanker::new(store, RankerConfig::default(), ConstraintConfig::default())
}

fn staff_on(outcome: &GenerationOutcome, shift_id: &str) -> BTreeSet<String> {
    outcome
        .draft
        .find_shift(shift_id)
        .unwrap()
        .active_assignments()
        .map(|a| a.staff_id.clone())
        .collect()
}

/// 固定偏好某员工的预言机
struct FavouriteOracle {
    favourite: Vec<String>,
}

#[async_trait]
impl RankingOracle for FavouriteOracle {
    async fn rank(
        &self,
        _shift: &Shift,
        _candidates: &[StaffCandidate],
        _context: &OracleContext,
    ) -> Result<Vec<OracleSuggestion>, OracleError> {
        Ok(self
            .favourite
            .iter()
            .map(|id| OracleSuggestion {
                staff_id: id.clone(),
                reasoning: Some("历史表现好".to_string()),
            })
            .collect())
    }
}

/// 超时的预言机
struct SlowOracle;

#[async_trait]
impl RankingOracle for SlowOracle {
    async fn rank(
        &self,
        _shift: &Shift,
        _candidates: &[StaffCandidate],
        _context: &OracleContext,
    ) -> Result<Vec<OracleSuggestion>, OracleError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }
}

/// 始终失败并计数的预言机
#[derive(Default)]
struct BrokenOracle {
    calls: AtomicUsize,
}

#[async_trait]
impl RankingOracle for BrokenOracle {
    async fn rank(
        &self,
        _shift: &Shift,
        _candidates: &[StaffCandidate],
        _context: &OracleContext,
    ) -> Result<Vec<OracleSuggestion>, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(OracleError::Unavailable("503".to_string()))
    }
}

/// 首次调用给出建议,之后一直失败的预言机
#[derive(Default)]
struct FlakyOracle {
    calls: AtomicUsize,
}

#[async_trait]
impl RankingOracle for FlakyOracle {
    async fn rank(
        &self,
        _shift: &Shift,
        _candidates: &[StaffCandidate],
        _context: &OracleContext,
    ) -> Result<Vec<OracleSuggestion>, OracleError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(vec![OracleSuggestion {
                staff_id: "st3".to_string(),
                reasoning: Some("历史表现好".to_string()),
            }])
        } else {
            Err(OracleError::Unavailable("503".to_string()))
        }
    }
}

// ==========================================
// 规则排序
// ==========================================

#[tokio::test]
async fn test_kitchen_shift_skips_staff_at_cap() {
    let mut capped = cook("st3", "Cid");
    capped.committed_hours = 40.0;
    let store = seeded_store(
        &[kitchen_shift("S1", 2, 2)],
        &[cook("st1", "Ann"), cook("st2", "Ben"), capped],
    );

    let outcome = ranker(store)
        .generate_draft(&GenerationRequest::new("B1", week()), &CancelSignal::new())
        .await
        .unwrap();

    let expected: BTreeSet<String> = ["st1", "st2"].iter().map(|s| s.to_string()).collect();
    assert_eq!(staff_on(&outcome, "S1"), expected);
    let shift = outcome.draft.find_shift("S1").unwrap();
    assert_eq!(shift.status, ShiftStatus::Filled);
    assert!(shift.is_modified);
    assert!(outcome.draft.overall_confidence >= 0.8);
    assert_eq!(outcome.draft.origin, DraftOrigin::Generated);
    assert!(!outcome.draft.ai_generated);
    assert_eq!(outcome.oracle_status, OracleStatus::NotConfigured);
    assert!(outcome.diagnostics.is_empty());
    assert!(shift.assignments.iter().all(|a| a.reasoning.is_some()));
}

#[tokio::test]
async fn test_insufficient_staff_is_not_fatal() {
    let bar_shift = Shift::new("S1", d(2), t(18), t(23), Some("bar".to_string()), 1);
    let store = seeded_store(
        &[bar_shift, kitchen_shift("S2", 3, 2)],
        &[cook("st1", "Ann")],
    );

    let outcome = ranker(store)
        .generate_draft(&GenerationRequest::new("B1", week()), &CancelSignal::new())
        .await
        .unwrap();

    let s1 = outcome.draft.find_shift("S1").unwrap();
    assert_eq!(s1.status, ShiftStatus::Open);
    assert!(s1.assignments.is_empty());
    assert_eq!(
        outcome.diagnostic_for("S1").unwrap().code,
        DiagnosticCode::InsufficientStaff
    );
    assert_eq!(
        outcome.diagnostic_for("S2").unwrap().code,
        DiagnosticCode::PartiallyStaffed
    );
    assert_eq!(
        outcome.draft.find_shift("S2").unwrap().status,
        ShiftStatus::Understaffed
    );
}

#[tokio::test]
async fn test_later_shift_sees_committed_load() {
    // 同时段两个班次,只有一名员工: 第二个班次因重叠无候选
    let a = kitchen_shift("S1", 2, 1);
    let b = kitchen_shift("S2", 2, 1);
    let store = seeded_store(&[a, b], &[cook("st1", "Ann")]);

    let outcome = ranker(store)
        .generate_draft(&GenerationRequest::new("B1", week()), &CancelSignal::new())
        .await
        .unwrap();

    assert_eq!(staff_on(&outcome, "S1").len(), 1);
    assert!(staff_on(&outcome, "S2").is_empty());
    assert_eq!(
        outcome.diagnostic_for("S2").unwrap().code,
        DiagnosticCode::InsufficientStaff
    );
}

#[tokio::test]
async fn test_staff_note_unavailable_date() {
    let store = seeded_store(
        &[kitchen_shift("S1", 2, 1)],
        &[cook("st1", "Ann"), cook("st2", "Ben")],
    );
    let mut request = GenerationRequest::new("B1", week());
    request.staff_notes.push(StaffNote {
        staff_id: "st1".to_string(),
        note: "家事".to_string(),
        unavailable_dates: vec![d(2)],
        preferred_weekdays: Vec::new(),
    });

    let outcome = ranker(store)
        .generate_draft(&request, &CancelSignal::new())
        .await
        .unwrap();

    assert_eq!(
        staff_on(&outcome, "S1"),
        ["st2".to_string()].into_iter().collect()
    );
}

// ==========================================
// 预言机合并与回退
// ==========================================

#[tokio::test]
async fn test_oracle_reorders_only_eligible_candidates() {
    let mut bartender = StaffCandidate::new("st9", "Zed").with_skill("bar");
    bartender.hourly_rate = 20.0;
    let store = seeded_store(
        &[kitchen_shift("S1", 2, 1)],
        &[cook("st1", "Ann"), cook("st2", "Ben"), bartender],
    );
    let oracle = Arc::new(FavouriteOracle {
        favourite: vec!["st9".to_string(), "st2".to_string()],
    });
    let config = RankerConfig {
        oracle_weight: 1.0,
        ..RankerConfig::default()
    };
    let ranker = AssignmentRanker::new(store, config, ConstraintConfig::default())
        .with_oracle(oracle);

    let outcome = ranker
        .generate_draft(&GenerationRequest::new("B1", week()), &CancelSignal::new())
        .await
        .unwrap();

    assert_eq!(
        staff_on(&outcome, "S1"),
        ["st2".to_string()].into_iter().collect()
    );
    assert!(outcome.draft.ai_generated);
    assert_eq!(outcome.oracle_status, OracleStatus::Succeeded { calls: 1 });
    let reasoning = outcome.draft.find_shift("S1").unwrap().assignments[0]
        .reasoning
        .clone()
        .unwrap();
    assert!(reasoning.contains("历史表现好"));
}

#[tokio::test]
async fn test_oracle_timeout_falls_back_to_rules() {
    let shifts = [kitchen_shift("S1", 2, 2), kitchen_shift("S2", 3, 1)];
    let staff = [cook("st1", "Ann"), cook("st2", "Ben"), cook("st3", "Cid")];
    let config = RankerConfig {
        oracle_timeout_ms: 50,
        ..RankerConfig::default()
    };

    let rule_only = AssignmentRanker::new(
        seeded_store(&shifts, &staff),
        config.clone(),
        ConstraintConfig::default(),
    )
    .generate_draft(&GenerationRequest::new("B1", week()), &CancelSignal::new())
    .await
    .unwrap();

    let with_oracle = AssignmentRanker::new(
        seeded_store(&shifts, &staff),
        config,
        ConstraintConfig::default(),
    )
    .with_oracle(Arc::new(SlowOracle))
    .generate_draft(&GenerationRequest::new("B1", week()), &CancelSignal::new())
    .await
    .unwrap();

    assert!(!with_oracle.draft.ai_generated);
    assert!(matches!(with_oracle.oracle_status, OracleStatus::FellBack { .. }));
    for id in ["S1", "S2"] {
        assert_eq!(staff_on(&with_oracle, id), staff_on(&rule_only, id));
        assert_eq!(
            with_oracle.draft.find_shift(id).unwrap().status,
            ShiftStatus::Filled
        );
    }
}

#[tokio::test]
async fn test_oracle_disabled_after_first_failure() {
    let store = seeded_store(
        &[kitchen_shift("S1", 2, 1), kitchen_shift("S2", 3, 1), kitchen_shift("S3", 4, 1)],
        &[cook("st1", "Ann"), cook("st2", "Ben")],
    );
    let oracle = Arc::new(BrokenOracle::default());
    let ranker = ranker(store).with_oracle(oracle.clone());

    let outcome = ranker
        .generate_draft(&GenerationRequest::new("B1", week()), &CancelSignal::new())
        .await
        .unwrap();

    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    assert!(!outcome.draft.ai_generated);
    assert!(outcome
        .draft
        .shifts
        .iter()
        .all(|s| s.status == ShiftStatus::Filled));
}

#[tokio::test]
async fn test_oracle_failure_midway_discards_earlier_oracle_picks() {
    let shifts = [
        kitchen_shift("S1", 2, 1),
        kitchen_shift("S2", 3, 1),
        kitchen_shift("S3", 4, 1),
    ];
    let mut pricey = cook("st3", "Cid");
    pricey.hourly_rate = 30.0;
    let staff = [cook("st1", "Ann"), cook("st2", "Ben"), pricey];
    let config = RankerConfig {
        oracle_weight: 1.0,
        ..RankerConfig::default()
    };

    let rule_only = AssignmentRanker::new(
        seeded_store(&shifts, &staff),
        config.clone(),
        ConstraintConfig::default(),
    )
    .generate_draft(&GenerationRequest::new("B1", week()), &CancelSignal::new())
    .await
    .unwrap();

    let flaky = AssignmentRanker::new(
        seeded_store(&shifts, &staff),
        config,
        ConstraintConfig::default(),
    )
    .with_oracle(Arc::new(FlakyOracle::default()))
    .generate_draft(&GenerationRequest::new("B1", week()), &CancelSignal::new())
    .await
    .unwrap();

    assert!(!flaky.draft.ai_generated);
    assert!(matches!(flaky.oracle_status, OracleStatus::FellBack { .. }));
    for id in ["S1", "S2", "S3"] {
        assert_eq!(staff_on(&flaky, id), staff_on(&rule_only, id));
    }
    assert!(flaky
        .draft
        .shifts
        .iter()
        .flat_map(|s| s.assignments.iter())
        .all(|a| !a.reasoning.as_deref().unwrap_or("").contains("历史表现好")));
}

#[tokio::test]
async fn test_oracle_never_consulted_is_not_ai_assisted() {
    // 没有任何候选满足技能要求,预言机不会被调用
    let mut bartender = StaffCandidate::new("st9", "Zed").with_skill("bar");
    bartender.hourly_rate = 20.0;
    let store = seeded_store(&[kitchen_shift("S1", 2, 1)], &[bartender]);
    let ranker = ranker(store).with_oracle(Arc::new(FavouriteOracle {
        favourite: vec!["st9".to_string()],
    }));

    let outcome = ranker
        .generate_draft(&GenerationRequest::new("B1", week()), &CancelSignal::new())
        .await
        .unwrap();

    assert_eq!(outcome.oracle_status, OracleStatus::Succeeded { calls: 0 });
    assert!(!outcome.draft.ai_generated);
    assert_eq!(outcome.diagnostics.len(), 1);
}

// ==========================================
// 取消
// ==========================================

#[tokio::test]
async fn test_cancel_before_start() {
    let store = seeded_store(&[kitchen_shift("S1", 2, 1)], &[cook("st1", "Ann")]);
    let cancel = CancelSignal::new();
    cancel.cancel();

    let err = ranker(store)
        .generate_draft(&GenerationRequest::new("B1", week()), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}

#[tokio::test]
async fn test_cancel_during_oracle_call() {
    let store = seeded_store(&[kitchen_shift("S1", 2, 1)], &[cook("st1", "Ann")]);
    let ranker = ranker(store).with_oracle(Arc::new(SlowOracle));
    let cancel = CancelSignal::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(2),
        ranker.generate_draft(&GenerationRequest::new("B1", week()), &cancel),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}
