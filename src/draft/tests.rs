use super::*;
use crate::config::SyncConfig;
use crate::domain::draft::{DateRange, ScheduleDraft, ScheduleSnapshot};
use crate::domain::edit_action::{Actor, EditKind, EditOperation};
use crate::domain::shift::{Assignment, Shift};
use crate::domain::types::{DraftStatus, ShiftStatus};
use crate::repository::{RepositoryError, RepositoryResult, ScheduleStore};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use std::sync::atomic::{AtomicBool, Ordering};
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

fn baseline(id: &str, shift_id: &str, staff_id: &str) -> Assignment {
    let mut a = Assignment::new(id, shift_id, staff_id, staff_id.to_uppercase());
    a.is_modified = false;
    a
}

/// S1 有 ann,S2 空缺,S3 有 ben
fn sample_draft() -> ScheduleDraft {
    let mut s1 = Shift::new("S1", d(2), t(9), t(17), None, 1);
    s1.assignments.push(baseline("a1", "S1", "ann"));
    let s2 = Shift::new("S2", d(3), t(9), t(17), None, 1);
    let mut s3 = Shift::new("S3", d(4), t(9), t(17), None, 2);
    s3.assignments.push(baseline("a3", "S3", "ben"));
    ScheduleDraft::new_manual("D1", "B1", DateRange::new(d(2), d(8)), vec![s1, s2, s3])
}

fn mgr() -> Actor {
    Actor::new("m1", "Manager")
}

fn assign(shift_id: &str, staff_id: &str) -> DraftAction {
    DraftAction::Assign {
        shift_id: shift_id.to_string(),
        staff_id: staff_id.to_string(),
        staff_name: staff_id.to_uppercase(),
        actor: mgr(),
        override_note: None,
    }
}

fn move_action(assignment_id: &str, from: &str, to: &str) -> DraftAction {
    DraftAction::Move {
        assignment_id: assignment_id.to_string(),
        from_shift_id: from.to_string(),
        to_shift_id: to.to_string(),
        actor: mgr(),
        override_note: None,
    }
}

fn shifts(machine: &DraftStateMachine) -> Vec<Shift> {
    machine.draft().unwrap().shifts.clone()
}

// ==========================================
// 状态机
// ==========================================

#[test]
fn test_assign_undo_redo_round_trip() {
    let mut machine = DraftStateMachine::with_draft(sample_draft());
    let before = shifts(&machine);

    let transition = machine.apply(assign("S2", "cat")).unwrap();
    assert!(transition.is_changed());
    let after = shifts(&machine);
    let s2 = machine.draft().unwrap().find_shift("S2").unwrap();
    assert!(s2.is_modified);
    assert_eq!(s2.status, ShiftStatus::Filled);
    assert!(machine.is_modified());

    machine.apply(DraftAction::Undo).unwrap();
    assert_eq!(shifts(&machine), before);
    assert!(!machine.is_modified());
    assert!(machine.can_redo());

    machine.apply(DraftAction::Redo).unwrap();
    assert_eq!(shifts(&machine), after);
    machine.verify_replay().unwrap();
}

#[test]
fn test_undo_at_start_is_rejected_without_change() {
    let mut machine = DraftStateMachine::with_draft(sample_draft());
    let before = shifts(&machine);

    assert_eq!(
        machine.apply(DraftAction::Undo),
        Err(DraftError::HistoryUnderflow)
    );
    assert_eq!(
        machine.apply(DraftAction::Redo),
        Err(DraftError::HistoryOverflow)
    );
    assert_eq!(shifts(&machine), before);
}

#[test]
fn test_new_edit_after_undo_discards_redo_branch() {
    let mut machine = DraftStateMachine::with_draft(sample_draft());
    machine.apply(assign("S2", "cat")).unwrap();
    machine.apply(assign("S3", "dan")).unwrap();
    machine.apply(DraftAction::Undo).unwrap();
    assert_eq!(machine.history().len(), 2);

    machine.apply(assign("S3", "eve")).unwrap();
    assert_eq!(machine.history().len(), 2);
    assert_eq!(machine.history().index(), 2);
    assert!(!machine.can_redo());
    let s3 = machine.draft().unwrap().find_shift("S3").unwrap();
    assert!(s3.has_staff("eve"));
    assert!(!s3.has_staff("dan"));
}

#[test]
fn test_move_round_trip_restores_position_and_flags() {
    let mut draft = sample_draft();
    draft.shifts[0]
        .assignments
        .insert(0, baseline("a0", "S1", "zed"));
    draft.shifts[0].required_staff_count = 2;
    let mut machine = DraftStateMachine::with_draft(draft);
    let before = shifts(&machine);

    machine.apply(move_action("a0", "S1", "S2")).unwrap();
    let current = machine.draft().unwrap();
    let moved = &current.find_shift("S2").unwrap().assignments[0];
    assert_eq!(moved.assignment_id, "a0");
    assert_eq!(moved.shift_id, "S2");
    assert!(moved.is_modified);
    assert!(current.find_shift("S1").unwrap().is_modified);

    machine.apply(DraftAction::Undo).unwrap();
    assert_eq!(shifts(&machine), before);
    let s1 = machine.draft().unwrap().find_shift("S1").unwrap();
    assert_eq!(s1.assignments[0].assignment_id, "a0");
    assert!(!s1.is_modified);
}

#[test]
fn test_duplicate_assign_is_noop() {
    let mut machine = DraftStateMachine::with_draft(sample_draft());
    let transition = machine.apply(assign("S1", "ann")).unwrap();
    assert_eq!(transition, Transition::Unchanged);
    assert!(machine.history().is_empty());

    // 目标班次已有该员工
    let transition = machine.apply(move_action("a1", "S1", "S1")).unwrap();
    assert_eq!(transition, Transition::Unchanged);
}

#[test]
fn test_unknown_targets_are_errors() {
    let mut machine = DraftStateMachine::with_draft(sample_draft());
    assert_eq!(
        machine.apply(assign("S9", "cat")),
        Err(DraftError::UnknownShift("S9".to_string()))
    );
    assert_eq!(
        machine.apply(DraftAction::Unassign {
            assignment_id: "nope".to_string(),
            actor: mgr(),
        }),
        Err(DraftError::UnknownAssignment("nope".to_string()))
    );
    assert!(DraftStateMachine::new()
        .apply(assign("S1", "cat"))
        .is_err());
}

#[test]
fn test_replay_reproduces_current_after_mixed_edits() {
    let mut machine = DraftStateMachine::with_draft(sample_draft());
    machine.apply(assign("S2", "cat")).unwrap();
    machine
        .apply(DraftAction::Unassign {
            assignment_id: "a1".to_string(),
            actor: mgr(),
        })
        .unwrap();
    machine.apply(move_action("a3", "S3", "S1")).unwrap();
    machine.apply(DraftAction::Undo).unwrap();
    machine.apply(assign("S3", "dan")).unwrap();

    machine.verify_replay().unwrap();
    assert_eq!(machine.replay().unwrap().shifts, shifts(&machine));

    // 全部撤销回到基线
    while machine.can_undo() {
        machine.apply(DraftAction::Undo).unwrap();
    }
    assert_eq!(shifts(&machine), machine.original().unwrap().shifts);
}

#[test]
fn test_reset_restores_original() {
    let mut machine = DraftStateMachine::with_draft(sample_draft());
    machine.apply(assign("S2", "cat")).unwrap();
    machine.apply(assign("S3", "dan")).unwrap();

    assert_eq!(machine.apply(DraftAction::Reset).unwrap(), Transition::Reset);
    assert!(!machine.is_modified());
    assert!(!machine.can_undo());
    assert!(machine.change_summary().is_empty());
}

#[test]
fn test_published_draft_is_not_editable() {
    let mut draft = sample_draft();
    draft.status = DraftStatus::Published;
    let mut machine = DraftStateMachine::with_draft(draft);
    assert!(matches!(
        machine.apply(assign("S2", "cat")),
        Err(DraftError::NotEditable { .. })
    ));
}

#[test]
fn test_change_summary_classifies_edits() {
    let mut machine = DraftStateMachine::with_draft(sample_draft());
    machine.apply(assign("S2", "cat")).unwrap();
    machine.apply(move_action("a3", "S3", "S1")).unwrap();

    let summary = machine.change_summary();
    assert_eq!(summary.edit_count, 2);
    assert_eq!(summary.added.len(), 1);
    assert_eq!(summary.added[0].staff_id, "cat");
    assert_eq!(summary.moved.len(), 1);
    assert_eq!(summary.moved[0].from_shift_id.as_deref(), Some("S3"));
    assert_eq!(summary.moved[0].to_shift_id.as_deref(), Some("S1"));
    assert!(summary.removed.is_empty());
    assert_eq!(summary.modified_shift_ids, vec!["S1", "S2", "S3"]);
}

#[test]
fn test_rejected_operation_leaves_draft_untouched() {
    let original = sample_draft();
    let a1 = original.shifts[0].assignments[0].clone();

    // 位置与分配不符
    let mut draft = original.clone();
    let stale_move = EditOperation::Move {
        from_shift_id: "S1".to_string(),
        to_shift_id: "S2".to_string(),
        before: a1.clone(),
        after: a1.clone(),
        from_position: 1,
        from_was_modified: false,
        to_was_modified: false,
    };
    assert!(matches!(
        ops::apply_forward(&mut draft, &stale_move),
        Err(DraftError::ReplayMismatch { .. })
    ));
    assert_eq!(draft, original);

    // 目标班次不存在
    let missing_target = EditOperation::Move {
        from_shift_id: "S1".to_string(),
        to_shift_id: "S9".to_string(),
        before: a1.clone(),
        after: a1.clone(),
        from_position: 0,
        from_was_modified: false,
        to_was_modified: false,
    };
    assert!(ops::apply_forward(&mut draft, &missing_target).is_err());
    assert_eq!(draft, original);

    // 撤销一个末尾不匹配的指派
    let stale_assign = EditOperation::Assign {
        shift_id: "S3".to_string(),
        assignment: a1,
        shift_was_modified: false,
    };
    assert!(ops::apply_inverse(&mut draft, &stale_assign).is_err());
    assert_eq!(draft, original);
}

// ==========================================
// 远端编辑与冲突回退
// ==========================================

#[test]
fn test_remote_edit_is_recorded_and_deduplicated() {
    let mut peer = DraftStateMachine::with_draft(sample_draft());
    let Transition::Edited(remote) = peer.apply(assign("S2", "cat")).unwrap() else {
        panic!("expected edit");
    };

    let mut machine = DraftStateMachine::with_draft(sample_draft());
    machine.apply(assign("S3", "dan")).unwrap();
    let transition = machine
        .apply(DraftAction::ApplyRemote(remote.clone()))
        .unwrap();
    let Transition::Edited(applied) = transition else {
        panic!("expected edit");
    };
    assert_eq!(applied.edit_id, remote.edit_id);
    assert_eq!(applied.actor, remote.actor);

    // 重复投递
    assert_eq!(
        machine.apply(DraftAction::ApplyRemote(remote)).unwrap(),
        Transition::Unchanged
    );
    machine.verify_replay().unwrap();

    machine.apply(DraftAction::Undo).unwrap();
    assert!(!machine
        .draft()
        .unwrap()
        .find_shift("S2")
        .unwrap()
        .has_staff("cat"));
}

#[test]
fn test_remote_unassign_rebases_position() {
    let mut draft = sample_draft();
    draft.shifts[2]
        .assignments
        .push(baseline("a4", "S3", "eve"));
    let mut peer = DraftStateMachine::with_draft(draft.clone());
    let Transition::Edited(remote) = peer
        .apply(DraftAction::Unassign {
            assignment_id: "a4".to_string(),
            actor: Actor::new("m2", "Other"),
        })
        .unwrap()
    else {
        panic!("expected edit");
    };

    let mut machine = DraftStateMachine::with_draft(draft);
    machine
        .apply(DraftAction::Unassign {
            assignment_id: "a3".to_string(),
            actor: mgr(),
        })
        .unwrap();
    machine.apply(DraftAction::ApplyRemote(remote)).unwrap();

    assert!(machine
        .draft()
        .unwrap()
        .find_shift("S3")
        .unwrap()
        .assignments
        .is_empty());
    machine.verify_replay().unwrap();
}

#[test]
fn test_revert_generates_compensating_edit() {
    let mut machine = DraftStateMachine::with_draft(sample_draft());
    let Transition::Edited(edit) = machine.apply(assign("S2", "cat")).unwrap() else {
        panic!("expected edit");
    };

    let transition = machine
        .apply(DraftAction::Revert {
            edit_id: edit.edit_id.clone(),
            actor: Actor::system(),
        })
        .unwrap();
    let Transition::Edited(compensation) = transition else {
        panic!("expected edit");
    };
    assert_eq!(compensation.kind(), EditKind::Unassign);
    assert!(compensation.description.starts_with("冲突裁决回退"));
    assert!(!machine
        .draft()
        .unwrap()
        .find_shift("S2")
        .unwrap()
        .has_staff("cat"));
    assert_eq!(machine.history().len(), 2);

    assert_eq!(
        machine.apply(DraftAction::Revert {
            edit_id: "missing".to_string(),
            actor: Actor::system(),
        }),
        Err(DraftError::UnknownEdit("missing".to_string()))
    );
}

#[test]
fn test_revert_move_sends_assignment_back() {
    let mut machine = DraftStateMachine::with_draft(sample_draft());
    let Transition::Edited(edit) = machine.apply(move_action("a1", "S1", "S2")).unwrap() else {
        panic!("expected edit");
    };
    machine
        .apply(DraftAction::Revert {
            edit_id: edit.edit_id,
            actor: Actor::system(),
        })
        .unwrap();

    let current = machine.draft().unwrap();
    assert!(current.find_shift("S1").unwrap().has_staff("ann"));
    assert!(current.find_shift("S2").unwrap().assignments.is_empty());
    assert!(matches!(
        machine.history().entries()[1].operation,
        EditOperation::Move { .. }
    ));
}

// ==========================================
// 自动同步
// ==========================================

/// 记录每次保存的班次ID
#[derive(Default)]
struct RecordingStore {
    saves: Mutex<Vec<Vec<String>>>,
    fail: AtomicBool,
}

impl RecordingStore {
    fn saves(&self) -> Vec<Vec<String>> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduleStore for RecordingStore {
    async fn load_snapshot(
        &self,
        _business_id: &str,
        _date_range: DateRange,
    ) -> RepositoryResult<ScheduleSnapshot> {
        Ok(ScheduleSnapshot::default())
    }

    async fn save_modified_shifts(&self, _draft_id: &str, shifts: &[Shift]) -> RepositoryResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepositoryError::DatabaseConnectionError("offline".to_string()));
        }
        self.saves
            .lock()
            .unwrap()
            .push(shifts.iter().map(|s| s.shift_id.clone()).collect());
        Ok(())
    }

    async fn commit_published(&self, _draft_id: &str) -> RepositoryResult<()> {
        Ok(())
    }

    async fn save_draft(&self, _draft: &ScheduleDraft) -> RepositoryResult<()> {
        Ok(())
    }

    async fn find_draft(&self, _draft_id: &str) -> RepositoryResult<Option<ScheduleDraft>> {
        Ok(None)
    }

    async fn find_published_overlapping(
        &self,
        _business_id: &str,
        _date_range: DateRange,
    ) -> RepositoryResult<Vec<ScheduleDraft>> {
        Ok(Vec::new())
    }
}

fn fast_sync() -> SyncConfig {
    SyncConfig {
        quiet_window_ms: 40,
        save_timeout_ms: 1_000,
    }
}

#[tokio::test]
async fn test_auto_sync_debounces_burst_of_edits() {
    let store = Arc::new(RecordingStore::default());
    let mut machine = DraftStateMachine::with_draft(sample_draft());
    let sync = AutoSync::spawn(store.clone(), machine.draft().unwrap(), &fast_sync());

    machine.apply(assign("S2", "cat")).unwrap();
    sync.notify(machine.draft().unwrap());
    machine.apply(assign("S3", "dan")).unwrap();
    sync.notify(machine.draft().unwrap());

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(store.saves(), vec![vec!["S2".to_string(), "S3".to_string()]]);
    let status = sync.status();
    assert!(status.last_synced_at.is_some());
    assert_eq!(status.synced_shift_count, 2);
    assert!(!status.in_flight);
}

#[tokio::test]
async fn test_auto_sync_failure_keeps_local_edits_and_error() {
    let store = Arc::new(RecordingStore::default());
    store.fail.store(true, Ordering::SeqCst);
    let mut machine = DraftStateMachine::with_draft(sample_draft());
    let sync = AutoSync::spawn(store.clone(), machine.draft().unwrap(), &fast_sync());

    machine.apply(assign("S2", "cat")).unwrap();
    sync.notify(machine.draft().unwrap());
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(sync.status().sync_error.is_some());
    assert!(machine
        .draft()
        .unwrap()
        .find_shift("S2")
        .unwrap()
        .has_staff("cat"));

    // 恢复后下一次同步清除错误
    store.fail.store(false, Ordering::SeqCst);
    assert_eq!(sync.flush().await.unwrap(), 1);
    assert!(sync.status().sync_error.is_none());
    assert_eq!(sync.flush().await.unwrap(), 0);
}
