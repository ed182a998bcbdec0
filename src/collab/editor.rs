// ==========================================
// 排班草案引擎 - 协同草案编辑器
// ==========================================
// 职责: 把协同客户端与草案状态机连在一起
// - 本地编辑: 先应用,再广播
// - 远端编辑: 以原编辑ID应用到本地历史
// - 冲突裁决: 以补偿编辑回退被拒绝的一方
// 红线: 各副本处理同一消息序列后收敛到同一草案
// ==========================================

use crate::collab::client::{CollabEvent, CollaborationClient};
use crate::collab::error::{CollabError, CollabResult};
use crate::domain::draft::ScheduleDraft;
use crate::domain::edit_action::{Actor, EditAction, EditOperation};
use crate::draft::{DraftAction, DraftStateMachine, Transition};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

pub struct CollaborativeEditor {
    client: CollaborationClient,
    machine: DraftStateMachine,
    events: broadcast::Receiver<CollabEvent>,
}

impl CollaborativeEditor {
    /// 以已连接 (或稍后连接) 的客户端和加载的草案构建
    pub fn new(client: CollaborationClient, draft: ScheduleDraft) -> Self {
        let events = client.subscribe();
        Self {
            client,
            machine: DraftStateMachine::with_draft(draft),
            events,
        }
    }

    pub fn client(&self) -> &CollaborationClient {
        &self.client
    }

    pub fn machine(&self) -> &DraftStateMachine {
        &self.machine
    }

    pub fn draft(&self) -> Option<&ScheduleDraft> {
        self.machine.draft()
    }

    fn draft_id(&self) -> CollabResult<String> {
        self.machine
            .draft()
            .map(|d| d.draft_id.clone())
            .ok_or(CollabError::Draft(crate::draft::DraftError::NotLoaded))
    }

    fn actor(&self) -> Actor {
        self.client.editor().clone()
    }

    /// 本地编辑并广播
    ///
    /// 撤销/重做/重置以等效编辑广播,远端按自身状态重新定位
    pub async fn edit(&mut self, action: DraftAction) -> CollabResult<Transition> {
        let draft_id = self.draft_id()?;
        let rewound = match &action {
            DraftAction::Reset => self.machine.history().applied().to_vec(),
            _ => Vec::new(),
        };

        let transition = self.machine.apply(action)?;
        let outgoing: Vec<EditAction> = match &transition {
            Transition::Edited(edit) => vec![edit.clone()],
            Transition::Undone(edit) => vec![EditAction::new(inverted(&edit.operation), self.actor())],
            Transition::Redone(edit) => vec![EditAction::new(edit.operation.clone(), self.actor())],
            Transition::Reset => rewound
                .iter()
                .rev()
                .map(|edit| EditAction::new(inverted(&edit.operation), self.actor()))
                .collect(),
            Transition::Unchanged | Transition::Loaded => Vec::new(),
        };
        for edit in outgoing {
            self.client.send_edit(&draft_id, edit).await?;
        }
        Ok(transition)
    }

    /// 处理已到达的协同事件 (不等待)
    pub fn pump(&mut self) -> Vec<CollabEvent> {
        let mut handled = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.absorb(&event);
                    handled.push(event);
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "协同事件积压,部分事件被丢弃");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        handled
    }

    /// 等待并处理下一条协同事件
    pub async fn next_event(&mut self) -> Option<CollabEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => {
                    self.absorb(&event);
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "协同事件积压,部分事件被丢弃");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn absorb(&mut self, event: &CollabEvent) {
        let Some(draft_id) = self.machine.draft().map(|d| d.draft_id.clone()) else {
            return;
        };
        match event {
            CollabEvent::RemoteEdit {
                draft_id: target,
                edit,
            } if *target == draft_id => {
                if let Err(e) = self.machine.apply(DraftAction::ApplyRemote(edit.clone())) {
                    warn!(draft_id = %draft_id, edit_id = %edit.edit_id, error = %e, "远端编辑无法应用");
                }
            }
            CollabEvent::ConflictResolved {
                conflict_id,
                rejected_edit_ids,
                ..
            } => {
                for edit_id in rejected_edit_ids {
                    if self.machine.history().find_applied(edit_id).is_none() {
                        continue;
                    }
                    let reverted = self.machine.apply(DraftAction::Revert {
                        edit_id: edit_id.clone(),
                        actor: Actor::system(),
                    });
                    match reverted {
                        Ok(_) => {
                            debug!(conflict_id = %conflict_id, edit_id = %edit_id, "已回退被拒绝的编辑")
                        }
                        Err(e) => {
                            warn!(conflict_id = %conflict_id, edit_id = %edit_id, error = %e, "回退被拒绝的编辑失败")
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// 反向编辑 (正向应用即撤销原编辑)
fn inverted(op: &EditOperation) -> EditOperation {
    match op {
        EditOperation::Assign {
            shift_id,
            assignment,
            shift_was_modified,
        } => EditOperation::Unassign {
            shift_id: shift_id.clone(),
            assignment: assignment.clone(),
            position: 0,
            shift_was_modified: *shift_was_modified,
        },
        EditOperation::Unassign {
            shift_id,
            assignment,
            shift_was_modified,
            ..
        } => EditOperation::Assign {
            shift_id: shift_id.clone(),
            assignment: assignment.clone(),
            shift_was_modified: *shift_was_modified,
        },
        EditOperation::Move {
            from_shift_id,
            to_shift_id,
            before,
            after,
            from_was_modified,
            to_was_modified,
            ..
        } => EditOperation::Move {
            from_shift_id: to_shift_id.clone(),
            to_shift_id: from_shift_id.clone(),
            before: after.clone(),
            after: before.clone(),
            from_position: 0,
            from_was_modified: *to_was_modified,
            to_was_modified: *from_was_modified,
        },
    }
}
