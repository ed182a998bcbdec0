use super::*;
use crate::config::{CollaborationConfig, ReconnectPolicy};
use crate::domain::collaboration::{ConflictResolution, LockResource};
use crate::domain::edit_action::{Actor, EditAction, EditOperation};
use crate::domain::shift::Assignment;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

// ==========================================
// 测试辅助函数
// ==========================================

fn ann() -> Actor {
    Actor::new("u-ann", "Ann")
}

fn ben() -> Actor {
    Actor::new("u-ben", "Ben")
}

fn assign_edit(shift_id: &str, staff_id: &str, actor: Actor) -> EditAction {
    EditAction::new(
        EditOperation::Assign {
            shift_id: shift_id.to_string(),
            assignment: Assignment::new(
                uuid::Uuid::new_v4().to_string(),
                shift_id,
                staff_id,
                staff_id,
            ),
            shift_was_modified: false,
        },
        actor,
    )
}

fn session_with_two() -> CollaborationSession {
    let mut session = CollaborationSession::new("B1", CollaborationConfig::default());
    let now = Instant::now();
    session.handle(1, ClientMessage::Join { editor: ann() }, now);
    session.handle(2, ClientMessage::Join { editor: ben() }, now);
    session
}

fn lock_request(id: &str, shift_id: &str) -> ClientMessage {
    ClientMessage::AcquireLock {
        request_id: id.to_string(),
        resource: LockResource::shift(shift_id),
    }
}

fn edit_msg(edit: EditAction) -> ClientMessage {
    ClientMessage::Edit {
        draft_id: "D1".to_string(),
        edit,
    }
}

fn fast_config() -> CollaborationConfig {
    CollaborationConfig {
        lock_timeout_ms: 80,
        reconnect: ReconnectPolicy {
            base_delay_ms: 1,
            max_delay_ms: 5,
            max_attempts: 2,
        },
        ..CollaborationConfig::default()
    }
}

// ==========================================
// 会话状态机
// ==========================================

#[test]
fn test_second_lock_fails_with_single_conflict_to_requester() {
    let mut session = session_with_two();
    let now = Instant::now();

    let out = session.handle(1, lock_request("r1", "S1"), now);
    assert!(out.iter().any(|o| matches!(
        o.message,
        ServerMessage::LockResult { granted: true, .. }
    )));

    let out = session.handle(2, lock_request("r2", "S1"), now);
    assert!(out.iter().all(|o| o.audience == Audience::Only(2)));
    let conflicts: Vec<_> = out
        .iter()
        .filter_map(|o| match &o.message {
            ServerMessage::LockConflict { holder, .. } => Some(holder.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(conflicts, vec![ann()]);
    assert!(out.iter().any(|o| matches!(
        o.message,
        ServerMessage::LockResult { granted: false, .. }
    )));
    assert_eq!(session.lock_holder(&LockResource::shift("S1")), Some(&ann()));
}

#[test]
fn test_same_editor_can_refresh_own_lock() {
    let mut session = session_with_two();
    let now = Instant::now();
    session.handle(1, lock_request("r1", "S1"), now);
    let out = session.handle(1, lock_request("r2", "S1"), now);
    assert!(out.iter().any(|o| matches!(
        o.message,
        ServerMessage::LockResult { granted: true, .. }
    )));
}

#[test]
fn test_lock_expires_after_ttl() {
    let config = CollaborationConfig {
        lock_ttl_ms: 100,
        ..CollaborationConfig::default()
    };
    let mut session = CollaborationSession::new("B1", config);
    let now = Instant::now();
    session.handle(1, ClientMessage::Join { editor: ann() }, now);
    session.handle(2, ClientMessage::Join { editor: ben() }, now);
    session.handle(1, lock_request("r1", "S1"), now);

    let later = now + Duration::from_millis(200);
    let out = session.handle(2, lock_request("r2", "S1"), later);
    assert!(out.iter().any(|o| matches!(
        o.message,
        ServerMessage::LockResult { granted: true, .. }
    )));
    assert_eq!(session.lock_holder(&LockResource::shift("S1")), Some(&ben()));
}

#[test]
fn test_disconnect_releases_locks_and_broadcasts_presence() {
    let mut session = session_with_two();
    let now = Instant::now();
    session.handle(1, lock_request("r1", "S1"), now);

    let out = session.disconnect(1);
    assert!(out.iter().any(|o| matches!(
        &o.message,
        ServerMessage::PresenceSnapshot { editors } if editors.len() == 1
    )));
    assert!(out.iter().any(|o| matches!(
        &o.message,
        ServerMessage::LockSnapshot { locks } if locks.is_empty()
    )));
    assert!(session.lock_holder(&LockResource::shift("S1")).is_none());
    // 重复断开是无操作
    assert!(session.disconnect(1).is_empty());
}

#[test]
fn test_concurrent_edits_in_window_raise_conflict() {
    let mut session = session_with_two();
    let now = Instant::now();
    let edit1 = assign_edit("S1", "st1", ann());
    let edit2 = assign_edit("S1", "st2", ben());

    let out = session.handle(1, edit_msg(edit1.clone()), now);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].audience, Audience::Others(1));

    let out = session.handle(2, edit_msg(edit2.clone()), now + Duration::from_millis(500));
    let conflict = out
        .iter()
        .find_map(|o| match &o.message {
            ServerMessage::ConflictDetected { conflict } => Some((o.audience, conflict.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(conflict.0, Audience::All);
    assert_eq!(conflict.1.edit1.edit_id, edit1.edit_id);
    assert_eq!(conflict.1.edit2.edit_id, edit2.edit_id);
    assert_eq!(conflict.1.resource, LockResource::shift("S1"));
    assert_eq!(session.conflicts().count(), 1);
}

#[test]
fn test_no_conflict_outside_window_or_under_lock() {
    let mut session = session_with_two();
    let now = Instant::now();
    session.handle(1, edit_msg(assign_edit("S1", "st1", ann())), now);
    let out = session.handle(
        2,
        edit_msg(assign_edit("S1", "st2", ben())),
        now + Duration::from_secs(3),
    );
    assert_eq!(out.len(), 1);

    let mut session = session_with_two();
    session.handle(2, lock_request("r1", "S2"), now);
    session.handle(1, edit_msg(assign_edit("S2", "st1", ann())), now);
    let out = session.handle(2, edit_msg(assign_edit("S2", "st2", ben())), now);
    assert!(!out
        .iter()
        .any(|o| matches!(o.message, ServerMessage::ConflictDetected { .. })));

    // 锁持有者的后续编辑同样不产生冲突
    let out = session.handle(2, edit_msg(assign_edit("S2", "st3", ben())), now);
    assert_eq!(out.len(), 1);
}

#[test]
fn test_resolve_conflict_broadcasts_rejected_edit() {
    let mut session = session_with_two();
    let now = Instant::now();
    session.handle(1, edit_msg(assign_edit("S1", "st1", ann())), now);
    let edit2 = assign_edit("S1", "st2", ben());
    session.handle(2, edit_msg(edit2.clone()), now);
    let conflict_id = session.conflicts().next().unwrap().conflict_id.clone();

    let out = session.handle(
        1,
        ClientMessage::ResolveConflict {
            conflict_id: conflict_id.clone(),
            resolution: ConflictResolution::AcceptEdit1,
        },
        now,
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].audience, Audience::All);
    match &out[0].message {
        ServerMessage::ConflictResolved {
            rejected_edit_ids,
            resolved_by,
            ..
        } => {
            assert_eq!(rejected_edit_ids, &vec![edit2.edit_id.clone()]);
            assert_eq!(resolved_by, &ann());
        }
        other => panic!("unexpected {:?}", other),
    }

    // 已裁决的冲突不能再次裁决
    let out = session.handle(
        2,
        ClientMessage::ResolveConflict {
            conflict_id,
            resolution: ConflictResolution::AcceptEdit2,
        },
        now,
    );
    assert_eq!(out[0].audience, Audience::Only(2));
    assert!(matches!(out[0].message, ServerMessage::Error { .. }));
}

#[test]
fn test_messages_before_join_are_rejected() {
    let mut session = CollaborationSession::new("B1", CollaborationConfig::default());
    let out = session.handle(7, lock_request("r1", "S1"), Instant::now());
    assert_eq!(out.len(), 1);
    assert!(matches!(out[0].message, ServerMessage::Error { .. }));
    assert!(session.is_empty());
}

// ==========================================
// 客户端 + 进程内中枢
// ==========================================

async fn connected(hub: &LocalHub, actor: Actor) -> CollaborationClient {
    let client = CollaborationClient::new(actor, hub.connector("B1"), fast_config());
    client.connect().await.unwrap();
    client
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<CollabEvent>) -> Vec<CollabEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_client_lock_contention_resolves_false_with_one_notification() {
    let hub = LocalHub::new(fast_config());
    let a = connected(&hub, ann()).await;
    let b = connected(&hub, ben()).await;
    let mut b_events = b.subscribe();

    assert!(a.acquire_lock(LockResource::shift("S1")).await);
    let started = Instant::now();
    assert!(!b.acquire_lock(LockResource::shift("S1")).await);
    assert!(started.elapsed() < Duration::from_secs(1));
    settle().await;

    let conflicts: Vec<_> = drain(&mut b_events)
        .into_iter()
        .filter(|e| matches!(e, CollabEvent::LockConflict { .. }))
        .collect();
    assert_eq!(
        conflicts,
        vec![CollabEvent::LockConflict {
            resource: LockResource::shift("S1"),
            holder: ann(),
        }]
    );
    assert_eq!(b.lock_holder(&LockResource::shift("S1")), Some(ann()));

    a.release_lock(LockResource::shift("S1")).await.unwrap();
    settle().await;
    assert!(b.acquire_lock(LockResource::shift("S1")).await);
}

#[tokio::test]
async fn test_presence_join_and_leave_events() {
    let hub = LocalHub::new(fast_config());
    let a = connected(&hub, ann()).await;
    let mut a_events = a.subscribe();

    let b = connected(&hub, ben()).await;
    settle().await;
    assert_eq!(a.editors().len(), 1);

    b.disconnect().await;
    settle().await;
    let events: Vec<_> = drain(&mut a_events)
        .into_iter()
        .filter(|e| matches!(e, CollabEvent::EditorJoined(_) | CollabEvent::EditorLeft(_)))
        .collect();
    assert_eq!(
        events,
        vec![CollabEvent::EditorJoined(ben()), CollabEvent::EditorLeft(ben())]
    );
    assert!(a.editors().is_empty());

    a.disconnect().await;
    settle().await;
    assert_eq!(hub.active_sessions(), 0);
}

#[tokio::test]
async fn test_lock_released_when_holder_disconnects() {
    let hub = LocalHub::new(fast_config());
    let a = connected(&hub, ann()).await;
    let b = connected(&hub, ben()).await;

    assert!(a.acquire_lock(LockResource::shift("S1")).await);
    drop(a);
    settle().await;
    assert!(b.acquire_lock(LockResource::shift("S1")).await);
}

/// 只收不回的通道
struct Blackhole;

#[async_trait]
impl RealtimeTransport for Blackhole {
    async fn send(&self, _message: ClientMessage) -> CollabResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct BlackholeConnector {
    keep_open: Mutex<Vec<mpsc::UnboundedSender<ServerMessage>>>,
}

#[async_trait]
impl TransportConnector for BlackholeConnector {
    async fn connect(&self, _editor: &Actor) -> CollabResult<TransportLink> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.keep_open.lock().unwrap().push(tx);
        Ok(TransportLink {
            outbound: Box::new(Blackhole),
            inbound: rx,
        })
    }
}

#[tokio::test]
async fn test_acquire_lock_times_out_to_false() {
    let client = CollaborationClient::new(
        ann(),
        Arc::new(BlackholeConnector::default()),
        fast_config(),
    );
    client.connect().await.unwrap();

    let started = Instant::now();
    assert!(!client.acquire_lock(LockResource::shift("S1")).await);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(80));
    assert!(elapsed < Duration::from_secs(2));
}

#[tokio::test]
async fn test_acquire_lock_without_connection_is_false() {
    let client = CollaborationClient::new(
        ann(),
        Arc::new(BlackholeConnector::default()),
        fast_config(),
    );
    assert!(!client.acquire_lock(LockResource::shift("S1")).await);
    assert_eq!(
        client.send_edit("D1", assign_edit("S1", "st1", ann())).await,
        Err(CollabError::NotConnected)
    );
}

struct RefusingConnector {
    attempts: AtomicU32,
}

#[async_trait]
impl TransportConnector for RefusingConnector {
    async fn connect(&self, _editor: &Actor) -> CollabResult<TransportLink> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CollabError::ConnectFailed("refused".to_string()))
    }
}

#[tokio::test]
async fn test_reconnect_exhaustion_surfaces_connection_error() {
    let connector = Arc::new(RefusingConnector {
        attempts: AtomicU32::new(0),
    });
    let client = CollaborationClient::new(ann(), connector.clone(), fast_config());

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, CollabError::ReconnectExhausted { attempts: 3, .. }));
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
    assert!(matches!(
        client.state(),
        ConnectionState::ConnectionError { .. }
    ));
}

#[tokio::test]
async fn test_client_reconnects_after_link_loss() {
    let hub = LocalHub::new(fast_config());
    let a = connected(&hub, ann()).await;
    let b = connected(&hub, ben()).await;

    hub.sever("B1");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(a.state().is_connected());
    assert!(b.state().is_connected());
    // 会话由在线客户端重建
    assert_eq!(a.editors().len(), 1);
    assert!(a.acquire_lock(LockResource::shift("S1")).await);
    assert!(!b.acquire_lock(LockResource::shift("S1")).await);
}
