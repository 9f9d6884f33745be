mod common;

use std::time::Duration;

use messaging_core::models::presence::PresenceStatus;
use messaging_core::CoreEvent;

use common::{core, core_with_events, drain_events};

// test_defaults: typing TTL 250ms, presence timeout 400ms.

#[tokio::test]
async fn typing_entries_expire_without_a_stop_signal() {
    let core = core();
    let direct = core.conversations.create_direct("alice", "bob").await.unwrap();

    core.typing.set_typing(direct.id, "alice", true);
    assert_eq!(core.typing.current_typers(direct.id), vec!["alice".to_string()]);

    // Still inside the TTL.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(core.typing.current_typers(direct.id).len(), 1);

    // Past the TTL: gone without any explicit stop.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(core.typing.current_typers(direct.id).is_empty());
}

#[tokio::test]
async fn typing_stop_signal_clears_immediately() {
    let core = core();
    let direct = core.conversations.create_direct("alice", "bob").await.unwrap();

    core.typing.set_typing(direct.id, "alice", true);
    core.typing.set_typing(direct.id, "alice", false);
    assert!(core.typing.current_typers(direct.id).is_empty());
}

#[tokio::test]
async fn typing_refresh_extends_the_ttl() {
    let core = core();
    let direct = core.conversations.create_direct("alice", "bob").await.unwrap();

    core.typing.set_typing(direct.id, "alice", true);
    tokio::time::sleep(Duration::from_millis(150)).await;
    core.typing.set_typing(direct.id, "alice", true);
    tokio::time::sleep(Duration::from_millis(150)).await;

    // 300ms after the first signal, but only 150ms after the refresh.
    assert_eq!(core.typing.current_typers(direct.id).len(), 1);
}

#[tokio::test]
async fn typing_changes_emit_events_refreshes_stay_silent() {
    let (core, mut rx) = core_with_events();
    let direct = core.conversations.create_direct("alice", "bob").await.unwrap();
    drain_events(&mut rx);

    core.typing.set_typing(direct.id, "alice", true);
    core.typing.set_typing(direct.id, "alice", true); // refresh
    core.typing.set_typing(direct.id, "alice", false);

    let events = drain_events(&mut rx);
    let typing_sets: Vec<Vec<String>> = events
        .into_iter()
        .filter_map(|e| match e {
            CoreEvent::TypingChanged {
                typing_user_ids, ..
            } => Some(typing_user_ids),
            _ => None,
        })
        .collect();
    assert_eq!(typing_sets, vec![vec!["alice".to_string()], vec![]]);
}

#[tokio::test]
async fn typing_sweep_expires_and_notifies() {
    let (core, mut rx) = core_with_events();
    let direct = core.conversations.create_direct("alice", "bob").await.unwrap();
    core.typing.set_typing(direct.id, "alice", true);
    core.typing.set_typing(direct.id, "bob", true);
    drain_events(&mut rx);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let expired = core.typing.sweep_expired();
    assert_eq!(expired, 2);

    let events = drain_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, CoreEvent::TypingChanged { typing_user_ids, .. } if typing_user_ids.is_empty())));
}

#[tokio::test]
async fn presence_is_unknown_until_first_heartbeat() {
    let core = core();
    assert!(core.presence.get("ghost").is_none());

    core.presence
        .heartbeat("alice", PresenceStatus::Online, Some("sailing".into()), None);
    let record = core.presence.get("alice").unwrap();
    assert_eq!(record.status, PresenceStatus::Online);
    assert_eq!(record.activity.as_deref(), Some("sailing"));
}

#[tokio::test]
async fn stale_presence_flips_offline_lazily() {
    let core = core();
    core.presence.heartbeat("alice", PresenceStatus::Online, None, None);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let record = core.presence.get("alice").unwrap();
    assert_eq!(record.status, PresenceStatus::Offline);
    // The record survives for last-seen history.
    assert!(core.presence.get("alice").is_some());
}

#[tokio::test]
async fn presence_sweep_flips_stale_records() {
    let core = core();
    core.presence.heartbeat("alice", PresenceStatus::Online, None, None);
    core.presence.heartbeat("bob", PresenceStatus::Away, None, None);

    tokio::time::sleep(Duration::from_millis(500)).await;
    core.presence.heartbeat("carol", PresenceStatus::Online, None, None);

    let (_, flipped) = core.sweeper.sweep_ephemeral();
    assert_eq!(flipped, 2);
    assert_eq!(
        core.presence.get("carol").unwrap().status,
        PresenceStatus::Online
    );
}

#[tokio::test]
async fn presence_events_fire_on_status_change_only() {
    let (core, mut rx) = core_with_events();

    core.presence.heartbeat("alice", PresenceStatus::Online, None, None);
    core.presence.heartbeat("alice", PresenceStatus::Online, None, None);
    core.presence.heartbeat("alice", PresenceStatus::Away, None, None);

    let events = drain_events(&mut rx);
    let statuses: Vec<PresenceStatus> = events
        .into_iter()
        .filter_map(|e| match e {
            CoreEvent::PresenceChanged { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![PresenceStatus::Online, PresenceStatus::Away]);
}

#[tokio::test]
async fn heartbeats_overwrite_in_place() {
    let core = core();
    core.presence.heartbeat("alice", PresenceStatus::Busy, Some("call".into()), None);
    core.presence.heartbeat("alice", PresenceStatus::Online, None, None);

    let record = core.presence.get("alice").unwrap();
    assert_eq!(record.status, PresenceStatus::Online);
    assert!(record.activity.is_none(), "latest heartbeat wins wholesale");
}
