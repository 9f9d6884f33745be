mod common;

use messaging_core::error::AppError;
use messaging_core::models::conversation::{ConversationKind, ParticipantRole};
use messaging_core::models::message::MessageType;
use messaging_core::services::conversation_service::GroupOptions;

use common::{core, core_with_events, drain_events, send_text};

#[tokio::test]
async fn direct_creation_is_idempotent() {
    let core = core();

    let first = core.conversations.create_direct("alice", "bob").await.unwrap();
    let second = core.conversations.create_direct("bob", "alice").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.kind, ConversationKind::Direct);
    assert_eq!(first.participants.len(), 2);
    assert!(first
        .participants
        .iter()
        .all(|p| p.role == ParticipantRole::Member));
    assert_eq!(first.unread_counts["alice"], 0);
    assert_eq!(first.unread_counts["bob"], 0);
}

#[tokio::test]
async fn direct_conversation_with_self_is_rejected() {
    let core = core();
    let err = core
        .conversations
        .create_direct("alice", "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidParticipants(_)));
}

#[tokio::test]
async fn group_exceeding_max_members_is_rejected() {
    let core = core();
    let err = core
        .conversations
        .create_group(
            "cap",
            "crew",
            &["a".to_string(), "b".to_string()],
            GroupOptions {
                max_members: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::GroupTooLarge {
            requested: 3,
            max: 2
        }
    ));
}

#[tokio::test]
async fn group_creation_seeds_admin_and_announcement() {
    let core = core();
    let group = core
        .conversations
        .create_group(
            "cap",
            "crew",
            &["a".to_string(), "b".to_string()],
            GroupOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(group.kind, ConversationKind::Group);
    assert_eq!(group.role_of("cap"), Some(ParticipantRole::Admin));
    assert_eq!(group.role_of("a"), Some(ParticipantRole::Member));

    let page = core.messages.list(group.id, "cap", 10, None).await.unwrap();
    assert_eq!(page.messages.len(), 1);
    let announcement = &page.messages[0];
    assert_eq!(announcement.message_type, MessageType::System);
    assert_eq!(
        announcement.body.text(),
        Some("Group \"crew\" created by cap")
    );
    // Announcements do not count as unread.
    assert!(group.unread_counts.values().all(|&count| count == 0));
}

#[tokio::test]
async fn duplicate_member_ids_are_deduplicated() {
    let core = core();
    let group = core
        .conversations
        .create_group(
            "cap",
            "crew",
            &["a".to_string(), "a".to_string(), "cap".to_string()],
            GroupOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(group.participants.len(), 2);
}

#[tokio::test]
async fn participant_management_is_role_gated() {
    let core = core();
    let group = core
        .conversations
        .create_group("cap", "crew", &["a".to_string(), "b".to_string()], GroupOptions::default())
        .await
        .unwrap();

    // A plain member may not add.
    let err = core
        .conversations
        .add_participant(group.id, "a", "zed")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotAuthorized(_)));

    // The admin may.
    let updated = core
        .conversations
        .add_participant(group.id, "cap", "zed")
        .await
        .unwrap();
    assert!(updated.is_participant("zed"));
    assert_eq!(updated.unread_counts["zed"], 0);

    // Adding again is idempotent.
    let again = core
        .conversations
        .add_participant(group.id, "cap", "zed")
        .await
        .unwrap();
    assert_eq!(again.participants.len(), updated.participants.len());

    // A member may not remove someone else...
    let err = core
        .conversations
        .remove_participant(group.id, "a", "b")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotAuthorized(_)));

    // ...but may leave.
    let left = core
        .conversations
        .remove_participant(group.id, "b", "b")
        .await
        .unwrap();
    assert!(!left.is_participant("b"));

    // A moderator may remove a member but not the admin.
    core.conversations
        .set_role(group.id, "cap", "a", ParticipantRole::Moderator)
        .await
        .unwrap();
    let err = core
        .conversations
        .remove_participant(group.id, "a", "cap")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotAuthorized(_)));
    let removed = core
        .conversations
        .remove_participant(group.id, "a", "zed")
        .await
        .unwrap();
    assert!(!removed.is_participant("zed"));
}

#[tokio::test]
async fn direct_membership_is_fixed() {
    let core = core();
    let direct = core.conversations.create_direct("alice", "bob").await.unwrap();

    let err = core
        .conversations
        .add_participant(direct.id, "alice", "carol")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotAuthorized(_)));

    let err = core
        .conversations
        .remove_participant(direct.id, "alice", "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotAuthorized(_)));
}

#[tokio::test]
async fn unread_accounting_per_participant() {
    let core = core();
    let group = core
        .conversations
        .create_group("s", "crew", &["x".to_string(), "y".to_string()], GroupOptions::default())
        .await
        .unwrap();

    send_text(&core, group.id, "s", "hello crew").await;

    let after_send = core.conversations.get(group.id, "s").await.unwrap();
    assert_eq!(after_send.unread_counts["x"], 1);
    assert_eq!(after_send.unread_counts["y"], 1);
    assert_eq!(after_send.unread_counts["s"], 0);

    core.conversations.mark_read(group.id, "x", None).await.unwrap();

    let after_read = core.conversations.get(group.id, "x").await.unwrap();
    assert_eq!(after_read.unread_counts["x"], 0);
    assert_eq!(after_read.unread_counts["y"], 1);
    assert!(after_read.participant("x").unwrap().last_read_at.is_some());
}

#[tokio::test]
async fn read_is_conversation_wide_consensus() {
    let core = core();
    let group = core
        .conversations
        .create_group("cap", "crew", &["a".to_string(), "b".to_string()], GroupOptions::default())
        .await
        .unwrap();

    let message = send_text(&core, group.id, "cap", "all hands").await;

    core.conversations.mark_read(group.id, "a", None).await.unwrap();
    let page = core.messages.list(group.id, "cap", 10, None).await.unwrap();
    let partial = page.messages.iter().find(|m| m.id == message.id).unwrap();
    assert!(partial.delivery.read_by.contains("a"));
    assert!(!partial.delivery.read, "one of two recipients is not consensus");

    core.conversations.mark_read(group.id, "b", None).await.unwrap();
    let page = core.messages.list(group.id, "cap", 10, None).await.unwrap();
    let full = page.messages.iter().find(|m| m.id == message.id).unwrap();
    assert_eq!(full.delivery.read_by.len(), 2);
    assert!(full.delivery.read);
}

#[tokio::test]
async fn mark_read_honors_upper_bound() {
    let core = core();
    let direct = core.conversations.create_direct("alice", "bob").await.unwrap();

    let first = send_text(&core, direct.id, "alice", "one").await;
    let second = send_text(&core, direct.id, "alice", "two").await;
    let third = send_text(&core, direct.id, "alice", "three").await;

    core.conversations
        .mark_read(direct.id, "bob", Some(second.id))
        .await
        .unwrap();

    let page = core.messages.list(direct.id, "alice", 10, None).await.unwrap();
    let read_state = |id| {
        page.messages
            .iter()
            .find(|m| m.id == id)
            .unwrap()
            .delivery
            .read_by
            .contains("bob")
    };
    assert!(read_state(first.id));
    assert!(read_state(second.id));
    assert!(!read_state(third.id));

    // The unread counter still resets in full.
    let conversation = core.conversations.get(direct.id, "bob").await.unwrap();
    assert_eq!(conversation.unread_counts["bob"], 0);
}

#[tokio::test]
async fn mark_read_emits_single_event() {
    let (core, mut rx) = core_with_events();
    let direct = core.conversations.create_direct("alice", "bob").await.unwrap();
    send_text(&core, direct.id, "alice", "one").await;
    let last = send_text(&core, direct.id, "alice", "two").await;
    drain_events(&mut rx);

    core.conversations.mark_read(direct.id, "bob", None).await.unwrap();

    let events = drain_events(&mut rx);
    let reads: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            messaging_core::CoreEvent::MessageRead {
                user_id,
                message_id,
                ..
            } => Some((user_id.clone(), *message_id)),
            _ => None,
        })
        .collect();
    assert_eq!(reads, vec![("bob".to_string(), last.id)]);

    // Nothing new to mark: no further event.
    core.conversations.mark_read(direct.id, "bob", None).await.unwrap();
    assert!(drain_events(&mut rx)
        .iter()
        .all(|e| e.event_type() != "message.read"));
}

#[tokio::test]
async fn mute_toggle_round_trips() {
    let core = core();
    let direct = core.conversations.create_direct("alice", "bob").await.unwrap();

    let muted = core
        .conversations
        .set_muted(direct.id, "bob", true, None)
        .await
        .unwrap();
    assert!(muted.participant("bob").unwrap().muted);

    let unmuted = core
        .conversations
        .set_muted(direct.id, "bob", false, None)
        .await
        .unwrap();
    assert!(!unmuted.participant("bob").unwrap().muted);
    assert!(unmuted.participant("bob").unwrap().muted_until.is_none());
}

#[tokio::test]
async fn conversations_list_newest_activity_first() {
    let core = core();
    let with_bob = core.conversations.create_direct("alice", "bob").await.unwrap();
    let with_carol = core.conversations.create_direct("alice", "carol").await.unwrap();

    send_text(&core, with_bob.id, "bob", "newest").await;

    let listed = core.conversations.list_for_user("alice", 0).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, with_bob.id);
    assert_eq!(listed[1].id, with_carol.id);

    let only_bob = core.conversations.list_for_user("bob", 0).await.unwrap();
    assert_eq!(only_bob.len(), 1);
}

#[tokio::test]
async fn get_is_participant_gated() {
    let core = core();
    let direct = core.conversations.create_direct("alice", "bob").await.unwrap();

    assert!(core.conversations.get(direct.id, "alice").await.is_ok());
    let err = core.conversations.get(direct.id, "mallory").await.unwrap_err();
    assert!(matches!(err, AppError::NotParticipant));
}
