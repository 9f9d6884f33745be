#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use messaging_core::models::message::{Message, MessageBody, MessageType};
use messaging_core::services::message_service::SendOptions;
use messaging_core::{ChannelEventSink, CoreConfig, CoreEvent, MessagingCore, NullEventSink};

pub fn core() -> MessagingCore {
    MessagingCore::new_in_memory(CoreConfig::test_defaults(), Arc::new(NullEventSink))
}

pub fn core_with_events() -> (MessagingCore, UnboundedReceiver<CoreEvent>) {
    let (sink, rx) = ChannelEventSink::new();
    (
        MessagingCore::new_in_memory(CoreConfig::test_defaults(), Arc::new(sink)),
        rx,
    )
}

pub fn text(body: &str) -> MessageBody {
    MessageBody::Text { text: body.into() }
}

pub async fn send_text(
    core: &MessagingCore,
    conversation_id: Uuid,
    sender: &str,
    body: &str,
) -> Message {
    core.messages
        .send(
            conversation_id,
            sender,
            MessageType::Text,
            text(body),
            SendOptions::default(),
        )
        .await
        .expect("send should succeed")
}

/// Drain everything currently in the event channel.
pub fn drain_events(rx: &mut UnboundedReceiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn event_types(events: &[CoreEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.event_type()).collect()
}
