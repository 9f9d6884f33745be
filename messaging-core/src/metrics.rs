use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, TextEncoder};

static MESSAGES_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "messaging_core_messages_sent_total",
            "Total messages accepted by the message store",
        ),
        &["type"],
    )
    .expect("failed to create messaging_core_messages_sent_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messaging_core_messages_sent_total");
    counter
});

static CONVERSATIONS_CREATED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "messaging_core_conversations_created_total",
            "Total conversations created",
        ),
        &["kind"],
    )
    .expect("failed to create messaging_core_conversations_created_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messaging_core_conversations_created_total");
    counter
});

static SEARCH_QUERIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "messaging_core_search_queries_total",
        "Total search queries served",
    )
    .expect("failed to create messaging_core_search_queries_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messaging_core_search_queries_total");
    counter
});

static RETENTION_DELETED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "messaging_core_retention_deleted_total",
        "Messages hard-deleted by the retention sweeper",
    )
    .expect("failed to create messaging_core_retention_deleted_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messaging_core_retention_deleted_total");
    counter
});

static NOTIFICATION_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "messaging_core_notification_failures_total",
            "Outbound notifications rejected by the event sink",
        ),
        &["event"],
    )
    .expect("failed to create messaging_core_notification_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messaging_core_notification_failures_total");
    counter
});

pub fn record_message_sent(message_type: &str) {
    MESSAGES_SENT_TOTAL.with_label_values(&[message_type]).inc();
}

pub fn record_conversation_created(kind: &str) {
    CONVERSATIONS_CREATED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_search_query() {
    SEARCH_QUERIES_TOTAL.inc();
}

pub fn record_retention_deleted(count: u64) {
    RETENTION_DELETED_TOTAL.inc_by(count);
}

pub fn record_notification_failure(event: &str) {
    NOTIFICATION_FAILURES_TOTAL.with_label_values(&[event]).inc();
}

/// Text exposition of the default registry, for whatever scrape endpoint the
/// host process exposes.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %err, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
