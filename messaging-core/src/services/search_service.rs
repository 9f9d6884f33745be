use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metrics;
use crate::models::message::{Message, MessageType};
use crate::models::UserId;

/// Filters applied before ranking. `include_deleted` admits suppressed
/// (soft-deleted) entries; whether the caller is allowed to ask for that is
/// the transport boundary's concern, like every other actor claim.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub conversation_id: Option<Uuid>,
    pub sender_id: Option<UserId>,
    pub message_type: Option<MessageType>,
    pub sent_after: Option<DateTime<Utc>>,
    pub sent_before: Option<DateTime<Utc>>,
    pub has_media: Option<bool>,
    pub include_deleted: bool,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

struct DocEntry {
    message_id: Uuid,
    conversation_id: Uuid,
    sender_id: UserId,
    message_type: MessageType,
    has_media: bool,
    created_at: DateTime<Utc>,
    /// Lowercased searchable text.
    body: String,
    /// Plain word tokens plus sigiled `#hashtag` / `@mention` tokens.
    tokens: HashSet<String>,
    suppressed: bool,
}

#[derive(Default)]
struct IndexInner {
    docs: HashMap<Uuid, DocEntry>,
    /// token -> message ids; only consulted for sigiled single-token queries,
    /// but maintained for all tokens so a backend swap can lean on it.
    postings: HashMap<String, HashSet<Uuid>>,
}

/// Full-text lookup over non-deleted message bodies.
///
/// The message store feeds the index at write time; soft deletes suppress an
/// entry (admin-scoped searches still see it), retention hard-deletes purge
/// it.
#[derive(Default)]
pub struct SearchIndex {
    inner: RwLock<IndexInner>,
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn extract_sigiled(text: &str, sigil: char) -> Vec<String> {
    let mut out = Vec::new();
    for (i, c) in text.char_indices() {
        if c != sigil {
            continue;
        }
        let rest = &text[i + c.len_utf8()..];
        let token: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if !token.is_empty() {
            out.push(token.to_lowercase());
        }
    }
    out
}

pub fn extract_hashtags(text: &str) -> Vec<String> {
    extract_sigiled(text, '#')
}

pub fn extract_mentions(text: &str) -> Vec<String> {
    extract_sigiled(text, '@')
}

fn doc_tokens(text: &str) -> HashSet<String> {
    let mut tokens: HashSet<String> = tokenize(text).into_iter().collect();
    for tag in extract_hashtags(text) {
        tokens.insert(format!("#{tag}"));
    }
    for mention in extract_mentions(text) {
        tokens.insert(format!("@{mention}"));
    }
    tokens
}

fn query_tokens(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .filter_map(|raw| {
            let raw = raw.to_lowercase();
            if let Some(rest) = raw.strip_prefix('#') {
                let tag: String = rest.chars().take_while(|c| c.is_alphanumeric()).collect();
                (!tag.is_empty()).then(|| format!("#{tag}"))
            } else if let Some(rest) = raw.strip_prefix('@') {
                let handle: String = rest
                    .chars()
                    .take_while(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                (!handle.is_empty()).then(|| format!("@{handle}"))
            } else {
                let word: String = raw.chars().filter(|c| c.is_alphanumeric()).collect();
                (!word.is_empty()).then_some(word)
            }
        })
        .collect()
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a freshly written message. No-op for deleted or text-free
    /// messages.
    pub async fn index(&self, message: &Message) {
        if message.is_deleted {
            return;
        }
        let Some(text) = message.body.text() else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }

        let entry = DocEntry {
            message_id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id.clone(),
            message_type: message.message_type,
            has_media: message.has_media(),
            created_at: message.created_at,
            body: text.to_lowercase(),
            tokens: doc_tokens(text),
            suppressed: false,
        };

        let mut inner = self.inner.write().await;
        for token in &entry.tokens {
            inner
                .postings
                .entry(token.clone())
                .or_default()
                .insert(message.id);
        }
        inner.docs.insert(message.id, entry);
    }

    /// Replace the entry after an edit.
    pub async fn reindex(&self, message: &Message) {
        self.purge(message.id).await;
        self.index(message).await;
    }

    /// Suppress the entry for a soft-deleted message. The document stays so
    /// `include_deleted` searches keep working.
    pub async fn remove(&self, message_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(doc) = inner.docs.get_mut(&message_id) {
            doc.suppressed = true;
        }
    }

    /// Drop the entry entirely (retention hard delete).
    pub async fn purge(&self, message_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(doc) = inner.docs.remove(&message_id) {
            for token in &doc.tokens {
                if let Some(ids) = inner.postings.get_mut(token) {
                    ids.remove(&message_id);
                    if ids.is_empty() {
                        inner.postings.remove(token);
                    }
                }
            }
        }
    }

    /// Ranked search. Exact full-body match beats substring match beats
    /// token overlap, with a small recency bonus on top; ties break
    /// newest-first. Cursor is the id of the last hit of the previous page.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
        cursor: Option<&str>,
    ) -> SearchPage {
        metrics::record_search_query();

        let q = query.trim().to_lowercase();
        if q.is_empty() || limit == 0 {
            return SearchPage::default();
        }
        let q_tokens = query_tokens(&q);
        let now = Utc::now();

        let inner = self.inner.read().await;

        // A single #hashtag or @mention query resolves through the posting
        // list; everything else scans the document store.
        let mut ranked: Vec<(&DocEntry, f64)> =
            if q_tokens.len() == 1 && (q.starts_with('#') || q.starts_with('@')) {
                match inner.postings.get(&q_tokens[0]) {
                    Some(ids) => ids
                        .iter()
                        .filter_map(|id| inner.docs.get(id))
                        .filter(|doc| doc_passes(doc, filters))
                        .filter_map(|doc| score(doc, &q, &q_tokens, now).map(|s| (doc, s)))
                        .collect(),
                    None => Vec::new(),
                }
            } else {
                inner
                    .docs
                    .values()
                    .filter(|doc| doc_passes(doc, filters))
                    .filter_map(|doc| score(doc, &q, &q_tokens, now).map(|s| (doc, s)))
                    .collect()
            };

        ranked.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.message_id.cmp(&b.message_id))
        });

        let start = match cursor {
            Some(cursor) => match Uuid::parse_str(cursor) {
                Ok(id) => ranked
                    .iter()
                    .position(|(doc, _)| doc.message_id == id)
                    .map(|pos| pos + 1)
                    .unwrap_or(0),
                Err(_) => 0,
            },
            None => 0,
        };

        let page: Vec<SearchHit> = ranked
            .iter()
            .skip(start)
            .take(limit)
            .map(|(doc, score)| SearchHit {
                message_id: doc.message_id,
                conversation_id: doc.conversation_id,
                score: *score,
                created_at: doc.created_at,
            })
            .collect();

        let has_more = start + page.len() < ranked.len();
        let next_cursor = if has_more {
            page.last().map(|hit| hit.message_id.to_string())
        } else {
            None
        };

        SearchPage {
            hits: page,
            next_cursor,
            has_more,
        }
    }
}

fn doc_passes(doc: &DocEntry, filters: &SearchFilters) -> bool {
    if doc.suppressed && !filters.include_deleted {
        return false;
    }
    if let Some(conversation_id) = filters.conversation_id {
        if doc.conversation_id != conversation_id {
            return false;
        }
    }
    if let Some(sender_id) = &filters.sender_id {
        if &doc.sender_id != sender_id {
            return false;
        }
    }
    if let Some(message_type) = filters.message_type {
        if doc.message_type != message_type {
            return false;
        }
    }
    if let Some(after) = filters.sent_after {
        if doc.created_at < after {
            return false;
        }
    }
    if let Some(before) = filters.sent_before {
        if doc.created_at > before {
            return false;
        }
    }
    if let Some(has_media) = filters.has_media {
        if doc.has_media != has_media {
            return false;
        }
    }
    true
}

/// Relevance tiers: exact full-body match (100) > substring match (50) >
/// 10 per overlapping token, plus up to 10 points of recency bonus decaying
/// over the first ten hours. `None` means no match at all.
fn score(doc: &DocEntry, q: &str, q_tokens: &[String], now: DateTime<Utc>) -> Option<f64> {
    let base = if doc.body == q {
        100
    } else if doc.body.contains(q) {
        50
    } else {
        let overlap = q_tokens
            .iter()
            .filter(|qt| doc.tokens.iter().any(|t| t.contains(qt.as_str())))
            .count();
        overlap * 10
    };
    if base == 0 {
        return None;
    }

    let age_hours = (now - doc.created_at).num_minutes() as f64 / 60.0;
    let recency_bonus = (10.0 - age_hours).max(0.0);
    Some(base as f64 + recency_bonus)
}
