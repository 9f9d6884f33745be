use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Keyed mutual-exclusion registry.
///
/// One lock per conversation id so concurrent mutations of the same
/// conversation serialize while different conversations proceed in parallel.
/// Direct-conversation creation locks the normalized user pair instead, which
/// makes idempotent creation race-free.
#[derive(Default, Clone)]
pub struct KeyedLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .inner
            .entry(key.to_string())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    pub fn conversation_key(id: Uuid) -> String {
        format!("conv:{id}")
    }

    pub fn direct_pair_key(a: &str, b: &str) -> String {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        format!("direct:{lo}:{hi}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_pair_key_is_order_independent() {
        assert_eq!(
            KeyedLocks::direct_pair_key("alice", "bob"),
            KeyedLocks::direct_pair_key("bob", "alice"),
        );
    }

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = KeyedLocks::new();
        let guard = locks.acquire("conv:x").await;
        let pending = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("conv:x").await;
            })
        };
        // The second acquire cannot complete while the guard is held.
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());
        drop(guard);
        pending.await.unwrap();
    }
}
