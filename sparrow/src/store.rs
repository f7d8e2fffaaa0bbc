//! The result store (§4.B): a concurrent `check name -> StoredResult` map
//! shared between the reconciler (writer) and the HTTP API (reader).
//! Writers never block readers and `list` always returns an isolated copy.

use std::collections::HashMap;
use std::sync::Arc;

use common::StoredResult;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct ResultStore {
    inner: RwLock<HashMap<String, StoredResult>>,
}

impl ResultStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn save(&self, check_name: impl Into<String>, result: StoredResult) {
        self.inner.write().await.insert(check_name.into(), result);
    }

    pub async fn remove(&self, check_name: &str) {
        self.inner.write().await.remove(check_name);
    }

    pub async fn get(&self, check_name: &str) -> Option<StoredResult> {
        self.inner.read().await.get(check_name).cloned()
    }

    /// Snapshot copy: mutating the store afterwards never affects what the
    /// caller already holds (§8 "mutation isolation").
    pub async fn list(&self) -> HashMap<String, StoredResult> {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn sample(v: &str) -> StoredResult {
        StoredResult::new(json!({ "v": v }), Utc::now())
    }

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let store = ResultStore::new();
        store.save("health", sample("a")).await;
        let got = store.get("health").await.unwrap();
        assert_eq!(got.data, json!({ "v": "a" }));
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let store = ResultStore::new();
        assert!(store.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn list_is_isolated_from_later_writes() {
        let store = ResultStore::new();
        store.save("health", sample("a")).await;
        let snapshot = store.list().await;
        store.save("health", sample("b")).await;
        assert_eq!(snapshot.get("health").unwrap().data, json!({ "v": "a" }));
        let latest = store.list().await;
        assert_eq!(latest.get("health").unwrap().data, json!({ "v": "b" }));
    }

    #[tokio::test]
    async fn remove_drops_entry() {
        let store = ResultStore::new();
        store.save("dns", sample("a")).await;
        store.remove("dns").await;
        assert!(store.get("dns").await.is_none());
    }
}
