use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use tokio::sync::RwLock;

use super::{Document, StoreError, StoreResult, Transaction, WriteKind};

type Table = HashMap<String, Value>;

/// In-process store used for local runs and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<&'static str, Table>>>,
}

fn stored_version(doc: &Value) -> u64 {
    doc.get("version").and_then(Value::as_u64).unwrap_or(0)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get<T: Document>(&self, id: &str) -> StoreResult<Option<T>> {
        let tables = self.tables.read().await;
        let doc = tables.get(T::TABLE).and_then(|t| t.get(id)).cloned();
        Ok(doc.map(serde_json::from_value).transpose()?)
    }

    pub async fn list<T: Document>(&self) -> StoreResult<Vec<T>> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(T::TABLE) else {
            return Ok(Vec::new());
        };
        table
            .values()
            .cloned()
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .collect()
    }

    /// Checks every condition first, then applies all writes under one lock.
    pub async fn commit(&self, tx: Transaction) -> StoreResult<()> {
        let writes = tx.into_writes();
        let mut tables = self.tables.write().await;

        for w in &writes {
            let current = tables.get(w.table).and_then(|t| t.get(&w.id));
            let ok = match (&w.kind, current) {
                (WriteKind::Insert(_), existing) => existing.is_none(),
                (WriteKind::Update { expected, .. }, Some(doc))
                | (WriteKind::Delete { expected }, Some(doc)) => stored_version(doc) == *expected,
                (_, None) => false,
            };
            if !ok {
                return Err(StoreError::Conflict(format!("{}/{}", w.table, w.id)));
            }
        }

        for w in writes {
            let table = tables.entry(w.table).or_default();
            match w.kind {
                WriteKind::Insert(doc) | WriteKind::Update { doc, .. } => {
                    table.insert(w.id, doc);
                }
                WriteKind::Delete { .. } => {
                    table.remove(&w.id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Counter {
        id: String,
        version: u64,
        hits: u32,
    }

    impl Document for Counter {
        const TABLE: &'static str = "counters";

        fn id(&self) -> &str {
            &self.id
        }

        fn version(&self) -> u64 {
            self.version
        }

        fn version_mut(&mut self) -> &mut u64 {
            &mut self.version
        }
    }

    fn counter(id: &str) -> Counter {
        Counter {
            id: id.to_string(),
            version: 0,
            hits: 0,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let store = MemoryStore::new();
        store
            .commit(Transaction::new().insert(&counter("a")).unwrap())
            .await
            .unwrap();
        let err = store
            .commit(Transaction::new().insert(&counter("a")).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let store = MemoryStore::new();
        store
            .commit(Transaction::new().insert(&counter("a")).unwrap())
            .await
            .unwrap();

        let mut first: Counter = store.get("a").await.unwrap().unwrap();
        let mut second = first.clone();

        first.hits += 1;
        store
            .commit(Transaction::new().update(&mut first).unwrap())
            .await
            .unwrap();

        second.hits += 1;
        let err = store
            .commit(Transaction::new().update(&mut second).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let stored: Counter = store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.hits, 1);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn failed_condition_applies_nothing() {
        let store = MemoryStore::new();
        store
            .commit(Transaction::new().insert(&counter("a")).unwrap())
            .await
            .unwrap();

        let mut a: Counter = store.get("a").await.unwrap().unwrap();
        a.hits = 5;
        let missing = counter("missing");
        let tx = Transaction::new()
            .update(&mut a)
            .unwrap()
            .delete(&missing)
            .unwrap();
        assert!(store.commit(tx).await.is_err());

        let stored: Counter = store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.hits, 0);
        assert_eq!(store.list::<Counter>().await.unwrap().len(), 1);
    }
}
