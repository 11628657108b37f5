//! Persistence seam for finished analyses.
//!
//! The core only needs "save a JSON document, fetch it back by id"; a
//! relational store implements the same trait.

use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn save(&self, id: Uuid, document: Value) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Value>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryAnalysisStore {
    documents: DashMap<Uuid, Value>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn save(&self, id: Uuid, document: Value) -> Result<(), StoreError> {
        self.documents.insert(id, document);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Value>, StoreError> {
        Ok(self.documents.get(&id).map(|doc| doc.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn saves_and_fetches_by_id() {
        let store = InMemoryAnalysisStore::new();
        let id = Uuid::new_v4();
        store.save(id, json!({"summary": {"totalCitations": 3}})).await.unwrap();

        let doc = store.get(id).await.unwrap().unwrap();
        assert_eq!(doc["summary"]["totalCitations"], 3);
        assert_eq!(store.len(), 1);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
