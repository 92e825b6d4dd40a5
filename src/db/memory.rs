use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::db::traits::{duplicate, CREATED_AT, UPDATED_AT};
use crate::db::{Collection, Doc, DocumentStore, Filter, StoreResult, Update, ID_FIELD};
use crate::util::timestamp;

/// Keeps every collection in process memory.
///
/// Enforces the same unique fields as [PgStore](crate::db::PgStore) and
/// returns documents in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<&'static str, Vec<Doc>>>,
}

fn unique_fields(collection: Collection) -> impl Iterator<Item = &'static str> {
    std::iter::once(ID_FIELD).chain(collection.unique_fields.iter().copied())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: Collection, mut doc: Doc) -> StoreResult<Doc> {
        let mut collections = self.collections.lock().await;
        let docs = collections.entry(collection.name).or_default();

        for field in unique_fields(collection) {
            if let Some(value) = doc.get(field).filter(|value| !value.is_null()) {
                if docs.iter().any(|existing| existing.get(field) == Some(value)) {
                    return Err(duplicate(collection, field, value));
                }
            }
        }

        let now = timestamp();
        doc.insert(CREATED_AT.to_owned(), now.clone());
        doc.insert(UPDATED_AT.to_owned(), now);
        docs.push(doc.clone());

        Ok(doc)
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Doc>> {
        let collections = self.collections.lock().await;

        Ok(collections
            .get(collection.name)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        let collections = self.collections.lock().await;

        Ok(collections.get(collection.name).map_or(0, |docs| {
            docs.iter().filter(|doc| filter.matches(doc)).count() as u64
        }))
    }

    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<u64> {
        let mut collections = self.collections.lock().await;
        let docs = match collections.get_mut(collection.name) {
            Some(docs) => docs,
            None => return Ok(0),
        };

        let targets: Vec<usize> = docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(index, _)| index)
            .collect();

        if let Update::Set(fields) = update {
            for field in unique_fields(collection) {
                let value = match fields.get(field).filter(|value| !value.is_null()) {
                    Some(value) => value,
                    None => continue,
                };
                let taken_elsewhere = docs.iter().enumerate().any(|(index, doc)| {
                    !targets.contains(&index) && doc.get(field) == Some(value)
                });
                if taken_elsewhere || targets.len() > 1 {
                    return Err(duplicate(collection, field, value));
                }
            }
        }

        let now = timestamp();
        for &index in &targets {
            let doc = &mut docs[index];
            update.apply(doc);
            doc.insert(UPDATED_AT.to_owned(), now.clone());
        }

        Ok(targets.len() as u64)
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        let mut collections = self.collections.lock().await;
        let docs = match collections.get_mut(collection.name) {
            Some(docs) => docs,
            None => return Ok(0),
        };

        let before = docs.len();
        docs.retain(|doc| !filter.matches(doc));

        Ok((before - docs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::db::StoreError;

    const TAGS: Collection = Collection {
        name: "Tag",
        unique_fields: &["tagName"],
    };

    fn doc(value: Value) -> Doc {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn rejects_a_second_document_with_the_same_unique_value() {
        let store = MemoryStore::default();
        store
            .insert(TAGS, doc(json!({ "_id": "1", "tagName": "adult" })))
            .await
            .unwrap();

        let result = store
            .insert(TAGS, doc(json!({ "_id": "2", "tagName": "adult" })))
            .await;

        assert!(matches!(result, Err(StoreError::Duplicate { ref field, .. }) if field == "tagName"));
        assert_eq!(store.count(TAGS, &Filter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stamps_timestamps() {
        let store = MemoryStore::default();
        let stored = store
            .insert(TAGS, doc(json!({ "_id": "1", "tagName": "adult" })))
            .await
            .unwrap();

        assert!(stored[CREATED_AT].is_string());
        assert_eq!(stored[CREATED_AT], stored[UPDATED_AT]);
    }

    #[tokio::test]
    async fn update_reports_matches_even_without_changes() {
        let store = MemoryStore::default();
        store
            .insert(TAGS, doc(json!({ "_id": "1", "tagName": "adult" })))
            .await
            .unwrap();

        let matched = store
            .update(TAGS, &Filter::eq("_id", "1"), &Update::Set(Doc::new()))
            .await
            .unwrap();
        let missing = store
            .update(TAGS, &Filter::eq("_id", "2"), &Update::Set(Doc::new()))
            .await
            .unwrap();

        assert_eq!((matched, missing), (1, 0));
    }

    #[tokio::test]
    async fn update_cannot_steal_a_unique_value() {
        let store = MemoryStore::default();
        for (id, name) in [("1", "adult"), ("2", "child")] {
            store
                .insert(TAGS, doc(json!({ "_id": id, "tagName": name })))
                .await
                .unwrap();
        }

        let result = store
            .update(
                TAGS,
                &Filter::eq("_id", "2"),
                &Update::set("tagName", "adult"),
            )
            .await;

        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn delete_only_removes_matches() {
        let store = MemoryStore::default();
        for (id, name) in [("1", "adult"), ("2", "child")] {
            store
                .insert(TAGS, doc(json!({ "_id": id, "tagName": name })))
                .await
                .unwrap();
        }

        let deleted = store.delete(TAGS, &Filter::eq("_id", "1")).await.unwrap();
        let left = store.find(TAGS, &Filter::All).await.unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0]["tagName"], "child");
    }
}
