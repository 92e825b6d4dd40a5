use std::marker::PhantomData;

use serde::Serialize;
use serde_json::Value;

use crate::db::traits::{is_filled, CREATED_AT, UPDATED_AT};
use crate::db::{
    Collection, Doc, Document, DocumentStore, Filter, StoreError, StoreResult, Update, ID_FIELD,
};
use crate::models::RecordId;

/// One record of a bulk insert that was not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertFailure {
    /// Position of the record in the submitted batch
    pub index: usize,
    /// The unique field that collided, if the failure was a collision
    pub field: Option<String>,
    pub value: Option<String>,
    pub message: String,
}

/// The outcome of [Repository::create_many].
#[derive(Debug)]
pub struct BulkInsert<T> {
    pub inserted: Vec<T>,
    pub failed: Vec<InsertFailure>,
}

/// Typed access to the collection holding `T`.
pub struct Repository<'s, T> {
    store: &'s dyn DocumentStore,
    marker: PhantomData<fn() -> T>,
}

impl<'s, T: Document> Repository<'s, T> {
    pub fn new(store: &'s dyn DocumentStore) -> Self {
        Self {
            store,
            marker: PhantomData,
        }
    }

    fn collection() -> Collection {
        Collection::of::<T>()
    }

    fn malformed(source: serde_json::Error) -> StoreError {
        StoreError::Malformed {
            collection: T::collection_name(),
            source,
        }
    }

    fn to_doc(value: &impl Serialize) -> StoreResult<Doc> {
        match serde_json::to_value(value).map_err(Self::malformed)? {
            Value::Object(doc) => Ok(doc),
            _ => Err(StoreError::MissingId(T::collection_name())),
        }
    }

    fn from_doc(doc: Doc) -> StoreResult<T> {
        serde_json::from_value(Value::Object(doc)).map_err(Self::malformed)
    }

    fn from_docs(docs: Vec<Doc>) -> StoreResult<Vec<T>> {
        docs.into_iter().map(Self::from_doc).collect()
    }

    /// Rejects a required field that `doc` holds blank, or lacks when
    /// `whole` says it is a complete record.
    fn check_required(doc: &Doc, whole: bool) -> StoreResult<()> {
        let blank = T::required_fields()
            .iter()
            .copied()
            .find(|field| (whole || doc.contains_key(*field)) && !is_filled(doc.get(*field)));

        match blank {
            Some(field) => Err(StoreError::MissingField {
                collection: T::collection_name(),
                field,
            }),
            None => Ok(()),
        }
    }

    pub async fn create(&self, record: &T) -> StoreResult<T> {
        let doc = Self::to_doc(record)?;
        Self::check_required(&doc, true)?;
        let stored = self.store.insert(Self::collection(), doc).await?;

        Self::from_doc(stored)
    }

    /// Inserts each record independently.
    ///
    /// A record that collides with a unique field, leaves a required one
    /// blank, or cannot be stored as a document, is reported in `failed` without stopping the rest of the
    /// batch. Only a failure of the store itself aborts the call.
    pub async fn create_many(&self, records: Vec<T>) -> StoreResult<BulkInsert<T>> {
        let mut inserted = Vec::with_capacity(records.len());
        let mut failed = Vec::new();

        for (index, record) in records.into_iter().enumerate() {
            match self.create(&record).await {
                Ok(stored) => inserted.push(stored),
                Err(StoreError::Duplicate { field, value, .. }) => failed.push(InsertFailure {
                    index,
                    message: format!("duplicate value `{}` for {}", value, field),
                    field: Some(field),
                    value: Some(value),
                }),
                Err(error @ StoreError::MissingField { field, .. }) => failed.push(InsertFailure {
                    index,
                    field: Some(field.to_owned()),
                    value: None,
                    message: error.to_string(),
                }),
                Err(error @ (StoreError::Malformed { .. } | StoreError::MissingId(_))) => {
                    failed.push(InsertFailure {
                        index,
                        field: None,
                        value: None,
                        message: error.to_string(),
                    })
                }
                Err(other) => return Err(other),
            }
        }

        Ok(BulkInsert { inserted, failed })
    }

    pub async fn get_by_id(&self, id: RecordId) -> StoreResult<Option<T>> {
        self.find_one(&Filter::id(id)).await
    }

    pub async fn find_by_ids(&self, ids: &[RecordId]) -> StoreResult<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.find(&Filter::ids(ids)).await
    }

    pub async fn find(&self, filter: &Filter) -> StoreResult<Vec<T>> {
        let docs = self.store.find(Self::collection(), filter).await?;
        Self::from_docs(docs)
    }

    pub async fn find_one(&self, filter: &Filter) -> StoreResult<Option<T>> {
        let mut docs = self.store.find(Self::collection(), filter).await?;
        if docs.is_empty() {
            Ok(None)
        } else {
            Self::from_doc(docs.swap_remove(0)).map(Some)
        }
    }

    pub async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        self.store.count(Self::collection(), filter).await
    }

    /// Merges the serialized fields of `patch` into the record.
    ///
    /// Returns whether the record existed, not its new state; re-fetch it if
    /// that is needed. The id and creation time are never overwritten.
    pub async fn update(&self, id: RecordId, patch: &impl Serialize) -> StoreResult<bool> {
        let mut fields = Self::to_doc(patch)?;
        for protected in [ID_FIELD, CREATED_AT, UPDATED_AT] {
            fields.remove(protected);
        }
        Self::check_required(&fields, false)?;

        let matched = self
            .store
            .update(Self::collection(), &Filter::id(id), &Update::Set(fields))
            .await?;

        Ok(matched > 0)
    }

    pub async fn update_many(&self, filter: &Filter, update: &Update) -> StoreResult<u64> {
        self.store.update(Self::collection(), filter, update).await
    }

    /// Adds `value` to the id set in `field`, returning whether the record existed.
    pub async fn add_to_set(
        &self,
        id: RecordId,
        field: &'static str,
        value: RecordId,
    ) -> StoreResult<bool> {
        let update = Update::AddToSet(field, value.into());
        Ok(self.update_many(&Filter::id(id), &update).await? > 0)
    }

    /// Removes `value` from the id set in `field`, returning whether the record existed.
    pub async fn pull(
        &self,
        id: RecordId,
        field: &'static str,
        value: RecordId,
    ) -> StoreResult<bool> {
        let update = Update::Pull(field, value.into());
        Ok(self.update_many(&Filter::id(id), &update).await? > 0)
    }

    pub async fn delete(&self, id: RecordId) -> StoreResult<bool> {
        Ok(self.delete_many(&Filter::id(id)).await? > 0)
    }

    pub async fn delete_many(&self, filter: &Filter) -> StoreResult<u64> {
        self.store.delete(Self::collection(), filter).await
    }
}
