use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::db::{BulkInsert, Db, Document, Filter, InsertFailure};
use crate::error::ApiResult;
use crate::models::participant::Participant;
use crate::models::tag::Tag;

/// A record type with a unique, human-meaningful key.
pub trait NaturalKey: Document {
    const KEY_FIELD: &'static str;

    fn natural_key(&self) -> &str;
}

impl NaturalKey for Participant {
    const KEY_FIELD: &'static str = "email";

    fn natural_key(&self) -> &str {
        &self.email
    }
}

impl NaturalKey for Tag {
    const KEY_FIELD: &'static str = "tagName";

    fn natural_key(&self) -> &str {
        &self.tag_name
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeduplicatedInsert<T> {
    /// Records that were newly stored
    pub success: Vec<T>,
    /// Stored records whose key matched a candidate, which was dropped
    pub existing: Vec<T>,
    /// Candidates that could not be stored, indexed by their batch position
    pub failed: Vec<InsertFailure>,
}

impl<T> DeduplicatedInsert<T> {
    pub fn fully_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Stores every candidate whose key isn't already taken.
///
/// Candidates are only checked against stored records. Two candidates with
/// the same key in one batch are both attempted, and the store rejects the
/// second, which is then reported in `failed`.
pub async fn insert_deduplicated<T: NaturalKey>(
    candidates: Vec<T>,
    db: &Db,
) -> ApiResult<DeduplicatedInsert<T>> {
    let repository = db.collection::<T>();

    let keys: Vec<Value> = candidates
        .iter()
        .map(|candidate| Value::from(candidate.natural_key()))
        .collect();
    let existing = if keys.is_empty() {
        Vec::new()
    } else {
        repository.find(&Filter::In(T::KEY_FIELD, keys)).await?
    };
    let taken: HashSet<&str> = existing.iter().map(|record| record.natural_key()).collect();

    let (positions, fresh): (Vec<usize>, Vec<T>) = candidates
        .into_iter()
        .enumerate()
        .filter(|(_, candidate)| !taken.contains(candidate.natural_key()))
        .unzip();

    let BulkInsert { inserted, failed } = repository.create_many(fresh).await?;
    let failed = failed
        .into_iter()
        .map(|failure| InsertFailure {
            index: positions.get(failure.index).copied().unwrap_or(failure.index),
            ..failure
        })
        .collect();

    Ok(DeduplicatedInsert {
        success: inserted,
        existing,
        failed,
    })
}
