use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::db::{StoreError, StoreResult};
use crate::models::{id_values, RecordId};

/// The field every document keeps its id in.
pub const ID_FIELD: &str = "_id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// A stored document, as the store sees it.
pub type Doc = Map<String, Value>;

pub trait CollectionName {
    fn collection_name() -> &'static str;
}

pub trait UniqueFields {
    /// Fields whose values may appear at most once across the collection.
    fn unique_fields() -> &'static [&'static str] {
        &[]
    }
}

pub trait RequiredFields {
    /// Fields that must be present and, when they hold text, not blank.
    fn required_fields() -> &'static [&'static str] {
        &[]
    }
}

/// Whether `value` can stand in for a required field.
pub fn is_filled(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(_) => true,
    }
}

/// A record type that lives in its own collection.
pub trait Document:
    CollectionName + UniqueFields + RequiredFields + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn id(&self) -> RecordId;
}

/// The name and constraints of a collection, handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    pub name: &'static str,
    pub unique_fields: &'static [&'static str],
}

impl Collection {
    pub fn of<T: Document>() -> Self {
        Self {
            name: T::collection_name(),
            unique_fields: T::unique_fields(),
        }
    }
}

/// Which documents an operation applies to.
#[derive(Debug, Clone)]
pub enum Filter {
    All,
    Eq(&'static str, Value),
    In(&'static str, Vec<Value>),
    /// The field is an array holding the value.
    Contains(&'static str, Value),
    /// The field is a string matching the case-insensitive pattern.
    Matches(&'static str, Regex),
    And(Vec<Filter>),
}

impl Filter {
    pub fn id(id: RecordId) -> Self {
        Filter::Eq(ID_FIELD, id.into())
    }

    pub fn ids<'i>(ids: impl IntoIterator<Item = &'i RecordId>) -> Self {
        Filter::In(ID_FIELD, id_values(ids))
    }

    pub fn eq(field: &'static str, value: impl Into<Value>) -> Self {
        Filter::Eq(field, value.into())
    }

    /// Case-insensitive substring search; `text` is matched literally.
    pub fn containing_text(field: &'static str, text: &str) -> StoreResult<Self> {
        let regex = RegexBuilder::new(&regex::escape(text))
            .case_insensitive(true)
            .build()?;

        Ok(Filter::Matches(field, regex))
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::All => other,
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            this => Filter::And(vec![this, other]),
        }
    }

    pub fn matches(&self, doc: &Doc) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => doc.get(*field) == Some(value),
            Filter::In(field, values) => doc
                .get(*field)
                .map_or(false, |found| values.contains(found)),
            Filter::Contains(field, value) => doc
                .get(*field)
                .and_then(Value::as_array)
                .map_or(false, |items| items.contains(value)),
            Filter::Matches(field, regex) => doc
                .get(*field)
                .and_then(Value::as_str)
                .map_or(false, |text| regex.is_match(text)),
            Filter::And(filters) => filters.iter().all(|filter| filter.matches(doc)),
        }
    }
}

/// A change applied to every matched document.
#[derive(Debug, Clone)]
pub enum Update {
    /// Overwrite the given top-level fields, leaving the rest alone.
    Set(Doc),
    /// Append the value to an array field unless it is already there.
    AddToSet(&'static str, Value),
    /// Remove every occurrence of the value from an array field.
    Pull(&'static str, Value),
}

impl Update {
    pub fn set(field: &'static str, value: impl Into<Value>) -> Self {
        let mut fields = Doc::new();
        fields.insert(field.to_owned(), value.into());
        Update::Set(fields)
    }

    pub fn apply(&self, doc: &mut Doc) {
        match self {
            Update::Set(fields) => {
                for (key, value) in fields {
                    doc.insert(key.clone(), value.clone());
                }
            }
            Update::AddToSet(field, value) => {
                let items = doc
                    .entry(field.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(items) = items {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                } else {
                    *items = Value::Array(vec![value.clone()]);
                }
            }
            Update::Pull(field, value) => {
                if let Some(Value::Array(items)) = doc.get_mut(*field) {
                    items.retain(|item| item != value);
                }
            }
        }
    }
}

/// The storage boundary.
///
/// Every call touches a single collection and is independent of every other
/// call; nothing here spans collections or offers transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a document that already carries its `_id`, returning it as
    /// stored (with timestamps).
    async fn insert(&self, collection: Collection, doc: Doc) -> StoreResult<Doc>;

    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Doc>>;

    async fn count(&self, collection: Collection, filter: &Filter) -> StoreResult<u64>;

    /// Applies the update to every matching document, returning how many matched.
    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<u64>;

    async fn delete(&self, collection: Collection, filter: &Filter) -> StoreResult<u64>;
}

pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn duplicate(collection: Collection, field: &str, value: &Value) -> StoreError {
    StoreError::Duplicate {
        collection: collection.name,
        field: field.to_owned(),
        value: display_value(value),
    }
}
