use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;

pub mod participant;
pub mod researcher;
pub mod session;
pub mod study;
pub mod study_participant;
pub mod tag;

/// The id of any stored record.
///
/// Ids are UUIDv7s, so they are globally unique and sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ApiError::BadRequest(format!("`{}` is not a valid id", s)))
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Self {
        Value::String(id.to_string())
    }
}

impl From<RecordId> for Uuid {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

/// A set of record ids that keeps the order ids were added in.
///
/// Every array-of-id reference between collections is an `IdSet`, so adding
/// an id that is already present is a no-op instead of a duplicate entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IdSet(Vec<RecordId>);

impl IdSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds the id, returning whether it was not already present.
    pub fn insert(&mut self, id: RecordId) -> bool {
        if self.contains(&id) {
            false
        } else {
            self.0.push(id);
            true
        }
    }

    /// Removes the id, returning whether it was present.
    pub fn remove(&mut self, id: &RecordId) -> bool {
        let before = self.0.len();
        self.0.retain(|existing| existing != id);
        self.0.len() != before
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordId> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[RecordId] {
        &self.0
    }
}

impl FromIterator<RecordId> for IdSet {
    fn from_iter<I: IntoIterator<Item = RecordId>>(iter: I) -> Self {
        let mut set = IdSet::new();
        for id in iter {
            set.insert(id);
        }

        set
    }
}

impl<'de> Deserialize<'de> for IdSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ids = Vec::<RecordId>::deserialize(deserializer)?;
        Ok(ids.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a IdSet {
    type Item = &'a RecordId;
    type IntoIter = std::slice::Iter<'a, RecordId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Converts a list of ids into the JSON values the store filters on.
pub fn id_values<'i>(ids: impl IntoIterator<Item = &'i RecordId>) -> Vec<Value> {
    ids.into_iter().map(|id| Value::from(*id)).collect()
}
