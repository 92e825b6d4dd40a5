//! The document store and the typed repositories built on it.

use std::sync::Arc;

use anyhow::Context as _;

pub mod memory;
pub mod postgres;
pub mod repository;
pub mod traits;

pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;
pub use self::repository::{BulkInsert, InsertFailure, Repository};
pub use self::traits::{Collection, Doc, Document, DocumentStore, Filter, Update, ID_FIELD};

use crate::models::participant::Participant;
use crate::models::researcher::Researcher;
use crate::models::session::Session;
use crate::models::study::Study;
use crate::models::study_participant::StudyParticipant;
use crate::models::tag::Tag;

/// Passing this as the database URL keeps everything in process memory.
pub const MEMORY_URL: &str = "memory";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection} already has a document with {field} `{value}`")]
    Duplicate {
        collection: &'static str,
        field: String,
        value: String,
    },
    #[error("{collection} requires a non-blank {field}")]
    MissingField {
        collection: &'static str,
        field: &'static str,
    },
    #[error("malformed document in {collection}: {source}")]
    Malformed {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("document in {0} has no valid `_id`")]
    MissingId(&'static str),
    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Every collection the service keeps.
pub fn collections() -> [Collection; 6] {
    [
        Collection::of::<Researcher>(),
        Collection::of::<Study>(),
        Collection::of::<Participant>(),
        Collection::of::<StudyParticipant>(),
        Collection::of::<Tag>(),
        Collection::of::<Session>(),
    ]
}

/// A cheaply cloneable handle to the document store shared by all requests.
#[derive(Clone)]
pub struct Db(Arc<dyn DocumentStore>);

impl Db {
    pub fn new(store: impl DocumentStore + 'static) -> Self {
        Self(Arc::new(store))
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::default())
    }

    /// Connects to the store named by `url`, creating any missing tables.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        if url == MEMORY_URL {
            tracing::warn!("using the in-memory store, nothing will be persisted");
            return Ok(Self::in_memory());
        }

        let store = PgStore::connect(url)
            .await
            .context("Failed to connect to the database")?;
        store
            .migrate(&collections())
            .await
            .context("Failed to create collections")?;

        Ok(Self::new(store))
    }

    pub fn collection<T: Document>(&self) -> Repository<'_, T> {
        Repository::new(self.0.as_ref())
    }
}
