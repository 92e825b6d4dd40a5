use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::traits::{duplicate, CREATED_AT, UPDATED_AT};
use crate::db::{
    Collection, Doc, DocumentStore, Filter, StoreError, StoreResult, Update, ID_FIELD,
};
use crate::util::timestamp;

const MAX_CONNECTIONS: u32 = 10;

/// Stores each collection as a PostgreSQL table of JSONB documents.
///
/// Tables are `(id UUID PRIMARY KEY, data JSONB NOT NULL)` and every unique
/// field gets an expression index named `<collection>_<field>_key`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self, collections: &[Collection]) -> StoreResult<()> {
        for collection in collections {
            let create_table = format!(
                r#"CREATE TABLE IF NOT EXISTS "{}" (id UUID PRIMARY KEY, data JSONB NOT NULL)"#,
                collection.name
            );
            sqlx::query(&create_table).execute(&self.pool).await?;

            for field in collection.unique_fields {
                let create_index = format!(
                    r#"CREATE UNIQUE INDEX IF NOT EXISTS "{name}_{field}_key" ON "{name}" ((data ->> '{field}'))"#,
                    name = collection.name,
                    field = field
                );
                sqlx::query(&create_index).execute(&self.pool).await?;
            }
        }

        Ok(())
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::All => {
            builder.push("TRUE");
        }
        Filter::Eq(field, value) => {
            builder
                .push("(data -> ")
                .push_bind(field.to_string())
                .push(") = ")
                .push_bind(Json(value.clone()));
        }
        Filter::In(field, values) => {
            builder
                .push_bind(Json(Value::Array(values.clone())))
                .push(" @> jsonb_build_array(data -> ")
                .push_bind(field.to_string())
                .push(")");
        }
        Filter::Contains(field, value) => {
            builder
                .push("(data -> ")
                .push_bind(field.to_string())
                .push(") @> ")
                .push_bind(Json(Value::Array(vec![value.clone()])));
        }
        Filter::Matches(field, regex) => {
            builder
                .push("(data ->> ")
                .push_bind(field.to_string())
                .push(") ~* ")
                .push_bind(regex.as_str().to_owned());
        }
        Filter::And(filters) if filters.is_empty() => {
            builder.push("TRUE");
        }
        Filter::And(filters) => {
            builder.push("(");
            for (index, filter) in filters.iter().enumerate() {
                if index > 0 {
                    builder.push(" AND ");
                }
                push_filter(builder, filter);
            }
            builder.push(")");
        }
    }
}

/// The array stored under `field`, or an empty one.
fn push_array_field(builder: &mut QueryBuilder<'_, Postgres>, field: &str) {
    builder
        .push("COALESCE(data -> ")
        .push_bind(field.to_owned())
        .push(", '[]'::jsonb)");
}

fn push_update(builder: &mut QueryBuilder<'_, Postgres>, update: &Update) {
    match update {
        Update::Set(fields) => {
            builder
                .push("data || ")
                .push_bind(Json(Value::Object(fields.clone())));
        }
        Update::AddToSet(field, value) => {
            let element = Json(Value::Array(vec![value.clone()]));
            builder
                .push("jsonb_set(data, ARRAY[")
                .push_bind(field.to_string())
                .push("], CASE WHEN ");
            push_array_field(builder, field);
            builder.push(" @> ").push_bind(element.clone()).push(" THEN ");
            push_array_field(builder, field);
            builder.push(" ELSE ");
            push_array_field(builder, field);
            builder.push(" || ").push_bind(element).push(" END)");
        }
        Update::Pull(field, value) => {
            builder
                .push("jsonb_set(data, ARRAY[")
                .push_bind(field.to_string())
                .push("], COALESCE((SELECT jsonb_agg(elem) FROM jsonb_array_elements(");
            push_array_field(builder, field);
            builder
                .push(") AS e(elem) WHERE elem <> ")
                .push_bind(Json(value.clone()))
                .push("), '[]'::jsonb))");
        }
    }

    let mut stamp = Doc::new();
    stamp.insert(UPDATED_AT.to_owned(), timestamp());
    builder.push(" || ").push_bind(Json(Value::Object(stamp)));
}

/// Turns unique index violations into [StoreError::Duplicate].
fn write_error(collection: Collection, written: &Doc, error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.is_unique_violation() {
            let prefix = format!("{}_", collection.name);
            let field = db_error
                .constraint()
                .and_then(|constraint| constraint.strip_prefix(&prefix))
                .and_then(|rest| rest.strip_suffix("_key"))
                .unwrap_or(ID_FIELD);
            let value = written.get(field).cloned().unwrap_or(Value::Null);

            return duplicate(collection, field, &value);
        }
    }

    StoreError::Database(error)
}

fn into_doc(collection: Collection, value: Value) -> StoreResult<Doc> {
    match value {
        Value::Object(doc) => Ok(doc),
        _ => Err(StoreError::MissingId(collection.name)),
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert(&self, collection: Collection, mut doc: Doc) -> StoreResult<Doc> {
        let id = doc
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or(StoreError::MissingId(collection.name))?;

        let now = timestamp();
        doc.insert(CREATED_AT.to_owned(), now.clone());
        doc.insert(UPDATED_AT.to_owned(), now);

        let insert = format!(
            r#"INSERT INTO "{}" (id, data) VALUES ($1, $2)"#,
            collection.name
        );
        sqlx::query(&insert)
            .bind(id)
            .bind(Json(Value::Object(doc.clone())))
            .execute(&self.pool)
            .await
            .map_err(|error| write_error(collection, &doc, error))?;

        Ok(doc)
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Doc>> {
        let mut builder =
            QueryBuilder::new(format!(r#"SELECT data FROM "{}" WHERE "#, collection.name));
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY id");

        let rows: Vec<Json<Value>> = builder.build_query_scalar().fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|Json(value)| into_doc(collection, value))
            .collect()
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        let mut builder =
            QueryBuilder::new(format!(r#"SELECT COUNT(*) FROM "{}" WHERE "#, collection.name));
        push_filter(&mut builder, filter);

        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<u64> {
        let mut builder =
            QueryBuilder::new(format!(r#"UPDATE "{}" SET data = "#, collection.name));
        push_update(&mut builder, update);
        builder.push(" WHERE ");
        push_filter(&mut builder, filter);

        let written = match update {
            Update::Set(fields) => fields.clone(),
            Update::AddToSet(..) | Update::Pull(..) => Doc::new(),
        };
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|error| write_error(collection, &written, error))?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        let mut builder = QueryBuilder::new(format!(r#"DELETE FROM "{}" WHERE "#, collection.name));
        push_filter(&mut builder, filter);

        let result = builder.build().execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}
