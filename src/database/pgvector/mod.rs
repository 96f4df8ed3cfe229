// PostgreSQL + pgvector vector store
// Uses the langchain_pg_collection / langchain_pg_embedding layout so collections written
// by other LangChain-based tools can be queried too


use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ChunkRecord, ScoredChunk, VectorStore};
use crate::config::DatabaseConfig;
use crate::embeddings::ChunkMetadata;
use crate::{RagError, Result};

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Postgres error code for a missing table
const UNDEFINED_TABLE: &str = "42P01";

#[derive(Debug, Clone)]
pub struct PgVectorStore {
    pool: PgPool,
    target: String,
}

impl PgVectorStore {
    /// Connect now and create the tables if needed
    #[inline]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let target = config.describe();
        debug!("Connecting to vector database at {}", target);

        let pool = pool_options()
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| connection_error(&target, &e))?;

        let store = Self { pool, target };
        store.run_migrations().await?;

        info!("Connected to vector database at {}", store.target);
        Ok(store)
    }

    /// Defer connecting until the first query; connection problems then surface per call
    #[inline]
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let target = config.describe();
        let pool = pool_options().connect_lazy_with(config.connect_options()?);
        Ok(Self { pool, target })
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/pgvector/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RagError::Database(format!("Failed to run schema migration: {}", e)))?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Look up a collection id, creating the collection when `create` is set
    async fn collection_id(&self, name: &str, create: bool) -> Result<Option<Uuid>> {
        if create {
            sqlx::query(
                "INSERT INTO langchain_pg_collection (uuid, name) VALUES ($1, $2)
                 ON CONFLICT (name) DO NOTHING",
            )
            .bind(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| self.query_error("Failed to create collection", &e))?;
        }

        sqlx::query_scalar::<_, Uuid>("SELECT uuid FROM langchain_pg_collection WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.query_error("Failed to look up collection", &e))
    }

    fn query_error(&self, context: &str, error: &sqlx::Error) -> RagError {
        match error {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNDEFINED_TABLE) => {
                RagError::Database(format!(
                    "{}: the vector tables do not exist yet in {} (run the ingest command first)",
                    context, self.target
                ))
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => connection_error(&self.target, error),
            _ => RagError::Database(format!("{}: {}", context, error)),
        }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn upsert(&self, collection: &str, records: &[ChunkRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let collection_id = self
            .collection_id(collection, true)
            .await?
            .ok_or_else(|| {
                RagError::Database(format!("Collection {} could not be created", collection))
            })?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| self.query_error("Failed to start transaction", &e))?;

        for record in records {
            sqlx::query(
                "INSERT INTO langchain_pg_embedding (id, collection_id, embedding, document, cmetadata)
                 VALUES ($1, $2, $3::real[]::vector, $4, $5)
                 ON CONFLICT (id) DO UPDATE SET
                     collection_id = EXCLUDED.collection_id,
                     embedding = EXCLUDED.embedding,
                     document = EXCLUDED.document,
                     cmetadata = EXCLUDED.cmetadata",
            )
            .bind(record.id.to_string())
            .bind(collection_id)
            .bind(&record.embedding)
            .bind(&record.text)
            .bind(Json(&record.metadata))
            .execute(&mut *tx)
            .await
            .map_err(|e| self.query_error("Failed to store chunk", &e))?;
        }

        tx.commit()
            .await
            .map_err(|e| self.query_error("Failed to commit chunks", &e))?;

        debug!("Stored {} records in {}", records.len(), collection);
        Ok(records.len())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let limit = i64::try_from(k).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            "SELECT e.document, e.cmetadata, (e.embedding <=> $1::real[]::vector) AS distance
             FROM langchain_pg_embedding e
             JOIN langchain_pg_collection c ON e.collection_id = c.uuid
             WHERE c.name = $2 AND e.embedding IS NOT NULL
             ORDER BY distance ASC
             LIMIT $3",
        )
        .bind(embedding)
        .bind(collection)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| self.query_error("Failed to search collection", &e))?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let text: Option<String> = row
                .try_get("document")
                .map_err(|e| self.query_error("Failed to read document", &e))?;
            let metadata: Option<Json<Value>> = row
                .try_get("cmetadata")
                .map_err(|e| self.query_error("Failed to read metadata", &e))?;
            let distance: f64 = row
                .try_get("distance")
                .map_err(|e| self.query_error("Failed to read distance", &e))?;

            results.push(ScoredChunk {
                text: text.unwrap_or_default(),
                metadata: metadata
                    .map_or_else(ChunkMetadata::default, |Json(value)| parse_metadata(value)),
                score: (1.0 - distance) as f32,
            });
        }

        debug!("Found {} results in {}", results.len(), collection);
        Ok(results)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)
             FROM langchain_pg_embedding e
             JOIN langchain_pg_collection c ON e.collection_id = c.uuid
             WHERE c.name = $1",
        )
        .bind(collection)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| self.query_error("Failed to count records", &e))?;

        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        let Some(collection_id) = self.collection_id(collection, false).await? else {
            debug!("Collection {} does not exist, nothing to clear", collection);
            return Ok(());
        };

        // Delete records explicitly in case the foreign key was created without a cascade
        sqlx::query("DELETE FROM langchain_pg_embedding WHERE collection_id = $1")
            .bind(collection_id)
            .execute(&self.pool)
            .await
            .map_err(|e| self.query_error("Failed to clear collection", &e))?;

        sqlx::query("DELETE FROM langchain_pg_collection WHERE uuid = $1")
            .bind(collection_id)
            .execute(&self.pool)
            .await
            .map_err(|e| self.query_error("Failed to remove collection", &e))?;

        info!("Cleared collection {}", collection);
        Ok(())
    }
}

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
}

fn connection_error(target: &str, error: &sqlx::Error) -> RagError {
    RagError::Database(format!(
        "Could not connect to the vector database at {}: {}. Verify that PostgreSQL is running and accepting connections",
        target, error
    ))
}

/// Metadata written by other tools may not match our shape; fall back to defaults
fn parse_metadata(value: Value) -> ChunkMetadata {
    serde_json::from_value(value).unwrap_or_else(|e| {
        warn!("Unrecognized chunk metadata: {}", e);
        ChunkMetadata::default()
    })
}
