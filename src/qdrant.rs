//! Qdrant vector store backend.
//!
//! Implements [`VectorStore`] over the [qdrant-client](https://docs.rs/qdrant-client)
//! gRPC API with two named vectors per point: a `dense` cosine vector and a
//! `sparse` lexical vector. Hybrid queries run both searches concurrently and
//! blend the scores client-side so the alpha contract stays observable.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, NamedVectors,
    PointStruct, ScoredPoint, SearchPointsBuilder, SparseIndices, SparseVectorParamsBuilder,
    SparseVectorsConfigBuilder, UpsertPointsBuilder, Value as QdrantValue, Vector,
    VectorParamsBuilder, VectorsConfigBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::IndexerConfig;
use crate::document::{IndexRecord, RetrievedDocument, SparseVector};
use crate::error::{RagError, Result};
use crate::vectorstore::{FieldFilter, HybridQuery, VectorStore};

const DENSE_VECTOR: &str = "dense";
const SPARSE_VECTOR: &str = "sparse";

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// The wrapped client is task-safe and shared across concurrent retrieval and
/// ingestion calls. Chunk text and metadata are stored as point payload; the
/// chunk id is kept in the payload while the point id is a UUID derived from
/// it, which makes re-upserts of the same chunk id replace the prior record.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Connect to the store described by the indexer configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Connection`] when the client cannot be constructed.
    pub fn new(config: &IndexerConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .api_key(config.api_key.clone())
            .timeout(config.timeout)
            .build()
            .map_err(map_err)?;
        Ok(Self { client })
    }

    /// Create a store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    async fn search_one(
        &self,
        collection: &str,
        vector_name: &str,
        values: Vec<f32>,
        sparse_indices: Option<Vec<u32>>,
        top_k: usize,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        let mut builder = SearchPointsBuilder::new(collection, values, top_k as u64)
            .vector_name(vector_name)
            .with_payload(true);
        if let Some(indices) = sparse_indices {
            builder = builder.sparse_indices(SparseIndices { data: indices });
        }
        if let Some(filter) = filter {
            builder = builder.filter(Filter::must([Condition::matches(
                format!("metadata.{}", filter.field),
                filter.value.clone(),
            )]));
        }
        let response = self.client.search_points(builder).await.map_err(map_err)?;
        Ok(response.result)
    }
}

fn map_err(e: qdrant_client::QdrantError) -> RagError {
    RagError::Connection { backend: "qdrant".to_string(), message: e.to_string() }
}

/// Deterministic point id for a chunk id, stable across re-indexing runs.
fn point_id_for(record_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes()).to_string()
}

fn extract_string(value: &QdrantValue) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Partially merged hybrid scores for one point.
#[derive(Default)]
struct MergedHit {
    dense: Option<f32>,
    sparse: Option<f32>,
    point: Option<ScoredPoint>,
    dense_rank: usize,
}

fn document_from_point(point: ScoredPoint, score: f32) -> RetrievedDocument {
    let id = point.payload.get("id").and_then(extract_string).unwrap_or_default();
    let text = point.payload.get("text").and_then(extract_string).unwrap_or_default();
    let metadata: HashMap<String, String> = point
        .payload
        .get("metadata")
        .and_then(|v| match &v.kind {
            Some(Kind::StructValue(s)) => Some(
                s.fields
                    .iter()
                    .filter_map(|(k, v)| extract_string(v).map(|s| (k.clone(), s)))
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default();

    RetrievedDocument { id, text, score, metadata, rank: 0 }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn initialize_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let collections = self.client.list_collections().await.map_err(map_err)?;
        if collections.collections.iter().any(|c| c.name == name) {
            debug!(collection = name, "collection already exists, skipping creation");
            return Ok(());
        }

        let mut vectors = VectorsConfigBuilder::default();
        vectors.add_named_vector_params(
            DENSE_VECTOR,
            VectorParamsBuilder::new(dimension as u64, Distance::Cosine),
        );
        let mut sparse = SparseVectorsConfigBuilder::default();
        sparse.add_named_vector_params(SPARSE_VECTOR, SparseVectorParamsBuilder::default());

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(vectors)
                    .sparse_vectors_config(sparse),
            )
            .await
            .map_err(|e| RagError::Initialization {
                backend: "qdrant".to_string(),
                message: e.to_string(),
            })?;

        debug!(collection = name, dimension, "created collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.client.delete_collection(name).await.map_err(map_err)?;
        debug!(collection = name, "deleted collection");
        Ok(())
    }

    async fn delete_all(&self, name: &str) -> Result<()> {
        // An empty filter selects every point in the collection.
        self.client
            .delete_points(DeletePointsBuilder::new(name).points(Filter::default()).wait(true))
            .await
            .map_err(map_err)?;
        debug!(collection = name, "wiped all records");
        Ok(())
    }

    async fn upsert(&self, name: &str, records: &[IndexRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = records
            .iter()
            .map(|record| {
                let mut vectors = NamedVectors::default()
                    .add_vector(DENSE_VECTOR, Vector::new_dense(record.dense.clone()));
                if let Some(sparse) = &record.sparse {
                    vectors = vectors.add_vector(
                        SPARSE_VECTOR,
                        Vector::new_sparse(sparse.indices.clone(), sparse.values.clone()),
                    );
                }

                let mut payload_map = serde_json::Map::new();
                payload_map.insert("id".to_string(), serde_json::Value::String(record.id.clone()));
                payload_map
                    .insert("text".to_string(), serde_json::Value::String(record.text.clone()));
                let metadata: serde_json::Map<String, serde_json::Value> = record
                    .metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect();
                payload_map.insert("metadata".to_string(), serde_json::Value::Object(metadata));
                let payload =
                    Payload::try_from(serde_json::Value::Object(payload_map)).unwrap_or_default();

                PointStruct::new(point_id_for(&record.id), vectors, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
            .await
            .map_err(map_err)?;

        debug!(collection = name, count = records.len(), "upserted records");
        Ok(())
    }

    async fn hybrid_search(
        &self,
        name: &str,
        query: &HybridQuery,
    ) -> Result<Vec<RetrievedDocument>> {
        let sparse_query: Option<&SparseVector> = match &query.sparse {
            Some(sparse) if !sparse.is_empty() && query.alpha < 1.0 => Some(sparse),
            Some(_) => None,
            None => {
                warn!(collection = name, "sparse query unavailable, falling back to dense-only search");
                None
            }
        };

        let run_dense = query.alpha > 0.0 || sparse_query.is_none();

        let (dense_hits, sparse_hits) = match sparse_query {
            Some(sparse) if run_dense => {
                let dense_fut = self.search_one(
                    name,
                    DENSE_VECTOR,
                    query.dense.clone(),
                    None,
                    query.top_k,
                    query.filter.as_ref(),
                );
                let sparse_fut = self.search_one(
                    name,
                    SPARSE_VECTOR,
                    sparse.values.clone(),
                    Some(sparse.indices.clone()),
                    query.top_k,
                    query.filter.as_ref(),
                );
                let (d, s) = tokio::join!(dense_fut, sparse_fut);
                (d?, s?)
            }
            Some(sparse) => {
                let hits = self
                    .search_one(
                        name,
                        SPARSE_VECTOR,
                        sparse.values.clone(),
                        Some(sparse.indices.clone()),
                        query.top_k,
                        query.filter.as_ref(),
                    )
                    .await?;
                (Vec::new(), hits)
            }
            None => {
                let hits = self
                    .search_one(
                        name,
                        DENSE_VECTOR,
                        query.dense.clone(),
                        None,
                        query.top_k,
                        query.filter.as_ref(),
                    )
                    .await?;
                (hits, Vec::new())
            }
        };

        let mut merged: HashMap<String, MergedHit> = HashMap::new();
        for (rank, point) in dense_hits.into_iter().enumerate() {
            let key = point_key(&point);
            let entry = merged.entry(key).or_default();
            entry.dense = Some(point.score);
            entry.dense_rank = rank + 1;
            entry.point = Some(point);
        }
        for point in sparse_hits {
            let key = point_key(&point);
            let entry = merged.entry(key).or_default();
            entry.sparse = Some(point.score);
            if entry.point.is_none() {
                entry.dense_rank = usize::MAX;
                entry.point = Some(point);
            }
        }

        let mut scored: Vec<(f32, usize, RetrievedDocument)> = merged
            .into_values()
            .filter_map(|hit| {
                let blended = query.alpha * hit.dense.unwrap_or(0.0)
                    + (1.0 - query.alpha) * hit.sparse.unwrap_or(0.0);
                let dense_rank = hit.dense_rank;
                hit.point.map(|p| (blended, dense_rank, document_from_point(p, blended)))
            })
            .collect();

        // Descending blended score; ties keep dense ordering.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1))
        });
        scored.truncate(query.top_k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(i, (_, _, mut doc))| {
                doc.rank = i + 1;
                doc
            })
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        self.client.health_check().await.map_err(map_err)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // The gRPC channel is released on drop; nothing to flush. Safe to
        // call whether or not the collection was ever initialized.
        debug!("closed qdrant store");
        Ok(())
    }
}

fn point_key(point: &ScoredPoint) -> String {
    point.payload.get("id").and_then(extract_string).unwrap_or_else(|| {
        point
            .id
            .as_ref()
            .and_then(|pid| match &pid.point_id_options {
                Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(s)) => Some(s.clone()),
                Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => {
                    Some(n.to_string())
                }
                None => None,
            })
            .unwrap_or_default()
    })
}
