// LanceDB-backed vector index
// Each document gets its own table under the vector database directory


use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{IndexedChunk, ScoredChunk, VectorIndex, check_dimensions, rank};
use crate::ChatError;
use crate::config::Config;
use crate::embeddings::DocumentChunk;

const TABLE_PREFIX: &str = "document_";

pub struct LanceIndex {
    connection: Connection,
    table_name: String,
    dimension: Option<usize>,
    row_count: usize,
}

impl std::fmt::Debug for LanceIndex {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanceIndex")
            .field("table_name", &self.table_name)
            .field("dimension", &self.dimension)
            .field("row_count", &self.row_count)
            .finish()
    }
}

impl LanceIndex {
    /// Connect to the vector database and reserve a fresh table name.
    ///
    /// The table itself is created on first insert, once the vector
    /// dimension is known.
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, ChatError> {
        let connection = connect(config).await?;

        let table_name = format!("{}{}", TABLE_PREFIX, uuid::Uuid::new_v4().simple());
        info!("Vector index will use table {}", table_name);

        Ok(Self {
            connection,
            table_name,
            dimension: None,
            row_count: 0,
        })
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Drop every document table in the vector database.
    ///
    /// Tables left behind by an earlier process are never read again.
    /// Returns how many were dropped.
    #[inline]
    pub async fn drop_document_tables(config: &Config) -> Result<usize, ChatError> {
        let connection = connect(config).await?;
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| ChatError::Index(format!("Failed to list tables: {}", e)))?;

        let mut dropped = 0;
        for name in table_names.iter().filter(|n| n.starts_with(TABLE_PREFIX)) {
            connection
                .drop_table(name)
                .await
                .map_err(|e| ChatError::Index(format!("Failed to drop table {}: {}", name, e)))?;
            dropped += 1;
        }

        if dropped > 0 {
            info!("Dropped {} stale document tables", dropped);
        }
        Ok(dropped)
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("source_offset", DataType::UInt64, false),
            Field::new("page", DataType::UInt32, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    fn create_record_batch(
        entries: &[IndexedChunk],
        vector_dim: usize,
    ) -> Result<RecordBatch, ChatError> {
        let len = entries.len();
        let created_at = chrono::Utc::now().to_rfc3339();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut texts = Vec::with_capacity(len);
        let mut offsets = Vec::with_capacity(len);
        let mut pages = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);

        for entry in entries {
            ids.push(uuid::Uuid::new_v4().to_string());
            flat_values.extend_from_slice(&entry.vector);
            texts.push(entry.chunk.text.as_str());
            offsets.push(entry.chunk.source_offset as u64);
            pages.push(entry.chunk.page as u32);
            chunk_indices.push(entry.chunk.chunk_index as u32);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_dim as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| ChatError::Index(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(texts)),
            Arc::new(UInt64Array::from(offsets)),
            Arc::new(UInt32Array::from(pages)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(vec![created_at.as_str(); len])),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| ChatError::Index(format!("Failed to create record batch: {}", e)))
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredChunk>, ChatError> {
        let texts = column::<StringArray>(batch, "text")?;
        let offsets = column::<UInt64Array>(batch, "source_offset")?;
        let pages = column::<UInt32Array>(batch, "page")?;
        let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            results.push(ScoredChunk {
                chunk: DocumentChunk {
                    text: texts.value(row).to_string(),
                    source_offset: offsets.value(row) as usize,
                    page: pages.value(row) as usize,
                    chunk_index: chunk_indices.value(row) as usize,
                },
                // Cosine distance is 1 - similarity
                score: 1.0 - distance,
            });
        }

        Ok(results)
    }
}

async fn connect(config: &Config) -> Result<Connection, ChatError> {
    let db_path = config.vector_database_path();
    debug!("Connecting to LanceDB at path: {:?}", db_path);

    std::fs::create_dir_all(&db_path).map_err(|e| {
        ChatError::Index(format!("Failed to create vector database directory: {}", e))
    })?;

    let uri = format!("file://{}", db_path.display());
    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| ChatError::Index(format!("Failed to connect to LanceDB: {}", e)))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, ChatError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ChatError::Index(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ChatError::Index(format!("Invalid {} column type", name)))
}

#[async_trait]
impl VectorIndex for LanceIndex {
    #[inline]
    async fn insert(&mut self, entries: Vec<IndexedChunk>) -> Result<(), ChatError> {
        if entries.is_empty() {
            debug!("No vectors to insert");
            return Ok(());
        }

        let dimension = check_dimensions(&entries, self.dimension)?
            .ok_or_else(|| ChatError::Index("Vector dimension not set".to_string()))?;
        let record_batch = Self::create_record_batch(&entries, dimension)?;
        let schema = record_batch.schema();

        if self.dimension.is_none() {
            self.connection
                .create_empty_table(&self.table_name, schema.clone())
                .execute()
                .await
                .map_err(|e| ChatError::Index(format!("Failed to create table: {}", e)))?;
            info!(
                "Created table {} with {} dimensions",
                self.table_name, dimension
            );
            self.dimension = Some(dimension);
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| ChatError::Index(format!("Failed to open table: {}", e)))?;

        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| ChatError::Index(format!("Failed to insert vectors: {}", e)))?;

        self.row_count += entries.len();
        debug!("Stored {} vectors in {}", entries.len(), self.table_name);
        Ok(())
    }

    #[inline]
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, ChatError> {
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if vector.len() != dimension {
            return Err(ChatError::Retrieval(format!(
                "Query vector has dimension {}, index expects {}",
                vector.len(),
                dimension
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| ChatError::Retrieval(format!("Failed to open table: {}", e)))?;

        let mut stream = table
            .vector_search(vector)
            .map_err(|e| ChatError::Retrieval(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| ChatError::Retrieval(format!("Failed to execute search: {}", e)))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| ChatError::Retrieval(format!("Failed to read result stream: {}", e)))?
        {
            results.extend(Self::parse_search_batch(&batch)?);
        }

        rank(&mut results, k);
        debug!("Vector search returned {} results", results.len());
        Ok(results)
    }

    #[inline]
    fn len(&self) -> usize {
        self.row_count
    }

    #[inline]
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    async fn discard(&self) -> Result<(), ChatError> {
        if self.dimension.is_none() {
            return Ok(());
        }

        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| ChatError::Index(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            info!("Dropping table {}", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| ChatError::Index(format!("Failed to drop table: {}", e)))?;
        } else {
            warn!("Table {} already gone", self.table_name);
        }

        Ok(())
    }
}
