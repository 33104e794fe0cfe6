// src/collection.rs
// Typed collection facade

use emberlite_core::Document;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

use crate::codec::CodecRegistry;
use crate::cursor::CommandBatchCursor;
use crate::error::{Error, Result};
use crate::executor::OperationExecutor;
use crate::iterator::ResultIterator;
use crate::operation::{AggregateOperation, CountOperation, DropCollectionOperation, InsertOperation, Namespace};

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// `None` when id generation is left to the engine.
    pub inserted_id: Option<Value>,
}

/// Collection of `T`, encoded and decoded through the client's codec.
pub struct Collection<T = Document> {
    namespace: Namespace,
    executor: OperationExecutor,
    codec: CodecRegistry,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Collection<T> {
    pub(crate) fn new(namespace: Namespace, executor: OperationExecutor, codec: CodecRegistry) -> Self {
        Collection { namespace, executor, codec, _marker: PhantomData }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        self.namespace.collection()
    }

    /// Same collection, different element type.
    pub fn clone_with_type<U>(&self) -> Collection<U> {
        Collection::new(self.namespace.clone(), self.executor.clone(), self.codec.clone())
    }

    pub fn count(&self) -> Result<u64> {
        self.executor.execute_read(CountOperation::new(self.namespace.clone()))
    }

    /// Count documents matching a query filter, e.g. `{"age": {"$gte": 18}}`.
    pub fn count_matching(&self, filter: Document) -> Result<u64> {
        self.executor.execute_read(CountOperation::with_filter(self.namespace.clone(), filter))
    }

    /// Pipeline stages are converted with the collection's codec.
    pub fn aggregate<S: Serialize>(&self, pipeline: &[S]) -> Result<AggregateIterable<T>> {
        let stages = pipeline
            .iter()
            .map(|stage| self.codec.encode(stage))
            .collect::<Result<Vec<_>>>()?;
        Ok(AggregateIterable {
            namespace: self.namespace.clone(),
            executor: self.executor.clone(),
            codec: self.codec.clone(),
            pipeline: stages,
            batch_size: None,
            _marker: PhantomData,
        })
    }

    /// Drop the collection; `false` if it did not exist.
    pub fn drop(&self) -> Result<bool> {
        self.executor.execute_write(DropCollectionOperation::new(self.namespace.clone()))
    }
}

impl<T: Serialize> Collection<T> {
    pub fn insert_one(&self, document: &T) -> Result<InsertOneResult> {
        let encoded = self.codec.encode_for_insert(document)?;
        let inserted_id = encoded.id().cloned();

        let summary = self.executor.execute_write(InsertOperation::new(self.namespace.clone(), vec![encoded])?)?;
        if summary.inserted_count != 1 {
            return Err(Error::UnexpectedReply {
                command: "insert",
                reason: format!("expected 1 inserted document, engine reported {}", summary.inserted_count),
            });
        }
        Ok(InsertOneResult { inserted_id })
    }
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        self.clone_with_type()
    }
}

impl<T> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").field("namespace", &self.namespace).finish()
    }
}

/// A pending aggregation. Nothing runs until [`AggregateIterable::iter`].
pub struct AggregateIterable<T> {
    namespace: Namespace,
    executor: OperationExecutor,
    codec: CodecRegistry,
    pipeline: Vec<Document>,
    batch_size: Option<usize>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AggregateIterable<T> {
    /// Documents per batch; `0` makes the first batch empty.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn pipeline(&self) -> &[Document] {
        &self.pipeline
    }
}

impl<T: DeserializeOwned> AggregateIterable<T> {
    /// Run the aggregation. Each call runs it again with a new server cursor.
    pub fn iter(&self) -> Result<ResultIterator<T, CommandBatchCursor<T>>> {
        let mut operation = AggregateOperation::new(self.namespace.clone(), self.pipeline.clone(), self.codec.clone());
        if let Some(batch_size) = self.batch_size {
            operation = operation.batch_size(batch_size);
        }
        let cursor = self.executor.execute_read(operation)?;
        Ok(ResultIterator::new(cursor))
    }

    /// Run the aggregation and collect every result.
    pub fn collect_all(&self) -> Result<Vec<T>> {
        self.iter()?.collect()
    }
}
