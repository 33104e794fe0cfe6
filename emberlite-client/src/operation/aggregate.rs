// src/operation/aggregate.rs

use emberlite_core::Document;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::marker::PhantomData;

use super::{command_document, CursorReply, Namespace, Operation, ReadOperation};
use crate::binding::ServerBinding;
use crate::codec::CodecRegistry;
use crate::cursor::CommandBatchCursor;
use crate::error::Result;

/// Run a pipeline and open a cursor over its output.
///
/// The returned cursor outlives the binding: later batches are fetched with
/// `getMore` through the executor, one binding per fetch.
pub struct AggregateOperation<T> {
    namespace: Namespace,
    pipeline: Vec<Document>,
    batch_size: Option<usize>,
    codec: CodecRegistry,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AggregateOperation<T> {
    pub fn new(namespace: Namespace, pipeline: Vec<Document>, codec: CodecRegistry) -> Self {
        AggregateOperation { namespace, pipeline, batch_size: None, codec, _marker: PhantomData }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

impl<T: DeserializeOwned> Operation for AggregateOperation<T> {
    type Output = CommandBatchCursor<T>;

    const NAME: &'static str = "aggregate";

    fn execute(&self, binding: &ServerBinding) -> Result<CommandBatchCursor<T>> {
        let pipeline: Vec<Value> = self.pipeline.iter().cloned().map(Document::into_value).collect();
        let mut cursor = json!({});
        if let Some(batch_size) = self.batch_size {
            cursor["batchSize"] = json!(batch_size);
        }
        let command = command_document(json!({
            "aggregate": self.namespace.collection(),
            "pipeline": pipeline,
            "cursor": cursor,
        }))?;

        let reply = binding.command(self.namespace.database(), &command)?;
        let first = CursorReply::parse(Self::NAME, &reply, "firstBatch")?;
        tracing::debug!(
            namespace = %self.namespace,
            cursor = first.id,
            first_batch = first.documents.len(),
            "aggregate cursor opened"
        );

        Ok(CommandBatchCursor::new(
            binding.executor(),
            self.namespace.clone(),
            self.codec.clone(),
            first,
            self.batch_size,
        ))
    }
}

impl<T: DeserializeOwned> ReadOperation for AggregateOperation<T> {}
