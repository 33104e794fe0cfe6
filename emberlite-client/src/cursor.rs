// src/cursor.rs
// Batch-level view of a server-side cursor

use emberlite_core::{CursorId, Document};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

use crate::codec::CodecRegistry;
use crate::error::{Error, Result};
use crate::executor::OperationExecutor;
use crate::operation::{CursorReply, GetMoreOperation, KillCursorsOperation, Namespace};

/// Source of result batches.
///
/// `has_next` reports whether another `next_batch` call may yield anything
/// and never fetches. A batch may be empty even when `has_next` was true.
pub trait BatchCursor<T> {
    fn has_next(&self) -> bool;

    fn next_batch(&mut self) -> Result<Vec<T>>;
}

/// Cursor over a command reply's `firstBatch` plus any `getMore` follow-ups.
pub struct CommandBatchCursor<T> {
    executor: OperationExecutor,
    namespace: Namespace,
    codec: CodecRegistry,
    first_batch: Option<Vec<Document>>,
    cursor_id: CursorId,
    batch_size: Option<usize>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CommandBatchCursor<T> {
    pub(crate) fn new(
        executor: OperationExecutor,
        namespace: Namespace,
        codec: CodecRegistry,
        first: CursorReply,
        batch_size: Option<usize>,
    ) -> Self {
        CommandBatchCursor {
            executor,
            namespace,
            codec,
            first_batch: Some(first.documents),
            cursor_id: first.id,
            batch_size,
            _marker: PhantomData,
        }
    }

    /// Server cursor id; `0` once the server has nothing left.
    pub fn cursor_id(&self) -> CursorId {
        self.cursor_id
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }
}

impl<T: DeserializeOwned> CommandBatchCursor<T> {
    fn decode_all(&self, documents: Vec<Document>) -> Result<Vec<T>> {
        documents.into_iter().map(|doc| self.codec.decode(doc)).collect()
    }
}

impl<T: DeserializeOwned> BatchCursor<T> for CommandBatchCursor<T> {
    fn has_next(&self) -> bool {
        self.first_batch.is_some() || self.cursor_id != 0
    }

    fn next_batch(&mut self) -> Result<Vec<T>> {
        if let Some(documents) = self.first_batch.take() {
            return self.decode_all(documents);
        }
        if self.cursor_id == 0 {
            return Err(Error::CursorExhausted);
        }

        let operation = GetMoreOperation::new(self.namespace.clone(), self.cursor_id, self.batch_size);
        let reply = self.executor.execute_read(operation)?;
        tracing::debug!(
            namespace = %self.namespace,
            cursor = self.cursor_id,
            next_cursor = reply.id,
            batch = reply.documents.len(),
            "fetched batch"
        );
        self.cursor_id = reply.id;
        self.decode_all(reply.documents)
    }
}

impl<T> Drop for CommandBatchCursor<T> {
    fn drop(&mut self) {
        if self.cursor_id == 0 || self.executor.server().is_closed() {
            return;
        }
        let operation = KillCursorsOperation::new(self.namespace.clone(), vec![self.cursor_id]);
        if let Err(e) = self.executor.execute_write(operation) {
            tracing::warn!(namespace = %self.namespace, cursor = self.cursor_id, error = %e, "failed to kill cursor");
        }
    }
}

impl<T> std::fmt::Debug for CommandBatchCursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBatchCursor")
            .field("namespace", &self.namespace)
            .field("cursor_id", &self.cursor_id)
            .field("first_batch_pending", &self.first_batch.is_some())
            .finish()
    }
}
