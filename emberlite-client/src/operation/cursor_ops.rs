// src/operation/cursor_ops.rs
// Follow-up commands against a server-side cursor

use emberlite_core::CursorId;
use serde_json::json;

use super::{command_document, CursorReply, Namespace, Operation, ReadOperation, WriteOperation};
use crate::binding::ServerBinding;
use crate::error::Result;

/// Fetch the next batch of an open cursor.
#[derive(Debug, Clone)]
pub struct GetMoreOperation {
    namespace: Namespace,
    cursor_id: CursorId,
    batch_size: Option<usize>,
}

impl GetMoreOperation {
    pub fn new(namespace: Namespace, cursor_id: CursorId, batch_size: Option<usize>) -> Self {
        GetMoreOperation { namespace, cursor_id, batch_size }
    }
}

impl Operation for GetMoreOperation {
    type Output = CursorReply;

    const NAME: &'static str = "getMore";

    fn execute(&self, binding: &ServerBinding) -> Result<CursorReply> {
        let mut command = command_document(json!({
            "getMore": self.cursor_id,
            "collection": self.namespace.collection(),
        }))?;
        if let Some(batch_size) = self.batch_size {
            command.insert("batchSize", json!(batch_size));
        }

        let reply = binding.command(self.namespace.database(), &command)?;
        CursorReply::parse(Self::NAME, &reply, "nextBatch")
    }
}

impl ReadOperation for GetMoreOperation {}

/// Discard server cursors; yields how many were actually killed.
///
/// A write: it removes server-side cursor state.
#[derive(Debug, Clone)]
pub struct KillCursorsOperation {
    namespace: Namespace,
    cursor_ids: Vec<CursorId>,
}

impl KillCursorsOperation {
    pub fn new(namespace: Namespace, cursor_ids: Vec<CursorId>) -> Self {
        KillCursorsOperation { namespace, cursor_ids }
    }
}

impl Operation for KillCursorsOperation {
    type Output = usize;

    const NAME: &'static str = "killCursors";

    fn execute(&self, binding: &ServerBinding) -> Result<usize> {
        let command = command_document(json!({
            "killCursors": self.namespace.collection(),
            "cursors": self.cursor_ids,
        }))?;

        let reply = binding.command(self.namespace.database(), &command)?;
        Ok(reply.get("cursorsKilled").and_then(|v| v.as_array()).map_or(0, Vec::len))
    }
}

impl WriteOperation for KillCursorsOperation {}
