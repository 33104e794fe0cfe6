// src/executor.rs
// The single path by which operations reach the embedded engine

use crate::binding::ServerBinding;
use crate::error::Result;
use crate::operation::{Operation, OperationKind, ReadOperation, WriteOperation};
use crate::server::EmbeddedServer;

/// Runs operations against fresh bindings.
///
/// Stateless apart from the shared server handle: clones and separate
/// executors over the same server may be used from any number of threads.
#[derive(Clone, Debug)]
pub struct OperationExecutor {
    server: EmbeddedServer,
}

impl OperationExecutor {
    pub fn new(server: EmbeddedServer) -> Self {
        OperationExecutor { server }
    }

    pub fn server(&self) -> &EmbeddedServer {
        &self.server
    }

    /// Run a read operation. See [`execute_write`](Self::execute_write) for
    /// the binding and error contract, which is the same.
    pub fn execute_read<O: ReadOperation>(&self, operation: O) -> Result<O::Output> {
        self.execute(operation, OperationKind::Read)
    }

    /// Run a write operation.
    ///
    /// Acquires a binding, runs `operation` against it and releases the
    /// binding before anything is returned. If both the operation and the
    /// release fail, the operation's error is returned and the release error is
    /// logged and counted in
    /// [`BindingStats::release_failures`](crate::server::BindingStats). A release
    /// failure after a successful operation is returned as the error.
    ///
    /// ```compile_fail
    /// # use emberlite::{operation::CountOperation, Namespace, OperationExecutor};
    /// # fn run(executor: &OperationExecutor, namespace: Namespace) {
    /// // Reads are not accepted here
    /// let _ = executor.execute_write(CountOperation::new(namespace));
    /// # }
    /// ```
    pub fn execute_write<O: WriteOperation>(&self, operation: O) -> Result<O::Output> {
        self.execute(operation, OperationKind::Write)
    }

    fn execute<O: Operation>(&self, operation: O, kind: OperationKind) -> Result<O::Output> {
        let binding = ServerBinding::acquire(&self.server)?;
        let binding_id = binding.id();
        tracing::debug!(operation = O::NAME, kind = ?kind, binding = binding_id, "executing operation");

        // A panic inside `execute` unwinds through `binding`'s Drop, which releases it.
        let outcome = operation.execute(&binding);
        let released = binding.release();

        match (outcome, released) {
            (Ok(output), Ok(())) => Ok(output),
            (Ok(_), Err(release_error)) => {
                tracing::error!(operation = O::NAME, binding = binding_id, error = %release_error, "binding release failed");
                Err(release_error)
            }
            (Err(error), Ok(())) => {
                tracing::debug!(operation = O::NAME, error = %error, "operation failed");
                Err(error)
            }
            (Err(error), Err(release_error)) => {
                tracing::error!(
                    operation = O::NAME,
                    binding = binding_id,
                    error = %error,
                    release_error = %release_error,
                    "operation and binding release both failed"
                );
                Err(error)
            }
        }
    }
}
