//! Reentrant transaction coordination
//!
//! A transactional operation either begins a fresh engine transaction or
//! joins one an enclosing call already owns. Exactly one call level - the
//! one that began the transaction - ever commits or rolls it back; joined
//! levels treat the handle as borrowed and only propagate failures upward.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;

use carta_core::{CartaError, CartaErrorKind, ErrorBody, Result};

use crate::engine::TransactionBackend;

/// Opaque wrapper around an engine transaction
///
/// The access layer never looks inside; the engine that created the handle
/// downcasts `inner` back to its own transaction type.
#[derive(Clone)]
pub struct TransactionHandle {
    id: Uuid,
    inner: Arc<dyn Any + Send + Sync>,
}

impl TransactionHandle {
    /// Wrap an engine transaction object
    pub fn new(inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            id: Uuid::new_v4(),
            inner,
        }
    }

    /// Identifier for logging and diagnostics
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Recover the engine's transaction type
    ///
    /// Returns `None` when the handle was created by a different engine.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A transaction handle plus the ownership flag for one call level
///
/// `created_here` is true only at the level that began the transaction;
/// that level alone commits or rolls back. Nested calls receive a clone
/// with the flag cleared.
#[derive(Debug, Clone)]
pub struct RunningTransaction {
    handle: TransactionHandle,
    created_here: bool,
}

impl RunningTransaction {
    /// The underlying engine handle, for forwarding into engine calls
    pub fn handle(&self) -> &TransactionHandle {
        &self.handle
    }

    /// True if this call level owns the transaction
    pub fn created_here(&self) -> bool {
        self.created_here
    }
}

/// Hook extracting a caller-visible body from a failing error
///
/// Installed by the application when its errors carry a transport-specific
/// body the coordinator should preserve. Absent (or returning `None`), the
/// coordinator falls back to the error's own body, then to
/// [`ErrorBody::generic_failure`].
pub type BodyExtractor = Arc<dyn Fn(&CartaError) -> Option<ErrorBody> + Send + Sync>;

/// Executes operations inside a new or joined transaction with
/// single-ownership finalization
pub struct TransactionCoordinator<B: TransactionBackend + ?Sized> {
    backend: Arc<B>,
    body_extractor: Option<BodyExtractor>,
}

impl<B: TransactionBackend + ?Sized> Clone for TransactionCoordinator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            body_extractor: self.body_extractor.clone(),
        }
    }
}

impl<B: TransactionBackend + ?Sized> TransactionCoordinator<B> {
    /// Create a coordinator over the given backend
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            body_extractor: None,
        }
    }

    /// Install a body-extraction hook
    pub fn with_body_extractor(mut self, extractor: BodyExtractor) -> Self {
        self.body_extractor = Some(extractor);
        self
    }

    /// Run `op` inside a transaction; failures propagate normalized
    ///
    /// With `existing` supplied the operation joins that transaction and the
    /// outer owner stays responsible for finalization. Without it, a fresh
    /// transaction is begun, committed after `op` returns successfully, and
    /// rolled back on failure.
    ///
    /// # Errors
    ///
    /// A failing operation surfaces as a single `TransactionFailure` error
    /// carrying the original error's structured body when it has one, or the
    /// synthesized generic body otherwise.
    pub async fn execute<T, F, Fut>(
        &self,
        existing: Option<&RunningTransaction>,
        op: F,
    ) -> Result<T>
    where
        F: FnOnce(RunningTransaction) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let running = self.prepare(existing).await?;

        let error = match op(running.clone()).await {
            Ok(result) => match self.wrap_up(&running).await {
                Ok(()) => return Ok(result),
                Err(commit_error) => commit_error,
            },
            Err(error) => error,
        };

        self.unwind(&running).await;
        Err(self.normalize(error))
    }

    /// Run `op` inside a transaction; failures are consumed by `recover`
    ///
    /// Identical to [`execute`](Self::execute) except that a failing
    /// operation never reaches the caller as an error: after the owning
    /// level's rollback, `recover` is invoked with the error and its return
    /// value becomes the operation's value.
    pub async fn execute_with_recovery<T, F, Fut, R, RFut>(
        &self,
        existing: Option<&RunningTransaction>,
        op: F,
        recover: R,
    ) -> Result<T>
    where
        F: FnOnce(RunningTransaction) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        R: FnOnce(CartaError) -> RFut + Send,
        RFut: Future<Output = T> + Send,
        T: Send,
    {
        let running = self.prepare(existing).await?;

        let error = match op(running.clone()).await {
            Ok(result) => match self.wrap_up(&running).await {
                Ok(()) => return Ok(result),
                Err(commit_error) => commit_error,
            },
            Err(error) => error,
        };

        self.unwind(&running).await;
        Ok(recover(error).await)
    }

    /// Join the supplied transaction, or begin a new one
    async fn prepare(&self, existing: Option<&RunningTransaction>) -> Result<RunningTransaction> {
        if let Some(outer) = existing {
            tracing::debug!(
                component = module_path!(),
                tx_id = %outer.handle.id(),
                tx_owned = false,
                "joined enclosing transaction"
            );
            return Ok(RunningTransaction {
                handle: outer.handle.clone(),
                created_here: false,
            });
        }

        let handle = self.backend.begin().await?;
        tracing::debug!(
            component = module_path!(),
            tx_id = %handle.id(),
            tx_owned = true,
            "began transaction"
        );
        Ok(RunningTransaction {
            handle,
            created_here: true,
        })
    }

    /// Commit if this level owns the transaction; joined levels defer to
    /// their owner
    async fn wrap_up(&self, running: &RunningTransaction) -> Result<()> {
        if !running.created_here {
            return Ok(());
        }

        tracing::debug!(
            component = module_path!(),
            tx_id = %running.handle.id(),
            "committing transaction"
        );
        self.backend.commit(&running.handle).await
    }

    /// Roll back if this level owns the transaction
    ///
    /// A joined level must leave the handle intact: the outer owner may
    /// still want it, and it alone finalizes. A rollback failure is logged
    /// and swallowed so the original operation error stays primary.
    async fn unwind(&self, running: &RunningTransaction) {
        if !running.created_here {
            return;
        }

        if let Err(rollback_error) = self.backend.rollback(&running.handle).await {
            tracing::debug!(
                component = module_path!(),
                tx_id = %running.handle.id(),
                error = %rollback_error,
                "rollback failed"
            );
        }
    }

    /// Collapse a failing error into a single normalized failure
    fn normalize(&self, error: CartaError) -> CartaError {
        let body = self
            .body_extractor
            .as_ref()
            .and_then(|extract| extract(&error))
            .or_else(|| error.body().cloned())
            .unwrap_or_else(ErrorBody::generic_failure);

        CartaError::new(CartaErrorKind::TransactionFailure)
            .with_op("execute_transactional_operation")
            .with_message("Transactional operation failed")
            .with_body(body)
            .with_source(error)
    }
}
