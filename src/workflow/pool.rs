//! Admission control
//!
//! Two concerns live here. [`InFlightRegistry`] enforces at-most-one
//! execution per document identity: a second `process` call for an id that
//! is already running is rejected, not coalesced. [`WorkerPool`] bounds how
//! many documents are processed concurrently so the inference and
//! file-operations collaborators see bounded load; excess documents queue
//! on the semaphore.

use super::engine::WorkflowEngine;
use super::state::{Document, FinalOutcome};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Tracks document identities currently being processed.
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    inner: Arc<Mutex<HashSet<Uuid>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an identity. `None` means another execution holds it; the
    /// returned guard releases the claim on drop, terminal outcome
    /// included.
    pub fn claim(&self, id: Uuid) -> Option<InFlightGuard> {
        let mut ids = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if ids.insert(id) {
            Some(InFlightGuard {
                id,
                inner: Arc::clone(&self.inner),
            })
        } else {
            None
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// RAII claim on a document identity.
pub struct InFlightGuard {
    id: Uuid,
    inner: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}

/// Bounded-concurrency front door for the engine.
pub struct WorkerPool {
    engine: Arc<WorkflowEngine>,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(engine: Arc<WorkflowEngine>, max_concurrency: usize) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Process a batch of documents, at most `max_concurrency` at a time.
    /// Outcomes come back in completion order.
    pub async fn process_all(&self, documents: Vec<Document>) -> Vec<FinalOutcome> {
        let mut handles = Vec::with_capacity(documents.len());

        for document in documents {
            let engine = Arc::clone(&self.engine);
            let permits = Arc::clone(&self.permits);

            handles.push(tokio::spawn(async move {
                // Admission: wait for a slot before any stage runs.
                let _permit = permits.acquire_owned().await;
                engine.process(document).await
            }));
        }

        join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(outcome) => Some(outcome),
                Err(join_err) => {
                    tracing::error!("[Pool] Worker task panicked: {}", join_err);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_per_identity() {
        let registry = InFlightRegistry::new();
        let id = Uuid::new_v4();

        let guard = registry.claim(id);
        assert!(guard.is_some());
        assert!(registry.claim(id).is_none());
        assert_eq!(registry.in_flight(), 1);

        drop(guard);
        assert_eq!(registry.in_flight(), 0);
        assert!(registry.claim(id).is_some());
    }

    #[test]
    fn test_distinct_identities_coexist() {
        let registry = InFlightRegistry::new();
        let a = registry.claim(Uuid::new_v4());
        let b = registry.claim(Uuid::new_v4());
        assert!(a.is_some() && b.is_some());
        assert_eq!(registry.in_flight(), 2);
    }
}
