//! Fills reported by the broker, waiting to be committed.

use std::collections::HashMap;

use tokio::sync::{Mutex, MutexGuard};

use crate::domain::playground::FillEntry;
use crate::domain::shared::{ExternalOrderId, PlaygroundId};

/// A broker fill waiting to be applied to a reconcile order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionFillRequest {
    /// Reconcile playground holding the order.
    pub playground_id: PlaygroundId,
    /// The fill.
    pub fill: FillEntry,
}

/// Broker fills keyed by broker order id.
///
/// Callers that iterate take the whole map with [`OrderCache::get_map`] and
/// hold it until they are done.
#[derive(Debug, Default)]
pub struct OrderCache {
    entries: Mutex<HashMap<ExternalOrderId, ExecutionFillRequest>>,
}

impl OrderCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache a fill. A second fill for the same broker order replaces the
    /// first; returns true if the key was new.
    pub async fn insert(&self, external_id: ExternalOrderId, entry: ExecutionFillRequest) -> bool {
        self.entries.lock().await.insert(external_id, entry).is_none()
    }

    /// Lock the cache for iteration.
    pub async fn get_map(&self) -> MutexGuard<'_, HashMap<ExternalOrderId, ExecutionFillRequest>> {
        self.entries.lock().await
    }

    /// Number of cached fills.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns true if nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
