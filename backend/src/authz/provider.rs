//! Permission set resolution and caching.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// Source of truth for the permission codes attached to a role.
///
/// An unknown role resolves to the empty set, never to an error: evaluation
/// fails closed to "no permissions". Results are snapshots; callers must not
/// assume later mutations are reflected in a set already handed out.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// All permission codes granted to the role; empty when the role has
    /// none or does not exist.
    async fn codes_for_role(&self, role_id: Uuid) -> Result<Arc<HashSet<String>>>;
}

/// Read-through cache over a [`PermissionSource`].
///
/// Entries live until explicitly invalidated after an assignment change;
/// there is no time-based expiry. The epoch counter discards fills that
/// raced with an invalidation, so a stale set can never be re-inserted
/// after its role was refreshed.
pub struct PermissionCache {
    inner: Arc<dyn PermissionSource>,
    state: RwLock<CacheState>,
}

struct CacheState {
    epoch: u64,
    sets: HashMap<Uuid, Arc<HashSet<String>>>,
}

impl PermissionCache {
    pub fn new(inner: Arc<dyn PermissionSource>) -> Self {
        Self {
            inner,
            state: RwLock::new(CacheState {
                epoch: 0,
                sets: HashMap::new(),
            }),
        }
    }

    /// Drop the cached set for one role. Called after its assignments change.
    pub async fn invalidate(&self, role_id: Uuid) {
        let mut state = self.state.write().await;
        state.epoch += 1;
        state.sets.remove(&role_id);
    }

    /// Drop every cached set.
    pub async fn invalidate_all(&self) {
        let mut state = self.state.write().await;
        state.epoch += 1;
        state.sets.clear();
    }

    /// Number of cached role entries.
    pub async fn len(&self) -> usize {
        self.state.read().await.sets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.sets.is_empty()
    }
}

#[async_trait]
impl PermissionSource for PermissionCache {
    async fn codes_for_role(&self, role_id: Uuid) -> Result<Arc<HashSet<String>>> {
        let fill_epoch = {
            let state = self.state.read().await;
            if let Some(set) = state.sets.get(&role_id) {
                return Ok(set.clone());
            }
            state.epoch
        };

        // Lock released during the store round trip.
        let set = self.inner.codes_for_role(role_id).await?;

        let mut state = self.state.write().await;
        if state.epoch == fill_epoch {
            state.sets.insert(role_id, set.clone());
        }
        Ok(set)
    }
}

/// In-memory permission source, used by tests and tooling that run without
/// a database.
#[derive(Default)]
pub struct InMemoryPermissionSource {
    sets: RwLock<HashMap<Uuid, Arc<HashSet<String>>>>,
}

impl InMemoryPermissionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full code set for a role.
    pub async fn set_role(&self, role_id: Uuid, codes: &[&str]) {
        let set: HashSet<String> = codes.iter().map(|c| c.to_string()).collect();
        self.sets.write().await.insert(role_id, Arc::new(set));
    }

    pub async fn clear_role(&self, role_id: Uuid) {
        self.sets.write().await.remove(&role_id);
    }
}

#[async_trait]
impl PermissionSource for InMemoryPermissionSource {
    async fn codes_for_role(&self, role_id: Uuid) -> Result<Arc<HashSet<String>>> {
        let sets = self.sets.read().await;
        Ok(sets
            .get(&role_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(HashSet::new())))
    }
}
