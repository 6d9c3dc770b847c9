//! Flow ownership registry
//!
//! Maps producer and consumer ids to the user that owns the remote side,
//! so quality samples can be attributed.

use super::types::MediaKind;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Who a flow belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOwner {
    /// Owning user
    pub user_id: String,
    /// Flow kind
    pub kind: MediaKind,
}

/// Lookup of flow owners by producer or consumer id
pub trait OwnerResolver: Send + Sync {
    fn resolve_owner(&self, id: &str) -> Option<FlowOwner>;
}

/// Shared in-memory owner registry
#[derive(Debug, Clone, Default)]
pub struct OwnerRegistry {
    owners: Arc<RwLock<HashMap<String, FlowOwner>>>,
}

impl OwnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the owner of a flow id
    pub fn register(&self, id: impl Into<String>, owner: FlowOwner) {
        self.owners.write().insert(id.into(), owner);
    }

    pub fn remove(&self, id: &str) -> Option<FlowOwner> {
        self.owners.write().remove(id)
    }

    /// Drop every entry owned by `user_id`, returning the removed ids
    pub fn remove_user(&self, user_id: &str) -> Vec<String> {
        let mut owners = self.owners.write();
        let ids: Vec<String> = owners
            .iter()
            .filter(|(_, owner)| owner.user_id == user_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            owners.remove(id);
        }
        ids
    }

    pub fn clear(&self) {
        self.owners.write().clear();
    }

    pub fn len(&self) -> usize {
        self.owners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.read().is_empty()
    }
}

impl OwnerResolver for OwnerRegistry {
    fn resolve_owner(&self, id: &str) -> Option<FlowOwner> {
        self.owners.read().get(id).cloned()
    }
}
