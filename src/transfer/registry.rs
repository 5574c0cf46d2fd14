//! Registry of live transfer records
//!
//! The map lock is held only for insert, lookup and removal; per-record
//! state has its own lock inside [`Transfer`].

use super::Transfer;
use crate::types::{TransferId, TransferInfo};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Map of transfer id to record
#[derive(Debug, Default)]
pub struct TransferRegistry {
    transfers: RwLock<HashMap<TransferId, Arc<Transfer>>>,
}

impl TransferRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any previous record with the same id
    pub async fn insert(&self, transfer: Arc<Transfer>) {
        self.transfers
            .write()
            .await
            .insert(transfer.id().clone(), transfer);
    }

    /// Insert a record unless the id is already taken; returns whether it was inserted
    pub async fn insert_if_absent(&self, transfer: Arc<Transfer>) -> bool {
        let mut transfers = self.transfers.write().await;
        if transfers.contains_key(transfer.id()) {
            return false;
        }
        transfers.insert(transfer.id().clone(), transfer);
        true
    }

    /// Look up a record
    pub async fn get(&self, id: &TransferId) -> Option<Arc<Transfer>> {
        self.transfers.read().await.get(id).cloned()
    }

    /// Whether a record exists
    pub async fn contains(&self, id: &TransferId) -> bool {
        self.transfers.read().await.contains_key(id)
    }

    /// Remove a record
    pub async fn remove(&self, id: &TransferId) -> Option<Arc<Transfer>> {
        self.transfers.write().await.remove(id)
    }

    /// All records, oldest first
    pub async fn list(&self) -> Vec<Arc<Transfer>> {
        let mut transfers: Vec<_> = self.transfers.read().await.values().cloned().collect();
        transfers.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        transfers
    }

    /// Snapshots of all records, oldest first
    pub async fn snapshot(&self) -> Vec<TransferInfo> {
        let mut infos = Vec::new();
        for transfer in self.list().await {
            infos.push(transfer.info().await);
        }
        infos
    }

    /// Keep only records matching `keep`; returns the ids that were dropped
    pub async fn retain<F>(&self, mut keep: F) -> Vec<TransferId>
    where
        F: FnMut(&Transfer) -> bool,
    {
        let mut dropped = Vec::new();
        self.transfers.write().await.retain(|id, transfer| {
            let kept = keep(transfer);
            if !kept {
                dropped.push(id.clone());
            }
            kept
        });
        dropped
    }

    /// Number of records
    pub async fn len(&self) -> usize {
        self.transfers.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
