/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Persistence of the versions of the store.
//!
//! Every finalized store is persisted as its newest [layer](super::layer) and marked as *rooted*.
//! The head of the node is recorded under [ROOT](super::paths::ROOT), and every store that stops
//! being the head is appended to [PAST_STORES](super::paths::PAST_STORES), where it waits for the
//! garbage collector. Freeing a store unroots it; its layer is deleted as soon as no other persisted
//! layer has it as parent, and the deletion cascades to the ancestors that became unreachable.

use std::sync::Arc;

use crate::error::StoreError;

use super::{KVGet, KVStore, Layer, StateId, StoreWriteBatch};

pub struct StoreVersions<K: KVStore> {
    kv_store: K,
}

impl<K: KVStore> StoreVersions<K> {
    pub fn new(kv_store: K) -> Self {
        Self { kv_store }
    }

    pub fn root(&self) -> Result<Option<StateId>, StoreError> {
        Ok(self.kv_store.root()?)
    }

    pub fn past_stores(&self) -> Result<Vec<StateId>, StoreError> {
        Ok(self.kv_store.past_stores()?)
    }

    pub fn is_rooted(&self, id: &StateId) -> bool {
        self.kv_store.is_rooted(id)
    }

    /// True if the layer of the store `id` is still persisted.
    pub fn contains(&self, id: &StateId) -> Result<bool, StoreError> {
        Ok(self.kv_store.layer(id)?.is_some())
    }

    /// Persists the newest layer of a store and roots it. Its ancestors must have been persisted
    /// already.
    pub fn persist(&mut self, layer: &Layer) -> Result<(), StoreError> {
        let id = layer.id();
        let mut wb = StoreWriteBatch::<K::WriteBatch>::new();
        if self.kv_store.layer(&id)?.is_none() {
            wb.set_layer(&id, layer.record());
            if let Some(parent) = layer.record().parent {
                let children = self.kv_store.children(&parent)?;
                wb.set_children(&parent, children + 1);
            }
        }
        wb.set_rooted(&id);
        self.kv_store.write(wb.0);
        Ok(())
    }

    /// Makes `new` the head store. If `old` is given, it becomes a past store.
    pub fn move_root(&mut self, old: Option<StateId>, new: StateId) -> Result<(), StoreError> {
        let mut wb = StoreWriteBatch::<K::WriteBatch>::new();
        wb.set_root(&new);
        if let Some(old) = old.filter(|old| *old != new) {
            let mut past_stores = self.kv_store.past_stores()?;
            if !past_stores.contains(&old) {
                past_stores.push(old);
                wb.set_past_stores(&past_stores);
            }
        }
        self.kv_store.write(wb.0);
        Ok(())
    }

    /// Loads the store `id`, with all its layers.
    pub fn checkout(&self, id: &StateId) -> Result<Arc<Layer>, StoreError> {
        let mut records = Vec::new();
        let mut next = Some(*id);
        while let Some(current) = next {
            let record = self
                .kv_store
                .layer(&current)?
                .ok_or(StoreError::UnknownStore(current))?;
            next = record.parent;
            records.push(record);
        }

        let mut layer: Option<Arc<Layer>> = None;
        for record in records.into_iter().rev() {
            layer = Some(Layer::new(record, layer));
        }
        layer.ok_or(StoreError::UnknownStore(*id))
    }

    /// Frees the store `id`: it gets unrooted and removed from the past stores, and its layer,
    /// together with its unreachable ancestors, is deleted.
    pub fn free(&mut self, id: &StateId) -> Result<(), StoreError> {
        let mut wb = StoreWriteBatch::<K::WriteBatch>::new();
        wb.delete_rooted(id);

        let mut past_stores = self.kv_store.past_stores()?;
        past_stores.retain(|past| past != id);
        wb.set_past_stores(&past_stores);

        // walk the chain of ancestors while they are unrooted and childless
        let mut candidate = Some(*id);
        let mut removed_child = false;
        while let Some(current) = candidate {
            let record = match self.kv_store.layer(&current)? {
                Some(record) => record,
                None => break,
            };
            let mut children = self.kv_store.children(&current)?;
            if removed_child {
                children = children.saturating_sub(1);
                wb.set_children(&current, children);
            }
            let rooted = current != *id && self.kv_store.is_rooted(&current);
            if rooted || children > 0 {
                break;
            }
            wb.delete_layer(&current);
            removed_child = true;
            candidate = record.parent;
        }

        self.kv_store.write(wb.0);
        Ok(())
    }
}
