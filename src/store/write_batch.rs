/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines the [WriteBatch] trait, which the key-value store provided by the user must support,
//! and [StoreWriteBatch], which writes the variables described in [paths](super::paths).

use borsh::BorshSerialize;

use super::{layer::LayerRecord, paths, paths::combine, StateId};

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// A typed wrapper over a [WriteBatch], applied atomically by [KVStore::write](super::KVStore::write).
pub struct StoreWriteBatch<W: WriteBatch>(pub(crate) W);

impl<W: WriteBatch> StoreWriteBatch<W> {
    pub fn new() -> Self {
        Self(W::new())
    }

    pub fn set_root(&mut self, id: &StateId) {
        self.0.set(paths::ROOT, &encode(id));
    }

    pub fn set_past_stores(&mut self, ids: &Vec<StateId>) {
        self.0.set(paths::PAST_STORES, &encode(ids));
    }

    pub fn set_layer(&mut self, id: &StateId, record: &LayerRecord) {
        self.0.set(&combine(&paths::LAYERS, &id.0), &encode(record));
    }

    pub fn delete_layer(&mut self, id: &StateId) {
        self.0.delete(&combine(&paths::LAYERS, &id.0));
        self.0.delete(&combine(&paths::CHILDREN, &id.0));
    }

    pub fn set_children(&mut self, id: &StateId, children: u32) {
        if children == 0 {
            self.0.delete(&combine(&paths::CHILDREN, &id.0));
        } else {
            self.0.set(&combine(&paths::CHILDREN, &id.0), &encode(&children));
        }
    }

    pub fn set_rooted(&mut self, id: &StateId) {
        self.0.set(&combine(&paths::ROOTED, &id.0), &[]);
    }

    pub fn delete_rooted(&mut self, id: &StateId) {
        self.0.delete(&combine(&paths::ROOTED, &id.0));
    }
}

impl<W: WriteBatch> Default for StoreWriteBatch<W> {
    fn default() -> Self {
        Self::new()
    }
}

fn encode<T: BorshSerialize>(value: &T) -> Vec<u8> {
    value.try_to_vec().unwrap_or_default()
}
