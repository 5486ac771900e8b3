/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines the [KVStore] trait, which specifies the required interface for the key-value store provided
//! by the user.
//!
//! Given a method to obtain the value for a given key in bytes, this module also provides methods to
//! obtain the variables stored in the key-value store, as described in [paths](super::paths).

use std::fmt::Display;

use borsh::BorshDeserialize;

use super::{layer::LayerRecord, paths, paths::combine, write_batch::WriteBatch, StateId};

pub trait KVStore: KVGet + Clone + Send + Sync + 'static {
    type WriteBatch: WriteBatch;

    fn write(&mut self, wb: Self::WriteBatch);
    fn clear(&mut self);
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn root(&self) -> Result<Option<StateId>, KVGetError> {
        self.get(paths::ROOT)
            .map(|bytes| deserialize(Key::Root, &bytes))
            .transpose()
    }

    fn past_stores(&self) -> Result<Vec<StateId>, KVGetError> {
        match self.get(paths::PAST_STORES) {
            Some(bytes) => deserialize(Key::PastStores, &bytes),
            None => Ok(Vec::new()),
        }
    }

    fn layer(&self, id: &StateId) -> Result<Option<LayerRecord>, KVGetError> {
        self.get(&combine(&paths::LAYERS, &id.0))
            .map(|bytes| deserialize(Key::Layer { id: *id }, &bytes))
            .transpose()
    }

    fn children(&self, id: &StateId) -> Result<u32, KVGetError> {
        match self.get(&combine(&paths::CHILDREN, &id.0)) {
            Some(bytes) => deserialize(Key::Children { id: *id }, &bytes),
            None => Ok(0),
        }
    }

    fn is_rooted(&self, id: &StateId) -> bool {
        self.get(&combine(&paths::ROOTED, &id.0)).is_some()
    }
}

fn deserialize<T: BorshDeserialize>(key: Key, bytes: &[u8]) -> Result<T, KVGetError> {
    T::try_from_slice(bytes).map_err(|err| KVGetError::DeserializeValueError {
        key,
        message: err.to_string(),
    })
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum KVGetError {
    #[error("cannot deserialize the value at {key}: {message}")]
    DeserializeValueError { key: Key, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    Root,
    PastStores,
    Layer { id: StateId },
    Children { id: StateId },
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Root => write!(f, "Root"),
            Key::PastStores => write!(f, "Past Stores"),
            Key::Layer { id } => write!(f, "Layer for {}", id),
            Key::Children { id } => write!(f, "Children of {}", id),
        }
    }
}
