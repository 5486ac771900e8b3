/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The versioned object store.
//!
//! A [Store] is an immutable snapshot of the whole state of the node. New snapshots are only
//! produced by [StoreTransformation::finalize], after a batch of transactions has been delivered
//! to a transformation begun from an older snapshot. Snapshots are chains of [layers](layer) and
//! are persisted through [StoreVersions] into a user-provided [KVStore].

use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::HASH_LENGTH;

pub mod cache;
pub use cache::*;

pub mod kv_store;
pub use kv_store::*;

pub mod layer;
pub use layer::{Layer, LayerRecord};

pub mod mem_db;
pub use mem_db::*;

pub mod paths;

#[allow(clippy::module_inception)]
pub mod store;
pub use store::*;

pub mod transformation;
pub use transformation::*;

pub mod versions;
pub use versions::*;

pub mod write_batch;
pub use write_batch::*;

/// The identifier of a version of the store: the hash of its newest layer.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct StateId(pub [u8; HASH_LENGTH]);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
