/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Keys under which the versions of the store are persisted in the user-provided
//! [key-value store](super::kv_store::KVStore).
//!
//! ## Single values
//!
//! - [ROOT]: the [StateId](super::StateId) of the head store.
//! - [PAST_STORES]: the list of the ids of the past stores not yet garbage-collected.
//!
//! ## Mappings
//!
//! Mappings from a state id are stored under the concatenation of a one-byte prefix and
//! the bytes of the id:
//! - [LAYERS]: the layer record of the store;
//! - [CHILDREN]: how many persisted layers have this one as parent;
//! - [ROOTED]: present as long as the store has not been garbage-collected.

pub const ROOT: &[u8] = b"root";
pub const PAST_STORES: &[u8] = b"past stores";

pub const LAYERS: [u8; 1] = [0];
pub const CHILDREN: [u8; 1] = [1];
pub const ROOTED: [u8; 1] = [2];

/// Takes references to two byteslices and returns a vector containing the bytes of the first one,
/// and then the bytes of the second one.
pub(crate) fn combine(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
