/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Layers are the immutable building blocks of the versions of the store.
//!
//! A version of the store is a chain of layers, from the newest to the oldest. Each layer holds
//! the requests, responses, rejection messages and histories written by one finalized
//! [StoreTransformation](super::StoreTransformation). Lookups walk the chain from the newest layer
//! and stop at the first layer that knows the key, so that consecutive versions share all their
//! older layers. When a chain gets deeper than a configurable bound, the newest layer is flattened:
//! it absorbs the contents of all its ancestors and becomes a root layer.

use std::{collections::BTreeMap, sync::Arc};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    crypto::sha256,
    types::{StorageReference, TransactionReference, TransactionRequest, TransactionResponse},
};

use super::StateId;

/// The persisted contents of a layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LayerRecord {
    pub parent: Option<StateId>,
    /// Number of ancestors of the layer.
    pub depth: u32,
    pub requests: BTreeMap<TransactionReference, TransactionRequest>,
    pub responses: BTreeMap<TransactionReference, TransactionResponse>,
    pub errors: BTreeMap<TransactionReference, String>,
    pub histories: BTreeMap<StorageReference, Vec<TransactionReference>>,
    /// The manifest as of this version of the store.
    pub manifest: Option<StorageReference>,
}

impl LayerRecord {
    /// The id of the store whose newest layer is this record. It depends on the parent too,
    /// so that equal deltas on top of different stores get different ids.
    pub fn state_id(&self) -> StateId {
        StateId(sha256(&self.try_to_vec().unwrap_or_default()))
    }
}

/// A layer of a store in memory, linked to its parent layer.
#[derive(Debug)]
pub struct Layer {
    id: StateId,
    record: LayerRecord,
    parent: Option<Arc<Layer>>,
}

impl Layer {
    /// The single layer of the empty store.
    pub fn empty() -> Arc<Self> {
        let record = LayerRecord::default();
        Arc::new(Self {
            id: record.state_id(),
            record,
            parent: None,
        })
    }

    /// Links a record to its parent layer in memory. `record.parent` must be the id of `parent`.
    pub fn new(record: LayerRecord, parent: Option<Arc<Layer>>) -> Arc<Self> {
        Arc::new(Self {
            id: record.state_id(),
            record,
            parent,
        })
    }

    /// Pushes a new layer on top of `parent`. If the resulting chain would have more than
    /// `max_depth` ancestors, the new layer is flattened instead.
    pub fn push(parent: &Arc<Layer>, mut delta: LayerRecord, max_depth: usize) -> Arc<Self> {
        if parent.record.depth as usize + 1 > max_depth {
            let mut flat = parent.flatten();
            flat.requests.append(&mut delta.requests);
            flat.responses.append(&mut delta.responses);
            flat.errors.append(&mut delta.errors);
            flat.histories.append(&mut delta.histories);
            flat.manifest = delta.manifest;
            flat.errors.retain(|reference, _| !flat.responses.contains_key(reference));
            Layer::new(flat, None)
        } else {
            delta.parent = Some(parent.id);
            delta.depth = parent.record.depth + 1;
            Layer::new(delta, Some(Arc::clone(parent)))
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn record(&self) -> &LayerRecord {
        &self.record
    }

    pub fn depth(&self) -> u32 {
        self.record.depth
    }

    pub fn parent(&self) -> Option<&Arc<Layer>> {
        self.parent.as_ref()
    }

    pub fn manifest(&self) -> Option<StorageReference> {
        self.record.manifest
    }

    pub fn request(&self, reference: &TransactionReference) -> Option<&TransactionRequest> {
        self.find(|record| record.requests.get(reference))
    }

    pub fn response(&self, reference: &TransactionReference) -> Option<&TransactionResponse> {
        self.find(|record| record.responses.get(reference))
    }

    pub fn error(&self, reference: &TransactionReference) -> Option<&String> {
        self.find(|record| record.errors.get(reference))
    }

    pub fn history(&self, object: &StorageReference) -> Option<&Vec<TransactionReference>> {
        self.find(|record| record.histories.get(object))
    }

    fn find<'a, T, F>(&'a self, lookup: F) -> Option<&'a T>
    where
        F: Fn(&'a LayerRecord) -> Option<&'a T>,
    {
        let mut current = Some(self);
        while let Some(layer) = current {
            if let Some(found) = lookup(&layer.record) {
                return Some(found);
            }
            current = layer.parent.as_deref();
        }
        None
    }

    /// Merges this layer and all its ancestors into a single root record.
    fn flatten(&self) -> LayerRecord {
        let mut chain = Vec::with_capacity(self.record.depth as usize + 1);
        let mut current = Some(self);
        while let Some(layer) = current {
            chain.push(&layer.record);
            current = layer.parent.as_deref();
        }

        let mut flat = LayerRecord::default();
        for record in chain.into_iter().rev() {
            flat.requests.extend(record.requests.iter().map(|(k, v)| (*k, v.clone())));
            flat.responses.extend(record.responses.iter().map(|(k, v)| (*k, v.clone())));
            flat.errors.extend(record.errors.iter().map(|(k, v)| (*k, v.clone())));
            flat.histories.extend(record.histories.iter().map(|(k, v)| (*k, v.clone())));
        }
        flat.manifest = self.record.manifest;
        flat
    }
}
