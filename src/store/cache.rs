/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The cache of a store: values derived from the state in store that are expensive to recompute.
//!
//! A [StoreCache] is a value type. Every `with_*` method yields a new cache and leaves the receiver
//! untouched, so that a [Store](super::Store) and the transformations begun from it never observe
//! each other's changes. The two bounded maps (class loaders and signature checks) are shared
//! between copies, since their entries only depend on data that is never rebound in store. They
//! are replaced by fresh maps when the consensus changes.

use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use lru::LruCache;

use crate::{
    config::ConsensusConfig,
    execution::EngineClassLoader,
    types::{BigInteger, StorageReference, TransactionReference},
};

type ClassLoaders = Arc<Mutex<LruCache<TransactionReference, Arc<dyn EngineClassLoader>>>>;
type Signatures = Arc<Mutex<LruCache<TransactionReference, bool>>>;

#[derive(Clone)]
pub struct StoreCache {
    consensus: ConsensusConfig,
    /// The current gas price, if the node is initialized.
    gas_price: Option<BigInteger>,
    /// The current inflation, in units of 10^-8, if the node is initialized.
    inflation: Option<i64>,
    validators: Option<StorageReference>,
    gas_station: Option<StorageReference>,
    versions: Option<StorageReference>,
    class_loaders: ClassLoaders,
    class_loaders_size: NonZeroUsize,
    signatures: Signatures,
}

impl StoreCache {
    pub fn new(
        consensus: ConsensusConfig,
        class_loaders_size: usize,
        signatures_size: usize,
    ) -> Self {
        let class_loaders_size = capacity(class_loaders_size);
        Self {
            consensus,
            gas_price: None,
            inflation: None,
            validators: None,
            gas_station: None,
            versions: None,
            class_loaders: Arc::new(Mutex::new(LruCache::new(class_loaders_size))),
            class_loaders_size,
            signatures: Arc::new(Mutex::new(LruCache::new(capacity(signatures_size)))),
        }
    }

    pub fn consensus(&self) -> &ConsensusConfig {
        &self.consensus
    }

    pub fn gas_price(&self) -> Option<BigInteger> {
        self.gas_price
    }

    pub fn inflation(&self) -> Option<i64> {
        self.inflation
    }

    pub fn validators(&self) -> Option<StorageReference> {
        self.validators
    }

    pub fn gas_station(&self) -> Option<StorageReference> {
        self.gas_station
    }

    pub fn versions(&self) -> Option<StorageReference> {
        self.versions
    }

    pub fn with_consensus(&self, consensus: ConsensusConfig) -> Self {
        Self {
            consensus,
            ..self.clone()
        }
    }

    pub fn with_gas_price(&self, gas_price: BigInteger) -> Self {
        Self {
            gas_price: Some(gas_price),
            ..self.clone()
        }
    }

    pub fn with_inflation(&self, inflation: i64) -> Self {
        Self {
            inflation: Some(inflation),
            ..self.clone()
        }
    }

    pub fn with_validators(&self, validators: StorageReference) -> Self {
        Self {
            validators: Some(validators),
            ..self.clone()
        }
    }

    pub fn with_gas_station(&self, gas_station: StorageReference) -> Self {
        Self {
            gas_station: Some(gas_station),
            ..self.clone()
        }
    }

    pub fn with_versions(&self, versions: StorageReference) -> Self {
        Self {
            versions: Some(versions),
            ..self.clone()
        }
    }

    /// A copy of this cache with an empty map of class loaders, which this cache keeps.
    pub fn invalidate_class_loaders(&self) -> Self {
        Self {
            class_loaders: Arc::new(Mutex::new(LruCache::new(self.class_loaders_size))),
            ..self.clone()
        }
    }

    pub fn class_loader(
        &self,
        classpath: &TransactionReference,
    ) -> Option<Arc<dyn EngineClassLoader>> {
        lock(&self.class_loaders).get(classpath).cloned()
    }

    pub fn put_class_loader(
        &self,
        classpath: TransactionReference,
        class_loader: Arc<dyn EngineClassLoader>,
    ) {
        lock(&self.class_loaders).put(classpath, class_loader);
    }

    pub fn signature_check(&self, reference: &TransactionReference) -> Option<bool> {
        lock(&self.signatures).get(reference).copied()
    }

    pub fn put_signature_check(&self, reference: TransactionReference, is_valid: bool) {
        lock(&self.signatures).put(reference, is_valid);
    }
}

impl std::fmt::Debug for StoreCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCache")
            .field("consensus", &self.consensus)
            .field("gas_price", &self.gas_price)
            .field("inflation", &self.inflation)
            .field("validators", &self.validators)
            .field("gas_station", &self.gas_station)
            .field("versions", &self.versions)
            .finish_non_exhaustive()
    }
}

fn capacity(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
