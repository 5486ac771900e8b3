/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! An immutable snapshot of the state of the node.

use std::sync::Arc;

use crate::{
    config::{ConsensusConfig, LocalNodeConfig, RewardPolicy},
    error::StoreError,
    execution::{governance, ExecutionEngine, ExecutionEnvironment},
    types::{StorageReference, TransactionReference, TransactionRequest, TransactionResponse},
};

use super::{Layer, StateId, StoreCache, StoreTransformation};

/// A version of the store: the requests and responses committed so far, the histories of the
/// objects they created or modified, and the cache of the values derived from them.
#[derive(Clone)]
pub struct Store {
    pub(crate) layer: Arc<Layer>,
    pub(crate) cache: StoreCache,
    pub(crate) engine: Arc<dyn ExecutionEngine>,
    pub(crate) max_layer_depth: usize,
    /// The time of the transactions that produced this store.
    pub(crate) now: u64,
}

impl Store {
    /// The store of a node that has not executed any transaction yet.
    pub fn empty(engine: Arc<dyn ExecutionEngine>, config: &LocalNodeConfig) -> Self {
        Self::from_layer(Layer::empty(), engine, config)
    }

    /// A store whose contents are those of `layer` and of its ancestors. Its cache is fresh and
    /// needs a [reload](Store::reload_caches) if the store is initialized.
    pub fn from_layer(
        layer: Arc<Layer>,
        engine: Arc<dyn ExecutionEngine>,
        config: &LocalNodeConfig,
    ) -> Self {
        Self {
            layer,
            cache: StoreCache::new(
                config.consensus.clone(),
                config.class_loaders_cache_size,
                config.signatures_cache_size,
            ),
            engine,
            max_layer_depth: config.max_layer_depth,
            now: 0,
        }
    }

    pub fn state_id(&self) -> StateId {
        self.layer.id()
    }

    pub fn layer(&self) -> &Arc<Layer> {
        &self.layer
    }

    pub fn get_request(&self, reference: &TransactionReference) -> Option<&TransactionRequest> {
        self.layer.request(reference)
    }

    pub fn get_response(&self, reference: &TransactionReference) -> Option<&TransactionResponse> {
        self.layer.response(reference)
    }

    /// The message of the rejection of a request that was delivered but never got a response.
    pub fn get_error(&self, reference: &TransactionReference) -> Option<&str> {
        if self.layer.response(reference).is_some() {
            return None;
        }
        self.layer.error(reference).map(String::as_str)
    }

    /// The history of an object, newest transaction first. It ends with the transaction that
    /// created the object.
    pub fn get_history(&self, object: &StorageReference) -> Option<&[TransactionReference]> {
        self.layer.history(object).map(Vec::as_slice)
    }

    pub fn get_manifest(&self) -> Option<StorageReference> {
        self.layer.manifest()
    }

    /// Starts a transformation of this store, that executes its transactions at time `now`
    /// under the given consensus.
    pub fn begin_transformation(
        &self,
        consensus: ConsensusConfig,
        now: u64,
        reward_policy: RewardPolicy,
    ) -> StoreTransformation {
        let cache = if &consensus == self.cache.consensus() {
            self.cache.clone()
        } else {
            self.cache.with_consensus(consensus)
        };
        StoreTransformation::new(self.clone(), cache, now, reward_policy)
    }

    /// A copy of this store whose cache has been recomputed from the governance contracts.
    pub fn reload_caches(&self) -> Result<Store, StoreError> {
        if self.get_manifest().is_none() {
            return Ok(self.clone());
        }
        Ok(Store {
            cache: reloaded_cache(self)?,
            ..self.clone()
        })
    }
}

impl ExecutionEnvironment for Store {
    fn request(&self, reference: &TransactionReference) -> Option<&TransactionRequest> {
        self.get_request(reference)
    }

    fn response(&self, reference: &TransactionReference) -> Option<&TransactionResponse> {
        self.get_response(reference)
    }

    fn history(&self, object: &StorageReference) -> Option<&[TransactionReference]> {
        self.get_history(object)
    }

    fn manifest(&self) -> Option<StorageReference> {
        self.get_manifest()
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn cache(&self) -> &StoreCache {
        &self.cache
    }

    fn engine(&self) -> &dyn ExecutionEngine {
        self.engine.as_ref()
    }
}

/// Recomputes every value of the cache of an initialized environment: the references to the
/// governance contracts, the consensus, the gas price and the inflation.
pub(crate) fn reloaded_cache(env: &dyn ExecutionEnvironment) -> Result<StoreCache, StoreError> {
    let mut cache = env.cache().clone();
    if let Some(validators) = governance::extract_validators(env)? {
        cache = cache.with_validators(validators);
    }
    if let Some(gas_station) = governance::extract_gas_station(env)? {
        cache = cache.with_gas_station(gas_station);
    }
    if let Some(versions) = governance::extract_versions(env)? {
        cache = cache.with_versions(versions);
    }
    cache = cache
        .with_consensus(governance::extract_consensus(env)?)
        .invalidate_class_loaders();
    if let Some(gas_price) = governance::extract_gas_price(env)? {
        cache = cache.with_gas_price(gas_price);
    }
    if let Some(inflation) = governance::extract_inflation(env)? {
        cache = cache.with_inflation(inflation);
    }
    Ok(cache)
}
