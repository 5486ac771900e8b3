/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A store transformation accumulates the effects of the transactions delivered to it, on top of
//! the [Store] it was begun from, and is eventually [finalized](StoreTransformation::finalize)
//! into a new store.
//!
//! Lookups check the deltas of the transformation first and fall back to the base store, so that
//! a transaction sees the effects of all the transactions delivered before it. The base store is
//! never modified.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, error, info, warn};

use crate::{
    config::RewardPolicy,
    constants,
    error::{DeliveryError, StoreError, TransactionRejected},
    execution::{builders, governance, ExecutionEngine, ExecutionEnvironment},
    gas::{GAS_FOR_REWARD, INFLATION_DENOMINATOR},
    types::{
        BigInteger, InstanceMethodCallRequest, RequestHeader, StorageReference, StorageValue,
        TransactionReference, TransactionRequest, TransactionResponse, Update,
    },
};

use super::{store::reloaded_cache, Layer, LayerRecord, Store, StoreCache};

pub struct StoreTransformation {
    base: Store,
    cache: StoreCache,
    now: u64,
    reward_policy: RewardPolicy,
    delta_requests: BTreeMap<TransactionReference, TransactionRequest>,
    delta_responses: BTreeMap<TransactionReference, TransactionResponse>,
    delta_errors: BTreeMap<TransactionReference, String>,
    delta_histories: BTreeMap<StorageReference, Vec<TransactionReference>>,
    manifest: Option<StorageReference>,
    /// The transactions that got a response, in delivery order.
    delivered: Vec<TransactionReference>,
    /// The gas consumed by the transactions since the last reward, penalties excluded.
    gas_consumed: BigInteger,
    /// The coins to distribute to the validators, inflation included.
    reward: BigInteger,
    reward_without_inflation: BigInteger,
    /// The transactions that contributed to the next reward.
    rewarded_count: u64,
}

impl StoreTransformation {
    pub(crate) fn new(
        base: Store,
        cache: StoreCache,
        now: u64,
        reward_policy: RewardPolicy,
    ) -> Self {
        Self {
            manifest: base.get_manifest(),
            base,
            cache,
            now,
            reward_policy,
            delta_requests: BTreeMap::new(),
            delta_responses: BTreeMap::new(),
            delta_errors: BTreeMap::new(),
            delta_histories: BTreeMap::new(),
            delivered: Vec::new(),
            gas_consumed: 0,
            reward: 0,
            reward_without_inflation: 0,
            rewarded_count: 0,
        }
    }

    /// The store this transformation was begun from.
    pub fn base(&self) -> &Store {
        &self.base
    }

    /// The number of transactions delivered with a response.
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    pub fn delivered_references(&self) -> &[TransactionReference] {
        &self.delivered
    }

    /// The transactions whose delivery was rejected.
    pub fn rejected_references(&self) -> impl Iterator<Item = &TransactionReference> {
        self.delta_errors.keys()
    }

    /// True if nothing has been delivered to this transformation.
    pub fn is_empty(&self) -> bool {
        self.delta_requests.is_empty()
    }

    pub fn get_error(&self, reference: &TransactionReference) -> Option<&str> {
        match self.delta_errors.get(reference) {
            Some(message) => Some(message.as_str()),
            None => self.base.get_error(reference),
        }
    }

    /// The coins accumulated for the next reward of the validators, with and without inflation.
    pub fn reward(&self) -> (BigInteger, BigInteger) {
        (self.reward, self.reward_without_inflation)
    }

    pub fn gas_consumed(&self) -> BigInteger {
        self.gas_consumed
    }

    /// Delivers a transaction: its response gets computed and added to this transformation.
    /// A rejected request gets no response, but its message is recorded.
    pub fn deliver(
        &mut self,
        request: TransactionRequest,
    ) -> Result<TransactionResponse, DeliveryError> {
        let reference = self.hasher().hash_request(&request);
        if self.response(&reference).is_some() {
            return Err(DeliveryError::rejected(format!("Repeated request {reference}")));
        }

        debug!("{}: delivering start", reference);
        let env: &dyn ExecutionEnvironment = &*self;
        match builders::build_response(env, reference, &request) {
            Ok(response) => {
                let classpath = request.header().map(|header| header.classpath);
                self.take_note_for_reward(&request, &response);
                self.push(reference, request, response.clone())?;
                info!("{}: delivering success", reference);
                self.update_caches(&response, classpath)?;
                Ok(response)
            }
            Err(DeliveryError::Rejected(rejected)) => {
                let message = rejected.trimmed_message(self.consensus().max_error_length);
                warn!("{}: delivering failed: {}", reference, message);
                self.delta_errors.insert(reference, message.clone());
                self.delta_requests.insert(reference, request);
                Err(TransactionRejected::new(message).into())
            }
            Err(error) => Err(error),
        }
    }

    /// Rewards the validators with the coins accumulated so far, by running a system call on
    /// behalf of the manifest. `behaving` and `misbehaving` are the space-separated identifiers of
    /// the validators that behaved and misbehaved. Does nothing before initialization.
    ///
    /// A reward that cannot be computed is logged and skipped: it will be retried later with the
    /// coins accumulated in the meantime. Yields the response of the reward, if it was committed.
    pub fn deliver_reward(
        &mut self,
        behaving: &str,
        misbehaving: &str,
    ) -> Result<Option<TransactionResponse>, StoreError> {
        let manifest = match self.manifest {
            Some(manifest) => manifest,
            None => return Ok(None),
        };
        let validators = match self.cache.validators() {
            Some(validators) => validators,
            None => match governance::extract_validators(&*self)? {
                Some(validators) => validators,
                None => return Ok(None),
            },
        };
        let classpath = self
            .base_classpath()?
            .ok_or(StoreError::UnknownObject(manifest))?;

        let current_supply =
            self.big_integer_field(&validators, &constants::validators_current_supply_field())?;
        let minted = clamp_minted(
            self.reward - self.reward_without_inflation,
            current_supply,
            self.consensus().final_supply,
        );
        let request = TransactionRequest::InstanceSystemMethodCall(InstanceMethodCallRequest {
            header: RequestHeader {
                caller: manifest,
                nonce: self.nonce(&manifest)?,
                gas_limit: GAS_FOR_REWARD,
                gas_price: 0,
                classpath,
                chain_id: String::new(),
                signature: Vec::new(),
            },
            method: constants::validators_reward(),
            receiver: validators,
            actuals: vec![
                StorageValue::BigInteger(self.reward),
                StorageValue::BigInteger(minted),
                StorageValue::String(behaving.to_string()),
                StorageValue::String(misbehaving.to_string()),
                StorageValue::BigInteger(self.gas_consumed),
                StorageValue::BigInteger(BigInteger::from(self.rewarded_count)),
            ],
        });
        let reference = self.hasher().hash_request(&request);

        // simulate the reward first, it is only pushed if it succeeds
        let env: &dyn ExecutionEnvironment = &*self;
        let response = match builders::build_response(env, reference, &request) {
            Ok(response) => response,
            Err(DeliveryError::Store(error)) => return Err(error),
            Err(DeliveryError::Rejected(rejected)) => {
                error!("could not reward the validators: {}", rejected);
                return Ok(None);
            }
        };
        if let Some(failed) = response.failure() {
            error!(
                "could not reward the validators: {}: {}",
                failed.cause.class_name, failed.cause.message
            );
            return Ok(None);
        }
        if self.reward_policy == RewardPolicy::SkipIfOnlyNonceChanges
            && response.updates().len() <= 1
        {
            debug!("{}: the reward would only change the nonce of the manifest", reference);
            return Ok(None);
        }

        self.push(reference, request, response.clone())?;
        info!("{}: validators rewarded with {} coins, {} minted", reference, self.reward, minted);
        self.update_caches(&response, Some(classpath))?;
        self.gas_consumed = 0;
        self.reward = 0;
        self.reward_without_inflation = 0;
        self.rewarded_count = 0;
        Ok(Some(response))
    }

    /// Freezes this transformation into a new store, on top of its base.
    pub fn finalize(self) -> Store {
        let delta = LayerRecord {
            parent: None,
            depth: 0,
            requests: self.delta_requests,
            responses: self.delta_responses,
            errors: self.delta_errors,
            histories: self.delta_histories,
            manifest: self.manifest,
        };
        Store {
            layer: Layer::push(&self.base.layer, delta, self.base.max_layer_depth),
            cache: self.cache,
            engine: self.base.engine,
            max_layer_depth: self.base.max_layer_depth,
            now: self.now,
        }
    }

    fn push(
        &mut self,
        reference: TransactionReference,
        request: TransactionRequest,
        response: TransactionResponse,
    ) -> Result<(), StoreError> {
        if response.has_updates() {
            self.expand_histories(reference, response.updates())?;
        }
        if let TransactionRequest::Initialization(initialization) = &request {
            self.manifest = Some(initialization.manifest);
        }
        self.delta_errors.remove(&reference);
        self.delta_requests.insert(reference, request);
        self.delta_responses.insert(reference, response);
        self.delivered.push(reference);
        Ok(())
    }

    fn expand_histories(
        &mut self,
        added: TransactionReference,
        updates: &[Update],
    ) -> Result<(), StoreError> {
        let objects: BTreeSet<StorageReference> = updates.iter().map(Update::object).collect();
        for object in objects {
            let history = self.simplified_history(&object, added, updates)?;
            self.delta_histories.insert(object, history);
        }
        Ok(())
    }

    /// The history of `object` after the transaction `added`: the transactions that are needed
    /// to recover the current value of every field of the object, newest first. The last one is
    /// always the creation of the object, which holds its class tag.
    fn simplified_history(
        &self,
        object: &StorageReference,
        added: TransactionReference,
        updates: &[Update],
    ) -> Result<Vec<TransactionReference>, StoreError> {
        if object.transaction == added {
            return Ok(vec![added]);
        }
        let old = self.history(object).ok_or_else(|| {
            StoreError::Inconsistent(
                "the computed response reports a modified object that is not in store".to_string(),
            )
        })?;

        let mut covered: Vec<&Update> = updates.iter().filter(|u| u.object() == *object).collect();
        let mut simplified = vec![added];
        if let Some((creation, older)) = old.split_last() {
            for reference in older {
                let supplied: Vec<&Update> = self
                    .response_with_updates(reference, object)?
                    .updates()
                    .iter()
                    .filter(|u| u.object() == *object)
                    .filter(|u| !covered.iter().any(|c| c.same_property(u)))
                    .collect();
                if !supplied.is_empty() {
                    simplified.push(*reference);
                    covered.extend(supplied);
                }
            }
            simplified.push(*creation);
        }
        Ok(simplified)
    }

    /// Keeps the cache in sync with the governance contracts, which might have been modified
    /// by the response just pushed. The checks on the events can yield false positives, but never
    /// miss a change.
    fn update_caches(
        &mut self,
        response: &TransactionResponse,
        classpath: Option<TransactionReference>,
    ) -> Result<(), StoreError> {
        if let TransactionResponse::Initialization = response {
            self.cache = reloaded_cache(&*self)?;
            info!("the caches have been reloaded after the initialization of the node");
            return Ok(());
        }

        let manifest = match self.manifest {
            Some(manifest) => manifest,
            None => return Ok(()),
        };
        let (events, classpath) = match classpath {
            Some(classpath) if !response.events().is_empty() => (response.events(), classpath),
            _ => return Ok(()),
        };
        let class_loader = self.class_loader(&[classpath]).map_err(|error| {
            StoreError::Inconsistent(format!(
                "cannot reload the class loader of {classpath}: {error}"
            ))
        })?;

        let validators = self.cache.validators();
        let gas_station = self.cache.gas_station();
        let versions = self.cache.versions();
        let (mut consensus_changed, mut gas_price_changed, mut inflation_changed) =
            (false, false, false);
        for event in events {
            let creator = self.reference_field(event, &constants::event_creator_field())?;
            let class_name = self.class_name(event)?;
            if class_loader.is_consensus_update_event(&class_name)
                && (creator == manifest
                    || Some(creator) == validators
                    || Some(creator) == gas_station
                    || Some(creator) == versions)
            {
                consensus_changed = true;
            }
            if class_loader.is_gas_price_update_event(&class_name) && Some(creator) == gas_station {
                gas_price_changed = true;
            }
            if class_loader.is_inflation_update_event(&class_name) && Some(creator) == validators {
                inflation_changed = true;
            }
        }

        if consensus_changed {
            self.recompute_consensus()?;
        }
        if gas_price_changed {
            if let Some(gas_price) = governance::extract_gas_price(&*self)? {
                debug!("the gas price has changed to {}", gas_price);
                self.cache = self.cache.with_gas_price(gas_price);
            }
        }
        if inflation_changed {
            if let Some(inflation) = governance::extract_inflation(&*self)? {
                debug!("the inflation has changed to {}", inflation);
                self.cache = self.cache.with_inflation(inflation);
            }
        }
        Ok(())
    }

    fn recompute_consensus(&mut self) -> Result<(), StoreError> {
        let old_version = self.consensus().verification_version;
        let consensus = governance::extract_consensus(&*self)?;
        let new_version = consensus.verification_version;
        self.cache = self
            .cache
            .with_consensus(consensus)
            .invalidate_class_loaders();
        if old_version != new_version {
            info!(
                "the verification version has changed from {} to {}",
                old_version, new_version
            );
        }
        Ok(())
    }

    fn take_note_for_reward(
        &mut self,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) {
        if request.is_system() || response.is_initial() {
            return;
        }
        let (gas, header) = match (response.gas(), request.header()) {
            (Some(gas), Some(header)) => (gas, header),
            _ => return,
        };
        let consumed = BigInteger::from(gas.total());
        let paid = consumed + BigInteger::from(response.penalty().unwrap_or(0));
        let inflation = BigInteger::from(
            self.cache
                .inflation()
                .unwrap_or(self.consensus().initial_inflation),
        );

        self.gas_consumed += consumed;
        let coins = paid.saturating_mul(header.gas_price);
        self.reward_without_inflation = self.reward_without_inflation.saturating_add(coins);
        self.reward = self.reward.saturating_add(
            coins.saturating_mul(INFLATION_DENOMINATOR + inflation) / INFLATION_DENOMINATOR,
        );
        self.rewarded_count += 1;
    }
}

/// Corrects the coins to mint so that the current supply does not cross the final supply,
/// in either direction. A supply that moves away from the final supply is left alone.
fn clamp_minted(
    minted: BigInteger,
    current_supply: BigInteger,
    final_supply: BigInteger,
) -> BigInteger {
    let after = current_supply.saturating_add(minted);
    let crosses_from_below = minted > 0 && current_supply <= final_supply && after > final_supply;
    let crosses_from_above = minted < 0 && current_supply >= final_supply && after < final_supply;
    if crosses_from_below || crosses_from_above {
        final_supply - current_supply
    } else {
        minted
    }
}

impl ExecutionEnvironment for StoreTransformation {
    fn request(&self, reference: &TransactionReference) -> Option<&TransactionRequest> {
        self.delta_requests
            .get(reference)
            .or_else(|| self.base.get_request(reference))
    }

    fn response(&self, reference: &TransactionReference) -> Option<&TransactionResponse> {
        self.delta_responses
            .get(reference)
            .or_else(|| self.base.get_response(reference))
    }

    fn history(&self, object: &StorageReference) -> Option<&[TransactionReference]> {
        match self.delta_histories.get(object) {
            Some(history) => Some(history.as_slice()),
            None => self.base.get_history(object),
        }
    }

    fn manifest(&self) -> Option<StorageReference> {
        self.manifest
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn cache(&self) -> &StoreCache {
        &self.cache
    }

    fn engine(&self) -> &dyn ExecutionEngine {
        self.base.engine.as_ref()
    }
}
