/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Configuration of the engine.
//!
//! [ConsensusConfig] holds the parameters that all nodes of a network must agree upon. After the
//! node gets initialized, they are read back from the governance contracts reachable from the
//! manifest, so that they can change through transactions. [LocalNodeConfig] holds the parameters
//! that only affect this node.

use std::time::Duration;

use borsh::{BorshDeserialize, BorshSerialize};
use typed_builder::TypedBuilder;

use crate::{crypto::SignatureAlgorithm, gas::GasCostModel, types::BigInteger};

/// The consensus parameters of a network.
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder, BorshSerialize, BorshDeserialize)]
#[builder(builder_method(doc = "
    Create a builder for building a [ConsensusConfig]. Every parameter is optional
    and falls back to its default.
"))]
pub struct ConsensusConfig {
    #[builder(default, setter(into, doc = "Set the chain identifier that signed requests must report."))]
    pub chain_id: String,
    #[builder(default = 1_000_000_000, setter(doc = "Set the maximal gas limit of a request."))]
    pub max_gas_per_transaction: u64,
    #[builder(default = false, setter(doc = "Set whether the gas price of requests is ignored."))]
    pub ignores_gas_price: bool,
    #[builder(default = 100, setter(doc = "Set the gas price at initialization time."))]
    pub initial_gas_price: BigInteger,
    #[builder(default = 1_000_000_000_000_000_000_000_000_000_000, setter(doc = "Set the supply that minting can never cross."))]
    pub final_supply: BigInteger,
    #[builder(default = 0, setter(doc = "Set the initial inflation, in units of 10^-8."))]
    pub initial_inflation: i64,
    #[builder(default = 300, setter(doc = "Set the maximal length of the error messages kept in store."))]
    pub max_error_length: usize,
    #[builder(default = 0, setter(doc = "Set the version of the verification rules of the code."))]
    pub verification_version: u64,
    #[builder(default = SignatureAlgorithm::Ed25519, setter(doc = "Set the default signature algorithm of requests."))]
    pub signature_for_requests: SignatureAlgorithm,
    #[builder(default = false, setter(doc = "Set whether the gamete has an open, unsigned faucet."))]
    pub allows_unsigned_faucet: bool,
    #[builder(default, setter(doc = "Set the gas cost model."))]
    pub gas_cost_model: GasCostModel,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// When the reward of the validators gets committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewardPolicy {
    /// The reward transaction is committed whenever it can be delivered.
    Always,
    /// The reward transaction is discarded if its only effect would be to increase
    /// the nonce of the manifest, which lets the store stabilize when nothing happens.
    SkipIfOnlyNonceChanges,
}

/// The parameters of the local node.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [LocalNodeConfig]. Every parameter is optional
    and falls back to its default.
"))]
pub struct LocalNodeConfig {
    #[builder(default = 60, setter(doc = "Set the maximal number of polling attempts for a response."))]
    pub max_polling_attempts: u32,
    #[builder(default = Duration::from_millis(10), setter(doc = "Set the delay of the first polling attempt. Later attempts wait 10% longer each."))]
    pub polling_delay: Duration,
    #[builder(default = 1_000, setter(doc = "Set how many recent rejections of checked requests are remembered."))]
    pub recent_check_errors_capacity: usize,
    #[builder(default = 1_000, setter(doc = "Set how many class loaders are cached per store."))]
    pub class_loaders_cache_size: usize,
    #[builder(default = 1_000, setter(doc = "Set how many signature checks are cached per store."))]
    pub signatures_cache_size: usize,
    #[builder(default = 1_000, setter(doc = "Set the capacity of the queue of stores waiting for garbage collection."))]
    pub gc_queue_capacity: usize,
    #[builder(default = Duration::from_millis(5_000), setter(doc = "Set how often the past stores are rescanned for garbage collection."))]
    pub gc_rescan_interval: Duration,
    #[builder(default = 16, setter(doc = "Set how many layers a store can have before being flattened."))]
    pub max_layer_depth: usize,
    #[builder(default = 10, setter(doc = "Set after how many delivered transactions the mempool commits."))]
    pub transactions_per_commit: usize,
    #[builder(default = 100_000, setter(doc = "Set the capacity of the mempool of posted requests."))]
    pub mempool_capacity: usize,
    #[builder(default = RewardPolicy::SkipIfOnlyNonceChanges, setter(doc = "Set when the reward of the validators is committed."))]
    pub reward_policy: RewardPolicy,
    #[builder(default, setter(doc = "Set the consensus parameters used before the node gets initialized."))]
    pub consensus: ConsensusConfig,
}

impl Default for LocalNodeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
