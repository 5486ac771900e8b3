/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Moka Node Local is the transaction-processing and storage engine of a node. Transactions are
//! delivered to a versioned object store, which moves from a snapshot to the next one at each
//! commit.
//!
//! ```text
//! f(S, R) -> (S', Response)
//!
//! S = Store, an immutable snapshot of the requests, responses and object histories committed so far
//! R = Request, the description of an action paid by an externally owned account
//! Response = the outcome of R: successful, exception or failed, with the updates it induced
//! ```
//!
//! ### Example
//!
//! ```rust
//! // provide a key-value store (kv) and an execution engine (engine) for the code of the
//! // transactions, then open the node and deliver requests to it.
//! let node = moka_node_local::LocalNode::open(kv, engine, LocalNodeConfig::default())?;
//! let response = node.deliver_transaction(request)?;
//! node.commit()?;
//! ```
//!
//! A request is first checked against the head [store]: requests that cannot be included are
//! [rejected](error::TransactionRejected) and leave no trace but a message. Accepted requests are
//! [executed](execution) against an object heap, which meters their [gas], and their responses are
//! collected in a [store transformation](store::StoreTransformation). The [node] commits the
//! transformation into a new head and garbage-collects the stores that nobody uses anymore.
//! The code of the transactions is run by an external [ExecutionEngine](execution::ExecutionEngine).

pub mod config;
pub use config::{ConsensusConfig, LocalNodeConfig, RewardPolicy};

pub mod constants;

pub mod crypto;

pub mod error;
pub use error::{DeliveryError, NodeError, StoreError, TransactionRejected};

pub mod execution;

pub mod gas;

pub(crate) mod logging;

pub mod node;
pub use node::LocalNode;

pub mod store;
pub use store::{MemDB, StateId, Store, StoreTransformation};

pub mod types;
