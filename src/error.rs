/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! error defines the sets of errors raised by the engine.
//!
//! Business outcomes of transactions are never errors: they are encoded as the
//! successful, exception and failed variants of [TransactionResponse](crate::types::TransactionResponse).
//! Errors are reserved for requests that cannot be executed at all ([TransactionRejected])
//! and for genuine faults of the store ([StoreError]).

use crate::{
    store::{KVGetError, StateId},
    types::{FieldSignature, StorageReference, TransactionReference},
};

/// A request that was not executed: it is never committed and no gas is charged for it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransactionRejected {
    pub message: String,
}

impl TransactionRejected {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message of this rejection, cut to at most `max_length` characters.
    pub fn trimmed_message(&self, max_length: usize) -> String {
        trim(&self.message, max_length)
    }
}

/// Cuts `message` to `max_length` characters, appending "..." if something was cut.
pub fn trim(message: &str, max_length: usize) -> String {
    if message.chars().count() <= max_length {
        message.to_string()
    } else {
        let mut trimmed: String = message.chars().take(max_length).collect();
        trimmed.push_str("...");
        trimmed
    }
}

/// Inconsistencies of the store, or failures of its persistent storage. They indicate corruption,
/// not user errors, and are never retried.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A transaction referenced from the store is missing.
    #[error("unknown transaction {0}")]
    UnknownReference(TransactionReference),

    /// An object is referenced but has no history.
    #[error("unknown object {0}")]
    UnknownObject(StorageReference),

    /// An object exists but the expected field is missing from its state.
    #[error("the field {field} of {object} cannot be found")]
    FieldNotFound {
        object: StorageReference,
        field: FieldSignature,
    },

    /// A version of the store cannot be checked out.
    #[error("unknown store {0}")]
    UnknownStore(StateId),

    /// The data in store violate an invariant.
    #[error("the store is inconsistent: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Persistence(#[from] KVGetError),
}

/// Errors raised while delivering or checking a transaction.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Rejected(#[from] TransactionRejected),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DeliveryError {
    pub fn rejected(message: impl Into<String>) -> Self {
        DeliveryError::Rejected(TransactionRejected::new(message))
    }
}

/// Errors raised by the public interface of a [LocalNode](crate::node::LocalNode).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Rejected(#[from] TransactionRejected),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown transaction reference {0}")]
    UnknownReference(TransactionReference),

    #[error("unknown storage reference {0}")]
    UnknownObject(StorageReference),

    /// The outcome of a transaction is not yet known. The transaction might still complete later.
    #[error("cannot find the response of transaction reference {reference}: tried {attempts} times")]
    Timeout {
        reference: TransactionReference,
        attempts: u32,
    },

    /// A view call did not complete successfully.
    #[error("the view call failed: {0}")]
    ViewFailed(String),

    #[error("the node has not been initialized yet")]
    Uninitialized,

    #[error("the node has been shut down")]
    Closed,
}

impl From<DeliveryError> for NodeError {
    fn from(error: DeliveryError) -> Self {
        match error {
            DeliveryError::Rejected(e) => NodeError::Rejected(e),
            DeliveryError::Store(e) => NodeError::Store(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim() {
        assert_eq!(trim("short", 10), "short");
        assert_eq!(trim("exactly", 7), "exactly");
        assert_eq!(trim("a longer message", 8), "a longer...");
        let rejected = TransactionRejected::new("not enough gas");
        assert_eq!(rejected.trimmed_message(3), "not...");
        assert_eq!(rejected.to_string(), "not enough gas");
    }
}
