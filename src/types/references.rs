/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! References to transactions and to objects in store.

use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};

/// Length in bytes of a [TransactionReference] and of a [StateId](crate::store::StateId).
pub const HASH_LENGTH: usize = 32;

/// The reference of a transaction: the hash of the canonical encoding of its request.
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
pub struct TransactionReference(pub [u8; HASH_LENGTH]);

impl TransactionReference {
    pub const fn new(hash: [u8; HASH_LENGTH]) -> Self {
        Self(hash)
    }

    pub fn bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Parses a reference from its hexadecimal representation.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let hash: [u8; HASH_LENGTH] = bytes.try_into().ok()?;
        Some(Self(hash))
    }
}

impl fmt::Display for TransactionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// The reference of an object in store: the transaction that created it
/// and a progressive number that distinguishes the objects created by the
/// same transaction.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct StorageReference {
    pub transaction: TransactionReference,
    pub progressive: u64,
}

impl StorageReference {
    pub const fn new(transaction: TransactionReference, progressive: u64) -> Self {
        Self {
            transaction,
            progressive,
        }
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:x}", self.transaction, self.progressive)
    }
}
