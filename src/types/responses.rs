/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Transaction responses: the immutable outcomes of the execution of requests.
//!
//! Non-initial responses come in three flavours:
//! - *successful*: the code ran to completion, unused gas was refunded;
//! - *exception*: the code threw an exception it declared it can throw, unused gas was refunded;
//! - *failed*: anything else, the whole gas limit minus what was consumed is kept as penalty.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{encoded_len, StorageReference, StorageValue, TransactionReference, Update};

/// Gas consumed by a transaction, split by resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct GasConsumed {
    pub cpu: u64,
    pub ram: u64,
    pub storage: u64,
}

impl GasConsumed {
    pub fn total(&self) -> u64 {
        self.cpu.saturating_add(self.ram).saturating_add(self.storage)
    }
}

/// The exception that caused an exception or failed response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct Cause {
    pub class_name: String,
    pub message: String,
    /// The program point where the exception was thrown, if known.
    pub location: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct JarStoreInitialResponse {
    pub instrumented_jar: Vec<u8>,
    pub dependencies: Vec<TransactionReference>,
    pub verification_version: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct GameteCreationResponse {
    pub updates: Vec<Update>,
    pub gamete: StorageReference,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct JarStoreSuccessfulResponse {
    pub instrumented_jar: Vec<u8>,
    pub dependencies: Vec<TransactionReference>,
    pub verification_version: u64,
    pub updates: Vec<Update>,
    pub gas: GasConsumed,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct ConstructorCallSuccessfulResponse {
    pub new_object: StorageReference,
    pub updates: Vec<Update>,
    pub events: Vec<StorageReference>,
    pub gas: GasConsumed,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct MethodCallSuccessfulResponse {
    /// `None` for void methods.
    pub result: Option<StorageValue>,
    pub updates: Vec<Update>,
    pub events: Vec<StorageReference>,
    pub gas: GasConsumed,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct ExceptionResponse {
    pub updates: Vec<Update>,
    pub events: Vec<StorageReference>,
    pub gas: GasConsumed,
    pub cause: Cause,
}

/// The response of a failed transaction. Its updates are only those to the
/// balance and nonce of the caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct FailedResponse {
    pub updates: Vec<Update>,
    pub gas: GasConsumed,
    pub penalty: u64,
    pub cause: Cause,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum TransactionResponse {
    JarStoreInitial(JarStoreInitialResponse),
    GameteCreation(GameteCreationResponse),
    Initialization,
    JarStoreSuccessful(JarStoreSuccessfulResponse),
    JarStoreFailed(FailedResponse),
    ConstructorCallSuccessful(ConstructorCallSuccessfulResponse),
    ConstructorCallException(ExceptionResponse),
    ConstructorCallFailed(FailedResponse),
    MethodCallSuccessful(MethodCallSuccessfulResponse),
    MethodCallException(ExceptionResponse),
    MethodCallFailed(FailedResponse),
}

impl TransactionResponse {
    /// The updates of this response, empty if it carries none.
    pub fn updates(&self) -> &[Update] {
        match self {
            TransactionResponse::GameteCreation(r) => &r.updates,
            TransactionResponse::JarStoreSuccessful(r) => &r.updates,
            TransactionResponse::ConstructorCallSuccessful(r) => &r.updates,
            TransactionResponse::MethodCallSuccessful(r) => &r.updates,
            TransactionResponse::ConstructorCallException(r)
            | TransactionResponse::MethodCallException(r) => &r.updates,
            TransactionResponse::JarStoreFailed(r)
            | TransactionResponse::ConstructorCallFailed(r)
            | TransactionResponse::MethodCallFailed(r) => &r.updates,
            TransactionResponse::JarStoreInitial(_) | TransactionResponse::Initialization => &[],
        }
    }

    pub fn has_updates(&self) -> bool {
        matches!(
            self,
            TransactionResponse::GameteCreation(_)
                | TransactionResponse::JarStoreSuccessful(_)
                | TransactionResponse::JarStoreFailed(_)
                | TransactionResponse::ConstructorCallSuccessful(_)
                | TransactionResponse::ConstructorCallException(_)
                | TransactionResponse::ConstructorCallFailed(_)
                | TransactionResponse::MethodCallSuccessful(_)
                | TransactionResponse::MethodCallException(_)
                | TransactionResponse::MethodCallFailed(_)
        )
    }

    pub fn events(&self) -> &[StorageReference] {
        match self {
            TransactionResponse::ConstructorCallSuccessful(r) => &r.events,
            TransactionResponse::MethodCallSuccessful(r) => &r.events,
            TransactionResponse::ConstructorCallException(r)
            | TransactionResponse::MethodCallException(r) => &r.events,
            _ => &[],
        }
    }

    /// The gas consumed by this response. Initial responses consume no gas.
    pub fn gas(&self) -> Option<GasConsumed> {
        match self {
            TransactionResponse::JarStoreSuccessful(r) => Some(r.gas),
            TransactionResponse::ConstructorCallSuccessful(r) => Some(r.gas),
            TransactionResponse::MethodCallSuccessful(r) => Some(r.gas),
            TransactionResponse::ConstructorCallException(r)
            | TransactionResponse::MethodCallException(r) => Some(r.gas),
            TransactionResponse::JarStoreFailed(r)
            | TransactionResponse::ConstructorCallFailed(r)
            | TransactionResponse::MethodCallFailed(r) => Some(r.gas),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FailedResponse> {
        match self {
            TransactionResponse::JarStoreFailed(r)
            | TransactionResponse::ConstructorCallFailed(r)
            | TransactionResponse::MethodCallFailed(r) => Some(r),
            _ => None,
        }
    }

    pub fn penalty(&self) -> Option<u64> {
        self.failure().map(|failed| failed.penalty)
    }

    pub fn is_initial(&self) -> bool {
        matches!(
            self,
            TransactionResponse::JarStoreInitial(_)
                | TransactionResponse::GameteCreation(_)
                | TransactionResponse::Initialization
        )
    }

    pub fn is_successful(&self) -> bool {
        matches!(
            self,
            TransactionResponse::JarStoreSuccessful(_)
                | TransactionResponse::ConstructorCallSuccessful(_)
                | TransactionResponse::MethodCallSuccessful(_)
        )
    }

    /// The instrumented jar installed by this response, with its dependencies
    /// and the verification version used for its instrumentation.
    pub fn installed_jar(&self) -> Option<(&[u8], &[TransactionReference], u64)> {
        match self {
            TransactionResponse::JarStoreInitial(r) => Some((
                &r.instrumented_jar,
                &r.dependencies,
                r.verification_version,
            )),
            TransactionResponse::JarStoreSuccessful(r) => Some((
                &r.instrumented_jar,
                &r.dependencies,
                r.verification_version,
            )),
            _ => None,
        }
    }

    /// The number of bytes of the canonical encoding of this response.
    pub fn size(&self) -> usize {
        encoded_len(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldSignature, StorageType};

    #[test]
    fn test_accessors_of_failed_response() {
        let object = StorageReference::new(TransactionReference::new([2u8; 32]), 0);
        let update = Update::of_field(
            object,
            FieldSignature::new("C", "f", StorageType::BigInteger),
            StorageValue::BigInteger(5),
        );
        let response = TransactionResponse::MethodCallFailed(FailedResponse {
            updates: vec![update.clone()],
            gas: GasConsumed {
                cpu: 1,
                ram: 2,
                storage: 3,
            },
            penalty: 94,
            cause: Cause::default(),
        });

        assert_eq!(response.updates(), &[update]);
        assert!(response.has_updates());
        assert!(response.events().is_empty());
        assert_eq!(response.gas().map(|gas| gas.total()), Some(6));
        assert_eq!(response.penalty(), Some(94));
        assert!(!response.is_successful());
        assert!(!response.is_initial());
        assert!(response.size() > 0);
    }

    #[test]
    fn test_initial_responses_have_no_gas() {
        assert_eq!(TransactionResponse::Initialization.gas(), None);
        assert!(TransactionResponse::Initialization.is_initial());
        assert!(!TransactionResponse::Initialization.has_updates());
    }
}
