/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! builders turns requests into responses.
//!
//! Every kind of [TransactionRequest] has its own builder. A builder first checks the request
//! against the execution environment, which rejects it without side effects if it cannot be
//! included in the store, and then runs it. Running never mutates the environment: the effects
//! of the transaction are all in the updates of the resulting [TransactionResponse], which the
//! caller is free to push into a [StoreTransformation](crate::store::StoreTransformation) or to
//! discard.

pub(crate) mod code_call;

pub(crate) mod initial;
pub use initial::gamete_creation_request;

pub(crate) mod jar_store;

pub(crate) mod non_initial;

use crate::{
    error::DeliveryError,
    types::{TransactionReference, TransactionRequest, TransactionResponse},
};

use self::{
    code_call::{ConstructorCallBuilder, MethodCallBuilder},
    jar_store::JarStoreBuilder,
};

use super::ExecutionEnvironment;

/// Builds the response of a request, or rejects it.
pub fn build_response(
    env: &dyn ExecutionEnvironment,
    reference: TransactionReference,
    request: &TransactionRequest,
) -> Result<TransactionResponse, DeliveryError> {
    match request {
        TransactionRequest::JarStoreInitial(jar_store) => {
            initial::jar_store_initial(env, jar_store)
        }
        TransactionRequest::GameteCreation(creation) => {
            initial::gamete_creation(env, reference, creation)
        }
        TransactionRequest::Initialization(initialization) => {
            initial::initialization(env, initialization)
        }
        TransactionRequest::JarStore(jar_store) => {
            JarStoreBuilder::new(env, reference, request, jar_store)?.response()
        }
        TransactionRequest::ConstructorCall(call) => {
            ConstructorCallBuilder::new(env, reference, request, call)?.response()
        }
        TransactionRequest::InstanceMethodCall(_)
        | TransactionRequest::InstanceSystemMethodCall(_)
        | TransactionRequest::StaticMethodCall(_) => {
            MethodCallBuilder::new(env, reference, request, false)?.response()
        }
    }
}

/// Runs the checks of a request without executing it.
pub fn check_request(
    env: &dyn ExecutionEnvironment,
    reference: TransactionReference,
    request: &TransactionRequest,
) -> Result<(), DeliveryError> {
    match request {
        TransactionRequest::JarStoreInitial(jar_store) => {
            initial::check_jar_store_initial(env, jar_store)
        }
        TransactionRequest::GameteCreation(creation) => {
            initial::check_gamete_creation(env, creation)
        }
        TransactionRequest::Initialization(initialization) => {
            initial::check_initialization(env, initialization)
        }
        TransactionRequest::JarStore(jar_store) => {
            JarStoreBuilder::new(env, reference, request, jar_store).map(|_| ())
        }
        TransactionRequest::ConstructorCall(call) => {
            ConstructorCallBuilder::new(env, reference, request, call).map(|_| ())
        }
        TransactionRequest::InstanceMethodCall(_)
        | TransactionRequest::InstanceSystemMethodCall(_)
        | TransactionRequest::StaticMethodCall(_) => {
            MethodCallBuilder::new(env, reference, request, false).map(|_| ())
        }
    }
}

/// Runs a method call in view mode: the nonce of the caller is neither checked nor increased,
/// and the call fails if it has side effects. The response is never pushed into a store.
pub(crate) fn run_view(
    env: &dyn ExecutionEnvironment,
    reference: TransactionReference,
    request: &TransactionRequest,
) -> Result<TransactionResponse, DeliveryError> {
    MethodCallBuilder::new(env, reference, request, true)?.response()
}

#[cfg(test)]
mod tests {
    use super::non_initial::CallMode;

    #[test]
    fn test_call_modes() {
        assert!(CallMode::Signed.is_signed());
        assert!(CallMode::Signed.checks_nonce());
        assert!(!CallMode::Faucet.is_signed());
        assert!(!CallMode::Faucet.checks_nonce());
        assert!(!CallMode::View.checks_nonce());
        assert!(!CallMode::System.is_signed());
        assert!(CallMode::System.checks_nonce());
    }
}
