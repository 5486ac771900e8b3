/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Reading the consensus parameters back from the governance contracts.
//!
//! Once the node is initialized, the manifest references the validators, the gas station and
//! the versions contracts. References are read directly from the fields of the manifest, while
//! scalar parameters are obtained by running view getters on behalf of the manifest.

use crate::{
    config::ConsensusConfig,
    constants,
    crypto::SignatureAlgorithm,
    error::{NodeError, StoreError},
    gas::GAS_FOR_REWARD,
    types::{
        BigInteger, ExceptionResponse, FailedResponse, FieldSignature, InstanceMethodCallRequest,
        MethodSignature, RequestHeader, StaticMethodCallRequest, StorageReference, StorageValue,
        TransactionRequest, TransactionResponse,
    },
};

use super::{builders, ExecutionEnvironment};

/// Runs a view instance method and yields its result, without modifying the store.
pub fn run_instance_view_method(
    env: &dyn ExecutionEnvironment,
    request: InstanceMethodCallRequest,
) -> Result<Option<StorageValue>, NodeError> {
    run_view_method(env, TransactionRequest::InstanceMethodCall(request))
}

/// Runs a view static method and yields its result, without modifying the store.
pub fn run_static_view_method(
    env: &dyn ExecutionEnvironment,
    request: StaticMethodCallRequest,
) -> Result<Option<StorageValue>, NodeError> {
    run_view_method(env, TransactionRequest::StaticMethodCall(request))
}

fn run_view_method(
    env: &dyn ExecutionEnvironment,
    request: TransactionRequest,
) -> Result<Option<StorageValue>, NodeError> {
    let reference = env.hasher().hash_request(&request);
    match builders::run_view(env, reference, &request)? {
        TransactionResponse::MethodCallSuccessful(response) => Ok(response.result),
        TransactionResponse::MethodCallException(ExceptionResponse { cause, .. })
        | TransactionResponse::MethodCallFailed(FailedResponse { cause, .. }) => Err(
            NodeError::ViewFailed(format!("{}: {}", cause.class_name, cause.message)),
        ),
        other => Err(NodeError::ViewFailed(format!(
            "unexpected response {other:?}"
        ))),
    }
}

/// Calls a getter of a governance contract on behalf of the manifest.
pub fn call_getter(
    env: &dyn ExecutionEnvironment,
    receiver: StorageReference,
    getter: MethodSignature,
) -> Result<StorageValue, StoreError> {
    let manifest = env
        .manifest()
        .ok_or_else(|| StoreError::Inconsistent("the node is not initialized".to_string()))?;
    let classpath = env
        .base_classpath()?
        .ok_or(StoreError::UnknownObject(manifest))?;
    let name = getter.name.clone();
    let request = InstanceMethodCallRequest {
        header: RequestHeader {
            caller: manifest,
            nonce: 0,
            gas_limit: GAS_FOR_REWARD,
            gas_price: 0,
            classpath,
            chain_id: String::new(),
            signature: Vec::new(),
        },
        method: getter,
        receiver,
        actuals: Vec::new(),
    };
    match run_instance_view_method(env, request) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(StoreError::Inconsistent(format!("{name} returned no value"))),
        Err(NodeError::Store(error)) => Err(error),
        Err(error) => Err(StoreError::Inconsistent(format!("cannot call {name}: {error}"))),
    }
}

pub fn extract_validators(
    env: &dyn ExecutionEnvironment,
) -> Result<Option<StorageReference>, StoreError> {
    manifest_field(env, constants::manifest_validators_field())
}

pub fn extract_gas_station(
    env: &dyn ExecutionEnvironment,
) -> Result<Option<StorageReference>, StoreError> {
    manifest_field(env, constants::manifest_gas_station_field())
}

pub fn extract_versions(
    env: &dyn ExecutionEnvironment,
) -> Result<Option<StorageReference>, StoreError> {
    manifest_field(env, constants::manifest_versions_field())
}

fn manifest_field(
    env: &dyn ExecutionEnvironment,
    field: FieldSignature,
) -> Result<Option<StorageReference>, StoreError> {
    env.manifest()
        .map(|manifest| env.reference_field(&manifest, &field))
        .transpose()
}

pub fn extract_gas_price(env: &dyn ExecutionEnvironment) -> Result<Option<BigInteger>, StoreError> {
    let gas_station = match env.cache().gas_station() {
        Some(gas_station) => Some(gas_station),
        None => extract_gas_station(env)?,
    };
    match gas_station {
        Some(gas_station) => {
            let value = call_getter(env, gas_station, constants::get_gas_price())?;
            expect_big_integer(value, "getGasPrice").map(Some)
        }
        None => Ok(None),
    }
}

pub fn extract_inflation(env: &dyn ExecutionEnvironment) -> Result<Option<i64>, StoreError> {
    let validators = match env.cache().validators() {
        Some(validators) => Some(validators),
        None => extract_validators(env)?,
    };
    match validators {
        Some(validators) => {
            let value = call_getter(env, validators, constants::get_current_inflation())?;
            value.as_long().map(Some).ok_or_else(|| unexpected("getCurrentInflation"))
        }
        None => Ok(None),
    }
}

/// The consensus parameters as recorded in the governance contracts. The parameters that
/// are not kept in store are copied from the current consensus.
pub fn extract_consensus(env: &dyn ExecutionEnvironment) -> Result<ConsensusConfig, StoreError> {
    let mut consensus = env.consensus().clone();
    let manifest = match env.manifest() {
        Some(manifest) => manifest,
        None => return Ok(consensus),
    };
    let missing = |what: &str| StoreError::Inconsistent(format!("the manifest has no {what}"));
    let validators = extract_validators(env)?.ok_or_else(|| missing("validators"))?;
    let gas_station = extract_gas_station(env)?.ok_or_else(|| missing("gas station"))?;
    let versions = extract_versions(env)?.ok_or_else(|| missing("versions"))?;

    consensus.chain_id = expect_string(
        call_getter(env, manifest, constants::get_chain_id())?,
        "getChainId",
    )?;
    consensus.max_error_length = expect_size(
        call_getter(env, manifest, constants::get_max_error_length())?,
        "getMaxErrorLength",
    )? as usize;
    consensus.allows_unsigned_faucet = expect_bool(
        call_getter(env, manifest, constants::allows_unsigned_faucet())?,
        "allowsUnsignedFaucet",
    )?;
    let signature = expect_string(
        call_getter(env, manifest, constants::get_signature())?,
        "getSignature",
    )?;
    consensus.signature_for_requests = SignatureAlgorithm::from_name(&signature)
        .map_err(|error| StoreError::Inconsistent(error.to_string()))?;

    let max_gas = expect_big_integer(
        call_getter(env, gas_station, constants::get_max_gas_per_transaction())?,
        "getMaxGasPerTransaction",
    )?;
    consensus.max_gas_per_transaction = u64::try_from(max_gas.max(0)).unwrap_or(u64::MAX);
    consensus.ignores_gas_price = expect_bool(
        call_getter(env, gas_station, constants::ignores_gas_price())?,
        "ignoresGasPrice",
    )?;

    consensus.final_supply = expect_big_integer(
        call_getter(env, validators, constants::get_final_supply())?,
        "getFinalSupply",
    )?;

    consensus.verification_version = expect_size(
        call_getter(env, versions, constants::get_verification_version())?,
        "getVerificationVersion",
    )?;

    Ok(consensus)
}

fn unexpected(getter: &str) -> StoreError {
    StoreError::Inconsistent(format!("{getter} returned a value of unexpected type"))
}

fn expect_big_integer(value: StorageValue, getter: &str) -> Result<BigInteger, StoreError> {
    value.as_big_integer().ok_or_else(|| unexpected(getter))
}

fn expect_size(value: StorageValue, getter: &str) -> Result<u64, StoreError> {
    value
        .as_long()
        .and_then(|long| u64::try_from(long).ok())
        .ok_or_else(|| unexpected(getter))
}

fn expect_bool(value: StorageValue, getter: &str) -> Result<bool, StoreError> {
    value.as_bool().ok_or_else(|| unexpected(getter))
}

fn expect_string(value: StorageValue, getter: &str) -> Result<String, StoreError> {
    match value {
        StorageValue::String(string) => Ok(string),
        _ => Err(unexpected(getter)),
    }
}
