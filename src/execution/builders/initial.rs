/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Builders of the responses of the initial transactions, which bootstrap the node: the
//! installation of the base jars, the creation of the gamete and the initialization that sets
//! the manifest. They are neither paid nor signed, and they are rejected once the node has
//! been initialized.

use crate::{
    constants,
    crypto::encode_public_key,
    error::{DeliveryError, StoreError},
    execution::{ExecutionEnvironment, ObjectHeap},
    gas::GasMeter,
    types::{
        GameteCreationRequest, GameteCreationResponse, InitializationRequest,
        JarStoreInitialRequest, JarStoreInitialResponse, StorageValue, TransactionReference,
        TransactionResponse,
    },
};

fn reject_if_initialized(env: &dyn ExecutionEnvironment) -> Result<(), DeliveryError> {
    if env.manifest().is_some() {
        return Err(DeliveryError::rejected(
            "cannot run an initial transaction request in an already initialized node",
        ));
    }
    Ok(())
}

pub(crate) fn check_jar_store_initial(
    env: &dyn ExecutionEnvironment,
    request: &JarStoreInitialRequest,
) -> Result<(), DeliveryError> {
    reject_if_initialized(env)?;
    if !request.dependencies.is_empty() {
        env.class_loader(&request.dependencies)?;
    }
    Ok(())
}

pub(crate) fn jar_store_initial(
    env: &dyn ExecutionEnvironment,
    request: &JarStoreInitialRequest,
) -> Result<TransactionResponse, DeliveryError> {
    check_jar_store_initial(env, request)?;
    let dependencies = request
        .dependencies
        .iter()
        .map(|dependency| env.installed_jar(dependency).map(|(jar, _, _)| jar))
        .collect::<Result<Vec<_>, _>>()?;
    let consensus = env.consensus();
    let instrumented_jar = env
        .engine()
        .instrument(&request.jar, &dependencies, consensus)
        .map_err(|message| DeliveryError::rejected(format!("Failed verification: {message}")))?;
    Ok(TransactionResponse::JarStoreInitial(JarStoreInitialResponse {
        instrumented_jar,
        dependencies: request.dependencies.clone(),
        verification_version: consensus.verification_version,
    }))
}

pub(crate) fn check_gamete_creation(
    env: &dyn ExecutionEnvironment,
    request: &GameteCreationRequest,
) -> Result<(), DeliveryError> {
    reject_if_initialized(env)?;
    if request.initial_amount < 0 {
        return Err(DeliveryError::rejected(
            "The gamete must be initialized with a non-negative amount of coins",
        ));
    }
    env.class_loader(&[request.classpath])?;
    Ok(())
}

pub(crate) fn gamete_creation(
    env: &dyn ExecutionEnvironment,
    reference: TransactionReference,
    request: &GameteCreationRequest,
) -> Result<TransactionResponse, DeliveryError> {
    check_gamete_creation(env, request)?;
    let class_loader = env.class_loader(&[request.classpath])?;
    let mut heap = ObjectHeap::new(env, class_loader, reference, None, GasMeter::unmetered());
    let created = (|| {
        let gamete = heap.create_object(constants::GAMETE)?;
        heap.assign_unmetered(
            &gamete,
            &constants::balance_field(),
            StorageValue::BigInteger(request.initial_amount),
        )?;
        heap.assign_unmetered(
            &gamete,
            &constants::public_key_field(),
            StorageValue::String(request.public_key.clone()),
        )?;
        Ok(gamete)
    })();
    let gamete = created.map_err(|error: crate::execution::CodeError| {
        DeliveryError::rejected(format!("cannot create the gamete: {error}"))
    })?;
    Ok(TransactionResponse::GameteCreation(GameteCreationResponse {
        updates: heap.updates(),
        gamete,
    }))
}

pub(crate) fn check_initialization(
    env: &dyn ExecutionEnvironment,
    request: &InitializationRequest,
) -> Result<(), DeliveryError> {
    reject_if_initialized(env)?;
    env.class_loader(&[request.classpath])?;
    match env.class_name(&request.manifest) {
        Ok(_) => Ok(()),
        Err(StoreError::UnknownObject(manifest)) => Err(DeliveryError::rejected(format!(
            "The manifest {manifest} cannot be found in store"
        ))),
        Err(error) => Err(error.into()),
    }
}

pub(crate) fn initialization(
    env: &dyn ExecutionEnvironment,
    request: &InitializationRequest,
) -> Result<TransactionResponse, DeliveryError> {
    check_initialization(env, request)?;
    Ok(TransactionResponse::Initialization)
}

/// A gamete creation request for the given public key bytes.
pub fn gamete_creation_request(
    classpath: TransactionReference,
    initial_amount: crate::types::BigInteger,
    public_key: &[u8],
) -> GameteCreationRequest {
    GameteCreationRequest {
        classpath,
        initial_amount,
        public_key: encode_public_key(public_key),
    }
}
