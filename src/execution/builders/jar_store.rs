/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Builder of the responses of the installation of jars paid by a caller.

use crate::{
    error::DeliveryError,
    execution::{CodeError, ExecutionEnvironment},
    types::{
        JarStoreRequest, JarStoreSuccessfulResponse, TransactionReference, TransactionRequest,
        TransactionResponse,
    },
};

use super::non_initial::NonInitial;

pub(crate) struct JarStoreBuilder<'a> {
    builder: NonInitial<'a>,
    jar_store: &'a JarStoreRequest,
    /// The instrumented jars of the dependencies, in the order of the request.
    dependencies: Vec<&'a [u8]>,
}

impl<'a> JarStoreBuilder<'a> {
    pub(crate) fn new(
        env: &'a dyn ExecutionEnvironment,
        reference: TransactionReference,
        request: &'a TransactionRequest,
        jar_store: &'a JarStoreRequest,
    ) -> Result<Self, DeliveryError> {
        // the jar is verified against its dependencies only, so the classpath of the request
        // is needed just to resolve the caller
        let mut classpaths = vec![jar_store.header.classpath];
        classpaths.extend(jar_store.dependencies.iter().copied());
        classpaths.dedup();
        let builder = NonInitial::new(
            env,
            reference,
            request,
            &jar_store.header,
            &classpaths,
            false,
        )?;
        let dependencies = jar_store
            .dependencies
            .iter()
            .map(|dependency| env.installed_jar(dependency).map(|(jar, _, _)| jar))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            builder,
            jar_store,
            dependencies,
        })
    }

    pub(crate) fn response(self) -> Result<TransactionResponse, DeliveryError> {
        let Self {
            builder,
            jar_store,
            dependencies,
        } = self;
        builder.execute(
            |execution| {
                let consensus = execution.env.consensus();
                let cost_model = &consensus.gas_cost_model;
                let length = jar_store.jar.len();
                execution
                    .heap
                    .charge_cpu(cost_model.cpu_cost_for_installing_jar(length))?;
                execution
                    .heap
                    .charge_ram(cost_model.ram_cost_for_installing_jar(length))?;

                let instrumented_jar = execution
                    .env
                    .engine()
                    .instrument(&jar_store.jar, &dependencies, consensus)
                    .map_err(|message| {
                        CodeError::thrown("VerificationException", &message, false)
                    })?;
                let verification_version = consensus.verification_version;
                execution.finish(|updates, _events, gas| {
                    TransactionResponse::JarStoreSuccessful(JarStoreSuccessfulResponse {
                        instrumented_jar: instrumented_jar.clone(),
                        dependencies: jar_store.dependencies.clone(),
                        verification_version,
                        updates,
                        gas,
                    })
                })
            },
            TransactionResponse::JarStoreFailed,
        )
    }
}
