/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Builders of the responses of calls to constructors and methods.

use crate::{
    constants,
    error::DeliveryError,
    execution::{CodeError, CodeInfo, ExecutionEnvironment},
    types::{
        ConstructorCallRequest, ConstructorCallSuccessfulResponse, ExceptionResponse,
        MethodCallSuccessfulResponse, MethodSignature, StorageReference, StorageValue,
        TransactionReference, TransactionRequest, TransactionResponse,
    },
};

use super::non_initial::{CallMode, Execution, NonInitial};

/// Applies the checks specific to code calls: signed code only accepts exported objects.
fn check_arguments(
    builder: &NonInitial<'_>,
    receiver: Option<&StorageReference>,
    actuals: &[StorageValue],
) -> Result<(), DeliveryError> {
    if !builder.mode.is_signed() {
        return Ok(());
    }
    if let Some(receiver) = receiver {
        builder.enforce_exported(receiver)?;
    }
    for object in actuals.iter().filter_map(StorageValue::as_reference) {
        builder.enforce_exported(&object)?;
    }
    Ok(())
}

/// Keeps the exception only if it is checked and the code declares that it can throw it.
fn is_declared(error: &CodeError, info: &CodeInfo) -> bool {
    matches!(error, CodeError::Thrown { checked: true, .. }) && info.throws_exceptions
}

pub(crate) struct ConstructorCallBuilder<'a> {
    builder: NonInitial<'a>,
    call: &'a ConstructorCallRequest,
}

impl<'a> ConstructorCallBuilder<'a> {
    pub(crate) fn new(
        env: &'a dyn ExecutionEnvironment,
        reference: TransactionReference,
        request: &'a TransactionRequest,
        call: &'a ConstructorCallRequest,
    ) -> Result<Self, DeliveryError> {
        let builder = NonInitial::new(
            env,
            reference,
            request,
            &call.header,
            &[call.header.classpath],
            false,
        )?;
        check_arguments(&builder, None, &call.actuals)?;
        Ok(Self { builder, call })
    }

    pub(crate) fn response(self) -> Result<TransactionResponse, DeliveryError> {
        let call = self.call;
        let info = self.builder.class_loader.constructor_info(&call.constructor);
        self.builder.execute(
            |execution| {
                let info = info.ok_or_else(|| {
                    CodeError::UnmatchedTarget(format!("constructor {}", call.constructor))
                })?;
                let engine = execution.env.engine();
                let outcome =
                    engine.run_constructor(&mut execution.heap, &call.constructor, &call.actuals);
                match outcome {
                    Ok(new_object) => execution.finish(|updates, events, gas| {
                        TransactionResponse::ConstructorCallSuccessful(
                            ConstructorCallSuccessfulResponse {
                                new_object,
                                updates,
                                events,
                                gas,
                            },
                        )
                    }),
                    Err(error) if is_declared(&error, &info) => {
                        let cause = error.cause();
                        execution.finish(|updates, events, gas| {
                            TransactionResponse::ConstructorCallException(ExceptionResponse {
                                updates,
                                events,
                                gas,
                                cause: cause.clone(),
                            })
                        })
                    }
                    Err(error) => Err(error),
                }
            },
            TransactionResponse::ConstructorCallFailed,
        )
    }
}

/// The builder of instance, static and system method calls, run for real or in view mode.
pub(crate) struct MethodCallBuilder<'a> {
    builder: NonInitial<'a>,
    method: &'a MethodSignature,
    receiver: Option<StorageReference>,
    actuals: &'a [StorageValue],
}

impl<'a> MethodCallBuilder<'a> {
    pub(crate) fn new(
        env: &'a dyn ExecutionEnvironment,
        reference: TransactionReference,
        request: &'a TransactionRequest,
        view: bool,
    ) -> Result<Self, DeliveryError> {
        let (header, method, receiver, actuals) = match request {
            TransactionRequest::InstanceMethodCall(call)
            | TransactionRequest::InstanceSystemMethodCall(call) => (
                &call.header,
                &call.method,
                Some(call.receiver),
                call.actuals.as_slice(),
            ),
            TransactionRequest::StaticMethodCall(call) => {
                (&call.header, &call.method, None, call.actuals.as_slice())
            }
            other => {
                return Err(DeliveryError::rejected(format!(
                    "Unexpected transaction request of kind {}",
                    other.kind()
                )))
            }
        };
        let builder = NonInitial::new(env, reference, request, header, &[header.classpath], view)?;
        check_arguments(&builder, receiver.as_ref(), actuals)?;
        Ok(Self {
            builder,
            method,
            receiver,
            actuals,
        })
    }

    pub(crate) fn response(self) -> Result<TransactionResponse, DeliveryError> {
        let Self {
            builder,
            method,
            receiver,
            actuals,
        } = self;
        let info = builder.class_loader.method_info(method);
        builder.execute(
            |execution| {
                let info = info
                    .filter(|info| info.is_static == receiver.is_none())
                    .ok_or_else(|| CodeError::UnmatchedTarget(format!("method {method}")))?;
                if execution.mode == CallMode::View && !info.is_view {
                    return Err(CodeError::thrown(
                        "NoSuchMethodException",
                        "Cannot call a method not annotated as @View",
                        false,
                    ));
                }
                mint_for_reward(execution, method, actuals)?;

                let engine = execution.env.engine();
                match engine.run_method(&mut execution.heap, method, receiver, actuals) {
                    Ok(result) => {
                        if info.is_view || execution.mode == CallMode::View {
                            execution.ensure_no_side_effects()?;
                        }
                        execution.finish(|updates, events, gas| {
                            TransactionResponse::MethodCallSuccessful(MethodCallSuccessfulResponse {
                                result: result.clone(),
                                updates,
                                events,
                                gas,
                            })
                        })
                    }
                    Err(error) if is_declared(&error, &info) => {
                        let cause = error.cause();
                        execution.finish(|updates, events, gas| {
                            TransactionResponse::MethodCallException(ExceptionResponse {
                                updates,
                                events,
                                gas,
                                cause: cause.clone(),
                            })
                        })
                    }
                    Err(error) => Err(error),
                }
            },
            TransactionResponse::MethodCallFailed,
        )
    }
}

/// The reward of the validators, called by the manifest, distributes coins that do not exist
/// yet: they are added to the balance of the manifest before the call.
fn mint_for_reward(
    execution: &mut Execution<'_>,
    method: &MethodSignature,
    actuals: &[StorageValue],
) -> Result<(), CodeError> {
    if execution.mode != CallMode::System
        || *method != constants::validators_reward()
        || execution.env.manifest() != Some(execution.caller())
    {
        return Ok(());
    }
    let amount = actuals
        .first()
        .and_then(StorageValue::as_big_integer)
        .ok_or_else(|| CodeError::Deserialization("the amount of the reward".to_string()))?;
    let caller = execution.caller();
    let balance = execution
        .heap
        .big_integer(&caller, &constants::balance_field())?;
    execution.heap.assign_unmetered(
        &caller,
        &constants::balance_field(),
        StorageValue::BigInteger(balance + amount),
    )
}
