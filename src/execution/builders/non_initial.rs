/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Checks and phases shared by all non-initial transactions.
//!
//! A non-initial transaction is paid by its caller. Before it is executed, a sequence of checks
//! establishes that it can be included in the store; a failing check rejects the request and
//! nothing gets charged. Execution then goes through three phases:
//! - [Pre-Charge](Execution::pre_charge): the nonce of the caller is increased, the fixed costs
//!   of the transaction are charged, and the whole promised gas is paid in advance;
//! - the body, specific to each kind of request, which runs against the [ObjectHeap];
//! - either [Charge](Execution::finish), which charges the storage of the response and refunds
//!   the unused gas, or [Abort](Execution::abort), which forfeits all remaining gas as penalty
//!   and keeps only the updates to the nonce and balance of the caller.

use std::sync::Arc;

use crate::{
    constants,
    error::{DeliveryError, StoreError},
    execution::{CodeError, EngineClassLoader, ExecutionEnvironment, ObjectHeap},
    gas::{GasMeter, GAS_FOR_STORING_FAILED_CODE_CALL, GAS_FOR_STORING_FAILED_JAR_STORE},
    types::{
        normalize, BigInteger, FailedResponse, GasConsumed, RequestHeader, StorageReference,
        StorageValue, TransactionReference, TransactionRequest, TransactionResponse, Update,
    },
};

/// How a non-initial transaction is run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CallMode {
    /// A transaction signed by its caller.
    Signed,
    /// A call to a faucet of the gamete, which the consensus lets run unsigned.
    Faucet,
    /// A call run to compute a value, whose effects are never committed.
    View,
    /// A transaction started by the node itself.
    System,
}

impl CallMode {
    pub(crate) fn is_signed(&self) -> bool {
        matches!(self, CallMode::Signed)
    }

    pub(crate) fn checks_nonce(&self) -> bool {
        !matches!(self, CallMode::View | CallMode::Faucet)
    }
}

/// The part of a non-initial transaction that has been checked and can be executed.
pub(crate) struct NonInitial<'a> {
    pub env: &'a dyn ExecutionEnvironment,
    pub reference: TransactionReference,
    pub request: &'a TransactionRequest,
    pub header: &'a RequestHeader,
    pub mode: CallMode,
    pub class_loader: Arc<dyn EngineClassLoader>,
}

impl<'a> NonInitial<'a> {
    /// Resolves the class loader of the request and runs the checks shared by all kinds of
    /// non-initial requests.
    pub(crate) fn new(
        env: &'a dyn ExecutionEnvironment,
        reference: TransactionReference,
        request: &'a TransactionRequest,
        header: &'a RequestHeader,
        classpaths: &[TransactionReference],
        view: bool,
    ) -> Result<Self, DeliveryError> {
        let class_loader = env.class_loader(classpaths)?;
        let mut builder = Self {
            env,
            reference,
            request,
            header,
            mode: CallMode::Signed,
            class_loader,
        };
        builder.mode = if request.is_system() {
            CallMode::System
        } else if view {
            CallMode::View
        } else if builder.is_unsigned_faucet()? {
            CallMode::Faucet
        } else {
            CallMode::Signed
        };
        builder.check_consistency()?;
        Ok(builder)
    }

    fn is_unsigned_faucet(&self) -> Result<bool, StoreError> {
        let call = match self.request {
            TransactionRequest::InstanceMethodCall(call) => call,
            _ => return Ok(false),
        };
        if !self.env.consensus().allows_unsigned_faucet
            || !call.method.name.starts_with(constants::FAUCET_PREFIX)
            || call.method.defining_class != constants::GAMETE
            || call.header.caller != call.receiver
        {
            return Ok(false);
        }
        Ok(self.env.gamete()? == Some(call.header.caller))
    }

    fn check_consistency(&self) -> Result<(), DeliveryError> {
        self.caller_must_be_externally_owned_account()?;
        self.gas_limit_inside_bounds()?;
        self.request_promises_enough_gas()?;
        self.gas_price_is_large_enough()?;
        self.chain_id_is_correct()?;
        self.signature_is_valid()?;
        self.nonce_is_correct()?;
        self.payer_can_pay_for_all_promised_gas()
    }

    fn caller_must_be_externally_owned_account(&self) -> Result<(), DeliveryError> {
        let caller = self.header.caller;
        let class_name = match self.env.class_name(&caller) {
            Ok(class_name) => class_name,
            Err(StoreError::UnknownObject(_)) => {
                return Err(DeliveryError::rejected(format!(
                    "The caller {caller} cannot be found in store"
                )))
            }
            Err(error) => return Err(error.into()),
        };
        if self.class_loader.fields_of(&class_name).is_none() {
            return Err(DeliveryError::rejected(format!(
                "The class {class_name} of the caller cannot be resolved"
            )));
        }
        if !self.class_loader.is_externally_owned_account(&class_name) {
            return Err(DeliveryError::rejected(
                "The caller of a request must be an externally owned account",
            ));
        }
        Ok(())
    }

    fn gas_limit_inside_bounds(&self) -> Result<(), DeliveryError> {
        let max_gas = self.env.consensus().max_gas_per_transaction;
        if self.header.gas_limit > max_gas {
            return Err(DeliveryError::rejected(format!(
                "The gas limit of the request is larger than the maximum allowed ({} > {})",
                self.header.gas_limit, max_gas
            )));
        }
        Ok(())
    }

    fn request_promises_enough_gas(&self) -> Result<(), DeliveryError> {
        let minimum = self.minimal_gas_required();
        if self.header.gas_limit < minimum {
            return Err(DeliveryError::rejected(format!(
                "not enough gas to start the transaction, expected at least {minimum} units of gas"
            )));
        }
        Ok(())
    }

    /// The gas needed to start the transaction and to store its failed response.
    pub(crate) fn minimal_gas_required(&self) -> u64 {
        let cost_model = &self.env.consensus().gas_cost_model;
        let jars = self.class_loader.lengths_of_jars();
        let loading: u64 = jars
            .iter()
            .map(|length| {
                cost_model
                    .cpu_cost_for_loading_jar(*length)
                    .saturating_add(cost_model.ram_cost_for_loading_jar(*length))
            })
            .fold(0u64, u64::saturating_add);
        cost_model
            .cpu_base_transaction_cost()
            .saturating_add(self.request.size() as u64)
            .saturating_add(self.gas_for_storing_failed_response())
            .saturating_add(loading)
    }

    fn gas_for_storing_failed_response(&self) -> u64 {
        match self.request {
            TransactionRequest::JarStore(_) => GAS_FOR_STORING_FAILED_JAR_STORE,
            _ => GAS_FOR_STORING_FAILED_CODE_CALL,
        }
    }

    fn gas_price_is_large_enough(&self) -> Result<(), DeliveryError> {
        if !self.mode.is_signed() || self.env.consensus().ignores_gas_price {
            return Ok(());
        }
        if let Some(gas_price) = self.env.cache().gas_price() {
            if self.header.gas_price < gas_price {
                return Err(DeliveryError::rejected(format!(
                    "The gas price of the request is smaller than the current gas price ({} < {})",
                    self.header.gas_price, gas_price
                )));
            }
        }
        Ok(())
    }

    fn chain_id_is_correct(&self) -> Result<(), DeliveryError> {
        if !self.mode.is_signed() || self.env.manifest().is_none() {
            return Ok(());
        }
        let chain_id = &self.env.consensus().chain_id;
        if &self.header.chain_id != chain_id {
            return Err(DeliveryError::rejected(format!(
                "Incorrect chain id: the request reports {} but the node requires {}",
                self.header.chain_id, chain_id
            )));
        }
        Ok(())
    }

    fn signature_is_valid(&self) -> Result<(), DeliveryError> {
        if !self.mode.is_signed() || self.env.manifest().is_none() {
            return Ok(());
        }
        let is_valid = self.env.signature_is_valid(
            &self.reference,
            self.request,
            self.header,
            self.class_loader.as_ref(),
        )?;
        if !is_valid {
            return Err(DeliveryError::rejected("Invalid request signature"));
        }
        Ok(())
    }

    fn nonce_is_correct(&self) -> Result<(), DeliveryError> {
        if !self.mode.checks_nonce() {
            return Ok(());
        }
        let caller = self.header.caller;
        let expected = self.env.nonce(&caller)?;
        if self.header.nonce != expected {
            return Err(DeliveryError::rejected(format!(
                "Incorrect nonce: the request reports {} but the account {} contains {}",
                self.header.nonce, caller, expected
            )));
        }
        Ok(())
    }

    fn payer_can_pay_for_all_promised_gas(&self) -> Result<(), DeliveryError> {
        let balance = self.env.balance(&self.header.caller)?;
        let cost = BigInteger::from(self.header.gas_limit).checked_mul(self.header.gas_price);
        match cost {
            Some(cost) if cost <= balance => Ok(()),
            _ => Err(DeliveryError::rejected(format!(
                "The payer has not enough funds to buy {} units of gas",
                self.header.gas_limit
            ))),
        }
    }

    /// Enforces that an object passed to signed code belongs to an exported class.
    pub(crate) fn enforce_exported(&self, object: &StorageReference) -> Result<(), DeliveryError> {
        let class_name = match self.env.class_name(object) {
            Ok(class_name) => class_name,
            Err(StoreError::UnknownObject(_)) => {
                return Err(DeliveryError::rejected(format!(
                    "Object {object} cannot be found in store"
                )))
            }
            Err(error) => return Err(error.into()),
        };
        if self.class_loader.fields_of(&class_name).is_none() {
            return Err(DeliveryError::rejected(format!(
                "Class {class_name} of the parameter {object} cannot be resolved"
            )));
        }
        if !self.class_loader.is_exported(&class_name) {
            return Err(DeliveryError::rejected(format!(
                "Class {class_name} of the parameter {object} is not exported: add @Exported to {class_name}"
            )));
        }
        Ok(())
    }

    /// Runs the transaction: pre-charge, then `body`, then abort if anything went wrong.
    pub(crate) fn execute<B>(
        &self,
        body: B,
        failed: fn(FailedResponse) -> TransactionResponse,
    ) -> Result<TransactionResponse, DeliveryError>
    where
        B: FnOnce(&mut Execution<'a>) -> Result<TransactionResponse, CodeError>,
    {
        let mut execution = Execution::new(self);
        let outcome = execution.pre_charge().and_then(|()| body(&mut execution));
        match outcome {
            Ok(response) => Ok(response),
            Err(error) => execution.abort(error).map(failed),
        }
    }
}

/// The state of a non-initial transaction while it runs.
pub(crate) struct Execution<'a> {
    pub env: &'a dyn ExecutionEnvironment,
    pub header: &'a RequestHeader,
    pub request: &'a TransactionRequest,
    pub mode: CallMode,
    pub heap: ObjectHeap<'a>,
    /// The coins paid in advance for the promised gas.
    coins_initially_paid: BigInteger,
    /// The updates to the caller kept if the transaction fails.
    updates_in_case_of_failure: Vec<Update>,
}

impl<'a> Execution<'a> {
    fn new(builder: &NonInitial<'a>) -> Self {
        Self {
            env: builder.env,
            header: builder.header,
            request: builder.request,
            mode: builder.mode,
            heap: ObjectHeap::new(
                builder.env,
                Arc::clone(&builder.class_loader),
                builder.reference,
                Some(builder.header.caller),
                GasMeter::new(builder.header.gas_limit),
            ),
            coins_initially_paid: 0,
            updates_in_case_of_failure: Vec::new(),
        }
    }

    pub(crate) fn caller(&self) -> StorageReference {
        self.header.caller
    }

    /// Pre-Charge is a Phase in the execution of a transaction. The checks guarantee that the
    /// gas promised by the request covers every charge of this phase.
    fn pre_charge(&mut self) -> Result<(), CodeError> {
        let caller = self.caller();

        if self.mode.checks_nonce() {
            let nonce = self.heap.big_integer(&caller, &constants::nonce_field())?;
            self.set_caller_field(constants::nonce_field(), StorageValue::BigInteger(nonce + 1))?;
        }

        let cost_model = self.env.consensus().gas_cost_model.clone();
        let meter = self.heap.meter_mut();
        meter.charge_cpu(cost_model.cpu_base_transaction_cost())?;
        meter.charge_storage(self.request.size() as u64)?;
        for length in self.heap.class_loader().lengths_of_jars() {
            let meter = self.heap.meter_mut();
            meter.charge_cpu(cost_model.cpu_cost_for_loading_jar(length))?;
            meter.charge_ram(cost_model.ram_cost_for_loading_jar(length))?;
        }

        // pay in advance for all the promised gas
        let coins = BigInteger::from(self.header.gas_limit) * self.header.gas_price;
        if coins != 0 {
            let balance = self.heap.big_integer(&caller, &constants::balance_field())?;
            if balance < coins {
                return Err(CodeError::thrown(
                    "InsufficientFundsError",
                    "the payer cannot pay for the promised gas",
                    false,
                ));
            }
            self.set_caller_field(
                constants::balance_field(),
                StorageValue::BigInteger(balance - coins),
            )?;
        }
        self.coins_initially_paid = coins;
        Ok(())
    }

    fn set_caller_field(
        &mut self,
        field: crate::types::FieldSignature,
        value: StorageValue,
    ) -> Result<(), CodeError> {
        let caller = self.caller();
        self.heap.assign_unmetered(&caller, &field, value.clone())?;
        self.updates_in_case_of_failure
            .push(Update::of_field(caller, field, value));
        Ok(())
    }

    /// Gives back to the caller the coins of the gas that has not been consumed.
    fn refund(&mut self) -> Result<(), CodeError> {
        let caller = self.caller();
        let remaining = BigInteger::from(self.heap.meter().remaining());
        let refund = (remaining * self.header.gas_price).min(self.coins_initially_paid);
        if refund > 0 {
            let balance = self.heap.big_integer(&caller, &constants::balance_field())?;
            self.heap.assign_unmetered(
                &caller,
                &constants::balance_field(),
                StorageValue::BigInteger(balance + refund),
            )?;
        }
        Ok(())
    }

    /// Charge is the final Phase of a successful execution. The response is built twice: the size
    /// of the first one is charged as storage, then the unused gas is refunded and the second one,
    /// with the final updates and gas, is returned.
    pub(crate) fn finish<F>(&mut self, build: F) -> Result<TransactionResponse, CodeError>
    where
        F: Fn(Vec<Update>, Vec<StorageReference>, GasConsumed) -> TransactionResponse,
    {
        let events = self.heap.events().to_vec();
        let draft = build(self.heap.updates(), events.clone(), self.heap.meter().consumed());
        self.heap.charge_storage(draft.size() as u64)?;
        self.refund()?;
        Ok(build(self.heap.updates(), events, self.heap.meter().consumed()))
    }

    /// Abort turns an error of the execution into a failed response. Errors of the store
    /// are not business outcomes and are propagated instead.
    fn abort(self, error: CodeError) -> Result<FailedResponse, DeliveryError> {
        if let CodeError::Store(error) = error {
            return Err(DeliveryError::Store(error));
        }
        let meter = self.heap.meter();
        Ok(FailedResponse {
            updates: normalize(self.updates_in_case_of_failure),
            gas: meter.consumed(),
            penalty: meter.penalty(),
            cause: error.cause(),
        })
    }

    /// Fails unless the only effects of the code are on the balance and nonce of the caller.
    pub(crate) fn ensure_no_side_effects(&self) -> Result<(), CodeError> {
        let caller = self.caller();
        let allowed = [constants::balance_field(), constants::nonce_field()];
        let side_effect = self.heap.updates().into_iter().any(|update| {
            update.object() != caller
                || update
                    .field()
                    .map_or(true, |field| !allowed.contains(field))
        });
        if side_effect {
            return Err(CodeError::thrown(
                "SideEffectsInViewMethodException",
                "@View method induced side-effects",
                false,
            ));
        }
        Ok(())
    }
}
