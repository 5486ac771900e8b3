/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A mock execution engine that runs a tiny, hard-coded base library: accounts, the gamete,
//! the governance contracts and a counter contract to play with.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use moka_node_local::{
    config::ConsensusConfig,
    constants::{
        self, CONTRACT, EVENT, EXTERNALLY_OWNED_ACCOUNT, GAMETE, GAS_STATION, MANIFEST, VALIDATORS,
        VERSIONS,
    },
    execution::{ClasspathJar, CodeError, CodeInfo, EngineClassLoader, ExecutionEngine, ObjectHeap},
    types::{
        BigInteger, ConstructorSignature, FieldSignature, MethodSignature, StorageReference,
        StorageType, StorageValue, TransactionReference,
    },
};

/// Every valid jar starts with these bytes.
pub const JAR_MAGIC: &[u8] = b"MOKA";

pub const COUNTER: &str = "moka.examples.Counter";
pub const MATH: &str = "moka.examples.Math";
pub const GAS_PRICE_UPDATE: &str = "moka.governance.GasPriceUpdate";
pub const CONSENSUS_UPDATE: &str = "moka.governance.ConsensusUpdate";

pub const FINAL_SUPPLY: BigInteger = 1_000_000_000_000_000_000_000_000_000_000;
pub const MAX_GAS_PER_TRANSACTION: BigInteger = 1_000_000_000;

/// Gas charged for CPU by each method of the library.
pub const CPU_PER_CALL: u64 = 10;

fn field(class: &str, name: &str, field_type: StorageType) -> FieldSignature {
    FieldSignature::new(class, name, field_type)
}

pub fn chain_id_field() -> FieldSignature {
    field(MANIFEST, "chainId", StorageType::String)
}

pub fn max_error_length_field() -> FieldSignature {
    field(MANIFEST, "maxErrorLength", StorageType::Long)
}

pub fn signature_field() -> FieldSignature {
    field(MANIFEST, "signature", StorageType::String)
}

pub fn allows_unsigned_faucet_field() -> FieldSignature {
    field(MANIFEST, "allowsUnsignedFaucet", StorageType::Boolean)
}

pub fn final_supply_field() -> FieldSignature {
    field(VALIDATORS, "finalSupply", StorageType::BigInteger)
}

pub fn inflation_field() -> FieldSignature {
    field(VALIDATORS, "inflation", StorageType::Long)
}

pub fn last_behaving_field() -> FieldSignature {
    field(VALIDATORS, "lastBehaving", StorageType::String)
}

pub fn gas_price_field() -> FieldSignature {
    field(GAS_STATION, "gasPrice", StorageType::BigInteger)
}

pub fn max_gas_field() -> FieldSignature {
    field(GAS_STATION, "maxGasPerTransaction", StorageType::BigInteger)
}

pub fn ignores_gas_price_field() -> FieldSignature {
    field(GAS_STATION, "ignoresGasPrice", StorageType::Boolean)
}

pub fn verification_version_field() -> FieldSignature {
    field(VERSIONS, "verificationVersion", StorageType::Long)
}

pub fn count_field() -> FieldSignature {
    field(COUNTER, "count", StorageType::BigInteger)
}

pub fn label_field() -> FieldSignature {
    field(COUNTER, "label", StorageType::String)
}

/// `Manifest(chainId, gasPrice, inflation, allowsUnsignedFaucet, finalSupply)`, which also
/// creates the governance contracts.
pub fn manifest_constructor() -> ConstructorSignature {
    ConstructorSignature::new(
        MANIFEST,
        vec![
            StorageType::String,
            StorageType::BigInteger,
            StorageType::Long,
            StorageType::Boolean,
            StorageType::BigInteger,
        ],
    )
}

pub fn counter_constructor() -> ConstructorSignature {
    ConstructorSignature::new(COUNTER, vec![])
}

pub fn increment() -> MethodSignature {
    MethodSignature::new(COUNTER, "increment", vec![], None)
}

pub fn set_label() -> MethodSignature {
    MethodSignature::new(COUNTER, "setLabel", vec![StorageType::String], None)
}

pub fn get_count() -> MethodSignature {
    MethodSignature::new(COUNTER, "getCount", vec![], Some(StorageType::BigInteger))
}

/// Annotated as view, but it increments the counter.
pub fn sneaky_get_count() -> MethodSignature {
    MethodSignature::new(COUNTER, "sneakyGetCount", vec![], Some(StorageType::BigInteger))
}

/// Throws an exception it does not declare.
pub fn fail() -> MethodSignature {
    MethodSignature::new(COUNTER, "fail", vec![], None)
}

/// Throws a declared, checked exception if its argument is not positive.
pub fn check_positive() -> MethodSignature {
    MethodSignature::new(COUNTER, "checkPositive", vec![StorageType::BigInteger], None)
}

/// Burns CPU until the gas runs out.
pub fn burn() -> MethodSignature {
    MethodSignature::new(COUNTER, "burn", vec![], None)
}

pub fn add() -> MethodSignature {
    MethodSignature::new(
        MATH,
        "add",
        vec![StorageType::Int, StorageType::Int],
        Some(StorageType::Int),
    )
}

/// `faucet(amount, publicKey)` of the gamete: creates an account funded by the gamete.
pub fn faucet() -> MethodSignature {
    MethodSignature::new(
        GAMETE,
        "faucet",
        vec![StorageType::BigInteger, StorageType::String],
        Some(StorageType::Class(EXTERNALLY_OWNED_ACCOUNT.to_string())),
    )
}

pub fn set_gas_price() -> MethodSignature {
    MethodSignature::new(GAS_STATION, "setGasPrice", vec![StorageType::BigInteger], None)
}

pub fn increase_verification_version() -> MethodSignature {
    MethodSignature::new(VERSIONS, "increaseVerificationVersion", vec![], None)
}

fn superclass(class_name: &str) -> Option<&'static str> {
    match class_name {
        EXTERNALLY_OWNED_ACCOUNT | COUNTER | VALIDATORS | GAS_STATION | VERSIONS => Some(CONTRACT),
        GAMETE | MANIFEST => Some(EXTERNALLY_OWNED_ACCOUNT),
        GAS_PRICE_UPDATE | CONSENSUS_UPDATE => Some(EVENT),
        _ => None,
    }
}

fn own_fields(class_name: &str) -> Option<Vec<FieldSignature>> {
    let fields = match class_name {
        CONTRACT => vec![constants::balance_field()],
        EXTERNALLY_OWNED_ACCOUNT => vec![constants::nonce_field(), constants::public_key_field()],
        GAMETE | MATH | GAS_PRICE_UPDATE | CONSENSUS_UPDATE => vec![],
        EVENT => vec![constants::event_creator_field()],
        MANIFEST => vec![
            chain_id_field(),
            max_error_length_field(),
            signature_field(),
            allows_unsigned_faucet_field(),
            constants::manifest_validators_field(),
            constants::manifest_gas_station_field(),
            constants::manifest_versions_field(),
            constants::manifest_gamete_field(),
        ],
        VALIDATORS => vec![
            constants::validators_current_supply_field(),
            final_supply_field(),
            inflation_field(),
            last_behaving_field(),
        ],
        GAS_STATION => vec![gas_price_field(), max_gas_field(), ignores_gas_price_field()],
        VERSIONS => vec![verification_version_field()],
        COUNTER => vec![count_field(), label_field()],
        _ => return None,
    };
    Some(fields)
}

pub struct MockClassLoader {
    jars: Vec<(TransactionReference, usize)>,
    methods: BTreeMap<MethodSignature, CodeInfo>,
}

impl MockClassLoader {
    fn new(jars: &[ClasspathJar]) -> Self {
        let instance = |is_view: bool| CodeInfo {
            is_view,
            throws_exceptions: false,
            is_static: false,
        };
        let mut methods = BTreeMap::new();
        for getter in [
            constants::get_chain_id(),
            constants::get_max_error_length(),
            constants::allows_unsigned_faucet(),
            constants::get_signature(),
            constants::get_max_gas_per_transaction(),
            constants::ignores_gas_price(),
            constants::get_gas_price(),
            constants::get_final_supply(),
            constants::get_current_inflation(),
            constants::get_verification_version(),
            get_count(),
            sneaky_get_count(),
        ] {
            methods.insert(getter, instance(true));
        }
        for method in [
            constants::validators_reward(),
            increment(),
            set_label(),
            fail(),
            burn(),
            faucet(),
            set_gas_price(),
            increase_verification_version(),
        ] {
            methods.insert(method, instance(false));
        }
        methods.insert(
            check_positive(),
            CodeInfo {
                is_view: false,
                throws_exceptions: true,
                is_static: false,
            },
        );
        methods.insert(
            add(),
            CodeInfo {
                is_view: true,
                throws_exceptions: false,
                is_static: true,
            },
        );
        Self {
            jars: jars
                .iter()
                .map(|jar| (jar.reference, jar.instrumented_jar.len()))
                .collect(),
            methods,
        }
    }
}

impl EngineClassLoader for MockClassLoader {
    fn lengths_of_jars(&self) -> Vec<usize> {
        self.jars.iter().map(|(_, length)| *length).collect()
    }

    fn fields_of(&self, class_name: &str) -> Option<Vec<FieldSignature>> {
        let mut fields = own_fields(class_name)?;
        let mut current = class_name;
        while let Some(parent) = superclass(current) {
            fields.extend(own_fields(parent)?);
            current = parent;
        }
        Some(fields)
    }

    fn jar_of(&self, class_name: &str) -> Option<TransactionReference> {
        own_fields(class_name)?;
        self.jars.first().map(|(reference, _)| *reference)
    }

    fn is_subclass_of(&self, class_name: &str, superclass_name: &str) -> bool {
        let mut current = Some(class_name);
        while let Some(class) = current {
            if class == superclass_name {
                return true;
            }
            current = superclass(class);
        }
        false
    }

    fn is_exported(&self, class_name: &str) -> bool {
        own_fields(class_name).is_some() && !self.is_event(class_name)
    }

    fn is_consensus_update_event(&self, class_name: &str) -> bool {
        class_name == CONSENSUS_UPDATE
    }

    fn is_gas_price_update_event(&self, class_name: &str) -> bool {
        class_name == GAS_PRICE_UPDATE
    }

    fn is_inflation_update_event(&self, _class_name: &str) -> bool {
        false
    }

    fn method_info(&self, method: &MethodSignature) -> Option<CodeInfo> {
        self.methods.get(method).copied()
    }

    fn constructor_info(&self, constructor: &ConstructorSignature) -> Option<CodeInfo> {
        (*constructor == manifest_constructor() || *constructor == counter_constructor()).then_some(
            CodeInfo {
                is_view: false,
                throws_exceptions: false,
                is_static: true,
            },
        )
    }
}

/// The engine of the base library. It counts the class loaders it builds, so that tests can
/// observe the caching of class loaders.
#[derive(Default)]
pub struct MockEngine {
    class_loaders_built: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn class_loaders_built(&self) -> usize {
        self.class_loaders_built.load(Ordering::SeqCst)
    }
}

impl ExecutionEngine for MockEngine {
    fn class_loader(
        &self,
        jars: &[ClasspathJar],
        _consensus: &ConsensusConfig,
    ) -> Result<Arc<dyn EngineClassLoader>, String> {
        if jars.is_empty() {
            return Err("empty classpath".to_string());
        }
        self.class_loaders_built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockClassLoader::new(jars)))
    }

    fn instrument(
        &self,
        jar: &[u8],
        _dependencies: &[&[u8]],
        consensus: &ConsensusConfig,
    ) -> Result<Vec<u8>, String> {
        if !jar.starts_with(JAR_MAGIC) {
            return Err("the jar is not a valid Moka jar".to_string());
        }
        let mut instrumented = jar.to_vec();
        instrumented.extend_from_slice(&consensus.verification_version.to_le_bytes());
        Ok(instrumented)
    }

    fn run_constructor(
        &self,
        heap: &mut ObjectHeap<'_>,
        constructor: &ConstructorSignature,
        actuals: &[StorageValue],
    ) -> Result<StorageReference, CodeError> {
        heap.charge_cpu(CPU_PER_CALL)?;
        if *constructor == counter_constructor() {
            return heap.create_object(COUNTER);
        }
        if *constructor != manifest_constructor() {
            return Err(CodeError::UnmatchedTarget(constructor.to_string()));
        }

        let caller = heap
            .caller()
            .ok_or_else(|| CodeError::thrown("IllegalStateException", "no caller", false))?;
        let chain_id = string_arg(actuals, 0)?;
        let gas_price = big_integer_arg(actuals, 1)?;
        let inflation = long_arg(actuals, 2)?;
        let allows_unsigned_faucet = bool_arg(actuals, 3)?;
        let final_supply = big_integer_arg(actuals, 4)?;

        let validators = heap.create_object(VALIDATORS)?;
        let supply = heap.balance_of(&caller)?;
        heap.set_field(
            &validators,
            &constants::validators_current_supply_field(),
            StorageValue::BigInteger(supply),
        )?;
        heap.set_field(&validators, &final_supply_field(), StorageValue::BigInteger(final_supply))?;
        heap.set_field(&validators, &inflation_field(), StorageValue::Long(inflation))?;

        let gas_station = heap.create_object(GAS_STATION)?;
        heap.set_field(&gas_station, &gas_price_field(), StorageValue::BigInteger(gas_price))?;
        heap.set_field(
            &gas_station,
            &max_gas_field(),
            StorageValue::BigInteger(MAX_GAS_PER_TRANSACTION),
        )?;

        let versions = heap.create_object(VERSIONS)?;

        let manifest = heap.create_object(MANIFEST)?;
        heap.set_field(&manifest, &chain_id_field(), StorageValue::String(chain_id))?;
        heap.set_field(&manifest, &max_error_length_field(), StorageValue::Long(300))?;
        heap.set_field(&manifest, &signature_field(), StorageValue::String("ed25519".to_string()))?;
        heap.set_field(
            &manifest,
            &allows_unsigned_faucet_field(),
            StorageValue::Boolean(allows_unsigned_faucet),
        )?;
        heap.set_field(
            &manifest,
            &constants::public_key_field(),
            StorageValue::String(String::new()),
        )?;
        for (field, object) in [
            (constants::manifest_validators_field(), validators),
            (constants::manifest_gas_station_field(), gas_station),
            (constants::manifest_versions_field(), versions),
            (constants::manifest_gamete_field(), caller),
        ] {
            heap.set_field(&manifest, &field, StorageValue::Reference(object))?;
        }
        Ok(manifest)
    }

    fn run_method(
        &self,
        heap: &mut ObjectHeap<'_>,
        method: &MethodSignature,
        receiver: Option<StorageReference>,
        actuals: &[StorageValue],
    ) -> Result<Option<StorageValue>, CodeError> {
        heap.charge_cpu(CPU_PER_CALL)?;
        if *method == add() {
            let sum = int_arg(actuals, 0)?.wrapping_add(int_arg(actuals, 1)?);
            return Ok(Some(StorageValue::Int(sum)));
        }

        let receiver = receiver.ok_or_else(|| CodeError::UnmatchedTarget(method.to_string()))?;
        let getter_fields = [
            (constants::get_chain_id(), chain_id_field()),
            (constants::get_max_error_length(), max_error_length_field()),
            (constants::allows_unsigned_faucet(), allows_unsigned_faucet_field()),
            (constants::get_signature(), signature_field()),
            (constants::get_max_gas_per_transaction(), max_gas_field()),
            (constants::ignores_gas_price(), ignores_gas_price_field()),
            (constants::get_gas_price(), gas_price_field()),
            (constants::get_final_supply(), final_supply_field()),
            (constants::get_current_inflation(), inflation_field()),
            (constants::get_verification_version(), verification_version_field()),
            (get_count(), count_field()),
        ];
        if let Some((_, field)) = getter_fields.iter().find(|(getter, _)| getter == method) {
            return heap.get_field(&receiver, field).map(Some);
        }

        if *method == increment() || *method == sneaky_get_count() {
            let count = big_integer(heap.get_field(&receiver, &count_field())?)?;
            heap.set_field(&receiver, &count_field(), StorageValue::BigInteger(count + 1))?;
            let result =
                (*method == sneaky_get_count()).then_some(StorageValue::BigInteger(count + 1));
            Ok(result)
        } else if *method == set_label() {
            let label = string_arg(actuals, 0)?;
            heap.set_field(&receiver, &label_field(), StorageValue::String(label))?;
            Ok(None)
        } else if *method == fail() {
            Err(CodeError::thrown("IllegalStateException", "the counter failed", false))
        } else if *method == check_positive() {
            if big_integer_arg(actuals, 0)? <= 0 {
                return Err(CodeError::thrown("IllegalArgumentException", "not positive", true));
            }
            Ok(None)
        } else if *method == burn() {
            loop {
                heap.charge_cpu(1_000)?;
            }
        } else if *method == faucet() {
            let amount = big_integer_arg(actuals, 0)?;
            let public_key = string_arg(actuals, 1)?;
            let balance = heap.balance_of(&receiver)?;
            if balance < amount {
                return Err(CodeError::thrown(
                    "IllegalArgumentException",
                    "not enough coins",
                    false,
                ));
            }
            heap.set_balance_of(&receiver, balance - amount)?;
            let account = heap.create_object(EXTERNALLY_OWNED_ACCOUNT)?;
            heap.set_balance_of(&account, amount)?;
            let public_key = StorageValue::String(public_key);
            heap.set_field(&account, &constants::public_key_field(), public_key)?;
            Ok(Some(StorageValue::Reference(account)))
        } else if *method == set_gas_price() {
            let gas_price = big_integer_arg(actuals, 0)?;
            heap.set_field(&receiver, &gas_price_field(), StorageValue::BigInteger(gas_price))?;
            emit(heap, GAS_PRICE_UPDATE, receiver)?;
            Ok(None)
        } else if *method == increase_verification_version() {
            let version = heap
                .get_field(&receiver, &verification_version_field())?
                .as_long()
                .unwrap_or(0);
            let version = StorageValue::Long(version + 1);
            heap.set_field(&receiver, &verification_version_field(), version)?;
            emit(heap, CONSENSUS_UPDATE, receiver)?;
            Ok(None)
        } else if *method == constants::validators_reward() {
            reward(heap, receiver, actuals)?;
            Ok(None)
        } else {
            Err(CodeError::UnmatchedTarget(method.to_string()))
        }
    }
}

/// Moves the coins minted into the manifest to the validators and records the new supply.
fn reward(
    heap: &mut ObjectHeap<'_>,
    validators: StorageReference,
    actuals: &[StorageValue],
) -> Result<(), CodeError> {
    let amount = big_integer_arg(actuals, 0)?;
    let minted = big_integer_arg(actuals, 1)?;
    let behaving = string_arg(actuals, 2)?;
    if amount == 0 && minted == 0 {
        return Ok(());
    }
    let caller = heap
        .caller()
        .ok_or_else(|| CodeError::thrown("IllegalStateException", "no caller", false))?;
    let caller_balance = heap.balance_of(&caller)?;
    heap.set_balance_of(&caller, caller_balance - amount)?;
    let balance = heap.balance_of(&validators)?;
    heap.set_balance_of(&validators, balance + amount)?;
    let supply_field = constants::validators_current_supply_field();
    let supply = big_integer(heap.get_field(&validators, &supply_field)?)?;
    heap.set_field(&validators, &supply_field, StorageValue::BigInteger(supply + minted))?;
    heap.set_field(&validators, &last_behaving_field(), StorageValue::String(behaving))
}

fn emit(
    heap: &mut ObjectHeap<'_>,
    class_name: &str,
    creator: StorageReference,
) -> Result<(), CodeError> {
    let event = heap.create_object(class_name)?;
    heap.set_field(&event, &constants::event_creator_field(), StorageValue::Reference(creator))?;
    heap.emit_event(event)
}

fn arg(actuals: &[StorageValue], index: usize) -> Result<&StorageValue, CodeError> {
    actuals
        .get(index)
        .ok_or_else(|| CodeError::Deserialization(format!("argument {index}")))
}

fn big_integer(value: StorageValue) -> Result<BigInteger, CodeError> {
    value
        .as_big_integer()
        .ok_or_else(|| CodeError::Deserialization("a big integer".to_string()))
}

fn big_integer_arg(actuals: &[StorageValue], index: usize) -> Result<BigInteger, CodeError> {
    big_integer(arg(actuals, index)?.clone())
}

fn long_arg(actuals: &[StorageValue], index: usize) -> Result<i64, CodeError> {
    arg(actuals, index)?
        .as_long()
        .ok_or_else(|| CodeError::Deserialization(format!("argument {index}")))
}

fn int_arg(actuals: &[StorageValue], index: usize) -> Result<i32, CodeError> {
    match arg(actuals, index)? {
        StorageValue::Int(value) => Ok(*value),
        _ => Err(CodeError::Deserialization(format!("argument {index}"))),
    }
}

fn bool_arg(actuals: &[StorageValue], index: usize) -> Result<bool, CodeError> {
    arg(actuals, index)?
        .as_bool()
        .ok_or_else(|| CodeError::Deserialization(format!("argument {index}")))
}

fn string_arg(actuals: &[StorageValue], index: usize) -> Result<String, CodeError> {
    arg(actuals, index)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| CodeError::Deserialization(format!("argument {index}")))
}
