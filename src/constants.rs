/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Names of the classes, fields and methods of the base library that the engine
//! needs to know about: accounts, events, and the governance contracts reachable
//! from the manifest.

use crate::types::{FieldSignature, MethodSignature, StorageType};

pub const CONTRACT: &str = "moka.lang.Contract";
pub const EXTERNALLY_OWNED_ACCOUNT: &str = "moka.lang.ExternallyOwnedAccount";
pub const GAMETE: &str = "moka.lang.Gamete";
pub const EVENT: &str = "moka.lang.Event";
pub const MANIFEST: &str = "moka.governance.Manifest";
pub const VALIDATORS: &str = "moka.governance.AbstractValidators";
pub const GAS_STATION: &str = "moka.governance.GasStation";
pub const VERSIONS: &str = "moka.governance.Versions";

/// The prefix of the names of the faucet methods of the gamete.
pub const FAUCET_PREFIX: &str = "faucet";

pub fn balance_field() -> FieldSignature {
    FieldSignature::new(CONTRACT, "balance", StorageType::BigInteger)
}

pub fn nonce_field() -> FieldSignature {
    FieldSignature::new(EXTERNALLY_OWNED_ACCOUNT, "nonce", StorageType::BigInteger)
}

pub fn public_key_field() -> FieldSignature {
    FieldSignature::new(EXTERNALLY_OWNED_ACCOUNT, "publicKey", StorageType::String)
}

pub fn event_creator_field() -> FieldSignature {
    FieldSignature::new(EVENT, "creator", StorageType::Class(CONTRACT.to_string()))
}

pub fn manifest_validators_field() -> FieldSignature {
    FieldSignature::new(MANIFEST, "validators", StorageType::Class(VALIDATORS.to_string()))
}

pub fn manifest_gas_station_field() -> FieldSignature {
    FieldSignature::new(MANIFEST, "gasStation", StorageType::Class(GAS_STATION.to_string()))
}

pub fn manifest_versions_field() -> FieldSignature {
    FieldSignature::new(MANIFEST, "versions", StorageType::Class(VERSIONS.to_string()))
}

pub fn manifest_gamete_field() -> FieldSignature {
    FieldSignature::new(MANIFEST, "gamete", StorageType::Class(GAMETE.to_string()))
}

pub fn validators_current_supply_field() -> FieldSignature {
    FieldSignature::new(VALIDATORS, "currentSupply", StorageType::BigInteger)
}

fn getter(defining_class: &str, name: &str, returns: StorageType) -> MethodSignature {
    MethodSignature::new(defining_class, name, vec![], Some(returns))
}

pub fn get_chain_id() -> MethodSignature {
    getter(MANIFEST, "getChainId", StorageType::String)
}

pub fn get_max_error_length() -> MethodSignature {
    getter(MANIFEST, "getMaxErrorLength", StorageType::Long)
}

pub fn allows_unsigned_faucet() -> MethodSignature {
    getter(MANIFEST, "allowsUnsignedFaucet", StorageType::Boolean)
}

pub fn get_signature() -> MethodSignature {
    getter(MANIFEST, "getSignature", StorageType::String)
}

pub fn get_max_gas_per_transaction() -> MethodSignature {
    getter(GAS_STATION, "getMaxGasPerTransaction", StorageType::BigInteger)
}

pub fn ignores_gas_price() -> MethodSignature {
    getter(GAS_STATION, "ignoresGasPrice", StorageType::Boolean)
}

pub fn get_gas_price() -> MethodSignature {
    getter(GAS_STATION, "getGasPrice", StorageType::BigInteger)
}

pub fn get_final_supply() -> MethodSignature {
    getter(VALIDATORS, "getFinalSupply", StorageType::BigInteger)
}

pub fn get_current_inflation() -> MethodSignature {
    getter(VALIDATORS, "getCurrentInflation", StorageType::Long)
}

pub fn get_verification_version() -> MethodSignature {
    getter(VERSIONS, "getVerificationVersion", StorageType::Long)
}

/// `reward(amount, minted, behaving, misbehaving, gasConsumed, numberOfTransactionsSinceLastReward)`
/// of the validators contract, called by the manifest at the end of each round.
pub fn validators_reward() -> MethodSignature {
    MethodSignature::new(
        VALIDATORS,
        "reward",
        vec![
            StorageType::BigInteger,
            StorageType::BigInteger,
            StorageType::String,
            StorageType::String,
            StorageType::BigInteger,
            StorageType::BigInteger,
        ],
        None,
    )
}
