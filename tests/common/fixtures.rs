/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Nodes bootstrapped with the mock base library, and helpers to build signed requests.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use ed25519_dalek::{Signer, SigningKey};
use moka_node_local::{
    constants,
    crypto::{encode_public_key, Hasher},
    execution::builders::gamete_creation_request,
    types::{
        BigInteger, ConstructorCallRequest, ConstructorSignature, FieldSignature,
        InitializationRequest, InstanceMethodCallRequest, JarStoreInitialRequest, MethodSignature,
        RequestHeader, StorageReference, StorageValue, TransactionReference, TransactionRequest,
        TransactionResponse, Update,
    },
    LocalNode, LocalNodeConfig, MemDB, NodeError,
};

use super::mock_engine::{self, MockEngine, JAR_MAGIC};

pub const CHAIN_ID: &str = "moka-test";
pub const GAS_PRICE: BigInteger = 100;
pub const GAS_LIMIT: u64 = 100_000;
pub const GAMETE_FUNDS: BigInteger = 1_000_000_000_000_000_000;

pub fn base_jar() -> Vec<u8> {
    let mut jar = JAR_MAGIC.to_vec();
    jar.extend_from_slice(b" base library");
    jar
}

/// A configuration with short delays, to keep the tests fast.
pub fn test_config() -> LocalNodeConfig {
    LocalNodeConfig::builder()
        .max_polling_attempts(20)
        .polling_delay(Duration::from_millis(5))
        .gc_rescan_interval(Duration::from_millis(50))
        .build()
}

pub struct Account {
    pub reference: StorageReference,
    pub key: SigningKey,
}

impl Account {
    pub fn sign(&self, request: TransactionRequest) -> TransactionRequest {
        let signature = self.key.sign(&request.bytes_to_sign()).to_bytes().to_vec();
        request.with_signature(signature)
    }
}

pub struct TestNode {
    pub node: LocalNode<MemDB>,
    pub kv: MemDB,
    pub engine: Arc<MockEngine>,
    pub base_jar: TransactionReference,
    pub gamete: Account,
    pub manifest: StorageReference,
}

/// Options of the governance of a bootstrapped node.
#[derive(Clone, Copy)]
pub struct Governance {
    pub inflation: i64,
    pub allows_unsigned_faucet: bool,
    pub final_supply: BigInteger,
}

impl Default for Governance {
    fn default() -> Self {
        Self {
            inflation: 0,
            allows_unsigned_faucet: false,
            final_supply: mock_engine::FINAL_SUPPLY,
        }
    }
}

pub fn initialized_node(config: LocalNodeConfig) -> TestNode {
    initialized_node_with(config, Governance::default())
}

pub fn initialized_node_with(config: LocalNodeConfig, governance: Governance) -> TestNode {
    let kv = MemDB::new();
    let engine = MockEngine::new();
    let node = LocalNode::open(kv.clone(), engine.clone(), config).unwrap();
    let gamete_key = SigningKey::from_bytes(&[1u8; 32]);
    let (base_jar, gamete, manifest) = bootstrap(&node, &gamete_key, governance).unwrap();
    TestNode {
        node,
        kv,
        engine,
        base_jar,
        gamete: Account {
            reference: gamete,
            key: gamete_key,
        },
        manifest,
    }
}

/// Installs the base jar, creates the gamete and the manifest, initializes the node and commits.
pub fn bootstrap(
    node: &LocalNode<MemDB>,
    gamete_key: &SigningKey,
    governance: Governance,
) -> anyhow::Result<(TransactionReference, StorageReference, StorageReference)> {
    let jar_store = TransactionRequest::JarStoreInitial(JarStoreInitialRequest {
        jar: base_jar(),
        dependencies: vec![],
    });
    let base_jar = Hasher.hash_request(&jar_store);
    node.deliver_transaction(jar_store)
        .context("cannot install the base jar")?;

    let creation = TransactionRequest::GameteCreation(gamete_creation_request(
        base_jar,
        GAMETE_FUNDS,
        gamete_key.verifying_key().as_bytes(),
    ));
    let gamete = match node.deliver_transaction(creation)? {
        TransactionResponse::GameteCreation(response) => response.gamete,
        other => bail!("unexpected response {other:?}"),
    };

    let header = header(gamete, 0, GAS_LIMIT, base_jar);
    let manifest_call = TransactionRequest::ConstructorCall(ConstructorCallRequest {
        header,
        constructor: mock_engine::manifest_constructor(),
        actuals: vec![
            StorageValue::String(CHAIN_ID.to_string()),
            StorageValue::BigInteger(GAS_PRICE),
            StorageValue::Long(governance.inflation),
            StorageValue::Boolean(governance.allows_unsigned_faucet),
            StorageValue::BigInteger(governance.final_supply),
        ],
    });
    let manifest = match node.deliver_transaction(manifest_call)? {
        TransactionResponse::ConstructorCallSuccessful(response) => response.new_object,
        other => bail!("unexpected response {other:?}"),
    };

    node.deliver_transaction(TransactionRequest::Initialization(InitializationRequest {
        classpath: base_jar,
        manifest,
    }))?;
    node.commit()?;
    Ok((base_jar, gamete, manifest))
}

pub fn header(
    caller: StorageReference,
    nonce: BigInteger,
    gas_limit: u64,
    classpath: TransactionReference,
) -> RequestHeader {
    RequestHeader {
        caller,
        nonce,
        gas_limit,
        gas_price: GAS_PRICE,
        classpath,
        chain_id: CHAIN_ID.to_string(),
        signature: vec![],
    }
}

impl TestNode {
    pub fn header(&self, caller: &Account, nonce: BigInteger, gas_limit: u64) -> RequestHeader {
        header(caller.reference, nonce, gas_limit, self.base_jar)
    }

    /// A signed constructor call, with the nonce of the caller in the head.
    pub fn constructor_call(
        &self,
        caller: &Account,
        constructor: ConstructorSignature,
        actuals: Vec<StorageValue>,
    ) -> TransactionRequest {
        let nonce = self.nonce_of(&caller.reference);
        caller.sign(TransactionRequest::ConstructorCall(ConstructorCallRequest {
            header: self.header(caller, nonce, GAS_LIMIT),
            constructor,
            actuals,
        }))
    }

    /// A signed instance method call, with the nonce of the caller in the head.
    pub fn instance_call(
        &self,
        caller: &Account,
        receiver: StorageReference,
        method: MethodSignature,
        actuals: Vec<StorageValue>,
    ) -> TransactionRequest {
        let nonce = self.nonce_of(&caller.reference);
        self.instance_call_with(caller, nonce, GAS_LIMIT, receiver, method, actuals)
    }

    pub fn instance_call_with(
        &self,
        caller: &Account,
        nonce: BigInteger,
        gas_limit: u64,
        receiver: StorageReference,
        method: MethodSignature,
        actuals: Vec<StorageValue>,
    ) -> TransactionRequest {
        caller.sign(TransactionRequest::InstanceMethodCall(InstanceMethodCallRequest {
            header: self.header(caller, nonce, gas_limit),
            method,
            receiver,
            actuals,
        }))
    }

    /// An unsigned view call of a getter, on behalf of the gamete.
    pub fn view_call(
        &self,
        receiver: StorageReference,
        method: MethodSignature,
    ) -> InstanceMethodCallRequest {
        InstanceMethodCallRequest {
            header: self.header(&self.gamete, 0, GAS_LIMIT),
            method,
            receiver,
            actuals: vec![],
        }
    }

    /// Creates a counter on behalf of the gamete and commits it.
    pub fn create_counter(&self) -> StorageReference {
        let request =
            self.constructor_call(&self.gamete, mock_engine::counter_constructor(), vec![]);
        let counter = match self.node.deliver_transaction(request).unwrap() {
            TransactionResponse::ConstructorCallSuccessful(response) => response.new_object,
            other => panic!("unexpected response {other:?}"),
        };
        self.node.commit().unwrap();
        counter
    }

    /// Creates and commits an account funded by the gamete, through its faucet.
    pub fn create_account(&self, seed: u8, funds: BigInteger) -> Account {
        let key = SigningKey::from_bytes(&[seed; 32]);
        let request = self.instance_call(
            &self.gamete,
            self.gamete.reference,
            mock_engine::faucet(),
            vec![
                StorageValue::BigInteger(funds),
                StorageValue::String(encode_public_key(key.verifying_key().as_bytes())),
            ],
        );
        let reference = match self.node.deliver_transaction(request).unwrap() {
            TransactionResponse::MethodCallSuccessful(response) => {
                response.result.and_then(|value| value.as_reference()).unwrap()
            }
            other => panic!("unexpected response {other:?}"),
        };
        self.node.commit().unwrap();
        Account { reference, key }
    }

    pub fn field_of(
        &self,
        object: &StorageReference,
        field: &FieldSignature,
    ) -> Option<StorageValue> {
        self.node
            .get_state(object)
            .unwrap()
            .into_iter()
            .find_map(|update| match update {
                Update::Field {
                    field: found, value, ..
                } if found == *field => Some(value),
                _ => None,
            })
    }

    pub fn big_integer_of(&self, object: &StorageReference, field: &FieldSignature) -> BigInteger {
        self.field_of(object, field)
            .and_then(|value| value.as_big_integer())
            .unwrap()
    }

    pub fn nonce_of(&self, account: &StorageReference) -> BigInteger {
        self.big_integer_of(account, &constants::nonce_field())
    }

    pub fn balance_of(&self, contract: &StorageReference) -> BigInteger {
        self.big_integer_of(contract, &constants::balance_field())
    }

    pub fn reference_of(
        &self,
        object: &StorageReference,
        field: &FieldSignature,
    ) -> StorageReference {
        self.field_of(object, field)
            .and_then(|value| value.as_reference())
            .unwrap()
    }
}

/// The message of a rejection. Panics on any other error.
pub fn rejection(error: NodeError) -> String {
    match error {
        NodeError::Rejected(rejected) => rejected.message,
        other => panic!("expected a rejection, got {other:?}"),
    }
}

/// Polls `condition` until it holds, for at most `timeout`.
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
