/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Transaction requests: the immutable descriptions of the actions to perform.
//!
//! Initial requests (jar store initial, gamete creation, initialization) are only
//! accepted before the node gets initialized, are not paid and are not signed.
//! Every other request carries a [RequestHeader] naming the caller that pays for it.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    encoded_len, BigInteger, ConstructorSignature, MethodSignature, StorageReference,
    StorageValue, TransactionReference,
};

/// The fields shared by all non-initial requests.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct RequestHeader {
    /// The externally owned account that pays for the transaction.
    pub caller: StorageReference,
    pub nonce: BigInteger,
    pub gas_limit: u64,
    pub gas_price: BigInteger,
    /// The jar whose class loader runs the transaction.
    pub classpath: TransactionReference,
    pub chain_id: String,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct JarStoreInitialRequest {
    pub jar: Vec<u8>,
    pub dependencies: Vec<TransactionReference>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct GameteCreationRequest {
    pub classpath: TransactionReference,
    pub initial_amount: BigInteger,
    /// Base64 encoding of the public key of the gamete.
    pub public_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct InitializationRequest {
    pub classpath: TransactionReference,
    pub manifest: StorageReference,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct JarStoreRequest {
    pub header: RequestHeader,
    pub jar: Vec<u8>,
    pub dependencies: Vec<TransactionReference>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct ConstructorCallRequest {
    pub header: RequestHeader,
    pub constructor: ConstructorSignature,
    pub actuals: Vec<StorageValue>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct InstanceMethodCallRequest {
    pub header: RequestHeader,
    pub method: MethodSignature,
    pub receiver: StorageReference,
    pub actuals: Vec<StorageValue>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct StaticMethodCallRequest {
    pub header: RequestHeader,
    pub method: MethodSignature,
    pub actuals: Vec<StorageValue>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum TransactionRequest {
    JarStoreInitial(JarStoreInitialRequest),
    GameteCreation(GameteCreationRequest),
    Initialization(InitializationRequest),
    JarStore(JarStoreRequest),
    ConstructorCall(ConstructorCallRequest),
    InstanceMethodCall(InstanceMethodCallRequest),
    StaticMethodCall(StaticMethodCallRequest),
    /// A call run by the node itself, for instance to reward the validators.
    /// It is not signed, has no chain id and its gas is free.
    InstanceSystemMethodCall(InstanceMethodCallRequest),
}

impl TransactionRequest {
    pub fn header(&self) -> Option<&RequestHeader> {
        match self {
            TransactionRequest::JarStore(r) => Some(&r.header),
            TransactionRequest::ConstructorCall(r) => Some(&r.header),
            TransactionRequest::InstanceMethodCall(r)
            | TransactionRequest::InstanceSystemMethodCall(r) => Some(&r.header),
            TransactionRequest::StaticMethodCall(r) => Some(&r.header),
            _ => None,
        }
    }

    fn header_mut(&mut self) -> Option<&mut RequestHeader> {
        match self {
            TransactionRequest::JarStore(r) => Some(&mut r.header),
            TransactionRequest::ConstructorCall(r) => Some(&mut r.header),
            TransactionRequest::InstanceMethodCall(r)
            | TransactionRequest::InstanceSystemMethodCall(r) => Some(&mut r.header),
            TransactionRequest::StaticMethodCall(r) => Some(&mut r.header),
            _ => None,
        }
    }

    pub fn is_initial(&self) -> bool {
        matches!(
            self,
            TransactionRequest::JarStoreInitial(_)
                | TransactionRequest::GameteCreation(_)
                | TransactionRequest::Initialization(_)
        )
    }

    pub fn is_system(&self) -> bool {
        matches!(self, TransactionRequest::InstanceSystemMethodCall(_))
    }

    /// True for the requests that must carry a signature of their caller.
    pub fn is_signed(&self) -> bool {
        !self.is_initial() && !self.is_system()
    }

    /// The number of bytes of the canonical encoding of this request.
    pub fn size(&self) -> usize {
        encoded_len(self)
    }

    /// The bytes signed by the caller: the canonical encoding of this request
    /// with an empty signature.
    pub fn bytes_to_sign(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        if let Some(header) = unsigned.header_mut() {
            header.signature.clear();
        }
        unsigned.try_to_vec().unwrap_or_default()
    }

    /// Replaces the signature of this request. It has no effect on unsigned requests.
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        if let Some(header) = self.header_mut() {
            header.signature = signature;
        }
        self
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransactionRequest::JarStoreInitial(_) => "JarStoreInitialRequest",
            TransactionRequest::GameteCreation(_) => "GameteCreationRequest",
            TransactionRequest::Initialization(_) => "InitializationRequest",
            TransactionRequest::JarStore(_) => "JarStoreRequest",
            TransactionRequest::ConstructorCall(_) => "ConstructorCallRequest",
            TransactionRequest::InstanceMethodCall(_) => "InstanceMethodCallRequest",
            TransactionRequest::StaticMethodCall(_) => "StaticMethodCallRequest",
            TransactionRequest::InstanceSystemMethodCall(_) => "InstanceSystemMethodCallRequest",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StorageType;

    fn request(signature: Vec<u8>) -> TransactionRequest {
        TransactionRequest::StaticMethodCall(StaticMethodCallRequest {
            header: RequestHeader {
                caller: StorageReference::new(TransactionReference::new([3u8; 32]), 0),
                nonce: 4,
                gas_limit: 10_000,
                gas_price: 1,
                classpath: TransactionReference::new([1u8; 32]),
                chain_id: "test".to_string(),
                signature,
            },
            method: MethodSignature::new("C", "m", vec![StorageType::Int], None),
            actuals: vec![StorageValue::Int(5)],
        })
    }

    #[test]
    fn test_bytes_to_sign_ignore_signature() {
        let unsigned = request(vec![]);
        let signed = request(vec![9u8; 64]);
        assert_eq!(unsigned.bytes_to_sign(), signed.bytes_to_sign());
        assert_ne!(unsigned.size(), signed.size());
        assert_eq!(signed.size(), unsigned.size() + 64);
        assert_eq!(unsigned.with_signature(vec![9u8; 64]), signed);
    }

    #[test]
    fn test_kinds() {
        let req = request(vec![]);
        assert!(req.is_signed());
        assert!(!req.is_initial());
        let initial = TransactionRequest::JarStoreInitial(JarStoreInitialRequest {
            jar: vec![1, 2, 3],
            dependencies: vec![],
        });
        assert!(initial.is_initial());
        assert!(!initial.is_signed());
        assert!(initial.header().is_none());
    }
}
