/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Hashing of requests and verification of their signatures.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::types::{TransactionReference, TransactionRequest, HASH_LENGTH};

/// Computes the references of requests: the sha256 digest of their canonical encoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hasher;

impl Hasher {
    pub fn hash_request(&self, request: &TransactionRequest) -> TransactionReference {
        TransactionReference::new(sha256(&request.try_to_vec().unwrap_or_default()))
    }
}

pub fn sha256(bytes: &[u8]) -> [u8; HASH_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Errors in the interpretation of a public key or of a signature.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("the public key is not valid base64: {0}")]
    PublicKeyEncoding(#[from] base64::DecodeError),
    #[error("the public key has the wrong length")]
    PublicKeyLength,
    #[error("the public key is not a point of the curve: {0}")]
    PublicKey(#[from] ed25519_dalek::SignatureError),
    #[error("unknown signature algorithm {0}")]
    UnknownAlgorithm(String),
}

/// The signature algorithms that can sign requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum SignatureAlgorithm {
    Ed25519,
    /// Accepts every signature. Only meant for tests and for the unsigned faucet.
    Empty,
}

impl SignatureAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Ed25519 => "ed25519",
            SignatureAlgorithm::Empty => "empty",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CryptoError> {
        match name {
            "ed25519" => Ok(SignatureAlgorithm::Ed25519),
            "empty" => Ok(SignatureAlgorithm::Empty),
            other => Err(CryptoError::UnknownAlgorithm(other.to_string())),
        }
    }

    /// Checks that `signature` signs `message` with the private key of `public_key`,
    /// given as base64. A malformed signature is just invalid, while a malformed key is an error.
    pub fn verify(
        &self,
        public_key: &str,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError> {
        match self {
            SignatureAlgorithm::Empty => Ok(true),
            SignatureAlgorithm::Ed25519 => {
                let key_bytes: [u8; 32] = STANDARD
                    .decode(public_key)?
                    .try_into()
                    .map_err(|_| CryptoError::PublicKeyLength)?;
                let key = VerifyingKey::from_bytes(&key_bytes)?;
                let signature = match Signature::from_slice(signature) {
                    Ok(signature) => signature,
                    Err(_) => return Ok(false),
                };
                Ok(key.verify(message, &signature).is_ok())
            }
        }
    }
}

/// Base64 encoding of a public key, as stored in the accounts.
pub fn encode_public_key(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
