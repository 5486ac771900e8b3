/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The interfaces of the external collaborators that verify, instrument and run the code
//! installed in the node.
//!
//! The engine never sees the store directly: code runs against an [ObjectHeap], which loads
//! objects lazily from the execution environment, meters gas and records the effects that
//! become the updates of the response.

use std::sync::Arc;

use crate::{
    config::ConsensusConfig,
    constants::{EVENT, EXTERNALLY_OWNED_ACCOUNT},
    crypto::SignatureAlgorithm,
    error::StoreError,
    gas::OutOfGas,
    types::{
        Cause, ConstructorSignature, FieldSignature, MethodSignature, StorageReference,
        StorageValue, TransactionReference,
    },
};

use super::ObjectHeap;

/// An installed jar, as handed to the engine to build a class loader.
#[derive(Clone, Debug)]
pub struct ClasspathJar {
    pub reference: TransactionReference,
    pub instrumented_jar: Vec<u8>,
    pub verification_version: u64,
}

/// What the engine knows of a method or constructor, from its annotations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodeInfo {
    /// The code has no side effects, apart from those on the caller's balance and nonce.
    pub is_view: bool,
    /// The code declares that it can throw checked exceptions.
    pub throws_exceptions: bool,
    pub is_static: bool,
}

/// The resolution of the classes of a classpath.
pub trait EngineClassLoader: Send + Sync {
    /// The lengths of the jars loaded by this class loader, dependencies included.
    fn lengths_of_jars(&self) -> Vec<usize>;

    /// The fields of the instances of `class_name`, inherited fields included.
    /// `None` if the class cannot be resolved.
    fn fields_of(&self, class_name: &str) -> Option<Vec<FieldSignature>>;

    /// The jar where `class_name` is defined.
    fn jar_of(&self, class_name: &str) -> Option<TransactionReference>;

    fn is_subclass_of(&self, class_name: &str, superclass: &str) -> bool;

    /// The algorithm that signs the requests of the accounts of `class_name`, if it imposes one.
    fn signature_algorithm_of(&self, _class_name: &str) -> Option<SignatureAlgorithm> {
        None
    }

    fn is_exported(&self, class_name: &str) -> bool;

    fn is_consensus_update_event(&self, class_name: &str) -> bool;

    fn is_gas_price_update_event(&self, class_name: &str) -> bool;

    fn is_inflation_update_event(&self, class_name: &str) -> bool;

    fn method_info(&self, method: &MethodSignature) -> Option<CodeInfo>;

    fn constructor_info(&self, constructor: &ConstructorSignature) -> Option<CodeInfo>;

    fn is_event(&self, class_name: &str) -> bool {
        self.is_subclass_of(class_name, EVENT)
    }

    fn is_externally_owned_account(&self, class_name: &str) -> bool {
        self.is_subclass_of(class_name, EXTERNALLY_OWNED_ACCOUNT)
    }
}

/// The verifier, instrumenter and interpreter of the code installed in the node.
pub trait ExecutionEngine: Send + Sync {
    /// Builds the class loader of a classpath. `jars` lists the installed jars of the classpath,
    /// dependencies first.
    fn class_loader(
        &self,
        jars: &[ClasspathJar],
        consensus: &ConsensusConfig,
    ) -> Result<Arc<dyn EngineClassLoader>, String>;

    /// Verifies and instruments a jar, given its already instrumented dependencies.
    fn instrument(
        &self,
        jar: &[u8],
        dependencies: &[&[u8]],
        consensus: &ConsensusConfig,
    ) -> Result<Vec<u8>, String>;

    /// Runs a constructor and yields the new object.
    fn run_constructor(
        &self,
        heap: &mut ObjectHeap<'_>,
        constructor: &ConstructorSignature,
        actuals: &[StorageValue],
    ) -> Result<StorageReference, CodeError>;

    /// Runs a method. `receiver` is `None` for static methods. Yields `None` for void methods.
    fn run_method(
        &self,
        heap: &mut ObjectHeap<'_>,
        method: &MethodSignature,
        receiver: Option<StorageReference>,
        actuals: &[StorageValue],
    ) -> Result<Option<StorageValue>, CodeError>;
}

/// The ways in which running code can go wrong.
#[derive(Debug, thiserror::Error)]
pub enum CodeError {
    /// The code threw an exception. It is `checked` if the code can declare it as thrown.
    #[error("{class_name}: {message}")]
    Thrown {
        class_name: String,
        message: String,
        location: String,
        checked: bool,
    },

    #[error(transparent)]
    OutOfGas(#[from] OutOfGas),

    #[error("cannot assign {field} of {object}")]
    IllegalAssignment {
        object: StorageReference,
        field: FieldSignature,
    },

    #[error("{object} has no field {field}")]
    UnknownField {
        object: StorageReference,
        field: FieldSignature,
    },

    /// The target of a call cannot be resolved.
    #[error("cannot find {0}")]
    UnmatchedTarget(String),

    #[error("cannot deserialize {0}")]
    Deserialization(String),

    #[error(transparent)]
    Store(StoreError),
}

impl CodeError {
    pub fn thrown(class_name: &str, message: &str, checked: bool) -> Self {
        CodeError::Thrown {
            class_name: class_name.to_string(),
            message: message.to_string(),
            location: String::new(),
            checked,
        }
    }

    /// The exception reported to the user in the response.
    pub fn cause(&self) -> Cause {
        let class_name = match self {
            CodeError::Thrown {
                class_name,
                location,
                message,
                ..
            } => {
                return Cause {
                    class_name: class_name.clone(),
                    message: message.clone(),
                    location: location.clone(),
                }
            }
            CodeError::OutOfGas(_) => "OutOfGasError",
            CodeError::IllegalAssignment { .. } => "IllegalAssignmentError",
            CodeError::UnknownField { .. } => "NoSuchFieldError",
            CodeError::UnmatchedTarget(_) => "NoSuchMethodException",
            CodeError::Deserialization(_) => "DeserializationError",
            CodeError::Store(_) => "StoreError",
        };
        Cause {
            class_name: class_name.to_string(),
            message: self.to_string(),
            location: String::new(),
        }
    }
}
