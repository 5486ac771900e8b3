/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The execution environment: the view of the store against which requests are checked and run.
//!
//! Both a [Store](crate::store::Store) and a [StoreTransformation](crate::store::StoreTransformation)
//! are execution environments. They only need to provide the raw lookups; the reconstruction of
//! the state of objects, the resolution of classpaths and the checks of signatures are implemented
//! once here on top of them.

use std::{collections::BTreeSet, sync::Arc};

use crate::{
    config::ConsensusConfig,
    constants,
    crypto::Hasher,
    error::{DeliveryError, StoreError},
    store::StoreCache,
    types::{
        BigInteger, FieldSignature, RequestHeader, StorageReference, StorageValue,
        TransactionReference, TransactionRequest, TransactionResponse, Update,
    },
};

use super::{ClasspathJar, EngineClassLoader, ExecutionEngine};

pub trait ExecutionEnvironment: Send + Sync {
    fn request(&self, reference: &TransactionReference) -> Option<&TransactionRequest>;

    fn response(&self, reference: &TransactionReference) -> Option<&TransactionResponse>;

    /// The history of an object, newest transaction first.
    fn history(&self, object: &StorageReference) -> Option<&[TransactionReference]>;

    fn manifest(&self) -> Option<StorageReference>;

    /// Milliseconds since the Unix epoch at which the transactions are executed.
    fn now(&self) -> u64;

    fn cache(&self) -> &StoreCache;

    fn engine(&self) -> &dyn ExecutionEngine;

    fn consensus(&self) -> &ConsensusConfig {
        self.cache().consensus()
    }

    fn hasher(&self) -> Hasher {
        Hasher
    }

    /// The class tag of an object, taken from the transaction that created it,
    /// which is the last of its history.
    fn class_tag(&self, object: &StorageReference) -> Result<Update, StoreError> {
        let history = self
            .history(object)
            .ok_or(StoreError::UnknownObject(*object))?;
        let creation = history
            .last()
            .ok_or(StoreError::UnknownObject(*object))?;
        self.response_with_updates(creation, object)?
            .updates()
            .iter()
            .find(|update| update.is_class_tag() && update.object() == *object)
            .cloned()
            .ok_or_else(|| {
                StoreError::Inconsistent(format!(
                    "the creation transaction of {object} does not contain its class tag"
                ))
            })
    }

    fn class_name(&self, object: &StorageReference) -> Result<String, StoreError> {
        match self.class_tag(object)? {
            Update::ClassTag { class_name, .. } => Ok(class_name),
            Update::Field { .. } => Err(StoreError::UnknownObject(*object)),
        }
    }

    /// The current state of an object: its class tag and the last update of each of its fields.
    fn state(&self, object: &StorageReference) -> Result<Vec<Update>, StoreError> {
        let history = self
            .history(object)
            .ok_or(StoreError::UnknownObject(*object))?;
        let mut state: Vec<Update> = Vec::new();
        for reference in history {
            for update in self.response_with_updates(reference, object)?.updates() {
                if update.object() == *object && !state.iter().any(|u| u.same_property(update)) {
                    state.push(update.clone());
                }
            }
        }
        state.sort();
        Ok(state)
    }

    /// The current value of a field of an object.
    fn field_value(
        &self,
        object: &StorageReference,
        field: &FieldSignature,
    ) -> Result<StorageValue, StoreError> {
        let history = self
            .history(object)
            .ok_or(StoreError::UnknownObject(*object))?;
        for reference in history {
            let found = self
                .response_with_updates(reference, object)?
                .updates()
                .iter()
                .find(|update| update.object() == *object && update.field() == Some(field))
                .and_then(|update| update.value().cloned());
            if let Some(value) = found {
                return Ok(value);
            }
        }
        Err(StoreError::FieldNotFound {
            object: *object,
            field: field.clone(),
        })
    }

    fn big_integer_field(
        &self,
        object: &StorageReference,
        field: &FieldSignature,
    ) -> Result<BigInteger, StoreError> {
        self.field_value(object, field)?
            .as_big_integer()
            .ok_or_else(|| wrong_type(object, field))
    }

    fn reference_field(
        &self,
        object: &StorageReference,
        field: &FieldSignature,
    ) -> Result<StorageReference, StoreError> {
        self.field_value(object, field)?
            .as_reference()
            .ok_or_else(|| wrong_type(object, field))
    }

    fn balance(&self, contract: &StorageReference) -> Result<BigInteger, StoreError> {
        self.big_integer_field(contract, &constants::balance_field())
    }

    fn nonce(&self, account: &StorageReference) -> Result<BigInteger, StoreError> {
        self.big_integer_field(account, &constants::nonce_field())
    }

    /// The base64 encoding of the public key of an account.
    fn public_key(&self, account: &StorageReference) -> Result<String, StoreError> {
        let field = constants::public_key_field();
        match self.field_value(account, &field)? {
            StorageValue::String(key) => Ok(key),
            _ => Err(wrong_type(account, &field)),
        }
    }

    fn gamete(&self) -> Result<Option<StorageReference>, StoreError> {
        self.manifest()
            .map(|manifest| self.reference_field(&manifest, &constants::manifest_gamete_field()))
            .transpose()
    }

    /// The jar of the class of the manifest, which is the classpath of the transactions
    /// started by the node itself.
    fn base_classpath(&self) -> Result<Option<TransactionReference>, StoreError> {
        match self.manifest() {
            Some(manifest) => match self.class_tag(&manifest)? {
                Update::ClassTag { jar, .. } => Ok(Some(jar)),
                Update::Field { .. } => Err(StoreError::UnknownObject(manifest)),
            },
            None => Ok(None),
        }
    }

    /// The class loader for a classpath made of the given jars and their dependencies.
    /// Class loaders of a single jar are kept in the cache.
    fn class_loader(
        &self,
        classpaths: &[TransactionReference],
    ) -> Result<Arc<dyn EngineClassLoader>, DeliveryError> {
        if let [classpath] = classpaths {
            if let Some(class_loader) = self.cache().class_loader(classpath) {
                return Ok(class_loader);
            }
        }

        let jars = self.classpath_jars(classpaths)?;
        let class_loader = self
            .engine()
            .class_loader(&jars, self.consensus())
            .map_err(|message| {
                DeliveryError::rejected(format!("Cannot create the class loader: {message}"))
            })?;

        if let [classpath] = classpaths {
            self.cache().put_class_loader(*classpath, Arc::clone(&class_loader));
        }
        Ok(class_loader)
    }

    /// The installed jars reachable from the given classpaths, each dependency before its
    /// dependents.
    fn classpath_jars(
        &self,
        classpaths: &[TransactionReference],
    ) -> Result<Vec<ClasspathJar>, DeliveryError> {
        let mut jars = Vec::new();
        let mut visited = BTreeSet::new();
        // depth-first, post-order
        let mut stack: Vec<(TransactionReference, bool)> =
            classpaths.iter().rev().map(|classpath| (*classpath, false)).collect();
        while let Some((reference, expanded)) = stack.pop() {
            if expanded {
                let (jar, _, verification_version) = self.installed_jar(&reference)?;
                jars.push(ClasspathJar {
                    reference,
                    instrumented_jar: jar.to_vec(),
                    verification_version,
                });
            } else if visited.insert(reference) {
                let (_, dependencies, _) = self.installed_jar(&reference)?;
                stack.push((reference, true));
                for dependency in dependencies.iter().rev() {
                    if !visited.contains(dependency) {
                        stack.push((*dependency, false));
                    }
                }
            }
        }
        Ok(jars)
    }

    fn installed_jar(
        &self,
        classpath: &TransactionReference,
    ) -> Result<(&[u8], &[TransactionReference], u64), DeliveryError> {
        let response = self.response(classpath).ok_or_else(|| {
            DeliveryError::rejected(format!("Unknown classpath {classpath}"))
        })?;
        response.installed_jar().ok_or_else(|| {
            DeliveryError::rejected(format!(
                "The classpath {classpath} does not refer to a jar installation"
            ))
        })
    }

    /// Checks the signature of a request, memoizing the outcome by reference.
    fn signature_is_valid(
        &self,
        reference: &TransactionReference,
        request: &TransactionRequest,
        header: &RequestHeader,
        class_loader: &dyn EngineClassLoader,
    ) -> Result<bool, DeliveryError> {
        if let Some(is_valid) = self.cache().signature_check(reference) {
            return Ok(is_valid);
        }

        let class_name = self.class_name(&header.caller)?;
        let algorithm = class_loader
            .signature_algorithm_of(&class_name)
            .unwrap_or(self.consensus().signature_for_requests);
        let public_key = self.public_key(&header.caller)?;
        let is_valid = algorithm
            .verify(&public_key, &request.bytes_to_sign(), &header.signature)
            .unwrap_or(false);

        self.cache().put_signature_check(*reference, is_valid);
        Ok(is_valid)
    }

    /// The response of a transaction in the history of `object`, which must have updates.
    fn response_with_updates(
        &self,
        reference: &TransactionReference,
        object: &StorageReference,
    ) -> Result<&TransactionResponse, StoreError> {
        let response = self.response(reference).ok_or_else(|| {
            StoreError::Inconsistent(format!(
                "transaction {reference} belongs to the history of {object} but is not in store"
            ))
        })?;
        if response.has_updates() {
            Ok(response)
        } else {
            Err(StoreError::Inconsistent(format!(
                "transaction {reference} belongs to the history of {object} but does not contain updates"
            )))
        }
    }
}

fn wrong_type(object: &StorageReference, field: &FieldSignature) -> StoreError {
    StoreError::Inconsistent(format!("the field {field} of {object} has an unexpected type"))
}
