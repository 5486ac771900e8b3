/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Values kept in store, their types, and the signatures of fields,
//! methods and constructors of the code installed in the node.

use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};

use super::StorageReference;

/// Arbitrary-precision-like integer used for coins, nonces and gas prices.
pub type BigInteger = i128;

/// The type of a value in store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub enum StorageType {
    Boolean,
    Int,
    Long,
    BigInteger,
    String,
    /// A reference to an object of the named class.
    Class(String),
}

/// A value that can be kept in store, as the value of a field or as an actual argument.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub enum StorageValue {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    BigInteger(BigInteger),
    String(String),
    Reference(StorageReference),
}

impl StorageValue {
    pub fn as_big_integer(&self) -> Option<BigInteger> {
        match self {
            StorageValue::BigInteger(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<StorageReference> {
        match self {
            StorageValue::Reference(reference) => Some(*reference),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StorageValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StorageValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            StorageValue::Long(value) => Some(*value),
            StorageValue::Int(value) => Some(*value as i64),
            _ => None,
        }
    }
}

impl fmt::Display for StorageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageValue::Null => write!(f, "null"),
            StorageValue::Boolean(value) => write!(f, "{value}"),
            StorageValue::Int(value) => write!(f, "{value}"),
            StorageValue::Long(value) => write!(f, "{value}"),
            StorageValue::BigInteger(value) => write!(f, "{value}"),
            StorageValue::String(value) => write!(f, "\"{value}\""),
            StorageValue::Reference(value) => write!(f, "{value}"),
        }
    }
}

/// The signature of a field of a storage class.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct FieldSignature {
    pub defining_class: String,
    pub name: String,
    pub field_type: StorageType,
}

impl FieldSignature {
    pub fn new(defining_class: &str, name: &str, field_type: StorageType) -> Self {
        Self {
            defining_class: defining_class.to_string(),
            name: name.to_string(),
            field_type,
        }
    }
}

impl fmt::Display for FieldSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.defining_class, self.name)
    }
}

/// The signature of a method. `returns` is `None` for void methods.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct MethodSignature {
    pub defining_class: String,
    pub name: String,
    pub formals: Vec<StorageType>,
    pub returns: Option<StorageType>,
}

impl MethodSignature {
    pub fn new(
        defining_class: &str,
        name: &str,
        formals: Vec<StorageType>,
        returns: Option<StorageType>,
    ) -> Self {
        Self {
            defining_class: defining_class.to_string(),
            name: name.to_string(),
            formals,
            returns,
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({:?})", self.defining_class, self.name, self.formals)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct ConstructorSignature {
    pub defining_class: String,
    pub formals: Vec<StorageType>,
}

impl ConstructorSignature {
    pub fn new(defining_class: &str, formals: Vec<StorageType>) -> Self {
        Self {
            defining_class: defining_class.to_string(),
            formals,
        }
    }
}

impl fmt::Display for ConstructorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.defining_class, self.formals)
    }
}
