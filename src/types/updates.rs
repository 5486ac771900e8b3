/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Updates are the effects of a transaction on the objects in store.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{FieldSignature, StorageReference, StorageValue, TransactionReference};

/// An update to an object in store. A class tag marks the creation of its object:
/// it names the class of the object and the jar where that class is defined.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub enum Update {
    ClassTag {
        object: StorageReference,
        class_name: String,
        jar: TransactionReference,
    },
    Field {
        object: StorageReference,
        field: FieldSignature,
        value: StorageValue,
    },
}

impl Update {
    pub fn of_field(object: StorageReference, field: FieldSignature, value: StorageValue) -> Self {
        Update::Field {
            object,
            field,
            value,
        }
    }

    pub fn object(&self) -> StorageReference {
        match self {
            Update::ClassTag { object, .. } | Update::Field { object, .. } => *object,
        }
    }

    pub fn field(&self) -> Option<&FieldSignature> {
        match self {
            Update::Field { field, .. } => Some(field),
            Update::ClassTag { .. } => None,
        }
    }

    pub fn value(&self) -> Option<&StorageValue> {
        match self {
            Update::Field { value, .. } => Some(value),
            Update::ClassTag { .. } => None,
        }
    }

    pub fn is_class_tag(&self) -> bool {
        matches!(self, Update::ClassTag { .. })
    }

    /// Two updates are on the same property if they affect the same object and
    /// both set its class tag or both set the same field.
    pub fn same_property(&self, other: &Update) -> bool {
        if self.object() != other.object() {
            return false;
        }
        match (self, other) {
            (Update::ClassTag { .. }, Update::ClassTag { .. }) => true,
            (Update::Field { field: f1, .. }, Update::Field { field: f2, .. }) => f1 == f2,
            _ => false,
        }
    }
}

/// Sorts updates by object and property, and keeps only the last update of each property.
pub fn normalize(mut updates: Vec<Update>) -> Vec<Update> {
    let mut normalized: Vec<Update> = Vec::with_capacity(updates.len());
    for update in updates.drain(..).rev() {
        if !normalized.iter().any(|u| u.same_property(&update)) {
            normalized.push(update);
        }
    }
    normalized.sort();
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StorageType;

    fn object(progressive: u64) -> StorageReference {
        StorageReference::new(TransactionReference::new([1u8; 32]), progressive)
    }

    #[test]
    fn test_same_property() {
        let field = FieldSignature::new("C", "f", StorageType::Int);
        let other_field = FieldSignature::new("C", "g", StorageType::Int);
        let u1 = Update::of_field(object(0), field.clone(), StorageValue::Int(1));
        let u2 = Update::of_field(object(0), field.clone(), StorageValue::Int(2));
        let u3 = Update::of_field(object(0), other_field, StorageValue::Int(1));
        let u4 = Update::of_field(object(1), field, StorageValue::Int(1));
        let tag = Update::ClassTag {
            object: object(0),
            class_name: "C".to_string(),
            jar: TransactionReference::default(),
        };

        assert!(u1.same_property(&u2));
        assert!(!u1.same_property(&u3));
        assert!(!u1.same_property(&u4));
        assert!(!u1.same_property(&tag));
        assert!(tag.same_property(&tag.clone()));
    }

    #[test]
    fn test_normalize_keeps_last_update() {
        let field = FieldSignature::new("C", "f", StorageType::Int);
        let updates = vec![
            Update::of_field(object(1), field.clone(), StorageValue::Int(1)),
            Update::of_field(object(0), field.clone(), StorageValue::Int(1)),
            Update::of_field(object(1), field.clone(), StorageValue::Int(7)),
        ];
        let normalized = normalize(updates);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].object(), object(0));
        assert_eq!(normalized[1].value(), Some(&StorageValue::Int(7)));
    }
}
