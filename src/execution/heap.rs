/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The object heap is the context in which the code of a transaction runs.
//!
//! Objects are loaded lazily from the execution environment the first time they are accessed,
//! and every load, creation and gas charge requested by the code goes through the [GasMeter]
//! of the transaction. When the code terminates, the heap compares each object with the state it
//! was loaded with, and the differences become the [updates](crate::types::Update) of the response.
//! The fields of an object are those of the static schema that the class loader reports for its
//! class: the heap never discovers fields on its own.

use std::{
    collections::BTreeMap,
    sync::Arc,
};

use crate::{
    constants,
    gas::{GasCostModel, GasMeter},
    types::{
        normalize, BigInteger, FieldSignature, StorageReference, StorageType, StorageValue,
        TransactionReference, Update,
    },
};

use super::{CodeError, EngineClassLoader, ExecutionEnvironment};

struct HeapObject {
    class_name: String,
    jar: TransactionReference,
    schema: Vec<FieldSignature>,
    fields: BTreeMap<FieldSignature, StorageValue>,
    /// The fields as loaded from store. Empty for new objects.
    original: BTreeMap<FieldSignature, StorageValue>,
    is_new: bool,
}

pub struct ObjectHeap<'a> {
    env: &'a dyn ExecutionEnvironment,
    class_loader: Arc<dyn EngineClassLoader>,
    reference: TransactionReference,
    caller: Option<StorageReference>,
    meter: GasMeter,
    cost_model: GasCostModel,
    objects: BTreeMap<StorageReference, HeapObject>,
    next_progressive: u64,
    events: Vec<StorageReference>,
}

impl<'a> ObjectHeap<'a> {
    pub(crate) fn new(
        env: &'a dyn ExecutionEnvironment,
        class_loader: Arc<dyn EngineClassLoader>,
        reference: TransactionReference,
        caller: Option<StorageReference>,
        meter: GasMeter,
    ) -> Self {
        Self {
            cost_model: env.consensus().gas_cost_model.clone(),
            env,
            class_loader,
            reference,
            caller,
            meter,
            objects: BTreeMap::new(),
            next_progressive: 0,
            events: Vec::new(),
        }
    }

    /// The reference of the running transaction.
    pub fn transaction(&self) -> TransactionReference {
        self.reference
    }

    /// The account that pays for the running transaction, if any.
    pub fn caller(&self) -> Option<StorageReference> {
        self.caller
    }

    pub fn now(&self) -> u64 {
        self.env.now()
    }

    pub fn class_loader(&self) -> &dyn EngineClassLoader {
        self.class_loader.as_ref()
    }

    pub fn remaining_gas(&self) -> u64 {
        self.meter.remaining()
    }

    pub fn charge_cpu(&mut self, amount: u64) -> Result<(), CodeError> {
        Ok(self.meter.charge_cpu(amount)?)
    }

    pub fn charge_ram(&mut self, amount: u64) -> Result<(), CodeError> {
        Ok(self.meter.charge_ram(amount)?)
    }

    pub fn charge_storage(&mut self, amount: u64) -> Result<(), CodeError> {
        Ok(self.meter.charge_storage(amount)?)
    }

    pub fn class_of(&mut self, object: &StorageReference) -> Result<String, CodeError> {
        Ok(self.load(object, true)?.class_name.clone())
    }

    pub fn get_field(
        &mut self,
        object: &StorageReference,
        field: &FieldSignature,
    ) -> Result<StorageValue, CodeError> {
        let loaded = self.load(object, true)?;
        loaded
            .fields
            .get(field)
            .cloned()
            .ok_or_else(|| CodeError::UnknownField {
                object: *object,
                field: field.clone(),
            })
    }

    pub fn set_field(
        &mut self,
        object: &StorageReference,
        field: &FieldSignature,
        value: StorageValue,
    ) -> Result<(), CodeError> {
        self.assign(object, field, value, true)
    }

    /// Creates a new object of the given class, with every field set to its default value.
    pub fn create_object(&mut self, class_name: &str) -> Result<StorageReference, CodeError> {
        let jar = self
            .class_loader
            .jar_of(class_name)
            .ok_or_else(|| CodeError::UnmatchedTarget(format!("class {class_name}")))?;
        let schema = self
            .class_loader
            .fields_of(class_name)
            .ok_or_else(|| CodeError::UnmatchedTarget(format!("class {class_name}")))?;
        self.meter.charge_ram(self.cost_model.ram_cost_of_object())?;

        let object = StorageReference::new(self.reference, self.next_progressive);
        self.next_progressive += 1;
        let fields = schema
            .iter()
            .map(|field| (field.clone(), default_value(&field.field_type)))
            .collect();
        self.objects.insert(
            object,
            HeapObject {
                class_name: class_name.to_string(),
                jar,
                schema,
                fields,
                original: BTreeMap::new(),
                is_new: true,
            },
        );
        Ok(object)
    }

    /// Records that the running transaction emitted an event.
    pub fn emit_event(&mut self, event: StorageReference) -> Result<(), CodeError> {
        let class_name = self.class_of(&event)?;
        if !self.class_loader.is_event(&class_name) {
            return Err(CodeError::thrown(
                "IllegalArgumentException",
                &format!("{event} is not an event"),
                false,
            ));
        }
        self.events.push(event);
        Ok(())
    }

    pub fn balance_of(&mut self, contract: &StorageReference) -> Result<BigInteger, CodeError> {
        self.get_field(contract, &constants::balance_field())?
            .as_big_integer()
            .ok_or_else(|| CodeError::Deserialization(format!("the balance of {contract}")))
    }

    pub fn set_balance_of(
        &mut self,
        contract: &StorageReference,
        balance: BigInteger,
    ) -> Result<(), CodeError> {
        self.set_field(contract, &constants::balance_field(), StorageValue::BigInteger(balance))
    }

    pub(crate) fn meter(&self) -> &GasMeter {
        &self.meter
    }

    pub(crate) fn meter_mut(&mut self) -> &mut GasMeter {
        &mut self.meter
    }

    pub(crate) fn events(&self) -> &[StorageReference] {
        &self.events
    }

    /// Reads a big integer field for the bookkeeping of the node, without charging gas.
    pub(crate) fn big_integer(
        &mut self,
        object: &StorageReference,
        field: &FieldSignature,
    ) -> Result<BigInteger, CodeError> {
        self.load(object, false)?
            .fields
            .get(field)
            .and_then(StorageValue::as_big_integer)
            .ok_or_else(|| CodeError::UnknownField {
                object: *object,
                field: field.clone(),
            })
    }

    /// Writes a field for the bookkeeping of the node, without charging gas.
    pub(crate) fn assign_unmetered(
        &mut self,
        object: &StorageReference,
        field: &FieldSignature,
        value: StorageValue,
    ) -> Result<(), CodeError> {
        self.assign(object, field, value, false)
    }

    /// The updates induced by the code run so far: class tags and all fields of the new objects,
    /// and the modified fields of the objects loaded from store.
    pub(crate) fn updates(&self) -> Vec<Update> {
        let mut updates = Vec::new();
        for (object, loaded) in &self.objects {
            if loaded.is_new {
                updates.push(Update::ClassTag {
                    object: *object,
                    class_name: loaded.class_name.clone(),
                    jar: loaded.jar,
                });
            }
            for field in &loaded.schema {
                let value = match loaded.fields.get(field) {
                    Some(value) => value,
                    None => continue,
                };
                if loaded.is_new || loaded.original.get(field) != Some(value) {
                    updates.push(Update::of_field(*object, field.clone(), value.clone()));
                }
            }
        }
        normalize(updates)
    }

    fn assign(
        &mut self,
        object: &StorageReference,
        field: &FieldSignature,
        value: StorageValue,
        metered: bool,
    ) -> Result<(), CodeError> {
        let loaded = self.load(object, metered)?;
        if !loaded.schema.contains(field) {
            return Err(CodeError::UnknownField {
                object: *object,
                field: field.clone(),
            });
        }
        if !is_assignable(&value, &field.field_type) {
            return Err(CodeError::IllegalAssignment {
                object: *object,
                field: field.clone(),
            });
        }
        loaded.fields.insert(field.clone(), value);
        Ok(())
    }

    fn load(
        &mut self,
        object: &StorageReference,
        metered: bool,
    ) -> Result<&mut HeapObject, CodeError> {
        if !self.objects.contains_key(object) {
            if metered {
                self.meter.charge_ram(self.cost_model.ram_cost_of_object())?;
            }
            let loaded = self.load_from_store(object)?;
            self.objects.insert(*object, loaded);
        }
        self.objects
            .get_mut(object)
            .ok_or_else(|| CodeError::Deserialization(object.to_string()))
    }

    fn load_from_store(&self, object: &StorageReference) -> Result<HeapObject, CodeError> {
        let state = self.env.state(object).map_err(CodeError::Store)?;
        let mut class_tag = None;
        let mut fields = BTreeMap::new();
        for update in state {
            match update {
                Update::ClassTag {
                    class_name, jar, ..
                } => class_tag = Some((class_name, jar)),
                Update::Field { field, value, .. } => {
                    fields.insert(field, value);
                }
            }
        }
        let (class_name, jar) = class_tag
            .ok_or_else(|| CodeError::Deserialization(format!("the class tag of {object}")))?;
        let schema = self.class_loader.fields_of(&class_name).ok_or_else(|| {
            CodeError::Deserialization(format!(
                "the class {class_name} of {object} cannot be resolved"
            ))
        })?;
        Ok(HeapObject {
            class_name,
            jar,
            schema,
            original: fields.clone(),
            fields,
            is_new: false,
        })
    }
}

fn default_value(field_type: &StorageType) -> StorageValue {
    match field_type {
        StorageType::Boolean => StorageValue::Boolean(false),
        StorageType::Int => StorageValue::Int(0),
        StorageType::Long => StorageValue::Long(0),
        StorageType::BigInteger => StorageValue::BigInteger(0),
        StorageType::String | StorageType::Class(_) => StorageValue::Null,
    }
}

fn is_assignable(value: &StorageValue, field_type: &StorageType) -> bool {
    matches!(
        (value, field_type),
        (StorageValue::Boolean(_), StorageType::Boolean)
            | (StorageValue::Int(_), StorageType::Int)
            | (StorageValue::Long(_), StorageType::Long)
            | (StorageValue::BigInteger(_), StorageType::BigInteger)
            | (StorageValue::String(_), StorageType::String)
            | (StorageValue::Null, StorageType::String)
            | (StorageValue::Null, StorageType::Class(_))
            | (StorageValue::Reference(_), StorageType::Class(_))
    )
}
