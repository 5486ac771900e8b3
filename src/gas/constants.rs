/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Constants and formulas which are primitives used in the cost calculation of transactions.
//!
//! The table below lists the costs charged by the engine itself. The costs of running
//! the code of the transactions are charged by the execution engine through
//! [ObjectHeap](crate::execution::heap::ObjectHeap).
//!
//! |Charged for                               | Related Function / Constants          |
//! |:---                                      |:---                                   |
//! |starting any non-initial transaction      | [GasCostModel::cpu_base_transaction_cost] |
//! |each byte of the request and the response | storage, one unit per byte            |
//! |loading a jar of the classpath            | [GasCostModel::cpu_cost_for_loading_jar], [GasCostModel::ram_cost_for_loading_jar] |
//! |installing a new jar                      | [GasCostModel::cpu_cost_for_installing_jar], [GasCostModel::ram_cost_for_installing_jar] |
//! |reading the response of a transaction     | [GasCostModel::cpu_cost_for_getting_response] |
//! |bringing an object into RAM               | [GasCostModel::ram_cost_of_object]    |
//! |storing a failed response                 | [GAS_FOR_STORING_FAILED_JAR_STORE], [GAS_FOR_STORING_FAILED_CODE_CALL] |

use borsh::{BorshDeserialize, BorshSerialize};

/// Gas reserved in the minimal gas of a jar store, to pay for storing its failed response.
pub const GAS_FOR_STORING_FAILED_JAR_STORE: u64 = 100;

/// Gas reserved in the minimal gas of a code call, to pay for storing its failed response.
pub const GAS_FOR_STORING_FAILED_CODE_CALL: u64 = 100;

/// Gas forwarded to the system call that rewards the validators.
pub const GAS_FOR_REWARD: u64 = 100_000;

/// The denominator of the inflation, expressed in units of 10^-8.
pub const INFLATION_DENOMINATOR: i128 = 100_000_000;

/// The costs of the operations performed by the engine.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct GasCostModel {
    pub cpu_base_transaction_cost: u64,
    pub cpu_cost_for_getting_response: u64,
    pub ram_cost_of_object: u64,
    /// Fixed part of the CPU and RAM cost of loading a jar.
    pub jar_loading_base_cost: u64,
    /// Bytes of jar per unit of gas, when loading a jar.
    pub jar_loading_bytes_per_gas: u64,
    pub cpu_bytes_per_gas_for_installing_jar: u64,
    pub ram_bytes_per_gas_for_installing_jar: u64,
}

impl GasCostModel {
    pub const fn standard() -> Self {
        Self {
            cpu_base_transaction_cost: 10,
            cpu_cost_for_getting_response: 10,
            ram_cost_of_object: 4,
            jar_loading_base_cost: 10,
            jar_loading_bytes_per_gas: 1024,
            cpu_bytes_per_gas_for_installing_jar: 100,
            ram_bytes_per_gas_for_installing_jar: 10,
        }
    }

    pub fn cpu_base_transaction_cost(&self) -> u64 {
        self.cpu_base_transaction_cost
    }

    pub fn cpu_cost_for_loading_jar(&self, length: usize) -> u64 {
        self.jar_loading_base_cost + (length as u64) / self.jar_loading_bytes_per_gas.max(1)
    }

    pub fn ram_cost_for_loading_jar(&self, length: usize) -> u64 {
        self.jar_loading_base_cost + (length as u64) / self.jar_loading_bytes_per_gas.max(1)
    }

    pub fn cpu_cost_for_installing_jar(&self, length: usize) -> u64 {
        (length as u64) / self.cpu_bytes_per_gas_for_installing_jar.max(1)
    }

    pub fn ram_cost_for_installing_jar(&self, length: usize) -> u64 {
        (length as u64) / self.ram_bytes_per_gas_for_installing_jar.max(1)
    }

    pub fn cpu_cost_for_getting_response(&self) -> u64 {
        self.cpu_cost_for_getting_response
    }

    pub fn ram_cost_of_object(&self) -> u64 {
        self.ram_cost_of_object
    }
}

impl Default for GasCostModel {
    fn default() -> Self {
        Self::standard()
    }
}

#[test]
fn test_standard_costs() {
    let model = GasCostModel::standard();
    assert_eq!(model.cpu_cost_for_loading_jar(0), 10);
    assert_eq!(model.cpu_cost_for_loading_jar(4096), 14);
    assert_eq!(model.ram_cost_for_loading_jar(1023), 10);
    assert_eq!(model.cpu_cost_for_installing_jar(1000), 10);
    assert_eq!(model.ram_cost_for_installing_jar(1000), 100);
}
