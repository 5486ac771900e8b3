/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The gas meter of a single transaction.
//!
//! The meter starts from the gas limit of the request and is decreased by every charge,
//! which is accounted to one of three resources: CPU, RAM or storage. A charge larger than
//! the remaining gas fails with [OutOfGas] and leaves the meter unchanged, so that
//! `cpu + ram + storage <= gas_limit` always holds.
//!
//! Initial transactions run with an unmetered meter, which accepts and ignores all charges.

use crate::types::GasConsumed;

/// Raised when a charge exceeds the remaining gas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("not enough gas to complete the operation")]
pub struct OutOfGas;

#[derive(Clone, Debug)]
pub struct GasMeter {
    gas_limit: u64,
    /// `None` if the meter does not count gas.
    remaining: Option<u64>,
    consumed: GasConsumed,
}

impl GasMeter {
    pub fn new(gas_limit: u64) -> Self {
        Self {
            gas_limit,
            remaining: Some(gas_limit),
            consumed: GasConsumed::default(),
        }
    }

    /// A meter for transactions whose gas is not counted, such as the creation of the gamete.
    pub fn unmetered() -> Self {
        Self {
            gas_limit: 0,
            remaining: None,
            consumed: GasConsumed::default(),
        }
    }

    pub fn is_metered(&self) -> bool {
        self.remaining.is_some()
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// Gas still available. Zero for an unmetered meter.
    pub fn remaining(&self) -> u64 {
        self.remaining.unwrap_or(0)
    }

    pub fn consumed(&self) -> GasConsumed {
        self.consumed
    }

    /// The gas that is forfeited if the transaction fails: what remains of the gas limit
    /// after subtracting the gas consumed for CPU, RAM and storage.
    pub fn penalty(&self) -> u64 {
        self.gas_limit.saturating_sub(self.consumed.total())
    }

    pub fn charge_cpu(&mut self, amount: u64) -> Result<(), OutOfGas> {
        self.charge(amount, |consumed| &mut consumed.cpu)
    }

    pub fn charge_ram(&mut self, amount: u64) -> Result<(), OutOfGas> {
        self.charge(amount, |consumed| &mut consumed.ram)
    }

    pub fn charge_storage(&mut self, amount: u64) -> Result<(), OutOfGas> {
        self.charge(amount, |consumed| &mut consumed.storage)
    }

    fn charge<F>(&mut self, amount: u64, counter: F) -> Result<(), OutOfGas>
    where
        F: FnOnce(&mut GasConsumed) -> &mut u64,
    {
        match self.remaining.as_mut() {
            None => Ok(()),
            Some(remaining) if *remaining < amount => Err(OutOfGas),
            Some(remaining) => {
                *remaining -= amount;
                // cannot overflow: the counters add up to at most the gas limit
                *counter(&mut self.consumed) += amount;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charges_are_split_by_resource() {
        let mut meter = GasMeter::new(100);
        meter.charge_cpu(10).unwrap();
        meter.charge_ram(20).unwrap();
        meter.charge_storage(30).unwrap();

        assert_eq!(meter.remaining(), 40);
        assert_eq!(
            meter.consumed(),
            GasConsumed {
                cpu: 10,
                ram: 20,
                storage: 30
            }
        );
        assert_eq!(meter.penalty(), 40);
    }

    #[test]
    fn test_out_of_gas_leaves_meter_unchanged() {
        let mut meter = GasMeter::new(50);
        meter.charge_cpu(45).unwrap();
        assert_eq!(meter.charge_storage(6), Err(OutOfGas));
        assert_eq!(meter.remaining(), 5);
        assert_eq!(meter.consumed().total(), 45);
        assert!(meter.consumed().total() <= meter.gas_limit());

        // exact charge
        meter.charge_ram(5).unwrap();
        assert_eq!(meter.remaining(), 0);
        assert_eq!(meter.penalty(), 0);
    }

    #[test]
    fn test_unmetered() {
        let mut meter = GasMeter::unmetered();
        assert!(!meter.is_metered());
        meter.charge_cpu(u64::MAX).unwrap();
        meter.charge_cpu(u64::MAX).unwrap();
        meter.charge_storage(u64::MAX).unwrap();
        assert_eq!(meter.consumed(), GasConsumed::default());
        assert_eq!(meter.remaining(), 0);
        assert_eq!(meter.penalty(), 0);
    }
}
