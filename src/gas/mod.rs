/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines all components related to execution gas cost and metering.
//!
//! Gas is the base measurement unit for transaction execution cost. It is promised by the
//! caller through the gas limit and paid at the gas price of the request.

pub mod constants;
pub use constants::*;

pub mod gas_meter;
pub use gas_meter::*;
