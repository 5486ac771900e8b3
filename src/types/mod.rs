/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Data types exchanged with the engine: references, values, updates,
//! requests and responses. All of them are immutable and have a canonical
//! [borsh] encoding, which determines their size and their hash.

use borsh::BorshSerialize;

pub mod references;
pub use references::*;

pub mod requests;
pub use requests::*;

pub mod responses;
pub use responses::*;

pub mod updates;
pub use updates::*;

pub mod values;
pub use values::*;

/// Length of the canonical encoding of a value. Encoding into a Vec cannot fail.
pub(crate) fn encoded_len<T: BorshSerialize>(value: &T) -> usize {
    value.try_to_vec().map_or(0, |bytes| bytes.len())
}
