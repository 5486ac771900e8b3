/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Implementation of the execution of transactions.
//!
//! A request is turned into a response by its [builder](builders), against an
//! [execution environment](environment). Non-initial requests go through phases:
//! Pre-Charge -> Code -> Charge, or Abort if the code fails. The code itself is run
//! by an external [engine] against an [ObjectHeap](heap::ObjectHeap), and the consensus
//! parameters are read back from the store through the [governance] contracts.

pub mod builders;

pub mod engine;
pub use engine::{ClasspathJar, CodeError, CodeInfo, EngineClassLoader, ExecutionEngine};

pub mod environment;
pub use environment::ExecutionEnvironment;

pub mod governance;

pub mod heap;
pub use heap::ObjectHeap;
