/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! One-shot notifications of the outcomes of posted transactions.
//!
//! A cell is created when a request is posted and is signalled exactly once, when the request has
//! been committed or rejected. Signalling removes the cell from the map, so that the map only
//! holds the transactions that are still pending.

use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crate::types::TransactionReference;

#[derive(Default)]
pub(crate) struct OutcomeCell {
    done: Mutex<bool>,
    signal: Condvar,
}

impl OutcomeCell {
    /// Blocks until the cell is signalled, for at most `timeout`. Yields true if it was signalled.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = lock(&self.done);
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            done = match self.signal.wait_timeout(done, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    fn signal(&self) {
        *lock(&self.done) = true;
        self.signal.notify_all();
    }
}

#[derive(Default)]
pub(crate) struct Outcomes {
    cells: Mutex<HashMap<TransactionReference, Arc<OutcomeCell>>>,
}

impl Outcomes {
    /// Creates the cell of a transaction. Yields false if the transaction already has one.
    pub(crate) fn create(&self, reference: TransactionReference) -> bool {
        let mut cells = lock(&self.cells);
        if cells.contains_key(&reference) {
            return false;
        }
        cells.insert(reference, Arc::new(OutcomeCell::default()));
        true
    }

    pub(crate) fn get(&self, reference: &TransactionReference) -> Option<Arc<OutcomeCell>> {
        lock(&self.cells).get(reference).cloned()
    }

    /// Wakes up the waiters of a transaction, if any.
    pub(crate) fn signal(&self, reference: &TransactionReference) {
        let cell = lock(&self.cells).remove(reference);
        if let Some(cell) = cell {
            cell.signal();
        }
    }

    /// Wakes up every waiter.
    pub(crate) fn signal_all(&self) {
        let cells: Vec<_> = lock(&self.cells).drain().map(|(_, cell)| cell).collect();
        for cell in cells {
            cell.signal();
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
