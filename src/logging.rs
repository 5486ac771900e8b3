/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out the events of the lifecycle of the node.
//!
//! The node logs using the [log](https://docs.rs/log/latest/log/) crate and never installs a logger
//! itself. To get these messages printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! Messages about a transaction start with its reference in hexadecimal, messages about a store
//! with the first seven hexadecimal characters of its id.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{error::StoreError, store::StateId, types::TransactionReference};

pub(crate) fn opened_store(id: &StateId, resumed: bool) {
    if resumed {
        log::info!("resumed the node from store {}", short_hex(&id.0));
    } else {
        log::info!("started the node from the empty store {}", short_hex(&id.0));
    }
}

pub(crate) fn committed_store(id: &StateId, delivered: usize) {
    log::info!(
        "committed store {} with {} new transactions",
        short_hex(&id.0),
        delivered
    );
}

pub(crate) fn commit_failed(error: &dyn std::fmt::Display) {
    log::error!("could not commit the delivered transactions: {}", error);
}

/// Logs the transactions of a transformation that could not be committed.
pub(crate) fn commit_lost(error: &StoreError, lost: &[TransactionReference]) {
    log::error!(
        "could not commit the store, {} transactions are lost: {}",
        lost.len(),
        error
    );
    for reference in lost {
        log::error!("{}: lost, since its store could not be committed", reference);
    }
}

pub(crate) fn checking_failed(reference: &TransactionReference, message: &str) {
    log::warn!("{}: checking failed: {}", reference, message);
}

pub(crate) fn posting_failed(reference: &TransactionReference, error: &dyn std::fmt::Display) {
    log::error!("{}: delivering failed: {}", reference, error);
}

pub(crate) fn garbage_collected(id: &StateId) {
    log::info!("garbage collected store {}", short_hex(&id.0));
}

pub(crate) fn garbage_collection_failed(id: &StateId, error: &StoreError) {
    log::warn!("could not garbage-collect store {}: {}", short_hex(&id.0), error);
}

pub(crate) fn garbage_collection_queue_full() {
    log::warn!("could not enqueue old store for garbage collection: the queue is full!");
}

/// The first seven characters of the hexadecimal encoding of `bytes`.
pub(crate) fn short_hex(bytes: &[u8]) -> String {
    let mut encoded = hex::encode(bytes);
    encoded.truncate(7);
    encoded
}

pub(crate) fn millis_since_unix_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hex() {
        assert_eq!(short_hex(&[0xab, 0xcd, 0xef, 0x01, 0x23]), "abcdef0");
        assert_eq!(short_hex(&[0x01]), "01");
    }
}
