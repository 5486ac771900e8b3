/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use log::LevelFilter;
use moka_node_local::{
    crypto::Hasher,
    store::{paths, KVStore, MemWriteBatch, WriteBatch},
    types::{StorageReference, StorageValue, TransactionReference},
    LocalNodeConfig, NodeError,
};

mod common;

use crate::common::{
    fixtures::{initialized_node, rejection, test_config, GAS_LIMIT},
    logging::setup_logger,
    mock_engine::{self, count_field},
};

/// A configuration that waits long enough for the mempool to commit.
fn patient_config() -> LocalNodeConfig {
    let mut config = test_config();
    config.max_polling_attempts = 40;
    config.polling_delay = Duration::from_millis(10);
    config
}

#[test]
fn test_posted_requests_are_delivered_in_order() {
    setup_logger(LevelFilter::Debug);
    let test_node = initialized_node(patient_config());
    let gamete = &test_node.gamete;
    let counter = test_node.create_counter();
    let nonce = test_node.nonce_of(&gamete.reference);

    let references: Vec<TransactionReference> = (0..3)
        .map(|offset| {
            let request = test_node.instance_call_with(
                gamete,
                nonce + offset,
                GAS_LIMIT,
                counter,
                mock_engine::increment(),
                vec![],
            );
            test_node.node.post(request).unwrap()
        })
        .collect();

    for reference in &references {
        let response = test_node.node.get_polled_response(reference).unwrap();
        assert!(response.is_successful());
        assert!(test_node.node.get_request(reference).is_ok());
    }
    assert_eq!(
        test_node.field_of(&counter, &count_field()),
        Some(StorageValue::BigInteger(3))
    );
    assert_eq!(test_node.nonce_of(&gamete.reference), nonce + 3);
}

#[test]
fn test_posted_request_can_be_rejected() {
    let test_node = initialized_node(patient_config());
    let gamete = &test_node.gamete;
    let counter = test_node.create_counter();
    let nonce = test_node.nonce_of(&gamete.reference);

    let request = test_node.instance_call_with(
        gamete,
        nonce + 10,
        GAS_LIMIT,
        counter,
        mock_engine::increment(),
        vec![],
    );
    let reference = test_node.node.post(request).unwrap();
    let message = rejection(test_node.node.get_polled_response(&reference).unwrap_err());
    assert!(message.starts_with("Incorrect nonce"), "{message}");
    assert_eq!(test_node.nonce_of(&gamete.reference), nonce);
}

#[test]
fn test_concurrent_identical_posts() {
    let test_node = Arc::new(initialized_node(patient_config()));
    let counter = test_node.create_counter();
    let request =
        test_node.instance_call(&test_node.gamete, counter, mock_engine::increment(), vec![]);

    let posters: Vec<_> = (0..2)
        .map(|_| {
            let test_node = Arc::clone(&test_node);
            let request = request.clone();
            thread::spawn(move || test_node.node.post(request))
        })
        .collect();
    let outcomes: Vec<_> = posters
        .into_iter()
        .map(|poster| poster.join().unwrap())
        .collect();

    let accepted: Vec<_> = outcomes.iter().filter_map(|outcome| outcome.as_ref().ok()).collect();
    assert_eq!(accepted.len(), 1);
    let repeated = outcomes
        .iter()
        .find_map(|outcome| outcome.as_ref().err())
        .unwrap();
    assert!(matches!(
        repeated,
        NodeError::Rejected(rejected) if rejected.message.starts_with("Repeated request")
    ));

    let reference = *accepted[0];
    assert_eq!(reference, Hasher.hash_request(&request));
    assert!(test_node.node.get_polled_response(&reference).unwrap().is_successful());
    assert_eq!(
        test_node.field_of(&counter, &count_field()),
        Some(StorageValue::BigInteger(1))
    );

    // once committed, the request cannot be posted again
    let message = rejection(test_node.node.post(request).unwrap_err());
    assert!(message.starts_with("Repeated request"), "{message}");
}

#[test]
fn test_post_after_a_synchronous_delivery() {
    let test_node = initialized_node(patient_config());
    let counter = test_node.create_counter();
    let request =
        test_node.instance_call(&test_node.gamete, counter, mock_engine::increment(), vec![]);
    let reference = Hasher.hash_request(&request);
    assert!(test_node.node.deliver_transaction(request.clone()).unwrap().is_successful());

    // delivered but not committed yet: it cannot be posted, and it is not a rejection
    let message = rejection(test_node.node.post(request).unwrap_err());
    assert!(message.starts_with("Repeated request"), "{message}");
    assert_eq!(
        test_node.node.get_response(&reference),
        Err(NodeError::UnknownReference(reference))
    );

    test_node.node.commit().unwrap();
    assert!(test_node.node.get_polled_response(&reference).unwrap().is_successful());
}

#[test]
fn test_failed_commit_releases_the_waiters() {
    let test_node = initialized_node(patient_config());
    let counter = test_node.create_counter();
    let head = test_node.node.enter_head().0.state_id();

    // an unreadable list of past stores makes every commit fail
    let mut kv = test_node.kv.clone();
    let mut wb = MemWriteBatch::new();
    wb.set(paths::PAST_STORES, &[0xff]);
    kv.write(wb);

    let request =
        test_node.instance_call(&test_node.gamete, counter, mock_engine::increment(), vec![]);
    let started = Instant::now();
    let reference = test_node.node.post(request).unwrap();
    assert!(matches!(
        test_node.node.get_polled_response(&reference),
        Err(NodeError::Timeout { .. })
    ));
    // woken up by the failed commit, long before the polling would have ended
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(
        test_node.node.get_request(&reference),
        Err(NodeError::UnknownReference(reference))
    );
    assert_eq!(test_node.node.enter_head().0.state_id(), head);

    let request =
        test_node.instance_call(&test_node.gamete, counter, mock_engine::increment(), vec![]);
    test_node.node.deliver_transaction(request).unwrap();
    assert!(matches!(test_node.node.commit(), Err(NodeError::Store(_))));
    assert_eq!(test_node.node.enter_head().0.state_id(), head);
}

#[test]
fn test_check_rejections_are_remembered() {
    let test_node = initialized_node(test_config());
    let gamete = &test_node.gamete;
    let counter = test_node.create_counter();
    let nonce = test_node.nonce_of(&gamete.reference);

    // a request that is ahead of the nonce of its caller
    let ahead = test_node.instance_call_with(
        gamete,
        nonce + 1,
        GAS_LIMIT,
        counter,
        mock_engine::increment(),
        vec![],
    );
    let reference = Hasher.hash_request(&ahead);
    let first = rejection(test_node.node.check_transaction(&ahead).unwrap_err());
    assert!(first.starts_with("Incorrect nonce"), "{first}");
    let message = rejection(test_node.node.get_response(&reference).unwrap_err());
    assert_eq!(message, first);

    // the rejection is remembered even after the request would have become acceptable
    let request = test_node.instance_call(gamete, counter, mock_engine::increment(), vec![]);
    test_node.node.deliver_transaction(request).unwrap();
    test_node.node.commit().unwrap();
    let second = rejection(test_node.node.check_transaction(&ahead).unwrap_err());
    assert_eq!(second, first);
}

#[test]
fn test_unknown_reference_times_out() {
    let test_node = initialized_node(test_config());
    let unknown = TransactionReference::new([7u8; 32]);

    assert_eq!(
        test_node.node.get_response(&unknown),
        Err(NodeError::UnknownReference(unknown))
    );
    assert_eq!(
        test_node.node.get_polled_response(&unknown),
        Err(NodeError::Timeout {
            reference: unknown,
            attempts: 20,
        })
    );
    assert_eq!(
        test_node.node.get_request(&unknown),
        Err(NodeError::UnknownReference(unknown))
    );
}

#[test]
fn test_unknown_object() {
    let test_node = initialized_node(test_config());
    let counter = test_node.create_counter();
    let missing = StorageReference::new(counter.transaction, 42);

    assert_eq!(
        test_node.node.get_state(&missing),
        Err(NodeError::UnknownObject(missing))
    );
    assert_eq!(
        test_node.node.get_class_tag(&missing),
        Err(NodeError::UnknownObject(missing))
    );
}

#[test]
fn test_shutdown_closes_the_node() {
    let test_node = initialized_node(test_config());
    let counter = test_node.create_counter();
    let request =
        test_node.instance_call(&test_node.gamete, counter, mock_engine::increment(), vec![]);

    test_node.node.shutdown();
    assert_eq!(test_node.node.post(request), Err(NodeError::Closed));
    // shutting down twice is harmless, and the head can still be read
    test_node.node.shutdown();
    assert_eq!(test_node.node.get_manifest(), Ok(test_node.manifest));
}
