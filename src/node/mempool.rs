/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The worker thread that delivers the posted requests, in the order they were posted.
//!
//! A commit is triggered after every `transactions_per_commit` deliveries, and whenever the
//! mempool stays idle after delivering some requests.

use std::{
    sync::{
        mpsc::{Receiver, RecvTimeoutError, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{logging, store::KVStore, types::TransactionRequest};

use super::NodeInner;

/// How long the mempool must be idle before the requests it delivered get committed.
const IDLE_COMMIT_INTERVAL: Duration = Duration::from_millis(20);

pub(crate) fn start_mempool<K: KVStore>(
    node: Arc<NodeInner<K>>,
    requests: Receiver<TransactionRequest>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let transactions_per_commit = node.config.transactions_per_commit.max(1);
        let mut since_last_commit = 0;
        loop {
            match shutdown_signal.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => (),
            }

            match requests.recv_timeout(IDLE_COMMIT_INTERVAL) {
                Ok(request) => {
                    node.deliver_posted(request);
                    since_last_commit += 1;
                    if since_last_commit >= transactions_per_commit {
                        commit(&node);
                        since_last_commit = 0;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if since_last_commit > 0 {
                        commit(&node);
                        since_last_commit = 0;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    })
}

fn commit<K: KVStore>(node: &NodeInner<K>) {
    if let Err(error) = node.commit() {
        logging::commit_failed(&error);
    }
}
