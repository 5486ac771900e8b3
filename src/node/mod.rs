/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The local node: the coordinator of the delivery of transactions to the versioned store.
//!
//! The node keeps a *head* [Store], against which requests are checked and queried concurrently.
//! Delivery is serialized: a single lock guards the current [StoreTransformation], begun from the
//! head, to which requests are delivered one at a time. Committing finalizes the transformation
//! into a new store, persists it and makes it the head, after which the previous head is handed to
//! the [garbage collector](gc).
//!
//! Requests can be delivered synchronously, or [posted](LocalNode::post) to a mempool whose worker
//! delivers and commits them in the background. The outcome of a posted request can be awaited
//! with [get_polled_response](LocalNode::get_polled_response).

use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender, SyncSender, TrySendError},
        Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use lru::LruCache;

use crate::{
    config::LocalNodeConfig,
    error::{DeliveryError, NodeError, StoreError, TransactionRejected},
    execution::{builders, governance, ExecutionEngine, ExecutionEnvironment},
    logging,
    store::{KVStore, StateId, Store, StoreTransformation, StoreVersions},
    types::{
        InstanceMethodCallRequest, StaticMethodCallRequest, StorageReference, StorageValue,
        TransactionReference, TransactionRequest, TransactionResponse, Update,
    },
};

pub mod gc;
pub use gc::{GarbageCollector, StoreGuard};

pub(crate) mod mempool;

pub(crate) mod outcomes;
use outcomes::{lock, OutcomeCell, Outcomes};

/// The state of the node shared with its worker threads.
pub(crate) struct NodeInner<K: KVStore> {
    pub(crate) config: LocalNodeConfig,
    head: RwLock<Store>,
    /// The delivery lock: whoever holds it is the only one delivering to the store.
    transformation: Mutex<Option<StoreTransformation>>,
    versions: Arc<Mutex<StoreVersions<K>>>,
    outcomes: Outcomes,
    recent_check_errors: Mutex<LruCache<TransactionReference, String>>,
    gc: Arc<GarbageCollector<K>>,
    closed: AtomicBool,
}

struct Worker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn stop(self, name: &str) {
        // the worker might have already stopped on its own
        let _ = self.shutdown.send(());
        if self.handle.join().is_err() {
            log::error!("the {} thread panicked", name);
        }
    }
}

pub struct LocalNode<K: KVStore> {
    inner: Arc<NodeInner<K>>,
    mempool: SyncSender<TransactionRequest>,
    workers: Mutex<Option<(Worker, Worker)>>,
}

impl<K: KVStore> LocalNode<K> {
    /// Opens a node on top of a key-value store. The node resumes from the head persisted in the
    /// store, if any, and otherwise starts from the empty store.
    pub fn open(
        kv_store: K,
        engine: Arc<dyn ExecutionEngine>,
        config: LocalNodeConfig,
    ) -> Result<Self, NodeError> {
        let mut versions = StoreVersions::new(kv_store);
        let head = match versions.root()? {
            Some(root) => {
                let layer = versions.checkout(&root)?;
                let store = Store::from_layer(layer, engine, &config).reload_caches()?;
                logging::opened_store(&root, true);
                store
            }
            None => {
                let store = Store::empty(engine, &config);
                versions.persist(store.layer())?;
                versions.move_root(None, store.state_id())?;
                logging::opened_store(&store.state_id(), false);
                store
            }
        };
        let past_stores = versions.past_stores()?;
        let versions = Arc::new(Mutex::new(versions));

        let (gc, gc_queue) =
            GarbageCollector::new(Arc::clone(&versions), head.state_id(), config.gc_queue_capacity);
        past_stores.into_iter().for_each(|id| gc.enqueue(id));
        let (gc_shutdown, gc_shutdown_receiver) = mpsc::channel();
        let gc_handle = gc::start_garbage_collector(
            Arc::clone(&gc),
            gc_queue,
            gc_shutdown_receiver,
            config.gc_rescan_interval,
        );

        let (mempool, mempool_receiver) = mpsc::sync_channel(config.mempool_capacity.max(1));
        let recent_check_errors = LruCache::new(
            NonZeroUsize::new(config.recent_check_errors_capacity).unwrap_or(NonZeroUsize::MIN),
        );
        let inner = Arc::new(NodeInner {
            config,
            head: RwLock::new(head),
            transformation: Mutex::new(None),
            versions,
            outcomes: Outcomes::default(),
            recent_check_errors: Mutex::new(recent_check_errors),
            gc,
            closed: AtomicBool::new(false),
        });
        let (mempool_shutdown, mempool_shutdown_receiver) = mpsc::channel();
        let mempool_handle = mempool::start_mempool(
            Arc::clone(&inner),
            mempool_receiver,
            mempool_shutdown_receiver,
        );

        Ok(Self {
            inner,
            mempool,
            workers: Mutex::new(Some((
                Worker {
                    shutdown: mempool_shutdown,
                    handle: mempool_handle,
                },
                Worker {
                    shutdown: gc_shutdown,
                    handle: gc_handle,
                },
            ))),
        })
    }

    /// Checks a request against the head, without delivering it.
    pub fn check_transaction(&self, request: &TransactionRequest) -> Result<(), NodeError> {
        self.inner.check_transaction(request)
    }

    /// Delivers a request to the current transformation. Its effects become visible in the head
    /// at the next [commit](LocalNode::commit).
    pub fn deliver_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionResponse, NodeError> {
        self.inner.deliver_transaction(request)
    }

    /// Rewards the validators for the transactions delivered since the last reward.
    pub fn deliver_reward(
        &self,
        behaving: &str,
        misbehaving: &str,
    ) -> Result<Option<TransactionResponse>, NodeError> {
        self.inner.deliver_reward(behaving, misbehaving)
    }

    /// Makes the transactions delivered so far part of the head. Yields the id of the new head.
    pub fn commit(&self) -> Result<StateId, NodeError> {
        self.inner.commit()
    }

    /// Posts a request to the mempool and yields its reference, without waiting for its delivery.
    pub fn post(&self, request: TransactionRequest) -> Result<TransactionReference, NodeError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(NodeError::Closed);
        }
        let reference = inner.head().hasher().hash_request(&request);
        if inner.is_delivered(&reference) || !inner.outcomes.create(reference) {
            return Err(TransactionRejected::new(format!("Repeated request {reference}")).into());
        }
        match self.mempool.try_send(request) {
            Ok(()) => Ok(reference),
            Err(TrySendError::Full(_)) => {
                inner.outcomes.signal(&reference);
                Err(TransactionRejected::new("the mempool is full").into())
            }
            Err(TrySendError::Disconnected(_)) => {
                inner.outcomes.signal(&reference);
                Err(NodeError::Closed)
            }
        }
    }

    /// Waits for the response of a posted request. The waiting is bounded: it yields
    /// [NodeError::Timeout] if the response is not known yet, although it might be later.
    pub fn get_polled_response(
        &self,
        reference: &TransactionReference,
    ) -> Result<TransactionResponse, NodeError> {
        let config = &self.inner.config;
        let attempts = config.max_polling_attempts.max(1);
        let cell = self.inner.outcomes.get(reference);
        poll(cell, config.polling_delay, attempts, || {
            match self.get_response(reference) {
                Err(NodeError::UnknownReference(_)) => None,
                outcome => Some(outcome),
            }
        })
        .unwrap_or(Err(NodeError::Timeout {
            reference: *reference,
            attempts,
        }))
    }

    /// The response of a committed transaction, or the rejection of a request that was
    /// delivered or checked recently.
    pub fn get_response(
        &self,
        reference: &TransactionReference,
    ) -> Result<TransactionResponse, NodeError> {
        let head = self.inner.head();
        if let Some(response) = head.get_response(reference) {
            return Ok(response.clone());
        }
        if let Some(message) = head.get_error(reference) {
            return Err(TransactionRejected::new(message).into());
        }
        if let Some(message) = lock(&self.inner.recent_check_errors).get(reference) {
            return Err(TransactionRejected::new(message.clone()).into());
        }
        Err(NodeError::UnknownReference(*reference))
    }

    pub fn get_request(
        &self,
        reference: &TransactionReference,
    ) -> Result<TransactionRequest, NodeError> {
        self.inner
            .head()
            .get_request(reference)
            .cloned()
            .ok_or(NodeError::UnknownReference(*reference))
    }

    pub fn get_manifest(&self) -> Result<StorageReference, NodeError> {
        self.inner.head().get_manifest().ok_or(NodeError::Uninitialized)
    }

    /// The class tag of an object in the head.
    pub fn get_class_tag(&self, object: &StorageReference) -> Result<Update, NodeError> {
        let (head, _guard) = self.inner.enter_head();
        head.class_tag(object).map_err(unknown_object)
    }

    /// The current state of an object in the head: its class tag and the newest value of each
    /// of its fields.
    pub fn get_state(&self, object: &StorageReference) -> Result<Vec<Update>, NodeError> {
        let (head, _guard) = self.inner.enter_head();
        head.state(object).map_err(unknown_object)
    }

    /// Runs a view instance method against the head. Its effects are never committed.
    pub fn run_instance_method_call(
        &self,
        request: InstanceMethodCallRequest,
    ) -> Result<Option<StorageValue>, NodeError> {
        let (head, _guard) = self.inner.enter_head();
        governance::run_instance_view_method(&head, request)
    }

    /// Runs a view static method against the head. Its effects are never committed.
    pub fn run_static_method_call(
        &self,
        request: StaticMethodCallRequest,
    ) -> Result<Option<StorageValue>, NodeError> {
        let (head, _guard) = self.inner.enter_head();
        governance::run_static_view_method(&head, request)
    }

    /// A snapshot of the head, that stays available until the guard is dropped.
    pub fn enter_head(&self) -> (Store, StoreGuard<K>) {
        self.inner.enter_head()
    }

    pub fn garbage_collector(&self) -> &Arc<GarbageCollector<K>> {
        &self.inner.gc
    }

    /// Stops the workers of the node and wakes up everybody waiting for a response. Requests
    /// delivered but not committed yet are lost.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some((mempool, gc)) = lock(&self.workers).take() {
            mempool.stop("mempool");
            gc.stop("garbage collector");
        }
        self.inner.outcomes.signal_all();
        log::info!("the node has been shut down");
    }
}

impl<K: KVStore> Drop for LocalNode<K> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<K: KVStore> NodeInner<K> {
    fn head(&self) -> RwLockReadGuard<'_, Store> {
        self.head
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn head_mut(&self) -> RwLockWriteGuard<'_, Store> {
        self.head
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A copy of the head, marked as used while the guard is alive. The head cannot move
    /// between the copy and the mark.
    fn enter_head(&self) -> (Store, StoreGuard<K>) {
        let head = self.head();
        let guard = self.gc.enter(head.state_id());
        (head.clone(), guard)
    }

    fn check_transaction(&self, request: &TransactionRequest) -> Result<(), NodeError> {
        let (head, _guard) = self.enter_head();
        let reference = head.hasher().hash_request(request);
        if let Some(message) = lock(&self.recent_check_errors).get(&reference) {
            return Err(TransactionRejected::new(message.clone()).into());
        }

        match builders::check_request(&head, reference, request) {
            Ok(()) => Ok(()),
            Err(DeliveryError::Rejected(rejected)) => {
                let message = rejected.trimmed_message(head.consensus().max_error_length);
                logging::checking_failed(&reference, &message);
                lock(&self.recent_check_errors).put(reference, message.clone());
                Err(TransactionRejected::new(message).into())
            }
            Err(DeliveryError::Store(error)) => Err(error.into()),
        }
    }

    fn deliver_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionResponse, NodeError> {
        let mut transformation = lock(&self.transformation);
        let transformation = transformation.get_or_insert_with(|| self.begin_transformation());
        Ok(transformation.deliver(request)?)
    }

    fn deliver_reward(
        &self,
        behaving: &str,
        misbehaving: &str,
    ) -> Result<Option<TransactionResponse>, NodeError> {
        let mut transformation = lock(&self.transformation);
        let transformation = transformation.get_or_insert_with(|| self.begin_transformation());
        Ok(transformation.deliver_reward(behaving, misbehaving)?)
    }

    fn begin_transformation(&self) -> StoreTransformation {
        let head = self.head();
        head.begin_transformation(
            head.consensus().clone(),
            logging::millis_since_unix_epoch(),
            self.config.reward_policy,
        )
    }

    /// True if the transaction has been delivered, even if it is not committed yet.
    fn is_delivered(&self, reference: &TransactionReference) -> bool {
        match lock(&self.transformation).as_ref() {
            Some(transformation) => transformation.response(reference).is_some(),
            None => self.head().get_response(reference).is_some(),
        }
    }

    /// Delivers a request taken from the mempool. A rejection is reported at once, while the
    /// waiters of a delivered request are woken up at commit.
    fn deliver_posted(&self, request: TransactionRequest) {
        let reference = self.head().hasher().hash_request(&request);
        match self.deliver_transaction(request) {
            Ok(_) => (),
            // delivered synchronously in the meantime: its waiters are woken up at commit
            Err(NodeError::Rejected(_)) if self.is_delivered(&reference) => (),
            Err(NodeError::Rejected(rejected)) => {
                lock(&self.recent_check_errors).put(reference, rejected.message);
                self.outcomes.signal(&reference);
            }
            Err(error) => {
                logging::posting_failed(&reference, &error);
                self.outcomes.signal(&reference);
            }
        }
    }

    fn commit(&self) -> Result<StateId, NodeError> {
        let mut transformation = lock(&self.transformation);
        let transformation = match transformation.take() {
            Some(transformation) if !transformation.is_empty() => transformation,
            _ => return Ok(self.head().state_id()),
        };
        let mut signalled: Vec<TransactionReference> =
            transformation.delivered_references().to_vec();
        signalled.extend(transformation.rejected_references().copied());
        let delivered = transformation.delivered_count();

        let store = transformation.finalize();
        let old = self.head().state_id();
        let new = store.state_id();
        if new != old {
            if let Err(error) = self.persist_head(&store, old) {
                logging::commit_lost(&error, &signalled);
                signalled.iter().for_each(|reference| self.outcomes.signal(reference));
                return Err(error.into());
            }
            let mut head = self.head_mut();
            *head = store;
            // nobody can enter the new head before the garbage collector knows it
            self.gc.move_head(old, new);
            drop(head);
            logging::committed_store(&new, delivered);
        }

        signalled.iter().for_each(|reference| self.outcomes.signal(reference));
        Ok(new)
    }

    fn persist_head(&self, store: &Store, old: StateId) -> Result<(), StoreError> {
        let mut versions = lock(&self.versions);
        versions.persist(store.layer())?;
        versions.move_root(Some(old), store.state_id())
    }
}

/// Polls for a result, trying `attempts` times with a delay that grows by 10% at each attempt.
/// A pending posted request is rather waited through its cell, for the same total time, and
/// then tried once.
fn poll<T, F>(
    cell: Option<Arc<OutcomeCell>>,
    delay: Duration,
    attempts: u32,
    mut known: F,
) -> Option<T>
where
    F: FnMut() -> Option<T>,
{
    if let Some(cell) = cell {
        cell.wait(polling_budget(delay, attempts));
        return known();
    }
    let mut delay = delay;
    for attempt in 1..=attempts {
        if let Some(found) = known() {
            return Some(found);
        }
        if attempt < attempts {
            thread::sleep(delay);
            delay = delay * 110 / 100;
        }
    }
    None
}

/// The time spent by all polling attempts, waiting 10% longer at each attempt.
fn polling_budget(delay: Duration, attempts: u32) -> Duration {
    let mut total = Duration::ZERO;
    let mut delay = delay;
    for _ in 0..attempts {
        total += delay;
        delay = delay * 110 / 100;
    }
    total
}

fn unknown_object(error: StoreError) -> NodeError {
    match error {
        StoreError::UnknownObject(object) => NodeError::UnknownObject(object),
        other => NodeError::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polling_budget_grows_geometrically() {
        let budget = polling_budget(Duration::from_millis(100), 3);
        assert_eq!(budget, Duration::from_millis(100 + 110 + 121));
        assert_eq!(polling_budget(Duration::from_millis(10), 0), Duration::ZERO);
    }

    #[test]
    fn test_pending_request_is_tried_once_after_waiting() {
        let mut tries = 0;
        let cell = Arc::new(OutcomeCell::default());
        let found: Option<()> = poll(Some(cell), Duration::from_millis(1), 5, || {
            tries += 1;
            None
        });
        assert_eq!(found, None);
        assert_eq!(tries, 1);
    }

    #[test]
    fn test_polling_without_cell_tries_every_attempt() {
        let mut tries = 0;
        let found: Option<()> = poll(None, Duration::from_millis(1), 4, || {
            tries += 1;
            None
        });
        assert_eq!(found, None);
        assert_eq!(tries, 4);

        let mut tries = 0;
        let found = poll(None, Duration::from_millis(1), 4, || {
            tries += 1;
            (tries == 2).then_some("found")
        });
        assert_eq!(found, Some("found"));
        assert_eq!(tries, 2);
    }
}
