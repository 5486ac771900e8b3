/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The garbage collector of the versions of the store.
//!
//! A version is in use while it is the head of the node, or while some computation holds a
//! [StoreGuard] for it. A version that stops being used is enqueued, and a background thread
//! frees it from the persistent store. Collection is best-effort: versions that could not be
//! enqueued or freed stay in the persisted list of past stores, which the collector rescans
//! periodically and at startup.

use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    logging,
    store::{KVStore, StateId, StoreVersions},
};

use super::outcomes::lock;

/// How long the worker waits on the queue before checking for shutdown.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Users {
    head: StateId,
    counts: HashMap<StateId, usize>,
}

impl Users {
    fn is_used(&self, id: &StateId) -> bool {
        *id == self.head || self.counts.get(id).map_or(false, |count| *count > 0)
    }
}

pub struct GarbageCollector<K: KVStore> {
    versions: Arc<Mutex<StoreVersions<K>>>,
    users: Mutex<Users>,
    queue: SyncSender<StateId>,
}

impl<K: KVStore> GarbageCollector<K> {
    pub(crate) fn new(
        versions: Arc<Mutex<StoreVersions<K>>>,
        head: StateId,
        queue_capacity: usize,
    ) -> (Arc<Self>, Receiver<StateId>) {
        let (queue, receiver) = mpsc::sync_channel(queue_capacity.max(1));
        let gc = Arc::new(Self {
            versions,
            users: Mutex::new(Users {
                head,
                counts: HashMap::new(),
            }),
            queue,
        });
        (gc, receiver)
    }

    /// Marks the store `id` as used until the returned guard is dropped.
    pub fn enter(self: &Arc<Self>, id: StateId) -> StoreGuard<K> {
        *lock(&self.users).counts.entry(id).or_insert(0) += 1;
        StoreGuard {
            gc: Arc::clone(self),
            id,
        }
    }

    fn exit(&self, id: StateId) {
        let unused = {
            let mut users = lock(&self.users);
            let count = users.counts.entry(id).or_insert(0);
            *count = count.saturating_sub(1);
            if *count == 0 {
                users.counts.remove(&id);
            }
            !users.is_used(&id)
        };
        if unused {
            self.enqueue(id);
        }
    }

    /// True if the store `id` is the head or is held by some computation.
    pub fn is_used(&self, id: &StateId) -> bool {
        lock(&self.users).is_used(id)
    }

    /// Records that the head of the node moved from `old` to `new`. `old` is enqueued for
    /// collection if nothing uses it anymore.
    pub(crate) fn move_head(&self, old: StateId, new: StateId) {
        let unused = {
            let mut users = lock(&self.users);
            users.head = new;
            !users.is_used(&old)
        };
        if unused {
            self.enqueue(old);
        }
    }

    pub(crate) fn enqueue(&self, id: StateId) {
        match self.queue.try_send(id) {
            Ok(()) => (),
            Err(TrySendError::Full(_)) => logging::garbage_collection_queue_full(),
            // the worker is gone, the store stays in the past stores
            Err(TrySendError::Disconnected(_)) => (),
        }
    }

    /// Frees the store `id` if it is still rooted and nobody uses it.
    pub(crate) fn collect(&self, id: &StateId) {
        // keep the users locked, so that nobody can enter the store while it gets freed
        let users = lock(&self.users);
        if users.is_used(id) {
            return;
        }
        let mut versions = lock(&self.versions);
        if !versions.is_rooted(id) {
            return;
        }
        match versions.free(id) {
            Ok(()) => logging::garbage_collected(id),
            Err(error) => logging::garbage_collection_failed(id, &error),
        }
    }

    /// Collects every past store that is not used anymore.
    pub(crate) fn rescan(&self) {
        let past_stores = lock(&self.versions).past_stores();
        match past_stores {
            Ok(past_stores) => past_stores.iter().for_each(|id| self.collect(id)),
            Err(error) => log::warn!("could not read the past stores: {}", error),
        }
    }
}

/// Marks a store as used while alive.
pub struct StoreGuard<K: KVStore> {
    gc: Arc<GarbageCollector<K>>,
    id: StateId,
}

impl<K: KVStore> StoreGuard<K> {
    pub fn id(&self) -> StateId {
        self.id
    }
}

impl<K: KVStore> Drop for StoreGuard<K> {
    fn drop(&mut self) {
        self.gc.exit(self.id);
    }
}

pub(crate) fn start_garbage_collector<K: KVStore>(
    gc: Arc<GarbageCollector<K>>,
    queue: Receiver<StateId>,
    shutdown_signal: Receiver<()>,
    rescan_interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut last_rescan = Instant::now();
        loop {
            match shutdown_signal.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => (),
            }

            match queue.recv_timeout(QUEUE_POLL_INTERVAL.min(rescan_interval)) {
                Ok(id) => gc.collect(&id),
                Err(RecvTimeoutError::Timeout) => (),
                Err(RecvTimeoutError::Disconnected) => return,
            }

            if last_rescan.elapsed() >= rescan_interval {
                gc.rescan();
                last_rescan = Instant::now();
            }
        }
    })
}
