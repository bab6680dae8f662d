//! Header chain engine
//!
//! `BlockChain` validates incoming headers against their ancestry, keeps
//! the head on the branch with the most cumulative work, buffers orphans
//! until their parents arrive and tells listeners what changed.
//!
//! All mutations run under one lock. Height futures are resolved before
//! the lock is released, and listeners are called while it is still held,
//! so a listener sees every batch in chain order. Read-only queries take
//! only short-lived locks and may be called from inside a callback.

use crate::chain::chain_state::{BlockStatus, ChainConfig, OrphanPool, Payload};
use crate::chain::error::{ChainError, ListenerFailure};
use crate::chain::false_positive::FalsePositiveEstimator;
use crate::chain::future::HeightFuture;
use crate::chain::listener::{BlockEvent, ChainListener, ListenerId, NotificationReason};
use crate::consensus::{
    check_block_version, check_body, check_checkpoint, check_difficulty, check_proof_of_work,
    check_timestamp,
};
use crate::core::{Block, Header, Transaction};
use crate::crypto::Sha256Hash;
use crate::params::NetworkParameters;
use crate::storage::{BlockStore, StoreError, StoredHeader};
use chrono::{DateTime, Duration, Utc};
use futures::channel::oneshot;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

// All guarded state is consistent between steps, so a poisoned lock is
// still safe to use.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// A header with the transactions a bloom filter matched in its block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredBlock {
    pub header: Header,
    pub matched: Vec<Transaction>,
    /// Number of transactions in the full block
    pub total_transactions: u32,
}

#[derive(Clone)]
struct Registered {
    id: ListenerId,
    listener: Arc<dyn ChainListener>,
}

/// What one accepted header changed, in delivery order
#[derive(Debug, Default)]
struct Notification {
    disconnected: Vec<BlockEvent>,
    connected: Vec<BlockEvent>,
}

/// Clears the notifying marker when a batch ends, even by unwinding
struct NotifyingGuard<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> NotifyingGuard<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *lock(slot) = Some(thread::current().id());
        Self { slot }
    }
}

impl Drop for NotifyingGuard<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

// =============================================================================
// Block Chain
// =============================================================================

pub struct BlockChain<S: BlockStore> {
    params: Arc<NetworkParameters>,
    config: ChainConfig,
    store: RwLock<S>,
    /// Cached copy of the store's chain head
    head: RwLock<StoredHeader>,
    mutation: Mutex<()>,
    orphans: Mutex<OrphanPool>,
    height_futures: Mutex<BTreeMap<u64, Vec<oneshot::Sender<StoredHeader>>>>,
    listeners: Mutex<Vec<Registered>>,
    /// Listeners registered from inside a callback, added once the batch ends
    deferred_listeners: Mutex<Vec<Registered>>,
    next_listener_id: AtomicU64,
    notifying: Mutex<Option<ThreadId>>,
    fp_estimator: Mutex<FalsePositiveEstimator>,
}

impl<S: BlockStore> BlockChain<S> {
    /// Create a chain over `store`, which must already contain the
    /// network's genesis header
    pub fn new(params: Arc<NetworkParameters>, store: S) -> Result<Self, ChainError> {
        Self::with_config(params, store, ChainConfig::default())
    }

    pub fn with_config(
        params: Arc<NetworkParameters>,
        store: S,
        config: ChainConfig,
    ) -> Result<Self, ChainError> {
        if !store.contains(&params.genesis_hash)? {
            return Err(StoreError::Corrupt(format!(
                "store does not contain the {} genesis block {}",
                params.network, params.genesis_hash
            ))
            .into());
        }
        let head = store.get_chain_head()?;
        log::info!(
            "Chain on {} starting at height {} ({})",
            params.network,
            head.height(),
            head.hash()
        );

        Ok(Self {
            orphans: Mutex::new(OrphanPool::new(config.max_orphans, config.orphan_expiry_secs)),
            params,
            config,
            store: RwLock::new(store),
            head: RwLock::new(head),
            mutation: Mutex::new(()),
            height_futures: Mutex::new(BTreeMap::new()),
            listeners: Mutex::new(Vec::new()),
            deferred_listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            notifying: Mutex::new(None),
            fp_estimator: Mutex::new(FalsePositiveEstimator::new()),
        })
    }

    pub fn params(&self) -> &NetworkParameters {
        &self.params
    }

    // =========================================================================
    // Adding headers
    // =========================================================================

    /// Add a header, optionally with its full transaction list.
    ///
    /// Returns `true` if the best chain advanced. Orphans, side-chain
    /// headers and duplicates are accepted without error and return `false`.
    pub fn add(&self, header: Header, transactions: Option<Vec<Transaction>>) -> Result<bool, ChainError> {
        Ok(self.add_with_status(header, transactions)?.advanced_head())
    }

    pub fn add_block(&self, block: Block) -> Result<bool, ChainError> {
        self.add(block.header, Some(block.transactions))
    }

    /// Add a header together with the transactions a bloom filter matched.
    /// The block's transaction count feeds the false-positive estimate.
    pub fn add_filtered(&self, block: FilteredBlock) -> Result<bool, ChainError> {
        let payload = Payload::Filtered {
            matched: block.matched,
            total: block.total_transactions,
        };
        Ok(self.add_payload(block.header, payload)?.advanced_head())
    }

    /// Like `add`, but reports exactly what happened to the header
    pub fn add_with_status(
        &self,
        header: Header,
        transactions: Option<Vec<Transaction>>,
    ) -> Result<BlockStatus, ChainError> {
        let payload = match transactions {
            Some(txs) => Payload::Full(txs),
            None => Payload::HeaderOnly,
        };
        self.add_payload(header, payload)
    }

    fn add_payload(&self, header: Header, payload: Payload) -> Result<BlockStatus, ChainError> {
        self.ensure_not_notifying()?;
        let _mutation = lock(&self.mutation);

        let mut notifications = Vec::new();
        let hash = header.hash();
        let status = self.process(header, payload, &mut notifications)?;
        if !matches!(status, BlockStatus::Orphan | BlockStatus::Duplicate) {
            self.connect_orphans(hash, &mut notifications);
        }

        self.resolve_height_futures();
        let mut failures = self.notify(&notifications);
        failures.extend(self.register_deferred());

        if !failures.is_empty() {
            return Err(ChainError::ListenerNotification { failures });
        }
        Ok(status)
    }

    fn ensure_not_notifying(&self) -> Result<(), ChainError> {
        if *lock(&self.notifying) == Some(thread::current().id()) {
            return Err(ChainError::ReentrantMutation);
        }
        Ok(())
    }

    fn process(
        &self,
        header: Header,
        payload: Payload,
        notifications: &mut Vec<Notification>,
    ) -> Result<BlockStatus, ChainError> {
        let hash = header.hash();

        let existing = read(&self.store).get(&hash)?;
        if let Some(existing) = existing {
            if !existing.more_work_than(&self.chain_head()) {
                log::debug!("Ignoring duplicate header {}", hash);
                return Ok(BlockStatus::Duplicate);
            }
            // Stored but not connected: the head was rolled back, or a crash hit
            // between storing the header and moving the head
            log::info!("Reconnecting stored header {} at height {}", hash, existing.height());
            return self.connect(existing, payload, notifications);
        }
        if lock(&self.orphans).contains(&hash) {
            return Ok(BlockStatus::Orphan);
        }

        check_proof_of_work(&self.params, &header)?;
        check_timestamp(&header, Utc::now().timestamp(), self.config.max_future_block_time)?;
        if let Payload::Full(txs) = &payload {
            check_body(&header, txs)?;
        }

        let stored = {
            let store = read(&self.store);
            let prev = store.get(&header.prev_block_hash)?;
            let prev = match prev {
                Some(prev) => prev,
                None => {
                    drop(store);
                    let now = Utc::now().timestamp().max(0) as u64;
                    let mut orphans = lock(&self.orphans);
                    orphans.add(header, payload, now);
                    log::debug!("Buffered orphan {} ({} in pool)", hash, orphans.len());
                    return Ok(BlockStatus::Orphan);
                }
            };

            check_difficulty::<_, ChainError>(&self.params, &*store, &prev, &header)?;
            check_block_version::<_, ChainError>(&self.params, &*store, &prev, &header)?;
            let stored = prev.build_next(header);
            check_checkpoint(&self.params, stored.height(), stored.header())?;
            stored
        };

        write(&self.store).put(stored.clone())?;
        self.connect(stored, payload, notifications)
    }

    /// Decide where an already stored header sits and move the head if it
    /// carries more work
    fn connect(
        &self,
        stored: StoredHeader,
        payload: Payload,
        notifications: &mut Vec<Notification>,
    ) -> Result<BlockStatus, ChainError> {
        if let Payload::Filtered { total, .. } = &payload {
            lock(&self.fp_estimator).track_filtered_transactions(*total);
        }
        let transactions = payload.transactions().map(<[Transaction]>::to_vec);
        let head = self.chain_head();

        if !stored.more_work_than(&head) {
            log::debug!(
                "Side chain header {} at height {}",
                stored.hash(),
                stored.height()
            );
            notifications.push(Notification {
                disconnected: Vec::new(),
                connected: vec![BlockEvent {
                    block: stored,
                    transactions,
                    reason: NotificationReason::SideChain,
                    relativity_offset: 0,
                }],
            });
            return Ok(BlockStatus::AddedToSideChain);
        }

        if stored.header().prev_block_hash == head.hash() {
            self.set_head(stored.clone())?;
            log::debug!("Connected {} at height {}", stored.hash(), stored.height());
            notifications.push(Notification {
                disconnected: Vec::new(),
                connected: vec![BlockEvent {
                    block: stored,
                    transactions,
                    reason: NotificationReason::NewBestChain,
                    relativity_offset: 0,
                }],
            });
            return Ok(BlockStatus::AddedToMainChain);
        }

        let (old_branch, new_branch) = {
            let store = read(&self.store);
            let split = find_split(&*store, &stored, &head)?;
            (
                segment_above(&*store, &head, &split)?,
                segment_above(&*store, &stored, &split)?,
            )
        };
        self.set_head(stored.clone())?;

        if !old_branch.is_empty() {
            log::info!(
                "Reorganized: {} blocks disconnected, {} connected, new head {} at height {}",
                old_branch.len(),
                new_branch.len(),
                stored.hash(),
                stored.height()
            );
        }

        let tip = stored.hash();
        let disconnected: Vec<BlockEvent> = old_branch
            .into_iter()
            .enumerate()
            .map(|(offset, block)| BlockEvent {
                block,
                transactions: None,
                reason: NotificationReason::NewBestChain,
                relativity_offset: offset,
            })
            .collect();
        let connected: Vec<BlockEvent> = new_branch
            .into_iter()
            .rev()
            .enumerate()
            .map(|(offset, block)| BlockEvent {
                transactions: if block.hash() == tip { transactions.clone() } else { None },
                block,
                reason: NotificationReason::NewBestChain,
                relativity_offset: offset,
            })
            .collect();

        let status = BlockStatus::CausedReorg {
            disconnected: disconnected.len(),
            connected: connected.len(),
        };
        notifications.push(Notification {
            disconnected,
            connected,
        });
        Ok(status)
    }

    /// Connect buffered orphans that were waiting on `parent`, and on them
    fn connect_orphans(&self, parent: Sha256Hash, notifications: &mut Vec<Notification>) {
        let mut queue = VecDeque::from([parent]);
        while let Some(parent) = queue.pop_front() {
            let children = lock(&self.orphans).take_children(&parent);
            for orphan in children {
                let hash = orphan.hash();
                match self.process(orphan.header, orphan.payload, notifications) {
                    Ok(_) => {
                        log::debug!("Connected former orphan {}", hash);
                        queue.push_back(hash);
                    }
                    Err(e) => log::warn!("Dropping orphan {}: {}", hash, e),
                }
            }
        }
    }

    fn set_head(&self, head: StoredHeader) -> Result<(), ChainError> {
        write(&self.store).set_chain_head(head.clone())?;
        *write(&self.head) = head;
        Ok(())
    }

    // =========================================================================
    // Height futures
    // =========================================================================

    /// Future resolving with the best-chain header at `height` once the
    /// chain reaches it
    pub fn get_height_future(&self, height: u64) -> Result<HeightFuture, ChainError> {
        let mut futures = lock(&self.height_futures);
        let head = self.chain_head();
        if height <= head.height() {
            let header = self.ancestor_at(&head, height)?;
            return Ok(HeightFuture::ready(header));
        }
        let (future, sender) = HeightFuture::pending(height);
        futures.entry(height).or_default().push(sender);
        Ok(future)
    }

    /// Resolve every pending future at or below the head, lowest first
    fn resolve_height_futures(&self) {
        let mut futures = lock(&self.height_futures);
        let head = self.chain_head();
        let pending = futures.split_off(&(head.height() + 1));
        let ready = std::mem::replace(&mut *futures, pending);
        drop(futures);

        for (height, senders) in ready {
            let header = match self.ancestor_at(&head, height) {
                Ok(header) => header,
                Err(e) => {
                    log::warn!("Cannot resolve height future {}: {}", height, e);
                    continue;
                }
            };
            for sender in senders {
                let _ = sender.send(header.clone());
            }
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Register a listener.
    ///
    /// If the listener reports a last-seen height below the head, the head
    /// rolls back to that height first. Called from inside a callback, the
    /// registration takes effect once the current batch has been delivered.
    pub fn add_listener(&self, listener: Arc<dyn ChainListener>) -> Result<ListenerId, ChainError> {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        let registered = Registered { id, listener };

        if *lock(&self.notifying) == Some(thread::current().id()) {
            lock(&self.deferred_listeners).push(registered);
            return Ok(id);
        }

        let _mutation = lock(&self.mutation);
        self.register(registered)?;
        Ok(id)
    }

    /// Returns `false` if no listener had this ID
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut removed = false;
        for list in [&self.listeners, &self.deferred_listeners] {
            let mut list = lock(list);
            let before = list.len();
            list.retain(|r| r.id != id);
            removed |= list.len() != before;
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn register(&self, registered: Registered) -> Result<(), ChainError> {
        if let Some(seen) = registered.listener.last_seen_height() {
            let head = self.chain_head();
            if seen < head.height() {
                let target = self.ancestor_at(&head, seen)?;
                log::warn!(
                    "{} last saw height {}, rolling chain head back from {} to {}",
                    registered.id,
                    seen,
                    head.height(),
                    target.hash()
                );
                self.set_head(target)?;
            } else if seen > head.height() {
                log::warn!(
                    "{} last saw height {}, ahead of chain head at {}",
                    registered.id,
                    seen,
                    head.height()
                );
            }
        }
        lock(&self.listeners).push(registered);
        Ok(())
    }

    /// Register listeners added from inside callbacks. A listener that
    /// cannot be registered is reported alongside the callback failures.
    fn register_deferred(&self) -> Vec<ListenerFailure> {
        let deferred: Vec<Registered> = lock(&self.deferred_listeners).drain(..).collect();
        let mut failures = Vec::new();
        for registered in deferred {
            let id = registered.id;
            if let Err(e) = self.register(registered) {
                log::warn!("{} could not be registered: {}", id, e);
                failures.push(ListenerFailure {
                    listener: id,
                    message: e.to_string(),
                });
            }
        }
        failures
    }

    /// Deliver every batch to a snapshot of the listeners, collecting failures
    fn notify(&self, notifications: &[Notification]) -> Vec<ListenerFailure> {
        let mut failures = Vec::new();
        if notifications.is_empty() {
            return failures;
        }

        let snapshot: Vec<Registered> = lock(&self.listeners).clone();
        let _guard = NotifyingGuard::enter(&self.notifying);

        for notification in notifications {
            for registered in &snapshot {
                if !notification.disconnected.is_empty() {
                    if let Err(e) = registered.listener.on_blocks_disconnected(&notification.disconnected) {
                        log::warn!("{} failed on disconnect: {}", registered.id, e);
                        failures.push(ListenerFailure {
                            listener: registered.id,
                            message: e.to_string(),
                        });
                    }
                }
                if !notification.connected.is_empty() {
                    if let Err(e) = registered.listener.on_blocks_connected(&notification.connected) {
                        log::warn!("{} failed on connect: {}", registered.id, e);
                        failures.push(ListenerFailure {
                            listener: registered.id,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
        failures
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn chain_head(&self) -> StoredHeader {
        read(&self.head).clone()
    }

    pub fn best_chain_height(&self) -> u64 {
        read(&self.head).height()
    }

    pub fn get(&self, hash: &Sha256Hash) -> Result<Option<StoredHeader>, ChainError> {
        Ok(read(&self.store).get(hash)?)
    }

    /// Best-chain header at `height`, `None` above the head
    pub fn header_at_height(&self, height: u64) -> Result<Option<StoredHeader>, ChainError> {
        let head = self.chain_head();
        if height > head.height() {
            return Ok(None);
        }
        Ok(Some(self.ancestor_at(&head, height)?))
    }

    fn ancestor_at(&self, from: &StoredHeader, height: u64) -> Result<StoredHeader, ChainError> {
        let store = read(&self.store);
        let mut cursor = from.clone();
        while cursor.height() > height {
            cursor = cursor.expect_prev(&*store)?;
        }
        Ok(cursor)
    }

    pub fn is_orphan(&self, hash: &Sha256Hash) -> bool {
        lock(&self.orphans).contains(hash)
    }

    /// Earliest buffered ancestor of the orphan `hash`
    pub fn orphan_root(&self, hash: &Sha256Hash) -> Option<Header> {
        lock(&self.orphans).root(hash).map(|o| o.header.clone())
    }

    pub fn orphan_count(&self) -> usize {
        lock(&self.orphans).len()
    }

    /// Whether a coinbase mined at `height` is buried deep enough to spend
    pub fn is_coinbase_mature(&self, height: u64) -> bool {
        let head = self.best_chain_height();
        head >= height && head - height + 1 >= self.params.spendable_coinbase_depth
    }

    /// Expected time the best chain reaches `height`, assuming blocks
    /// arrive at the target spacing. `None` if the result is not a
    /// representable date.
    pub fn estimate_block_time(&self, height: u64) -> Option<DateTime<Utc>> {
        let head = self.chain_head();
        let blocks = i64::try_from(height)
            .ok()?
            .checked_sub(i64::try_from(head.height()).ok()?)?;
        let spacing = i64::try_from(self.params.target_spacing).ok()?;
        let offset = Duration::try_seconds(blocks.checked_mul(spacing)?)?;
        head.header().timestamp().checked_add_signed(offset)
    }

    // =========================================================================
    // False positives
    // =========================================================================

    pub fn track_false_positives(&self, count: u32) {
        let mut estimator = lock(&self.fp_estimator);
        estimator.track_false_positives(count);
        log::debug!("Tracked {} false positives, rate now {:.6}", count, estimator.rate());
    }

    pub fn track_filtered_transactions(&self, count: u32) {
        lock(&self.fp_estimator).track_filtered_transactions(count);
    }

    pub fn false_positive_rate(&self) -> f64 {
        lock(&self.fp_estimator).rate()
    }

    pub fn reset_false_positive_estimate(&self) {
        lock(&self.fp_estimator).reset();
    }
}

/// Last header shared by the branches ending at `a` and `b`
fn find_split<S: BlockStore + ?Sized>(
    store: &S,
    a: &StoredHeader,
    b: &StoredHeader,
) -> Result<StoredHeader, StoreError> {
    let mut a = a.clone();
    let mut b = b.clone();
    while a.hash() != b.hash() {
        if a.height() > b.height() {
            a = a.expect_prev(store)?;
        } else if b.height() > a.height() {
            b = b.expect_prev(store)?;
        } else {
            a = a.expect_prev(store)?;
            b = b.expect_prev(store)?;
        }
    }
    Ok(a)
}

/// Headers from `tip` down to, but excluding, `split`, highest first
fn segment_above<S: BlockStore + ?Sized>(
    store: &S,
    tip: &StoredHeader,
    split: &StoredHeader,
) -> Result<Vec<StoredHeader>, StoreError> {
    let mut segment = Vec::new();
    let mut cursor = tip.clone();
    while cursor.height() > split.height() {
        let prev = cursor.expect_prev(store)?;
        segment.push(cursor);
        cursor = prev;
    }
    Ok(segment)
}
