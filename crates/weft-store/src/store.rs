// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transactional record store.
use std::collections::{BTreeSet, VecDeque};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::StoreConfig;
use crate::disposable::{
    RetainHandle, SharedRegistry, Subscription, SubscriptionCallback, SubscriptionEntry,
};
use crate::ident::DataId;
use crate::proxy::RecordSourceProxy;
use crate::reader::{read, ReaderSnapshot, Selector};
use crate::record::Record;
use crate::snapshot::{compute_state_hash, Snapshot};
use crate::source::{ChangeSet, RecordSource, RecordStatus};
use crate::tx::{OptimisticUpdateId, TxId, TxKind};

/// Errors emitted by the store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The supplied transaction identifier did not exist or was already closed.
    #[error("transaction not active: {0}")]
    UnknownTx(TxId),
    /// Another transaction is still live.
    #[error("transaction {live} is still live")]
    TransactionConflict {
        /// The live transaction.
        live: TxId,
    },
    /// No optimistic layer with this id is applied.
    #[error("optimistic update not applied: {0}")]
    UnknownOptimisticUpdate(OptimisticUpdateId),
    /// The root record cannot be deleted.
    #[error("the root record cannot be deleted")]
    RootDeletion,
    /// Garbage collection needs a quiescent store.
    #[error("gc blocked: {0}")]
    GcBlocked(&'static str),
    /// A write targeted a record that does not exist.
    #[error("record does not exist: {0}")]
    MissingRecord(DataId),
    /// A create targeted an id that already exists.
    #[error("record already exists: {0}")]
    RecordExists(DataId),
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Committed transaction.
    pub tx: TxId,
    /// Records written or deleted, in ascending id order.
    pub updated_ids: Vec<DataId>,
    /// Snapshot of the visible state after the commit.
    pub snapshot: Snapshot,
    /// Layer id, for optimistic commits.
    pub optimistic: Option<OptimisticUpdateId>,
}

#[derive(Debug)]
struct LiveTx {
    id: TxId,
    kind: TxKind,
    changes: ChangeSet,
}

#[derive(Debug)]
struct OptimisticLayer {
    id: OptimisticUpdateId,
    changes: ChangeSet,
}

/// Normalized record store.
///
/// Server data lives in a base source. Optimistic transactions commit into
/// layers stacked above it; readers see the visible source (base plus every
/// layer in order). At most one transaction is live at a time.
#[derive(Debug)]
pub struct Store {
    config: StoreConfig,
    base: RecordSource,
    visible: RecordSource,
    layers: Vec<OptimisticLayer>,
    tx_counter: u64,
    live: Option<LiveTx>,
    last_snapshot: Snapshot,
    subscriptions: SharedRegistry<SubscriptionEntry>,
    retains: SharedRegistry<DataId>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl Store {
    /// Creates an empty store holding only the root record.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_source(config, RecordSource::default())
    }

    /// Creates a store over existing records.
    pub fn with_source(config: StoreConfig, source: RecordSource) -> Self {
        let hash = compute_state_hash(&source);
        Self {
            config,
            visible: source.clone(),
            base: source,
            layers: Vec::new(),
            tx_counter: 0,
            live: None,
            last_snapshot: Snapshot {
                hash,
                parent: None,
                tx: None,
            },
            subscriptions: SharedRegistry::default(),
            retains: SharedRegistry::default(),
        }
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Begins a server transaction.
    ///
    /// # Errors
    /// [`StoreError::TransactionConflict`] while another transaction is live.
    pub fn begin(&mut self) -> Result<TxId, StoreError> {
        self.begin_kind(TxKind::Server)
    }

    /// Begins an optimistic transaction.
    ///
    /// # Errors
    /// [`StoreError::TransactionConflict`] while another transaction is live.
    pub fn begin_optimistic(&mut self) -> Result<TxId, StoreError> {
        self.begin_kind(TxKind::Optimistic)
    }

    fn begin_kind(&mut self, kind: TxKind) -> Result<TxId, StoreError> {
        if let Some(live) = &self.live {
            return Err(StoreError::TransactionConflict { live: live.id });
        }
        // Increment with wrap and never produce 0 (reserved invalid).
        self.tx_counter = self.tx_counter.wrapping_add(1);
        if self.tx_counter == 0 {
            self.tx_counter = 1;
        }
        let id = TxId::from_raw(self.tx_counter);
        debug!(tx = %id, ?kind, "begin");
        self.live = Some(LiveTx {
            id,
            kind,
            changes: ChangeSet::default(),
        });
        Ok(id)
    }

    /// Currently live transaction, if any.
    pub fn live_tx(&self) -> Option<TxId> {
        self.live.as_ref().map(|live| live.id)
    }

    /// Kind of the live transaction `tx`.
    ///
    /// # Errors
    /// [`StoreError::UnknownTx`] when `tx` is not live.
    pub fn tx_kind(&self, tx: TxId) -> Result<TxKind, StoreError> {
        match &self.live {
            Some(live) if live.id == tx => Ok(live.kind),
            _ => Err(StoreError::UnknownTx(tx)),
        }
    }

    /// Mutable view for `tx`.
    ///
    /// Server transactions see the base source; optimistic transactions see
    /// the visible source.
    ///
    /// # Errors
    /// [`StoreError::UnknownTx`] when `tx` is not live.
    pub fn proxy(&mut self, tx: TxId) -> Result<RecordSourceProxy<'_>, StoreError> {
        let live = match self.live.as_mut() {
            Some(live) if live.id == tx => live,
            _ => return Err(StoreError::UnknownTx(tx)),
        };
        let base = match live.kind {
            TxKind::Server => &self.base,
            TxKind::Optimistic => &self.visible,
        };
        Ok(RecordSourceProxy::new(base, &mut live.changes))
    }

    /// Publishes the writes of `tx` and notifies affected subscribers.
    ///
    /// # Errors
    /// [`StoreError::UnknownTx`] when `tx` is not live.
    #[instrument(level = "debug", skip_all, fields(tx = %tx))]
    pub fn commit(&mut self, tx: TxId) -> Result<CommitReceipt, StoreError> {
        let live = match self.live.take() {
            Some(live) if live.id == tx => live,
            other => {
                self.live = other;
                return Err(StoreError::UnknownTx(tx));
            }
        };
        let updated: BTreeSet<DataId> = live.changes.ids().cloned().collect();
        let optimistic = match live.kind {
            TxKind::Server => {
                self.base.apply(&live.changes);
                self.rebuild_visible();
                None
            }
            TxKind::Optimistic => {
                let id = OptimisticUpdateId::from_tx(tx);
                self.visible.apply(&live.changes);
                self.layers.push(OptimisticLayer {
                    id,
                    changes: live.changes,
                });
                Some(id)
            }
        };
        let snapshot = self.advance_snapshot(Some(tx));
        debug!(updated = updated.len(), hash = %snapshot.hash_hex(), "committed");
        self.notify(&updated);
        Ok(CommitReceipt {
            tx,
            updated_ids: updated.into_iter().collect(),
            snapshot,
            optimistic,
        })
    }

    /// Discards the writes of `tx`.
    ///
    /// # Errors
    /// [`StoreError::UnknownTx`] when `tx` is not live.
    pub fn abort(&mut self, tx: TxId) -> Result<(), StoreError> {
        match self.live.take() {
            Some(live) if live.id == tx => {
                debug!(tx = %tx, discarded = live.changes.changes.len(), "abort");
                Ok(())
            }
            other => {
                self.live = other;
                Err(StoreError::UnknownTx(tx))
            }
        }
    }

    /// Runs `f` in a server transaction: commits on `Ok`, aborts on `Err`.
    ///
    /// # Errors
    /// Whatever `f` returns, or a [`StoreError`] from begin/commit.
    pub fn update<T, E>(
        &mut self,
        f: impl FnOnce(&mut RecordSourceProxy<'_>) -> Result<T, E>,
    ) -> Result<(T, CommitReceipt), E>
    where
        E: From<StoreError>,
    {
        self.scoped(TxKind::Server, f)
    }

    /// Applies a client-only update to the server base.
    ///
    /// Local updates are never reverted by optimistic rollbacks and survive
    /// later server payloads that do not touch the same fields.
    ///
    /// # Errors
    /// Whatever `f` returns, or a [`StoreError`] from begin/commit.
    pub fn commit_local_update<T, E>(
        &mut self,
        f: impl FnOnce(&mut RecordSourceProxy<'_>) -> Result<T, E>,
    ) -> Result<(T, CommitReceipt), E>
    where
        E: From<StoreError>,
    {
        debug!("local update");
        self.scoped(TxKind::Server, f)
    }

    /// Runs `f` in an optimistic transaction; on success the layer id is in
    /// the receipt.
    ///
    /// # Errors
    /// Whatever `f` returns, or a [`StoreError`] from begin/commit.
    pub fn apply_optimistic_update<T, E>(
        &mut self,
        f: impl FnOnce(&mut RecordSourceProxy<'_>) -> Result<T, E>,
    ) -> Result<(T, CommitReceipt), E>
    where
        E: From<StoreError>,
    {
        self.scoped(TxKind::Optimistic, f)
    }

    fn scoped<T, E>(
        &mut self,
        kind: TxKind,
        f: impl FnOnce(&mut RecordSourceProxy<'_>) -> Result<T, E>,
    ) -> Result<(T, CommitReceipt), E>
    where
        E: From<StoreError>,
    {
        let tx = self.begin_kind(kind)?;
        let outcome = {
            let mut proxy = self.proxy(tx)?;
            f(&mut proxy)
        };
        match outcome {
            Ok(value) => Ok((value, self.commit(tx)?)),
            Err(err) => {
                self.abort(tx)?;
                Err(err)
            }
        }
    }

    /// Removes an optimistic layer and rebuilds the visible state.
    ///
    /// # Errors
    /// [`StoreError::UnknownOptimisticUpdate`] when the layer is not applied;
    /// [`StoreError::TransactionConflict`] while a transaction is live.
    #[instrument(level = "debug", skip_all, fields(update = %id))]
    pub fn revert_optimistic(&mut self, id: OptimisticUpdateId) -> Result<Snapshot, StoreError> {
        if let Some(live) = &self.live {
            return Err(StoreError::TransactionConflict { live: live.id });
        }
        let Some(pos) = self.layers.iter().position(|layer| layer.id == id) else {
            return Err(StoreError::UnknownOptimisticUpdate(id));
        };
        let layer = self.layers.remove(pos);
        let updated: BTreeSet<DataId> = layer.changes.ids().cloned().collect();
        self.rebuild_visible();
        let snapshot = self.advance_snapshot(None);
        debug!(updated = updated.len(), "reverted");
        self.notify(&updated);
        Ok(snapshot)
    }

    /// Ids of applied optimistic layers, oldest first.
    pub fn optimistic_updates(&self) -> Vec<OptimisticUpdateId> {
        self.layers.iter().map(|layer| layer.id).collect()
    }

    fn rebuild_visible(&mut self) {
        let mut visible = self.base.clone();
        for layer in &self.layers {
            visible.apply(&layer.changes);
        }
        self.visible = visible;
    }

    fn advance_snapshot(&mut self, tx: Option<TxId>) -> Snapshot {
        let snapshot = Snapshot {
            hash: compute_state_hash(&self.visible),
            parent: Some(self.last_snapshot.hash),
            tx: tx.or(self.last_snapshot.tx),
        };
        self.last_snapshot = snapshot;
        snapshot
    }

    /// Visible record `id`, if it exists.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.visible.get(id)
    }

    /// Presence of `id` in the visible state.
    pub fn status(&self, id: &str) -> RecordStatus {
        self.visible.status(id)
    }

    /// Root record.
    pub fn root(&self) -> &Record {
        self.visible.root()
    }

    /// Visible records (base plus optimistic layers).
    pub fn source(&self) -> &RecordSource {
        &self.visible
    }

    /// Server records without optimistic layers.
    pub fn base_source(&self) -> &RecordSource {
        &self.base
    }

    /// Snapshot of the last published state.
    pub fn snapshot(&self) -> Snapshot {
        self.last_snapshot
    }

    /// Reads `selector` against the visible state.
    pub fn lookup(&self, selector: &Selector) -> ReaderSnapshot {
        read(&self.visible, selector)
    }

    /// Calls `callback` whenever a commit changes the data behind `snapshot`.
    pub fn subscribe(
        &self,
        snapshot: ReaderSnapshot,
        callback: impl FnMut(&ReaderSnapshot) + 'static,
    ) -> Subscription {
        let callback: SubscriptionCallback = Box::new(callback);
        Subscription::new(&self.subscriptions, snapshot, callback)
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    fn notify(&self, updated: &BTreeSet<DataId>) {
        if updated.is_empty() {
            return;
        }
        let keys = self.subscriptions.borrow().keys();
        let mut notified = 0_usize;
        for key in keys {
            let checked_out = self.subscriptions.borrow_mut().remove(key);
            let Some(mut entry) = checked_out else {
                continue;
            };
            if !entry.snapshot.seen_records.is_disjoint(updated) {
                let next = read(&self.visible, &entry.snapshot.selector);
                let changed = next.data != entry.snapshot.data;
                entry.snapshot = next;
                if changed {
                    notified += 1;
                    (entry.callback)(&entry.snapshot);
                }
            }
            if entry.active.get() {
                self.subscriptions.borrow_mut().reinsert(key, entry);
            }
        }
        if notified > 0 {
            debug!(notified, "subscribers notified");
        }
    }

    /// Keeps `id` and everything reachable from it alive across [`Store::gc`].
    pub fn retain(&self, id: DataId) -> RetainHandle {
        RetainHandle::new(&self.retains, id)
    }

    /// Removes every record unreachable from the root and retained ids.
    ///
    /// Returns the removed ids (records and tombstones).
    ///
    /// # Errors
    /// [`StoreError::GcBlocked`] while a transaction or an optimistic layer is
    /// live.
    #[instrument(level = "debug", skip_all)]
    pub fn gc(&mut self) -> Result<Vec<DataId>, StoreError> {
        if self.live.is_some() {
            return Err(StoreError::GcBlocked("transaction in progress"));
        }
        if !self.layers.is_empty() {
            return Err(StoreError::GcBlocked("optimistic updates applied"));
        }
        let mut reachable: BTreeSet<DataId> = BTreeSet::new();
        let mut queue: VecDeque<DataId> = VecDeque::new();
        reachable.insert(DataId::root());
        queue.push_back(DataId::root());
        for id in self.retains.borrow().values() {
            if reachable.insert(id.clone()) {
                queue.push_back(id.clone());
            }
        }
        while let Some(current) = queue.pop_front() {
            let Some(record) = self.base.get(current.as_str()) else {
                continue;
            };
            for next in record.references() {
                if reachable.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }
        let removed = self.base.retain_ids(|id| reachable.contains(id));
        if !removed.is_empty() {
            self.rebuild_visible();
            self.advance_snapshot(None);
        }
        debug!(removed = removed.len(), "gc");
        Ok(removed)
    }
}
