//! The consensus set: the single authority over the chain.
//!
//! Internally single-writer, many-reader: one `RwLock` guards all mutable
//! state, block acceptance holds the write half for the whole
//! validate-and-commit step of one block, and queries share the read half.
//! Subscribers and plugins observe block events synchronously, in the exact
//! order the consensus set commits them.

mod accept;
mod changelog;
mod diffs;
mod fork;
mod tryset;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use stakecoin_chain::block::{Block, Height};
use stakecoin_chain::outputs::{BlockStakeOutput, CoinOutput};
use stakecoin_chain::parameters::ChainConstants;
use stakecoin_chain::transaction::{Transaction, TransactionShortId};
use stakecoin_chain::{
    BlockId, BlockStakeOutputId, CanonicalSerialize, CoinOutputId, Target, Timestamp,
    TransactionId,
};
use stakecoin_state::{ledger, BucketRef, BucketStore, BucketView, Config, ReadTx, StoreError};

use crate::block::check;
use crate::block::stake::STAKE_MODIFIER_BITS;
use crate::cache::HeaderCache;
use crate::error::{AcceptError, PluginError};
use crate::gateway::{Gateway, RELAY_HEADER_RPC};
use crate::plugins::{self, ConsensusSetPlugin, PluginMetadata};
use crate::threadgroup::{CancelToken, ThreadGroup};
use crate::transaction::TransactionRegistry;
use crate::types::{
    ConsensusChange, ConsensusChangeId, ConsensusSetSubscriber, CONSENSUS_CHANGE_BEGINNING,
};

/// The registry entries a plugin contributed, kept so unregistration can
/// withdraw exactly them.
struct PluginHooks {
    controllers: Vec<Arc<dyn crate::transaction::TransactionController>>,
    standalone_validators: Vec<Arc<dyn crate::transaction::TransactionValidator>>,
    version_validators: Vec<(
        stakecoin_chain::transaction::TransactionVersion,
        Arc<dyn crate::transaction::TransactionValidator>,
    )>,
}

pub(crate) struct State {
    pub(crate) store: BucketStore,
    pub(crate) constants: ChainConstants,
    pub(crate) registry: TransactionRegistry,
    pub(crate) subscribers: Vec<Arc<dyn ConsensusSetSubscriber>>,
    pub(crate) plugins: diffs::PluginMap,
    plugin_hooks: std::collections::HashMap<String, PluginHooks>,
    /// Blocks rejected for expensive reasons, memoized for cheap re-rejects.
    pub(crate) dos_blocks: HashSet<BlockId>,
    /// Blocks ahead of the local clock, retried on later accepts.
    pub(crate) future_blocks: Vec<Block>,
    pub(crate) header_cache: HeaderCache,
    pub(crate) gateway: Option<Arc<dyn Gateway>>,
}

/// The consensus core of a node: ingests blocks, maintains the ledger
/// across forks, and fans committed changes out to subscribers and plugins.
pub struct ConsensusSet {
    state: RwLock<State>,
    tg: ThreadGroup,
}

impl ConsensusSet {
    /// Opens (or creates) the store for `config`'s network and initializes
    /// the chain from genesis when the store is fresh.
    pub fn open(config: Config, registry: TransactionRegistry) -> Result<ConsensusSet, AcceptError> {
        let constants = config.network.constants();
        let store = BucketStore::open(&config)?;
        ledger::check_store_metadata(&store)?;
        if store.view::<_, StoreError, _>(|tx| ledger::is_inconsistent(tx))? {
            return Err(AcceptError::Store(StoreError::Corrupt(
                "refusing to start on a store marked inconsistent",
            )));
        }

        let fresh = store
            .view::<_, StoreError, _>(|tx| ledger::block_height(tx))?
            .is_none();
        if fresh {
            store.update::<_, AcceptError, _>(|tx| {
                diffs::apply_genesis_block(tx, &constants)?;
                Ok(())
            })?;
            info!(network = %config.network, "initialized fresh consensus store");
        }

        // Sized so the timestamp-median and stake-modifier walks stay
        // entirely in cache for the common case.
        let cache_capacity = constants.median_timestamp_window * 4
            + constants.stake_modifier_delay as usize
            + STAKE_MODIFIER_BITS;

        Ok(ConsensusSet {
            state: RwLock::new(State {
                store,
                constants,
                registry,
                subscribers: Vec::new(),
                plugins: BTreeMap::new(),
                plugin_hooks: std::collections::HashMap::new(),
                dos_blocks: HashSet::new(),
                future_blocks: Vec::new(),
                header_cache: HeaderCache::new(cache_capacity),
                gateway: None,
            }),
            tg: ThreadGroup::new(),
        })
    }

    /// Attach the peer-to-peer gateway; accepted blocks' headers are
    /// rebroadcast through it.
    pub fn attach_gateway(&self, gateway: Arc<dyn Gateway>) {
        self.state.write().gateway = Some(gateway);
    }

    /// Ingest one block. On success the tip either advanced, or the block
    /// was recorded in the block tree awaiting a heavier fork.
    pub fn accept_block(&self, block: Block) -> Result<(), AcceptError> {
        let _guard = self.tg.add().map_err(|_| AcceptError::Shutdown)?;
        let mut state = self.state.write();
        let result = Self::accept_one(&mut state, block);
        Self::retry_future_blocks(&mut state);
        result
    }

    fn accept_one(state: &mut State, block: Block) -> Result<(), AcceptError> {
        match accept::accept_block(state, block, Timestamp::now())? {
            accept::Accepted::ChainMoved(change) => {
                Self::dispatch_change(state, &change);
                Ok(())
            }
            accept::Accepted::InTree => Ok(()),
        }
    }

    fn dispatch_change(state: &State, change: &ConsensusChange) {
        for subscriber in &state.subscribers {
            subscriber.process_consensus_change(change);
        }
        if let Some(gateway) = &state.gateway {
            for block in &change.applied_blocks {
                let header = block
                    .header()
                    .canonical_serialize_to_vec()
                    .expect("serializing to a vec is infallible");
                gateway.broadcast(RELAY_HEADER_RPC, header);
            }
        }
    }

    fn retry_future_blocks(state: &mut State) {
        if state.future_blocks.is_empty() {
            return;
        }
        let now = Timestamp::now();
        let threshold = state.constants.future_threshold_secs;
        let (ready, waiting): (Vec<Block>, Vec<Block>) = state
            .future_blocks
            .drain(..)
            .partition(|block| block.timestamp.0 <= now.0 + threshold);
        state.future_blocks = waiting;
        for block in ready {
            let id = block.id();
            if let Err(err) = Self::accept_one(state, block) {
                warn!(%id, %err, "retried future block was rejected");
            }
        }
    }

    /// Dry-run a candidate transaction set against the current tip. All
    /// state, including plugin-contributed transaction state, is rolled
    /// back; the returned change describes what the set would do.
    pub fn try_transaction_set(
        &self,
        transactions: &[Transaction],
    ) -> Result<ConsensusChange, AcceptError> {
        let _guard = self.tg.add().map_err(|_| AcceptError::Shutdown)?;
        let state = self.state.write();
        tryset::try_transaction_set(&state, transactions)
    }

    /// Replays every consensus change after `start` to `subscriber`, then
    /// adds it to the live subscriber list. `start` must be a recorded
    /// change id or the beginning sentinel.
    pub fn subscribe(
        &self,
        subscriber: Arc<dyn ConsensusSetSubscriber>,
        start: ConsensusChangeId,
        cancel: &CancelToken,
    ) -> Result<(), AcceptError> {
        let _guard = self.tg.add().map_err(|_| AcceptError::Shutdown)?;
        let mut state = self.state.write();
        let entries = state
            .store
            .view::<_, StoreError, _>(|tx| changelog::entries_after(tx, &start))?
            .ok_or(AcceptError::InvalidConsensusChangeID)?;
        for entry in entries {
            if cancel.is_cancelled() {
                return Err(AcceptError::Cancelled);
            }
            let change = state
                .store
                .view::<_, StoreError, _>(|tx| Self::load_change(tx, &entry))?;
            subscriber.process_consensus_change(&change);
        }
        state.subscribers.push(subscriber);
        Ok(())
    }

    fn load_change(
        view: &ReadTx<'_>,
        entry: &changelog::ChangeLogEntry,
    ) -> Result<ConsensusChange, StoreError> {
        let mut reverted = Vec::with_capacity(entry.reverted_block_ids.len());
        for id in &entry.reverted_block_ids {
            reverted.push(ledger::processed_block(view, id)?.ok_or(StoreError::Corrupt(
                "replayed block is missing from the block map",
            ))?);
        }
        let mut applied = Vec::with_capacity(entry.applied_block_ids.len());
        for id in &entry.applied_block_ids {
            applied.push(ledger::processed_block(view, id)?.ok_or(StoreError::Corrupt(
                "replayed block is missing from the block map",
            ))?);
        }
        Ok(diffs::consensus_change_from(entry.id, &reverted, &applied))
    }

    /// Registers a plugin: opens its bucket, runs initial catch-up from its
    /// stored change id (or from genesis), and wires its controllers and
    /// validators into the registry. Catch-up aborts promptly, with nothing
    /// committed, when `cancel` fires.
    pub fn register_plugin(
        &self,
        name: &str,
        plugin: Arc<dyn ConsensusSetPlugin>,
        cancel: &CancelToken,
    ) -> Result<(), PluginError> {
        let _guard = self.tg.add().map_err(|_| PluginError::Cancelled)?;
        plugins::validate_plugin_name(name)?;
        let mut state = self.state.write();
        if state.plugins.contains_key(name) {
            return Err(PluginError::PluginExists);
        }
        for controller in plugin.transaction_controllers() {
            if state.registry.controller(controller.version()).is_some() {
                return Err(PluginError::ControllerExists(controller.version().0));
            }
        }

        state.store.update::<_, PluginError, _>(|tx| {
            let bucket = ledger::plugin_bucket(name);
            let metadata = plugins::load_plugin_metadata(tx, name)?;
            if metadata.is_some() && tx.bucket_is_empty(&bucket)? {
                return Err(PluginError::PluginGhostMetadata);
            }
            let version = plugin.init_plugin(metadata.as_ref(), &bucket, tx)?;
            let start = metadata
                .as_ref()
                .map(|m| m.last_change_id)
                .unwrap_or(CONSENSUS_CHANGE_BEGINNING);
            let entries = changelog::entries_after(tx, &start)?
                .ok_or(PluginError::InvalidConsensusChangeID)?;
            let mut last = start;
            let replayed = entries.len();
            for entry in entries {
                if cancel.is_cancelled() {
                    return Err(PluginError::Cancelled);
                }
                for id in &entry.reverted_block_ids {
                    let pb = ledger::processed_block(tx, id)?.ok_or(StoreError::Corrupt(
                        "replayed block is missing from the block map",
                    ))?;
                    let cb = diffs::consensus_block_from(&pb);
                    plugin.revert_block(&cb, &bucket, tx)?;
                    for index in (0..cb.block.transactions.len()).rev() {
                        let ct = cb
                            .consensus_transaction(index)
                            .expect("index is within the block");
                        plugin.revert_transaction(&ct, &bucket, tx)?;
                    }
                }
                for id in &entry.applied_block_ids {
                    let pb = ledger::processed_block(tx, id)?.ok_or(StoreError::Corrupt(
                        "replayed block is missing from the block map",
                    ))?;
                    let cb = diffs::consensus_block_from(&pb);
                    for index in 0..cb.block.transactions.len() {
                        let ct = cb
                            .consensus_transaction(index)
                            .expect("index is within the block");
                        plugin.apply_transaction(&ct, &bucket, tx)?;
                    }
                    plugin.apply_block(&cb, &bucket, tx)?;
                }
                last = entry.id;
            }
            plugins::store_plugin_metadata(
                tx,
                name,
                &PluginMetadata {
                    version,
                    last_change_id: last,
                },
            )?;
            info!(plugin = name, replayed = replayed, "plugin caught up");
            Ok(())
        })?;

        let hooks = PluginHooks {
            controllers: plugin.transaction_controllers(),
            standalone_validators: plugin.transaction_validators(),
            version_validators: plugin.version_transaction_validators(),
        };
        for controller in &hooks.controllers {
            state.registry.register_controller(controller.clone())?;
        }
        for validator in &hooks.standalone_validators {
            state.registry.add_standalone_validator(validator.clone());
        }
        for (version, validator) in &hooks.version_validators {
            state.registry.add_version_validator(*version, validator.clone());
        }
        state.plugin_hooks.insert(name.to_string(), hooks);
        state.plugins.insert(name.to_string(), plugin);
        info!(plugin = name, "registered plugin");
        Ok(())
    }

    /// Unregisters a plugin, withdrawing its controllers and validators. It
    /// receives no further callbacks; its bucket and metadata stay in the
    /// store for a later re-registration.
    pub fn unregister_plugin(&self, name: &str) -> Result<(), PluginError> {
        let _guard = self.tg.add().map_err(|_| PluginError::Cancelled)?;
        let mut state = self.state.write();
        let plugin = match state.plugins.remove(name) {
            Some(plugin) => plugin,
            None => return Err(PluginError::MissingPluginMetadata),
        };
        if let Some(hooks) = state.plugin_hooks.remove(name) {
            for controller in &hooks.controllers {
                state.registry.unregister_controller(controller.version());
            }
            for validator in &hooks.standalone_validators {
                state.registry.remove_standalone_validator(validator);
            }
            for (version, validator) in &hooks.version_validators {
                state.registry.remove_version_validator(*version, validator);
            }
        }
        plugin.close()
    }

    /// Runs a read-only closure over a plugin's bucket; the query surface
    /// of plugins like the auth-coin extension is built on this.
    pub fn plugin_view<T, F>(&self, name: &str, f: F) -> Result<T, PluginError>
    where
        F: FnOnce(&ReadTx<'_>, &BucketRef) -> Result<T, PluginError>,
    {
        let _guard = self.tg.add().map_err(|_| PluginError::Cancelled)?;
        let state = self.state.read();
        let bucket = ledger::plugin_bucket(name);
        state.store.view(|tx| f(tx, &bucket))
    }

    /// Drains in-flight callers, closes every plugin, and flushes the
    /// store.
    pub fn close(&self) -> Result<(), AcceptError> {
        self.tg.stop();
        let mut state = self.state.write();
        for (_, plugin) in std::mem::take(&mut state.plugins) {
            if let Err(err) = plugin.close() {
                warn!(%err, "plugin close failed");
            }
        }
        state.store.flush()?;
        info!("consensus set closed");
        Ok(())
    }

    // --- read-only interface ---

    fn query<T>(
        &self,
        f: impl FnOnce(&ReadTx<'_>, &State) -> Result<T, StoreError>,
    ) -> Result<T, AcceptError> {
        let _guard = self.tg.add().map_err(|_| AcceptError::Shutdown)?;
        let state = self.state.read();
        let result = state.store.view::<_, StoreError, _>(|tx| f(tx, &state))?;
        Ok(result)
    }

    /// The current tip height.
    pub fn height(&self) -> Result<Height, AcceptError> {
        self.query(|tx, _| {
            ledger::block_height(tx)?.ok_or(StoreError::Corrupt("store has no tip height"))
        })
    }

    /// The block at the current tip.
    pub fn current_block(&self) -> Result<Block, AcceptError> {
        self.query(|tx, _| {
            let height = ledger::block_height(tx)?
                .ok_or(StoreError::Corrupt("store has no tip height"))?;
            let id = ledger::block_path_id(tx, height)?
                .ok_or(StoreError::Corrupt("tip height has no path entry"))?;
            Ok(ledger::processed_block(tx, &id)?
                .ok_or(StoreError::Corrupt("tip block is not in the block map"))?
                .block)
        })
    }

    /// The block at `height` on the current path.
    pub fn block_at_height(&self, height: Height) -> Result<Option<Block>, AcceptError> {
        self.query(|tx, _| {
            let id = match ledger::block_path_id(tx, height)? {
                Some(id) => id,
                None => return Ok(None),
            };
            Ok(ledger::processed_block(tx, &id)?.map(|pb| pb.block))
        })
    }

    /// The height of a known block, whether or not it is on the current
    /// path.
    pub fn block_height_of_block(&self, block: &Block) -> Result<Option<Height>, AcceptError> {
        let id = block.id();
        self.query(move |tx, _| Ok(ledger::processed_block(tx, &id)?.map(|pb| pb.height)))
    }

    /// Whether `id` lies on the current path from genesis to the tip.
    pub fn in_current_path(&self, id: &BlockId) -> Result<bool, AcceptError> {
        let id = *id;
        self.query(move |tx, _| {
            let pb = match ledger::processed_block(tx, &id)? {
                Some(pb) => pb,
                None => return Ok(false),
            };
            Ok(ledger::block_path_id(tx, pb.height)? == Some(id))
        })
    }

    /// The timestamp any child of `parent` must strictly exceed.
    pub fn minimum_valid_child_timestamp(
        &self,
        parent: &BlockId,
    ) -> Result<Option<Timestamp>, AcceptError> {
        let parent = *parent;
        self.query(move |tx, state| {
            check::minimum_valid_child_timestamp(
                tx,
                &state.header_cache,
                &state.constants,
                &parent,
            )
        })
    }

    /// The target any child of the named block must meet.
    pub fn child_target(&self, id: &BlockId) -> Result<Option<Target>, AcceptError> {
        let id = *id;
        self.query(move |tx, _| Ok(ledger::processed_block(tx, &id)?.map(|pb| pb.child_target)))
    }

    /// The unspent coin output with the given id, if any.
    pub fn coin_output(&self, id: &CoinOutputId) -> Result<Option<CoinOutput>, AcceptError> {
        let id = *id;
        self.query(move |tx, _| ledger::coin_output(tx, &id))
    }

    /// The unspent blockstake output with the given id, if any.
    pub fn blockstake_output(
        &self,
        id: &BlockStakeOutputId,
    ) -> Result<Option<BlockStakeOutput>, AcceptError> {
        let id = *id;
        self.query(move |tx, _| ledger::blockstake_output(tx, &id))
    }

    /// A transaction in the current chain, by id.
    pub fn transaction_at_id(
        &self,
        id: &TransactionId,
    ) -> Result<Option<(Transaction, TransactionShortId)>, AcceptError> {
        let id = *id;
        self.query(move |tx, _| {
            let short = match ledger::transaction_short_id(tx, &id)? {
                Some(short) => short,
                None => return Ok(None),
            };
            Ok(transaction_at_short(tx, short)?.map(|transaction| (transaction, short)))
        })
    }

    /// A transaction in the current chain, by compact reference.
    pub fn transaction_at_short_id(
        &self,
        short: TransactionShortId,
    ) -> Result<Option<Transaction>, AcceptError> {
        self.query(move |tx, _| transaction_at_short(tx, short))
    }

    /// The id of the most recent consensus change.
    pub fn latest_change_id(&self) -> Result<ConsensusChangeId, AcceptError> {
        self.query(|tx, _| changelog::latest_change_id(tx))
    }
}

fn transaction_at_short<V: BucketView + ?Sized>(
    view: &V,
    short: TransactionShortId,
) -> Result<Option<Transaction>, StoreError> {
    let id = match ledger::block_path_id(view, short.block_height())? {
        Some(id) => id,
        None => return Ok(None),
    };
    let pb = match ledger::processed_block(view, &id)? {
        Some(pb) => pb,
        None => return Ok(None),
    };
    Ok(pb
        .block
        .transactions
        .get(short.transaction_index() as usize)
        .cloned())
}
