//! The auth-coin plugin: bucket layout, apply/revert hooks, the standard
//! transfer override, and the public query surface.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use stakecoin_chain::block::Height;
use stakecoin_chain::conditions::{Condition, UnlockHash};
use stakecoin_chain::parameters::ChainConstants;
use stakecoin_chain::transaction::TransactionVersion;
use stakecoin_chain::{CanonicalDeserialize, CanonicalSerialize};
use stakecoin_consensus::plugins::{ConsensusSetPlugin, PluginMetadata};
use stakecoin_consensus::transaction::{TransactionController, TransactionValidator};
use stakecoin_consensus::types::{ConsensusBlock, ConsensusTransaction, TransactionContext};
use stakecoin_consensus::{ConsensusSet, PluginError, TransactionError};
use stakecoin_state::store::put_object;
use stakecoin_state::{ledger, BucketRef, BucketView, StoreError, WriteTx};

use crate::controllers::{AuthAddressUpdateController, AuthConditionUpdateController};
use crate::transactions::{AuthAddressUpdate, AuthConditionUpdate};
use crate::{
    PLUGIN_NAME, TRANSACTION_VERSION_AUTH_ADDRESS_UPDATE,
    TRANSACTION_VERSION_AUTH_CONDITION_UPDATE,
};

const CONDITIONS_BUCKET: &[u8] = b"authconditions";
const ADDRESSES_BUCKET: &[u8] = b"authaddresses";

pub(crate) fn plugin_root() -> BucketRef {
    ledger::plugin_bucket(PLUGIN_NAME)
}

fn conditions_bucket(root: &BucketRef) -> BucketRef {
    root.child(CONDITIONS_BUCKET)
}

fn address_bucket(root: &BucketRef, address: &UnlockHash) -> BucketRef {
    let bytes = address
        .canonical_serialize_to_vec()
        .expect("serializing to a vec is infallible");
    root.child(ADDRESSES_BUCKET).child(&bytes)
}

/// The most recent entry of a height-keyed history bucket at or before
/// `height`.
fn entry_at_or_before<V: BucketView + ?Sized>(
    view: &V,
    bucket: &BucketRef,
    height: Height,
) -> Result<Option<Vec<u8>>, StoreError> {
    let key = height.big_endian_bytes();
    let mut cursor = view.cursor(bucket)?;
    let seeked = cursor.seek(&key).map(|(k, v)| (k.to_vec(), v.to_vec()));
    match seeked {
        Some((found, value)) if found == key => Ok(Some(value)),
        _ => Ok(cursor.prev().map(|(_, value)| value.to_vec())),
    }
}

pub(crate) fn auth_condition_at<V: BucketView + ?Sized>(
    view: &V,
    root: &BucketRef,
    height: Height,
) -> Result<Condition, StoreError> {
    match entry_at_or_before(view, &conditions_bucket(root), height)? {
        Some(bytes) => Ok(Condition::canonical_deserialize(bytes.as_slice())?),
        None => Err(StoreError::Corrupt(
            "no auth condition recorded at or before the height",
        )),
    }
}

pub(crate) fn active_auth_condition<V: BucketView + ?Sized>(
    view: &V,
    root: &BucketRef,
) -> Result<Condition, StoreError> {
    let mut cursor = view.cursor(&conditions_bucket(root))?;
    match cursor.last() {
        Some((_, bytes)) => Ok(Condition::canonical_deserialize(bytes)?),
        None => Err(StoreError::Corrupt("no auth condition recorded")),
    }
}

/// The authorization state of one address at or before `height`; an address
/// never mentioned is unauthorized.
pub(crate) fn address_auth_state_at<V: BucketView + ?Sized>(
    view: &V,
    root: &BucketRef,
    height: Height,
    address: &UnlockHash,
) -> Result<bool, StoreError> {
    match entry_at_or_before(view, &address_bucket(root, address), height)? {
        Some(bytes) => Ok(bool::canonical_deserialize(bytes.as_slice())?),
        None => Ok(false),
    }
}

/// The standard-transfer override: every distinct address touched by the
/// transfer's coin inputs and outputs must be authorized at the block
/// height. A transfer with a single participating address and exactly one
/// (refund) coin output is exempt, so a freshly deauthorized address can
/// consolidate its own funds.
pub(crate) fn transfer_is_authorized(
    ct: &ConsensusTransaction,
    ctx: &TransactionContext,
    _constants: &ChainConstants,
    view: &dyn BucketView,
) -> Result<(), TransactionError> {
    let root = plugin_root();
    let mut addresses: HashSet<UnlockHash> = HashSet::new();
    for output in ct.spent_coin_outputs.values() {
        addresses.insert(output.condition.unlock_hash());
    }
    for output in &ct.transaction.coin_outputs {
        addresses.insert(output.condition.unlock_hash());
    }
    if addresses.is_empty() {
        return Ok(());
    }
    let mut all_authorized = true;
    for address in &addresses {
        if !address_auth_state_at(view, &root, ctx.block_height, address)? {
            all_authorized = false;
            break;
        }
    }
    if all_authorized {
        return Ok(());
    }
    if addresses.len() == 1 && ct.transaction.coin_outputs.len() == 1 {
        return Ok(());
    }
    Err(TransactionError::UnauthorizedAddress)
}

/// The auth-coin consensus-set plugin.
pub struct AuthCoinPlugin {
    genesis_auth_condition: Condition,
}

impl AuthCoinPlugin {
    /// `genesis_auth_condition` seeds the condition history at height 0 the
    /// first time the plugin is registered.
    pub fn new(genesis_auth_condition: Condition) -> AuthCoinPlugin {
        AuthCoinPlugin {
            genesis_auth_condition,
        }
    }
}

impl ConsensusSetPlugin for AuthCoinPlugin {
    fn init_plugin(
        &self,
        metadata: Option<&PluginMetadata>,
        bucket: &BucketRef,
        tx: &mut WriteTx<'_>,
    ) -> Result<String, PluginError> {
        if metadata.is_none() {
            put_object(
                tx,
                &conditions_bucket(bucket),
                &Height(0).big_endian_bytes(),
                &self.genesis_auth_condition,
            )?;
            debug!("seeded the genesis auth condition");
        }
        Ok("1.0.0".to_string())
    }

    fn apply_block(
        &self,
        _block: &ConsensusBlock,
        _bucket: &BucketRef,
        _tx: &mut WriteTx<'_>,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    fn revert_block(
        &self,
        _block: &ConsensusBlock,
        _bucket: &BucketRef,
        _tx: &mut WriteTx<'_>,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    fn apply_transaction(
        &self,
        transaction: &ConsensusTransaction,
        bucket: &BucketRef,
        tx: &mut WriteTx<'_>,
    ) -> Result<(), PluginError> {
        let height = transaction.block_height;
        if transaction.transaction.version == TRANSACTION_VERSION_AUTH_ADDRESS_UPDATE {
            let update = AuthAddressUpdate::from_transaction(&transaction.transaction)
                .map_err(|err| PluginError::Failure(err.to_string()))?;
            for address in &update.auth_addresses {
                put_object(
                    tx,
                    &address_bucket(bucket, address),
                    &height.big_endian_bytes(),
                    &true,
                )?;
            }
            for address in &update.deauth_addresses {
                put_object(
                    tx,
                    &address_bucket(bucket, address),
                    &height.big_endian_bytes(),
                    &false,
                )?;
            }
        } else if transaction.transaction.version == TRANSACTION_VERSION_AUTH_CONDITION_UPDATE {
            let update = AuthConditionUpdate::from_transaction(&transaction.transaction)
                .map_err(|err| PluginError::Failure(err.to_string()))?;
            put_object(
                tx,
                &conditions_bucket(bucket),
                &height.big_endian_bytes(),
                &update.auth_condition,
            )?;
        }
        Ok(())
    }

    fn revert_transaction(
        &self,
        transaction: &ConsensusTransaction,
        bucket: &BucketRef,
        tx: &mut WriteTx<'_>,
    ) -> Result<(), PluginError> {
        let height = transaction.block_height;
        if transaction.transaction.version == TRANSACTION_VERSION_AUTH_ADDRESS_UPDATE {
            let update = AuthAddressUpdate::from_transaction(&transaction.transaction)
                .map_err(|err| PluginError::Failure(err.to_string()))?;
            for address in update
                .auth_addresses
                .iter()
                .chain(update.deauth_addresses.iter())
            {
                tx.delete(&address_bucket(bucket, address), &height.big_endian_bytes());
            }
        } else if transaction.transaction.version == TRANSACTION_VERSION_AUTH_CONDITION_UPDATE {
            tx.delete(&conditions_bucket(bucket), &height.big_endian_bytes());
        }
        Ok(())
    }

    fn transaction_controllers(&self) -> Vec<Arc<dyn TransactionController>> {
        vec![
            Arc::new(AuthAddressUpdateController),
            Arc::new(AuthConditionUpdateController),
        ]
    }

    fn version_transaction_validators(
        &self,
    ) -> Vec<(TransactionVersion, Arc<dyn TransactionValidator>)> {
        vec![(TransactionVersion::STANDARD, Arc::new(transfer_is_authorized))]
    }
}

// --- queries over a running consensus set ---

/// The auth condition in force at the current tip.
pub fn get_active_auth_condition(set: &ConsensusSet) -> Result<Condition, PluginError> {
    set.plugin_view(PLUGIN_NAME, |tx, bucket| {
        Ok(active_auth_condition(tx, bucket)?)
    })
}

/// The auth condition in force at `height`: the nearest recorded condition
/// at or before it.
pub fn get_auth_condition_at(
    set: &ConsensusSet,
    height: Height,
) -> Result<Condition, PluginError> {
    set.plugin_view(PLUGIN_NAME, move |tx, bucket| {
        Ok(auth_condition_at(tx, bucket, height)?)
    })
}

/// The authorization state of each address at `height`. Between updates the
/// state is piecewise-constant; an address never mentioned is `false`.
pub fn get_addresses_auth_state_at(
    set: &ConsensusSet,
    height: Height,
    addresses: &[UnlockHash],
) -> Result<Vec<bool>, PluginError> {
    set.plugin_view(PLUGIN_NAME, move |tx, bucket| {
        addresses
            .iter()
            .map(|address| Ok(address_auth_state_at(tx, bucket, height, address)?))
            .collect()
    })
}

/// The authorization state of each address at the current tip.
pub fn get_addresses_auth_state_now(
    set: &ConsensusSet,
    addresses: &[UnlockHash],
) -> Result<Vec<bool>, PluginError> {
    let height = set
        .height()
        .map_err(|err| PluginError::Failure(err.to_string()))?;
    get_addresses_auth_state_at(set, height, addresses)
}
