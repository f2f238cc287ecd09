//! The plugin surface.
//!
//! A plugin observes every applied and reverted block, owns one bucket
//! under the reserved plugins root, and may contribute transaction
//! controllers and validator functions. The consensus set keeps a plugin's
//! bucket strictly consistent with the ledger: plugin callbacks run inside
//! the same store transaction that commits the block they describe.

use canonical_serde_derive::{CanonDeserialize, CanonSerialize};

use std::sync::Arc;

use stakecoin_chain::transaction::TransactionVersion;
use stakecoin_chain::{CanonicalDeserialize, CanonicalSerialize, SerializationError};
use stakecoin_state::store::{get_object, put_object};
use stakecoin_state::{ledger, BucketRef, BucketView, WriteTx};

use crate::error::PluginError;
use crate::transaction::{TransactionController, TransactionValidator};
use crate::types::{ConsensusBlock, ConsensusTransaction, ConsensusChangeId};

/// The per-plugin record the host persists under the reserved metadata
/// bucket.
#[derive(Clone, Debug, Eq, PartialEq, CanonSerialize, CanonDeserialize)]
pub struct PluginMetadata {
    /// The plugin's own version string, returned by `init_plugin`.
    pub version: String,
    /// The last consensus change this plugin has fully processed.
    pub last_change_id: ConsensusChangeId,
}

/// A consensus-set plugin.
///
/// Block and transaction callbacks receive the plugin's own bucket and the
/// surrounding store transaction; writing anywhere else is a contract
/// violation. Transaction-level callbacks are invoked inline during block
/// application, in declaration order.
pub trait ConsensusSetPlugin: Send + Sync {
    /// Called once during registration, before catch-up. `metadata` is the
    /// stored record from a previous run, absent for a brand-new plugin.
    /// Returns the plugin's version string.
    fn init_plugin(
        &self,
        metadata: Option<&PluginMetadata>,
        bucket: &BucketRef,
        tx: &mut WriteTx<'_>,
    ) -> Result<String, PluginError>;

    fn apply_block(
        &self,
        block: &ConsensusBlock,
        bucket: &BucketRef,
        tx: &mut WriteTx<'_>,
    ) -> Result<(), PluginError>;

    fn revert_block(
        &self,
        block: &ConsensusBlock,
        bucket: &BucketRef,
        tx: &mut WriteTx<'_>,
    ) -> Result<(), PluginError>;

    fn apply_transaction(
        &self,
        transaction: &ConsensusTransaction,
        bucket: &BucketRef,
        tx: &mut WriteTx<'_>,
    ) -> Result<(), PluginError>;

    fn revert_transaction(
        &self,
        transaction: &ConsensusTransaction,
        bucket: &BucketRef,
        tx: &mut WriteTx<'_>,
    ) -> Result<(), PluginError>;

    /// Controllers for the transaction versions this plugin introduces.
    fn transaction_controllers(&self) -> Vec<Arc<dyn TransactionController>> {
        Vec::new()
    }

    /// Validators run for every transaction, after the core rules.
    fn transaction_validators(&self) -> Vec<Arc<dyn TransactionValidator>> {
        Vec::new()
    }

    /// Validators run only for the named transaction versions.
    fn version_transaction_validators(
        &self,
    ) -> Vec<(TransactionVersion, Arc<dyn TransactionValidator>)> {
        Vec::new()
    }

    /// Called when the plugin is unregistered; the plugin receives no
    /// further callbacks afterwards.
    fn close(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// The reserved bucket name plugins can never claim.
const RESERVED_METADATA_NAME: &str = "Metadata";

pub(crate) fn validate_plugin_name(name: &str) -> Result<(), PluginError> {
    if name.is_empty() {
        return Err(PluginError::PluginNameEmpty);
    }
    if name == RESERVED_METADATA_NAME {
        return Err(PluginError::PluginNameReserved);
    }
    Ok(())
}

pub(crate) fn load_plugin_metadata<V: BucketView + ?Sized>(
    view: &V,
    name: &str,
) -> Result<Option<PluginMetadata>, PluginError> {
    Ok(get_object(
        view,
        &ledger::PLUGINS_METADATA,
        name.as_bytes(),
    )?)
}

pub(crate) fn store_plugin_metadata(
    tx: &mut WriteTx<'_>,
    name: &str,
    metadata: &PluginMetadata,
) -> Result<(), PluginError> {
    Ok(put_object(
        tx,
        &ledger::PLUGINS_METADATA,
        name.as_bytes(),
        metadata,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_and_empty_names_are_rejected() {
        assert!(matches!(
            validate_plugin_name(""),
            Err(PluginError::PluginNameEmpty)
        ));
        assert!(matches!(
            validate_plugin_name("Metadata"),
            Err(PluginError::PluginNameReserved)
        ));
        assert!(validate_plugin_name("authcoin").is_ok());
    }
}
