//! Version-dispatched transaction validation.
//!
//! Every transaction version has a [`TransactionController`] providing its
//! extension semantics, signature hash, and version-specific policy (the
//! balance rule lives here, so coin-creating versions can replace it). The
//! per-node [`TransactionRegistry`] maps versions to controllers and carries
//! the plugin-contributed validator functions; it is built at startup and
//! threaded through the consensus set, never global.

pub mod check;

use std::collections::HashMap;
use std::sync::Arc;

use stakecoin_chain::parameters::ChainConstants;
use stakecoin_chain::transaction::{Transaction, TransactionVersion};
use stakecoin_chain::{Currency, SigHash};
use stakecoin_state::BucketView;

use crate::error::{PluginError, TransactionError};
use crate::types::{ConsensusTransaction, TransactionContext};

/// A single composable validation rule.
pub trait TransactionValidator: Send + Sync {
    fn validate(
        &self,
        ct: &ConsensusTransaction,
        ctx: &TransactionContext,
        constants: &ChainConstants,
        view: &dyn BucketView,
    ) -> Result<(), TransactionError>;
}

impl<F> TransactionValidator for F
where
    F: Fn(
            &ConsensusTransaction,
            &TransactionContext,
            &ChainConstants,
            &dyn BucketView,
        ) -> Result<(), TransactionError>
        + Send
        + Sync,
{
    fn validate(
        &self,
        ct: &ConsensusTransaction,
        ctx: &TransactionContext,
        constants: &ChainConstants,
        view: &dyn BucketView,
    ) -> Result<(), TransactionError> {
        self(ct, ctx, constants, view)
    }
}

/// The capability set of one transaction version.
pub trait TransactionController: Send + Sync {
    fn version(&self) -> TransactionVersion;

    /// Decode the opaque extension and check its structural invariants.
    /// The default rejects any extension, which is correct for versions
    /// that do not define one.
    fn check_extension(&self, tx: &Transaction) -> Result<(), TransactionError> {
        if tx.extension.is_some() {
            return Err(TransactionError::InvalidExtension(
                "this transaction version carries no extension",
            ));
        }
        Ok(())
    }

    /// The message the fulfillment of `input_index` must sign.
    fn signature_hash(
        &self,
        tx: &Transaction,
        input_index: u64,
    ) -> Result<SigHash, TransactionError> {
        Ok(tx.signature_hash(input_index))
    }

    /// Version-specific policy, including the balance rule.
    fn validate(
        &self,
        ct: &ConsensusTransaction,
        ctx: &TransactionContext,
        constants: &ChainConstants,
        view: &dyn BucketView,
    ) -> Result<(), TransactionError>;

    /// The sum of miner payouts this transaction requires the containing
    /// block to declare, beyond the chain's fixed rules. Zero for almost
    /// every version.
    fn custom_miner_payout_sum(&self, _tx: &Transaction) -> Currency {
        Currency::zero()
    }

    /// The JSON mirror of the opaque extension, for API consumers.
    fn extension_json(&self, _tx: &Transaction) -> Result<serde_json::Value, TransactionError> {
        Ok(serde_json::Value::Null)
    }

    /// Rebuild the opaque extension from its JSON mirror.
    fn extension_from_json(
        &self,
        value: &serde_json::Value,
    ) -> Result<Option<Vec<u8>>, TransactionError> {
        if value.is_null() {
            Ok(None)
        } else {
            Err(TransactionError::InvalidExtension(
                "this transaction version carries no extension",
            ))
        }
    }
}

/// The standard coin and blockstake transfer, version 1.
pub struct StandardTransferController;

impl TransactionController for StandardTransferController {
    fn version(&self) -> TransactionVersion {
        TransactionVersion::STANDARD
    }

    fn validate(
        &self,
        ct: &ConsensusTransaction,
        _ctx: &TransactionContext,
        _constants: &ChainConstants,
        _view: &dyn BucketView,
    ) -> Result<(), TransactionError> {
        check::coin_outputs_are_balanced(ct)?;
        check::blockstake_outputs_are_balanced(ct)
    }
}

/// The per-node registry of controllers and validator functions.
pub struct TransactionRegistry {
    controllers: HashMap<u8, Arc<dyn TransactionController>>,
    /// Plugin-contributed rules, run for every transaction after the core
    /// rules and the controller.
    standalone_validators: Vec<Arc<dyn TransactionValidator>>,
    /// Plugin-contributed rules, run for matching versions only.
    version_validators: HashMap<u8, Vec<Arc<dyn TransactionValidator>>>,
}

impl TransactionRegistry {
    /// A registry with the standard transfer registered. Version 0 is
    /// disabled by default: no controller is registered for it, so any
    /// version-0 transaction fails with `UnknownVersion`.
    pub fn standard() -> TransactionRegistry {
        let mut registry = TransactionRegistry {
            controllers: HashMap::new(),
            standalone_validators: Vec::new(),
            version_validators: HashMap::new(),
        };
        registry
            .register_controller(Arc::new(StandardTransferController))
            .expect("the fresh registry has no standard controller yet");
        registry
    }

    pub fn register_controller(
        &mut self,
        controller: Arc<dyn TransactionController>,
    ) -> Result<(), PluginError> {
        let version = controller.version().0;
        if self.controllers.contains_key(&version) {
            return Err(PluginError::ControllerExists(version));
        }
        self.controllers.insert(version, controller);
        Ok(())
    }

    pub fn add_standalone_validator(&mut self, validator: Arc<dyn TransactionValidator>) {
        self.standalone_validators.push(validator);
    }

    pub fn add_version_validator(
        &mut self,
        version: TransactionVersion,
        validator: Arc<dyn TransactionValidator>,
    ) {
        self.version_validators
            .entry(version.0)
            .or_insert_with(Vec::new)
            .push(validator);
    }

    pub fn controller(&self, version: TransactionVersion) -> Option<Arc<dyn TransactionController>> {
        self.controllers.get(&version.0).cloned()
    }

    /// Withdraws the controller for a version; transactions of that version
    /// fail validation afterwards.
    pub fn unregister_controller(&mut self, version: TransactionVersion) {
        self.controllers.remove(&version.0);
    }

    /// Withdraws a previously added validator, by identity.
    pub fn remove_standalone_validator(&mut self, validator: &Arc<dyn TransactionValidator>) {
        self.standalone_validators
            .retain(|candidate| !Arc::ptr_eq(candidate, validator));
    }

    /// Withdraws a previously added version-mapped validator, by identity.
    pub fn remove_version_validator(
        &mut self,
        version: TransactionVersion,
        validator: &Arc<dyn TransactionValidator>,
    ) {
        if let Some(validators) = self.version_validators.get_mut(&version.0) {
            validators.retain(|candidate| !Arc::ptr_eq(candidate, validator));
        }
    }

    /// Runs the full rule set over one prepared transaction, in order,
    /// returning the first error:
    ///
    /// 1. the core structural rules (size, data limit, inputs, outputs,
    ///    fees, double spends, input resolution);
    /// 2. the controller's extension check and version policy (the balance
    ///    rule lives there);
    /// 3. the fulfillment checks, under the controller's signature hash;
    /// 4. the plugin-contributed version-mapped and global validators.
    pub fn validate_transaction(
        &self,
        ct: &ConsensusTransaction,
        ctx: &TransactionContext,
        constants: &ChainConstants,
        view: &dyn BucketView,
    ) -> Result<(), TransactionError> {
        check::transaction_fits_in_block(&ct.transaction, constants.block_size_limit)?;
        check::arbitrary_data_fits(&ct.transaction, constants.arbitrary_data_size_limit)?;
        check::valid_coin_inputs(&ct.transaction)?;
        check::valid_blockstake_inputs(&ct.transaction)?;
        check::valid_coin_outputs(&ct.transaction)?;
        check::valid_blockstake_outputs(&ct.transaction)?;
        check::valid_miner_fees(&ct.transaction, ctx, constants)?;
        check::no_double_spends(&ct.transaction)?;
        check::inputs_are_resolved(ct)?;

        let controller = self
            .controller(ct.transaction.version)
            .ok_or(TransactionError::UnknownVersion(ct.transaction.version.0))?;

        // The extension decodes first (the signature hash depends on it),
        // and the version policy runs before the fulfillment checks: an
        // unbalanced transfer reports the imbalance, not a bad signature.
        controller.check_extension(&ct.transaction)?;
        controller.validate(ct, ctx, constants, view)?;

        check::valid_coin_fulfillments(ct, ctx, controller.as_ref())?;
        check::valid_blockstake_fulfillments(ct, ctx, controller.as_ref())?;

        if let Some(validators) = self.version_validators.get(&ct.transaction.version.0) {
            for validator in validators {
                validator.validate(ct, ctx, constants, view)?;
            }
        }
        for validator in &self.standalone_validators {
            validator.validate(ct, ctx, constants, view)?;
        }
        Ok(())
    }

    /// The sum of custom miner payouts declared by the transactions of a
    /// block, per their controllers.
    pub fn custom_miner_payout_sum(
        &self,
        transactions: &[Transaction],
    ) -> Result<Currency, TransactionError> {
        let mut total = Currency::zero();
        for tx in transactions {
            if let Some(controller) = self.controller(tx.version) {
                total = total
                    .checked_add(&controller.custom_miner_payout_sum(tx))
                    .ok_or(TransactionError::Overflow)?;
            }
        }
        Ok(total)
    }
}
