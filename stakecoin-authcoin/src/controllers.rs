//! Controllers for the auth-coin transaction versions.
//!
//! Both versions move no value: they only mutate the authorization state,
//! under the approval of the auth condition in force at their block height.

use std::collections::HashSet;

use stakecoin_chain::conditions::{Condition, FulfillContext};
use stakecoin_chain::parameters::ChainConstants;
use stakecoin_chain::transaction::{Transaction, TransactionVersion};
use stakecoin_chain::SigHash;
use stakecoin_consensus::transaction::TransactionController;
use stakecoin_consensus::types::{ConsensusTransaction, TransactionContext};
use stakecoin_consensus::TransactionError;
use stakecoin_state::BucketView;

use crate::plugin::{auth_condition_at, plugin_root};
use crate::transactions::{
    address_update_signature_hash, condition_update_signature_hash, AuthAddressUpdate,
    AuthConditionUpdate,
};
use crate::{
    TRANSACTION_VERSION_AUTH_ADDRESS_UPDATE, TRANSACTION_VERSION_AUTH_CONDITION_UPDATE,
};

fn no_value_movement(tx: &Transaction) -> Result<(), TransactionError> {
    if !tx.coin_inputs.is_empty()
        || !tx.coin_outputs.is_empty()
        || !tx.blockstake_inputs.is_empty()
        || !tx.blockstake_outputs.is_empty()
        || !tx.miner_fees.is_empty()
    {
        return Err(TransactionError::InvalidExtension(
            "auth transactions move no value and pay no fees",
        ));
    }
    Ok(())
}

/// Controller for the address-(de)authorization version.
pub struct AuthAddressUpdateController;

impl TransactionController for AuthAddressUpdateController {
    fn version(&self) -> TransactionVersion {
        TRANSACTION_VERSION_AUTH_ADDRESS_UPDATE
    }

    fn check_extension(&self, tx: &Transaction) -> Result<(), TransactionError> {
        let update = AuthAddressUpdate::from_transaction(tx)
            .map_err(|_| TransactionError::InvalidExtension("malformed address update"))?;
        if update.auth_addresses.is_empty() && update.deauth_addresses.is_empty() {
            return Err(TransactionError::InvalidExtension(
                "an address update names at least one address",
            ));
        }
        let mut seen = HashSet::new();
        for address in update
            .auth_addresses
            .iter()
            .chain(update.deauth_addresses.iter())
        {
            if !seen.insert(*address) {
                return Err(TransactionError::InvalidExtension(
                    "every address must be unique across both lists",
                ));
            }
        }
        Ok(())
    }

    fn signature_hash(
        &self,
        tx: &Transaction,
        _input_index: u64,
    ) -> Result<SigHash, TransactionError> {
        let update = AuthAddressUpdate::from_transaction(tx)
            .map_err(|_| TransactionError::InvalidExtension("malformed address update"))?;
        Ok(address_update_signature_hash(&update, &tx.arbitrary_data))
    }

    fn validate(
        &self,
        ct: &ConsensusTransaction,
        ctx: &TransactionContext,
        _constants: &ChainConstants,
        view: &dyn BucketView,
    ) -> Result<(), TransactionError> {
        no_value_movement(&ct.transaction)?;
        let update = AuthAddressUpdate::from_transaction(&ct.transaction)
            .map_err(|_| TransactionError::InvalidExtension("malformed address update"))?;
        let current = auth_condition_at(view, &plugin_root(), ctx.block_height)?;
        let fulfill_ctx = FulfillContext {
            block_height: ctx.block_height,
            block_time: ctx.block_timestamp,
            message: address_update_signature_hash(&update, &ct.transaction.arbitrary_data),
        };
        current.fulfill(&update.auth_fulfillment, &fulfill_ctx)?;
        Ok(())
    }

    fn extension_json(&self, tx: &Transaction) -> Result<serde_json::Value, TransactionError> {
        let update = AuthAddressUpdate::from_transaction(tx)
            .map_err(|_| TransactionError::InvalidExtension("malformed address update"))?;
        serde_json::to_value(update)
            .map_err(|_| TransactionError::InvalidExtension("address update is not representable"))
    }

    fn extension_from_json(
        &self,
        value: &serde_json::Value,
    ) -> Result<Option<Vec<u8>>, TransactionError> {
        let update: AuthAddressUpdate = serde_json::from_value(value.clone())
            .map_err(|_| TransactionError::InvalidExtension("malformed address update"))?;
        Ok(Some(
            stakecoin_chain::CanonicalSerialize::canonical_serialize_to_vec(&update)
                .expect("serializing to a vec is infallible"),
        ))
    }
}

/// Controller for the condition-replacement version.
pub struct AuthConditionUpdateController;

impl TransactionController for AuthConditionUpdateController {
    fn version(&self) -> TransactionVersion {
        TRANSACTION_VERSION_AUTH_CONDITION_UPDATE
    }

    fn check_extension(&self, tx: &Transaction) -> Result<(), TransactionError> {
        let update = AuthConditionUpdate::from_transaction(tx)
            .map_err(|_| TransactionError::InvalidExtension("malformed condition update"))?;
        match update.auth_condition {
            Condition::UnlockHash(_) | Condition::MultiSignature(_) => {}
            _ => {
                return Err(TransactionError::InvalidExtension(
                    "the new auth condition must be an address or multisig condition",
                ))
            }
        }
        if !update.auth_condition.is_standard() {
            return Err(TransactionError::NonStandardCondition);
        }
        Ok(())
    }

    fn signature_hash(
        &self,
        tx: &Transaction,
        _input_index: u64,
    ) -> Result<SigHash, TransactionError> {
        let update = AuthConditionUpdate::from_transaction(tx)
            .map_err(|_| TransactionError::InvalidExtension("malformed condition update"))?;
        Ok(condition_update_signature_hash(&update, &tx.arbitrary_data))
    }

    fn validate(
        &self,
        ct: &ConsensusTransaction,
        ctx: &TransactionContext,
        _constants: &ChainConstants,
        view: &dyn BucketView,
    ) -> Result<(), TransactionError> {
        no_value_movement(&ct.transaction)?;
        let update = AuthConditionUpdate::from_transaction(&ct.transaction)
            .map_err(|_| TransactionError::InvalidExtension("malformed condition update"))?;
        let current = auth_condition_at(view, &plugin_root(), ctx.block_height)?;
        if update.auth_condition == current {
            return Err(TransactionError::InvalidExtension(
                "the new auth condition equals the active one",
            ));
        }
        let fulfill_ctx = FulfillContext {
            block_height: ctx.block_height,
            block_time: ctx.block_timestamp,
            message: condition_update_signature_hash(&update, &ct.transaction.arbitrary_data),
        };
        current.fulfill(&update.auth_fulfillment, &fulfill_ctx)?;
        Ok(())
    }

    fn extension_json(&self, tx: &Transaction) -> Result<serde_json::Value, TransactionError> {
        let update = AuthConditionUpdate::from_transaction(tx)
            .map_err(|_| TransactionError::InvalidExtension("malformed condition update"))?;
        serde_json::to_value(update).map_err(|_| {
            TransactionError::InvalidExtension("condition update is not representable")
        })
    }

    fn extension_from_json(
        &self,
        value: &serde_json::Value,
    ) -> Result<Option<Vec<u8>>, TransactionError> {
        let update: AuthConditionUpdate = serde_json::from_value(value.clone())
            .map_err(|_| TransactionError::InvalidExtension("malformed condition update"))?;
        Ok(Some(
            stakecoin_chain::CanonicalSerialize::canonical_serialize_to_vec(&update)
                .expect("serializing to a vec is infallible"),
        ))
    }
}
