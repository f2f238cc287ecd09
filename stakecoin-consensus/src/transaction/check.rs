//! Transaction checks.
//!
//! Each function enforces one rule and returns the matching error kind;
//! the registry composes them in protocol order.

use stakecoin_chain::conditions::FulfillContext;
use stakecoin_chain::parameters::ChainConstants;
use stakecoin_chain::transaction::Transaction;
use stakecoin_chain::Currency;

use super::TransactionController;
use crate::error::TransactionError;
use crate::types::{ConsensusTransaction, TransactionContext};

/// The transaction's canonical size must leave room inside a block.
pub fn transaction_fits_in_block(
    tx: &Transaction,
    block_size_limit: u64,
) -> Result<(), TransactionError> {
    if tx.binary_size() as u64 > block_size_limit {
        return Err(TransactionError::DoesNotFit);
    }
    Ok(())
}

pub fn arbitrary_data_fits(tx: &Transaction, limit: usize) -> Result<(), TransactionError> {
    if tx.arbitrary_data.len() > limit {
        return Err(TransactionError::ArbitraryDataTooLarge);
    }
    Ok(())
}

/// Every coin input names a real parent and carries a standard fulfillment.
pub fn valid_coin_inputs(tx: &Transaction) -> Result<(), TransactionError> {
    for input in &tx.coin_inputs {
        if input.parent_id.is_zero() {
            return Err(TransactionError::ZeroParentId);
        }
        if !input.fulfillment.is_standard() {
            return Err(TransactionError::NonStandardFulfillment);
        }
    }
    Ok(())
}

pub fn valid_blockstake_inputs(tx: &Transaction) -> Result<(), TransactionError> {
    for input in &tx.blockstake_inputs {
        if input.parent_id.is_zero() {
            return Err(TransactionError::ZeroParentId);
        }
        if !input.fulfillment.is_standard() {
            return Err(TransactionError::NonStandardFulfillment);
        }
    }
    Ok(())
}

/// Every coin output carries value and a standard condition.
pub fn valid_coin_outputs(tx: &Transaction) -> Result<(), TransactionError> {
    for output in &tx.coin_outputs {
        if output.value.is_zero() {
            return Err(TransactionError::ZeroOutput);
        }
        if !output.condition.is_standard() {
            return Err(TransactionError::NonStandardCondition);
        }
    }
    Ok(())
}

pub fn valid_blockstake_outputs(tx: &Transaction) -> Result<(), TransactionError> {
    for output in &tx.blockstake_outputs {
        if output.value.is_zero() {
            return Err(TransactionError::ZeroOutput);
        }
        if !output.condition.is_standard() {
            return Err(TransactionError::NonStandardCondition);
        }
    }
    Ok(())
}

/// Every miner fee meets the chain minimum. The block-creating transaction
/// is exempt: it pays no fees at all.
pub fn valid_miner_fees(
    tx: &Transaction,
    ctx: &TransactionContext,
    constants: &ChainConstants,
) -> Result<(), TransactionError> {
    if ctx.block_creating {
        return Ok(());
    }
    for fee in &tx.miner_fees {
        if fee < &constants.minimum_miner_fee {
            return Err(TransactionError::TooSmallMinerFee);
        }
    }
    Ok(())
}

/// No parent output may be named twice within the transaction.
pub fn no_double_spends(tx: &Transaction) -> Result<(), TransactionError> {
    let mut coin_parents = std::collections::HashSet::new();
    for input in &tx.coin_inputs {
        if !coin_parents.insert(input.parent_id) {
            return Err(TransactionError::DoubleSpend);
        }
    }
    let mut blockstake_parents = std::collections::HashSet::new();
    for input in &tx.blockstake_inputs {
        if !blockstake_parents.insert(input.parent_id) {
            return Err(TransactionError::DoubleSpend);
        }
    }
    Ok(())
}

/// Every input's parent output was found unspent when the transaction was
/// prepared.
pub fn inputs_are_resolved(ct: &ConsensusTransaction) -> Result<(), TransactionError> {
    for input in &ct.transaction.coin_inputs {
        if !ct.spent_coin_outputs.contains_key(&input.parent_id) {
            return Err(TransactionError::MissingCoinOutput);
        }
    }
    for input in &ct.transaction.blockstake_inputs {
        if !ct.spent_blockstake_outputs.contains_key(&input.parent_id) {
            return Err(TransactionError::MissingBlockStakeOutput);
        }
    }
    Ok(())
}

/// Each coin input's parent condition fulfills its fulfillment, under the
/// controller's signature hash for that input.
pub fn valid_coin_fulfillments(
    ct: &ConsensusTransaction,
    ctx: &TransactionContext,
    controller: &dyn TransactionController,
) -> Result<(), TransactionError> {
    for (index, input) in ct.transaction.coin_inputs.iter().enumerate() {
        let parent = ct
            .spent_coin_outputs
            .get(&input.parent_id)
            .ok_or(TransactionError::MissingCoinOutput)?;
        let fulfill_ctx = FulfillContext {
            block_height: ctx.block_height,
            block_time: ctx.block_timestamp,
            message: controller.signature_hash(&ct.transaction, index as u64)?,
        };
        parent
            .condition
            .fulfill(&input.fulfillment, &fulfill_ctx)?;
    }
    Ok(())
}

pub fn valid_blockstake_fulfillments(
    ct: &ConsensusTransaction,
    ctx: &TransactionContext,
    controller: &dyn TransactionController,
) -> Result<(), TransactionError> {
    // Blockstake inputs sign under the same hash sequence, offset past the
    // coin inputs so no two inputs ever share a message.
    let offset = ct.transaction.coin_inputs.len() as u64;
    for (index, input) in ct.transaction.blockstake_inputs.iter().enumerate() {
        let parent = ct
            .spent_blockstake_outputs
            .get(&input.parent_id)
            .ok_or(TransactionError::MissingBlockStakeOutput)?;
        let fulfill_ctx = FulfillContext {
            block_height: ctx.block_height,
            block_time: ctx.block_timestamp,
            message: controller.signature_hash(&ct.transaction, offset + index as u64)?,
        };
        parent
            .condition
            .fulfill(&input.fulfillment, &fulfill_ctx)?;
    }
    Ok(())
}

/// The standard balance rule: coin inputs equal coin outputs plus miner
/// fees. Versions with different policies replace this in their controller.
pub fn coin_outputs_are_balanced(ct: &ConsensusTransaction) -> Result<(), TransactionError> {
    let input_sum = Currency::sum(
        ct.transaction
            .coin_inputs
            .iter()
            .filter_map(|input| ct.spent_coin_outputs.get(&input.parent_id))
            .map(|output| &output.value),
    )
    .ok_or(TransactionError::Overflow)?;
    let output_sum = Currency::sum(
        ct.transaction
            .coin_outputs
            .iter()
            .map(|output| &output.value)
            .chain(ct.transaction.miner_fees.iter()),
    )
    .ok_or(TransactionError::Overflow)?;
    if input_sum != output_sum {
        return Err(TransactionError::UnbalancedOutputs);
    }
    Ok(())
}

/// Blockstake is conserved exactly: inputs equal outputs, with no fee leg.
pub fn blockstake_outputs_are_balanced(
    ct: &ConsensusTransaction,
) -> Result<(), TransactionError> {
    let input_sum = Currency::sum(
        ct.transaction
            .blockstake_inputs
            .iter()
            .filter_map(|input| ct.spent_blockstake_outputs.get(&input.parent_id))
            .map(|output| &output.value),
    )
    .ok_or(TransactionError::Overflow)?;
    let output_sum = Currency::sum(
        ct.transaction
            .blockstake_outputs
            .iter()
            .map(|output| &output.value),
    )
    .ok_or(TransactionError::Overflow)?;
    if input_sum != output_sum {
        return Err(TransactionError::UnbalancedOutputs);
    }
    Ok(())
}
