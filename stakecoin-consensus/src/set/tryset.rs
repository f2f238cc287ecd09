//! `TryTransactionSet`: dry-running a candidate transaction set.
//!
//! The set is validated and applied against the current tip inside a store
//! transaction that is always rolled back, including any state plugins
//! wrote through their transaction hooks. The caller receives a synthetic
//! consensus change describing what the set *would* do.

use stakecoin_chain::transaction::{Transaction, TransactionShortId};
use stakecoin_chain::Timestamp;
use stakecoin_state::diffs::{
    BlockStakeOutputDiff, CoinOutputDiff, DiffDirection, TransactionIdDiff,
};
use stakecoin_state::{ledger, StoreError};

use super::diffs::prepare_consensus_transaction;
use super::State;
use crate::error::AcceptError;
use crate::types::{ConsensusChange, TransactionContext, CONSENSUS_CHANGE_BEGINNING};

/// Internal error used to force the rollback of the dry-run transaction.
enum DryRun {
    Complete,
    Failed(AcceptError),
}

impl From<StoreError> for DryRun {
    fn from(err: StoreError) -> DryRun {
        DryRun::Failed(err.into())
    }
}

pub(crate) fn try_transaction_set(
    state: &State,
    transactions: &[Transaction],
) -> Result<ConsensusChange, AcceptError> {
    let constants = &state.constants;
    let registry = &state.registry;
    let plugins = &state.plugins;

    let mut change: Option<ConsensusChange> = None;
    let outcome = state.store.update::<(), DryRun, _>(|tx| {
        let tip_height =
            ledger::block_height(tx)?.ok_or(StoreError::Corrupt("store has no tip height"))?;
        let height = tip_height.next();
        let timestamp = Timestamp::now();
        let mut synthetic = ConsensusChange {
            id: CONSENSUS_CHANGE_BEGINNING,
            ..ConsensusChange::default()
        };

        for (index, transaction) in transactions.iter().enumerate() {
            let ct = prepare_consensus_transaction(tx, transaction, height, timestamp, index)
                .map_err(|err| DryRun::Failed(err.into()))?;
            let ctx = TransactionContext {
                block_height: height,
                block_timestamp: timestamp,
                block_creating: false,
            };
            registry
                .validate_transaction(&ct, &ctx, constants, tx)
                .map_err(|err| DryRun::Failed(err.into()))?;

            for input in &transaction.coin_inputs {
                let diff = CoinOutputDiff {
                    direction: DiffDirection::Revert,
                    id: input.parent_id,
                    coin_output: ct.spent_coin_outputs[&input.parent_id].clone(),
                };
                ledger::commit_coin_output_diff(tx, &diff, DiffDirection::Apply)?;
                synthetic.coin_output_diffs.push(diff);
            }
            for (output_index, output) in transaction.coin_outputs.iter().enumerate() {
                let diff = CoinOutputDiff {
                    direction: DiffDirection::Apply,
                    id: transaction.coin_output_id(output_index as u64),
                    coin_output: output.clone(),
                };
                ledger::commit_coin_output_diff(tx, &diff, DiffDirection::Apply)?;
                synthetic.coin_output_diffs.push(diff);
            }
            for input in &transaction.blockstake_inputs {
                let diff = BlockStakeOutputDiff {
                    direction: DiffDirection::Revert,
                    id: input.parent_id,
                    blockstake_output: ct.spent_blockstake_outputs[&input.parent_id].clone(),
                };
                ledger::commit_blockstake_output_diff(tx, &diff, DiffDirection::Apply)?;
                synthetic.blockstake_output_diffs.push(diff);
            }
            for (output_index, output) in transaction.blockstake_outputs.iter().enumerate() {
                let diff = BlockStakeOutputDiff {
                    direction: DiffDirection::Apply,
                    id: transaction.blockstake_output_id(output_index as u64),
                    blockstake_output: output.clone(),
                };
                ledger::commit_blockstake_output_diff(tx, &diff, DiffDirection::Apply)?;
                synthetic.blockstake_output_diffs.push(diff);
            }
            let id_diff = TransactionIdDiff {
                direction: DiffDirection::Apply,
                id: transaction.id(),
                short_id: TransactionShortId::new(height, index as u16),
            };
            ledger::commit_transaction_id_diff(tx, &id_diff, DiffDirection::Apply)?;
            synthetic.transaction_id_diffs.push(id_diff);

            for (name, plugin) in plugins {
                plugin
                    .apply_transaction(&ct, &ledger::plugin_bucket(name), tx)
                    .map_err(|err| DryRun::Failed(err.into()))?;
            }
        }

        change = Some(synthetic);
        // Never commit a dry run.
        Err(DryRun::Complete)
    });

    match outcome {
        Err(DryRun::Complete) => {
            Ok(change.expect("the dry run recorded a change before completing"))
        }
        Err(DryRun::Failed(err)) => Err(err),
        Ok(()) => unreachable!("the dry run always forces a rollback"),
    }
}
