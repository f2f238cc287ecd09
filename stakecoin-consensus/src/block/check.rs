//! Consensus check functions for blocks.

use stakecoin_chain::block::Block;
use stakecoin_chain::parameters::ChainConstants;
use stakecoin_chain::{BlockId, Currency, Timestamp};
use stakecoin_state::{ledger, BucketView, StoreError};

use crate::cache::HeaderCache;
use crate::error::BlockError;

/// Returns `Ok(())` if the block's canonical size is within the chain
/// limit.
pub fn block_size_is_valid(block: &Block, constants: &ChainConstants) -> Result<(), BlockError> {
    if block.binary_size() as u64 > constants.block_size_limit {
        return Err(BlockError::LargeBlock);
    }
    Ok(())
}

/// Returns `Ok(())` if `timestamp` is not too far ahead of the local clock.
///
/// This is a non-deterministic rule, as clocks vary between nodes; a block
/// rejected with `FutureTimestamp` is held and retried, one rejected with
/// `ExtremeFutureTimestamp` is discarded.
pub fn timestamp_is_not_in_future(
    timestamp: Timestamp,
    now: Timestamp,
    constants: &ChainConstants,
) -> Result<(), BlockError> {
    if timestamp.0 > now.0 + constants.extreme_future_threshold_secs {
        return Err(BlockError::ExtremeFutureTimestamp);
    }
    if timestamp.0 > now.0 + constants.future_threshold_secs {
        return Err(BlockError::FutureTimestamp);
    }
    Ok(())
}

/// The `(parent id, timestamp)` of a known block, through the header cache.
pub(crate) fn header_info<V: BucketView + ?Sized>(
    view: &V,
    cache: &HeaderCache,
    id: &BlockId,
) -> Result<Option<(BlockId, Timestamp)>, StoreError> {
    if let Some(info) = cache.get(id) {
        return Ok(Some(info));
    }
    match ledger::processed_block(view, id)? {
        Some(pb) => {
            let info = (pb.block.parent_id, pb.block.timestamp);
            cache.insert(*id, info.0, info.1);
            Ok(Some(info))
        }
        None => Ok(None),
    }
}

/// The median of the previous `median_timestamp_window` timestamps, walked
/// backward from `parent_id` along its own ancestry. A valid child's
/// timestamp is strictly later than this.
///
/// Returns `None` when `parent_id` is unknown.
pub fn minimum_valid_child_timestamp<V: BucketView + ?Sized>(
    view: &V,
    cache: &HeaderCache,
    constants: &ChainConstants,
    parent_id: &BlockId,
) -> Result<Option<Timestamp>, StoreError> {
    let mut timestamps = Vec::with_capacity(constants.median_timestamp_window);
    let mut cursor = *parent_id;
    while timestamps.len() < constants.median_timestamp_window {
        match header_info(view, cache, &cursor)? {
            Some((parent, timestamp)) => {
                timestamps.push(timestamp);
                cursor = parent;
            }
            None => break,
        }
    }
    if timestamps.is_empty() {
        return Ok(None);
    }
    timestamps.sort();
    Ok(Some(timestamps[timestamps.len() / 2]))
}

/// Returns `Ok(())` if `timestamp` is strictly past the ancestor median.
pub fn timestamp_is_past_median(
    timestamp: Timestamp,
    minimum: Timestamp,
) -> Result<(), BlockError> {
    if timestamp <= minimum {
        return Err(BlockError::EarlyTimestamp);
    }
    Ok(())
}

/// Returns `Ok(())` if the block's miner payouts are consistent:
///
/// * every payout carries value;
/// * the payout sum equals the block creator fee plus the collected miner
///   fees plus the custom payouts declared by the block's transactions;
/// * when the chain defines a transaction-fee beneficiary, the payouts to
///   that beneficiary equal the collected fees exactly (an undefined
///   beneficiary requires zero).
pub fn miner_payouts_are_valid(
    block: &Block,
    constants: &ChainConstants,
    custom_payout_sum: &Currency,
) -> Result<(), BlockError> {
    let total_fees = block.total_miner_fees().ok_or(BlockError::BadMinerPayouts)?;
    let expected = constants
        .block_creator_fee
        .checked_add(&total_fees)
        .and_then(|sum| sum.checked_add(custom_payout_sum))
        .ok_or(BlockError::BadMinerPayouts)?;

    let fee_beneficiary = constants
        .transaction_fee_condition
        .as_ref()
        .map(|condition| condition.unlock_hash());

    let mut payout_sum = Currency::zero();
    let mut beneficiary_sum = Currency::zero();
    for payout in &block.miner_payouts {
        if payout.value.is_zero() {
            return Err(BlockError::BadMinerPayouts);
        }
        payout_sum = payout_sum
            .checked_add(&payout.value)
            .ok_or(BlockError::BadMinerPayouts)?;
        if fee_beneficiary == Some(payout.unlock_hash) {
            beneficiary_sum = beneficiary_sum
                .checked_add(&payout.value)
                .ok_or(BlockError::BadMinerPayouts)?;
        }
    }
    if payout_sum != expected {
        return Err(BlockError::BadMinerPayouts);
    }
    if fee_beneficiary.is_some() && beneficiary_sum != total_fees {
        return Err(BlockError::BadMinerPayouts);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakecoin_chain::block::{BlockStakeOutputIndexes, MinerPayout};
    use stakecoin_chain::conditions::PublicKey;
    use stakecoin_chain::parameters::Network;
    use stakecoin_chain::transaction::Transaction;

    fn constants() -> ChainConstants {
        Network::Devnet.constants()
    }

    fn block_with_payouts(payouts: Vec<MinerPayout>, fees: Vec<Currency>) -> Block {
        let tx = Transaction {
            miner_fees: fees,
            ..Transaction::default()
        };
        Block::new(
            BlockId([1; 32]),
            Timestamp(1_600_000_100),
            BlockStakeOutputIndexes::default(),
            payouts,
            vec![tx],
        )
    }

    #[test]
    fn future_thresholds_split_three_ways() {
        let constants = constants();
        let now = Timestamp(1_600_000_000);
        assert!(timestamp_is_not_in_future(now, now, &constants).is_ok());
        let held = Timestamp(now.0 + constants.future_threshold_secs + 1);
        assert!(matches!(
            timestamp_is_not_in_future(held, now, &constants),
            Err(BlockError::FutureTimestamp)
        ));
        let discarded = Timestamp(now.0 + constants.extreme_future_threshold_secs + 1);
        assert!(matches!(
            timestamp_is_not_in_future(discarded, now, &constants),
            Err(BlockError::ExtremeFutureTimestamp)
        ));
    }

    #[test]
    fn median_must_be_strictly_beaten() {
        let median = Timestamp(1000);
        assert!(matches!(
            timestamp_is_past_median(Timestamp(1000), median),
            Err(BlockError::EarlyTimestamp)
        ));
        assert!(timestamp_is_past_median(Timestamp(1001), median).is_ok());
    }

    #[test]
    fn payout_sum_must_match_fees_plus_creator_fee() {
        let constants = constants();
        let creator = PublicKey::ed25519([5; 32]).unlock_hash();
        // creator fee 10 + fees 1 = 11
        let good = block_with_payouts(
            vec![MinerPayout {
                value: Currency::from(11),
                unlock_hash: creator,
            }],
            vec![Currency::from(1)],
        );
        assert!(miner_payouts_are_valid(&good, &constants, &Currency::zero()).is_ok());

        let bad = block_with_payouts(
            vec![MinerPayout {
                value: Currency::from(12),
                unlock_hash: creator,
            }],
            vec![Currency::from(1)],
        );
        assert!(matches!(
            miner_payouts_are_valid(&bad, &constants, &Currency::zero()),
            Err(BlockError::BadMinerPayouts)
        ));
    }

    #[test]
    fn fee_beneficiary_must_receive_the_fees() {
        let mut constants = constants();
        let beneficiary_key = PublicKey::ed25519([6; 32]);
        let beneficiary_condition = stakecoin_chain::conditions::Condition::unlock_hash_condition(
            beneficiary_key.unlock_hash(),
        );
        constants.transaction_fee_condition = Some(beneficiary_condition.clone());
        let creator = PublicKey::ed25519([5; 32]).unlock_hash();

        // Fees paid to the creator instead of the beneficiary.
        let wrong_target = block_with_payouts(
            vec![MinerPayout {
                value: Currency::from(11),
                unlock_hash: creator,
            }],
            vec![Currency::from(1)],
        );
        assert!(matches!(
            miner_payouts_are_valid(&wrong_target, &constants, &Currency::zero()),
            Err(BlockError::BadMinerPayouts)
        ));

        let split = block_with_payouts(
            vec![
                MinerPayout {
                    value: Currency::from(10),
                    unlock_hash: creator,
                },
                MinerPayout {
                    value: Currency::from(1),
                    unlock_hash: beneficiary_condition.unlock_hash(),
                },
            ],
            vec![Currency::from(1)],
        );
        assert!(miner_payouts_are_valid(&split, &constants, &Currency::zero()).is_ok());
    }
}
