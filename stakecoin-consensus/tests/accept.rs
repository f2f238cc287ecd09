//! Block acceptance end to end: the minimum block, simple and unbalanced
//! transfers, maturing miner payouts, and the timestamp boundaries.

mod common;

use common::Harness;

use stakecoin_chain::conditions::Condition;
use stakecoin_chain::outputs::CoinOutput;
use stakecoin_chain::transaction::TransactionShortId;
use stakecoin_chain::block::Height;
use stakecoin_chain::{Currency, Timestamp};
use stakecoin_consensus::testutil::{transfer_transaction, TestKey};
use stakecoin_consensus::{AcceptError, BlockError, TransactionError};

#[test]
fn minimum_block_advances_the_tip() {
    let mut harness = Harness::new();
    let staked_before = harness.staked;
    let block = harness.mine(Vec::new());

    assert_eq!(harness.set.height().unwrap(), Height(1));
    assert_eq!(harness.set.current_block().unwrap(), block);
    // The staked output was consumed, its respend is unspent.
    assert!(harness
        .set
        .blockstake_output(&staked_before)
        .unwrap()
        .is_none());
    assert_eq!(
        harness
            .set
            .blockstake_output(&harness.staked)
            .unwrap()
            .map(|output| output.value),
        Some(Currency::from(3000))
    );
    // The block-creating transaction is reachable by id and short id.
    let restake = &block.transactions[0];
    let (found, short) = harness
        .set
        .transaction_at_id(&restake.id())
        .unwrap()
        .expect("restake transaction is in the chain");
    assert_eq!(&found, restake);
    assert_eq!(short, TransactionShortId::new(Height(1), 0));
}

#[test]
fn simple_transfer_moves_the_coins() {
    let mut harness = Harness::new();
    harness.mine(Vec::new());

    let genesis_coins = harness.genesis_coin_output_id();
    let receiver = TestKey::from_seed([9; 32]);
    let transfer = transfer_transaction(
        vec![(genesis_coins, &harness.coin_key)],
        vec![
            CoinOutput {
                value: Currency::from(90),
                condition: receiver.condition(),
            },
            CoinOutput {
                value: Currency::from(9),
                condition: harness.coin_key.condition(),
            },
        ],
        Some(Currency::from(1)),
    );
    let block = harness.mine(vec![transfer.clone()]);

    assert!(harness.set.coin_output(&genesis_coins).unwrap().is_none());
    assert_eq!(
        harness
            .set
            .coin_output(&transfer.coin_output_id(0))
            .unwrap()
            .map(|output| output.value),
        Some(Currency::from(90))
    );
    assert_eq!(
        harness
            .set
            .coin_output(&transfer.coin_output_id(1))
            .unwrap()
            .map(|output| output.value),
        Some(Currency::from(9))
    );

    // The miner payout (creator fee 10 + fee 1) is delayed; it matures
    // `maturity_delay` blocks later and only then becomes spendable.
    let payout_id = block.miner_payout_id(0);
    assert!(harness.set.coin_output(&payout_id).unwrap().is_none());
    for _ in 0..10 {
        harness.mine(Vec::new());
    }
    assert_eq!(
        harness
            .set
            .coin_output(&payout_id)
            .unwrap()
            .map(|output| output.value),
        Some(Currency::from(11))
    );
}

#[test]
fn unbalanced_transfer_is_rejected() {
    let mut harness = Harness::new();
    harness.mine(Vec::new());

    let genesis_coins = harness.genesis_coin_output_id();
    let receiver = TestKey::from_seed([9; 32]);
    // 100 in, 89 + 9 out + 1 fee = 99: unbalanced.
    let transfer = transfer_transaction(
        vec![(genesis_coins, &harness.coin_key)],
        vec![
            CoinOutput {
                value: Currency::from(89),
                condition: receiver.condition(),
            },
            CoinOutput {
                value: Currency::from(9),
                condition: harness.coin_key.condition(),
            },
        ],
        Some(Currency::from(1)),
    );
    let (block, _) = harness.build_next_block(vec![transfer]);
    let err = harness.set.accept_block(block).unwrap_err();
    assert!(matches!(
        err,
        AcceptError::Block(BlockError::Transaction {
            source: TransactionError::UnbalancedOutputs,
            ..
        })
    ));
    // Nothing changed: the ledger still holds the genesis coins.
    assert_eq!(harness.set.height().unwrap(), Height(1));
    assert!(harness.set.coin_output(&genesis_coins).unwrap().is_some());
}

#[test]
fn zero_valued_output_is_rejected() {
    let mut harness = Harness::new();
    harness.mine(Vec::new());

    let genesis_coins = harness.genesis_coin_output_id();
    let transfer = transfer_transaction(
        vec![(genesis_coins, &harness.coin_key)],
        vec![
            CoinOutput {
                value: Currency::zero(),
                condition: harness.coin_key.condition(),
            },
            CoinOutput {
                value: Currency::from(100),
                condition: harness.coin_key.condition(),
            },
        ],
        None,
    );
    let (block, _) = harness.build_next_block(vec![transfer]);
    let err = harness.set.accept_block(block).unwrap_err();
    assert!(matches!(
        err,
        AcceptError::Block(BlockError::Transaction {
            source: TransactionError::ZeroOutput,
            ..
        })
    ));
}

#[test]
fn wrong_signature_is_rejected() {
    let mut harness = Harness::new();
    harness.mine(Vec::new());

    let genesis_coins = harness.genesis_coin_output_id();
    let thief = TestKey::from_seed([66; 32]);
    let transfer = transfer_transaction(
        vec![(genesis_coins, &thief)],
        vec![CoinOutput {
            value: Currency::from(100),
            condition: thief.condition(),
        }],
        None,
    );
    let (block, _) = harness.build_next_block(vec![transfer]);
    let err = harness.set.accept_block(block).unwrap_err();
    assert!(matches!(
        err,
        AcceptError::Block(BlockError::Transaction {
            source: TransactionError::ConditionNotFulfilled(_),
            ..
        })
    ));
}

#[test]
fn accepted_headers_are_rebroadcast() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingGateway {
        broadcasts: AtomicUsize,
    }

    impl stakecoin_consensus::gateway::Gateway for CountingGateway {
        fn broadcast(&self, rpc_name: &str, payload: Vec<u8>) {
            assert_eq!(rpc_name, stakecoin_consensus::gateway::RELAY_HEADER_RPC);
            assert!(!payload.is_empty());
            self.broadcasts.fetch_add(1, Ordering::SeqCst);
        }

        fn register_rpc(
            &self,
            _rpc_name: &str,
            _handler: stakecoin_consensus::gateway::RpcHandler,
        ) {
        }

        fn peer_count(&self) -> usize {
            0
        }
    }

    let mut harness = Harness::new();
    let gateway = Arc::new(CountingGateway::default());
    harness.set.attach_gateway(gateway.clone());
    harness.mine(Vec::new());
    harness.mine(Vec::new());
    assert_eq!(gateway.broadcasts.load(Ordering::SeqCst), 2);
}

#[test]
fn duplicate_block_is_reported_known() {
    let mut harness = Harness::new();
    let block = harness.mine(Vec::new());
    assert!(matches!(
        harness.set.accept_block(block),
        Err(AcceptError::BlockKnown)
    ));
}

#[test]
fn future_timestamps_split_into_retry_and_discard() {
    let harness = Harness::new();
    let now = Timestamp::now();

    let (mut held, _) = harness.build_next_block(Vec::new());
    held.timestamp = Timestamp(now.0 + 121);
    assert!(matches!(
        harness.set.accept_block(held),
        Err(AcceptError::Block(BlockError::FutureTimestamp))
    ));

    let (mut discarded, _) = harness.build_next_block(Vec::new());
    discarded.timestamp = Timestamp(now.0 + 601);
    let discarded_clone = discarded.clone();
    assert!(matches!(
        harness.set.accept_block(discarded),
        Err(AcceptError::Block(BlockError::ExtremeFutureTimestamp))
    ));
    // The extreme-future rejection is memoized.
    assert!(matches!(
        harness.set.accept_block(discarded_clone),
        Err(AcceptError::DosBlock)
    ));
}

#[test]
fn try_transaction_set_is_a_dry_run() {
    let mut harness = Harness::new();
    harness.mine(Vec::new());

    let genesis_coins = harness.genesis_coin_output_id();
    let transfer = transfer_transaction(
        vec![(genesis_coins, &harness.coin_key)],
        vec![CoinOutput {
            value: Currency::from(99),
            condition: harness.coin_key.condition(),
        }],
        Some(Currency::from(1)),
    );
    let change = harness
        .set
        .try_transaction_set(&[transfer.clone()])
        .expect("the set validates");
    assert_eq!(change.applied_blocks.len(), 0);
    assert_eq!(change.coin_output_diffs.len(), 2);
    assert_eq!(change.transaction_id_diffs.len(), 1);
    // Nothing was committed.
    assert!(harness.set.coin_output(&genesis_coins).unwrap().is_some());
    assert!(harness
        .set
        .transaction_at_id(&transfer.id())
        .unwrap()
        .is_none());

    // A double-spending set fails without mutating anything.
    let double = vec![transfer.clone(), transfer];
    assert!(harness.set.try_transaction_set(&double).is_err());
    assert!(harness.set.coin_output(&genesis_coins).unwrap().is_some());
}
