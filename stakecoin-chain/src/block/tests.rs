use proptest::{collection::vec, prelude::*, test_runner::Config};

use super::*;
use crate::conditions::PublicKey;
use crate::serialization::CanonicalDeserializeInto;
use crate::transaction::tests::{arb_currency, arb_transaction};

fn arb_miner_payout() -> impl Strategy<Value = MinerPayout> {
    (arb_currency(), any::<[u8; 32]>()).prop_map(|(value, key)| MinerPayout {
        value,
        unlock_hash: PublicKey::ed25519(key).unlock_hash(),
    })
}

fn arb_block() -> impl Strategy<Value = Block> {
    (
        any::<[u8; 32]>(),
        any::<u64>(),
        (any::<u64>(), 0u64..8, 0u64..8),
        vec(arb_miner_payout(), 0..3),
        vec(arb_transaction(), 0..3),
    )
        .prop_map(|(parent, timestamp, (height, tx_index, output_index), payouts, txs)| {
            Block::new(
                crate::BlockId(parent),
                crate::Timestamp(timestamp),
                BlockStakeOutputIndexes {
                    block_height: Height(height),
                    transaction_index: tx_index,
                    output_index,
                },
                payouts,
                txs,
            )
        })
}

proptest! {
    // The block roundtrip test can be slow, so we use fewer cases.
    #![proptest_config(Config::with_cases(16))]

    #[test]
    fn block_binary_roundtrip(block in arb_block()) {
        stakecoin_test::init();

        let bytes = block.canonical_serialize_to_vec().unwrap();
        let decoded: Block = bytes.as_slice().canonical_deserialize_into().unwrap();
        prop_assert_eq!(&decoded, &block);
        prop_assert_eq!(decoded.id(), block.id());
    }

    #[test]
    fn block_json_roundtrip(block in arb_block()) {
        stakecoin_test::init();

        let json = serde_json::to_string(&block).unwrap();
        let decoded: Block = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(&decoded, &block);
    }
}

#[test]
fn id_binds_the_header_fields() {
    let base = Block::new(
        crate::BlockId([1; 32]),
        crate::Timestamp(1000),
        BlockStakeOutputIndexes::default(),
        Vec::new(),
        Vec::new(),
    );
    let mut other = base.clone();
    other.timestamp = crate::Timestamp(1001);
    assert_ne!(base.id(), other.id());
    let mut other = base.clone();
    other.parent_id = crate::BlockId([2; 32]);
    assert_ne!(base.id(), other.id());
}

#[test]
fn id_binds_the_transactions_through_the_merkle_root() {
    let base = Block::new(
        crate::BlockId([1; 32]),
        crate::Timestamp(1000),
        BlockStakeOutputIndexes::default(),
        Vec::new(),
        Vec::new(),
    );
    let mut with_tx = base.clone();
    with_tx
        .transactions
        .push(crate::transaction::Transaction::default());
    assert_ne!(base.merkle_root(), with_tx.merkle_root());
    assert_ne!(base.id(), with_tx.id());
}

#[test]
fn display_names_the_id() {
    let block = Block::new(
        crate::BlockId([1; 32]),
        crate::Timestamp(1000),
        BlockStakeOutputIndexes::default(),
        Vec::new(),
        Vec::new(),
    );
    let rendered = format!("{}", block);
    assert!(rendered.contains(&block.id().to_string()));
}
