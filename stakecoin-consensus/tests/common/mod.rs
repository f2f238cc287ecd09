//! Shared harness for driving a devnet chain in integration tests.
#![allow(dead_code)]

use stakecoin_chain::block::{Block, BlockStakeOutputIndexes, Height};
use stakecoin_chain::transaction::Transaction;
use stakecoin_chain::{BlockStakeOutputId, Currency};
use stakecoin_consensus::testutil::{
    devnet_coin_key, devnet_stake_key, next_block, open_devnet_set, restake_transaction, TestKey,
};
use stakecoin_consensus::ConsensusSet;

pub struct Harness {
    pub set: ConsensusSet,
    pub stake_key: TestKey,
    pub coin_key: TestKey,
    pub tip: Block,
    pub height: Height,
    /// The unspent blockstake output the next block stakes on.
    pub staked: BlockStakeOutputId,
    /// The in-chain coordinates of `staked`.
    pub staked_indexes: BlockStakeOutputIndexes,
}

impl Harness {
    pub fn new() -> Harness {
        stakecoin_test::init();
        let set = open_devnet_set();
        let tip = set.current_block().expect("genesis is the tip");
        let staked = tip.transactions[0].blockstake_output_id(0);
        Harness {
            set,
            stake_key: devnet_stake_key(),
            coin_key: devnet_coin_key(),
            tip,
            height: Height(0),
            staked,
            staked_indexes: BlockStakeOutputIndexes::default(),
        }
    }

    /// The id of the devnet genesis coin allocation.
    pub fn genesis_coin_output_id(&self) -> stakecoin_chain::CoinOutputId {
        stakecoin_consensus::testutil::devnet_genesis_transaction().coin_output_id(0)
    }

    /// Builds the next block without accepting it: a restake transaction
    /// followed by `extra` transactions.
    pub fn build_next_block(&self, extra: Vec<Transaction>) -> (Block, BlockStakeOutputId) {
        let restake = restake_transaction(self.staked, Currency::from(3000), &self.stake_key);
        let next_staked = restake.blockstake_output_id(0);
        let mut transactions = vec![restake];
        transactions.extend(extra);
        let block = next_block(
            &self.tip,
            self.staked_indexes,
            transactions,
            self.stake_key.unlock_hash(),
        );
        (block, next_staked)
    }

    /// Builds, accepts, and tracks the next block.
    pub fn mine(&mut self, extra: Vec<Transaction>) -> Block {
        let (block, next_staked) = self.build_next_block(extra);
        self.set
            .accept_block(block.clone())
            .expect("harness blocks are valid");
        self.height = self.height.next();
        self.tip = block.clone();
        self.staked = next_staked;
        self.staked_indexes = BlockStakeOutputIndexes {
            block_height: self.height,
            transaction_index: 0,
            output_index: 0,
        };
        block
    }
}
