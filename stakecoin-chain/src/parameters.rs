//! Per-network chain constants.
//!
//! Every consensus rule that involves a magic number reads it from a
//! [`ChainConstants`] value selected by [`Network`], so test networks can
//! shrink delays and soften targets without touching the rules themselves.

pub mod genesis;

use std::fmt;

use crate::conditions::{Condition, PublicKey};
use crate::outputs::{BlockStakeOutput, CoinOutput};
use crate::{Currency, Target, Timestamp};

/// The number of base units in one whole coin.
pub const COIN: u64 = 1_000_000_000;

/// Seed of the devnet genesis coin key. Fixed and public, so local networks
/// and tests can spend the devnet allocation.
pub const DEVNET_COIN_SEED: [u8; 32] = [0x01; 32];
/// Seed of the devnet genesis blockstake key.
pub const DEVNET_BLOCKSTAKE_SEED: [u8; 32] = [0x02; 32];

/// The chain a node participates in.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
    /// A local network with trivial targets and short delays.
    Devnet,
}

impl Network {
    pub fn name(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Devnet => "devnet",
        }
    }

    pub fn constants(self) -> ChainConstants {
        match self {
            Network::Mainnet => mainnet(),
            Network::Testnet => testnet(),
            Network::Devnet => devnet(),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// All protocol constants of a network.
#[derive(Clone, Debug)]
pub struct ChainConstants {
    /// Target seconds between consecutive blocks.
    pub block_frequency_secs: u64,
    /// Blocks before a miner payout matures into a spendable coin output.
    pub maturity_delay: u64,
    /// Number of ancestor timestamps the minimum-timestamp median is
    /// computed over.
    pub median_timestamp_window: usize,
    /// A block this far ahead of the local clock is held and retried.
    pub future_threshold_secs: u64,
    /// A block this far ahead of the local clock is rejected outright.
    pub extreme_future_threshold_secs: u64,
    /// How far behind the candidate height the stake modifier's block-id
    /// window starts.
    pub stake_modifier_delay: u64,
    /// Minimum age of a restaked blockstake output that does not sit at
    /// index (0, 0) of its creating block.
    pub blockstake_aging_secs: u64,
    /// Fixed payout to the block creator, on top of collected miner fees.
    pub block_creator_fee: Currency,
    /// Minimum miner fee of any non-block-creating transaction.
    pub minimum_miner_fee: Currency,
    /// Maximum canonical byte size of a block.
    pub block_size_limit: u64,
    /// Maximum byte size of a transaction's arbitrary data.
    pub arbitrary_data_size_limit: usize,
    /// Number of blocks between child-target adjustments is half this
    /// window; the adjustment ratio is measured over the full window.
    pub target_window: u64,
    /// Upper clamp on a single target adjustment, as a ratio.
    pub max_adjustment_up: (u64, u64),
    /// Lower clamp on a single target adjustment, as a ratio.
    pub max_adjustment_down: (u64, u64),
    /// The child target of the genesis block.
    pub root_target: Target,
    pub genesis_timestamp: Timestamp,
    pub genesis_coin_outputs: Vec<CoinOutput>,
    pub genesis_blockstake_outputs: Vec<BlockStakeOutput>,
    /// Where transaction fees go. `None` pays them to the block creator
    /// through the miner payouts; `Some` requires every block to pay the
    /// collected fees to this condition.
    pub transaction_fee_condition: Option<Condition>,
}

impl ChainConstants {
    /// The total blockstake issued at genesis. Blockstake is never created
    /// or destroyed afterwards, so this is the chain-wide count at every
    /// height.
    pub fn genesis_blockstake_count(&self) -> Currency {
        Currency::sum(self.genesis_blockstake_outputs.iter().map(|o| &o.value))
            .expect("genesis blockstake allocation overflows")
    }
}

fn pay_to_key(key: [u8; 32]) -> Condition {
    Condition::unlock_hash_condition(PublicKey::ed25519(key).unlock_hash())
}

fn pay_to_seed(seed: [u8; 32]) -> Condition {
    let sk = ed25519_zebra::SigningKey::from(seed);
    let vk = ed25519_zebra::VerificationKey::from(&sk);
    pay_to_key(vk.into())
}

fn mainnet() -> ChainConstants {
    let mut root_target = [0u8; 32];
    root_target[2] = 64;
    ChainConstants {
        block_frequency_secs: 120,
        maturity_delay: 144,
        median_timestamp_window: 11,
        future_threshold_secs: 3 * 60 * 60,
        extreme_future_threshold_secs: 6 * 60 * 60,
        stake_modifier_delay: 2000,
        blockstake_aging_secs: 1 << 17,
        block_creator_fee: Currency::from(10)
            .checked_mul_scalar(COIN)
            .expect("block creator fee overflows"),
        minimum_miner_fee: Currency::from(COIN / 10),
        block_size_limit: 2_000_000,
        arbitrary_data_size_limit: 83,
        target_window: 1000,
        max_adjustment_up: (25, 10),
        max_adjustment_down: (10, 25),
        root_target: Target(root_target),
        genesis_timestamp: Timestamp(1_598_486_400),
        genesis_coin_outputs: vec![CoinOutput {
            value: Currency::from(100_000_000)
                .checked_mul_scalar(COIN)
                .expect("genesis coin allocation overflows"),
            condition: pay_to_key(MAINNET_GENESIS_COIN_KEY),
        }],
        genesis_blockstake_outputs: vec![BlockStakeOutput {
            value: Currency::from(3000),
            condition: pay_to_key(MAINNET_GENESIS_BLOCKSTAKE_KEY),
        }],
        transaction_fee_condition: Some(pay_to_key(MAINNET_FEE_POOL_KEY)),
    }
}

fn testnet() -> ChainConstants {
    let mut constants = mainnet();
    constants.block_frequency_secs = 120;
    constants.maturity_delay = 720;
    constants.genesis_timestamp = Timestamp(1_599_091_200);
    let mut root_target = [0u8; 32];
    root_target[1] = 128;
    constants.root_target = Target(root_target);
    constants.genesis_coin_outputs = vec![CoinOutput {
        value: Currency::from(100_000_000)
            .checked_mul_scalar(COIN)
            .expect("genesis coin allocation overflows"),
        condition: pay_to_key(TESTNET_GENESIS_COIN_KEY),
    }];
    constants.genesis_blockstake_outputs = vec![BlockStakeOutput {
        value: Currency::from(3000),
        condition: pay_to_key(TESTNET_GENESIS_BLOCKSTAKE_KEY),
    }];
    constants.transaction_fee_condition = None;
    constants
}

fn devnet() -> ChainConstants {
    ChainConstants {
        block_frequency_secs: 1,
        maturity_delay: 10,
        median_timestamp_window: 11,
        future_threshold_secs: 2 * 60,
        extreme_future_threshold_secs: 10 * 60,
        stake_modifier_delay: 64,
        blockstake_aging_secs: 1,
        block_creator_fee: Currency::from(10),
        minimum_miner_fee: Currency::from(1),
        block_size_limit: 2_000_000,
        arbitrary_data_size_limit: 83,
        target_window: 20,
        max_adjustment_up: (25, 10),
        max_adjustment_down: (10, 25),
        // Every stake-weighted hash passes, so tests and local networks can
        // create blocks at will.
        root_target: Target::MAX,
        genesis_timestamp: Timestamp(1_600_000_000),
        genesis_coin_outputs: vec![CoinOutput {
            value: Currency::from(100),
            condition: pay_to_seed(DEVNET_COIN_SEED),
        }],
        genesis_blockstake_outputs: vec![BlockStakeOutput {
            value: Currency::from(3000),
            condition: pay_to_seed(DEVNET_BLOCKSTAKE_SEED),
        }],
        transaction_fee_condition: None,
    }
}

const MAINNET_GENESIS_COIN_KEY: [u8; 32] = [
    0x7b, 0x1c, 0x92, 0x4d, 0x0e, 0xa3, 0x55, 0x68, 0xc1, 0x0f, 0x2e, 0x96, 0x5d, 0x3a, 0x81,
    0x47, 0x9a, 0xd5, 0x20, 0x6e, 0x71, 0x38, 0xfc, 0x04, 0xb2, 0x63, 0x8e, 0x19, 0xd6, 0x4f,
    0xa7, 0x30,
];
const MAINNET_GENESIS_BLOCKSTAKE_KEY: [u8; 32] = [
    0x22, 0xe8, 0x03, 0x9c, 0x6f, 0x51, 0xb4, 0x0d, 0xd8, 0x2a, 0x90, 0x17, 0x4c, 0xe6, 0x3b,
    0xf5, 0x08, 0x61, 0xad, 0x94, 0x5e, 0xc3, 0x76, 0x29, 0x10, 0x8b, 0xe2, 0x57, 0xcc, 0x35,
    0x4a, 0x9f,
];
const MAINNET_FEE_POOL_KEY: [u8; 32] = [
    0x5d, 0x07, 0xbe, 0x49, 0x12, 0xf3, 0x86, 0x2b, 0x60, 0xcd, 0x1a, 0xe5, 0x73, 0x9e, 0x24,
    0xb8, 0x41, 0xfa, 0x0c, 0x57, 0x92, 0x6d, 0x31, 0xc8, 0x8f, 0x16, 0xda, 0x65, 0x09, 0xaa,
    0xe0, 0x73,
];
const TESTNET_GENESIS_COIN_KEY: [u8; 32] = [
    0x91, 0x44, 0x2f, 0xbd, 0x58, 0x03, 0xea, 0x67, 0x1c, 0xa0, 0x75, 0x3e, 0x12, 0x89, 0xcf,
    0x26, 0xb1, 0x4a, 0xd7, 0x60, 0x9b, 0x05, 0x78, 0xe3, 0x2c, 0xf1, 0x46, 0x8a, 0x53, 0x0e,
    0xbf, 0x14,
];
const TESTNET_GENESIS_BLOCKSTAKE_KEY: [u8; 32] = [
    0x36, 0xc9, 0x50, 0x0b, 0xa4, 0x6b, 0x1e, 0xf2, 0x87, 0x39, 0xd0, 0x65, 0xfe, 0x13, 0x9c,
    0x42, 0x70, 0xe5, 0x2b, 0x88, 0x1d, 0xb6, 0x4f, 0x07, 0xc4, 0x5a, 0x93, 0x2e, 0x61, 0xdc,
    0x18, 0xa5,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn networks_have_distinct_genesis_conditions() {
        let mainnet = Network::Mainnet.constants();
        let testnet = Network::Testnet.constants();
        assert_ne!(
            mainnet.genesis_coin_outputs[0].condition,
            testnet.genesis_coin_outputs[0].condition
        );
    }

    #[test]
    fn blockstake_count_is_the_allocation_sum() {
        let constants = Network::Devnet.constants();
        assert_eq!(constants.genesis_blockstake_count(), Currency::from(3000));
    }

    #[test]
    fn devnet_seed_key_matches_allocation() {
        let constants = Network::Devnet.constants();
        assert_eq!(
            constants.genesis_coin_outputs[0].condition,
            pay_to_seed(DEVNET_COIN_SEED)
        );
    }
}
