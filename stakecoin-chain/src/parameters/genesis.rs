//! Genesis block construction.
//!
//! The genesis block carries a single transaction holding every genesis coin
//! and blockstake allocation. It is applied specially by the consensus set:
//! the allocation transaction has no inputs and is exempt from the normal
//! validation rules, which no later block is.

use lazy_static::lazy_static;

use super::{ChainConstants, Network};
use crate::block::{Block, BlockStakeOutputIndexes};
use crate::transaction::Transaction;
use crate::BlockId;

/// The allocation transaction of a chain's genesis block.
pub fn genesis_transaction(constants: &ChainConstants) -> Transaction {
    Transaction {
        coin_outputs: constants.genesis_coin_outputs.clone(),
        blockstake_outputs: constants.genesis_blockstake_outputs.clone(),
        ..Transaction::default()
    }
}

/// The genesis block of a chain.
pub fn genesis_block(constants: &ChainConstants) -> Block {
    Block::new(
        BlockId::zero(),
        constants.genesis_timestamp,
        BlockStakeOutputIndexes::default(),
        Vec::new(),
        vec![genesis_transaction(constants)],
    )
}

lazy_static! {
    static ref MAINNET_GENESIS_ID: BlockId = genesis_block(&Network::Mainnet.constants()).id();
    static ref TESTNET_GENESIS_ID: BlockId = genesis_block(&Network::Testnet.constants()).id();
    static ref DEVNET_GENESIS_ID: BlockId = genesis_block(&Network::Devnet.constants()).id();
}

/// The genesis block id of a network.
pub fn genesis_block_id(network: Network) -> BlockId {
    match network {
        Network::Mainnet => *MAINNET_GENESIS_ID,
        Network::Testnet => *TESTNET_GENESIS_ID,
        Network::Devnet => *DEVNET_GENESIS_ID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Timestamp;

    #[test]
    fn genesis_parent_is_the_zero_id() {
        let block = genesis_block(&Network::Devnet.constants());
        assert!(block.parent_id.is_zero());
        assert_eq!(block.timestamp, Timestamp(1_600_000_000));
    }

    #[test]
    fn genesis_ids_differ_per_network() {
        assert_ne!(
            genesis_block_id(Network::Mainnet),
            genesis_block_id(Network::Testnet)
        );
        assert_ne!(
            genesis_block_id(Network::Testnet),
            genesis_block_id(Network::Devnet)
        );
    }

    #[test]
    fn genesis_id_is_deterministic() {
        let constants = Network::Devnet.constants();
        assert_eq!(
            genesis_block(&constants).id(),
            genesis_block(&constants).id()
        );
    }
}
