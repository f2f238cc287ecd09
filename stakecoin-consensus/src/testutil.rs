//! Test support: deterministic keys, transaction builders, and block
//! builders for the devnet chain.
//!
//! Lives in the crate proper (not behind `cfg(test)`) so dependent crates'
//! integration suites can drive a consensus set without re-deriving the
//! devnet genesis facts.

use stakecoin_chain::block::{Block, BlockStakeOutputIndexes, Height, MinerPayout};
use stakecoin_chain::conditions::{Condition, Fulfillment, PublicKey, Signature, UnlockHash};
use stakecoin_chain::outputs::{BlockStakeInput, BlockStakeOutput, CoinInput, CoinOutput};
use stakecoin_chain::parameters::{self, Network};
use stakecoin_chain::transaction::Transaction;
use stakecoin_chain::{BlockStakeOutputId, CoinOutputId, Currency, SigHash};
use stakecoin_state::Config;

use crate::{ConsensusSet, TransactionRegistry};

/// A deterministic Ed25519 keypair for tests.
pub struct TestKey {
    signing: ed25519_zebra::SigningKey,
    pub public_key: PublicKey,
}

impl TestKey {
    pub fn from_seed(seed: [u8; 32]) -> TestKey {
        let signing = ed25519_zebra::SigningKey::from(seed);
        let verification = ed25519_zebra::VerificationKey::from(&signing);
        TestKey {
            signing,
            public_key: PublicKey::ed25519(verification.into()),
        }
    }

    pub fn unlock_hash(&self) -> UnlockHash {
        self.public_key.unlock_hash()
    }

    pub fn condition(&self) -> Condition {
        Condition::unlock_hash_condition(self.unlock_hash())
    }

    /// A single-signature fulfillment over `message`.
    pub fn fulfill(&self, message: SigHash) -> Fulfillment {
        Fulfillment::single_signature(
            self.public_key,
            Signature(self.signing.sign(message.as_bytes()).into()),
        )
    }
}

/// The key owning the devnet genesis coin allocation.
pub fn devnet_coin_key() -> TestKey {
    TestKey::from_seed(parameters::DEVNET_COIN_SEED)
}

/// The key owning the devnet genesis blockstake allocation.
pub fn devnet_stake_key() -> TestKey {
    TestKey::from_seed(parameters::DEVNET_BLOCKSTAKE_SEED)
}

/// An ephemeral devnet consensus set with the standard registry.
pub fn open_devnet_set() -> ConsensusSet {
    ConsensusSet::open(
        Config::ephemeral(Network::Devnet),
        TransactionRegistry::standard(),
    )
    .expect("ephemeral devnet set opens")
}

/// The devnet genesis allocation transaction.
pub fn devnet_genesis_transaction() -> Transaction {
    parameters::genesis::genesis_transaction(&Network::Devnet.constants())
}

/// A standard transfer spending the listed coin outputs.
///
/// The fulfillments are signed last: the signature hash covers everything
/// but the fulfillments themselves.
pub fn transfer_transaction(
    inputs: Vec<(CoinOutputId, &TestKey)>,
    outputs: Vec<CoinOutput>,
    miner_fee: Option<Currency>,
) -> Transaction {
    let placeholder = inputs
        .first()
        .map(|(_, key)| key.fulfill(SigHash::zero()))
        .expect("a transfer spends at least one output");
    let mut tx = Transaction {
        coin_inputs: inputs
            .iter()
            .map(|(parent_id, _)| CoinInput {
                parent_id: *parent_id,
                fulfillment: placeholder.clone(),
            })
            .collect(),
        coin_outputs: outputs,
        miner_fees: miner_fee.into_iter().collect(),
        ..Transaction::default()
    };
    for (index, (_, key)) in inputs.iter().enumerate() {
        let message = tx.signature_hash(index as u64);
        tx.coin_inputs[index].fulfillment = key.fulfill(message);
    }
    tx
}

/// The block-creating transaction: respends the staked output to its owner,
/// no coin movement, no fees.
pub fn restake_transaction(
    staked: BlockStakeOutputId,
    value: Currency,
    key: &TestKey,
) -> Transaction {
    let mut tx = Transaction {
        blockstake_inputs: vec![BlockStakeInput {
            parent_id: staked,
            fulfillment: key.fulfill(SigHash::zero()),
        }],
        blockstake_outputs: vec![BlockStakeOutput {
            value,
            condition: key.condition(),
        }],
        ..Transaction::default()
    };
    let message = tx.signature_hash(0);
    tx.blockstake_inputs[0].fulfillment = key.fulfill(message);
    tx
}

/// Assembles a devnet block on `parent`: the given transactions plus a
/// single miner payout collecting the block creator fee and every miner
/// fee, paid to `payout_target`.
pub fn next_block(
    parent: &Block,
    pobs_output: BlockStakeOutputIndexes,
    transactions: Vec<Transaction>,
    payout_target: UnlockHash,
) -> Block {
    let constants = Network::Devnet.constants();
    let fees = transactions
        .iter()
        .map(|tx| tx.total_miner_fees().expect("fees do not overflow"))
        .fold(Currency::zero(), |total, fee| {
            total.checked_add(&fee).expect("fees do not overflow")
        });
    let payout_value = constants
        .block_creator_fee
        .checked_add(&fees)
        .expect("payout does not overflow");
    Block::new(
        parent.id(),
        parent.timestamp + 1,
        pobs_output,
        vec![MinerPayout {
            value: payout_value,
            unlock_hash: payout_target,
        }],
        transactions,
    )
}
