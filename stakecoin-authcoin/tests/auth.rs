//! The auth-coin extension end to end: address authorization gating the
//! standard transfer, condition rotation, and plugin state across
//! re-registration.

use std::sync::Arc;

use stakecoin_authcoin::{
    address_update_signature_hash, condition_update_signature_hash, get_active_auth_condition,
    get_addresses_auth_state_now, get_auth_condition_at, AuthAddressUpdate, AuthCoinPlugin,
    AuthConditionUpdate, PLUGIN_NAME,
};
use stakecoin_chain::block::{Block, BlockStakeOutputIndexes, Height};
use stakecoin_chain::conditions::UnlockHash;
use stakecoin_chain::outputs::CoinOutput;
use stakecoin_chain::transaction::Transaction;
use stakecoin_chain::{BlockStakeOutputId, Currency, SigHash};
use stakecoin_consensus::testutil::{
    devnet_coin_key, devnet_stake_key, next_block, open_devnet_set, restake_transaction,
    transfer_transaction, TestKey,
};
use stakecoin_consensus::{
    AcceptError, BlockError, CancelToken, ConsensusSet, TransactionError,
};

struct Harness {
    set: ConsensusSet,
    stake_key: TestKey,
    coin_key: TestKey,
    tip: Block,
    height: Height,
    staked: BlockStakeOutputId,
    staked_indexes: BlockStakeOutputIndexes,
    nonce: u8,
}

impl Harness {
    /// A devnet set with the auth-coin plugin registered; the genesis auth
    /// condition is a fresh single-signature key.
    fn new() -> Harness {
        stakecoin_test::init();
        let set = open_devnet_set();
        let auth_key = TestKey::from_seed([100; 32]);
        set.register_plugin(
            PLUGIN_NAME,
            Arc::new(AuthCoinPlugin::new(auth_key.condition())),
            &CancelToken::new(),
        )
        .expect("the auth-coin plugin registers");
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
            nonce: 0,
        }
    }

    fn build_next_block(&self, extra: Vec<Transaction>) -> (Block, BlockStakeOutputId) {
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

    fn mine(&mut self, extra: Vec<Transaction>) -> Block {
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

    fn expect_rejected(&self, extra: Vec<Transaction>) -> AcceptError {
        let (block, _) = self.build_next_block(extra);
        self.set
            .accept_block(block)
            .expect_err("the block must be rejected")
    }

    fn address_update(
        &mut self,
        auth: Vec<UnlockHash>,
        deauth: Vec<UnlockHash>,
        signer: &TestKey,
    ) -> Transaction {
        self.nonce += 1;
        let mut update = AuthAddressUpdate {
            nonce: [self.nonce; 8],
            auth_addresses: auth,
            deauth_addresses: deauth,
            auth_fulfillment: signer.fulfill(SigHash::zero()),
        };
        let message = address_update_signature_hash(&update, b"");
        update.auth_fulfillment = signer.fulfill(message);
        update.into_transaction(Vec::new())
    }

    fn condition_update(
        &mut self,
        condition: stakecoin_chain::conditions::Condition,
        signer: &TestKey,
    ) -> Transaction {
        self.nonce += 1;
        let mut update = AuthConditionUpdate {
            nonce: [self.nonce; 8],
            auth_condition: condition,
            auth_fulfillment: signer.fulfill(SigHash::zero()),
        };
        let message = condition_update_signature_hash(&update, b"");
        update.auth_fulfillment = signer.fulfill(message);
        update.into_transaction(Vec::new())
    }
}

fn transaction_error(err: AcceptError) -> TransactionError {
    match err {
        AcceptError::Block(BlockError::Transaction { source, .. }) => source,
        other => panic!("expected a transaction-level rejection, got {:?}", other),
    }
}

#[test]
fn authorization_gates_the_standard_transfer() {
    let mut harness = Harness::new();
    let receiver = TestKey::from_seed([111; 32]);
    let sender_address = harness.coin_key.unlock_hash();
    let receiver_address = receiver.unlock_hash();

    // Unauthorized addresses cannot transfer.
    let genesis_coins = harness.tip.transactions[0].coin_output_id(0);
    let early_transfer = transfer_transaction(
        vec![(genesis_coins, &harness.coin_key)],
        vec![
            CoinOutput {
                value: Currency::from(60),
                condition: receiver.condition(),
            },
            CoinOutput {
                value: Currency::from(39),
                condition: harness.coin_key.condition(),
            },
        ],
        Some(Currency::from(1)),
    );
    let err = transaction_error(harness.expect_rejected(vec![early_transfer.clone()]));
    assert!(matches!(err, TransactionError::UnauthorizedAddress));

    // Authorize sender and receiver, then the same transfer is accepted.
    let signer = TestKey::from_seed([100; 32]);
    let authorize = harness.address_update(
        vec![sender_address, receiver_address],
        Vec::new(),
        &signer,
    );
    harness.mine(vec![authorize]);
    assert_eq!(
        get_addresses_auth_state_now(&harness.set, &[sender_address, receiver_address]).unwrap(),
        vec![true, true]
    );
    let transfer = transfer_transaction(
        vec![(genesis_coins, &harness.coin_key)],
        vec![
            CoinOutput {
                value: Currency::from(60),
                condition: receiver.condition(),
            },
            CoinOutput {
                value: Currency::from(39),
                condition: harness.coin_key.condition(),
            },
        ],
        Some(Currency::from(1)),
    );
    let receiver_coins = transfer.coin_output_id(0);
    harness.mine(vec![transfer]);

    // Deauthorize the receiver: transfers touching it fail again...
    let deauthorize = harness.address_update(Vec::new(), vec![receiver_address], &signer);
    harness.mine(vec![deauthorize]);
    assert_eq!(
        get_addresses_auth_state_now(&harness.set, &[sender_address, receiver_address]).unwrap(),
        vec![true, false]
    );
    let blocked = transfer_transaction(
        vec![(receiver_coins, &receiver)],
        vec![
            CoinOutput {
                value: Currency::from(30),
                condition: harness.coin_key.condition(),
            },
            CoinOutput {
                value: Currency::from(29),
                condition: receiver.condition(),
            },
        ],
        Some(Currency::from(1)),
    );
    let err = transaction_error(harness.expect_rejected(vec![blocked]));
    assert!(matches!(err, TransactionError::UnauthorizedAddress));

    // ...except a single-address refund with exactly one output.
    let refund = transfer_transaction(
        vec![(receiver_coins, &receiver)],
        vec![CoinOutput {
            value: Currency::from(59),
            condition: receiver.condition(),
        }],
        Some(Currency::from(1)),
    );
    harness.mine(vec![refund]);
}

#[test]
fn address_update_validation() {
    let mut harness = Harness::new();
    let signer = TestKey::from_seed([100; 32]);
    let address = TestKey::from_seed([112; 32]).unlock_hash();

    // The same address in both lists is rejected.
    let conflicted = harness.address_update(vec![address], vec![address], &signer);
    let err = transaction_error(harness.expect_rejected(vec![conflicted]));
    assert!(matches!(err, TransactionError::InvalidExtension(_)));

    // An update without any address is rejected.
    let empty = harness.address_update(Vec::new(), Vec::new(), &signer);
    let err = transaction_error(harness.expect_rejected(vec![empty]));
    assert!(matches!(err, TransactionError::InvalidExtension(_)));

    // An update signed by the wrong key is rejected.
    let impostor = TestKey::from_seed([113; 32]);
    let forged = harness.address_update(vec![address], Vec::new(), &impostor);
    let err = transaction_error(harness.expect_rejected(vec![forged]));
    assert!(matches!(err, TransactionError::ConditionNotFulfilled(_)));
}

#[test]
fn condition_rotation() {
    let mut harness = Harness::new();
    let old_key = TestKey::from_seed([100; 32]);
    let new_key = TestKey::from_seed([101; 32]);

    assert_eq!(
        get_active_auth_condition(&harness.set).unwrap(),
        old_key.condition()
    );

    // Replacing the condition with itself is a rejected no-op.
    let noop = harness.condition_update(old_key.condition(), &old_key);
    let err = transaction_error(harness.expect_rejected(vec![noop]));
    assert!(matches!(err, TransactionError::InvalidExtension(_)));

    // Rotate to the new key.
    let rotate = harness.condition_update(new_key.condition(), &old_key);
    harness.mine(vec![rotate]);
    let rotation_height = harness.height;
    assert_eq!(
        get_active_auth_condition(&harness.set).unwrap(),
        new_key.condition()
    );
    // The per-height history is piecewise-constant.
    assert_eq!(
        get_auth_condition_at(&harness.set, Height(0)).unwrap(),
        old_key.condition()
    );
    assert_eq!(
        get_auth_condition_at(&harness.set, rotation_height).unwrap(),
        new_key.condition()
    );

    // The old key lost its authority; the new key holds it.
    let address = TestKey::from_seed([114; 32]).unlock_hash();
    let stale = harness.address_update(vec![address], Vec::new(), &old_key);
    let err = transaction_error(harness.expect_rejected(vec![stale]));
    assert!(matches!(err, TransactionError::ConditionNotFulfilled(_)));
    let fresh = harness.address_update(vec![address], Vec::new(), &new_key);
    harness.mine(vec![fresh]);
    assert_eq!(
        get_addresses_auth_state_now(&harness.set, &[address]).unwrap(),
        vec![true]
    );
}

#[test]
fn plugin_state_survives_reregistration() {
    let mut harness = Harness::new();
    let signer = TestKey::from_seed([100; 32]);
    let address = TestKey::from_seed([115; 32]).unlock_hash();
    let authorize = harness.address_update(vec![address], Vec::new(), &signer);
    harness.mine(vec![authorize]);

    harness.set.unregister_plugin(PLUGIN_NAME).unwrap();
    // While unregistered, the auth transaction versions have no controller.
    let orphaned = harness.address_update(vec![address], Vec::new(), &signer);
    let err = transaction_error(harness.expect_rejected(vec![orphaned]));
    assert!(matches!(err, TransactionError::UnknownVersion(0xB0)));

    // Re-registration resumes from the stored metadata: the history written
    // in the first run is still there.
    harness
        .set
        .register_plugin(
            PLUGIN_NAME,
            Arc::new(AuthCoinPlugin::new(signer.condition())),
            &CancelToken::new(),
        )
        .unwrap();
    assert_eq!(
        get_addresses_auth_state_now(&harness.set, &[address]).unwrap(),
        vec![true]
    );
}

#[test]
fn reorg_reverts_authorization_state() {
    let mut harness = Harness::new();
    let signer = TestKey::from_seed([100; 32]);
    let address = TestKey::from_seed([116; 32]).unlock_hash();

    let parent = harness.tip.clone();
    let parent_staked = harness.staked;
    let parent_indexes = harness.staked_indexes;

    let authorize = harness.address_update(vec![address], Vec::new(), &signer);
    harness.mine(vec![authorize]);
    assert_eq!(
        get_addresses_auth_state_now(&harness.set, &[address]).unwrap(),
        vec![true]
    );

    // A heavier fork without the authorization displaces the block.
    let fork_payout = TestKey::from_seed([117; 32]);
    let restake_a = restake_transaction(parent_staked, Currency::from(3000), &harness.stake_key);
    let fork_a = next_block(
        &parent,
        parent_indexes,
        vec![restake_a.clone()],
        fork_payout.unlock_hash(),
    );
    let restake_b = restake_transaction(
        restake_a.blockstake_output_id(0),
        Currency::from(3000),
        &harness.stake_key,
    );
    let fork_b = next_block(
        &fork_a,
        BlockStakeOutputIndexes {
            block_height: Height(1),
            transaction_index: 0,
            output_index: 0,
        },
        vec![restake_b],
        fork_payout.unlock_hash(),
    );
    harness.set.accept_block(fork_a).unwrap();
    harness.set.accept_block(fork_b).unwrap();

    assert_eq!(harness.set.height().unwrap(), Height(2));
    assert_eq!(
        get_addresses_auth_state_now(&harness.set, &[address]).unwrap(),
        vec![false],
        "the authorization was reverted with its block"
    );
}
