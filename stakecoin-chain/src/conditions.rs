//! Conditions lock outputs; fulfillments prove the right to spend them.
//!
//! Both are tagged sum types with a stable wire tag per variant, so new
//! condition kinds can be added without disturbing existing addresses. A
//! condition is "standard" when its type is known and its structural
//! invariants hold; non-standard conditions are rejected during validation
//! but remain representable, since they can exist on other forks.

mod serialize;
mod unlockhash;

pub use unlockhash::{UnlockHash, UnlockType};

use thiserror::Error;

use crate::block::Height;
use crate::serialization::blake2b;
use crate::{CanonicalSerialize, SigHash, Timestamp};

/// Lock values below this bound are block heights; values at or above it are
/// Unix timestamps.
pub const TIME_LOCK_HEIGHT_LIMIT: u64 = 500_000_000;

/// A condition that must be fulfilled before an output can be spent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Condition {
    /// The always-fulfillable condition; anyone may spend the output.
    Nil,
    /// Spendable by the owner of the condition behind a fixed address.
    UnlockHash(UnlockHashCondition),
    /// Spendable only at or after a given height or time.
    TimeLock(TimeLockCondition),
    /// Spendable by a quorum of the listed addresses.
    MultiSignature(MultiSignatureCondition),
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UnlockHashCondition {
    pub target: UnlockHash,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TimeLockCondition {
    /// A height when below [`TIME_LOCK_HEIGHT_LIMIT`], a timestamp otherwise.
    pub lock: u64,
    pub condition: Box<Condition>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MultiSignatureCondition {
    pub unlock_hashes: Vec<UnlockHash>,
    pub minimum_signature_count: u64,
}

impl Condition {
    /// The stable wire tag of this condition's variant.
    pub fn condition_type(&self) -> u8 {
        match self {
            Condition::Nil => 0,
            Condition::UnlockHash(_) => 1,
            Condition::TimeLock(_) => 3,
            Condition::MultiSignature(_) => 4,
        }
    }

    /// Shorthand for the most common condition: pay to a single address.
    pub fn unlock_hash_condition(target: UnlockHash) -> Condition {
        Condition::UnlockHash(UnlockHashCondition { target })
    }

    /// The stable address of this condition.
    pub fn unlock_hash(&self) -> UnlockHash {
        match self {
            Condition::Nil => UnlockHash::nil(),
            Condition::UnlockHash(c) => c.target,
            // A time lock delays spending but does not change ownership.
            Condition::TimeLock(c) => c.condition.unlock_hash(),
            Condition::MultiSignature(c) => {
                let mut sorted = c.unlock_hashes.clone();
                sorted.sort();
                let mut writer = blake2b::Writer::default();
                c.minimum_signature_count
                    .canonical_serialize(&mut writer)
                    .expect("Blake2b writer is infallible");
                sorted
                    .canonical_serialize(&mut writer)
                    .expect("Blake2b writer is infallible");
                UnlockHash::new(UnlockType::MultiSig, writer.finish())
            }
        }
    }

    /// Whether this condition may appear in a new transaction.
    pub fn is_standard(&self) -> bool {
        match self {
            Condition::Nil => true,
            Condition::UnlockHash(c) => c.target.unlock_type == UnlockType::PublicKey,
            Condition::TimeLock(c) => match c.condition.as_ref() {
                Condition::UnlockHash(_) | Condition::MultiSignature(_) => {
                    c.condition.is_standard()
                }
                _ => false,
            },
            Condition::MultiSignature(c) => {
                !c.unlock_hashes.is_empty()
                    && c.minimum_signature_count > 0
                    && c.minimum_signature_count <= c.unlock_hashes.len() as u64
                    && c.unlock_hashes
                        .iter()
                        .all(|uh| uh.unlock_type == UnlockType::PublicKey)
            }
        }
    }

    /// Checks that `fulfillment` proves the right to spend an output locked
    /// by this condition, in the given context.
    pub fn fulfill(
        &self,
        fulfillment: &Fulfillment,
        ctx: &FulfillContext,
    ) -> Result<(), FulfillError> {
        match self {
            Condition::Nil => match fulfillment {
                Fulfillment::SingleSignature(f) => {
                    verify_signature(&f.public_key, &f.signature, &ctx.message)
                }
                _ => Err(FulfillError::WrongType),
            },
            Condition::UnlockHash(c) => match fulfillment {
                Fulfillment::SingleSignature(f) => {
                    if f.public_key.unlock_hash() != c.target {
                        return Err(FulfillError::WrongUnlockHash);
                    }
                    verify_signature(&f.public_key, &f.signature, &ctx.message)
                }
                _ => Err(FulfillError::WrongType),
            },
            Condition::TimeLock(c) => {
                let unlocked = if c.lock < TIME_LOCK_HEIGHT_LIMIT {
                    ctx.block_height.0 >= c.lock
                } else {
                    ctx.block_time.0 >= c.lock
                };
                if !unlocked {
                    return Err(FulfillError::TimeLocked);
                }
                c.condition.fulfill(fulfillment, ctx)
            }
            Condition::MultiSignature(c) => match fulfillment {
                Fulfillment::MultiSignature(f) => {
                    if (f.pairs.len() as u64) < c.minimum_signature_count {
                        return Err(FulfillError::TooFewSignatures);
                    }
                    let mut unused: Vec<UnlockHash> = c.unlock_hashes.clone();
                    for pair in &f.pairs {
                        let uh = pair.public_key.unlock_hash();
                        match unused.iter().position(|candidate| *candidate == uh) {
                            Some(index) => {
                                unused.swap_remove(index);
                            }
                            None => return Err(FulfillError::NotASigner),
                        }
                        verify_signature(&pair.public_key, &pair.signature, &ctx.message)?;
                    }
                    Ok(())
                }
                _ => Err(FulfillError::WrongType),
            },
        }
    }
}

/// A proof of the right to spend an output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Fulfillment {
    SingleSignature(SingleSignatureFulfillment),
    MultiSignature(MultiSignatureFulfillment),
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SingleSignatureFulfillment {
    pub public_key: PublicKey,
    pub signature: Signature,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MultiSignatureFulfillment {
    pub pairs: Vec<PublicKeySignaturePair>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PublicKeySignaturePair {
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl Fulfillment {
    /// The stable wire tag of this fulfillment's variant.
    pub fn fulfillment_type(&self) -> u8 {
        match self {
            Fulfillment::SingleSignature(_) => 1,
            Fulfillment::MultiSignature(_) => 3,
        }
    }

    pub fn single_signature(public_key: PublicKey, signature: Signature) -> Fulfillment {
        Fulfillment::SingleSignature(SingleSignatureFulfillment {
            public_key,
            signature,
        })
    }

    /// Whether this fulfillment may appear in a new transaction.
    pub fn is_standard(&self) -> bool {
        match self {
            Fulfillment::SingleSignature(_) => true,
            Fulfillment::MultiSignature(f) => !f.pairs.is_empty(),
        }
    }
}

/// The signature algorithm of a public key. Only Ed25519 exists today; the
/// tag byte leaves room for successors.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SignatureAlgorithm {
    Ed25519,
}

/// An algorithm-tagged public key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PublicKey {
    pub algorithm: SignatureAlgorithm,
    pub key: [u8; 32],
}

impl PublicKey {
    pub fn ed25519(key: [u8; 32]) -> PublicKey {
        PublicKey {
            algorithm: SignatureAlgorithm::Ed25519,
            key,
        }
    }

    /// The single-signature address owned by this key.
    pub fn unlock_hash(&self) -> UnlockHash {
        UnlockHash::new(UnlockType::PublicKey, blake2b::hash_object(self))
    }
}

/// A detached 64-byte signature.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Signature(pub [u8; 64]);

/// Everything a fulfillment is checked against: the block context for time
/// locks, and the message its signatures must cover. The message is the
/// signature hash of the spending transaction, computed by the transaction's
/// controller for the input being fulfilled.
#[derive(Copy, Clone, Debug)]
pub struct FulfillContext {
    pub block_height: Height,
    pub block_time: Timestamp,
    pub message: SigHash,
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum FulfillError {
    #[error("fulfillment type cannot satisfy the condition")]
    WrongType,
    #[error("fulfillment's public key does not match the condition's unlock hash")]
    WrongUnlockHash,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("condition is still time-locked in the fulfill context")]
    TimeLocked,
    #[error("fulfillment carries fewer signatures than the condition requires")]
    TooFewSignatures,
    #[error("public key is not an eligible signer, or signed more than once")]
    NotASigner,
}

fn verify_signature(
    public_key: &PublicKey,
    signature: &Signature,
    message: &SigHash,
) -> Result<(), FulfillError> {
    match public_key.algorithm {
        SignatureAlgorithm::Ed25519 => {
            use std::convert::TryFrom;

            let vk = ed25519_zebra::VerificationKey::try_from(public_key.key)
                .map_err(|_| FulfillError::InvalidSignature)?;
            vk.verify(
                &ed25519_zebra::Signature::from(signature.0),
                message.as_bytes(),
            )
            .map_err(|_| FulfillError::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::blake2b;

    fn keypair(seed: u8) -> (ed25519_zebra::SigningKey, PublicKey) {
        let sk = ed25519_zebra::SigningKey::from([seed; 32]);
        let vk = ed25519_zebra::VerificationKey::from(&sk);
        (sk, PublicKey::ed25519(vk.into()))
    }

    fn context(message: SigHash) -> FulfillContext {
        FulfillContext {
            block_height: Height(10),
            block_time: Timestamp(1_000_000),
            message,
        }
    }

    #[test]
    fn single_signature_fulfills_its_own_address() {
        let (sk, pk) = keypair(1);
        let message = SigHash(blake2b::hash_bytes(b"spend"));
        let condition = Condition::unlock_hash_condition(pk.unlock_hash());
        let fulfillment =
            Fulfillment::single_signature(pk, Signature(sk.sign(message.as_bytes()).into()));
        assert_eq!(condition.fulfill(&fulfillment, &context(message)), Ok(()));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let (sk, _) = keypair(1);
        let (_, other_pk) = keypair(2);
        let message = SigHash(blake2b::hash_bytes(b"spend"));
        let condition = Condition::unlock_hash_condition(other_pk.unlock_hash());
        let (_, pk) = keypair(1);
        let fulfillment =
            Fulfillment::single_signature(pk, Signature(sk.sign(message.as_bytes()).into()));
        assert_eq!(
            condition.fulfill(&fulfillment, &context(message)),
            Err(FulfillError::WrongUnlockHash)
        );
    }

    #[test]
    fn tampered_message_is_rejected() {
        let (sk, pk) = keypair(1);
        let message = SigHash(blake2b::hash_bytes(b"spend"));
        let tampered = SigHash(blake2b::hash_bytes(b"steal"));
        let condition = Condition::unlock_hash_condition(pk.unlock_hash());
        let fulfillment =
            Fulfillment::single_signature(pk, Signature(sk.sign(message.as_bytes()).into()));
        assert_eq!(
            condition.fulfill(&fulfillment, &context(tampered)),
            Err(FulfillError::InvalidSignature)
        );
    }

    #[test]
    fn time_lock_blocks_early_spends() {
        let (sk, pk) = keypair(1);
        let message = SigHash(blake2b::hash_bytes(b"spend"));
        let condition = Condition::TimeLock(TimeLockCondition {
            lock: 100,
            condition: Box::new(Condition::unlock_hash_condition(pk.unlock_hash())),
        });
        let fulfillment =
            Fulfillment::single_signature(pk, Signature(sk.sign(message.as_bytes()).into()));
        // Height 10 < lock height 100.
        assert_eq!(
            condition.fulfill(&fulfillment, &context(message)),
            Err(FulfillError::TimeLocked)
        );
        let mut late = context(message);
        late.block_height = Height(100);
        assert_eq!(condition.fulfill(&fulfillment, &late), Ok(()));
    }

    #[test]
    fn multisig_requires_quorum_of_distinct_signers() {
        let (sk1, pk1) = keypair(1);
        let (_, pk2) = keypair(2);
        let message = SigHash(blake2b::hash_bytes(b"spend"));
        let condition = Condition::MultiSignature(MultiSignatureCondition {
            unlock_hashes: vec![pk1.unlock_hash(), pk2.unlock_hash()],
            minimum_signature_count: 2,
        });
        let sig1 = Signature(sk1.sign(message.as_bytes()).into());
        let one_sig = Fulfillment::MultiSignature(MultiSignatureFulfillment {
            pairs: vec![PublicKeySignaturePair {
                public_key: pk1,
                signature: sig1,
            }],
        });
        assert_eq!(
            condition.fulfill(&one_sig, &context(message)),
            Err(FulfillError::TooFewSignatures)
        );
        // The same signer twice does not reach the quorum either.
        let duplicated = Fulfillment::MultiSignature(MultiSignatureFulfillment {
            pairs: vec![
                PublicKeySignaturePair {
                    public_key: pk1,
                    signature: sig1,
                },
                PublicKeySignaturePair {
                    public_key: pk1,
                    signature: sig1,
                },
            ],
        });
        assert_eq!(
            condition.fulfill(&duplicated, &context(message)),
            Err(FulfillError::NotASigner)
        );
    }

    #[test]
    fn multisig_address_ignores_listing_order() {
        let (_, pk1) = keypair(1);
        let (_, pk2) = keypair(2);
        let a = Condition::MultiSignature(MultiSignatureCondition {
            unlock_hashes: vec![pk1.unlock_hash(), pk2.unlock_hash()],
            minimum_signature_count: 1,
        });
        let b = Condition::MultiSignature(MultiSignatureCondition {
            unlock_hashes: vec![pk2.unlock_hash(), pk1.unlock_hash()],
            minimum_signature_count: 1,
        });
        assert_eq!(a.unlock_hash(), b.unlock_hash());
    }

    #[test]
    fn standardness() {
        let (_, pk) = keypair(1);
        assert!(Condition::Nil.is_standard());
        assert!(Condition::unlock_hash_condition(pk.unlock_hash()).is_standard());
        // A nested time lock is not standard.
        let nested = Condition::TimeLock(TimeLockCondition {
            lock: 5,
            condition: Box::new(Condition::TimeLock(TimeLockCondition {
                lock: 10,
                condition: Box::new(Condition::Nil),
            })),
        });
        assert!(!nested.is_standard());
        // A multisig quorum larger than its signer set is not standard.
        let overcommitted = Condition::MultiSignature(MultiSignatureCondition {
            unlock_hashes: vec![pk.unlock_hash()],
            minimum_signature_count: 2,
        });
        assert!(!overcommitted.is_standard());
    }
}
