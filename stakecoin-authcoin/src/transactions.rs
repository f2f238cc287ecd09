//! The auth-coin transaction extensions and their codecs.

use canonical_serde_derive::{CanonDeserialize, CanonSerialize};

use stakecoin_chain::conditions::{Condition, Fulfillment, UnlockHash};
use stakecoin_chain::blake2b;
use stakecoin_chain::transaction::Transaction;
use stakecoin_chain::{
    CanonicalDeserialize, CanonicalSerialize, SerializationError, SigHash,
};

use crate::{
    SPECIFIER_AUTH_ADDRESS_UPDATE, SPECIFIER_AUTH_CONDITION_UPDATE,
    TRANSACTION_VERSION_AUTH_ADDRESS_UPDATE, TRANSACTION_VERSION_AUTH_CONDITION_UPDATE,
};

/// The extension payload of an address-update transaction: addresses to
/// authorize, addresses to deauthorize, and the proof that the current auth
/// condition approves.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, CanonSerialize, CanonDeserialize)]
pub struct AuthAddressUpdate {
    pub nonce: [u8; 8],
    pub auth_addresses: Vec<UnlockHash>,
    pub deauth_addresses: Vec<UnlockHash>,
    pub auth_fulfillment: Fulfillment,
}

/// The extension payload of a condition-update transaction: the replacement
/// auth condition and the proof that the current one approves.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, CanonSerialize, CanonDeserialize)]
pub struct AuthConditionUpdate {
    pub nonce: [u8; 8],
    pub auth_condition: Condition,
    pub auth_fulfillment: Fulfillment,
}

fn decode_extension<T: CanonicalDeserialize>(
    tx: &Transaction,
) -> Result<T, SerializationError> {
    let bytes = tx
        .extension
        .as_ref()
        .ok_or(SerializationError::Parse("missing extension data"))?;
    let mut slice = bytes.as_slice();
    let value = T::canonical_deserialize(&mut slice)?;
    if !slice.is_empty() {
        return Err(SerializationError::Parse("extension has trailing bytes"));
    }
    Ok(value)
}

impl AuthAddressUpdate {
    pub fn from_transaction(tx: &Transaction) -> Result<AuthAddressUpdate, SerializationError> {
        decode_extension(tx)
    }

    /// Wraps this update into a transaction carrying `arbitrary_data`.
    pub fn into_transaction(self, arbitrary_data: Vec<u8>) -> Transaction {
        Transaction {
            version: TRANSACTION_VERSION_AUTH_ADDRESS_UPDATE,
            arbitrary_data,
            extension: Some(
                self.canonical_serialize_to_vec()
                    .expect("serializing to a vec is infallible"),
            ),
            ..Transaction::default()
        }
    }
}

impl AuthConditionUpdate {
    pub fn from_transaction(tx: &Transaction) -> Result<AuthConditionUpdate, SerializationError> {
        decode_extension(tx)
    }

    pub fn into_transaction(self, arbitrary_data: Vec<u8>) -> Transaction {
        Transaction {
            version: TRANSACTION_VERSION_AUTH_CONDITION_UPDATE,
            arbitrary_data,
            extension: Some(
                self.canonical_serialize_to_vec()
                    .expect("serializing to a vec is infallible"),
            ),
            ..Transaction::default()
        }
    }
}

/// The message the auth fulfillment of an address update signs: specifier,
/// version, nonce, both address lists, and the arbitrary data, in that
/// order. The fulfillment itself is excluded.
pub fn address_update_signature_hash(
    update: &AuthAddressUpdate,
    arbitrary_data: &[u8],
) -> SigHash {
    use std::io::Write;

    let mut writer = blake2b::Writer::default();
    (|| -> Result<(), std::io::Error> {
        writer.write_all(SPECIFIER_AUTH_ADDRESS_UPDATE.as_bytes())?;
        TRANSACTION_VERSION_AUTH_ADDRESS_UPDATE.canonical_serialize(&mut writer)?;
        update.nonce.canonical_serialize(&mut writer)?;
        update.auth_addresses.canonical_serialize(&mut writer)?;
        update.deauth_addresses.canonical_serialize(&mut writer)?;
        arbitrary_data.to_vec().canonical_serialize(&mut writer)?;
        Ok(())
    })()
    .expect("Blake2b writer is infallible");
    SigHash(writer.finish())
}

/// The message the auth fulfillment of a condition update signs.
pub fn condition_update_signature_hash(
    update: &AuthConditionUpdate,
    arbitrary_data: &[u8],
) -> SigHash {
    use std::io::Write;

    let mut writer = blake2b::Writer::default();
    (|| -> Result<(), std::io::Error> {
        writer.write_all(SPECIFIER_AUTH_CONDITION_UPDATE.as_bytes())?;
        TRANSACTION_VERSION_AUTH_CONDITION_UPDATE.canonical_serialize(&mut writer)?;
        update.nonce.canonical_serialize(&mut writer)?;
        update.auth_condition.canonical_serialize(&mut writer)?;
        arbitrary_data.to_vec().canonical_serialize(&mut writer)?;
        Ok(())
    })()
    .expect("Blake2b writer is infallible");
    SigHash(writer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakecoin_chain::conditions::{PublicKey, Signature};

    fn sample_update() -> AuthAddressUpdate {
        AuthAddressUpdate {
            nonce: [1, 2, 3, 4, 5, 6, 7, 8],
            auth_addresses: vec![PublicKey::ed25519([1; 32]).unlock_hash()],
            deauth_addresses: vec![PublicKey::ed25519([2; 32]).unlock_hash()],
            auth_fulfillment: Fulfillment::single_signature(
                PublicKey::ed25519([3; 32]),
                Signature([7; 64]),
            ),
        }
    }

    #[test]
    fn extension_roundtrip() {
        let update = sample_update();
        let tx = update.clone().into_transaction(Vec::new());
        assert_eq!(tx.version, TRANSACTION_VERSION_AUTH_ADDRESS_UPDATE);
        let decoded = AuthAddressUpdate::from_transaction(&tx).unwrap();
        assert_eq!(decoded, update);
    }

    #[test]
    fn signature_hash_excludes_the_fulfillment() {
        let update = sample_update();
        let mut resigned = update.clone();
        resigned.auth_fulfillment =
            Fulfillment::single_signature(PublicKey::ed25519([9; 32]), Signature([9; 64]));
        assert_eq!(
            address_update_signature_hash(&update, b"data"),
            address_update_signature_hash(&resigned, b"data")
        );
        // But it binds the address lists and the arbitrary data.
        let mut changed = update.clone();
        changed.auth_addresses.push(PublicKey::ed25519([8; 32]).unlock_hash());
        assert_ne!(
            address_update_signature_hash(&update, b"data"),
            address_update_signature_hash(&changed, b"data")
        );
        assert_ne!(
            address_update_signature_hash(&update, b"data"),
            address_update_signature_hash(&update, b"tampered")
        );
    }

    #[test]
    fn trailing_extension_bytes_are_rejected() {
        let update = sample_update();
        let mut tx = update.into_transaction(Vec::new());
        tx.extension.as_mut().unwrap().push(0);
        assert!(AuthAddressUpdate::from_transaction(&tx).is_err());
    }
}
