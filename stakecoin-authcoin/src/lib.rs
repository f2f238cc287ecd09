//! The auth-coin extension: authorization-controlled coin transfers.
//!
//! A chain-wide *auth condition* governs who may change the authorization
//! state. Two transaction versions update it: one replaces the condition
//! itself, one (de)authorizes addresses. A validator layered over the
//! standard transfer requires every participating address to be authorized
//! at the transfer's block height.
//!
//! The extension is packaged as a consensus-set plugin owning two nested
//! buckets: a per-height history of auth conditions, and a per-address
//! history of authorization flags.

#[macro_use]
extern crate serde;

mod controllers;
mod plugin;
mod transactions;

pub use controllers::{AuthAddressUpdateController, AuthConditionUpdateController};
pub use plugin::{
    get_active_auth_condition, get_addresses_auth_state_at, get_addresses_auth_state_now,
    get_auth_condition_at, AuthCoinPlugin,
};
pub use transactions::{
    address_update_signature_hash, condition_update_signature_hash, AuthAddressUpdate,
    AuthConditionUpdate,
};

use stakecoin_chain::transaction::TransactionVersion;
use stakecoin_chain::Specifier;

/// The transaction version (de)authorizing addresses.
pub const TRANSACTION_VERSION_AUTH_ADDRESS_UPDATE: TransactionVersion = TransactionVersion(0xB0);
/// The transaction version replacing the auth condition.
pub const TRANSACTION_VERSION_AUTH_CONDITION_UPDATE: TransactionVersion = TransactionVersion(0xB1);

/// Namespace tag of address-update signature inputs.
pub const SPECIFIER_AUTH_ADDRESS_UPDATE: Specifier = Specifier::new(*b"auth addr update");
/// Namespace tag of condition-update signature inputs.
pub const SPECIFIER_AUTH_CONDITION_UPDATE: Specifier = Specifier::new(*b"auth cond update");

/// The name the plugin registers under.
pub const PLUGIN_NAME: &str = "authcoin";
