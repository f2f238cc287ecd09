//! Configuration of the durable store.

use std::path::PathBuf;

use stakecoin_chain::parameters::Network;

/// Configuration for the consensus store of one network.
#[derive(Clone, Debug)]
pub struct Config {
    /// The root directory for persistent data; the store lives in a
    /// per-network subdirectory underneath it.
    pub data_dir: PathBuf,

    /// The network this store belongs to.
    pub network: Network,

    /// When set, the store is kept in a temporary directory that is removed
    /// on drop. Used by tests and throwaway local networks.
    pub ephemeral: bool,
}

impl Config {
    pub fn new(network: Network) -> Config {
        Config {
            data_dir: default_data_dir(),
            network,
            ephemeral: false,
        }
    }

    /// An ephemeral store for tests.
    pub fn ephemeral(network: Network) -> Config {
        Config {
            data_dir: default_data_dir(),
            network,
            ephemeral: true,
        }
    }

    pub(crate) fn sled_config(&self) -> sled::Config {
        if self.ephemeral {
            sled::Config::new().temporary(true)
        } else {
            sled::Config::new().path(self.data_dir.join(self.network.name()))
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stakecoin")
}
