//! The contract of the peer-to-peer gateway.
//!
//! The gateway itself lives outside this crate; the consensus set only
//! consumes this trait: it rebroadcasts accepted block headers, and a node's
//! wiring registers the block-synchronization RPC verbs against it.

/// The RPC verb a node relays newly accepted block headers under.
pub const RELAY_HEADER_RPC: &str = "RelayHeader";
/// The RPC verb a peer calls to request a range of blocks.
pub const SEND_BLOCKS_RPC: &str = "SendBlocks";
/// The RPC verb a peer calls to request one block by id.
pub const SEND_BLOCK_RPC: &str = "SendBlk";

/// A registered RPC handler: raw request bytes in, raw response bytes out.
pub type RpcHandler = Box<dyn Fn(&[u8]) -> Result<Vec<u8>, String> + Send + Sync>;

/// The peer-to-peer surface the consensus set consumes.
pub trait Gateway: Send + Sync {
    /// Fire-and-forget broadcast of a payload to the current peer set.
    fn broadcast(&self, rpc_name: &str, payload: Vec<u8>);

    /// Register a handler for an incoming RPC verb.
    fn register_rpc(&self, rpc_name: &str, handler: RpcHandler);

    /// The current number of connected peers.
    fn peer_count(&self) -> usize;
}
