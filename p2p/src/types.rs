// Copyright 2021 The rs2pool Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shared p2p types: errors, configuration, limits and the adapter traits
//! bridging the networking layer to its collaborators.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::core::hash::{sha256d, Hash};
use crate::core::ser;
use crate::core::share::{BaseShare, WrappedShare};

use crate::msg::{NetAddress, RememberTx, ShareReply, ShareReq, Version};

/// Protocol version this node speaks.
pub const PROTOCOL_VERSION: u32 = 1700;

/// Sub-version string advertised in the handshake. Peers treat anything
/// starting with "js2pool" as capable of the larger request/reply bounds.
pub const USER_AGENT: &str = "js2pool-rs 0.2.0";

/// Default network magic, the 8-byte frame prefix.
pub const DEFAULT_MAGIC: [u8; 8] = *b"js2pool1";

/// Upper bound of tx hashes a peer may advertise to us via have_tx before
/// we start forgetting the oldest ones.
pub const MAX_REMOTE_TX_HASHES: usize = 10;

/// How many superseded known-tx snapshots we keep around to resolve peer
/// references to recently evicted transactions.
pub const MAX_KNOWN_TX_CACHES: usize = 10;

/// Ring of handshake nonces kept to detect connections to ourselves.
pub const HANDSHAKE_NONCES_CAP: usize = 100;

/// How many peers a single gap is requested from.
pub const GAP_REQUEST_PEERS: usize = 8;

/// Parent counts we ask for per share request, by peer capability.
pub const REQUEST_PARENTS_JS2POOL: u32 = 250;
/// Parent count for legacy peers.
pub const REQUEST_PARENTS_LEGACY: u32 = 79;

/// Parent counts we serve per share request, by requester capability.
pub const REPLY_PARENTS_JS2POOL: u32 = 500;
/// Served parent count for legacy requesters.
pub const REPLY_PARENTS_LEGACY: u32 = 100;
/// Most shares one reply may carry, split across the requested hashes.
pub const REPLY_TOTAL_SHARES: u32 = 500;

/// Share-reply result code: request served.
pub const SHARE_REPLY_GOOD: u8 = 0;
/// Share-reply result code: nothing known under the requested hashes.
pub const SHARE_REPLY_UNKNOWN: u8 = 2;

/// p2p layer errors
#[derive(Debug, Fail)]
pub enum Error {
	/// Serialization or message-shape problem
	#[fail(display = "serialization error: {}", _0)]
	Serialization(ser::Error),
	/// Underlying socket error
	#[fail(display = "connection error: {}", _0)]
	Connection(io::Error),
	/// Frame magic did not match our network
	#[fail(display = "bad magic number")]
	BadMagic,
	/// Frame checksum did not match the payload
	#[fail(display = "bad checksum")]
	BadChecksum,
	/// The connection has been closed, locally or by the peer
	#[fail(display = "connection closed")]
	ConnectionClose,
	/// Idle or read timeout expired
	#[fail(display = "timeout")]
	Timeout,
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::Serialization(e)
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		match e.kind() {
			io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout,
			_ => Error::Connection(e),
		}
	}
}

/// Configuration for the peer-to-peer server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct P2pConfig {
	/// Address the server listens on.
	pub host: IpAddr,
	/// Port the server listens on.
	pub port: u16,
	/// 8-byte network magic prefixing every frame.
	pub magic: [u8; 8],
	/// Maximum number of concurrently connected peers.
	pub max_conn: u32,
}

/// Default address for peer-to-peer connections.
impl Default for P2pConfig {
	fn default() -> P2pConfig {
		P2pConfig {
			host: "0.0.0.0".parse().unwrap(),
			port: 9333,
			magic: DEFAULT_MAGIC,
			max_conn: 128,
		}
	}
}

/// General information about a connected peer, filled in once its version
/// message arrives.
#[derive(Debug, Clone)]
pub struct PeerInfo {
	/// Protocol version the peer speaks.
	pub version: u32,
	/// Service bits the peer advertised.
	pub services: u64,
	/// The peer's sub-version string.
	pub user_agent: String,
	/// Capability flag: sub-version starts with "js2pool", granting the
	/// larger request/reply bounds.
	pub is_js2pool: bool,
	/// Tip of the peer's own share-chain as of the handshake.
	pub best_share_hash: Hash,
}

impl Default for PeerInfo {
	fn default() -> PeerInfo {
		PeerInfo {
			version: 0,
			services: 0,
			user_agent: String::new(),
			is_js2pool: false,
			best_share_hash: Hash::default(),
		}
	}
}

/// Bridge between a peer connection and the coordinator. One implementor
/// (the coordinator) receives the decoded traffic of every connection,
/// tagged with the peer's address. Callbacks run on the connection's
/// reader thread, in wire order for any single peer.
pub trait PoolAdapter: Send + Sync {
	/// Whether this nonce is one we sent out ourselves recently, meaning
	/// the connection loops back to us.
	fn is_own_nonce(&self, nonce: u64) -> bool;
	/// A peer completed its half of the handshake.
	fn peer_version(&self, addr: SocketAddr, version: &Version);
	/// A list of peer addresses has been received.
	fn addrs_received(&self, addr: SocketAddr, addrs: Vec<NetAddress>);
	/// The peer told us the port it believes it reached us on.
	fn addr_me_received(&self, addr: SocketAddr, port: u16);
	/// The peer asks for up to `count` peer addresses.
	fn get_addrs_received(&self, addr: SocketAddr, count: u32);
	/// The peer advertised transactions it can describe.
	fn have_tx_received(&self, addr: SocketAddr, hashes: Vec<Hash>);
	/// The peer no longer vouches for these transactions.
	fn losing_tx_received(&self, addr: SocketAddr, hashes: Vec<Hash>);
	/// The peer releases us from remembering these transactions.
	fn forget_tx_received(&self, addr: SocketAddr, hashes: Vec<Hash>, total_size: u64);
	/// The peer asks us to retain transactions for later share resolution.
	fn remember_tx_received(&self, addr: SocketAddr, msg: RememberTx);
	/// The peer announced the best upstream block it knows.
	fn best_block_received(&self, addr: SocketAddr, raw_header: Vec<u8>);
	/// Wrapped shares arrived.
	fn shares_received(&self, addr: SocketAddr, shares: Vec<WrappedShare>);
	/// The peer requests a range of share history.
	fn share_req_received(&self, addr: SocketAddr, req: ShareReq);
	/// A reply to one of our share requests arrived.
	fn share_reply_received(&self, addr: SocketAddr, reply: ShareReply);
	/// The peer broke protocol; the connection is going away.
	fn peer_bad(&self, addr: SocketAddr, reason: &str);
	/// The connection ended. Fired exactly once per peer.
	fn peer_closed(&self, addr: SocketAddr);
}

/// Fire-and-forget durable archive for shares, owned by the embedding
/// node.
pub trait SharePersister: Send + Sync {
	/// Persist the given shares.
	fn save_shares(&self, shares: &[Arc<BaseShare>]);
}

/// Persister that drops everything, for tests and pruned nodes.
pub struct NoopPersister {}

impl SharePersister for NoopPersister {
	fn save_shares(&self, _shares: &[Arc<BaseShare>]) {}
}

/// A decoded upstream block header. Parsing the full header layout is the
/// embedding node's business; the p2p layer only needs its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
	/// Header hash.
	pub hash: Hash,
}

/// Abstraction of the upstream blockchain's serialization rules.
pub trait BlockchainCodec: Send + Sync {
	/// Decode a raw block header received in a bestblock message.
	fn decode_header(&self, raw: &[u8]) -> Result<BlockHeader, ser::Error>;
	/// Hash of a raw transaction body.
	fn tx_hash(&self, raw: &[u8]) -> Hash;
}

/// Default codec for double-SHA256 chains.
pub struct Sha2dCodec {}

impl BlockchainCodec for Sha2dCodec {
	fn decode_header(&self, raw: &[u8]) -> Result<BlockHeader, ser::Error> {
		if raw.is_empty() {
			return Err(ser::Error::CorruptedData);
		}
		Ok(BlockHeader { hash: sha256d(raw) })
	}

	fn tx_hash(&self, raw: &[u8]) -> Hash {
		sha256d(raw)
	}
}
