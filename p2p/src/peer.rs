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

//! One connected peer: its connection, the state the protocol keeps per
//! remote (advertised and remembered transactions, external address) and
//! the dispatch of every inbound message.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::prelude::{DateTime, Utc};

use crate::core::hash::Hash;
use crate::core::ser::Writeable;
use crate::core::share::WrappedShare;
use crate::core::tx::TxTemplate;

use crate::conn::{self, MessageHandler, SendHandle, StopHandle, Tracker};
use crate::msg::{
	AddrMe, Addrs, BestBlock, Empty, ForgetTx, GetAddrs, Message, NetAddress, RememberTx,
	ShareReply, ShareReq, Shares, TxHashes, Type, Version,
};
use crate::types::{Error, PeerInfo, PoolAdapter, MAX_REMOTE_TX_HASHES};

/// State kept for the remote end of this connection.
#[derive(Default)]
struct PeerState {
	/// Tx hashes the remote advertised through have_tx, oldest first.
	/// Bounded; eviction happens ahead of every insert batch, so one
	/// large batch may overflow the cap until the next arrives.
	remote_tx_hashes: VecDeque<Hash>,
	/// Transactions the remote asked us to retain for share resolution.
	remembered_txs: HashMap<Hash, TxTemplate>,
	/// Our own address, as the remote reported reaching us.
	external_addr: Option<IpAddr>,
	/// Our own port, as the remote reported reaching us.
	external_port: Option<u16>,
}

/// A single remote peer and the connection to it.
pub struct Peer {
	/// Address of the remote end.
	pub addr: SocketAddr,
	/// Handshake information, default until the version message arrives.
	pub info: RwLock<PeerInfo>,
	/// Time the connection was established.
	pub connected_at: DateTime<Utc>,
	state: RwLock<PeerState>,
	send_handle: Mutex<Option<SendHandle>>,
	stop_handle: Mutex<Option<StopHandle>>,
	tracker: Tracker,
	// guards the single End notification
	connected: AtomicBool,
	adapter: Arc<dyn PoolAdapter>,
	magic: [u8; 8],
}

impl Peer {
	/// A peer shell for the given remote address. Call `start` with the
	/// accepted or dialed stream to bring it to life.
	pub fn new(addr: SocketAddr, magic: [u8; 8], adapter: Arc<dyn PoolAdapter>) -> Peer {
		Peer {
			addr,
			info: RwLock::new(PeerInfo::default()),
			connected_at: Utc::now(),
			state: RwLock::new(PeerState::default()),
			send_handle: Mutex::new(None),
			stop_handle: Mutex::new(None),
			tracker: Tracker::new(),
			connected: AtomicBool::new(true),
			adapter,
			magic,
		}
	}

	/// Takes ownership of the socket and starts the reader thread.
	pub fn start(self: &Arc<Self>, stream: TcpStream) -> Result<(), Error> {
		let handler = self.clone() as Arc<dyn MessageHandler>;
		let (send, stop) = conn::listen(stream, self.magic, self.tracker.clone(), handler)?;
		*self.send_handle.lock().unwrap() = Some(send);
		*self.stop_handle.lock().unwrap() = Some(stop);
		Ok(())
	}

	/// Closes the connection. Idempotent; the End notification still
	/// fires exactly once, from the reader thread winding down.
	pub fn stop(&self) {
		if let Some(stop) = self.stop_handle.lock().unwrap().as_ref() {
			stop.stop();
		}
	}

	/// Whether the connection is still live.
	pub fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}

	/// Whether the remote advertised the js2pool capability string.
	pub fn is_js2pool(&self) -> bool {
		self.info.read().unwrap().is_js2pool
	}

	/// Bytes sent and received on this connection.
	pub fn transmitted_bytes(&self) -> (u64, u64) {
		self.tracker.transmitted_bytes()
	}

	/// Whether the remote advertised this tx hash via have_tx.
	pub fn knows_tx(&self, hash: &Hash) -> bool {
		self.state
			.read()
			.unwrap()
			.remote_tx_hashes
			.contains(hash)
	}

	/// A transaction the remote asked us to remember, by txid or hash.
	pub fn remembered_tx(&self, hash: &Hash) -> Option<TxTemplate> {
		let state = self.state.read().unwrap();
		if let Some(t) = state.remembered_txs.get(hash) {
			return Some(t.clone());
		}
		state
			.remembered_txs
			.values()
			.find(|t| t.matches(hash))
			.cloned()
	}

	/// Records a transaction the remote asked us to remember. Returns
	/// false if we already hold it, which the protocol treats as abuse.
	pub fn remember_tx(&self, tx: TxTemplate) -> bool {
		let mut state = self.state.write().unwrap();
		if state.remembered_txs.contains_key(&tx.txid)
			|| state.remembered_txs.values().any(|t| t.matches(&tx.txid))
		{
			return false;
		}
		state.remembered_txs.insert(tx.txid, tx);
		true
	}

	/// Drops remembered transactions by hash.
	pub fn forget_txs(&self, hashes: &[Hash]) {
		let mut state = self.state.write().unwrap();
		for h in hashes {
			if state.remembered_txs.remove(h).is_none() {
				if let Some(txid) = state
					.remembered_txs
					.values()
					.find(|t| t.matches(h))
					.map(|t| t.txid)
				{
					state.remembered_txs.remove(&txid);
				}
			}
		}
	}

	/// Our address and port as the remote reported them, once known.
	pub fn external_addr(&self) -> Option<(IpAddr, u16)> {
		let state = self.state.read().unwrap();
		match (state.external_addr, state.external_port) {
			(Some(a), Some(p)) => Some((a, p)),
			_ => None,
		}
	}

	fn send(&self, msg_type: Type, body: &dyn Writeable) -> Result<(), Error> {
		let guard = self.send_handle.lock().unwrap();
		match guard.as_ref() {
			Some(send) => send.send(msg_type, body),
			None => Err(Error::ConnectionClose),
		}
	}

	/// Sends our side of the handshake.
	pub fn send_version(&self, version: Version) -> Result<(), Error> {
		self.send(Type::Version, &version)
	}

	pub fn send_ping(&self) -> Result<(), Error> {
		self.send(Type::Ping, &Empty {})
	}

	pub fn send_pong(&self) -> Result<(), Error> {
		self.send(Type::Pong, &Empty {})
	}

	pub fn send_addrs(&self, addrs: Vec<NetAddress>) -> Result<(), Error> {
		self.send(Type::Addrs, &Addrs { addrs })
	}

	pub fn send_addr_me(&self, port: u16) -> Result<(), Error> {
		self.send(Type::AddrMe, &AddrMe { port })
	}

	pub fn send_get_addrs(&self, count: u32) -> Result<(), Error> {
		self.send(Type::GetAddrs, &GetAddrs { count })
	}

	pub fn send_have_tx(&self, hashes: Vec<Hash>) -> Result<(), Error> {
		self.send(Type::HaveTx, &TxHashes { hashes })
	}

	pub fn send_losing_tx(&self, hashes: Vec<Hash>) -> Result<(), Error> {
		self.send(Type::LosingTx, &TxHashes { hashes })
	}

	pub fn send_forget_tx(&self, hashes: Vec<Hash>, total_size: u64) -> Result<(), Error> {
		self.send(Type::ForgetTx, &ForgetTx { hashes, total_size })
	}

	pub fn send_remember_tx(&self, hashes: Vec<Hash>, txs: Vec<Vec<u8>>) -> Result<(), Error> {
		self.send(Type::RememberTx, &RememberTx { hashes, txs })
	}

	pub fn send_best_block(&self, header: Vec<u8>) -> Result<(), Error> {
		self.send(Type::BestBlock, &BestBlock { header })
	}

	pub fn send_shares(&self, shares: Vec<WrappedShare>) -> Result<(), Error> {
		self.send(Type::Shares, &Shares { shares })
	}

	pub fn send_share_req(&self, req: ShareReq) -> Result<(), Error> {
		self.send(Type::ShareReq, &req)
	}

	pub fn send_share_reply(&self, reply: ShareReply) -> Result<(), Error> {
		self.send(Type::ShareReply, &reply)
	}

	/// Protocol violation: log it, tell the coordinator and drop the
	/// connection.
	pub fn bad_peer(&self, reason: &str) {
		warn!("peer {}: {}", self.addr, reason);
		self.adapter.peer_bad(self.addr, reason);
		self.stop();
	}

	fn handle_version(&self, version: Version) -> Result<(), Error> {
		if self.adapter.is_own_nonce(version.nonce) {
			debug!("peer {} is ourselves, closing", self.addr);
			self.stop();
			return Ok(());
		}

		{
			let mut info = self.info.write().unwrap();
			info.version = version.version;
			info.services = version.services;
			info.user_agent = version.sub_version.clone();
			info.is_js2pool = version.sub_version.starts_with("js2pool");
			info.best_share_hash = version.best_share_hash;
		}
		{
			// addr_to is our own address, as seen from the other side
			let mut state = self.state.write().unwrap();
			state.external_addr = Some(version.addr_to.addr.ip());
			state.external_port = Some(version.addr_to.addr.port());
		}

		debug!(
			"peer {}: version {} agent {:?} best {}",
			self.addr, version.version, version.sub_version, version.best_share_hash
		);
		self.adapter.peer_version(self.addr, &version);
		Ok(())
	}

	fn handle_have_tx(&self, hashes: Vec<Hash>) {
		{
			let mut state = self.state.write().unwrap();
			// evict ahead of the insert; the fresh batch may overflow the
			// cap until the next have_tx arrives
			while state.remote_tx_hashes.len() >= MAX_REMOTE_TX_HASHES {
				state.remote_tx_hashes.pop_front();
			}
			for h in &hashes {
				if !state.remote_tx_hashes.contains(h) {
					state.remote_tx_hashes.push_back(*h);
				}
			}
		}
		self.adapter.have_tx_received(self.addr, hashes);
	}

	fn handle_losing_tx(&self, hashes: Vec<Hash>) {
		{
			let mut state = self.state.write().unwrap();
			state.remote_tx_hashes.retain(|h| !hashes.contains(h));
		}
		self.adapter.losing_tx_received(self.addr, hashes);
	}
}

impl MessageHandler for Peer {
	fn consume(&self, msg: Message) -> Result<(), Error> {
		match msg {
			Message::Unknown(cmd) => {
				debug!("peer {}: unknown command {:?}, ignoring", self.addr, cmd);
				Ok(())
			}
			Message::Version(version) => self.handle_version(version),
			Message::Ping => {
				// a legacy peer expects its pings echoed back, only
				// js2pool peers understand pong
				if self.is_js2pool() {
					self.send_pong()
				} else {
					self.send_ping()
				}
			}
			Message::Pong => Ok(()),
			Message::Addrs(addrs) => {
				self.adapter.addrs_received(self.addr, addrs.addrs);
				Ok(())
			}
			Message::AddrMe(addr_me) => {
				if addr_me.port != self.addr.port() {
					self.bad_peer("ports are not equal");
				} else {
					self.adapter.addr_me_received(self.addr, addr_me.port);
				}
				Ok(())
			}
			Message::GetAddrs(get) => {
				self.adapter.get_addrs_received(self.addr, get.count);
				Ok(())
			}
			Message::HaveTx(have) => {
				self.handle_have_tx(have.hashes);
				Ok(())
			}
			Message::LosingTx(losing) => {
				self.handle_losing_tx(losing.hashes);
				Ok(())
			}
			Message::ForgetTx(forget) => {
				self.forget_txs(&forget.hashes);
				self.adapter
					.forget_tx_received(self.addr, forget.hashes, forget.total_size);
				Ok(())
			}
			Message::RememberTx(remember) => {
				self.adapter.remember_tx_received(self.addr, remember);
				Ok(())
			}
			Message::BestBlock(best) => {
				self.adapter.best_block_received(self.addr, best.header);
				Ok(())
			}
			Message::Shares(shares) => {
				self.adapter.shares_received(self.addr, shares.shares);
				Ok(())
			}
			Message::ShareReq(req) => {
				self.adapter.share_req_received(self.addr, req);
				Ok(())
			}
			Message::ShareReply(reply) => {
				self.adapter.share_reply_received(self.addr, reply);
				Ok(())
			}
		}
	}

	fn disconnected(&self, reason: Option<Error>) {
		match &reason {
			Some(Error::BadMagic) => self.adapter.peer_bad(self.addr, "Bad magic number"),
			Some(Error::BadChecksum) => self.adapter.peer_bad(self.addr, "Bad checksum"),
			Some(Error::Serialization(e)) => {
				warn!("peer {}: undecodable payload: {}", self.addr, e);
				self.adapter.peer_bad(self.addr, "bad payload");
			}
			Some(Error::Timeout) => debug!("peer {}: idle timeout", self.addr),
			Some(e) => debug!("peer {}: connection error: {}", self.addr, e),
			None => {}
		}
		self.stop();
		// End exactly once per connection
		if self.connected.swap(false, Ordering::SeqCst) {
			self.adapter.peer_closed(self.addr);
		}
	}
}
