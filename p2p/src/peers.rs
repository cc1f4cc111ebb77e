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

//! The peer coordinator: tracks every connected peer, owns the shared
//! transaction views and the pending share-request set, reacts to chain
//! events with share requests and relays shares and inventory changes to
//! the whole pool.
//!
//! Lock discipline: peer-map guards are never held across a chain-store
//! lock acquisition; peers are cloned out and the guard released first.
//! Chain-event callbacks arrive while the chain lock is held and must not
//! call back into the chain.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};

use crate::chain::{ChainAdapter, Direction, Gap, ShareChain};
use crate::core::hash::{sha256, Hash};
use crate::core::share::{BaseShare, WrappedShare};
use crate::core::tx::{GetBlockTemplate, TxTemplate};
use crate::util::OneTime;

use crate::msg::{
	hash_to_id, id_to_hash, NetAddress, RememberTx, ShareReply, ShareReq, Version,
};
use crate::peer::Peer;
use crate::types::{
	BlockchainCodec, Error, P2pConfig, PoolAdapter, SharePersister, GAP_REQUEST_PEERS,
	HANDSHAKE_NONCES_CAP, MAX_KNOWN_TX_CACHES, PROTOCOL_VERSION, REPLY_PARENTS_JS2POOL,
	REPLY_PARENTS_LEGACY, REPLY_TOTAL_SHARES, REQUEST_PARENTS_JS2POOL, REQUEST_PARENTS_LEGACY,
	SHARE_REPLY_GOOD, SHARE_REPLY_UNKNOWN, USER_AGENT,
};

/// Coordinator of all peer connections and the node's shared views of
/// pending transactions.
pub struct Peers {
	config: P2pConfig,
	chain: Arc<RwLock<ShareChain>>,
	persister: Arc<dyn SharePersister>,
	blockchain: Arc<dyn BlockchainCodec>,
	peers: RwLock<HashMap<SocketAddr, Arc<Peer>>>,
	/// Transactions we are willing to describe to peers. Copy-on-write:
	/// every change swaps in a fresh map so observers can diff stable
	/// snapshots.
	known_txs: RwLock<Arc<HashMap<Hash, TxTemplate>>>,
	/// Subset of known txs currently in the block template we mine on.
	mining_txs: RwLock<Arc<HashMap<Hash, TxTemplate>>>,
	/// Removed-set snapshots of the last few known-tx changes, oldest
	/// first, to resolve references to recently evicted transactions.
	known_txs_caches: RwLock<VecDeque<HashMap<Hash, TxTemplate>>>,
	/// Keys of share requests sent and not yet answered.
	pending_share_reqs: RwLock<HashSet<Hash>>,
	/// Nonces of our outgoing handshakes, to recognize ourselves.
	nonces: RwLock<VecDeque<u64>>,
	calculatable: AtomicBool,
}

impl Peers {
	/// Builds a coordinator around the given chain store and external
	/// collaborators.
	pub fn new(
		config: P2pConfig,
		chain: Arc<RwLock<ShareChain>>,
		persister: Arc<dyn SharePersister>,
		blockchain: Arc<dyn BlockchainCodec>,
	) -> Peers {
		Peers {
			config,
			chain,
			persister,
			blockchain,
			peers: RwLock::new(HashMap::new()),
			known_txs: RwLock::new(Arc::new(HashMap::new())),
			mining_txs: RwLock::new(Arc::new(HashMap::new())),
			known_txs_caches: RwLock::new(VecDeque::new()),
			pending_share_reqs: RwLock::new(HashSet::new()),
			nonces: RwLock::new(VecDeque::with_capacity(HANDSHAKE_NONCES_CAP)),
			calculatable: AtomicBool::new(false),
		}
	}

	/// The chain store handle.
	pub fn chain(&self) -> Arc<RwLock<ShareChain>> {
		self.chain.clone()
	}

	/// Whether the chain ever reached payout-calculable length; the
	/// server starts accepting peers once this is set.
	pub fn is_calculatable(&self) -> bool {
		self.calculatable.load(Ordering::SeqCst)
	}

	/// Adds the peer to our internal peer mapping.
	pub fn add_connected(&self, peer: Arc<Peer>) {
		debug!("saving newly connected peer {}", peer.addr);
		let mut peers = self.peers.write().unwrap();
		peers.insert(peer.addr, peer);
	}

	/// Get a peer we're connected to by address.
	pub fn get_peer(&self, addr: &SocketAddr) -> Option<Arc<Peer>> {
		self.peers.read().unwrap().get(addr).cloned()
	}

	/// Drops a peer from the mapping, e.g. when its connection never came
	/// up or went away.
	pub fn remove_peer(&self, addr: &SocketAddr) {
		let mut peers = self.peers.write().unwrap();
		peers.remove(addr);
	}

	/// All connected peers. The guard is released before returning, so
	/// callers can take other locks freely.
	pub fn connected_peers(&self) -> Vec<Arc<Peer>> {
		self.peers.read().unwrap().values().cloned().collect()
	}

	/// Connected peers with js2pool-capable ones first, the order share
	/// requests prefer.
	pub fn peers_js2pool_first(&self) -> Vec<Arc<Peer>> {
		let mut peers = self.connected_peers();
		peers.sort_by_key(|p| !p.is_js2pool());
		peers
	}

	/// Number of peers we're currently connected to.
	pub fn peer_count(&self) -> u32 {
		self.peers.read().unwrap().len() as u32
	}

	/// Generate a new random nonce and store it in our ring buffer.
	pub fn next_nonce(&self) -> u64 {
		let nonce = thread_rng().gen();
		let mut nonces = self.nonces.write().unwrap();
		nonces.push_back(nonce);
		if nonces.len() >= HANDSHAKE_NONCES_CAP {
			nonces.pop_front();
		}
		nonce
	}

	/// Sends our version message to the given peer.
	pub fn hand_version(&self, peer: &Arc<Peer>) -> Result<(), Error> {
		let best_share_hash = self.chain.read().unwrap().newest_hash();
		let our_addr = SocketAddr::new(self.config.host, self.config.port);
		peer.send_version(Version {
			version: PROTOCOL_VERSION,
			services: 0,
			addr_to: NetAddress::from(peer.addr),
			addr_from: NetAddress::from(our_addr),
			nonce: self.next_nonce(),
			sub_version: USER_AGENT.to_string(),
			best_share_hash,
		})
	}

	/// Ping all our connected peers, keeping healthy links inside the
	/// idle timeout. This acts as a liveness test.
	pub fn check_all(&self) {
		for peer in self.connected_peers() {
			if peer.is_connected() {
				let _ = peer.send_ping();
			}
		}
	}

	/// Close every connection.
	pub fn stop_all(&self) {
		for peer in self.connected_peers() {
			peer.stop();
		}
	}

	/// Current known-transaction snapshot.
	pub fn known_txs(&self) -> Arc<HashMap<Hash, TxTemplate>> {
		self.known_txs.read().unwrap().clone()
	}

	/// Current mining-transaction snapshot.
	pub fn mining_txs(&self) -> Arc<HashMap<Hash, TxTemplate>> {
		self.mining_txs.read().unwrap().clone()
	}

	/// Replaces the known-tx view. Additions are announced with have_tx
	/// and removals with losing_tx to every peer; the removed set is
	/// cached for a while to answer stragglers referencing it.
	pub fn update_known_txs(&self, new_txs: HashMap<Hash, TxTemplate>) {
		let new_txs = Arc::new(new_txs);
		let old_txs = {
			let mut view = self.known_txs.write().unwrap();
			let old = view.clone();
			*view = new_txs.clone();
			old
		};

		let added: Vec<Hash> = new_txs
			.keys()
			.filter(|h| !old_txs.contains_key(*h))
			.cloned()
			.collect();
		let removed: HashMap<Hash, TxTemplate> = old_txs
			.iter()
			.filter(|(h, _)| !new_txs.contains_key(*h))
			.map(|(h, t)| (*h, t.clone()))
			.collect();

		if !added.is_empty() || !removed.is_empty() {
			debug!(
				"known txs: {} added, {} removed, {} total",
				added.len(),
				removed.len(),
				new_txs.len()
			);
		}

		for peer in self.connected_peers() {
			if !added.is_empty() {
				if let Err(e) = peer.send_have_tx(added.clone()) {
					debug!("error sending have_tx to {}: {:?}", peer.addr, e);
				}
			}
			if !removed.is_empty() {
				if let Err(e) = peer.send_losing_tx(removed.keys().cloned().collect()) {
					debug!("error sending losing_tx to {}: {:?}", peer.addr, e);
				}
			}
		}

		let mut caches = self.known_txs_caches.write().unwrap();
		caches.push_back(removed);
		while caches.len() > MAX_KNOWN_TX_CACHES {
			caches.pop_front();
		}
	}

	/// Replaces the mining-tx view. New template entries go out as
	/// remember_tx, split per peer into references it already heard of
	/// and inline bodies; dropped entries go out as forget_tx.
	pub fn update_mining_txs(&self, new_txs: HashMap<Hash, TxTemplate>) {
		let new_txs = Arc::new(new_txs);
		let old_txs = {
			let mut view = self.mining_txs.write().unwrap();
			let old = view.clone();
			*view = new_txs.clone();
			old
		};

		let added: Vec<TxTemplate> = new_txs
			.iter()
			.filter(|(h, _)| !old_txs.contains_key(*h))
			.map(|(_, t)| t.clone())
			.collect();
		let removed: Vec<&TxTemplate> = old_txs
			.values()
			.filter(|t| !new_txs.contains_key(&t.txid))
			.collect();
		let removed_hashes: Vec<Hash> = removed.iter().map(|t| t.txid).collect();
		let removed_size: u64 = removed.iter().map(|t| t.size() as u64).sum();

		for peer in self.connected_peers() {
			if !added.is_empty() {
				let mut hashes = vec![];
				let mut txs = vec![];
				for t in &added {
					if peer.knows_tx(&t.txid) || peer.knows_tx(&t.hash) {
						hashes.push(t.txid);
					} else {
						txs.push(t.data.clone());
					}
				}
				if let Err(e) = peer.send_remember_tx(hashes, txs) {
					debug!("error sending remember_tx to {}: {:?}", peer.addr, e);
				}
			}
			if !removed_hashes.is_empty() {
				if let Err(e) = peer.send_forget_tx(removed_hashes.clone(), removed_size) {
					debug!("error sending forget_tx to {}: {:?}", peer.addr, e);
				}
			}
		}
	}

	/// A fresh block template arrived from the mining-template feed:
	/// rebuild the mining view and fold its transactions into the known
	/// view.
	pub fn update_mining_template(&self, template: GetBlockTemplate) {
		let mining: HashMap<Hash, TxTemplate> = template
			.transactions
			.into_iter()
			.map(|t| (t.txid, t))
			.collect();
		self.update_mining_txs(mining.clone());

		let mut known = (*self.known_txs()).clone();
		known.extend(mining);
		self.update_known_txs(known);
	}

	/// Drops transactions the upstream chain no longer cares about, both
	/// from our known view (unless still mined on) and from every peer's
	/// remembered set.
	pub fn remove_deprecated_txs(&self, txs: &[Hash]) {
		let mining = self.mining_txs();
		let mut known = (*self.known_txs()).clone();
		for h in txs {
			if !mining.contains_key(h) {
				known.remove(h);
			}
		}
		self.update_known_txs(known);

		for peer in self.connected_peers() {
			peer.forget_txs(txs);
		}
	}

	/// Relays wrapped shares to every connected peer except the sender.
	pub fn broadcast_shares(&self, except: Option<SocketAddr>, shares: &[WrappedShare]) {
		let mut count = 0;
		for peer in self.connected_peers() {
			if Some(peer.addr) == except || !peer.is_connected() {
				continue;
			}
			if let Err(e) = peer.send_shares(shares.to_vec()) {
				debug!("error relaying shares to {}: {:?}", peer.addr, e);
			} else {
				count += 1;
			}
		}
		debug!("relayed {} share(s) to {} peer(s)", shares.len(), count);
	}

	/// Dedup key of a share request: sha256 over "descendent-length".
	fn request_key(descendent: &Hash, length: u32) -> Hash {
		sha256(format!("{}-{}", descendent.to_hex(), length).as_bytes())
	}

	/// Asks up to `GAP_REQUEST_PEERS` peers for the missing window below
	/// each gap's descendent, skipping gaps already in flight.
	fn send_share_requests(&self, mut gaps: Vec<Gap>) {
		let peers = self.peers_js2pool_first();
		if peers.is_empty() {
			debug!("gaps found but no peers to request from");
			return;
		}
		gaps.shuffle(&mut thread_rng());

		for gap in gaps {
			let key = Peers::request_key(&gap.descendent, gap.length);
			{
				let mut pending = self.pending_share_reqs.write().unwrap();
				if !pending.insert(key) {
					continue;
				}
			}
			let id = hash_to_id(&key);
			for peer in peers.iter().take(GAP_REQUEST_PEERS) {
				let parents = if peer.is_js2pool() {
					gap.length.min(REQUEST_PARENTS_JS2POOL)
				} else {
					gap.length.min(REQUEST_PARENTS_LEGACY)
				};
				let req = ShareReq {
					id: id.clone(),
					hashes: vec![gap.descendent],
					parents,
					stops: vec![],
				};
				if let Err(e) = peer.send_share_req(req) {
					debug!("error sending sharereq to {}: {:?}", peer.addr, e);
				}
			}
		}
	}

	/// Looks a transaction reference up in a template map, by map key
	/// first and then by either id the templates carry.
	fn lookup_tx(map: &HashMap<Hash, TxTemplate>, hash: &Hash) -> Option<TxTemplate> {
		if let Some(t) = map.get(hash) {
			return Some(t.clone());
		}
		map.values().find(|t| t.matches(hash)).cloned()
	}
}

impl ChainAdapter for Peers {
	fn gaps_found(&self, gaps: Vec<Gap>) {
		debug!("{} gap(s) reported by the chain", gaps.len());
		self.send_share_requests(gaps);
	}

	fn orphans_found(&self, orphans: Vec<Arc<BaseShare>>) {
		info!("{} share(s) orphaned", orphans.len());
	}

	fn dead_share_arrived(&self, share: Arc<BaseShare>) {
		debug!("dead share {} arrived, ignored", share.hash);
	}

	fn candidate_arrived(&self, share: Arc<BaseShare>) {
		debug!("candidate {} arrived at the tip height", share.hash);
	}

	fn newest_changed(&self, share: Arc<BaseShare>) {
		info!("share-chain tip is now {} at {}", share.hash, share.height());
	}

	fn chain_calculatable(&self) {
		info!("share-chain is calculatable, accepting peers");
		self.calculatable.store(true, Ordering::SeqCst);
	}
}

impl PoolAdapter for Peers {
	fn is_own_nonce(&self, nonce: u64) -> bool {
		self.nonces.read().unwrap().contains(&nonce)
	}

	fn peer_version(&self, addr: SocketAddr, version: &Version) {
		let peer = match self.get_peer(&addr) {
			Some(p) => p,
			None => return,
		};

		// describe our whole inventory to the new peer
		let known = self.known_txs();
		if let Err(e) = peer.send_have_tx(known.keys().cloned().collect()) {
			debug!("error sending have_tx to {}: {:?}", addr, e);
			return;
		}

		// and push the current mining set, inline except what it already
		// advertised
		let mining = self.mining_txs();
		let mut hashes = vec![];
		let mut txs = vec![];
		for t in mining.values() {
			if peer.knows_tx(&t.txid) || peer.knows_tx(&t.hash) {
				hashes.push(t.txid);
			} else {
				txs.push(t.data.clone());
			}
		}
		if let Err(e) = peer.send_remember_tx(hashes, txs) {
			debug!("error sending remember_tx to {}: {:?}", addr, e);
			return;
		}

		// chase the peer's best share unless it has none or we hold it
		if version.best_share_hash.is_zero() {
			return;
		}
		if self
			.chain
			.read()
			.unwrap()
			.contains(&version.best_share_hash)
		{
			return;
		}
		let key = Peers::request_key(&version.best_share_hash, 1);
		{
			let mut pending = self.pending_share_reqs.write().unwrap();
			if !pending.insert(key) {
				return;
			}
		}
		let req = ShareReq {
			id: hash_to_id(&key),
			hashes: vec![version.best_share_hash],
			parents: 1,
			stops: vec![],
		};
		if let Err(e) = peer.send_share_req(req) {
			debug!("error requesting best share from {}: {:?}", addr, e);
		}
	}

	fn addrs_received(&self, addr: SocketAddr, addrs: Vec<NetAddress>) {
		// peer discovery is outside the core, the list is informational
		debug!("peer {} sent {} addr(s)", addr, addrs.len());
	}

	fn addr_me_received(&self, addr: SocketAddr, port: u16) {
		debug!("peer {} confirmed reaching us on port {}", addr, port);
	}

	fn get_addrs_received(&self, addr: SocketAddr, count: u32) {
		let peer = match self.get_peer(&addr) {
			Some(p) => p,
			None => return,
		};
		let addrs: Vec<NetAddress> = self
			.connected_peers()
			.iter()
			.filter(|p| p.addr != addr)
			.take(count as usize)
			.map(|p| NetAddress::from(p.addr))
			.collect();
		if let Err(e) = peer.send_addrs(addrs) {
			debug!("error sending addrs to {}: {:?}", addr, e);
		}
	}

	fn have_tx_received(&self, addr: SocketAddr, hashes: Vec<Hash>) {
		trace!("peer {} advertised {} tx(s)", addr, hashes.len());
	}

	fn losing_tx_received(&self, addr: SocketAddr, hashes: Vec<Hash>) {
		trace!("peer {} dropped {} tx(s)", addr, hashes.len());
	}

	fn forget_tx_received(&self, addr: SocketAddr, hashes: Vec<Hash>, total_size: u64) {
		trace!(
			"peer {} released {} remembered tx(s), {} bytes",
			addr,
			hashes.len(),
			total_size
		);
	}

	fn remember_tx_received(&self, addr: SocketAddr, msg: RememberTx) {
		let peer = match self.get_peer(&addr) {
			Some(p) => p,
			None => return,
		};

		let known = self.known_txs();
		for h in &msg.hashes {
			if peer.remembered_tx(h).is_some() {
				peer.bad_peer("peer referenced duplicate remembered transaction");
				return;
			}
			let resolved = Peers::lookup_tx(&known, h).or_else(|| {
				let caches = self.known_txs_caches.read().unwrap();
				caches.iter().find_map(|c| Peers::lookup_tx(c, h))
			});
			match resolved {
				Some(tx) => {
					peer.remember_tx(tx);
				}
				None => {
					peer.bad_peer("peer referenced unknown transaction to remember");
					return;
				}
			}
		}

		let mut added = HashMap::new();
		for raw in &msg.txs {
			let txid = self.blockchain.tx_hash(raw);
			let tx = TxTemplate {
				txid,
				hash: txid,
				data: raw.clone(),
			};
			if !peer.remember_tx(tx.clone()) {
				peer.bad_peer("peer sent duplicate transaction to remember");
				return;
			}
			added.insert(txid, tx);
		}
		if !added.is_empty() {
			let mut known = (*self.known_txs()).clone();
			known.extend(added);
			self.update_known_txs(known);
		}
	}

	fn best_block_received(&self, addr: SocketAddr, raw_header: Vec<u8>) {
		match self.blockchain.decode_header(&raw_header) {
			Ok(header) => debug!("peer {} announced best block {}", addr, header.hash),
			Err(_) => {
				if let Some(peer) = self.get_peer(&addr) {
					peer.bad_peer("undecodable block header");
				}
			}
		}
	}

	fn shares_received(&self, addr: SocketAddr, wrapped: Vec<WrappedShare>) {
		let sender = match self.get_peer(&addr) {
			Some(p) => p,
			None => return,
		};

		let mut decoded = vec![];
		for w in &wrapped {
			match BaseShare::from_wrapped(w) {
				Ok(s) => decoded.push(Arc::new(s)),
				Err(e) => {
					debug!("peer {} sent undecodable share: {}", addr, e);
				}
			}
		}
		if decoded.is_empty() {
			return;
		}
		{
			let chain = self.chain.read().unwrap();
			if decoded.iter().all(|s| chain.contains(&s.hash)) {
				return;
			}
		}

		// resolve every transaction the new shares reference for the
		// first time, collecting templates we learn along the way
		let known = self.known_txs();
		let mining = self.mining_txs();
		let mut learned: HashMap<Hash, TxTemplate> = HashMap::new();
		for share in decoded.iter().filter(|s| s.validity) {
			for h in &share.info.new_transaction_hashes {
				if Peers::lookup_tx(&known, h).is_some() || learned.contains_key(h) {
					continue;
				}
				if let Some(tx) = sender.remembered_tx(h) {
					learned.insert(tx.txid, tx);
					continue;
				}
				if Peers::lookup_tx(&mining, h).is_some() {
					continue;
				}
				if sender.knows_tx(h) {
					continue;
				}
				let cached = {
					let caches = self.known_txs_caches.read().unwrap();
					caches.iter().find_map(|c| Peers::lookup_tx(c, h))
				};
				match cached {
					Some(tx) => {
						learned.insert(tx.txid, tx);
					}
					None => {
						warn!("peer {} referenced unknown transaction {}", addr, h);
						break;
					}
				}
			}
		}

		{
			let mut chain = self.chain.write().unwrap();
			for share in &decoded {
				chain.append(share.clone());
			}
		}

		if !learned.is_empty() {
			let mut known = (*self.known_txs()).clone();
			known.extend(learned);
			self.update_known_txs(known);
		}

		self.broadcast_shares(Some(addr), &wrapped);

		self.chain.write().unwrap().verify();
	}

	fn share_req_received(&self, addr: SocketAddr, req: ShareReq) {
		let peer = match self.get_peer(&addr) {
			Some(p) => p,
			None => return,
		};

		let mut found = vec![];
		if !req.hashes.is_empty() {
			let per_hash = REPLY_TOTAL_SHARES / req.hashes.len() as u32;
			let cap = if peer.is_js2pool() {
				REPLY_PARENTS_JS2POOL
			} else {
				REPLY_PARENTS_LEGACY
			};
			let parents_limit = req.parents.min(per_hash).min(cap);
			let stops: HashSet<Hash> = req.stops.iter().cloned().collect();

			let chain = self.chain.read().unwrap();
			for hash in &req.hashes {
				for share in chain.subchain(*hash, parents_limit, Direction::Backward) {
					if stops.contains(&share.hash) {
						break;
					}
					found.push(share);
				}
			}
		}

		let mut shares = vec![];
		for s in &found {
			match s.to_wrapped() {
				Ok(w) => shares.push(w),
				Err(e) => debug!("failed to wrap share {}: {}", s.hash, e),
			}
		}
		let result = if shares.is_empty() {
			SHARE_REPLY_UNKNOWN
		} else {
			SHARE_REPLY_GOOD
		};
		let reply = ShareReply {
			id: req.id,
			result,
			shares,
		};
		if let Err(e) = peer.send_share_reply(reply) {
			debug!("error sending sharereply to {}: {:?}", addr, e);
		}
	}

	fn share_reply_received(&self, addr: SocketAddr, reply: ShareReply) {
		if reply.result != SHARE_REPLY_GOOD {
			warn!(
				"peer {} answered share request with result {}",
				addr, reply.result
			);
			self.chain.write().unwrap().check_gaps();
			return;
		}

		let fresh: Vec<Arc<BaseShare>> = {
			let chain = self.chain.read().unwrap();
			reply
				.shares
				.iter()
				.filter_map(|w| BaseShare::from_wrapped(w).ok())
				.filter(|s| s.validity && !chain.contains(&s.hash))
				.map(Arc::new)
				.collect()
		};

		if fresh.is_empty() {
			self.chain.write().unwrap().fix();
			return;
		}

		{
			let mut chain = self.chain.write().unwrap();
			for share in &fresh {
				chain.append(share.clone());
			}
		}
		self.persister.save_shares(&fresh);

		if let Some(key) = id_to_hash(&reply.id) {
			self.pending_share_reqs.write().unwrap().remove(&key);
		}

		let mut chain = self.chain.write().unwrap();
		chain.check_gaps();
		chain.verify();
	}

	fn peer_bad(&self, addr: SocketAddr, reason: &str) {
		warn!("bad peer {}: {}", addr, reason);
	}

	fn peer_closed(&self, addr: SocketAddr) {
		debug!("peer {} disconnected", addr);
		self.remove_peer(&addr);
	}
}

/// Chain adapter handed to the store at construction, forwarding events
/// to the coordinator once it exists. Breaks the store/coordinator
/// construction cycle with a weak reference initialized after both ends
/// are built.
pub struct PoolChainAdapter {
	peers: OneTime<Weak<Peers>>,
}

impl PoolChainAdapter {
	/// An uninitialized adapter; call `init` once the coordinator exists.
	pub fn new() -> PoolChainAdapter {
		PoolChainAdapter {
			peers: OneTime::new(),
		}
	}

	/// Wires the adapter to the coordinator.
	pub fn init(&self, peers: Weak<Peers>) {
		self.peers.init(peers)
	}

	fn peers(&self) -> Option<Arc<Peers>> {
		if !self.peers.is_init() {
			return None;
		}
		self.peers.borrow().upgrade()
	}
}

impl ChainAdapter for PoolChainAdapter {
	fn gaps_found(&self, gaps: Vec<Gap>) {
		if let Some(p) = self.peers() {
			p.gaps_found(gaps)
		}
	}
	fn orphans_found(&self, orphans: Vec<Arc<BaseShare>>) {
		if let Some(p) = self.peers() {
			p.orphans_found(orphans)
		}
	}
	fn dead_share_arrived(&self, share: Arc<BaseShare>) {
		if let Some(p) = self.peers() {
			p.dead_share_arrived(share)
		}
	}
	fn candidate_arrived(&self, share: Arc<BaseShare>) {
		if let Some(p) = self.peers() {
			p.candidate_arrived(share)
		}
	}
	fn newest_changed(&self, share: Arc<BaseShare>) {
		if let Some(p) = self.peers() {
			p.newest_changed(share)
		}
	}
	fn chain_calculatable(&self) {
		if let Some(p) = self.peers() {
			p.chain_calculatable()
		}
	}
}
