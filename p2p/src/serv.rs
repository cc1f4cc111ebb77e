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

//! P2P server implementation: receives connections from other peers,
//! dials the seed list and keeps track of all of them through the
//! coordinator.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use crate::chain::ShareChain;

use crate::peer::Peer;
use crate::peers::Peers;
use crate::types::{BlockchainCodec, Error, P2pConfig, SharePersister};

/// Cadence of the liveness pings the monitor thread sends. Half the idle
/// timeout, so a healthy link never goes quiet long enough to be dropped.
const PING_INTERVAL: Duration = Duration::from_secs(5);

/// P2P server, handling incoming connections and outgoing dials. Does
/// not accept peers until the share-chain has assembled far enough to be
/// calculatable.
pub struct Server {
	config: P2pConfig,
	/// The peer coordinator.
	pub peers: Arc<Peers>,
	stop: Arc<AtomicBool>,
}

impl Server {
	/// Creates a new idle p2p server with no peers.
	pub fn new(
		config: P2pConfig,
		chain: Arc<RwLock<ShareChain>>,
		persister: Arc<dyn SharePersister>,
		blockchain: Arc<dyn BlockchainCodec>,
	) -> Server {
		Server {
			config,
			peers: Arc::new(Peers::new(config, chain, persister, blockchain)),
			stop: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Starts the liveness monitor, waits for the chain to become
	/// calculatable, then binds and accepts incoming connections until
	/// stopped. Blocking; a bind failure is fatal and returned.
	pub fn listen(&self) -> Result<(), Error> {
		// liveness monitor, pinging all peers well inside the idle timeout
		let peers = self.peers.clone();
		let stop = self.stop.clone();
		let _ = thread::Builder::new()
			.name("p2p-monitor".to_string())
			.spawn(move || loop {
				if stop.load(Ordering::Relaxed) {
					break;
				}
				peers.check_all();
				thread::sleep(PING_INTERVAL);
			});

		// the node does not serve peers while its own chain is still
		// being assembled
		while !self.peers.is_calculatable() {
			if self.stop.load(Ordering::Relaxed) {
				return Ok(());
			}
			thread::sleep(Duration::from_millis(50));
		}

		let addr = SocketAddr::new(self.config.host, self.config.port);
		let listener = TcpListener::bind(addr).map_err(Error::Connection)?;
		listener.set_nonblocking(true).map_err(Error::Connection)?;
		info!("p2p server listening on {}", addr);

		let sleep_time = Duration::from_millis(5);
		loop {
			match listener.accept() {
				Ok((stream, peer_addr)) => {
					if self.peers.peer_count() >= self.config.max_conn {
						debug!("peer limit reached, refusing {}", peer_addr);
						let _ = stream.shutdown(Shutdown::Both);
					} else if let Err(e) = self.handle_new_peer(stream, peer_addr) {
						debug!("error accepting peer {}: {:?}", peer_addr, e);
					}
				}
				Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
					// nothing to do, retry on the next iteration
				}
				Err(e) => {
					warn!("couldn't establish new client connection: {:?}", e);
				}
			}
			if self.stop.load(Ordering::Relaxed) {
				break;
			}
			thread::sleep(sleep_time);
		}
		Ok(())
	}

	/// Asks the server to connect to a new peer. Directly returns the
	/// peer if we're already connected to the provided address.
	pub fn connect(&self, addr: &SocketAddr) -> Result<Arc<Peer>, Error> {
		if let Some(p) = self.peers.get_peer(addr) {
			debug!("connect: already connected to {}", addr);
			return Ok(p);
		}

		debug!("connect: connecting to {}", addr);
		let stream =
			TcpStream::connect_timeout(addr, Duration::from_secs(10)).map_err(Error::Connection)?;
		let peer = Arc::new(Peer::new(*addr, self.config.magic, self.peers.clone()));
		// register before the reader thread runs so the peer's first
		// messages find it in the map
		self.peers.add_connected(peer.clone());
		if let Err(e) = peer.start(stream).and_then(|_| self.peers.hand_version(&peer)) {
			self.peers.remove_peer(addr);
			return Err(e);
		}
		Ok(peer)
	}

	/// Dials every seed address, logging failures and moving on.
	pub fn init_peers(&self, addrs: &[SocketAddr]) {
		for addr in addrs {
			if let Err(e) = self.connect(addr) {
				warn!("could not connect to seed peer {}: {:?}", addr, e);
			}
		}
	}

	fn handle_new_peer(&self, stream: TcpStream, peer_addr: SocketAddr) -> Result<(), Error> {
		let peer = Arc::new(Peer::new(peer_addr, self.config.magic, self.peers.clone()));
		// register before the reader thread runs so the peer's first
		// messages find it in the map
		self.peers.add_connected(peer.clone());
		if let Err(e) = peer.start(stream).and_then(|_| self.peers.hand_version(&peer)) {
			self.peers.remove_peer(&peer_addr);
			return Err(e);
		}
		Ok(())
	}

	/// Stops the server and every connection.
	pub fn stop(&self) {
		self.stop.store(true, Ordering::Relaxed);
		self.peers.stop_all();
	}
}
