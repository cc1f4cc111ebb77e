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

//! Common test helpers: a scripted wire-level client speaking the raw
//! frame format, and a fully assembled node (chain + server) to talk to.

#![allow(dead_code)]

use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use rs2pool_chain::{ShareChain, BASE_CHAIN_LENGTH};
use rs2pool_core::hash::{sha256d, Hash, ZERO_HASH};
use rs2pool_core::ser::Writeable;
use rs2pool_core::share::BaseShare;
use rs2pool_p2p::msg::{
	decode_message, write_message, Message, MsgHeaderWrapper, Type, Version,
	PROTOCOL_HEAD_LENGTH,
};
use rs2pool_p2p::{
	NoopPersister, P2pConfig, PoolChainAdapter, Server, Sha2dCodec, DEFAULT_MAGIC,
};

/// use port 0 to allow the OS to assign an open port, TcpListener's Drop
/// impl will unbind the port as soon as listener goes out of scope
pub fn open_port() -> u16 {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	listener.local_addr().unwrap().port()
}

/// A valid share with a hash derived from the seed string.
pub fn share(seed: &str, height: u32, previous: Hash) -> Arc<BaseShare> {
	Arc::new(BaseShare::new(
		sha256d(seed.as_bytes()),
		previous,
		height,
		1_600_000_000 + u64::from(height) * 10,
		100,
		10,
		vec![],
	))
}

/// A node under test: a calculatable share-chain wired to a running
/// server, listening on a loopback port.
pub struct TestNode {
	pub server: Arc<Server>,
	pub chain: Arc<RwLock<ShareChain>>,
	pub addr: SocketAddr,
	pub shares: Vec<Arc<BaseShare>>,
}

impl TestNode {
	/// Builds a chain long enough to be calculatable, starts the server
	/// and waits until it accepts connections.
	pub fn start() -> TestNode {
		let config = P2pConfig {
			host: "127.0.0.1".parse().unwrap(),
			port: open_port(),
			..Default::default()
		};

		let adapter = Arc::new(PoolChainAdapter::new());
		let chain = Arc::new(RwLock::new(ShareChain::new(adapter.clone())));
		let server = Arc::new(Server::new(
			config,
			chain.clone(),
			Arc::new(NoopPersister {}),
			Arc::new(Sha2dCodec {}),
		));
		adapter.init(Arc::downgrade(&server.peers));

		// assemble a full verified window so the server starts listening
		let mut shares = vec![];
		{
			let mut chain = chain.write().unwrap();
			let mut previous = ZERO_HASH;
			for height in 0..BASE_CHAIN_LENGTH {
				let s = share(&format!("share-{}", height), height, previous);
				previous = s.hash;
				assert!(chain.append(s.clone()));
				shares.push(s);
			}
			assert!(chain.verify());
		}
		assert!(server.peers.is_calculatable());

		let srv = server.clone();
		thread::spawn(move || srv.listen().unwrap());

		let addr = SocketAddr::new(config.host, config.port);
		TestNode {
			server,
			chain,
			addr,
			shares,
		}
	}

	pub fn tip(&self) -> Arc<BaseShare> {
		self.shares.last().unwrap().clone()
	}
}

impl Drop for TestNode {
	fn drop(&mut self) {
		self.server.stop();
	}
}

/// A bare wire-level client: frames and parses messages by hand, which
/// doubles as an independent check of the frame layout.
pub struct TestClient {
	pub stream: TcpStream,
	pub magic: [u8; 8],
}

impl TestClient {
	/// Connects to the node, retrying while the server finishes binding.
	pub fn connect(addr: &SocketAddr) -> TestClient {
		for _ in 0..100 {
			if let Ok(stream) = TcpStream::connect_timeout(addr, Duration::from_millis(100)) {
				stream
					.set_read_timeout(Some(Duration::from_secs(5)))
					.unwrap();
				return TestClient {
					stream,
					magic: DEFAULT_MAGIC,
				};
			}
			thread::sleep(Duration::from_millis(20));
		}
		panic!("could not connect to test node at {}", addr);
	}

	pub fn send(&mut self, msg_type: Type, body: &dyn Writeable) {
		write_message(&mut self.stream, msg_type, body, &self.magic).unwrap();
	}

	/// Reads exactly one frame off the wire.
	pub fn read_msg(&mut self) -> Message {
		let mut head = [0u8; PROTOCOL_HEAD_LENGTH];
		self.stream.read_exact(&mut head).unwrap();
		let header = match MsgHeaderWrapper::decode(&head, &self.magic).unwrap() {
			MsgHeaderWrapper::Known(h) => h,
			MsgHeaderWrapper::Unknown(_, cmd) => panic!("unexpected unknown command {:?}", cmd),
		};
		let mut payload = vec![0u8; header.msg_len as usize];
		self.stream.read_exact(&mut payload).unwrap();
		decode_message(&header, &payload).unwrap()
	}

	/// Next message that isn't one of the liveness pings the server
	/// sprinkles in.
	pub fn next_msg(&mut self) -> Message {
		loop {
			match self.read_msg() {
				Message::Ping | Message::Pong => continue,
				msg => return msg,
			}
		}
	}

	/// Performs our half of the handshake and drains the node's version.
	pub fn handshake(&mut self, best_share_hash: Hash) -> Version {
		let local = self.stream.local_addr().unwrap();
		let remote = self.stream.peer_addr().unwrap();
		self.send(
			Type::Version,
			&Version {
				version: 1700,
				services: 0,
				addr_to: remote.into(),
				addr_from: local.into(),
				nonce: rand::random(),
				sub_version: "js2pool-test 0.1".to_string(),
				best_share_hash,
			},
		);
		match self.next_msg() {
			Message::Version(v) => v,
			other => panic!("expected version, got {:?}", other),
		}
	}

	/// Asserts that nothing but liveness traffic arrives for a while.
	pub fn expect_quiet(&mut self, wait: Duration) {
		self.stream.set_read_timeout(Some(wait)).unwrap();
		let mut head = [0u8; PROTOCOL_HEAD_LENGTH];
		loop {
			match self.stream.read_exact(&mut head) {
				Err(_) => break,
				Ok(()) => {
					let header = MsgHeaderWrapper::decode(&head, &self.magic).unwrap();
					match header {
						MsgHeaderWrapper::Known(h) => {
							let mut payload = vec![0u8; h.msg_len as usize];
							self.stream.read_exact(&mut payload).unwrap();
							match decode_message(&h, &payload).unwrap() {
								Message::Ping | Message::Pong => continue,
								msg => panic!("expected quiet wire, got {:?}", msg),
							}
						}
						MsgHeaderWrapper::Unknown(_, cmd) => {
							panic!("expected quiet wire, got command {:?}", cmd)
						}
					}
				}
			}
		}
		self.stream
			.set_read_timeout(Some(Duration::from_secs(5)))
			.unwrap();
	}
}
