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

//! End-to-end scenarios against a live node: handshake, transaction
//! inventory, share requests and share relay, all through real sockets.

mod common;

use std::time::Duration;

use num_bigint::BigUint;

use rs2pool_core::hash::{sha256d, Hash, ZERO_HASH};
use rs2pool_core::share::BaseShare;
use rs2pool_core::tx::{GetBlockTemplate, TxTemplate};
use rs2pool_p2p::msg::{Message, ShareReq, Shares, Type};

use crate::common::{share, TestClient, TestNode};

fn tx(seed: &str) -> TxTemplate {
	let data = seed.as_bytes().to_vec();
	let txid = sha256d(&data);
	TxTemplate {
		txid,
		hash: txid,
		data,
	}
}

fn sorted(mut hashes: Vec<Hash>) -> Vec<Hash> {
	hashes.sort();
	hashes
}

#[test]
fn handshake_with_empty_node_inventory() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);

	let their_version = client.handshake(ZERO_HASH);
	assert!(their_version.sub_version.starts_with("js2pool"));
	assert_eq!(their_version.best_share_hash, node.tip().hash);

	// the node describes its (empty) inventory...
	match client.next_msg() {
		Message::HaveTx(m) => assert!(m.hashes.is_empty()),
		other => panic!("expected have_tx, got {:?}", other),
	}
	// ...and its (empty) mining set
	match client.next_msg() {
		Message::RememberTx(m) => {
			assert!(m.hashes.is_empty());
			assert!(m.txs.is_empty());
		}
		other => panic!("expected remember_tx, got {:?}", other),
	}
	// a zero best-share-hash must not trigger a share request
	client.expect_quiet(Duration::from_millis(300));
}

#[test]
fn nonzero_best_share_hash_is_chased() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);

	let best = sha256d(b"a-share-the-node-does-not-have");
	client.handshake(best);
	client.next_msg(); // have_tx
	client.next_msg(); // remember_tx
	match client.next_msg() {
		Message::ShareReq(req) => {
			assert_eq!(req.hashes, vec![best]);
			assert_eq!(req.parents, 1);
			assert!(req.stops.is_empty());
		}
		other => panic!("expected sharereq, got {:?}", other),
	}
}

#[test]
fn known_tx_diff_broadcasts_once_per_peer() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);
	client.handshake(ZERO_HASH);
	client.next_msg(); // have_tx
	client.next_msg(); // remember_tx

	let (a, b, c) = (tx("tx-a"), tx("tx-b"), tx("tx-c"));

	let mut known = std::collections::HashMap::new();
	known.insert(a.txid, a.clone());
	known.insert(b.txid, b.clone());
	node.server.peers.update_known_txs(known.clone());

	match client.next_msg() {
		Message::HaveTx(m) => {
			assert_eq!(sorted(m.hashes), sorted(vec![a.txid, b.txid]));
		}
		other => panic!("expected have_tx, got {:?}", other),
	}

	// {a, b} -> {b, c}: one have_tx for c, one losing_tx for a
	let mut known = std::collections::HashMap::new();
	known.insert(b.txid, b.clone());
	known.insert(c.txid, c.clone());
	node.server.peers.update_known_txs(known);

	match client.next_msg() {
		Message::HaveTx(m) => assert_eq!(m.hashes, vec![c.txid]),
		other => panic!("expected have_tx, got {:?}", other),
	}
	match client.next_msg() {
		Message::LosingTx(m) => assert_eq!(m.hashes, vec![a.txid]),
		other => panic!("expected losing_tx, got {:?}", other),
	}
	client.expect_quiet(Duration::from_millis(200));
}

#[test]
fn mining_template_update_pushes_remember_and_have() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);
	client.handshake(ZERO_HASH);
	client.next_msg(); // have_tx
	client.next_msg(); // remember_tx

	let d = tx("tx-d");
	node.server.peers.update_mining_template(GetBlockTemplate {
		transactions: vec![d.clone()],
	});

	// we never advertised d, so it arrives inline
	match client.next_msg() {
		Message::RememberTx(m) => {
			assert!(m.hashes.is_empty());
			assert_eq!(m.txs, vec![d.data.clone()]);
		}
		other => panic!("expected remember_tx, got {:?}", other),
	}
	match client.next_msg() {
		Message::HaveTx(m) => assert_eq!(m.hashes, vec![d.txid]),
		other => panic!("expected have_tx, got {:?}", other),
	}

	// mining view projection
	let mining = node.server.peers.mining_txs();
	assert_eq!(mining.len(), 1);
	assert!(mining.contains_key(&d.txid));
	assert!(node.server.peers.known_txs().contains_key(&d.txid));
}

#[test]
fn chain_gap_triggers_share_request() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);
	client.handshake(ZERO_HASH);
	client.next_msg(); // have_tx
	client.next_msg(); // remember_tx

	// a tip two heights up leaves a one-length hole below it
	let tip = node.tip();
	let orphan_tip = share("gapped", tip.height() + 2, sha256d(b"unseen-parent"));
	node.chain.write().unwrap().append(orphan_tip.clone());

	match client.next_msg() {
		Message::ShareReq(req) => {
			assert_eq!(req.hashes, vec![orphan_tip.hash]);
			// gap length 1, capped well below the js2pool bound
			assert_eq!(req.parents, 1);
		}
		other => panic!("expected sharereq, got {:?}", other),
	}

	// a full scan measures the same hole from the next present height
	node.chain.read().unwrap().check_gaps();
	match client.next_msg() {
		Message::ShareReq(req) => {
			assert_eq!(req.hashes, vec![orphan_tip.hash]);
			assert_eq!(req.parents, 2);
		}
		other => panic!("expected sharereq, got {:?}", other),
	}

	// while unanswered, the same (descendent, length) is not re-requested
	node.chain.read().unwrap().check_gaps();
	client.expect_quiet(Duration::from_millis(300));
}

#[test]
fn share_reply_ingests_fresh_shares() {
	use rs2pool_p2p::msg::{hash_to_id, ShareReply};
	use rs2pool_p2p::PoolAdapter;

	let node = TestNode::start();
	let from: std::net::SocketAddr = "127.0.0.1:1".parse().unwrap();

	let tip = node.tip();
	let next = share("from-reply", tip.height() + 1, tip.hash);
	let reply = ShareReply {
		id: hash_to_id(&sha256d(b"some-request")),
		result: 0,
		shares: vec![next.to_wrapped().unwrap()],
	};
	node.server.peers.share_reply_received(from, reply);
	assert_eq!(node.chain.read().unwrap().newest_hash(), next.hash);

	// a failed reply only triggers a rescan
	let failed = ShareReply {
		id: hash_to_id(&sha256d(b"other-request")),
		result: 2,
		shares: vec![],
	};
	node.server.peers.share_reply_received(from, failed);
	assert_eq!(node.chain.read().unwrap().newest_hash(), next.hash);

	// replaying only known shares falls through to the fix pass
	let stale = ShareReply {
		id: hash_to_id(&sha256d(b"stale-request")),
		result: 0,
		shares: vec![next.to_wrapped().unwrap()],
	};
	node.server.peers.share_reply_received(from, stale);
	assert_eq!(
		node.chain.read().unwrap().total_shares(),
		node.shares.len() + 1
	);
}

#[test]
fn share_request_walks_backward() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);
	client.handshake(ZERO_HASH);
	client.next_msg(); // have_tx
	client.next_msg(); // remember_tx

	let tip = node.tip();
	client.send(
		Type::ShareReq,
		&ShareReq {
			id: BigUint::from(99u32),
			hashes: vec![tip.hash],
			parents: 3,
			stops: vec![],
		},
	);

	match client.next_msg() {
		Message::ShareReply(reply) => {
			assert_eq!(reply.id, BigUint::from(99u32));
			assert_eq!(reply.result, 0);
			assert_eq!(reply.shares.len(), 3);
			let decoded: Vec<BaseShare> = reply
				.shares
				.iter()
				.map(|w| BaseShare::from_wrapped(w).unwrap())
				.collect();
			assert_eq!(decoded[0].hash, tip.hash);
			// backward order, parent linked
			assert_eq!(decoded[1].hash, decoded[0].previous_hash());
			assert_eq!(decoded[2].hash, decoded[1].previous_hash());
		}
		other => panic!("expected sharereply, got {:?}", other),
	}
}

#[test]
fn share_request_honours_stops() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);
	client.handshake(ZERO_HASH);
	client.next_msg(); // have_tx
	client.next_msg(); // remember_tx

	let tip = node.tip();
	let stop = node.shares[node.shares.len() - 3].hash;
	client.send(
		Type::ShareReq,
		&ShareReq {
			id: BigUint::from(7u32),
			hashes: vec![tip.hash],
			parents: 10,
			stops: vec![stop],
		},
	);

	match client.next_msg() {
		Message::ShareReply(reply) => {
			assert_eq!(reply.result, 0);
			// the walk stops right before the stop hash
			assert_eq!(reply.shares.len(), 2);
		}
		other => panic!("expected sharereply, got {:?}", other),
	}
}

#[test]
fn empty_share_request_yields_result_2() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);
	client.handshake(ZERO_HASH);
	client.next_msg(); // have_tx
	client.next_msg(); // remember_tx

	client.send(
		Type::ShareReq,
		&ShareReq {
			id: BigUint::from(1u32),
			hashes: vec![],
			parents: 5,
			stops: vec![],
		},
	);

	match client.next_msg() {
		Message::ShareReply(reply) => {
			assert_eq!(reply.result, 2);
			assert!(reply.shares.is_empty());
		}
		other => panic!("expected sharereply, got {:?}", other),
	}
}

#[test]
fn unknown_hash_share_request_yields_result_2() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);
	client.handshake(ZERO_HASH);
	client.next_msg(); // have_tx
	client.next_msg(); // remember_tx

	client.send(
		Type::ShareReq,
		&ShareReq {
			id: BigUint::from(2u32),
			hashes: vec![sha256d(b"never-seen")],
			parents: 5,
			stops: vec![],
		},
	);

	match client.next_msg() {
		Message::ShareReply(reply) => {
			assert_eq!(reply.result, 2);
			assert!(reply.shares.is_empty());
		}
		other => panic!("expected sharereply, got {:?}", other),
	}
}

#[test]
fn incoming_shares_extend_chain_and_relay() {
	let node = TestNode::start();
	let mut sender = TestClient::connect(&node.addr);
	sender.handshake(ZERO_HASH);
	sender.next_msg(); // have_tx
	sender.next_msg(); // remember_tx

	let mut listener = TestClient::connect(&node.addr);
	listener.handshake(ZERO_HASH);
	listener.next_msg(); // have_tx
	listener.next_msg(); // remember_tx

	let tip = node.tip();
	let next = share("extender", tip.height() + 1, tip.hash);
	let wrapped = next.to_wrapped().unwrap();
	sender.send(
		Type::Shares,
		&Shares {
			shares: vec![wrapped.clone()],
		},
	);

	// the other peer gets the same wrapper relayed
	match listener.next_msg() {
		Message::Shares(m) => assert_eq!(m.shares, vec![wrapped]),
		other => panic!("expected shares, got {:?}", other),
	}
	assert_eq!(node.chain.read().unwrap().newest_hash(), next.hash);
}
