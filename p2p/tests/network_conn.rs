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

//! Byte-level connection behaviour: frame packing, unknown commands,
//! corrupt frames and the ping dialect.

mod common;

use std::io::{Read, Write};
use std::time::Duration;

use rs2pool_core::hash::{checksum, ZERO_HASH};
use rs2pool_p2p::msg::{encode_message, Empty, GetAddrs, Message, Type};
use rs2pool_p2p::DEFAULT_MAGIC;

use crate::common::{TestClient, TestNode};

#[test]
fn legacy_peer_gets_its_ping_echoed() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);

	// no handshake sent, so we look like a legacy peer
	client.send(Type::Ping, &Empty {});
	loop {
		match client.read_msg() {
			Message::Ping => break,
			Message::Version(_) => continue,
			other => panic!("expected ping echo, got {:?}", other),
		}
	}
}

#[test]
fn js2pool_peer_gets_pong() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);
	client.handshake(ZERO_HASH);
	client.next_msg(); // have_tx
	client.next_msg(); // remember_tx

	client.send(Type::Ping, &Empty {});
	loop {
		match client.read_msg() {
			Message::Pong => break,
			// a liveness ping of the server may race our pong
			Message::Ping => continue,
			other => panic!("expected pong, got {:?}", other),
		}
	}
}

#[test]
fn frames_packed_into_one_segment_all_decode() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);
	client.handshake(ZERO_HASH);
	client.next_msg(); // have_tx
	client.next_msg(); // remember_tx

	// two frames, one write call
	let mut bytes = encode_message(Type::Ping, &Empty {}, &DEFAULT_MAGIC).unwrap();
	bytes.extend(encode_message(Type::GetAddrs, &GetAddrs { count: 5 }, &DEFAULT_MAGIC).unwrap());
	client.stream.write_all(&bytes).unwrap();

	match client.next_msg() {
		// we are the only peer, so the addr list is empty
		Message::Addrs(a) => assert!(a.addrs.is_empty()),
		other => panic!("expected addrs, got {:?}", other),
	}
}

#[test]
fn unknown_command_is_skipped_and_connection_lives_on() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);
	client.handshake(ZERO_HASH);
	client.next_msg(); // have_tx
	client.next_msg(); // remember_tx

	let payload = [1u8, 2, 3];
	let mut frame = Vec::new();
	frame.extend_from_slice(&DEFAULT_MAGIC);
	frame.extend_from_slice(b"frobnicate\0\0");
	frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
	frame.extend_from_slice(&checksum(&payload).to_le_bytes());
	frame.extend_from_slice(&payload);
	client.stream.write_all(&frame).unwrap();

	// still alive and answering
	client.send(Type::GetAddrs, &GetAddrs { count: 1 });
	match client.next_msg() {
		Message::Addrs(_) => {}
		other => panic!("expected addrs, got {:?}", other),
	}
}

fn expect_disconnect(client: &mut TestClient, node: &TestNode) {
	client
		.stream
		.set_read_timeout(Some(Duration::from_secs(5)))
		.unwrap();
	let mut buf = [0u8; 128];
	loop {
		match client.stream.read(&mut buf) {
			Ok(0) => break,
			Ok(_) => continue,
			Err(_) => break,
		}
	}
	// the coordinator drops the peer shortly after the socket closes
	for _ in 0..100 {
		if node.server.peers.peer_count() == 0 {
			return;
		}
		std::thread::sleep(Duration::from_millis(10));
	}
	panic!("peer was not removed after disconnect");
}

#[test]
fn bad_checksum_drops_the_connection() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);
	client.handshake(ZERO_HASH);
	client.next_msg(); // have_tx
	client.next_msg(); // remember_tx

	let mut frame = encode_message(Type::GetAddrs, &GetAddrs { count: 1 }, &DEFAULT_MAGIC).unwrap();
	// flip a checksum byte
	frame[24] ^= 0xff;
	client.stream.write_all(&frame).unwrap();

	expect_disconnect(&mut client, &node);
}

#[test]
fn bad_magic_drops_the_connection() {
	let node = TestNode::start();
	let mut client = TestClient::connect(&node.addr);
	client.handshake(ZERO_HASH);
	client.next_msg(); // have_tx
	client.next_msg(); // remember_tx

	let frame = encode_message(Type::Ping, &Empty {}, b"badmagic").unwrap();
	client.stream.write_all(&frame).unwrap();

	expect_disconnect(&mut client, &node);
}
