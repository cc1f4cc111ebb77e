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

//! Message types that transit over the network and related serialization
//! code. A frame is a 28-byte header (magic, ASCII command, payload length
//! and payload checksum) followed by the payload bytes.

use std::io::Write;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use num_bigint::BigUint;

use crate::core::hash::{checksum, Hash};
use crate::core::ser::{
	self, deserialize_exact, read_multi, ser_vec, write_multi, Readable, Reader, Writeable,
	Writer,
};
use crate::core::share::WrappedShare;

use crate::types::Error;

/// Total length of a frame header on the wire.
pub const PROTOCOL_HEAD_LENGTH: usize = 28;

/// Length of the zero-padded ASCII command field.
pub const COMMAND_LENGTH: usize = 12;

/// Maximum payload size we are willing to read for one frame.
pub const MAX_MSG_LEN: u32 = 8 * 1024 * 1024;

/// Types of messages. The command string is what actually travels in the
/// frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
	Version,
	Ping,
	Pong,
	Addrs,
	AddrMe,
	GetAddrs,
	HaveTx,
	LosingTx,
	ForgetTx,
	RememberTx,
	BestBlock,
	Shares,
	ShareReq,
	ShareReply,
}

impl Type {
	/// The wire command for this message type.
	pub fn command(&self) -> &'static str {
		match self {
			Type::Version => "version",
			Type::Ping => "ping",
			Type::Pong => "pong",
			Type::Addrs => "addrs",
			Type::AddrMe => "addrme",
			Type::GetAddrs => "getaddrs",
			Type::HaveTx => "have_tx",
			Type::LosingTx => "losing_tx",
			Type::ForgetTx => "forget_tx",
			Type::RememberTx => "remember_tx",
			Type::BestBlock => "bestblock",
			Type::Shares => "shares",
			Type::ShareReq => "sharereq",
			Type::ShareReply => "sharereply",
		}
	}

	/// Message type for a decoded command string, if we know it.
	pub fn from_command(cmd: &str) -> Option<Type> {
		let t = match cmd {
			"version" => Type::Version,
			"ping" => Type::Ping,
			"pong" => Type::Pong,
			"addrs" => Type::Addrs,
			"addrme" => Type::AddrMe,
			"getaddrs" => Type::GetAddrs,
			"have_tx" => Type::HaveTx,
			"losing_tx" => Type::LosingTx,
			"forget_tx" => Type::ForgetTx,
			"remember_tx" => Type::RememberTx,
			"bestblock" => Type::BestBlock,
			"shares" => Type::Shares,
			"sharereq" => Type::ShareReq,
			"sharereply" => Type::ShareReply,
			_ => return None,
		};
		Some(t)
	}
}

/// Header of any protocol message, used to identify incoming messages.
#[derive(Debug, Clone)]
pub struct MsgHeader {
	/// Type of the message this header precedes.
	pub msg_type: Type,
	/// Byte length of the payload.
	pub msg_len: u32,
	/// First 4 bytes of the double SHA256 of the payload, little-endian.
	pub checksum: u32,
}

/// A message header we either recognized or only know the length of, so
/// the payload of an unknown command can be discarded cleanly.
#[derive(Debug, Clone)]
pub enum MsgHeaderWrapper {
	/// A message type we know how to decode.
	Known(MsgHeader),
	/// Unknown command: payload length and the command string.
	Unknown(u32, String),
}

impl MsgHeaderWrapper {
	/// Parses the 28 header bytes, checking the network magic first.
	pub fn decode(buf: &[u8], magic: &[u8; 8]) -> Result<MsgHeaderWrapper, Error> {
		if buf.len() < PROTOCOL_HEAD_LENGTH {
			return Err(Error::Serialization(ser::Error::CorruptedData));
		}
		if &buf[0..8] != magic {
			return Err(Error::BadMagic);
		}
		let cmd_bytes = &buf[8..8 + COMMAND_LENGTH];
		let cmd_end = cmd_bytes
			.iter()
			.position(|&b| b == 0)
			.unwrap_or(COMMAND_LENGTH);
		let cmd = String::from_utf8_lossy(&cmd_bytes[..cmd_end]).into_owned();
		let msg_len = u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]);
		let cksum = u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]);
		if msg_len > MAX_MSG_LEN {
			return Err(Error::Serialization(ser::Error::TooLargeReadErr(
				msg_len as u64,
			)));
		}
		match Type::from_command(&cmd) {
			Some(msg_type) => Ok(MsgHeaderWrapper::Known(MsgHeader {
				msg_type,
				msg_len,
				checksum: cksum,
			})),
			None => Ok(MsgHeaderWrapper::Unknown(msg_len, cmd)),
		}
	}
}

/// Builds a complete frame (header and payload) for the given message.
pub fn encode_message(
	msg_type: Type,
	body: &dyn Writeable,
	magic: &[u8; 8],
) -> Result<Vec<u8>, Error> {
	let payload = ser_vec(body)?;
	let mut frame = Vec::with_capacity(PROTOCOL_HEAD_LENGTH + payload.len());
	frame.extend_from_slice(magic);
	let mut cmd = [0u8; COMMAND_LENGTH];
	let name = msg_type.command().as_bytes();
	cmd[..name.len()].copy_from_slice(name);
	frame.extend_from_slice(&cmd);
	frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
	frame.extend_from_slice(&checksum(&payload).to_le_bytes());
	frame.extend_from_slice(&payload);
	Ok(frame)
}

/// Frames the given message and writes it out in one go.
pub fn write_message(
	stream: &mut dyn Write,
	msg_type: Type,
	body: &dyn Writeable,
	magic: &[u8; 8],
) -> Result<u64, Error> {
	let frame = encode_message(msg_type, body, magic)?;
	stream.write_all(&frame).map_err(Error::Connection)?;
	Ok(frame.len() as u64)
}

/// A decoded inbound message.
#[derive(Debug, Clone)]
pub enum Message {
	/// Command we do not understand; payload was discarded.
	Unknown(String),
	Version(Version),
	Ping,
	Pong,
	Addrs(Addrs),
	AddrMe(AddrMe),
	GetAddrs(GetAddrs),
	HaveTx(TxHashes),
	LosingTx(TxHashes),
	ForgetTx(ForgetTx),
	RememberTx(RememberTx),
	BestBlock(BestBlock),
	Shares(Shares),
	ShareReq(ShareReq),
	ShareReply(ShareReply),
}

/// Decodes a payload into a typed message. The checksum has already been
/// verified by the framing layer.
pub fn decode_message(header: &MsgHeader, payload: &[u8]) -> Result<Message, Error> {
	let msg = match header.msg_type {
		Type::Version => Message::Version(deserialize_exact(payload)?),
		Type::Ping => {
			expect_empty(payload)?;
			Message::Ping
		}
		Type::Pong => {
			expect_empty(payload)?;
			Message::Pong
		}
		Type::Addrs => Message::Addrs(deserialize_exact(payload)?),
		Type::AddrMe => Message::AddrMe(deserialize_exact(payload)?),
		Type::GetAddrs => Message::GetAddrs(deserialize_exact(payload)?),
		Type::HaveTx => Message::HaveTx(deserialize_exact(payload)?),
		Type::LosingTx => Message::LosingTx(deserialize_exact(payload)?),
		Type::ForgetTx => Message::ForgetTx(deserialize_exact(payload)?),
		Type::RememberTx => Message::RememberTx(deserialize_exact(payload)?),
		// the header travels opaque, the blockchain codec decodes it
		Type::BestBlock => Message::BestBlock(BestBlock {
			header: payload.to_vec(),
		}),
		Type::Shares => Message::Shares(deserialize_exact(payload)?),
		Type::ShareReq => Message::ShareReq(deserialize_exact(payload)?),
		Type::ShareReply => Message::ShareReply(deserialize_exact(payload)?),
	};
	Ok(msg)
}

fn expect_empty(payload: &[u8]) -> Result<(), Error> {
	if payload.is_empty() {
		Ok(())
	} else {
		Err(Error::Serialization(ser::Error::CorruptedData))
	}
}

/// Payload of messages without a body.
pub struct Empty {}

impl Writeable for Empty {
	fn write(&self, _writer: &mut dyn Writer) -> Result<(), ser::Error> {
		Ok(())
	}
}

/// A peer address as described on the wire: service bits, a 16-byte IP
/// (IPv4 addresses are v4-mapped) and a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddress {
	/// Service bits of the node at that address.
	pub services: u64,
	/// Socket address.
	pub addr: SocketAddr,
}

impl Writeable for NetAddress {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_u64(self.services)?;
		let octets = match self.addr.ip() {
			IpAddr::V4(ip) => ip.to_ipv6_mapped().octets(),
			IpAddr::V6(ip) => ip.octets(),
		};
		writer.write_fixed_bytes(&octets)?;
		writer.write_u16(self.addr.port())
	}
}

impl Readable for NetAddress {
	fn read(reader: &mut dyn Reader) -> Result<NetAddress, ser::Error> {
		let services = reader.read_u64()?;
		let raw = reader.read_fixed_bytes(16)?;
		let mut octets = [0u8; 16];
		octets.copy_from_slice(&raw);
		let port = reader.read_u16()?;
		let v6 = Ipv6Addr::from(octets);
		let ip = match v6.to_ipv4() {
			Some(v4) if octets[..10].iter().all(|&b| b == 0) && octets[10] == 0xff
				&& octets[11] == 0xff =>
			{
				IpAddr::V4(v4)
			}
			_ => IpAddr::V6(v6),
		};
		Ok(NetAddress {
			services,
			addr: SocketAddr::new(ip, port),
		})
	}
}

impl From<SocketAddr> for NetAddress {
	fn from(addr: SocketAddr) -> NetAddress {
		NetAddress { services: 0, addr }
	}
}

/// First message on any connection: sender advertises its version and
/// its view of both endpoints, plus its current best share.
#[derive(Debug, Clone)]
pub struct Version {
	/// Protocol version of the sender.
	pub version: u32,
	/// Service bits of the sender.
	pub services: u64,
	/// Receiver's address, as the sender sees it.
	pub addr_to: NetAddress,
	/// Sender's own address.
	pub addr_from: NetAddress,
	/// Randomly generated for each connection, helps detect self.
	pub nonce: u64,
	/// Name and version of the sending software.
	pub sub_version: String,
	/// Tip of the sender's share-chain, zero hash when it has none.
	pub best_share_hash: Hash,
}

impl Writeable for Version {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_u32(self.version)?;
		writer.write_u64(self.services)?;
		self.addr_to.write(writer)?;
		self.addr_from.write(writer)?;
		writer.write_u64(self.nonce)?;
		writer.write_bytes(self.sub_version.as_bytes())?;
		self.best_share_hash.write(writer)
	}
}

impl Readable for Version {
	fn read(reader: &mut dyn Reader) -> Result<Version, ser::Error> {
		let version = reader.read_u32()?;
		let services = reader.read_u64()?;
		let addr_to = NetAddress::read(reader)?;
		let addr_from = NetAddress::read(reader)?;
		let nonce = reader.read_u64()?;
		let sub_version = String::from_utf8(reader.read_bytes_len_prefix()?)
			.map_err(|_| ser::Error::CorruptedData)?;
		let best_share_hash = Hash::read(reader)?;
		Ok(Version {
			version,
			services,
			addr_to,
			addr_from,
			nonce,
			sub_version,
			best_share_hash,
		})
	}
}

/// A batch of peer addresses.
#[derive(Debug, Clone)]
pub struct Addrs {
	/// Peer addresses.
	pub addrs: Vec<NetAddress>,
}

impl Writeable for Addrs {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		write_multi(writer, &self.addrs)
	}
}

impl Readable for Addrs {
	fn read(reader: &mut dyn Reader) -> Result<Addrs, ser::Error> {
		Ok(Addrs {
			addrs: read_multi(reader)?,
		})
	}
}

/// The port the sender believes it reached us on.
#[derive(Debug, Clone, Copy)]
pub struct AddrMe {
	/// Sender's listening port.
	pub port: u16,
}

impl Writeable for AddrMe {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_u16(self.port)
	}
}

impl Readable for AddrMe {
	fn read(reader: &mut dyn Reader) -> Result<AddrMe, ser::Error> {
		Ok(AddrMe {
			port: reader.read_u16()?,
		})
	}
}

/// Request for some peer addresses.
#[derive(Debug, Clone, Copy)]
pub struct GetAddrs {
	/// Number of peers desired.
	pub count: u32,
}

impl Writeable for GetAddrs {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_u32(self.count)
	}
}

impl Readable for GetAddrs {
	fn read(reader: &mut dyn Reader) -> Result<GetAddrs, ser::Error> {
		Ok(GetAddrs {
			count: reader.read_u32()?,
		})
	}
}

/// Plain list of transaction hashes, the payload of both have_tx and
/// losing_tx.
#[derive(Debug, Clone)]
pub struct TxHashes {
	/// The transaction hashes.
	pub hashes: Vec<Hash>,
}

impl Writeable for TxHashes {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		write_multi(writer, &self.hashes)
	}
}

impl Readable for TxHashes {
	fn read(reader: &mut dyn Reader) -> Result<TxHashes, ser::Error> {
		Ok(TxHashes {
			hashes: read_multi(reader)?,
		})
	}
}

/// Release the receiver from remembering transactions on our behalf.
#[derive(Debug, Clone)]
pub struct ForgetTx {
	/// Hashes to forget.
	pub hashes: Vec<Hash>,
	/// Total byte size of the forgotten transaction bodies.
	pub total_size: u64,
}

impl Writeable for ForgetTx {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		write_multi(writer, &self.hashes)?;
		writer.write_u64(self.total_size)
	}
}

impl Readable for ForgetTx {
	fn read(reader: &mut dyn Reader) -> Result<ForgetTx, ser::Error> {
		let hashes = read_multi(reader)?;
		let total_size = reader.read_u64()?;
		Ok(ForgetTx { hashes, total_size })
	}
}

/// Ask the receiver to retain transactions for later share resolution.
/// `hashes` refer to transactions the receiver already heard of through
/// have_tx; `txs` carry full bodies inline.
#[derive(Debug, Clone)]
pub struct RememberTx {
	/// References to previously advertised transactions.
	pub hashes: Vec<Hash>,
	/// Full transaction bodies.
	pub txs: Vec<Vec<u8>>,
}

impl Writeable for RememberTx {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		write_multi(writer, &self.hashes)?;
		writer.write_u64(self.txs.len() as u64)?;
		for tx in &self.txs {
			writer.write_bytes(tx)?;
		}
		Ok(())
	}
}

impl Readable for RememberTx {
	fn read(reader: &mut dyn Reader) -> Result<RememberTx, ser::Error> {
		let hashes = read_multi(reader)?;
		let count = reader.read_u64()?;
		if count > 100_000 {
			return Err(ser::Error::TooLargeReadErr(count));
		}
		let mut txs = Vec::with_capacity(count as usize);
		for _ in 0..count {
			txs.push(reader.read_bytes_len_prefix()?);
		}
		Ok(RememberTx { hashes, txs })
	}
}

/// Announcement of the best upstream block header the sender knows.
/// Carried opaque; the blockchain codec collaborator decodes it.
#[derive(Debug, Clone)]
pub struct BestBlock {
	/// Raw serialized block header.
	pub header: Vec<u8>,
}

impl Writeable for BestBlock {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		// the whole payload is the header, no length prefix
		writer.write_fixed_bytes(&self.header)
	}
}

/// A batch of wrapped shares.
#[derive(Debug, Clone)]
pub struct Shares {
	/// The shares, each tagged with its format version.
	pub shares: Vec<WrappedShare>,
}

impl Writeable for Shares {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		write_multi(writer, &self.shares)
	}
}

impl Readable for Shares {
	fn read(reader: &mut dyn Reader) -> Result<Shares, ser::Error> {
		Ok(Shares {
			shares: read_multi(reader)?,
		})
	}
}

/// Request for a range of share history below the given hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareReq {
	/// 256-bit request id echoed by the reply.
	pub id: BigUint,
	/// Starting points of the requested backward walks.
	pub hashes: Vec<Hash>,
	/// How many parents to walk per hash.
	pub parents: u32,
	/// Walks stop before any of these hashes.
	pub stops: Vec<Hash>,
}

impl Writeable for ShareReq {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		write_biguint(writer, &self.id)?;
		write_multi(writer, &self.hashes)?;
		writer.write_u32(self.parents)?;
		write_multi(writer, &self.stops)
	}
}

impl Readable for ShareReq {
	fn read(reader: &mut dyn Reader) -> Result<ShareReq, ser::Error> {
		let id = read_biguint(reader)?;
		let hashes = read_multi(reader)?;
		let parents = reader.read_u32()?;
		let stops = read_multi(reader)?;
		Ok(ShareReq {
			id,
			hashes,
			parents,
			stops,
		})
	}
}

/// Reply to a share request.
#[derive(Debug, Clone)]
pub struct ShareReply {
	/// Request id this reply answers.
	pub id: BigUint,
	/// Result code, 0 on success.
	pub result: u8,
	/// The shares found, newest first per requested hash.
	pub shares: Vec<WrappedShare>,
}

impl Writeable for ShareReply {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		write_biguint(writer, &self.id)?;
		writer.write_u8(self.result)?;
		write_multi(writer, &self.shares)
	}
}

impl Readable for ShareReply {
	fn read(reader: &mut dyn Reader) -> Result<ShareReply, ser::Error> {
		let id = read_biguint(reader)?;
		let result = reader.read_u8()?;
		let shares = read_multi(reader)?;
		Ok(ShareReply { id, result, shares })
	}
}

// Request ids are 256-bit unsigned integers, carried as 32 little-endian
// bytes.
fn write_biguint(writer: &mut dyn Writer, n: &BigUint) -> Result<(), ser::Error> {
	let mut bytes = n.to_bytes_le();
	if bytes.len() > Hash::LEN {
		return Err(ser::Error::CorruptedData);
	}
	bytes.resize(Hash::LEN, 0);
	writer.write_fixed_bytes(&bytes)
}

fn read_biguint(reader: &mut dyn Reader) -> Result<BigUint, ser::Error> {
	let bytes = reader.read_fixed_bytes(Hash::LEN)?;
	Ok(BigUint::from_bytes_le(&bytes))
}

/// The 256-bit request id as a Hash, the form our pending-request set is
/// keyed by.
pub fn id_to_hash(id: &BigUint) -> Option<Hash> {
	let mut bytes = id.to_bytes_le();
	if bytes.len() > Hash::LEN {
		return None;
	}
	bytes.resize(Hash::LEN, 0);
	Some(Hash::from_vec(&bytes))
}

/// A request id from its Hash-keyed form.
pub fn hash_to_id(hash: &Hash) -> BigUint {
	BigUint::from_bytes_le(hash.to_slice())
}
