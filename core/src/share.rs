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

//! Shares, the low-difficulty proof-of-work objects forming the pool's side
//! ledger, and their versioned on-wire container.
//!
//! Cryptographic construction and proof-of-work validation of shares happen
//! outside this crate; a decoded share carries the attributes the chain
//! store and the peer protocol need and a `validity` flag owned by the
//! external validator.

use crate::hash::{Hash, ZERO_HASH};
use crate::ser::{self, read_multi, write_multi, Readable, Reader, Writeable, Writer};

/// Version tag of the share format this node produces and relays. Carried
/// in the on-wire `shares` container next to the raw contents.
pub const SHARE_VERSION: u16 = 17;

/// The part of a share that commits to its position in the share-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareData {
	/// Hash of the parent share this share builds on.
	pub previous_share_hash: Hash,
}

/// Share metadata: chain position, timing and the transactions the share
/// introduces to the pool's view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareInfo {
	/// Chain commitment data.
	pub data: ShareData,
	/// Monotonically assigned absolute height in the share-chain.
	pub abs_height: u32,
	/// Unix timestamp the share was produced at.
	pub timestamp: u64,
	/// Transaction ids this share references for the first time.
	pub new_transaction_hashes: Vec<Hash>,
}

/// A share as tracked by the chain store and exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseShare {
	/// 32-byte share identifier.
	pub hash: Hash,
	/// Chain and transaction metadata.
	pub info: ShareInfo,
	/// Work contributed by this share.
	pub work: u64,
	/// Minimum work the share had to meet.
	pub min_work: u64,
	/// Whether external validation accepted this share. Shares decoded off
	/// the wire start out valid; the validator clears the flag on rejects.
	pub validity: bool,
}

impl BaseShare {
	/// Builds a share from its attributes, marked valid.
	pub fn new(
		hash: Hash,
		previous_share_hash: Hash,
		abs_height: u32,
		timestamp: u64,
		work: u64,
		min_work: u64,
		new_transaction_hashes: Vec<Hash>,
	) -> BaseShare {
		BaseShare {
			hash,
			info: ShareInfo {
				data: ShareData {
					previous_share_hash,
				},
				abs_height,
				timestamp,
				new_transaction_hashes,
			},
			work,
			min_work,
			validity: true,
		}
	}

	/// Height of this share in the share-chain.
	pub fn height(&self) -> u32 {
		self.info.abs_height
	}

	/// Hash of the parent share.
	pub fn previous_hash(&self) -> Hash {
		self.info.data.previous_share_hash
	}

	/// Whether this share claims to be a chain genesis (no parent).
	pub fn is_genesis(&self) -> bool {
		self.previous_hash() == ZERO_HASH
	}

	/// Wraps the share into its versioned wire container.
	pub fn to_wrapped(&self) -> Result<WrappedShare, ser::Error> {
		Ok(WrappedShare {
			version: SHARE_VERSION,
			contents: ser::ser_vec(self)?,
		})
	}

	/// Rebuilds a share from its wire container, rejecting version tags we
	/// do not know how to parse.
	pub fn from_wrapped(wrapped: &WrappedShare) -> Result<BaseShare, ser::Error> {
		if wrapped.version != SHARE_VERSION {
			return Err(ser::Error::CorruptedData);
		}
		ser::deserialize_exact(&wrapped.contents)
	}
}

impl Writeable for BaseShare {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		self.hash.write(writer)?;
		self.info.data.previous_share_hash.write(writer)?;
		writer.write_u32(self.info.abs_height)?;
		writer.write_u64(self.info.timestamp)?;
		writer.write_u64(self.work)?;
		writer.write_u64(self.min_work)?;
		write_multi(writer, &self.info.new_transaction_hashes)
	}
}

impl Readable for BaseShare {
	fn read(reader: &mut dyn Reader) -> Result<BaseShare, ser::Error> {
		let hash = Hash::read(reader)?;
		let previous_share_hash = Hash::read(reader)?;
		let abs_height = reader.read_u32()?;
		let timestamp = reader.read_u64()?;
		let work = reader.read_u64()?;
		let min_work = reader.read_u64()?;
		let new_transaction_hashes = read_multi(reader)?;
		Ok(BaseShare::new(
			hash,
			previous_share_hash,
			abs_height,
			timestamp,
			work,
			min_work,
			new_transaction_hashes,
		))
	}
}

/// A share in transit: its format version tag and the raw serialized
/// contents. Relayed between peers without reserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedShare {
	/// Share format version.
	pub version: u16,
	/// Raw serialized share.
	pub contents: Vec<u8>,
}

impl Writeable for WrappedShare {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_u16(self.version)?;
		writer.write_bytes(&self.contents)
	}
}

impl Readable for WrappedShare {
	fn read(reader: &mut dyn Reader) -> Result<WrappedShare, ser::Error> {
		let version = reader.read_u16()?;
		let contents = reader.read_bytes_len_prefix()?;
		Ok(WrappedShare { version, contents })
	}
}
