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

//! Hash Function
//!
//! Primary hash function used in the protocol: double SHA256, as everywhere
//! in this protocol family. Shares, transactions and frame checksums all
//! derive from it.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::ser::{self, Readable, Reader, Writeable, Writer};
use crate::util::{from_hex, to_hex};

/// A hash to uniquely (or close enough) identify one of the main pool
/// constructs. Used pervasively for shares and transactions.
#[derive(Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Hash, Default)]
pub struct Hash(pub [u8; 32]);

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let hash_hex = self.to_hex();
		const NUM_SHOW: usize = 12;
		write!(f, "{}", &hash_hex[..NUM_SHOW])
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl Hash {
	/// A hash is 32 bytes.
	pub const LEN: usize = 32;

	/// Creates a new hash from a vector. Panics on an input shorter than
	/// 32 bytes, callers decode through `Readable` for untrusted data.
	pub fn from_vec(v: &[u8]) -> Hash {
		let mut h = [0; Hash::LEN];
		h.copy_from_slice(&v[..Hash::LEN]);
		Hash(h)
	}

	/// Converts the hash to a byte vector
	pub fn to_vec(&self) -> Vec<u8> {
		self.0.to_vec()
	}

	/// Converts the hash to a byte slice
	pub fn to_slice(&self) -> &[u8] {
		&self.0
	}

	/// Convert hash to hex string
	pub fn to_hex(&self) -> String {
		to_hex(self.to_vec())
	}

	/// Convert hex string back to hash
	pub fn from_hex(hex: &str) -> Result<Hash, ser::Error> {
		let bytes = from_hex(hex.to_string()).map_err(|_| ser::Error::CorruptedData)?;
		if bytes.len() != Hash::LEN {
			return Err(ser::Error::CorruptedData);
		}
		Ok(Hash::from_vec(&bytes))
	}

	/// Whether this is the canonical all-zero hash.
	pub fn is_zero(&self) -> bool {
		*self == ZERO_HASH
	}
}

/// The "zero" hash, conventionally standing in for "no hash here".
pub const ZERO_HASH: Hash = Hash([0; 32]);

impl Readable for Hash {
	fn read(reader: &mut dyn Reader) -> Result<Hash, ser::Error> {
		let v = reader.read_fixed_bytes(Hash::LEN)?;
		Ok(Hash::from_vec(&v))
	}
}

impl Writeable for Hash {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

/// Double SHA256 of the provided byte slice.
pub fn sha256d(data: &[u8]) -> Hash {
	let first = Sha256::digest(data);
	let second = Sha256::digest(&first);
	Hash::from_vec(&second)
}

/// Single SHA256 of the provided byte slice. Share-request keys are derived
/// with a single round.
pub fn sha256(data: &[u8]) -> Hash {
	Hash::from_vec(&Sha256::digest(data))
}

/// Frame checksum: the first 4 bytes of the double SHA256 of the payload,
/// read as a little-endian u32.
pub fn checksum(payload: &[u8]) -> u32 {
	let h = sha256d(payload);
	u32::from_le_bytes([h.0[0], h.0[1], h.0[2], h.0[3]])
}

/// A trait for types that get their hash from their byte serialization.
pub trait Hashed {
	/// The double SHA256 hash of the type's serialized bytes.
	fn hash(&self) -> Hash;
}

impl<T: Writeable> Hashed for T {
	fn hash(&self) -> Hash {
		let data = ser::ser_vec(self).expect("in-memory serialization");
		sha256d(&data)
	}
}
