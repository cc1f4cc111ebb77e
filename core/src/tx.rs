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

//! Blockchain transaction templates as handed to the pool by the
//! mining-template feed and described to peers over the wire.

use crate::hash::Hash;
use crate::util::to_hex;

/// A pending blockchain transaction the pool knows how to describe.
///
/// `txid` and `hash` coexist because some chains distinguish the witness
/// hash from the id; peers may refer to a template by either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxTemplate {
	/// Canonical transaction id.
	pub txid: Hash,
	/// Transaction hash, equal to `txid` on chains without the distinction.
	pub hash: Hash,
	/// Raw transaction body.
	pub data: Vec<u8>,
}

impl TxTemplate {
	/// Whether the template answers to the given reference, by txid or hash.
	pub fn matches(&self, h: &Hash) -> bool {
		self.txid == *h || self.hash == *h
	}

	/// Byte size of the raw transaction body.
	pub fn size(&self) -> usize {
		self.data.len()
	}

	/// Hex rendering of the raw body, for callers feeding hex interfaces.
	pub fn to_hex(&self) -> String {
		to_hex(self.data.clone())
	}
}

/// A block template pushed by the mining-template feed: the transactions
/// the node is currently including in the block it mines on.
#[derive(Debug, Clone, Default)]
pub struct GetBlockTemplate {
	/// Transactions of the template.
	pub transactions: Vec<TxTemplate>,
}
