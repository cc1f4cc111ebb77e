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

//! The share-chain store: all shares the node currently holds, indexed
//! both by hash and by absolute height, across a bounded sliding window.
//!
//! At every height the store keeps an ordered list of shares; index 0 is
//! the share currently considered on the main chain, the rest are orphans
//! or still-unresolved siblings. Admission, orphan resolution and dead
//! share rejection all happen in `append`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::core::hash::Hash;
use crate::core::share::BaseShare;

use crate::types::{ChainAdapter, Direction, Gap};

/// Number of shares a full payout window spans (24h of 10s shares).
pub const BASE_CHAIN_LENGTH: u32 = 24 * 60 * 60 / 10;

/// Maximum height spread kept in memory; heights falling below the window
/// are evicted.
pub const MAX_CHAIN_LENGTH: u32 = 2 * BASE_CHAIN_LENGTH;

/// In-memory share database with a hash index and a height index.
/// Owned by whoever coordinates ingestion; tests construct fresh stores
/// per case.
pub struct ShareChain {
	/// hash -> height of every stored share
	hash_index: HashMap<Hash, u32>,
	/// height -> shares at that height, main-chain share first
	height_index: BTreeMap<u32, Vec<Arc<BaseShare>>>,
	newest: Option<Arc<BaseShare>>,
	oldest: Option<Arc<BaseShare>>,
	verified: bool,
	calculatable: bool,
	adapter: Arc<dyn ChainAdapter>,
}

enum ParentSlot {
	Missing,
	Single,
	Multi(Option<usize>),
}

impl ShareChain {
	/// Builds an empty store dispatching events to the provided adapter.
	pub fn new(adapter: Arc<dyn ChainAdapter>) -> ShareChain {
		ShareChain {
			hash_index: HashMap::new(),
			height_index: BTreeMap::new(),
			newest: None,
			oldest: None,
			verified: false,
			calculatable: false,
			adapter,
		}
	}

	/// Ingest one share. Returns true iff the share became a new main-chain
	/// candidate worth broadcasting: a new tip or the very first share.
	/// Invalid shares, duplicates and dead shares are rejected and return
	/// false; siblings and back-fills are admitted but return false.
	pub fn append(&mut self, share: Arc<BaseShare>) -> bool {
		if !share.validity {
			debug!("append: rejecting invalid share {}", share.hash);
			return false;
		}
		if self.hash_index.contains_key(&share.hash) {
			trace!("append: duplicate share {}", share.hash);
			return false;
		}

		let height = share.height();
		self.hash_index.insert(share.hash, height);
		self.height_index
			.entry(height)
			.or_insert_with(Vec::new)
			.push(share.clone());

		if self.oldest.as_ref().map_or(true, |o| height < o.height()) {
			self.oldest = Some(share.clone());
		}

		let tip = match self.newest.clone() {
			Some(tip) => tip,
			None => {
				// very first share, it is both ends of the chain
				self.newest = Some(share);
				return true;
			}
		};

		if height > tip.height() {
			self.newest = Some(share.clone());
			self.adapter.newest_changed(share.clone());
			self.clean_deprecations();
			self.resolve_parent_height(&share);
			true
		} else if height == tip.height() {
			self.adapter.candidate_arrived(share);
			false
		} else {
			self.fill_below(share);
			false
		}
	}

	/// A new tip arrived at `share.height()`; look at the height right
	/// below it and sort out orphans or flag the hole.
	fn resolve_parent_height(&mut self, share: &Arc<BaseShare>) {
		let below = share.height() - 1;
		let slot = match self.height_index.get(&below) {
			None => ParentSlot::Missing,
			Some(entries) if entries.len() == 1 => ParentSlot::Single,
			Some(entries) => ParentSlot::Multi(
				entries
					.iter()
					.position(|s| s.hash == share.previous_hash()),
			),
		};
		match slot {
			ParentSlot::Missing => {
				self.adapter.gaps_found(vec![Gap {
					descendent: share.hash,
					descendent_height: share.height(),
					length: 1,
				}]);
			}
			ParentSlot::Single => {}
			ParentSlot::Multi(Some(pos)) => {
				let entries = self.height_index.get_mut(&below).expect("checked above");
				let parent = entries.remove(pos);
				let orphans = entries.clone();
				entries.clear();
				entries.push(parent);
				entries.extend(orphans.iter().cloned());
				self.adapter.orphans_found(orphans);
			}
			ParentSlot::Multi(None) => {
				// several shares below us and none of them is our ancestor
				self.adapter.gaps_found(vec![Gap {
					descendent: share.hash,
					descendent_height: share.height(),
					length: 1,
				}]);
			}
		}
	}

	/// A share arrived below the tip. A lone share quietly fills its
	/// height in; a sibling must be referenced by some share one height up
	/// to earn the main-chain spot, otherwise it is dead and rolled back.
	fn fill_below(&mut self, share: Arc<BaseShare>) {
		let height = share.height();
		let siblings = self
			.height_index
			.get(&height)
			.map(|e| e.len())
			.expect("share was just inserted");
		if siblings == 1 {
			return;
		}

		let referenced = self
			.height_index
			.get(&(height + 1))
			.map(|entries| entries.iter().any(|s| s.previous_hash() == share.hash))
			.unwrap_or(false);

		if !referenced {
			self.hash_index.remove(&share.hash);
			if let Some(entries) = self.height_index.get_mut(&height) {
				entries.retain(|s| s.hash != share.hash);
			}
			self.adapter.dead_share_arrived(share);
			return;
		}

		let entries = self.height_index.get_mut(&height).expect("checked above");
		let pos = entries
			.iter()
			.position(|s| s.hash == share.hash)
			.expect("share was just inserted");
		let promoted = entries.remove(pos);
		let orphans = entries.clone();
		entries.insert(0, promoted);
		self.adapter.orphans_found(orphans);
	}

	/// Drops every share at the oldest height once the window spread
	/// reaches `MAX_CHAIN_LENGTH`. One height per invocation; steady
	/// ingestion naturally keeps the window bounded.
	pub fn clean_deprecations(&mut self) {
		let (newest_h, oldest_h) = match (&self.newest, &self.oldest) {
			(Some(n), Some(o)) => (n.height(), o.height()),
			_ => return,
		};
		if newest_h - oldest_h < MAX_CHAIN_LENGTH {
			return;
		}
		if let Some(entries) = self.height_index.remove(&oldest_h) {
			debug!(
				"clean_deprecations: dropping {} share(s) at height {}",
				entries.len(),
				oldest_h
			);
			for s in &entries {
				self.hash_index.remove(&s.hash);
			}
		}
		self.oldest = self
			.height_index
			.values()
			.next()
			.map(|entries| entries[0].clone());
	}

	/// Lazy walk of up to `length` main-chain shares starting at
	/// `start_hash`, stepping one height at a time in the given direction.
	/// Stops early on the first missing height.
	pub fn subchain(
		&self,
		start_hash: Hash,
		length: u32,
		direction: Direction,
	) -> impl Iterator<Item = Arc<BaseShare>> + '_ {
		Subchain {
			chain: self,
			height: self.hash_index.get(&start_hash).copied(),
			remaining: length,
			direction,
		}
	}

	/// Walks backward from the tip requiring every height's main-chain
	/// share to be the parent the one above committed to. Returns whether
	/// the whole present window is consistent. The first time the verified
	/// window is both consistent and at least `BASE_CHAIN_LENGTH` long,
	/// latches the calculatable flag and notifies the adapter.
	pub fn verify(&mut self) -> bool {
		let (newest, oldest) = match (&self.newest, &self.oldest) {
			(Some(n), Some(o)) => (n.clone(), o.clone()),
			_ => return false,
		};
		let window = newest.height() - oldest.height() + 1;

		let mut expected = newest.hash;
		let mut verified: u32 = 0;
		let mut height = newest.height();
		loop {
			match self.height_index.get(&height).and_then(|e| e.first()) {
				Some(s) if s.hash == expected => {
					verified += 1;
					expected = s.previous_hash();
				}
				_ => break,
			}
			if height == oldest.height() {
				break;
			}
			height -= 1;
		}

		let consistent = verified == window;
		if consistent && verified >= BASE_CHAIN_LENGTH && !self.calculatable {
			self.calculatable = true;
			info!("chain of {} shares fully verified, calculatable", verified);
			self.adapter.chain_calculatable();
		}
		self.verified = consistent;
		consistent
	}

	/// Scans the whole height index for holes: non-consecutive heights or
	/// a main-chain share that is not the parent its descendent commits
	/// to. When the window is still shorter than `BASE_CHAIN_LENGTH` an
	/// extra terminal gap below the oldest share covers the missing
	/// history. Found gaps go to the adapter in one batch.
	pub fn check_gaps(&self) {
		let mut gaps = vec![];

		let mut iter = self.height_index.iter().rev();
		if let Some((first_height, first_entries)) = iter.next() {
			let mut desc_height = *first_height;
			let mut descendent = &first_entries[0];
			for (height, entries) in iter {
				let ancestor = &entries[0];
				if desc_height - height != 1 || ancestor.hash != descendent.previous_hash() {
					gaps.push(Gap {
						descendent: descendent.hash,
						descendent_height: desc_height,
						length: desc_height - height,
					});
				}
				desc_height = *height;
				descendent = ancestor;
			}
		}

		if let (Some(newest), Some(oldest)) = (&self.newest, &self.oldest) {
			let window = newest.height() - oldest.height() + 1;
			if window < BASE_CHAIN_LENGTH {
				gaps.push(Gap {
					descendent: oldest.hash,
					descendent_height: oldest.height(),
					length: BASE_CHAIN_LENGTH - window,
				});
			}
		}

		if !gaps.is_empty() {
			debug!("check_gaps: {} gap(s) in the local window", gaps.len());
			self.adapter.gaps_found(gaps);
		}
	}

	/// Recovery pass after a failed or empty share-request reply: rescan
	/// for gaps and re-verify what we do hold.
	pub fn fix(&mut self) {
		self.check_gaps();
		self.verify();
	}

	/// Whether a share with this hash is stored.
	pub fn contains(&self, hash: &Hash) -> bool {
		self.hash_index.contains_key(hash)
	}

	/// Share by hash, regardless of main-chain status.
	pub fn get(&self, hash: &Hash) -> Option<Arc<BaseShare>> {
		let height = self.hash_index.get(hash)?;
		self.height_index
			.get(height)?
			.iter()
			.find(|s| s.hash == *hash)
			.cloned()
	}

	/// The current tip, if any.
	pub fn newest(&self) -> Option<Arc<BaseShare>> {
		self.newest.clone()
	}

	/// The oldest share still in the window, if any.
	pub fn oldest(&self) -> Option<Arc<BaseShare>> {
		self.oldest.clone()
	}

	/// Hash of the current tip, or the zero hash on an empty store.
	pub fn newest_hash(&self) -> Hash {
		self.newest.as_ref().map(|s| s.hash).unwrap_or_default()
	}

	/// Total number of stored shares, orphans included.
	pub fn total_shares(&self) -> usize {
		self.hash_index.len()
	}

	/// Whether the last `verify` found the window consistent.
	pub fn is_verified(&self) -> bool {
		self.verified
	}

	/// Whether the verified window ever reached payout-calculable length.
	pub fn is_calculatable(&self) -> bool {
		self.calculatable
	}
}

struct Subchain<'a> {
	chain: &'a ShareChain,
	height: Option<u32>,
	remaining: u32,
	direction: Direction,
}

impl<'a> Iterator for Subchain<'a> {
	type Item = Arc<BaseShare>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.remaining == 0 {
			return None;
		}
		let height = self.height?;
		let share = self.chain.height_index.get(&height)?.first()?.clone();
		self.remaining -= 1;
		self.height = match self.direction {
			Direction::Backward => height.checked_sub(1),
			Direction::Forward => height.checked_add(1),
		};
		Some(share)
	}
}
