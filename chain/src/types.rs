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

//! Base types the share-chain store requires.

use std::sync::Arc;

use crate::core::hash::Hash;
use crate::core::share::BaseShare;

/// A contiguous window of missing heights below a known share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
	/// The known share sitting just above the missing window.
	pub descendent: Hash,
	/// Height of the descendent share.
	pub descendent_height: u32,
	/// Number of heights separating the descendent from its closest known
	/// ancestor.
	pub length: u32,
}

/// Walk direction for `subchain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	/// Towards older shares, descending heights.
	Backward,
	/// Towards newer shares, ascending heights.
	Forward,
}

/// Bridge between the share-chain store and the rest of the system.
/// Callbacks run synchronously, before the mutating store call returns, so
/// implementors must not call back into the store.
pub trait ChainAdapter: Send + Sync {
	/// Missing height windows were detected, either on ingestion or by a
	/// full gap scan.
	fn gaps_found(&self, gaps: Vec<Gap>) {
		let _ = gaps;
	}

	/// Shares at some height lost the main-chain spot to a sibling.
	fn orphans_found(&self, orphans: Vec<Arc<BaseShare>>) {
		let _ = orphans;
	}

	/// A share arrived that no stored descendant references; it was not
	/// admitted.
	fn dead_share_arrived(&self, share: Arc<BaseShare>) {
		let _ = share;
	}

	/// A sibling of the current tip arrived.
	fn candidate_arrived(&self, share: Arc<BaseShare>) {
		let _ = share;
	}

	/// The chain tip moved to the given share.
	fn newest_changed(&self, share: Arc<BaseShare>) {
		let _ = share;
	}

	/// The verified window first reached the length payouts can be
	/// calculated over. Fired at most once per store.
	fn chain_calculatable(&self) {}
}

/// Dummy adapter used as a placeholder and in tests where events are not
/// under inspection.
pub struct NoopAdapter {}

impl ChainAdapter for NoopAdapter {}
