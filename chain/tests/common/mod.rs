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

//! Common test helpers: a share factory and an adapter recording every
//! chain event for inspection.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use rs2pool_chain::{ChainAdapter, Gap, ShareChain};
use rs2pool_core::hash::{sha256d, Hash, ZERO_HASH};
use rs2pool_core::share::BaseShare;

/// Everything the store told us, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
	Gaps(Vec<Gap>),
	Orphans(Vec<Hash>),
	Dead(Hash),
	Candidate(Hash),
	NewTip(Hash),
	Calculatable,
}

#[derive(Default)]
pub struct EventLog {
	events: Mutex<Vec<Event>>,
}

impl EventLog {
	pub fn new() -> Arc<EventLog> {
		Arc::new(EventLog::default())
	}

	/// Drains and returns everything recorded so far.
	pub fn take(&self) -> Vec<Event> {
		self.events.lock().unwrap().drain(..).collect()
	}
}

impl ChainAdapter for EventLog {
	fn gaps_found(&self, gaps: Vec<Gap>) {
		self.events.lock().unwrap().push(Event::Gaps(gaps));
	}
	fn orphans_found(&self, orphans: Vec<Arc<BaseShare>>) {
		let hashes = orphans.iter().map(|s| s.hash).collect();
		self.events.lock().unwrap().push(Event::Orphans(hashes));
	}
	fn dead_share_arrived(&self, share: Arc<BaseShare>) {
		self.events.lock().unwrap().push(Event::Dead(share.hash));
	}
	fn candidate_arrived(&self, share: Arc<BaseShare>) {
		self.events.lock().unwrap().push(Event::Candidate(share.hash));
	}
	fn newest_changed(&self, share: Arc<BaseShare>) {
		self.events.lock().unwrap().push(Event::NewTip(share.hash));
	}
	fn chain_calculatable(&self) {
		self.events.lock().unwrap().push(Event::Calculatable);
	}
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

/// A fully linked chain of `count` shares starting at height 0, appended
/// in order. Returns the store and the shares, oldest first.
pub fn linked_chain(count: u32, adapter: Arc<EventLog>) -> (ShareChain, Vec<Arc<BaseShare>>) {
	let mut chain = ShareChain::new(adapter);
	let mut shares = Vec::with_capacity(count as usize);
	let mut previous = ZERO_HASH;
	for height in 0..count {
		let s = share(&format!("share-{}", height), height, previous);
		previous = s.hash;
		assert!(chain.append(s.clone()));
		shares.push(s);
	}
	(chain, shares)
}
