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

//! Walking and consistency checking: subchain iteration, verification
//! with the calculatable latch, and gap scanning.

mod common;

use rs2pool_chain::{Direction, Gap, ShareChain, BASE_CHAIN_LENGTH};
use rs2pool_core::hash::{sha256d, ZERO_HASH};

use crate::common::{linked_chain, share, Event, EventLog};

#[test]
fn subchain_walks_both_directions() {
	let log = EventLog::new();
	let (chain, shares) = linked_chain(10, log);

	let back: Vec<_> = chain
		.subchain(shares[9].hash, 3, Direction::Backward)
		.map(|s| s.height())
		.collect();
	assert_eq!(back, vec![9, 8, 7]);

	let forward: Vec<_> = chain
		.subchain(shares[4].hash, 3, Direction::Forward)
		.map(|s| s.height())
		.collect();
	assert_eq!(forward, vec![4, 5, 6]);

	// asking for more than exists stops at the chain ends
	let all: Vec<_> = chain
		.subchain(shares[0].hash, 100, Direction::Forward)
		.collect();
	assert_eq!(all.len(), 10);
}

#[test]
fn subchain_stops_at_missing_height() {
	let log = EventLog::new();
	let mut chain = ShareChain::new(log);
	let a = share("a", 0, ZERO_HASH);
	let b = share("b", 1, a.hash);
	let d = share("d", 3, sha256d(b"missing"));
	let e = share("e", 4, d.hash);
	chain.append(a);
	chain.append(b);
	chain.append(d.clone());
	chain.append(e.clone());

	let back: Vec<_> = chain
		.subchain(e.hash, 10, Direction::Backward)
		.map(|s| s.height())
		.collect();
	assert_eq!(back, vec![4, 3]);
}

#[test]
fn subchain_of_unknown_start_is_empty() {
	let log = EventLog::new();
	let (chain, _) = linked_chain(5, log);
	assert_eq!(
		chain
			.subchain(sha256d(b"nowhere"), 5, Direction::Backward)
			.count(),
		0
	);
}

#[test]
fn verify_latches_calculatable_once() {
	let log = EventLog::new();
	let (mut chain, shares) = linked_chain(BASE_CHAIN_LENGTH, log.clone());
	log.take();

	assert!(chain.verify());
	assert!(chain.is_verified());
	assert!(chain.is_calculatable());
	assert_eq!(log.take(), vec![Event::Calculatable]);

	// the latch fires only once
	assert!(chain.verify());
	assert_eq!(log.take(), vec![]);

	// the verified backward walk is fully parent-linked
	let walk: Vec<_> = chain
		.subchain(chain.newest_hash(), BASE_CHAIN_LENGTH, Direction::Backward)
		.collect();
	assert_eq!(walk.len(), BASE_CHAIN_LENGTH as usize);
	for pair in walk.windows(2) {
		assert_eq!(pair[0].previous_hash(), pair[1].hash);
	}
	assert_eq!(walk.last().unwrap().hash, shares[0].hash);
}

#[test]
fn verify_fails_on_broken_parent_link() {
	let log = EventLog::new();
	let mut chain = ShareChain::new(log);
	let a = share("a", 0, ZERO_HASH);
	let b = share("b", 1, a.hash);
	// c lies about its parent
	let c = share("c", 2, sha256d(b"forged"));
	let d = share("d", 3, c.hash);
	chain.append(a);
	chain.append(b);
	chain.append(c);
	chain.append(d);

	assert!(!chain.verify());
	assert!(!chain.is_verified());
	assert!(!chain.is_calculatable());
}

#[test]
fn verify_on_short_chain_stays_uncalculatable() {
	let log = EventLog::new();
	let (mut chain, _) = linked_chain(10, log.clone());
	log.take();

	assert!(chain.verify());
	assert!(chain.is_verified());
	assert!(!chain.is_calculatable());
	assert_eq!(log.take(), vec![]);
}

#[test]
fn check_gaps_reports_holes_and_short_window() {
	let log = EventLog::new();
	let mut chain = ShareChain::new(log.clone());
	let low = share("low", 10, ZERO_HASH);
	let high = share("high", 13, sha256d(b"pending"));
	chain.append(low.clone());
	chain.append(high.clone());
	log.take();

	chain.check_gaps();

	let window = 13u32 - 10 + 1;
	assert_eq!(
		log.take(),
		vec![Event::Gaps(vec![
			Gap {
				descendent: high.hash,
				descendent_height: 13,
				length: 3,
			},
			Gap {
				descendent: low.hash,
				descendent_height: 10,
				length: BASE_CHAIN_LENGTH - window,
			},
		])]
	);
}

#[test]
fn check_gaps_flags_consecutive_but_unlinked_heights() {
	let log = EventLog::new();
	let mut chain = ShareChain::new(log.clone());
	let a = share("a", 7, ZERO_HASH);
	let b = share("b", 8, sha256d(b"not-a"));
	chain.append(a);
	chain.append(b.clone());
	log.take();

	chain.check_gaps();

	let events = log.take();
	assert_eq!(events.len(), 1);
	match &events[0] {
		Event::Gaps(gaps) => {
			assert_eq!(
				gaps[0],
				Gap {
					descendent: b.hash,
					descendent_height: 8,
					length: 1,
				}
			);
			// plus the terminal gap for the short window
			assert_eq!(gaps.len(), 2);
		}
		other => panic!("expected gaps, got {:?}", other),
	}
}

#[test]
fn check_gaps_is_quiet_on_a_full_linked_window() {
	let log = EventLog::new();
	let (chain, _) = linked_chain(BASE_CHAIN_LENGTH, log.clone());
	log.take();

	chain.check_gaps();
	assert_eq!(log.take(), vec![]);
}
