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

//! The share-chain store and its event types. Keeps every share inside a
//! bounded sliding window, dual-indexed by hash and height, and reports
//! gaps, orphans, dead shares and tip changes to an adapter.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;

use rs2pool_core as core;

mod chain;
pub mod types;

pub use crate::chain::{ShareChain, BASE_CHAIN_LENGTH, MAX_CHAIN_LENGTH};
pub use crate::types::{ChainAdapter, Direction, Gap, NoopAdapter};
