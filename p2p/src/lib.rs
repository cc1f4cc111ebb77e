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

//! Networking code to connect to other pool peers and exchange shares,
//! transaction inventory and share-chain history.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

use rs2pool_chain as chain;
use rs2pool_core as core;
use rs2pool_util as util;

mod codec;
mod conn;
pub mod msg;
mod peer;
mod peers;
mod serv;
pub mod types;

pub use crate::codec::IDLE_TIMEOUT;
pub use crate::peer::Peer;
pub use crate::peers::{Peers, PoolChainAdapter};
pub use crate::serv::Server;
pub use crate::types::{
	BlockchainCodec, Error, NoopPersister, P2pConfig, PeerInfo, PoolAdapter, Sha2dCodec,
	SharePersister, DEFAULT_MAGIC, PROTOCOL_VERSION, USER_AGENT,
};
