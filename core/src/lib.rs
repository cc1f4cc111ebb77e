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

//! Share, transaction and serialization primitives shared by the rs2pool
//! chain store and peer protocol.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate failure_derive;

use rs2pool_util as util;

pub mod hash;
pub mod ser;
pub mod share;
pub mod tx;

pub use crate::hash::{checksum, sha256, sha256d, Hash, Hashed, ZERO_HASH};
pub use crate::share::{BaseShare, ShareData, ShareInfo, WrappedShare, SHARE_VERSION};
pub use crate::tx::{GetBlockTemplate, TxTemplate};
