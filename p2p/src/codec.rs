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

//! Stateful reader turning the byte stream of a TCP connection into
//! decoded protocol messages. Reads exactly one 28-byte header, then
//! exactly the advertised payload, verifies the payload checksum and
//! decodes. Trailing bytes already buffered are drained before the socket
//! is read again, so frames packed into one TCP segment all come through.

use std::io::Read;
use std::net::TcpStream;
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};

use crate::core::hash::checksum;

use crate::msg::{decode_message, Message, MsgHeaderWrapper, PROTOCOL_HEAD_LENGTH};
use crate::types::Error;

use MsgHeaderWrapper::*;
use State::*;

/// Longest we wait between frames before the link is considered idle and
/// torn down.
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(10_000);
const BODY_IO_TIMEOUT: Duration = Duration::from_millis(10_000);

enum State {
	None,
	Header(MsgHeaderWrapper),
}

pub struct Codec {
	magic: [u8; 8],
	stream: TcpStream,
	buffer: BytesMut,
	state: State,
	bytes_read: usize,
}

impl Codec {
	pub fn new(magic: [u8; 8], stream: TcpStream) -> Self {
		Self {
			magic,
			stream,
			buffer: BytesMut::with_capacity(8 * 1024),
			state: None,
			bytes_read: 0,
		}
	}

	/// Length of the next item we are expecting, either a header or a
	/// full payload
	fn next_len(&self) -> usize {
		match &self.state {
			None => PROTOCOL_HEAD_LENGTH,
			Header(Known(header)) => header.msg_len as usize,
			Header(Unknown(len, _)) => *len as usize,
		}
	}

	/// Set stream timeout depending on the next expected item
	fn set_stream_timeout(&self) -> Result<(), Error> {
		let timeout = match &self.state {
			None => IDLE_TIMEOUT,
			_ => BODY_IO_TIMEOUT,
		};
		self.stream.set_read_timeout(Some(timeout))?;
		Ok(())
	}

	fn read_inner(&mut self) -> Result<Message, Error> {
		self.bytes_read = 0;
		loop {
			let next_len = self.next_len();
			let pre_len = self.buffer.len();
			// Buffer could already be partially filled, calculate additional
			// bytes we need
			let to_read = next_len.saturating_sub(pre_len);
			if to_read > 0 {
				self.buffer.reserve(to_read);
				for _ in 0..to_read {
					self.buffer.put_u8(0);
				}
				self.set_stream_timeout()?;
				if let Err(e) = self.stream.read_exact(&mut self.buffer[pre_len..]) {
					// Undo reserved bytes on a failed read
					self.buffer.truncate(pre_len);
					return Err(e.into());
				}
				self.bytes_read += to_read;
			}
			match &self.state {
				None => {
					// Parse header and keep reading
					let raw = self.buffer.split_to(next_len);
					let header = MsgHeaderWrapper::decode(&raw, &self.magic)?;
					self.state = Header(header);
				}
				Header(Known(header)) => {
					// Checksum the payload, then return the full message
					let raw = self.buffer.split_to(next_len);
					if checksum(&raw) != header.checksum {
						return Err(Error::BadChecksum);
					}
					let msg = decode_message(header, &raw);
					self.state = None;
					return msg;
				}
				Header(Unknown(_, cmd)) => {
					// Discard body and return
					let cmd = cmd.clone();
					self.buffer.advance(next_len);
					self.state = None;
					return Ok(Message::Unknown(cmd));
				}
			}
		}
	}

	/// Blocking read of the next message
	pub fn read(&mut self) -> (Result<Message, Error>, u64) {
		let msg = self.read_inner();
		(msg, self.bytes_read as u64)
	}
}
