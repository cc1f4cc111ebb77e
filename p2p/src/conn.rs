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

//! Provides a connection wrapper that handles the lower level tasks in
//! sending or receiving data from the TCP socket, as well as dealing with
//! timeouts. One reader thread per connection feeds decoded messages to a
//! handler; writes go out synchronously through a shared send handle.

use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::core::ser::Writeable;

use crate::codec::Codec;
use crate::msg::{write_message, Message, Type};
use crate::types::Error;

/// Handler to provide to the connection, called back on the reader thread
/// any time a message is received.
pub trait MessageHandler: Send + Sync {
	/// Process one decoded inbound message.
	fn consume(&self, msg: Message) -> Result<(), Error>;

	/// The read side terminated: handler error, decode failure, timeout,
	/// EOF or a requested stop. Called exactly once, last.
	fn disconnected(&self, reason: Option<Error>);
}

/// Bytes sent and received over one connection.
#[derive(Clone, Default)]
pub struct Tracker {
	sent_bytes: Arc<Mutex<u64>>,
	received_bytes: Arc<Mutex<u64>>,
}

impl Tracker {
	pub fn new() -> Tracker {
		Tracker::default()
	}

	pub fn inc_sent(&self, size: u64) {
		*self.sent_bytes.lock().unwrap() += size;
	}

	pub fn inc_received(&self, size: u64) {
		*self.received_bytes.lock().unwrap() += size;
	}

	/// Bytes (sent, received) so far.
	pub fn transmitted_bytes(&self) -> (u64, u64) {
		let sent = *self.sent_bytes.lock().unwrap();
		let recv = *self.received_bytes.lock().unwrap();
		(sent, recv)
	}
}

/// Writing half of a connection. Frames and writes messages directly;
/// cheap to clone and safe to share between threads.
#[derive(Clone)]
pub struct SendHandle {
	stream: Arc<Mutex<TcpStream>>,
	magic: [u8; 8],
	tracker: Tracker,
}

impl SendHandle {
	/// Serialize, frame and write a message.
	pub fn send(&self, msg_type: Type, body: &dyn Writeable) -> Result<(), Error> {
		let mut stream = self.stream.lock().unwrap();
		let sent = write_message(&mut *stream, msg_type, body, &self.magic)?;
		self.tracker.inc_sent(sent);
		Ok(())
	}
}

/// Controls the reader thread of a connection. Stopping is idempotent.
pub struct StopHandle {
	stopped: Arc<AtomicBool>,
	stream: TcpStream,
}

impl StopHandle {
	/// Signals the reader thread to exit and shuts the socket down. Safe
	/// to call any number of times.
	pub fn stop(&self) {
		if self.stopped.swap(true, Ordering::SeqCst) {
			return;
		}
		if let Err(e) = self.stream.shutdown(Shutdown::Both) {
			debug!("stop: error shutting down socket: {:?}", e);
		}
	}

	/// Whether stop was already requested.
	pub fn is_stopped(&self) -> bool {
		self.stopped.load(Ordering::SeqCst)
	}
}

/// Starts listening on the provided connection. Returns the send handle
/// for the writing half and the stop handle controlling the reader thread.
pub fn listen(
	stream: TcpStream,
	magic: [u8; 8],
	tracker: Tracker,
	handler: Arc<dyn MessageHandler>,
) -> Result<(SendHandle, StopHandle), Error> {
	let write_stream = stream.try_clone().map_err(Error::Connection)?;
	let shutdown_stream = stream.try_clone().map_err(Error::Connection)?;

	let stopped = Arc::new(AtomicBool::new(false));
	let send_handle = SendHandle {
		stream: Arc::new(Mutex::new(write_stream)),
		magic,
		tracker: tracker.clone(),
	};
	let stop_handle = StopHandle {
		stopped: stopped.clone(),
		stream: shutdown_stream,
	};

	let peer_addr = stream
		.peer_addr()
		.map(|a| a.to_string())
		.unwrap_or_else(|_| "?".to_owned());
	thread::Builder::new()
		.name("peer_read".to_string())
		.spawn(move || {
			let mut codec = Codec::new(magic, stream);
			let reason = loop {
				if stopped.load(Ordering::SeqCst) {
					break Option::None;
				}
				let (msg, bytes_read) = codec.read();
				tracker.inc_received(bytes_read);
				match msg {
					Ok(msg) => {
						if let Err(e) = handler.consume(msg) {
							break Some(e);
						}
					}
					Err(e) => {
						// a stop closes the socket under us, don't report
						// the resulting read error
						if stopped.load(Ordering::SeqCst) {
							break Option::None;
						}
						break Some(e);
					}
				}
			};
			debug!("peer_read: {} done, reason {:?}", peer_addr, reason);
			stopped.store(true, Ordering::SeqCst);
			handler.disconnected(reason);
		})
		.map_err(|e| Error::Connection(e.into()))?;

	Ok((send_handle, stop_handle))
}
