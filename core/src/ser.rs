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

//! Serialization and deserialization layer specialized for binary encoding.
//! Ensures consistency and safety. Basically a minimal subset of
//! rustc_serialize customized for our need.
//!
//! To use it simply implement `Writeable` or `Readable` and then use the
//! `serialize` or `deserialize` functions on them as appropriate.
//!
//! The share-chain wire protocol is little-endian throughout, so all
//! number writes and reads here are LE.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// The maximum size of a variable-size byte string we accept from the
/// wire in a single read. Anything larger is either corrupt or abusive.
const MAX_VAR_READ: usize = 100_000;

/// Possible errors deriving from serializing or deserializing.
#[derive(Debug, Fail, Clone, Eq, PartialEq)]
pub enum Error {
	/// Wraps an io error produced when reading or writing
	#[fail(display = "io error: {} - {:?}", _0, _1)]
	IOErr(String, io::ErrorKind),
	/// Expected a given value that wasn't found
	#[fail(display = "expected {:?}, got {:?}", expected, received)]
	UnexpectedData {
		/// What we wanted
		expected: Vec<u8>,
		/// What we got
		received: Vec<u8>,
	},
	/// Data wasn't in a consumable format
	#[fail(display = "corrupted data")]
	CorruptedData,
	/// When asked to read too much data
	#[fail(display = "too large read: {}", _0)]
	TooLargeReadErr(u64),
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::IOErr(e.to_string(), e.kind())
	}
}

/// Implementations defined how different numbers and binary structures are
/// written to an underlying stream or container (depending on implementation).
pub trait Writer {
	/// Writes a u8 as bytes
	fn write_u8(&mut self, n: u8) -> Result<(), Error>;
	/// Writes a u16 as bytes
	fn write_u16(&mut self, n: u16) -> Result<(), Error>;
	/// Writes a u32 as bytes
	fn write_u32(&mut self, n: u32) -> Result<(), Error>;
	/// Writes a u64 as bytes
	fn write_u64(&mut self, n: u64) -> Result<(), Error>;
	/// Writes a i64 as bytes
	fn write_i64(&mut self, n: i64) -> Result<(), Error>;
	/// Writes a variable number of bytes. The length is encoded as a u64
	/// prefix.
	fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;
	/// Writes a fixed number of bytes. The reader is expected to know the
	/// actual length on read.
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

/// Implementations defined how different numbers and binary structures are
/// read from an underlying stream or container (depending on implementation).
pub trait Reader {
	/// Read a u8 from the underlying Read
	fn read_u8(&mut self) -> Result<u8, Error>;
	/// Read a u16 from the underlying Read
	fn read_u16(&mut self) -> Result<u16, Error>;
	/// Read a u32 from the underlying Read
	fn read_u32(&mut self) -> Result<u32, Error>;
	/// Read a u64 from the underlying Read
	fn read_u64(&mut self) -> Result<u64, Error>;
	/// Read a i64 from the underlying Read
	fn read_i64(&mut self) -> Result<i64, Error>;
	/// Read a variable number of bytes, whose length is a u64 prefix read
	/// first before the data bytes.
	fn read_bytes_len_prefix(&mut self) -> Result<Vec<u8>, Error>;
	/// Read a fixed number of bytes from the underlying reader.
	fn read_fixed_bytes(&mut self, length: usize) -> Result<Vec<u8>, Error>;
	/// Consumes a byte from the reader, producing an error if it doesn't have
	/// the expected value
	fn expect_u8(&mut self, val: u8) -> Result<u8, Error>;
}

/// Trait that every type that can be serialized as binary must implement.
/// Writes directly to a Writer, a utility type thinly wrapping an
/// underlying Write implementation.
pub trait Writeable {
	/// Write the data held by this Writeable to the provided writer
	fn write(&self, writer: &mut dyn Writer) -> Result<(), Error>;
}

/// Trait that every type that can be deserialized from binary must implement.
/// Reads directly to a Reader, a utility type thinly wrapping an
/// underlying Read implementation.
pub trait Readable: Sized {
	/// Reads the data necessary to this Readable from the provided reader
	fn read(reader: &mut dyn Reader) -> Result<Self, Error>;
}

/// Deserializes a Readable from any std::io::Read implementation.
pub fn deserialize<T: Readable>(source: &mut dyn Read) -> Result<T, Error> {
	let mut reader = BinReader { source };
	T::read(&mut reader)
}

/// Serializes a Writeable into any std::io::Write implementation.
pub fn serialize(sink: &mut dyn Write, thing: &dyn Writeable) -> Result<(), Error> {
	let mut writer = BinWriter { sink };
	thing.write(&mut writer)
}

/// Utility function to serialize a writeable directly in memory using a
/// Vec<u8>.
pub fn ser_vec(thing: &dyn Writeable) -> Result<Vec<u8>, Error> {
	let mut vec = vec![];
	serialize(&mut vec, thing)?;
	Ok(vec)
}

/// Utility to read a full buffer as a single Readable, erroring out on
/// trailing bytes.
pub fn deserialize_exact<T: Readable>(buf: &[u8]) -> Result<T, Error> {
	let mut source = buf;
	let res = deserialize(&mut source)?;
	if !source.is_empty() {
		return Err(Error::CorruptedData);
	}
	Ok(res)
}

/// Reads a collection of serialized items into a Vec. The count is read
/// first as a u64 prefix.
pub fn read_multi<T: Readable>(reader: &mut dyn Reader) -> Result<Vec<T>, Error> {
	let count = reader.read_u64()?;
	if count > MAX_VAR_READ as u64 {
		return Err(Error::TooLargeReadErr(count));
	}
	let mut res = Vec::with_capacity(count as usize);
	for _ in 0..count {
		res.push(T::read(reader)?);
	}
	Ok(res)
}

/// Writes a collection of serialized items, prefixed by its count as u64.
pub fn write_multi<T: Writeable>(writer: &mut dyn Writer, items: &[T]) -> Result<(), Error> {
	writer.write_u64(items.len() as u64)?;
	for item in items {
		item.write(writer)?;
	}
	Ok(())
}

struct BinReader<'a> {
	source: &'a mut dyn Read,
}

/// Utility wrapper for an underlying byte Reader. Defines higher level
/// methods to read numbers, byte vectors, hashes, etc.
impl<'a> Reader for BinReader<'a> {
	fn read_u8(&mut self) -> Result<u8, Error> {
		self.source.read_u8().map_err(From::from)
	}
	fn read_u16(&mut self) -> Result<u16, Error> {
		self.source.read_u16::<LittleEndian>().map_err(From::from)
	}
	fn read_u32(&mut self) -> Result<u32, Error> {
		self.source.read_u32::<LittleEndian>().map_err(From::from)
	}
	fn read_u64(&mut self) -> Result<u64, Error> {
		self.source.read_u64::<LittleEndian>().map_err(From::from)
	}
	fn read_i64(&mut self) -> Result<i64, Error> {
		self.source.read_i64::<LittleEndian>().map_err(From::from)
	}
	fn read_bytes_len_prefix(&mut self) -> Result<Vec<u8>, Error> {
		let len = self.read_u64()?;
		self.read_fixed_bytes(len as usize)
	}
	fn read_fixed_bytes(&mut self, length: usize) -> Result<Vec<u8>, Error> {
		if length > MAX_VAR_READ {
			return Err(Error::TooLargeReadErr(length as u64));
		}
		let mut buf = vec![0; length];
		self.source
			.read_exact(&mut buf)
			.map(move |_| buf)
			.map_err(From::from)
	}
	fn expect_u8(&mut self, val: u8) -> Result<u8, Error> {
		let b = self.read_u8()?;
		if b == val {
			Ok(b)
		} else {
			Err(Error::UnexpectedData {
				expected: vec![val],
				received: vec![b],
			})
		}
	}
}

/// Utility wrapper for an underlying byte Writer. Defines higher level
/// methods to write numbers, byte vectors, hashes, etc.
pub struct BinWriter<'a> {
	sink: &'a mut dyn Write,
}

impl<'a> BinWriter<'a> {
	/// Wrap a standard Write in a binary protocol writer.
	pub fn new(sink: &'a mut dyn Write) -> BinWriter<'a> {
		BinWriter { sink }
	}
}

impl<'a> Writer for BinWriter<'a> {
	fn write_u8(&mut self, n: u8) -> Result<(), Error> {
		self.sink.write_u8(n).map_err(From::from)
	}
	fn write_u16(&mut self, n: u16) -> Result<(), Error> {
		self.sink.write_u16::<LittleEndian>(n).map_err(From::from)
	}
	fn write_u32(&mut self, n: u32) -> Result<(), Error> {
		self.sink.write_u32::<LittleEndian>(n).map_err(From::from)
	}
	fn write_u64(&mut self, n: u64) -> Result<(), Error> {
		self.sink.write_u64::<LittleEndian>(n).map_err(From::from)
	}
	fn write_i64(&mut self, n: i64) -> Result<(), Error> {
		self.sink.write_i64::<LittleEndian>(n).map_err(From::from)
	}
	fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.write_u64(bytes.len() as u64)?;
		self.sink.write_all(bytes).map_err(From::from)
	}
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.sink.write_all(bytes).map_err(From::from)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	struct Pair(u32, Vec<u8>);

	impl Writeable for Pair {
		fn write(&self, writer: &mut dyn Writer) -> Result<(), Error> {
			writer.write_u32(self.0)?;
			writer.write_bytes(&self.1)
		}
	}

	impl Readable for Pair {
		fn read(reader: &mut dyn Reader) -> Result<Pair, Error> {
			let n = reader.read_u32()?;
			let v = reader.read_bytes_len_prefix()?;
			Ok(Pair(n, v))
		}
	}

	#[test]
	fn serialize_little_endian() {
		let buf = ser_vec(&Pair(258, vec![7, 8])).unwrap();
		// u32 LE, then u64 LE length prefix, then the bytes themselves
		assert_eq!(
			buf,
			vec![2, 1, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 7, 8]
		);
	}

	#[test]
	fn round_trip_exact() {
		let buf = ser_vec(&Pair(42, vec![1, 2, 3])).unwrap();
		let p: Pair = deserialize_exact(&buf).unwrap();
		assert_eq!(p.0, 42);
		assert_eq!(p.1, vec![1, 2, 3]);
	}

	#[test]
	fn trailing_bytes_rejected() {
		let mut buf = ser_vec(&Pair(42, vec![])).unwrap();
		buf.push(0);
		assert!(deserialize_exact::<Pair>(&buf).is_err());
	}

	#[test]
	fn truncated_read_fails() {
		let buf = ser_vec(&Pair(42, vec![1, 2, 3])).unwrap();
		assert!(deserialize_exact::<Pair>(&buf[..buf.len() - 1]).is_err());
	}
}
