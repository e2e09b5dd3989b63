use crate::net::support::{ClientError, ClientResult};
use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

// All header fields travel in host byte order. The format is fixed by the
// server, which performs no byte swapping either.

/// Sentinel identifying a batch transmission.
pub const MAGIC: u32 = 0x524F4943;

/// Wire protocol revision accepted by the server.
pub const PROTOCOL_VERSION: u16 = 2;

/// Requests server-side pipelining of the batch.
pub const FLAG_PIPELINE: u32 = 0x2;

/// Signals that further transmissions follow on this session.
pub const FLAG_MORE: u32 = 0x4;

/// Flag word carried on every client transmission.
pub const BATCH_FLAGS: u32 = FLAG_PIPELINE | FLAG_MORE;

/// Operation identifiers as transmitted in `OpHeader::command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    Get = 1,
    Insert = 2,
    Delete = 3,
    /// Reserved by the server; never sent directly by this client.
    Batch = 5,
    RangeQuery = 6,
    AtomicIncDec = 7,
}

impl Command {
    pub fn from_wire(raw: u16) -> ClientResult<Command> {
        match raw {
            1 => Ok(Command::Get),
            2 => Ok(Command::Insert),
            3 => Ok(Command::Delete),
            5 => Ok(Command::Batch),
            6 => Ok(Command::RangeQuery),
            7 => Ok(Command::AtomicIncDec),
            _ => Err(ClientError::Protocol),
        }
    }
}

impl From<Command> for u16 {
    #[inline]
    fn from(command: Command) -> u16 {
        command as u16
    }
}

/// Leading header of every batch transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchHeader {
    pub count: u16,
    pub flags: u32,
}

impl BatchHeader {
    pub const SIZE: usize = 12;

    #[inline]
    pub fn new(count: u16) -> BatchHeader {
        BatchHeader {
            count,
            flags: BATCH_FLAGS,
        }
    }

    pub fn write<W: Write>(&self, stream: &mut W) -> io::Result<()> {
        stream.write_u32::<NativeEndian>(MAGIC)?;
        stream.write_u16::<NativeEndian>(PROTOCOL_VERSION)?;
        stream.write_u16::<NativeEndian>(self.count)?;
        stream.write_u32::<NativeEndian>(self.flags)
    }

    pub fn read<R: Read>(stream: &mut R) -> ClientResult<BatchHeader> {
        let magic = stream.read_u32::<NativeEndian>()?;
        let version = stream.read_u16::<NativeEndian>()?;

        if magic != MAGIC || version != PROTOCOL_VERSION {
            return Err(ClientError::Protocol);
        }

        Ok(BatchHeader {
            count: stream.read_u16::<NativeEndian>()?,
            flags: stream.read_u32::<NativeEndian>()?,
        })
    }

    /// Serialized header bytes, for referencing out of a vectored send.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut raw = [0u8; Self::SIZE];
        self.write(&mut &mut raw[..]).expect("Batch header must fit its fixed buffer");
        raw
    }
}

/// Per-operation request header. `value_len` is the raw server-interpreted
/// length: payload bytes for Insert/AtomicIncDec, upper-bound key length for
/// RangeQuery, zero otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpHeader {
    pub command: Command,
    pub key_len: u16,
    pub value_len: u32,
    pub timestamp: u64,
}

impl OpHeader {
    pub const SIZE: usize = 16;

    pub fn write<W: Write>(&self, stream: &mut W) -> io::Result<()> {
        stream.write_u16::<NativeEndian>(self.command.into())?;
        stream.write_u16::<NativeEndian>(self.key_len)?;
        stream.write_u32::<NativeEndian>(self.value_len)?;
        stream.write_u64::<NativeEndian>(self.timestamp)
    }

    pub fn read<R: Read>(stream: &mut R) -> ClientResult<OpHeader> {
        Ok(OpHeader {
            command: Command::from_wire(stream.read_u16::<NativeEndian>()?)?,
            key_len: stream.read_u16::<NativeEndian>()?,
            value_len: stream.read_u32::<NativeEndian>()?,
            timestamp: stream.read_u64::<NativeEndian>()?,
        })
    }

    /// Serialized header bytes, for referencing out of a vectored send.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut raw = [0u8; Self::SIZE];
        self.write(&mut &mut raw[..]).expect("Op header must fit its fixed buffer");
        raw
    }
}

/// Per-operation response header. The meaning of `value_len` depends on the
/// originating command: byte count for Get, always 8 for AtomicIncDec, and
/// the number of result entries for RangeQuery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: i32,
    pub value_len: u32,
}

impl ResponseHeader {
    pub const SIZE: usize = 8;

    pub fn write<W: Write>(&self, stream: &mut W) -> io::Result<()> {
        stream.write_i32::<NativeEndian>(self.status)?;
        stream.write_u32::<NativeEndian>(self.value_len)
    }

    pub fn read<R: Read>(stream: &mut R) -> ClientResult<ResponseHeader> {
        Ok(ResponseHeader {
            status: stream.read_i32::<NativeEndian>()?,
            value_len: stream.read_u32::<NativeEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_batch_header_sentinel_bytes() {
        let raw = BatchHeader::new(3).encode();

        assert_eq!(&raw[0..4], &MAGIC.to_ne_bytes());
        assert_eq!(&raw[4..6], &PROTOCOL_VERSION.to_ne_bytes());
        assert_eq!(&raw[6..8], &3u16.to_ne_bytes());
        assert_eq!(&raw[8..12], &0x6u32.to_ne_bytes());
    }

    #[test]
    fn test_batch_header_roundtrip() {
        let header = BatchHeader::new(128);
        let raw = header.encode();

        let decoded = BatchHeader::read(&mut Cursor::new(&raw[..])).unwrap();

        assert_eq!(decoded, header);
    }

    #[test]
    fn test_batch_header_rejects_bad_magic() {
        let mut raw = BatchHeader::new(1).encode();
        raw[0] ^= 0xff;

        let result = BatchHeader::read(&mut Cursor::new(&raw[..]));

        assert_eq!(result.unwrap_err(), ClientError::Protocol);
    }

    #[test]
    fn test_batch_header_rejects_bad_version() {
        let mut header = BatchHeader::new(1).encode();
        // Overwrite the version field with an unsupported revision.
        header[4..6].copy_from_slice(&9u16.to_ne_bytes());

        let result = BatchHeader::read(&mut Cursor::new(&header[..]));

        assert_eq!(result.unwrap_err(), ClientError::Protocol);
    }

    #[test]
    fn test_op_header_roundtrip() {
        let commands = [
            Command::Get,
            Command::Insert,
            Command::Delete,
            Command::RangeQuery,
            Command::AtomicIncDec,
        ];

        for command in commands {
            for key_len in [1u16, 512] {
                for value_len in [0u32, 1, 100_000] {
                    let header = OpHeader {
                        command,
                        key_len,
                        value_len,
                        timestamp: 0xdead_beef_0102_0304,
                    };

                    let raw = header.encode();
                    let decoded = OpHeader::read(&mut Cursor::new(&raw[..])).unwrap();

                    assert_eq!(decoded, header);
                }
            }
        }
    }

    #[test]
    fn test_op_header_rejects_unknown_command() {
        let mut raw = [0u8; OpHeader::SIZE];
        raw[0..2].copy_from_slice(&4u16.to_ne_bytes());

        let result = OpHeader::read(&mut Cursor::new(&raw[..]));

        assert_eq!(result.unwrap_err(), ClientError::Protocol);
    }

    #[test]
    fn test_response_header_roundtrip() {
        let header = ResponseHeader {
            status: -6,
            value_len: 42,
        };

        let mut raw = Vec::new();
        header.write(&mut raw).unwrap();
        let decoded = ResponseHeader::read(&mut Cursor::new(&raw[..])).unwrap();

        assert_eq!(decoded, header);
        assert_eq!(raw.len(), ResponseHeader::SIZE);
    }

    #[test]
    fn test_header_sizes() {
        assert_eq!(BatchHeader::new(0).encode().len(), 12);
        assert_eq!(
            OpHeader {
                command: Command::Get,
                key_len: 0,
                value_len: 0,
                timestamp: 0,
            }
            .encode()
            .len(),
            16
        );
    }
}
