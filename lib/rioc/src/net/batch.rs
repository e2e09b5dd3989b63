use crate::net::frame::{Command, OpHeader};
use crate::net::support::{ClientError, ClientResult, MAX_BATCH_OPS, MAX_KEY_LEN, MAX_VALUE_LEN};

/// Alignment of value payloads inside the staging buffer. Each payload
/// starts on its own cache line, at an address that stays stable for the
/// vectored send.
const STAGING_ALIGN: usize = 64;

/// Initial staging capacity; grows on demand during assembly.
const STAGING_INITIAL_CAPACITY: usize = 16 * 1024;

/// A single accumulated operation. The key lives inline so adding an
/// operation performs no allocation of its own.
#[derive(Debug)]
pub(crate) struct OpRecord {
    pub command: Command,
    pub timestamp: u64,
    pub key_len: u16,
    pub value_offset: usize,
    pub value_len: u32,
    key: [u8; MAX_KEY_LEN],
}

impl OpRecord {
    #[inline]
    pub fn key_bytes(&self) -> &[u8] {
        &self.key[..self.key_len as usize]
    }

    #[inline]
    pub fn header(&self) -> OpHeader {
        OpHeader {
            command: self.command,
            key_len: self.key_len,
            value_len: self.value_len,
            timestamp: self.timestamp,
        }
    }
}

/// Reusable container accumulating up to 128 operations for one pipelined
/// transmission. Keys and values are copied in on add; the caller does not
/// need to keep them alive. Immutable once submitted.
#[derive(Debug)]
pub struct Batch {
    ops: Vec<OpRecord>,
    staging: Vec<u8>,
}

impl Batch {
    pub fn new() -> Batch {
        Batch {
            ops: Vec::with_capacity(MAX_BATCH_OPS),
            staging: Vec::with_capacity(STAGING_INITIAL_CAPACITY),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Drops all accumulated operations while keeping the staging
    /// allocation for reuse.
    pub fn clear(&mut self) {
        self.ops.clear();
        self.staging.clear();
    }

    /// Appends a point lookup.
    pub fn add_get(&mut self, key: &[u8]) -> ClientResult<()> {
        self.push(Command::Get, key, None, 0)
    }

    /// Appends an insert or overwrite of `key` with `value`.
    pub fn add_insert(&mut self, key: &[u8], value: &[u8], timestamp: u64) -> ClientResult<()> {
        if value.len() > MAX_VALUE_LEN {
            return Err(ClientError::Param);
        }
        self.push(Command::Insert, key, Some(value), timestamp)
    }

    /// Appends a deletion of `key`.
    pub fn add_delete(&mut self, key: &[u8], timestamp: u64) -> ClientResult<()> {
        self.push(Command::Delete, key, None, timestamp)
    }

    /// Appends a range scan over `start_key..=end_key`. The upper bound
    /// travels in the value slot of the operation.
    pub fn add_range_query(&mut self, start_key: &[u8], end_key: &[u8]) -> ClientResult<()> {
        if end_key.is_empty() || end_key.len() > MAX_KEY_LEN {
            return Err(ClientError::Param);
        }
        self.push(Command::RangeQuery, start_key, Some(end_key), 0)
    }

    /// Appends an atomic counter adjustment by `delta`. The delta travels
    /// as an 8-byte signed integer in native byte order.
    pub fn add_atomic_inc_dec(&mut self, key: &[u8], delta: i64, timestamp: u64) -> ClientResult<()> {
        self.push(Command::AtomicIncDec, key, Some(&delta.to_ne_bytes()), timestamp)
    }

    fn push(
        &mut self,
        command: Command,
        key: &[u8],
        value: Option<&[u8]>,
        timestamp: u64,
    ) -> ClientResult<()> {
        if self.ops.len() >= MAX_BATCH_OPS {
            return Err(ClientError::Param);
        }
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(ClientError::Param);
        }

        let (value_offset, value_len) = match value {
            Some(data) if !data.is_empty() => (self.stage(data), data.len() as u32),
            _ => (0, 0),
        };

        let mut record = OpRecord {
            command,
            timestamp,
            key_len: key.len() as u16,
            value_offset,
            value_len,
            key: [0; MAX_KEY_LEN],
        };
        record.key[..key.len()].copy_from_slice(key);

        self.ops.push(record);
        Ok(())
    }

    /// Copies the payload to the next cache-line aligned staging offset and
    /// returns that offset.
    fn stage(&mut self, data: &[u8]) -> usize {
        let offset = (self.staging.len() + STAGING_ALIGN - 1) / STAGING_ALIGN * STAGING_ALIGN;
        self.staging.resize(offset, 0);
        self.staging.extend_from_slice(data);
        offset
    }

    #[inline]
    pub(crate) fn ops(&self) -> &[OpRecord] {
        &self.ops
    }

    /// The staged value payload of `op`; empty when the operation carries
    /// no value.
    #[inline]
    pub(crate) fn value_bytes(&self, op: &OpRecord) -> &[u8] {
        &self.staging[op.value_offset..op.value_offset + op.value_len as usize]
    }
}
