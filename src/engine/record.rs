//! On-disk record framing for [`super::FileEngine`]
//!
//! ```text
//! +------------------+
//! | Record Length    | (u32 LE, whole record including this field)
//! +------------------+
//! | Kind             | (u8)
//! +------------------+
//! | Payload          | (kind specific)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 over length + kind + payload)
//! +------------------+
//! ```
//!
//! Payloads:
//!
//! ```text
//! document: db_seq u64 | rev_seq u64 | deleted u8 | content_meta u8 |
//!           id bytes | rev_meta bytes | body bytes
//! local:    deleted u8 | id bytes | body bytes
//! header:   version u8 | update_seq u64
//! ```
//!
//! `bytes` is a u32 LE length followed by the data.

use std::io::Read;

use crc32fast::Hasher;

use super::errors::{EngineError, EngineResult};
use super::{InfoRef, LocalRecordRef};

/// length + kind + checksum
pub(crate) const MIN_RECORD_SIZE: usize = 4 + 1 + 4;

/// Encoded size of a header record: version u8 + update_seq u64.
pub(crate) const HEADER_RECORD_SIZE: usize = MIN_RECORD_SIZE + 1 + 8;

const KIND_DOCUMENT: u8 = 0x01;
const KIND_LOCAL: u8 = 0x02;
const KIND_HEADER: u8 = 0x03;

fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// A regular document as it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocumentEntry {
    pub db_seq: u64,
    pub rev_seq: u64,
    pub deleted: bool,
    pub content_meta: u8,
    pub id: Vec<u8>,
    pub rev_meta: Vec<u8>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalEntry {
    pub deleted: bool,
    pub id: Vec<u8>,
    pub body: Vec<u8>,
}

/// Commit marker. Everything before it is durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeaderEntry {
    pub version: u8,
    pub update_seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DiskRecord {
    Document(DocumentEntry),
    Local(LocalEntry),
    Header(HeaderEntry),
}

fn put_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
}

/// Wraps a payload with length, kind and checksum.
fn frame(kind: u8, payload: &[u8]) -> EngineResult<Vec<u8>> {
    let total = MIN_RECORD_SIZE + payload.len();
    let record_length = u32::try_from(total).map_err(|_| EngineError::InvalidArguments)?;

    let mut record = Vec::new();
    record
        .try_reserve_exact(total)
        .map_err(|_| EngineError::AllocFail)?;
    record.extend_from_slice(&record_length.to_le_bytes());
    record.push(kind);
    record.extend_from_slice(payload);
    let checksum = compute_checksum(&record);
    record.extend_from_slice(&checksum.to_le_bytes());

    Ok(record)
}

pub(crate) fn encode_document(db_seq: u64, info: &InfoRef<'_>, body: &[u8]) -> EngineResult<Vec<u8>> {
    let mut payload =
        Vec::with_capacity(8 + 8 + 2 + 12 + info.id.len() + info.rev_meta.len() + body.len());
    payload.extend_from_slice(&db_seq.to_le_bytes());
    payload.extend_from_slice(&info.rev_seq.to_le_bytes());
    payload.push(u8::from(info.deleted));
    payload.push(info.content_meta);
    put_bytes(&mut payload, info.id);
    put_bytes(&mut payload, info.rev_meta);
    put_bytes(&mut payload, body);
    frame(KIND_DOCUMENT, &payload)
}

pub(crate) fn encode_local(record: &LocalRecordRef<'_>) -> EngineResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(1 + 8 + record.id.len() + record.body.len());
    payload.push(u8::from(record.deleted));
    put_bytes(&mut payload, record.id);
    put_bytes(&mut payload, record.body);
    frame(KIND_LOCAL, &payload)
}

pub(crate) fn encode_header(header: &HeaderEntry) -> EngineResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(9);
    payload.push(header.version);
    payload.extend_from_slice(&header.update_seq.to_le_bytes());
    frame(KIND_HEADER, &payload)
}

/// Cursor over a record payload. Running short is corruption.
struct Payload<'a> {
    data: &'a [u8],
}

impl<'a> Payload<'a> {
    fn take(&mut self, n: usize) -> EngineResult<&'a [u8]> {
        if self.data.len() < n {
            return Err(EngineError::Corrupt);
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn u8(&mut self) -> EngineResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn flag(&mut self) -> EngineResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(EngineError::Corrupt),
        }
    }

    fn u64(&mut self) -> EngineResult<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn bytes(&mut self) -> EngineResult<Vec<u8>> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        let len = u32::from_le_bytes(raw) as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(self) -> EngineResult<()> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Corrupt)
        }
    }
}

/// Decodes one complete record, verifying its checksum.
pub(crate) fn decode(data: &[u8]) -> EngineResult<DiskRecord> {
    if data.len() < MIN_RECORD_SIZE {
        return Err(EngineError::Corrupt);
    }
    let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if record_length != data.len() {
        return Err(EngineError::Corrupt);
    }

    let checksum_offset = record_length - 4;
    let stored = u32::from_le_bytes([
        data[checksum_offset],
        data[checksum_offset + 1],
        data[checksum_offset + 2],
        data[checksum_offset + 3],
    ]);
    if compute_checksum(&data[..checksum_offset]) != stored {
        return Err(EngineError::ChecksumFail);
    }

    let kind = data[4];
    let mut payload = Payload {
        data: &data[5..checksum_offset],
    };

    let record = match kind {
        KIND_DOCUMENT => DiskRecord::Document(DocumentEntry {
            db_seq: payload.u64()?,
            rev_seq: payload.u64()?,
            deleted: payload.flag()?,
            content_meta: payload.u8()?,
            id: payload.bytes()?,
            rev_meta: payload.bytes()?,
            body: payload.bytes()?,
        }),
        KIND_LOCAL => DiskRecord::Local(LocalEntry {
            deleted: payload.flag()?,
            id: payload.bytes()?,
            body: payload.bytes()?,
        }),
        KIND_HEADER => DiskRecord::Header(HeaderEntry {
            version: payload.u8()?,
            update_seq: payload.u64()?,
        }),
        _ => return Err(EngineError::Corrupt),
    };
    payload.finish()?;

    Ok(record)
}

/// Reads the next record from a sequential reader.
///
/// `remaining` is the number of unread bytes in the file. Returns the record
/// and its encoded length, or `None` at a clean end of file.
pub(crate) fn read_next<R: Read>(
    reader: &mut R,
    remaining: u64,
) -> EngineResult<Option<(DiskRecord, usize)>> {
    if remaining == 0 {
        return Ok(None);
    }
    if remaining < MIN_RECORD_SIZE as u64 {
        return Err(EngineError::Corrupt);
    }

    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .map_err(|e| EngineError::from_read(&e))?;
    let record_length = u32::from_le_bytes(len_buf) as usize;
    if record_length < MIN_RECORD_SIZE || record_length as u64 > remaining {
        return Err(EngineError::Corrupt);
    }

    let mut buf = Vec::new();
    buf.try_reserve_exact(record_length)
        .map_err(|_| EngineError::AllocFail)?;
    buf.extend_from_slice(&len_buf);
    buf.resize(record_length, 0);
    reader
        .read_exact(&mut buf[4..])
        .map_err(|e| EngineError::from_read(&e))?;

    Ok(Some((decode(&buf)?, record_length)))
}

/// Whether a checksum-valid header record starts anywhere in `data`.
///
/// Used after a damaged record to decide whether the damage sits before a
/// commit (fatal) or in an uncommitted tail (discardable).
pub(crate) fn contains_header(data: &[u8]) -> bool {
    let header_length = (HEADER_RECORD_SIZE as u32).to_le_bytes();
    data.windows(HEADER_RECORD_SIZE).any(|window| {
        window[..4] == header_length
            && window[4] == KIND_HEADER
            && matches!(decode(window), Ok(DiskRecord::Header(_)))
    })
}
