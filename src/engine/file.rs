//! Append-only file engine
//!
//! A single-file engine behind [`StorageEngine`]:
//!
//! - Records are appended, never updated in place
//! - Every record carries a CRC32 checksum, verified on every read
//! - A header record marks each commit; records after the last header were
//!   never committed and are discarded on open
//! - Latest record wins for the same id
//! - Regular documents are indexed by id and by sequence; local documents
//!   live in their own namespace and never appear in either index
//!
//! Saved documents are visible to reads on the same connection before the
//! commit that makes them durable.

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use super::errors::{EngineError, EngineResult};
use super::record::{self, DiskRecord, DocumentEntry, HeaderEntry, LocalEntry};
use super::{
    LocalRecord, LocalRecordRef, OpenFlags, RecordBody, RecordInfo, RecordRef, StorageEngine,
};
use crate::observability::Logger;

/// On-disk header version written and accepted by this engine.
pub const HEADER_VERSION: u8 = 1;

/// Directory metadata owned by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInfo {
    id: Vec<u8>,
    db_seq: u64,
    rev_seq: u64,
    rev_meta: Vec<u8>,
    deleted: bool,
    content_meta: u8,
    size: usize,
    /// Byte offset of the record holding the body
    offset: u64,
}

impl RecordInfo for StoredInfo {
    fn id(&self) -> &[u8] {
        &self.id
    }

    fn db_seq(&self) -> u64 {
        self.db_seq
    }

    fn rev_seq(&self) -> u64 {
        self.rev_seq
    }

    fn rev_meta(&self) -> &[u8] {
        &self.rev_meta
    }

    fn deleted(&self) -> bool {
        self.deleted
    }

    fn content_meta(&self) -> u8 {
        self.content_meta
    }

    fn size(&self) -> usize {
        self.size
    }
}

/// Document body owned by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBody {
    id: Vec<u8>,
    data: Vec<u8>,
}

impl RecordBody for StoredBody {
    fn id(&self) -> &[u8] {
        &self.id
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Local document owned by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLocal {
    id: Vec<u8>,
    body: Vec<u8>,
    deleted: bool,
}

impl LocalRecord for StoredLocal {
    fn id(&self) -> &[u8] {
        &self.id
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn deleted(&self) -> bool {
        self.deleted
    }
}

/// Single-file engine with in-memory indexes rebuilt on open.
pub struct FileEngine {
    path: PathBuf,
    file: File,
    read_only: bool,
    /// End of the last committed header; everything before it is durable
    durable_end: u64,
    header_position: u64,
    update_seq: u64,
    /// Encoded records saved since the last commit, logically at `durable_end`
    pending: Vec<u8>,
    by_id: HashMap<Vec<u8>, StoredInfo>,
    by_seq: BTreeMap<u64, Vec<u8>>,
    locals: HashMap<Vec<u8>, StoredLocal>,
}

impl FileEngine {
    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest sequence number assigned so far.
    pub fn update_seq(&self) -> u64 {
        self.update_seq
    }

    /// Number of regular documents that are not tombstoned.
    pub fn document_count(&self) -> usize {
        self.by_id.values().filter(|info| !info.deleted).count()
    }

    fn ensure_writable(&self) -> EngineResult<()> {
        if self.read_only {
            Err(EngineError::InvalidArguments)
        } else {
            Ok(())
        }
    }

    /// Rebuilds the indexes from the file, stopping at the last header.
    ///
    /// A damaged record after the last header is a torn commit and is
    /// discarded with the rest of the tail. Damage followed by a valid
    /// header is corruption of committed data and fails the open.
    fn replay(&mut self, file_size: u64) -> EngineResult<()> {
        let mut reader = BufReader::new(&self.file);
        let mut offset = 0u64;
        let mut staged: Vec<(DiskRecord, u64)> = Vec::new();
        let mut seen_header = false;
        let mut damaged = None;

        loop {
            let (disk_record, len) = match record::read_next(&mut reader, file_size - offset) {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(e @ (EngineError::Corrupt | EngineError::ChecksumFail)) if seen_header => {
                    damaged = Some(e);
                    break;
                }
                Err(e) => return Err(e),
            };
            match disk_record {
                DiskRecord::Header(header) => {
                    if header.version != HEADER_VERSION {
                        return Err(EngineError::HeaderVersion);
                    }
                    for (staged_record, at) in staged.drain(..) {
                        Self::apply(
                            &mut self.by_id,
                            &mut self.by_seq,
                            &mut self.locals,
                            staged_record,
                            at,
                        );
                    }
                    self.header_position = offset;
                    self.durable_end = offset + len as u64;
                    self.update_seq = self.update_seq.max(header.update_seq);
                    seen_header = true;
                }
                other => staged.push((other, offset)),
            }
            offset += len as u64;
        }

        drop(reader);

        if !seen_header {
            return Err(EngineError::NoHeader);
        }
        if let Some(err) = damaged {
            if self.header_follows(offset)? {
                return Err(err);
            }
        }
        if !staged.is_empty() || damaged.is_some() {
            Logger::warn(
                "ENGINE_UNCOMMITTED_TAIL_DISCARDED",
                &[
                    ("path", &self.path.display().to_string()),
                    ("records", &staged.len().to_string()),
                    ("bytes", &(file_size - self.durable_end).to_string()),
                    ("damaged", if damaged.is_some() { "true" } else { "false" }),
                ],
            );
        }
        Ok(())
    }

    /// Whether a valid header exists anywhere from `offset` to end of file.
    fn header_follows(&self, offset: u64) -> EngineResult<bool> {
        let read_err = |e: std::io::Error| EngineError::from_read(&e);
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset)).map_err(read_err)?;
        let mut tail = Vec::new();
        file.read_to_end(&mut tail).map_err(read_err)?;
        Ok(record::contains_header(&tail))
    }

    fn apply(
        by_id: &mut HashMap<Vec<u8>, StoredInfo>,
        by_seq: &mut BTreeMap<u64, Vec<u8>>,
        locals: &mut HashMap<Vec<u8>, StoredLocal>,
        disk_record: DiskRecord,
        offset: u64,
    ) {
        match disk_record {
            DiskRecord::Document(DocumentEntry {
                db_seq,
                rev_seq,
                deleted,
                content_meta,
                id,
                rev_meta,
                body,
            }) => {
                let info = StoredInfo {
                    id,
                    db_seq,
                    rev_seq,
                    rev_meta,
                    deleted,
                    content_meta,
                    size: body.len(),
                    offset,
                };
                Self::index(by_id, by_seq, info);
            }
            DiskRecord::Local(LocalEntry { deleted, id, body }) => {
                if deleted {
                    locals.remove(&id);
                } else {
                    locals.insert(
                        id.clone(),
                        StoredLocal {
                            id,
                            body,
                            deleted,
                        },
                    );
                }
            }
            DiskRecord::Header(_) => {}
        }
    }

    fn index(
        by_id: &mut HashMap<Vec<u8>, StoredInfo>,
        by_seq: &mut BTreeMap<u64, Vec<u8>>,
        info: StoredInfo,
    ) {
        by_seq.insert(info.db_seq, info.id.clone());
        if let Some(previous) = by_id.insert(info.id.clone(), info) {
            by_seq.remove(&previous.db_seq);
        }
    }

    /// Appends pending records plus a header, then fsyncs.
    fn write_header(&mut self) -> EngineResult<()> {
        let header_at = self.durable_end + self.pending.len() as u64;
        let header = record::encode_header(&HeaderEntry {
            version: HEADER_VERSION,
            update_seq: self.update_seq,
        })?;

        let write_err = |e: std::io::Error| EngineError::from_write(&e);
        // Drop any uncommitted tail left by an earlier session
        self.file.set_len(self.durable_end).map_err(write_err)?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(self.durable_end))
            .map_err(write_err)?;
        file.write_all(&self.pending).map_err(write_err)?;
        file.write_all(&header).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;

        self.header_position = header_at;
        self.durable_end = header_at + header.len() as u64;
        self.pending.clear();
        Ok(())
    }

    /// Reads the record at `info.offset` and returns its body.
    fn read_body(&self, info: &StoredInfo) -> EngineResult<StoredBody> {
        let disk_record = if info.offset >= self.durable_end {
            let start = (info.offset - self.durable_end) as usize;
            let tail = self.pending.get(start..).ok_or(EngineError::Corrupt)?;
            let len_bytes = tail.get(..4).ok_or(EngineError::Corrupt)?;
            let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
                as usize;
            record::decode(tail.get(..len).ok_or(EngineError::Corrupt)?)?
        } else {
            let mut file = &self.file;
            file.seek(SeekFrom::Start(info.offset))
                .map_err(|e| EngineError::from_read(&e))?;
            let mut reader = BufReader::new(file);
            record::read_next(&mut reader, self.durable_end - info.offset)?
                .map(|(disk_record, _)| disk_record)
                .ok_or(EngineError::Corrupt)?
        };

        match disk_record {
            DiskRecord::Document(entry) if entry.id == info.id && entry.db_seq == info.db_seq => {
                Ok(StoredBody {
                    id: entry.id,
                    data: entry.body,
                })
            }
            _ => Err(EngineError::Corrupt),
        }
    }
}

impl StorageEngine for FileEngine {
    type Info = StoredInfo;
    type Body = StoredBody;
    type Local = StoredLocal;

    fn open(path: &Path, flags: OpenFlags) -> EngineResult<Self> {
        let file = match flags {
            OpenFlags::ReadOnly => OpenOptions::new().read(true).open(path),
            OpenFlags::Create => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path),
        }
        .map_err(|e| EngineError::from_open(&e))?;

        let metadata = file.metadata().map_err(|e| EngineError::from_read(&e))?;
        if !metadata.is_file() {
            return Err(EngineError::OpenFile);
        }

        let mut engine = Self {
            path: path.to_path_buf(),
            file,
            read_only: flags.is_read_only(),
            durable_end: 0,
            header_position: 0,
            update_seq: 0,
            pending: Vec::new(),
            by_id: HashMap::new(),
            by_seq: BTreeMap::new(),
            locals: HashMap::new(),
        };

        if metadata.len() == 0 {
            if engine.read_only {
                return Err(EngineError::NoHeader);
            }
            engine.write_header()?;
            return Ok(engine);
        }

        engine.replay(metadata.len())?;
        Ok(engine)
    }

    fn close(&mut self) {
        if !self.pending.is_empty() {
            Logger::warn(
                "ENGINE_UNCOMMITTED_WRITES_DISCARDED",
                &[
                    ("path", &self.path.display().to_string()),
                    ("bytes", &self.pending.len().to_string()),
                ],
            );
            self.pending.clear();
        }
    }

    fn docinfo_by_id(&self, id: &[u8]) -> EngineResult<StoredInfo> {
        self.by_id.get(id).cloned().ok_or(EngineError::DocNotFound)
    }

    fn open_doc_with_docinfo(&self, info: &StoredInfo) -> EngineResult<StoredBody> {
        self.read_body(info)
    }

    fn save_documents(&mut self, records: &[RecordRef<'_>]) -> EngineResult<()> {
        self.ensure_writable()?;

        // Encode the whole batch before touching any state
        let mut seq = self.update_seq;
        let mut offset = self.durable_end + self.pending.len() as u64;
        let mut staged = Vec::with_capacity(records.len());
        for rec in records {
            if rec.info.id.is_empty() {
                return Err(EngineError::InvalidArguments);
            }
            let data = match rec.body {
                Some(body) if body.id != rec.info.id || body.data.len() != rec.info.size => {
                    return Err(EngineError::InvalidArguments);
                }
                Some(body) => body.data,
                None => &[][..],
            };

            seq += 1;
            let encoded = record::encode_document(seq, &rec.info, data)?;
            let info = StoredInfo {
                id: rec.info.id.to_vec(),
                db_seq: seq,
                rev_seq: rec.info.rev_seq,
                rev_meta: rec.info.rev_meta.to_vec(),
                deleted: rec.info.deleted,
                content_meta: rec.info.content_meta,
                size: data.len(),
                offset,
            };
            offset += encoded.len() as u64;
            staged.push((info, encoded));
        }

        let total: usize = staged.iter().map(|(_, encoded)| encoded.len()).sum();
        self.pending
            .try_reserve(total)
            .map_err(|_| EngineError::AllocFail)?;
        for (info, encoded) in staged {
            self.pending.extend_from_slice(&encoded);
            Self::index(&mut self.by_id, &mut self.by_seq, info);
        }
        self.update_seq = seq;
        Ok(())
    }

    fn commit(&mut self) -> EngineResult<()> {
        self.ensure_writable()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        self.write_header()
    }

    fn header_position(&self) -> u64 {
        self.header_position
    }

    fn open_local_document(&self, id: &[u8]) -> EngineResult<StoredLocal> {
        self.locals.get(id).cloned().ok_or(EngineError::DocNotFound)
    }

    fn save_local_document(&mut self, rec: &LocalRecordRef<'_>) -> EngineResult<()> {
        self.ensure_writable()?;
        if rec.id.is_empty() {
            return Err(EngineError::InvalidArguments);
        }

        let encoded = record::encode_local(rec)?;
        self.pending
            .try_reserve(encoded.len())
            .map_err(|_| EngineError::AllocFail)?;
        self.pending.extend_from_slice(&encoded);

        if rec.deleted {
            self.locals.remove(rec.id);
        } else {
            self.locals.insert(
                rec.id.to_vec(),
                StoredLocal {
                    id: rec.id.to_vec(),
                    body: rec.body.to_vec(),
                    deleted: false,
                },
            );
        }
        Ok(())
    }

    fn changes_since(
        &self,
        since: u64,
        include_bodies: bool,
        callback: &mut dyn FnMut(StoredInfo, Option<StoredBody>),
    ) -> EngineResult<()> {
        for id in self
            .by_seq
            .range((Bound::Excluded(since), Bound::Unbounded))
            .map(|(_, id)| id)
        {
            let info = self.by_id.get(id).cloned().ok_or(EngineError::Corrupt)?;
            let body = if include_bodies {
                Some(self.read_body(&info)?)
            } else {
                None
            };
            callback(info, body);
        }
        Ok(())
    }
}
