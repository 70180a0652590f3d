//! Storage engine boundary
//!
//! The adapter never implements storage itself. Everything durable goes
//! through [`StorageEngine`], whose implementations own indexing,
//! checksumming and the on-disk layout.
//!
//! # Ownership
//!
//! Records handed out by an engine (`Info`, `Body`, `Local`) are engine
//! owned. Dropping them is the engine's own deallocation routine, so the
//! adapter never frees engine memory through its own allocator.
//!
//! Records handed *to* an engine are borrowed views ([`RecordRef`],
//! [`LocalRecordRef`]) built over adapter documents for the duration of a
//! single call.

mod errors;
mod file;
mod record;

use std::path::Path;

pub use errors::{EngineError, EngineResult};
pub use file::{FileEngine, StoredBody, StoredInfo, StoredLocal, HEADER_VERSION};

/// Flags accepted by [`StorageEngine::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlags {
    /// Open an existing file; all mutation is rejected.
    ReadOnly,
    /// Open for writing, creating the file when it does not exist.
    Create,
}

impl OpenFlags {
    /// Whether the engine must refuse writes.
    pub fn is_read_only(&self) -> bool {
        matches!(self, OpenFlags::ReadOnly)
    }
}

/// Directory metadata of an engine-owned record.
pub trait RecordInfo {
    fn id(&self) -> &[u8];
    /// Engine-assigned sequence number of the write that produced this record.
    fn db_seq(&self) -> u64;
    fn rev_seq(&self) -> u64;
    fn rev_meta(&self) -> &[u8];
    fn deleted(&self) -> bool;
    fn content_meta(&self) -> u8;
    /// Size of the body in bytes.
    fn size(&self) -> usize;
}

/// Body of an engine-owned record.
pub trait RecordBody {
    fn id(&self) -> &[u8];
    fn data(&self) -> &[u8];
}

/// Engine-owned local document.
pub trait LocalRecord {
    fn id(&self) -> &[u8];
    fn body(&self) -> &[u8];
    fn deleted(&self) -> bool;
}

/// Borrowed directory metadata passed into a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoRef<'a> {
    pub id: &'a [u8],
    pub rev_seq: u64,
    pub rev_meta: &'a [u8],
    pub deleted: bool,
    pub content_meta: u8,
    pub size: usize,
}

/// Borrowed body passed into a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyRef<'a> {
    pub id: &'a [u8],
    pub data: &'a [u8],
}

/// One (metadata, body) pair of a batched save. Deletions may omit the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRef<'a> {
    pub info: InfoRef<'a>,
    pub body: Option<BodyRef<'a>>,
}

/// Borrowed local document passed into a local save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalRecordRef<'a> {
    pub id: &'a [u8],
    pub body: &'a [u8],
    pub deleted: bool,
}

/// The minimum surface the adapter consumes from an embedded engine.
///
/// Reads take `&self` so change callbacks may issue lookups on the same
/// connection. Writes take `&mut self`: one writer per open connection.
pub trait StorageEngine: Sized {
    type Info: RecordInfo;
    type Body: RecordBody;
    type Local: LocalRecord;

    /// Opens (or, with [`OpenFlags::Create`], creates) the store at `path`.
    fn open(path: &Path, flags: OpenFlags) -> EngineResult<Self>;

    /// Releases the connection. Pending writes that were not committed are
    /// discarded.
    fn close(&mut self);

    /// Fetches directory metadata for a regular document.
    fn docinfo_by_id(&self, id: &[u8]) -> EngineResult<Self::Info>;

    /// Fetches the body that `info` points at.
    fn open_doc_with_docinfo(&self, info: &Self::Info) -> EngineResult<Self::Body>;

    /// Saves a batch of regular documents as one engine operation.
    fn save_documents(&mut self, records: &[RecordRef<'_>]) -> EngineResult<()>;

    /// Makes all saved writes durable.
    fn commit(&mut self) -> EngineResult<()>;

    /// Byte offset of the most recently committed header.
    fn header_position(&self) -> u64;

    /// Fetches a document from the local namespace.
    fn open_local_document(&self, id: &[u8]) -> EngineResult<Self::Local>;

    /// Saves (or, when `deleted`, removes) a local document.
    fn save_local_document(&mut self, record: &LocalRecordRef<'_>) -> EngineResult<()>;

    /// Walks the change log strictly after `since` in ascending sequence
    /// order, handing each record to `callback`. Bodies are loaded only when
    /// `include_bodies` is set. Stops at the first engine error.
    fn changes_since(
        &self,
        since: u64,
        include_bodies: bool,
        callback: &mut dyn FnMut(Self::Info, Option<Self::Body>),
    ) -> EngineResult<()>;
}
