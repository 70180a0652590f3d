//! Documents and buffer ownership
//!
//! A document is one logical record seen through two facets, the way the
//! engine stores it:
//!
//! - the metadata facet: revision, deleted flag, content type, size and
//!   opaque rev-meta bytes
//! - the body facet: the value bytes
//!
//! Both facets share a single id. Facets are materialized lazily by the
//! setters that need them, and getters fail with
//! [`Error::InvalidArgument`] when the facet they read is absent.
//!
//! # Ownership
//!
//! Every buffer is in exactly one state (see [`Ownership`]):
//!
//! - **Borrowed**: a view into caller memory, checked by the `'a` lifetime
//! - **Copied**: allocated and freed by the document
//! - **Engine**: produced by the engine and released only by it
//!
//! Scratch documents ([`Document`]) hold borrowed or copied buffers.
//! Engine-sourced documents ([`EngineDocument`]) are a separate read-only
//! type whose only mutation is [`EngineDocument::release`], so an engine
//! record can never be reinitialized through the adapter.

use std::borrow::Cow;
use std::fmt;

use crate::engine::{
    BodyRef, InfoRef, LocalRecordRef, RecordBody, RecordInfo, RecordRef, StorageEngine,
};
use crate::error::{Error, Result};

/// Content-type class: valid JSON.
pub const DOC_IS_JSON: u8 = 0;
/// Content-type class: checked, not valid JSON.
pub const DOC_INVALID_JSON: u8 = 1;
/// Content-type class: checked, contains reserved keys.
pub const DOC_INVALID_JSON_KEY: u8 = 2;
/// Content-type class: not checked (store running in non-JSON mode).
pub const DOC_NON_JSON_MODE: u8 = 3;
/// Flag bit: value is compressed.
pub const DOC_IS_COMPRESSED: u8 = 128;

const CONTENT_CLASS_MASK: u8 = 0x0F;

/// Classification of a document value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Json,
    InvalidJson,
    InvalidJsonKey,
    NonJsonMode,
}

impl ContentType {
    /// The raw content-meta byte for this class.
    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::Json => DOC_IS_JSON,
            ContentType::InvalidJson => DOC_INVALID_JSON,
            ContentType::InvalidJsonKey => DOC_INVALID_JSON_KEY,
            ContentType::NonJsonMode => DOC_NON_JSON_MODE,
        }
    }

    /// Extracts the class from a raw content-meta byte (low nibble).
    pub fn from_meta(meta: u8) -> Option<Self> {
        match meta & CONTENT_CLASS_MASK {
            DOC_IS_JSON => Some(ContentType::Json),
            DOC_INVALID_JSON => Some(ContentType::InvalidJson),
            DOC_INVALID_JSON_KEY => Some(ContentType::InvalidJsonKey),
            DOC_NON_JSON_MODE => Some(ContentType::NonJsonMode),
            _ => None,
        }
    }

    /// Whether the compression flag is set in a raw content-meta byte.
    pub fn is_compressed(meta: u8) -> bool {
        meta & DOC_IS_COMPRESSED != 0
    }
}

/// Who owns a buffer and therefore who releases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    Borrowed,
    Copied,
    Engine,
}

/// Buffer-carrying fields of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Meta,
    Value,
}

/// Read access shared by every document shape.
pub trait DocumentRead {
    /// Succeeds when either facet is present; empty if no id was set.
    fn id(&self) -> Result<&[u8]>;
    /// Rev-meta bytes. Requires the metadata facet.
    fn meta(&self) -> Result<&[u8]>;
    /// Value bytes. Requires the body facet.
    fn value(&self) -> Result<&[u8]>;
    fn revision(&self) -> Result<u64>;
    fn deleted(&self) -> Result<bool>;
    fn content_type(&self) -> Result<u8>;
    fn size(&self) -> Result<usize>;
}

fn copy_bytes(bytes: &[u8]) -> Result<Cow<'static, [u8]>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes.len())
        .map_err(|_| Error::OutOfMemory)?;
    buf.extend_from_slice(bytes);
    Ok(Cow::Owned(buf))
}

fn ownership_of(buf: &Option<Cow<'_, [u8]>>) -> Option<Ownership> {
    buf.as_ref().map(|b| match b {
        Cow::Borrowed(_) => Ownership::Borrowed,
        Cow::Owned(_) => Ownership::Copied,
    })
}

fn bytes_of<'s>(buf: &'s Option<Cow<'_, [u8]>>) -> &'s [u8] {
    buf.as_deref().unwrap_or(&[])
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct MetaFacet<'a> {
    revision: u64,
    deleted: bool,
    content_type: u8,
    size: usize,
    meta: Option<Cow<'a, [u8]>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BodyFacet<'a> {
    value: Option<Cow<'a, [u8]>>,
}

/// A scratch document, built by the caller.
///
/// `'a` is the lifetime of any borrowed buffer. A document holding only
/// copied buffers can be `Document<'static>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document<'a> {
    id: Option<Cow<'a, [u8]>>,
    info: Option<MetaFacet<'a>>,
    body: Option<BodyFacet<'a>>,
}

impl<'a> Document<'a> {
    /// An empty scratch document with no facets.
    pub fn new() -> Self {
        Self::default()
    }

    fn info_mut(&mut self) -> &mut MetaFacet<'a> {
        self.info.get_or_insert_with(MetaFacet::default)
    }

    fn body_mut(&mut self) -> &mut BodyFacet<'a> {
        self.body.get_or_insert_with(BodyFacet::default)
    }

    fn put_id(&mut self, id: Cow<'a, [u8]>) {
        self.info_mut();
        self.body_mut();
        self.id = Some(id);
    }

    fn put_meta(&mut self, meta: Cow<'a, [u8]>) {
        self.info_mut().meta = Some(meta);
    }

    fn put_value(&mut self, value: Cow<'a, [u8]>) {
        let size = value.len();
        self.info_mut().size = size;
        self.body_mut().value = Some(value);
    }

    /// Sets the id of both facets to a view of `id`.
    pub fn set_id(&mut self, id: &'a [u8]) {
        self.put_id(Cow::Borrowed(id));
    }

    /// Sets the id of both facets to a private copy of `id`.
    ///
    /// On allocation failure the document is left unchanged.
    pub fn copy_id(&mut self, id: &[u8]) -> Result<()> {
        let id = copy_bytes(id)?;
        self.put_id(id);
        Ok(())
    }

    /// Sets the metadata to a view of `meta`.
    pub fn set_meta(&mut self, meta: &'a [u8]) {
        self.put_meta(Cow::Borrowed(meta));
    }

    /// Sets the metadata to a private copy of `meta`.
    pub fn copy_meta(&mut self, meta: &[u8]) -> Result<()> {
        let meta = copy_bytes(meta)?;
        self.put_meta(meta);
        Ok(())
    }

    /// Sets the value to a view of `value` and records its size.
    pub fn set_value(&mut self, value: &'a [u8]) {
        self.put_value(Cow::Borrowed(value));
    }

    /// Sets the value to a private copy of `value` and records its size.
    pub fn copy_value(&mut self, value: &[u8]) -> Result<()> {
        let value = copy_bytes(value)?;
        self.put_value(value);
        Ok(())
    }

    /// Sets the revision sequence.
    pub fn set_revision(&mut self, revision: u64) {
        self.info_mut().revision = revision;
    }

    /// Marks the document as a tombstone, or clears the mark.
    pub fn set_deleted(&mut self, deleted: bool) {
        self.info_mut().deleted = deleted;
    }

    /// Stores the raw content-meta byte. The value is not validated.
    pub fn set_content_type(&mut self, content_type: u8) {
        self.info_mut().content_type = content_type;
    }

    /// Ownership of a buffer, or `None` if it was never set.
    pub fn ownership(&self, field: Field) -> Option<Ownership> {
        match field {
            Field::Id => ownership_of(&self.id),
            Field::Meta => self.info.as_ref().and_then(|i| ownership_of(&i.meta)),
            Field::Value => self.body.as_ref().and_then(|b| ownership_of(&b.value)),
        }
    }

    /// Whether any metadata field has been set.
    pub fn has_metadata(&self) -> bool {
        self.info.is_some()
    }

    /// Whether a value has been set.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Releases every buffer and returns to the empty scratch state.
    pub fn reinitialize(&mut self) {
        self.id = None;
        self.info = None;
        self.body = None;
    }

    /// Releases the document and everything it owns.
    pub fn release(self) {}

    /// Borrowed view for a regular save.
    pub(crate) fn as_record(&self) -> Result<RecordRef<'_>> {
        let info = self.info.as_ref().ok_or(Error::InvalidArgument)?;
        let id = bytes_of(&self.id);
        Ok(RecordRef {
            info: InfoRef {
                id,
                rev_seq: info.revision,
                rev_meta: bytes_of(&info.meta),
                deleted: info.deleted,
                content_meta: info.content_type,
                size: info.size,
            },
            body: self.body.as_ref().map(|body| BodyRef {
                id,
                data: bytes_of(&body.value),
            }),
        })
    }

    /// Borrowed view for a local save: id, value and deleted flag only.
    pub(crate) fn as_local_record(&self) -> LocalRecordRef<'_> {
        LocalRecordRef {
            id: bytes_of(&self.id),
            body: self.body.as_ref().map(|b| bytes_of(&b.value)).unwrap_or(&[]),
            deleted: self.info.as_ref().map(|i| i.deleted).unwrap_or(false),
        }
    }
}

impl DocumentRead for Document<'_> {
    fn id(&self) -> Result<&[u8]> {
        if self.info.is_none() && self.body.is_none() {
            return Err(Error::InvalidArgument);
        }
        Ok(bytes_of(&self.id))
    }

    fn meta(&self) -> Result<&[u8]> {
        let info = self.info.as_ref().ok_or(Error::InvalidArgument)?;
        Ok(bytes_of(&info.meta))
    }

    fn value(&self) -> Result<&[u8]> {
        let body = self.body.as_ref().ok_or(Error::InvalidArgument)?;
        Ok(bytes_of(&body.value))
    }

    fn revision(&self) -> Result<u64> {
        self.info
            .as_ref()
            .map(|i| i.revision)
            .ok_or(Error::InvalidArgument)
    }

    fn deleted(&self) -> Result<bool> {
        self.info
            .as_ref()
            .map(|i| i.deleted)
            .ok_or(Error::InvalidArgument)
    }

    fn content_type(&self) -> Result<u8> {
        self.info
            .as_ref()
            .map(|i| i.content_type)
            .ok_or(Error::InvalidArgument)
    }

    fn size(&self) -> Result<usize> {
        self.info
            .as_ref()
            .map(|i| i.size)
            .ok_or(Error::InvalidArgument)
    }
}

/// A document whose facets belong to the engine.
///
/// Produced by regular lookups and change iteration. Read-only; dropping or
/// [`release`](Self::release)-ing it hands the facets back to the engine.
pub struct EngineDocument<E: StorageEngine> {
    info: E::Info,
    body: Option<E::Body>,
}

impl<E: StorageEngine> EngineDocument<E> {
    pub(crate) fn from_parts(info: E::Info, body: Option<E::Body>) -> Self {
        Self { info, body }
    }

    /// Engine-assigned sequence number of the write behind this document.
    pub fn sequence(&self) -> u64 {
        self.info.db_seq()
    }

    /// Whether the body was loaded alongside the metadata.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Every buffer here is engine owned; `None` when the field is absent.
    pub fn ownership(&self, field: Field) -> Option<Ownership> {
        match field {
            Field::Value if self.body.is_none() => None,
            _ => Some(Ownership::Engine),
        }
    }

    /// Returns both facets to the engine.
    pub fn release(self) {}
}

impl<E: StorageEngine> DocumentRead for EngineDocument<E> {
    fn id(&self) -> Result<&[u8]> {
        Ok(match &self.body {
            Some(body) => body.id(),
            None => self.info.id(),
        })
    }

    fn meta(&self) -> Result<&[u8]> {
        Ok(self.info.rev_meta())
    }

    fn value(&self) -> Result<&[u8]> {
        self.body
            .as_ref()
            .map(|b| b.data())
            .ok_or(Error::InvalidArgument)
    }

    fn revision(&self) -> Result<u64> {
        Ok(self.info.rev_seq())
    }

    fn deleted(&self) -> Result<bool> {
        Ok(self.info.deleted())
    }

    fn content_type(&self) -> Result<u8> {
        Ok(self.info.content_meta())
    }

    fn size(&self) -> Result<usize> {
        Ok(self.info.size())
    }
}

impl<E: StorageEngine> fmt::Debug for EngineDocument<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineDocument")
            .field("id", &String::from_utf8_lossy(self.info.id()))
            .field("sequence", &self.info.db_seq())
            .field("deleted", &self.info.deleted())
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Result of a store lookup.
///
/// Local documents are copied out of the engine into a scratch document;
/// regular documents stay engine owned.
pub enum FetchedDocument<E: StorageEngine> {
    Local(Document<'static>),
    Indexed(EngineDocument<E>),
}

impl<E: StorageEngine> FetchedDocument<E> {
    /// Whether the document came from the local namespace.
    pub fn is_local(&self) -> bool {
        matches!(self, FetchedDocument::Local(_))
    }

    /// Ownership of a buffer, or `None` if it was never set.
    pub fn ownership(&self, field: Field) -> Option<Ownership> {
        match self {
            FetchedDocument::Local(doc) => doc.ownership(field),
            FetchedDocument::Indexed(doc) => doc.ownership(field),
        }
    }

    /// Releases the document and whatever buffers it owns.
    pub fn release(self) {}
}

macro_rules! fetched_delegate {
    ($($name:ident -> $ty:ty),* $(,)?) => {
        impl<E: StorageEngine> DocumentRead for FetchedDocument<E> {
            $(
                fn $name(&self) -> Result<$ty> {
                    match self {
                        FetchedDocument::Local(doc) => doc.$name(),
                        FetchedDocument::Indexed(doc) => doc.$name(),
                    }
                }
            )*
        }
    };
}

fetched_delegate! {
    id -> &[u8],
    meta -> &[u8],
    value -> &[u8],
    revision -> u64,
    deleted -> bool,
    content_type -> u8,
    size -> usize,
}

impl<E: StorageEngine> fmt::Debug for FetchedDocument<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchedDocument::Local(doc) => f.debug_tuple("Local").field(doc).finish(),
            FetchedDocument::Indexed(doc) => f.debug_tuple("Indexed").field(doc).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_getters_fail() {
        let doc = Document::new();
        assert_eq!(doc.id(), Err(Error::InvalidArgument));
        assert_eq!(doc.meta(), Err(Error::InvalidArgument));
        assert_eq!(doc.value(), Err(Error::InvalidArgument));
        assert_eq!(doc.revision(), Err(Error::InvalidArgument));
        assert_eq!(doc.deleted(), Err(Error::InvalidArgument));
        assert_eq!(doc.content_type(), Err(Error::InvalidArgument));
        assert_eq!(doc.size(), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_set_id_materializes_both_facets() {
        let mut doc = Document::new();
        doc.set_id(b"key");
        assert!(doc.has_metadata());
        assert!(doc.has_body());
        assert_eq!(doc.id().unwrap(), b"key");
        assert_eq!(doc.value().unwrap(), b"");
        assert_eq!(doc.revision().unwrap(), 0);

        let record = doc.as_record().unwrap();
        assert_eq!(record.info.id, b"key");
        assert_eq!(record.body.unwrap().id, b"key");
    }

    #[test]
    fn test_metadata_setters_leave_body_absent() {
        let mut doc = Document::new();
        doc.set_revision(12);
        doc.set_deleted(true);
        doc.set_content_type(DOC_NON_JSON_MODE);
        doc.set_meta(b"\x01\x02");

        assert!(!doc.has_body());
        assert_eq!(doc.value(), Err(Error::InvalidArgument));
        assert_eq!(doc.revision().unwrap(), 12);
        assert!(doc.deleted().unwrap());
        assert_eq!(doc.content_type().unwrap(), DOC_NON_JSON_MODE);
        assert_eq!(doc.meta().unwrap(), b"\x01\x02");
        // metadata facet alone is enough for id, which is empty until set
        assert_eq!(doc.id().unwrap(), b"");
    }

    #[test]
    fn test_set_value_records_size() {
        let mut doc = Document::new();
        doc.set_value(b"hello");
        assert_eq!(doc.size().unwrap(), 5);
        doc.copy_value(b"hi").unwrap();
        assert_eq!(doc.size().unwrap(), 2);
    }

    #[test]
    fn test_copy_outlives_source() {
        let mut doc: Document<'static> = Document::new();
        {
            let source = vec![7u8; 64];
            doc.copy_value(&source).unwrap();
            doc.copy_id(&source[..3]).unwrap();
        }
        assert_eq!(doc.value().unwrap(), &[7u8; 64][..]);
        assert_eq!(doc.id().unwrap(), &[7u8; 3][..]);
        assert_eq!(doc.ownership(Field::Value), Some(Ownership::Copied));
        assert_eq!(doc.ownership(Field::Id), Some(Ownership::Copied));
    }

    #[test]
    fn test_ownership_tags_follow_setter() {
        let key = b"borrowed".to_vec();
        let mut doc = Document::new();
        assert_eq!(doc.ownership(Field::Id), None);

        doc.set_id(&key);
        assert_eq!(doc.ownership(Field::Id), Some(Ownership::Borrowed));
        assert_eq!(doc.ownership(Field::Value), None);

        doc.copy_id(&key).unwrap();
        assert_eq!(doc.ownership(Field::Id), Some(Ownership::Copied));

        doc.set_meta(&key);
        assert_eq!(doc.ownership(Field::Meta), Some(Ownership::Borrowed));
    }

    #[test]
    fn test_reinitialize_clears_everything() {
        let mut doc = Document::new();
        doc.copy_id(b"key").unwrap();
        doc.copy_value(b"value").unwrap();
        doc.set_revision(3);

        doc.reinitialize();
        assert_eq!(doc, Document::new());
        assert_eq!(doc.id(), Err(Error::InvalidArgument));

        doc.set_id(b"again");
        assert_eq!(doc.id().unwrap(), b"again");
    }

    #[test]
    fn test_record_requires_metadata() {
        assert_eq!(Document::new().as_record().err(), Some(Error::InvalidArgument));
    }

    #[test]
    fn test_tombstone_record_has_no_body() {
        let mut doc = Document::new();
        doc.set_deleted(true);
        doc.set_revision(2);
        let record = doc.as_record().unwrap();
        assert!(record.info.deleted);
        assert!(record.body.is_none());
    }

    #[test]
    fn test_local_record_view() {
        let mut doc = Document::new();
        doc.set_id(b"_local/checkpoint");
        doc.set_value(b"42");
        let local = doc.as_local_record();
        assert_eq!(local.id, b"_local/checkpoint");
        assert_eq!(local.body, b"42");
        assert!(!local.deleted);
    }

    #[test]
    fn test_content_type_classes() {
        assert_eq!(ContentType::from_meta(DOC_IS_JSON), Some(ContentType::Json));
        assert_eq!(
            ContentType::from_meta(DOC_IS_COMPRESSED | DOC_INVALID_JSON_KEY),
            Some(ContentType::InvalidJsonKey)
        );
        assert!(ContentType::is_compressed(DOC_IS_COMPRESSED | DOC_IS_JSON));
        assert!(!ContentType::is_compressed(DOC_INVALID_JSON));
        assert_eq!(ContentType::from_meta(0x0C), None);
        assert_eq!(ContentType::NonJsonMode.as_u8(), DOC_NON_JSON_MODE);
    }
}
