//! Key-space routing
//!
//! Ids starting with `_local/` live in the local namespace: per-store
//! metadata that bypasses the directory index and the change log. Every
//! other id is a regular, indexed document. The two namespaces are disjoint.
//!
//! A store batch is routed as a whole by its first document's id. Batches
//! must be homogeneous; a mixed batch is not detected, and its remaining
//! documents go wherever the first one went.

use crate::document::{Document, DocumentRead, EngineDocument, FetchedDocument};
use crate::engine::{LocalRecord, RecordInfo, RecordRef, StorageEngine};
use crate::error::{Error, Result};
use crate::observability::Logger;
use crate::store::Store;

/// Reserved id prefix of the local namespace.
pub const LOCAL_PREFIX: &[u8] = b"_local/";

/// Whether `id` belongs to the local namespace.
pub fn is_local_id(id: &[u8]) -> bool {
    id.starts_with(LOCAL_PREFIX)
}

/// Copies an engine local record into a scratch document.
fn local_to_document<L: LocalRecord>(local: &L) -> Result<Document<'static>> {
    let mut doc = Document::new();
    doc.copy_id(local.id())?;
    doc.copy_value(local.body())?;
    doc.set_deleted(local.deleted());
    Ok(doc)
}

impl<E: StorageEngine> Store<E> {
    /// Looks up a document by id.
    ///
    /// Local ids are read from the local namespace and copied out. Regular
    /// ids are resolved through the directory metadata; tombstones are
    /// reported as [`Error::NotFound`].
    pub fn get(&self, id: &[u8]) -> Result<FetchedDocument<E>> {
        if is_local_id(id) {
            let local = self.engine().open_local_document(id)?;
            return local_to_document(&local).map(FetchedDocument::Local);
        }

        let info = self.engine().docinfo_by_id(id)?;
        if info.deleted() {
            return Err(Error::NotFound);
        }
        let body = self.engine().open_doc_with_docinfo(&info)?;
        Ok(FetchedDocument::Indexed(EngineDocument::from_parts(
            info,
            Some(body),
        )))
    }

    /// Stores one document.
    pub fn store_one(&mut self, document: &Document<'_>) -> Result<()> {
        self.store_many(&[document])
    }

    /// Stores a batch of documents.
    ///
    /// The first document's id selects the namespace for the whole batch.
    /// Regular batches are one engine write. Local batches are written one
    /// document at a time and stop at the first failure; documents already
    /// written stay written.
    pub fn store_many(&mut self, documents: &[&Document<'_>]) -> Result<()> {
        self.ensure_writable()?;
        let first = documents.first().ok_or(Error::InvalidArgument)?;

        if is_local_id(first.id()?) {
            for (n, doc) in documents.iter().enumerate() {
                let local = doc.as_local_record();
                if let Err(e) = self.engine_mut().save_local_document(&local) {
                    Logger::warn(
                        "LOCAL_STORE_FAILED",
                        &[
                            ("path", self.name()),
                            ("index", &n.to_string()),
                            ("engine_code", &e.code().to_string()),
                            ("engine_error", &e.to_string()),
                        ],
                    );
                    return Err(e.into());
                }
            }
            return Ok(());
        }

        let mut records: Vec<RecordRef<'_>> = Vec::new();
        records
            .try_reserve_exact(documents.len())
            .map_err(|_| Error::OutOfMemory)?;
        for doc in documents {
            records.push(doc.as_record()?);
        }
        self.engine_mut().save_documents(&records)?;
        Ok(())
    }
}
