//! cbio - A small, stable document-storage interface over an embedded engine
//!
//! Open a store, get, store and delete documents, iterate changes. Durable
//! storage is delegated to a [`StorageEngine`]; this crate owns the document
//! model, local/regular key routing, error translation and the change bridge.

pub mod changes;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod observability;
pub mod routing;
pub mod store;

pub use changes::{Changes, ChangesOptions, Disposition};
pub use config::{OpenMode, StoreConfig};
pub use document::{
    ContentType, Document, DocumentRead, EngineDocument, FetchedDocument, Field, Ownership,
    DOC_INVALID_JSON, DOC_INVALID_JSON_KEY, DOC_IS_COMPRESSED, DOC_IS_JSON, DOC_NON_JSON_MODE,
};
pub use engine::{FileEngine, StorageEngine};
pub use error::{strerror, Error, Result};
pub use routing::{is_local_id, LOCAL_PREFIX};
pub use store::{FileStore, Store};
