//! Store handle
//!
//! A [`Store`] owns one engine connection exclusively, remembers the mode it
//! was opened in, and refuses mutation on read-only handles before the
//! engine is ever called.
//!
//! Closing (explicitly or by drop) a writable store commits pending writes
//! first. Close never fails: a failed implicit commit is logged and the
//! connection is released anyway.

use std::path::Path;

use crate::changes::ChangesOptions;
use crate::config::{OpenMode, StoreConfig};
use crate::document::Document;
use crate::engine::{FileEngine, OpenFlags, StorageEngine};
use crate::error::{Error, Result};
use crate::observability::Logger;

/// An open connection to a store.
pub struct Store<E: StorageEngine> {
    engine: E,
    mode: OpenMode,
    name: String,
    changes: ChangesOptions,
}

/// A store backed by [`FileEngine`].
pub type FileStore = Store<FileEngine>;

impl<E: StorageEngine> Store<E> {
    /// Opens the store at `name`.
    ///
    /// `ReadOnly` opens the engine read-only; every other mode opens it
    /// create-capable.
    pub fn open(name: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Self::open_with_config(name, &StoreConfig::with_mode(mode))
    }

    /// Opens the store at `name` with an explicit configuration.
    pub fn open_with_config(name: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        if let Some(level) = config.log_level {
            Logger::set_min_severity(level);
        }

        let path = name.as_ref();
        let display = path.display().to_string();
        let flags = match config.mode {
            OpenMode::ReadOnly => OpenFlags::ReadOnly,
            OpenMode::ReadWrite | OpenMode::Create => OpenFlags::Create,
        };

        let engine = E::open(path, flags).map_err(|e| {
            Logger::info(
                "STORE_OPEN_FAILED",
                &[
                    ("path", &display),
                    ("mode", config.mode.as_str()),
                    ("engine_code", &e.code().to_string()),
                    ("engine_error", &e.to_string()),
                ],
            );
            Error::from(e)
        })?;

        Logger::info(
            "STORE_OPENED",
            &[("path", &display), ("mode", config.mode.as_str())],
        );

        Ok(Self {
            engine,
            mode: config.mode,
            name: display,
            changes: ChangesOptions {
                include_bodies: config.changes_include_bodies,
            },
        })
    }

    /// Releases the connection, committing first if writable.
    pub fn close(self) {
        drop(self);
    }

    /// The mode the store was opened in.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Whether the handle accepts mutations.
    pub fn is_writable(&self) -> bool {
        self.mode.is_writable()
    }

    /// The name the store was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A fresh scratch document. Does not touch the connection.
    pub fn create_empty_document<'a>(&self) -> Document<'a> {
        Document::new()
    }

    /// Makes pending writes durable.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.engine.commit().map_err(|e| {
            Logger::warn(
                "COMMIT_FAILED",
                &[
                    ("path", &self.name),
                    ("engine_code", &e.code().to_string()),
                    ("engine_error", &e.to_string()),
                ],
            );
            Error::from(e)
        })
    }

    /// Byte offset of the most recently committed header.
    pub fn header_position(&self) -> u64 {
        self.engine.header_position()
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(Error::InvalidArgument)
        }
    }

    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    pub(crate) fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub(crate) fn default_changes(&self) -> ChangesOptions {
        self.changes
    }
}

impl<E: StorageEngine> Drop for Store<E> {
    fn drop(&mut self) {
        if self.is_writable() {
            if let Err(e) = self.engine.commit() {
                Logger::warn(
                    "CLOSE_COMMIT_FAILED",
                    &[
                        ("path", &self.name),
                        ("engine_code", &e.code().to_string()),
                        ("engine_error", &e.to_string()),
                    ],
                );
            }
        }
        self.engine.close();
        Logger::info("STORE_CLOSED", &[("path", &self.name)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Severity;
    use tempfile::TempDir;

    #[test]
    fn test_create_then_reopen_each_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("testcase.couch");

        FileStore::open(&path, OpenMode::Create).unwrap().close();
        for mode in [OpenMode::ReadOnly, OpenMode::ReadWrite, OpenMode::Create] {
            let store = FileStore::open(&path, mode).unwrap();
            assert_eq!(store.mode(), mode);
            store.close();
        }
    }

    #[test]
    fn test_missing_paths_are_not_found() {
        for mode in [OpenMode::ReadOnly, OpenMode::ReadWrite, OpenMode::Create] {
            assert_eq!(
                FileStore::open("/this/path/should/not/exist", mode).err(),
                Some(Error::NotFound)
            );
            assert_eq!(FileStore::open("", mode).err(), Some(Error::NotFound));
        }
    }

    #[test]
    fn test_malformed_name_is_invalid_argument() {
        assert_eq!(
            FileStore::open("bad\0name", OpenMode::ReadOnly).err(),
            Some(Error::InvalidArgument)
        );
    }

    #[test]
    fn test_read_only_commit_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("testcase.couch");
        FileStore::open(&path, OpenMode::Create).unwrap().close();

        let mut store = FileStore::open(&path, OpenMode::ReadOnly).unwrap();
        let before = store.header_position();
        assert_eq!(store.commit(), Err(Error::InvalidArgument));
        assert_eq!(store.header_position(), before);
    }

    #[test]
    fn test_open_with_config_applies_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("testcase.couch");
        FileStore::open(&path, OpenMode::Create).unwrap().close();

        let config = StoreConfig::from_json(r#"{"mode": "read_only"}"#).unwrap();
        let store = FileStore::open_with_config(&path, &config).unwrap();
        assert!(!store.is_writable());
        assert_eq!(store.name(), path.display().to_string());
    }

    #[test]
    fn test_log_level_only_changed_when_configured() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("testcase.couch");

        Logger::set_min_severity(Severity::Info);
        FileStore::open(&path, OpenMode::Create).unwrap().close();
        assert_eq!(Logger::min_severity(), Severity::Info);

        let config = StoreConfig::from_json(r#"{"log_level": "error"}"#).unwrap();
        FileStore::open_with_config(&path, &config).unwrap().close();
        assert_eq!(Logger::min_severity(), Severity::Error);

        FileStore::open(&path, OpenMode::ReadOnly).unwrap().close();
        assert_eq!(Logger::min_severity(), Severity::Error);

        Logger::set_min_severity(Severity::Warn);
    }

    #[test]
    fn test_create_empty_document_is_blank() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("t.couch"), OpenMode::Create).unwrap();
        assert_eq!(store.create_empty_document(), Document::new());
    }
}
