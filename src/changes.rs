//! Change iteration
//!
//! Bridges the engine's push-style change walk to a caller callback. Each
//! record is wrapped as an [`EngineDocument`]; the callback's
//! [`Disposition`] decides whether the bridge releases it on the spot or
//! hands it over to the caller.

use crate::document::EngineDocument;
use crate::engine::StorageEngine;
use crate::error::{Error, Result};
use crate::observability::Logger;
use crate::store::Store;

/// Per-call iteration options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangesOptions {
    /// Load document bodies as well as metadata.
    pub include_bodies: bool,
}

/// What the bridge does with a document after the callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// The callback is done with it; release it now.
    Release,
    /// The caller keeps it; it is returned in [`Changes`].
    Retain,
}

/// Outcome of a completed change walk.
pub struct Changes<E: StorageEngine> {
    visited: usize,
    retained: Vec<EngineDocument<E>>,
}

impl<E: StorageEngine> Changes<E> {
    /// Number of times the callback fired.
    pub fn visited(&self) -> usize {
        self.visited
    }

    /// Documents the callback retained, in iteration order.
    pub fn retained(&self) -> &[EngineDocument<E>] {
        &self.retained
    }

    /// Takes the retained documents out of the result.
    pub fn into_retained(self) -> Vec<EngineDocument<E>> {
        self.retained
    }
}

impl<E: StorageEngine> std::fmt::Debug for Changes<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Changes")
            .field("visited", &self.visited)
            .field("retained", &self.retained)
            .finish()
    }
}

impl<E: StorageEngine> Store<E> {
    /// Walks every change strictly after `since`, using the store's
    /// configured options.
    pub fn changes_since<F>(&self, since: u64, callback: F) -> Result<Changes<E>>
    where
        F: FnMut(&Store<E>, &EngineDocument<E>) -> Disposition,
    {
        self.changes_since_with(since, self.default_changes(), callback)
    }

    /// Walks every change strictly after `since` in ascending sequence order.
    ///
    /// Stops at the first engine error. Documents retained before the error
    /// are released and the mapped error is returned.
    pub fn changes_since_with<F>(
        &self,
        since: u64,
        options: ChangesOptions,
        mut callback: F,
    ) -> Result<Changes<E>>
    where
        F: FnMut(&Store<E>, &EngineDocument<E>) -> Disposition,
    {
        let mut visited = 0usize;
        let mut retained = Vec::new();

        let walked = self.engine().changes_since(
            since,
            options.include_bodies,
            &mut |info, body| {
                let doc = EngineDocument::from_parts(info, body);
                visited += 1;
                match callback(self, &doc) {
                    Disposition::Release => doc.release(),
                    Disposition::Retain => retained.push(doc),
                }
            },
        );

        if let Err(e) = walked {
            Logger::warn(
                "CHANGES_ABORTED",
                &[
                    ("path", self.name()),
                    ("since", &since.to_string()),
                    ("visited", &visited.to_string()),
                    ("engine_code", &e.code().to_string()),
                    ("engine_error", &e.to_string()),
                ],
            );
            return Err(Error::from(e));
        }

        Ok(Changes { visited, retained })
    }
}
