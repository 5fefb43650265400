//! The transaction boundary for block replacement and version restore.
//!
//! `DocumentMutationService` is the only entry point that writes blocks or
//! versions: every mutation runs inside one store write-guard scope, in a
//! fixed order (check access, validate, snapshot, replace, advance the
//! timestamp). Access checks and validation happen before any state changes,
//! so a failed call leaves nothing half-written for other readers to see.
//!
//! Concurrent saves to the same document serialize on the write guard; the
//! last one to commit wins on content. Version numbers are additionally
//! protected by the store's uniqueness check, and a number conflict is
//! retried once before surfacing to the caller.

use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::access::{self, Scope};
use crate::error::HubError;
use crate::events::{Event, EventBus};
use crate::storage::{Block, BlockDraft, BlockInput, Document, HubStore, Role};
use crate::versioning::{self, VersionMeta};


/// A document together with its ordered block list.
#[derive(Clone, Debug)]
pub struct DocumentWithBlocks {
    pub document: Document,
    pub blocks: Vec<Block>,
}

#[derive(Clone)]
pub struct DocumentMutationService {
    store: Arc<RwLock<HubStore>>,
    events: EventBus,
}

impl DocumentMutationService {
    pub fn new(store: Arc<RwLock<HubStore>>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Replace a document's full block list, optionally archiving the
    /// pre-replace state first. Requires `writer`.
    pub async fn save_blocks(
        &self,
        user: &str,
        document_id: Uuid,
        blocks: Vec<BlockInput>,
        create_version: bool,
    ) -> Result<DocumentWithBlocks, HubError> {
        let mut store = self.store.write().await;
        if !access::has_access(&store, user, Scope::Document(document_id), Role::Writer)? {
            return Err(HubError::Forbidden);
        }
        let drafts: Vec<BlockDraft> = blocks
            .iter()
            .map(BlockInput::validate)
            .collect::<Result<_, _>>()?;

        // The snapshot must capture the pre-replace state, so it runs
        // strictly before the block swap.
        let archived = if create_version {
            Some(self.archive_with_retry(&mut store, document_id, user, None)?)
        } else {
            None
        };
        let blocks = store.replace_blocks(document_id, drafts)?;
        let document = store.touch_document(document_id)?;
        drop(store);

        if let Some(number) = archived {
            self.events.send(Event::VersionCreated {
                document: document_id,
                number,
            });
        }
        self.events.send(Event::BlocksReplaced {
            document: document_id,
            blocks: blocks.len(),
        });
        tracing::info!(%document_id, user, blocks = blocks.len(), version = ?archived, "replaced document blocks");
        Ok(DocumentWithBlocks { document, blocks })
    }

    /// Restore the named version's snapshot as the document's current block
    /// list. Requires `writer`, the same threshold as saving.
    ///
    /// The state being overwritten is archived first, so a restore is itself
    /// undoable by restoring the version this call creates. Returns the
    /// number of the restored version.
    pub async fn restore_version(
        &self,
        user: &str,
        document_id: Uuid,
        version_id: Uuid,
    ) -> Result<u64, HubError> {
        let mut store = self.store.write().await;
        if !access::has_access(&store, user, Scope::Document(document_id), Role::Writer)? {
            return Err(HubError::Forbidden);
        }
        let number = store
            .version_by_id(document_id, version_id)
            .map(|v| v.number)
            .ok_or(HubError::NotFound("version"))?;

        let backup = self.archive_with_retry(
            &mut store,
            document_id,
            user,
            Some(format!("Before restoring version {number}")),
        )?;
        versioning::restore(&mut store, document_id, version_id)?;
        store.touch_document(document_id)?;
        drop(store);

        self.events.send(Event::VersionCreated {
            document: document_id,
            number: backup,
        });
        self.events.send(Event::VersionRestored {
            document: document_id,
            number,
        });
        tracing::info!(%document_id, user, number, backup, "restored document version");
        Ok(number)
    }

    /// Version metadata newest-first. Requires `viewer`.
    pub async fn list_versions(
        &self,
        user: &str,
        document_id: Uuid,
    ) -> Result<Vec<VersionMeta>, HubError> {
        let store = self.store.read().await;
        if !access::has_access(&store, user, Scope::Document(document_id), Role::Viewer)? {
            return Err(HubError::Forbidden);
        }
        Ok(store
            .versions(document_id)
            .iter()
            .rev()
            .map(VersionMeta::from)
            .collect())
    }

    /// The document and its ordered blocks. Requires `viewer`.
    pub async fn document_with_blocks(
        &self,
        user: &str,
        document_id: Uuid,
    ) -> Result<DocumentWithBlocks, HubError> {
        let store = self.store.read().await;
        if !access::has_access(&store, user, Scope::Document(document_id), Role::Viewer)? {
            return Err(HubError::Forbidden);
        }
        let document = store
            .document(document_id)
            .cloned()
            .ok_or(HubError::NotFound("document"))?;
        Ok(DocumentWithBlocks {
            document,
            blocks: store.blocks(document_id).to_vec(),
        })
    }

    /// Archive with one retry on a version-number conflict: re-reading the
    /// max and reattempting resolves the race; a second conflict propagates.
    fn archive_with_retry(
        &self,
        store: &mut HubStore,
        document_id: Uuid,
        user: &str,
        summary: Option<String>,
    ) -> Result<u64, HubError> {
        match versioning::archive(store, document_id, user, summary.clone()) {
            Err(HubError::Conflict(reason)) => {
                tracing::warn!(%document_id, reason, "version number conflict, retrying once");
                versioning::archive(store, document_id, user, summary)
            }
            other => other,
        }
    }
}
