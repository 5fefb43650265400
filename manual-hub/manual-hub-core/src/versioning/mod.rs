//! Immutable block snapshots and their reconstitution.
//!
//! `archive` captures a document's current block list into a numbered
//! version row; `restore` decodes a stored snapshot and replays it through
//! the store's full-replace path. Neither touches existing version rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HubError;
use crate::storage::{Block, BlockDraft, DocumentVersion, HubStore};


/// Bump when the snapshot payload shape changes; `decode` refuses formats it
/// does not know.
const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotEnvelope {
    format: u32,
    blocks: Vec<BlockDraft>,
}

/// Version metadata for listings; everything except the snapshot payload.
#[derive(Clone, Debug, Serialize)]
pub struct VersionMeta {
    pub id: Uuid,
    pub number: u64,
    pub summary: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<&DocumentVersion> for VersionMeta {
    fn from(version: &DocumentVersion) -> Self {
        Self {
            id: version.id,
            number: version.number,
            summary: version.summary.clone(),
            created_by: version.created_by.clone(),
            created_at: version.created_at,
        }
    }
}

fn encode(blocks: &[Block]) -> Result<String, HubError> {
    let envelope = SnapshotEnvelope {
        format: SNAPSHOT_FORMAT,
        blocks: blocks
            .iter()
            .map(|b| BlockDraft {
                block_type: b.block_type,
                content: b.content.clone(),
                metadata: b.metadata.clone(),
            })
            .collect(),
    };
    Ok(serde_json::to_string(&envelope)?)
}

fn decode(raw: &str) -> Result<Vec<BlockDraft>, HubError> {
    let envelope: SnapshotEnvelope = serde_json::from_str(raw)?;
    if envelope.format != SNAPSHOT_FORMAT {
        return Err(HubError::Internal(format!(
            "unsupported snapshot format {}",
            envelope.format
        )));
    }
    Ok(envelope.blocks)
}

/// Snapshot the document's current blocks into the next version number.
///
/// The number is `max existing + 1`; if another writer claimed it first the
/// store's uniqueness check surfaces a `Conflict`, which the caller may retry
/// after this function re-reads the max.
pub fn archive(
    store: &mut HubStore,
    document_id: Uuid,
    created_by: &str,
    summary: Option<String>,
) -> Result<u64, HubError> {
    let snapshot = encode(store.blocks(document_id))?;
    let number = store.max_version_number(document_id) + 1;
    store.insert_version(DocumentVersion {
        id: Uuid::new_v4(),
        document_id,
        number,
        snapshot,
        summary,
        created_by: created_by.to_string(),
        created_at: Utc::now(),
    })?;
    tracing::debug!(%document_id, number, "archived document version");
    Ok(number)
}

/// Replace the document's blocks with the named version's snapshot.
///
/// The version must belong to `document_id`; a version id from another
/// document is a not-found, never a silent no-op. Restoring the latest
/// version is legal and still runs the full replace path.
pub fn restore(
    store: &mut HubStore,
    document_id: Uuid,
    version_id: Uuid,
) -> Result<Vec<Block>, HubError> {
    let drafts = {
        let version = store
            .version_by_id(document_id, version_id)
            .ok_or(HubError::NotFound("version"))?;
        decode(&version.snapshot)?
    };
    store.replace_blocks(document_id, drafts)
}
