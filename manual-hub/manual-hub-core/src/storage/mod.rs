//! Entity model and file-backed store for workspaces, categories, documents,
//! blocks and version history. Entities live in memory and are persisted as
//! JSON files under a data directory: one file per document (bundling its
//! blocks and versions) plus a single tenants file for everything above the
//! document level.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HubError;


const TENANTS_FILE: &str = "tenants.json";
const DOCUMENTS_DIR: &str = "documents";

/// Collaboration roles in strictly ascending capability order. The derived
/// `Ord` follows declaration order, so `Role::Viewer < Role::Writer` etc.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Writer,
    Editor,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Writer => "writer",
            Role::Editor => "editor",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    /// Strict parse: unknown role names are the caller's validation problem.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(Role::Viewer),
            "writer" => Some(Role::Writer),
            "editor" => Some(Role::Editor),
            "admin" => Some(Role::Admin),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    Active,
    Archived,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Published,
    Archived,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Workspace,
    Public,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Text,
    Image,
    File,
}

impl BlockType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(BlockType::Text),
            "image" => Some(BlockType::Image),
            "file" => Some(BlockType::File),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    /// Final-authority owner. Never stored as a membership row.
    pub owner: String,
    pub status: WorkspaceStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    /// Best-effort ordering within the workspace, not strictly unique.
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub category_id: Uuid,
    pub title: String,
    pub status: DocumentStatus,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Name/size attachment details for file and image blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// One ordered content unit of a document. `sort_order` is 1-based and dense:
/// after any successful write the orders of a document's blocks are exactly
/// `1..=N`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub id: Uuid,
    pub document_id: Uuid,
    pub block_type: BlockType,
    pub content: String,
    pub metadata: Option<FileMeta>,
    pub sort_order: u32,
}

/// Raw block submission as it arrives from a client. `block_type` stays a
/// string until [`BlockInput::validate`] so unknown types surface as a
/// validation failure instead of a deserialization one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockInput {
    pub block_type: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: Option<FileMeta>,
}

/// A type-checked block payload, ready for insertion or snapshotting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockDraft {
    pub block_type: BlockType,
    pub content: String,
    pub metadata: Option<FileMeta>,
}

impl BlockInput {
    pub fn validate(&self) -> Result<BlockDraft, HubError> {
        let Some(block_type) = BlockType::parse(&self.block_type) else {
            return Err(HubError::Validation(format!(
                "unknown block type `{}`",
                self.block_type
            )));
        };
        let Some(content) = self.content.clone() else {
            let what = match block_type {
                BlockType::Text => "text block requires markdown content",
                BlockType::Image => "image block requires a url",
                BlockType::File => "file block requires a url",
            };
            return Err(HubError::Validation(what.to_string()));
        };
        Ok(BlockDraft {
            block_type,
            content,
            metadata: self.metadata.clone(),
        })
    }
}

/// Immutable snapshot of a document's full block list. Rows are only ever
/// created and read; `number` is unique per document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub id: Uuid,
    pub document_id: Uuid,
    pub number: u64,
    /// Opaque serialized block list; decoded only by the restore path.
    pub snapshot: String,
    pub summary: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct MembershipRow {
    workspace_id: Uuid,
    user: String,
    role: Role,
}

#[derive(Serialize, Deserialize, Default)]
struct TenantsFile {
    workspaces: Vec<Workspace>,
    memberships: Vec<MembershipRow>,
    categories: Vec<Category>,
}

#[derive(Serialize, Deserialize)]
struct DocumentFile {
    document: Document,
    blocks: Vec<Block>,
    versions: Vec<DocumentVersion>,
}

/// In-memory store with JSON file persistence.
pub struct HubStore {
    workspaces: HashMap<Uuid, Workspace>,
    memberships: HashMap<Uuid, HashMap<String, Role>>,
    categories: HashMap<Uuid, Category>,
    documents: HashMap<Uuid, Document>,
    blocks: HashMap<Uuid, Vec<Block>>,
    versions: HashMap<Uuid, Vec<DocumentVersion>>,
    dir: PathBuf,
}

impl HubStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, HubError> {
        let dir = dir.into();
        std::fs::create_dir_all(dir.join(DOCUMENTS_DIR))?;

        let tenants: TenantsFile = {
            let path = dir.join(TENANTS_FILE);
            if path.exists() {
                serde_json::from_str(&std::fs::read_to_string(&path)?)?
            } else {
                TenantsFile::default()
            }
        };

        let mut memberships: HashMap<Uuid, HashMap<String, Role>> = HashMap::new();
        for row in tenants.memberships {
            memberships
                .entry(row.workspace_id)
                .or_default()
                .insert(row.user, row.role);
        }

        let mut documents = HashMap::new();
        let mut blocks = HashMap::new();
        let mut versions = HashMap::new();
        for entry in std::fs::read_dir(dir.join(DOCUMENTS_DIR))? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match std::fs::read_to_string(entry.path())
                .map_err(HubError::from)
                .and_then(|raw| serde_json::from_str::<DocumentFile>(&raw).map_err(HubError::from))
            {
                Ok(file) => {
                    let id = file.document.id;
                    documents.insert(id, file.document);
                    blocks.insert(id, file.blocks);
                    versions.insert(id, file.versions);
                }
                Err(err) => {
                    tracing::warn!(path = %entry.path().display(), %err, "skipping unreadable document file");
                }
            }
        }

        Ok(Self {
            workspaces: tenants.workspaces.into_iter().map(|w| (w.id, w)).collect(),
            memberships,
            categories: tenants.categories.into_iter().map(|c| (c.id, c)).collect(),
            documents,
            blocks,
            versions,
            dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(DOCUMENTS_DIR).join(format!("{id}.json"))
    }

    fn persist_tenants(&self) -> Result<(), HubError> {
        let file = TenantsFile {
            workspaces: self.workspaces.values().cloned().collect(),
            memberships: self
                .memberships
                .iter()
                .flat_map(|(workspace_id, users)| {
                    users.iter().map(|(user, role)| MembershipRow {
                        workspace_id: *workspace_id,
                        user: user.clone(),
                        role: *role,
                    })
                })
                .collect(),
            categories: self.categories.values().cloned().collect(),
        };
        std::fs::write(self.dir.join(TENANTS_FILE), serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    fn persist_document(&self, id: Uuid) -> Result<(), HubError> {
        let document = self
            .documents
            .get(&id)
            .ok_or(HubError::NotFound("document"))?;
        let file = DocumentFile {
            document: document.clone(),
            blocks: self.blocks.get(&id).cloned().unwrap_or_default(),
            versions: self.versions.get(&id).cloned().unwrap_or_default(),
        };
        std::fs::write(self.document_path(id), serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    // --- workspaces ---------------------------------------------------------

    pub fn create_workspace(&mut self, name: String, owner: String) -> Result<Uuid, HubError> {
        let id = Uuid::new_v4();
        self.workspaces.insert(
            id,
            Workspace {
                id,
                name,
                owner,
                status: WorkspaceStatus::Active,
                created_at: Utc::now(),
            },
        );
        self.persist_tenants()?;
        Ok(id)
    }

    pub fn workspace(&self, id: Uuid) -> Option<&Workspace> {
        self.workspaces.get(&id)
    }

    /// Workspaces the user owns or is a member of.
    pub fn workspaces_for(&self, user: &str) -> Vec<&Workspace> {
        let mut out: Vec<&Workspace> = self
            .workspaces
            .values()
            .filter(|w| {
                w.owner == user
                    || self
                        .memberships
                        .get(&w.id)
                        .is_some_and(|m| m.contains_key(user))
            })
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    // --- memberships --------------------------------------------------------

    /// Insert or update the membership row for `(workspace, user)`. The owner
    /// never gets a row; their role is implicit and cannot be overridden.
    pub fn set_member(&mut self, workspace_id: Uuid, user: String, role: Role) -> Result<(), HubError> {
        let workspace = self
            .workspaces
            .get(&workspace_id)
            .ok_or(HubError::NotFound("workspace"))?;
        if workspace.owner == user {
            return Err(HubError::Validation(
                "workspace owner role is implicit and cannot be assigned".to_string(),
            ));
        }
        if role == Role::Owner {
            return Err(HubError::Validation(
                "owner is not an assignable role".to_string(),
            ));
        }
        self.memberships
            .entry(workspace_id)
            .or_default()
            .insert(user, role);
        self.persist_tenants()
    }

    pub fn remove_member(&mut self, workspace_id: Uuid, user: &str) -> Result<(), HubError> {
        if !self.workspaces.contains_key(&workspace_id) {
            return Err(HubError::NotFound("workspace"));
        }
        if let Some(users) = self.memberships.get_mut(&workspace_id) {
            users.remove(user);
        }
        self.persist_tenants()
    }

    pub fn membership_role(&self, workspace_id: Uuid, user: &str) -> Option<Role> {
        self.memberships
            .get(&workspace_id)
            .and_then(|users| users.get(user))
            .copied()
    }

    // --- categories ---------------------------------------------------------

    pub fn create_category(
        &mut self,
        workspace_id: Uuid,
        name: String,
        position: Option<i64>,
    ) -> Result<Uuid, HubError> {
        if !self.workspaces.contains_key(&workspace_id) {
            return Err(HubError::NotFound("workspace"));
        }
        let position = position.unwrap_or_else(|| {
            self.categories
                .values()
                .filter(|c| c.workspace_id == workspace_id)
                .map(|c| c.position)
                .max()
                .unwrap_or(0)
                + 1
        });
        let id = Uuid::new_v4();
        self.categories.insert(
            id,
            Category {
                id,
                workspace_id,
                name,
                position,
                created_at: Utc::now(),
            },
        );
        self.persist_tenants()?;
        Ok(id)
    }

    pub fn category(&self, id: Uuid) -> Option<&Category> {
        self.categories.get(&id)
    }

    pub fn categories_in(&self, workspace_id: Uuid) -> Vec<&Category> {
        let mut out: Vec<&Category> = self
            .categories
            .values()
            .filter(|c| c.workspace_id == workspace_id)
            .collect();
        out.sort_by(|a, b| a.position.cmp(&b.position).then(a.created_at.cmp(&b.created_at)));
        out
    }

    /// Delete a category and every document in it, blocks and versions
    /// included.
    pub fn delete_category(&mut self, id: Uuid) -> Result<(), HubError> {
        if self.categories.remove(&id).is_none() {
            return Err(HubError::NotFound("category"));
        }
        let doomed: Vec<Uuid> = self
            .documents
            .values()
            .filter(|d| d.category_id == id)
            .map(|d| d.id)
            .collect();
        for doc_id in doomed {
            self.delete_document(doc_id)?;
        }
        self.persist_tenants()
    }

    // --- documents ----------------------------------------------------------

    pub fn create_document(
        &mut self,
        category_id: Uuid,
        title: String,
        status: DocumentStatus,
        visibility: Visibility,
    ) -> Result<Uuid, HubError> {
        if !self.categories.contains_key(&category_id) {
            return Err(HubError::NotFound("category"));
        }
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.documents.insert(
            id,
            Document {
                id,
                category_id,
                title,
                status,
                visibility,
                created_at: now,
                updated_at: now,
            },
        );
        self.blocks.insert(id, Vec::new());
        self.versions.insert(id, Vec::new());
        self.persist_document(id)?;
        Ok(id)
    }

    pub fn document(&self, id: Uuid) -> Option<&Document> {
        self.documents.get(&id)
    }

    pub fn documents_in(&self, category_id: Uuid) -> Vec<&Document> {
        let mut out: Vec<&Document> = self
            .documents
            .values()
            .filter(|d| d.category_id == category_id)
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    pub fn delete_document(&mut self, id: Uuid) -> Result<(), HubError> {
        if self.documents.remove(&id).is_none() {
            return Err(HubError::NotFound("document"));
        }
        self.blocks.remove(&id);
        self.versions.remove(&id);
        let path = self.document_path(id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Advance the document's update timestamp and return the updated row.
    pub fn touch_document(&mut self, id: Uuid) -> Result<Document, HubError> {
        let document = self
            .documents
            .get_mut(&id)
            .ok_or(HubError::NotFound("document"))?;
        document.updated_at = Utc::now();
        let document = document.clone();
        self.persist_document(id)?;
        Ok(document)
    }

    // --- blocks -------------------------------------------------------------

    /// Ordered blocks of a document. Empty for unknown ids; existence checks
    /// belong to the caller.
    pub fn blocks(&self, document_id: Uuid) -> &[Block] {
        self.blocks
            .get(&document_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replace the full block list of a document. Every existing block row is
    /// dropped and the drafts are inserted in input order with sort orders
    /// `1..=N`. An empty draft list leaves the document with zero blocks.
    pub fn replace_blocks(
        &mut self,
        document_id: Uuid,
        drafts: Vec<BlockDraft>,
    ) -> Result<Vec<Block>, HubError> {
        if !self.documents.contains_key(&document_id) {
            return Err(HubError::NotFound("document"));
        }
        let rows: Vec<Block> = drafts
            .into_iter()
            .enumerate()
            .map(|(idx, draft)| Block {
                id: Uuid::new_v4(),
                document_id,
                block_type: draft.block_type,
                content: draft.content,
                metadata: draft.metadata,
                sort_order: idx as u32 + 1,
            })
            .collect();
        self.blocks.insert(document_id, rows.clone());
        self.persist_document(document_id)?;
        Ok(rows)
    }

    // --- versions -----------------------------------------------------------

    /// Version rows of a document, ascending by number.
    pub fn versions(&self, document_id: Uuid) -> &[DocumentVersion] {
        self.versions
            .get(&document_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn version_by_id(&self, document_id: Uuid, version_id: Uuid) -> Option<&DocumentVersion> {
        self.versions
            .get(&document_id)
            .and_then(|rows| rows.iter().find(|v| v.id == version_id))
    }

    pub fn max_version_number(&self, document_id: Uuid) -> u64 {
        self.versions
            .get(&document_id)
            .and_then(|rows| rows.iter().map(|v| v.number).max())
            .unwrap_or(0)
    }

    /// Append an immutable version row. The `(document, number)` pairing is
    /// unique; a duplicate insert is a `Conflict`, never an overwrite.
    pub fn insert_version(&mut self, version: DocumentVersion) -> Result<(), HubError> {
        let document_id = version.document_id;
        if !self.documents.contains_key(&document_id) {
            return Err(HubError::NotFound("document"));
        }
        let rows = self.versions.entry(document_id).or_default();
        if rows.iter().any(|v| v.number == version.number) {
            return Err(HubError::Conflict(format!(
                "version {} already exists for document {}",
                version.number, document_id
            )));
        }
        rows.push(version);
        rows.sort_by_key(|v| v.number);
        self.persist_document(document_id)?;
        Ok(())
    }
}
