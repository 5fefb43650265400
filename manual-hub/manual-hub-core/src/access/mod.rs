//! Role resolution across the workspace hierarchy.
//!
//! A caller's effective role for any scope is decided by the workspace that
//! ultimately owns it: the workspace owner is always `owner`, everyone else
//! has whatever their membership row says, and no row at all means no access.
//! Roles form a strict total order, so "can this user do X" is a single
//! comparison against the operation's required role.

use uuid::Uuid;

use crate::error::HubError;
use crate::storage::{HubStore, Role};

#[cfg(test)]
mod tests;

/// A permission check target. Categories and documents inherit from the
/// workspace that owns them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Workspace(Uuid),
    Category(Uuid),
    Document(Uuid),
}

/// Walk the scope up to its owning workspace. A dangling id anywhere in the
/// chain is a true not-found, distinct from "no access".
fn owning_workspace(store: &HubStore, scope: Scope) -> Result<Uuid, HubError> {
    match scope {
        Scope::Workspace(id) => {
            if store.workspace(id).is_none() {
                return Err(HubError::NotFound("workspace"));
            }
            Ok(id)
        }
        Scope::Category(id) => {
            let category = store.category(id).ok_or(HubError::NotFound("category"))?;
            Ok(category.workspace_id)
        }
        Scope::Document(id) => {
            let document = store.document(id).ok_or(HubError::NotFound("document"))?;
            let category = store
                .category(document.category_id)
                .ok_or(HubError::NotFound("category"))?;
            Ok(category.workspace_id)
        }
    }
}

/// The user's effective role for the scope. `Ok(None)` is the normal "no
/// relationship" answer, not an error.
pub fn resolve_role(store: &HubStore, user: &str, scope: Scope) -> Result<Option<Role>, HubError> {
    let workspace_id = owning_workspace(store, scope)?;
    let workspace = store
        .workspace(workspace_id)
        .ok_or(HubError::NotFound("workspace"))?;
    // Owner check comes first: the owner keeps access even if a stray
    // membership row for them ever appears or disappears.
    if workspace.owner == user {
        return Ok(Some(Role::Owner));
    }
    Ok(store.membership_role(workspace_id, user))
}

/// Whether the user's resolved role meets `required`. No role never passes.
pub fn has_access(
    store: &HubStore,
    user: &str,
    scope: Scope,
    required: Role,
) -> Result<bool, HubError> {
    Ok(resolve_role(store, user, scope)?.is_some_and(|role| role >= required))
}
