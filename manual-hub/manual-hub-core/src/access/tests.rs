use super::*;
use crate::storage::{DocumentStatus, Visibility};
use tempfile::TempDir;
use uuid::Uuid;

fn seeded() -> (TempDir, HubStore, Uuid, Uuid, Uuid) {
    let dir = TempDir::new().unwrap();
    let mut store = HubStore::new(dir.path()).unwrap();
    let workspace = store
        .create_workspace("Handbook".to_string(), "owner-user".to_string())
        .unwrap();
    let category = store
        .create_category(workspace, "Guides".to_string(), None)
        .unwrap();
    let document = store
        .create_document(
            category,
            "Intro".to_string(),
            DocumentStatus::Published,
            Visibility::Workspace,
        )
        .unwrap();
    for (user, role) in [
        ("viewer-user", Role::Viewer),
        ("writer-user", Role::Writer),
        ("editor-user", Role::Editor),
        ("admin-user", Role::Admin),
    ] {
        store.set_member(workspace, user.to_string(), role).unwrap();
    }
    (dir, store, workspace, category, document)
}

#[test]
fn higher_roles_pass_lower_requirements_and_never_the_reverse() {
    let (_dir, store, _ws, _cat, doc) = seeded();
    let ladder = [
        ("viewer-user", Role::Viewer),
        ("writer-user", Role::Writer),
        ("editor-user", Role::Editor),
        ("admin-user", Role::Admin),
        ("owner-user", Role::Owner),
    ];
    for (user, held) in ladder {
        for (_, required) in ladder {
            let allowed = has_access(&store, user, Scope::Document(doc), required).unwrap();
            assert_eq!(
                allowed,
                held >= required,
                "{user} holding {held:?} checked against {required:?}"
            );
        }
    }
}

#[test]
fn owner_resolves_to_owner_without_a_membership_row() {
    let (_dir, store, ws, _cat, doc) = seeded();
    assert_eq!(store.membership_role(ws, "owner-user"), None);
    assert_eq!(
        resolve_role(&store, "owner-user", Scope::Document(doc)).unwrap(),
        Some(Role::Owner)
    );
    assert!(has_access(&store, "owner-user", Scope::Document(doc), Role::Admin).unwrap());
}

#[test]
fn no_relationship_is_none_not_an_error() {
    let (_dir, store, ws, cat, doc) = seeded();
    for scope in [Scope::Workspace(ws), Scope::Category(cat), Scope::Document(doc)] {
        assert_eq!(resolve_role(&store, "stranger", scope).unwrap(), None);
        assert!(!has_access(&store, "stranger", scope, Role::Viewer).unwrap());
    }
}

#[test]
fn missing_scope_is_not_found() {
    let (_dir, store, _ws, _cat, _doc) = seeded();
    for scope in [
        Scope::Workspace(Uuid::new_v4()),
        Scope::Category(Uuid::new_v4()),
        Scope::Document(Uuid::new_v4()),
    ] {
        let err = resolve_role(&store, "owner-user", scope).unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }
}

#[test]
fn workspace_role_is_inherited_by_categories_and_documents() {
    let (_dir, store, ws, cat, doc) = seeded();
    for scope in [Scope::Workspace(ws), Scope::Category(cat), Scope::Document(doc)] {
        assert_eq!(
            resolve_role(&store, "editor-user", scope).unwrap(),
            Some(Role::Editor)
        );
    }
}
