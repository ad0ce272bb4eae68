//! Direct category edits. Each runs in one `BEGIN IMMEDIATE` transaction
//! together with the metadata rebuild, so readers never see a row whose
//! path disagrees with its parent.

use rusqlite::Connection;
use tracing::info;

use super::path::{join_category_path, sanitize_category_name, slugify};
use super::tree::{descendant_category_ids, rebuild_category_metadata};
use crate::db::immediate_transaction;
use crate::error::{CatalogError, Result};
use crate::store::{Category, CategoryStore, CategoryUpdate, NewCategory};

/// Rename and/or reparent. `parent: Some(None)` moves to the root; `None`
/// keeps the current parent.
#[derive(Debug, Clone, Default)]
pub struct CategoryChange {
    pub name: Option<String>,
    pub parent: Option<Option<i64>>,
}

fn require_name(raw: &str) -> Result<String> {
    sanitize_category_name(raw).ok_or(CatalogError::EmptyCategoryName)
}

fn require_parent<S: CategoryStore + ?Sized>(store: &S, parent_id: i64) -> Result<Category> {
    store
        .category_by_id(parent_id)?
        .ok_or(CatalogError::ParentNotFound(parent_id))
}

pub fn create_category(conn: &Connection, name: &str, parent_id: Option<i64>) -> Result<i64> {
    let name = require_name(name)?;
    let tx = immediate_transaction(conn)?;

    let (path, level) = match parent_id {
        Some(parent_id) => {
            let parent = require_parent(&*tx, parent_id)?;
            (join_category_path(&[parent.path.as_str(), name.as_str()]), parent.level + 1)
        }
        None => (name.clone(), 0),
    };
    let slug = slugify(&name);
    let id = tx.insert_category(&NewCategory {
        parent_id,
        name: &name,
        slug: &slug,
        path: &path,
        level,
    })?;

    rebuild_category_metadata(&*tx)?;
    tx.commit()?;
    info!(category_id = id, name = %name, ?parent_id, "category created");
    Ok(id)
}

pub fn update_category(conn: &Connection, id: i64, change: &CategoryChange) -> Result<Category> {
    let name = change.name.as_deref().map(require_name).transpose()?;
    let tx = immediate_transaction(conn)?;

    let existing = tx.category_by_id(id)?.ok_or(CatalogError::CategoryNotFound(id))?;
    let next_parent = change.parent.unwrap_or(existing.parent_id);
    if next_parent == Some(id) {
        return Err(CatalogError::SelfParent(id));
    }
    if let Some(parent_id) = next_parent {
        require_parent(&*tx, parent_id)?;
        if descendant_category_ids(&*tx, id)?.contains(&parent_id) {
            return Err(CatalogError::MoveUnderDescendant { id, parent_id });
        }
    }

    tx.update_category(
        id,
        &CategoryUpdate {
            name,
            parent_id: change.parent,
            ..Default::default()
        },
    )?;
    let summary = rebuild_category_metadata(&*tx)?;
    let updated = tx.category_by_id(id)?.ok_or(CatalogError::CategoryNotFound(id))?;
    tx.commit()?;

    info!(category_id = id, path = %updated.path, rewritten = summary.updated, "category updated");
    Ok(updated)
}

/// Only leaves with no products can go.
pub fn delete_category(conn: &Connection, id: i64) -> Result<()> {
    let tx = immediate_transaction(conn)?;

    tx.category_by_id(id)?.ok_or(CatalogError::CategoryNotFound(id))?;
    if tx.count_child_categories(id)? > 0 {
        return Err(CatalogError::HasChildren(id));
    }
    if tx.count_products_in_category(id)? > 0 {
        return Err(CatalogError::HasProducts(id));
    }

    tx.delete_category(id)?;
    rebuild_category_metadata(&*tx)?;
    tx.commit()?;
    info!(category_id = id, "category deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::tree::ensure_category_path;
    use crate::db::{add_product, test_connection};
    use crate::store::{DerivedFields, ProductStore};

    #[test]
    fn create_root_and_child() {
        let conn = test_connection();
        let kitchen = create_category(&conn, "  Camp   Kitchen ", None).unwrap();
        let grills = create_category(&conn, "Grills", Some(kitchen)).unwrap();

        let row = conn.category_by_id(grills).unwrap().unwrap();
        assert_eq!(row.path, "Camp Kitchen > Grills");
        assert_eq!(row.level, 1);
        assert_eq!(conn.category_by_id(kitchen).unwrap().unwrap().name, "Camp Kitchen");
    }

    #[test]
    fn create_rejects_bad_input() {
        let conn = test_connection();
        assert!(matches!(create_category(&conn, "   ", None), Err(CatalogError::EmptyCategoryName)));
        assert!(matches!(create_category(&conn, "Grills", Some(42)), Err(CatalogError::ParentNotFound(42))));

        create_category(&conn, "Tents", None).unwrap();
        assert!(matches!(
            create_category(&conn, "Tents", None),
            Err(CatalogError::DuplicateCategory { .. })
        ));
        assert_eq!(conn.list_categories().unwrap().len(), 1);
    }

    #[test]
    fn rename_propagates_to_descendants() {
        let conn = test_connection();
        let leaf = ensure_category_path(&conn, "Kitchen > Grills > Charcoal").unwrap().unwrap();
        let kitchen = conn.find_category(None, "Kitchen").unwrap().unwrap().category_id;

        let updated = update_category(
            &conn,
            kitchen,
            &CategoryChange {
                name: Some("Camp Kitchen".into()),
                parent: None,
            },
        )
        .unwrap();
        assert_eq!(updated.slug, "camp-kitchen");
        assert_eq!(
            conn.category_by_id(leaf.category_id).unwrap().unwrap().path,
            "Camp Kitchen > Grills > Charcoal"
        );
    }

    #[test]
    fn reparent_and_move_to_root() {
        let conn = test_connection();
        let leaf = ensure_category_path(&conn, "Kitchen > Grills > Charcoal").unwrap().unwrap();
        let outdoor = create_category(&conn, "Outdoor", None).unwrap();
        let kitchen = conn.find_category(None, "Kitchen").unwrap().unwrap().category_id;
        let grills = conn.find_category(Some(kitchen), "Grills").unwrap().unwrap().category_id;

        let moved = update_category(
            &conn,
            kitchen,
            &CategoryChange {
                name: None,
                parent: Some(Some(outdoor)),
            },
        )
        .unwrap();
        assert_eq!(moved.level, 1);
        let row = conn.category_by_id(leaf.category_id).unwrap().unwrap();
        assert_eq!((row.path.as_str(), row.level), ("Outdoor > Kitchen > Grills > Charcoal", 3));

        let root = update_category(
            &conn,
            grills,
            &CategoryChange {
                name: None,
                parent: Some(None),
            },
        )
        .unwrap();
        assert_eq!((root.path.as_str(), root.level, root.parent_id), ("Grills", 0, None));
        let row = conn.category_by_id(leaf.category_id).unwrap().unwrap();
        assert_eq!(row.path, "Grills > Charcoal");
    }

    #[test]
    fn update_guards() {
        let conn = test_connection();
        let leaf = ensure_category_path(&conn, "Kitchen > Grills").unwrap().unwrap();
        let kitchen = conn.find_category(None, "Kitchen").unwrap().unwrap().category_id;

        let to = |parent| CategoryChange {
            name: None,
            parent: Some(parent),
        };
        assert!(matches!(
            update_category(&conn, 404, &to(None)),
            Err(CatalogError::CategoryNotFound(404))
        ));
        assert!(matches!(
            update_category(&conn, kitchen, &to(Some(kitchen))),
            Err(CatalogError::SelfParent(_))
        ));
        assert!(matches!(
            update_category(&conn, kitchen, &to(Some(leaf.category_id))),
            Err(CatalogError::MoveUnderDescendant { .. })
        ));
        assert!(matches!(
            update_category(&conn, kitchen, &to(Some(77))),
            Err(CatalogError::ParentNotFound(77))
        ));
        assert!(matches!(
            update_category(
                &conn,
                kitchen,
                &CategoryChange {
                    name: Some(" ".into()),
                    parent: None
                }
            ),
            Err(CatalogError::EmptyCategoryName)
        ));

        // nothing was written by the rejected edits
        let row = conn.category_by_id(kitchen).unwrap().unwrap();
        assert_eq!((row.name.as_str(), row.parent_id), ("Kitchen", None));
    }

    #[test]
    fn delete_only_unused_leaves() {
        let conn = test_connection();
        let leaf = ensure_category_path(&conn, "Tents > Dome").unwrap().unwrap();
        let tents = conn.find_category(None, "Tents").unwrap().unwrap().category_id;
        let product = add_product(&conn, "Dome Tent", None);
        conn.write_product_derived_fields(
            product,
            &DerivedFields {
                category_id: Some(leaf.category_id),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(matches!(delete_category(&conn, tents), Err(CatalogError::HasChildren(_))));
        assert!(matches!(delete_category(&conn, leaf.category_id), Err(CatalogError::HasProducts(_))));
        assert!(matches!(delete_category(&conn, 500), Err(CatalogError::CategoryNotFound(500))));

        let spare = create_category(&conn, "Spare", Some(tents)).unwrap();
        delete_category(&conn, spare).unwrap();
        assert!(conn.category_by_id(spare).unwrap().is_none());
        assert_eq!(conn.list_categories().unwrap().len(), 2);
    }
}
