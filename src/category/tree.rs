//! Category hierarchy stored as flat rows with a `parent_id` back-reference.
//! Every call re-reads storage; the forest view is rebuilt from a single scan.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};

use super::path::{slugify, split_category_path, PATH_SEPARATOR};
use crate::error::{CatalogError, Result};
use crate::store::{Category, CategoryStore, CategoryUpdate, NewCategory};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnsuredCategory {
    pub category_id: i64,
    pub category_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub total: usize,
    pub updated: usize,
    /// Rows only reachable through a parent cycle, reset to level 0.
    pub isolated: usize,
}

/// Look up each segment under the previous one, inserting what is missing.
/// An empty path yields `None`.
pub fn ensure_category_path<S: CategoryStore + ?Sized>(
    store: &S,
    raw: &str,
) -> Result<Option<EnsuredCategory>> {
    let segments = split_category_path(raw);
    if segments.is_empty() {
        return Ok(None);
    }

    let mut parent_id = None;
    let mut last: Option<Category> = None;
    for (level, name) in segments.iter().enumerate() {
        let built_path = segments[..=level].join(PATH_SEPARATOR);
        let category = find_or_insert(store, parent_id, name, &built_path, level as i64)?;
        parent_id = Some(category.category_id);
        last = Some(category);
    }

    Ok(last.map(|category| EnsuredCategory {
        category_id: category.category_id,
        category_path: category.path,
    }))
}

fn find_or_insert<S: CategoryStore + ?Sized>(
    store: &S,
    parent_id: Option<i64>,
    name: &str,
    path: &str,
    level: i64,
) -> Result<Category> {
    if let Some(found) = store.find_category(parent_id, name)? {
        return Ok(found);
    }

    let slug = slugify(name);
    let new = NewCategory {
        parent_id,
        name,
        slug: &slug,
        path,
        level,
    };
    match store.insert_category(&new) {
        Ok(category_id) => Ok(Category {
            category_id,
            parent_id,
            name: name.to_string(),
            slug,
            path: path.to_string(),
            level,
        }),
        Err(CatalogError::DuplicateCategory { .. }) => {
            debug!(name, ?parent_id, "category created concurrently, reading it back");
            store
                .find_category(parent_id, name)?
                .ok_or_else(|| CatalogError::DuplicateCategory {
                    parent_id,
                    name: name.to_string(),
                })
        }
        Err(e) => Err(e),
    }
}

pub fn all_categories<S: CategoryStore + ?Sized>(store: &S) -> Result<Vec<Category>> {
    store.list_categories()
}

fn children_by_parent(rows: &[Category]) -> HashMap<i64, Vec<i64>> {
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for row in rows {
        if let Some(parent_id) = row.parent_id {
            children.entry(parent_id).or_default().push(row.category_id);
        }
    }
    children
}

/// `category_id` followed by everything below it. Unknown ids give an empty list.
pub fn descendant_category_ids<S: CategoryStore + ?Sized>(store: &S, category_id: i64) -> Result<Vec<i64>> {
    let rows = store.list_categories()?;
    if !rows.iter().any(|c| c.category_id == category_id) {
        return Ok(Vec::new());
    }
    let children = children_by_parent(&rows);

    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([category_id]);
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            warn!(category_id = id, "category cycle detected while collecting descendants");
            continue;
        }
        ids.push(id);
        if let Some(kids) = children.get(&id) {
            queue.extend(kids.iter().copied());
        }
    }
    Ok(ids)
}

/// Forest ordered by `(level, name)`. Rows whose parent is missing become
/// roots, as do rows only reachable through a cycle.
pub fn category_tree<S: CategoryStore + ?Sized>(store: &S) -> Result<Vec<CategoryNode>> {
    let rows = store.list_categories()?;
    let index: HashMap<i64, usize> = rows
        .iter()
        .enumerate()
        .map(|(i, c)| (c.category_id, i))
        .collect();

    let mut children: HashMap<i64, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        match row.parent_id {
            Some(parent_id) if parent_id != row.category_id && index.contains_key(&parent_id) => {
                children.entry(parent_id).or_default().push(i)
            }
            _ => roots.push(i),
        }
    }

    let mut visited = HashSet::new();
    let mut forest: Vec<CategoryNode> = roots
        .into_iter()
        .filter_map(|i| build_node(i, &rows, &children, &mut visited))
        .collect();

    for (i, row) in rows.iter().enumerate() {
        if visited.contains(&row.category_id) {
            continue;
        }
        warn!(category_id = row.category_id, "category unreachable from any root, listing it as a root");
        forest.extend(build_node(i, &rows, &children, &mut visited));
    }
    Ok(forest)
}

fn build_node(
    i: usize,
    rows: &[Category],
    children: &HashMap<i64, Vec<usize>>,
    visited: &mut HashSet<i64>,
) -> Option<CategoryNode> {
    let category = &rows[i];
    if !visited.insert(category.category_id) {
        return None;
    }
    let kids = children
        .get(&category.category_id)
        .map(|kids| {
            kids.iter()
                .filter_map(|&k| build_node(k, rows, children, visited))
                .collect()
        })
        .unwrap_or_default();
    Some(CategoryNode {
        category: category.clone(),
        children: kids,
    })
}

/// Recompute `path`, `level` and `slug` for every row from the live parent
/// links. Rows with a missing parent count as roots. Only rows whose values
/// change are written.
pub fn rebuild_category_metadata<S: CategoryStore + ?Sized>(store: &S) -> Result<RebuildSummary> {
    let rows = store.list_categories()?;
    let by_id: HashMap<i64, &Category> = rows.iter().map(|c| (c.category_id, c)).collect();
    let children = children_by_parent(&rows);

    let mut computed: HashMap<i64, (String, i64)> = HashMap::new();
    let mut stack: Vec<(i64, String, i64)> = rows
        .iter()
        .filter(|c| c.parent_id.map_or(true, |p| !by_id.contains_key(&p)))
        .rev()
        .map(|c| (c.category_id, c.name.clone(), 0))
        .collect();

    while let Some((id, path, level)) = stack.pop() {
        if computed.contains_key(&id) {
            continue;
        }
        if let Some(kids) = children.get(&id) {
            for kid in kids.iter().rev() {
                if let Some(child) = by_id.get(kid) {
                    stack.push((*kid, format!("{path}{PATH_SEPARATOR}{}", child.name), level + 1));
                }
            }
        }
        computed.insert(id, (path, level));
    }

    let mut summary = RebuildSummary {
        total: rows.len(),
        ..Default::default()
    };
    for row in &rows {
        let (path, level) = match computed.remove(&row.category_id) {
            Some(values) => values,
            None => {
                warn!(
                    category_id = row.category_id,
                    parent_id = ?row.parent_id,
                    "category unreachable from any root, isolating it at the top level"
                );
                summary.isolated += 1;
                (row.name.clone(), 0)
            }
        };
        let slug = slugify(&row.name);
        if row.path == path && row.level == level && row.slug == slug {
            continue;
        }
        store.update_category(
            row.category_id,
            &CategoryUpdate {
                path: Some(path),
                level: Some(level),
                slug: Some(slug),
                ..Default::default()
            },
        )?;
        summary.updated += 1;
    }

    debug!(?summary, "category metadata rebuilt");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use rusqlite::Connection;

    use super::*;
    use crate::db::test_connection;

    fn paths(conn: &Connection) -> Vec<(String, i64)> {
        let mut rows: Vec<_> = conn
            .list_categories()
            .unwrap()
            .into_iter()
            .map(|c| (c.path, c.level))
            .collect();
        rows.sort();
        rows
    }

    #[test]
    fn ensure_creates_each_missing_segment() {
        let conn = test_connection();
        let ensured = ensure_category_path(&conn, "Camp Kitchen > Grills").unwrap().unwrap();
        assert_eq!(ensured.category_path, "Camp Kitchen > Grills");

        let rows = conn.list_categories().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].name.as_str(), rows[0].level, rows[0].parent_id), ("Camp Kitchen", 0, None));
        assert_eq!(rows[1].name, "Grills");
        assert_eq!(rows[1].level, 1);
        assert_eq!(rows[1].slug, "grills");
        assert_eq!(rows[1].parent_id, Some(rows[0].category_id));
        assert_eq!(rows[1].category_id, ensured.category_id);
    }

    #[test]
    fn ensure_is_idempotent_across_delimiters() {
        let conn = test_connection();
        let first = ensure_category_path(&conn, "Camp Kitchen > Grills").unwrap().unwrap();
        let again = ensure_category_path(&conn, " Camp   Kitchen / Grills ").unwrap().unwrap();
        let piped = ensure_category_path(&conn, "Camp Kitchen|Grills").unwrap().unwrap();
        assert_eq!(first, again);
        assert_eq!(first, piped);
        assert_eq!(conn.list_categories().unwrap().len(), 2);

        let sibling = ensure_category_path(&conn, "Camp Kitchen > Cookware").unwrap().unwrap();
        assert_ne!(sibling.category_id, first.category_id);
        assert_eq!(conn.list_categories().unwrap().len(), 3);
    }

    #[test]
    fn ensure_reports_stored_path_for_existing_leaf() {
        let conn = test_connection();
        let ensured = ensure_category_path(&conn, "Tents").unwrap().unwrap();
        conn.update_category(
            ensured.category_id,
            &CategoryUpdate {
                path: Some("Shelter > Tents".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let again = ensure_category_path(&conn, "Tents").unwrap().unwrap();
        assert_eq!(again.category_path, "Shelter > Tents");
    }

    #[test]
    fn empty_path_creates_nothing() {
        let conn = test_connection();
        assert_eq!(ensure_category_path(&conn, "").unwrap(), None);
        assert_eq!(ensure_category_path(&conn, " > / | ").unwrap(), None);
        assert!(conn.list_categories().unwrap().is_empty());
    }

    /// Store that loses the first insert race: another writer adds the row
    /// just before ours.
    #[derive(Default)]
    struct RacingStore {
        rows: RefCell<Vec<Category>>,
        raced: Cell<bool>,
    }

    impl RacingStore {
        fn push(&self, category: &NewCategory) -> i64 {
            let mut rows = self.rows.borrow_mut();
            let id = rows.len() as i64 + 1;
            rows.push(Category {
                category_id: id,
                parent_id: category.parent_id,
                name: category.name.to_string(),
                slug: category.slug.to_string(),
                path: category.path.to_string(),
                level: category.level,
            });
            id
        }
    }

    impl CategoryStore for RacingStore {
        fn find_category(&self, parent_id: Option<i64>, name: &str) -> Result<Option<Category>> {
            Ok(self
                .rows
                .borrow()
                .iter()
                .find(|c| c.parent_id == parent_id && c.name == name)
                .cloned())
        }

        fn category_by_id(&self, id: i64) -> Result<Option<Category>> {
            Ok(self.rows.borrow().iter().find(|c| c.category_id == id).cloned())
        }

        fn insert_category(&self, category: &NewCategory) -> Result<i64> {
            if !self.raced.replace(true) {
                self.push(category);
                return Err(CatalogError::DuplicateCategory {
                    parent_id: category.parent_id,
                    name: category.name.to_string(),
                });
            }
            Ok(self.push(category))
        }

        fn update_category(&self, _id: i64, _update: &CategoryUpdate) -> Result<()> {
            Ok(())
        }

        fn delete_category(&self, _id: i64) -> Result<()> {
            Ok(())
        }

        fn list_categories(&self) -> Result<Vec<Category>> {
            Ok(self.rows.borrow().clone())
        }

        fn count_child_categories(&self, _id: i64) -> Result<i64> {
            Ok(0)
        }

        fn count_products_in_category(&self, _id: i64) -> Result<i64> {
            Ok(0)
        }
    }

    #[test]
    fn lost_insert_race_reads_the_winner() {
        let store = RacingStore::default();
        let ensured = ensure_category_path(&store, "Sleeping Gear > Hammocks").unwrap().unwrap();
        assert_eq!(ensured.category_path, "Sleeping Gear > Hammocks");
        assert_eq!(store.rows.borrow().len(), 2);
        assert_eq!(ensured.category_id, 2);
    }

    #[test]
    fn descendants_include_self_and_nested_children() {
        let conn = test_connection();
        let grills = ensure_category_path(&conn, "Kitchen > Grills > Charcoal").unwrap().unwrap();
        ensure_category_path(&conn, "Kitchen > Grills > Gas").unwrap();
        ensure_category_path(&conn, "Kitchen > Cookware").unwrap();
        ensure_category_path(&conn, "Tents").unwrap();
        let kitchen = conn.find_category(None, "Kitchen").unwrap().unwrap().category_id;
        let grills_id = conn.find_category(Some(kitchen), "Grills").unwrap().unwrap().category_id;

        let all = descendant_category_ids(&conn, kitchen).unwrap();
        assert_eq!(all[0], kitchen);
        assert_eq!(all.len(), 5);

        let under_grills = descendant_category_ids(&conn, grills_id).unwrap();
        assert_eq!(under_grills.len(), 3);
        assert!(under_grills.iter().all(|id| all.contains(id)));

        assert_eq!(descendant_category_ids(&conn, grills.category_id).unwrap(), vec![grills.category_id]);
        assert!(descendant_category_ids(&conn, 999).unwrap().is_empty());
    }

    #[test]
    fn descendants_terminate_on_cycles() {
        let conn = test_connection();
        let b = ensure_category_path(&conn, "A > B").unwrap().unwrap().category_id;
        let a = conn.find_category(None, "A").unwrap().unwrap().category_id;
        conn.update_category(
            a,
            &CategoryUpdate {
                parent_id: Some(Some(b)),
                ..Default::default()
            },
        )
        .unwrap();

        let mut ids = descendant_category_ids(&conn, a).unwrap();
        ids.sort();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn tree_nests_children_in_name_order() {
        let conn = test_connection();
        ensure_category_path(&conn, "Kitchen > Stoves").unwrap();
        ensure_category_path(&conn, "Kitchen > Cookware").unwrap();
        ensure_category_path(&conn, "Furniture > Chairs").unwrap();

        let tree = category_tree(&conn).unwrap();
        let roots: Vec<_> = tree.iter().map(|n| n.category.name.as_str()).collect();
        assert_eq!(roots, vec!["Furniture", "Kitchen"]);
        let kitchen: Vec<_> = tree[1].children.iter().map(|n| n.category.name.as_str()).collect();
        assert_eq!(kitchen, vec!["Cookware", "Stoves"]);
        assert!(tree[1].children[0].children.is_empty());
    }

    #[test]
    fn orphans_and_cycles_become_roots() {
        let conn = test_connection();
        conn.execute_batch(
            "PRAGMA foreign_keys=OFF;
             INSERT INTO categories (category_id, parent_id, name, slug, path, level)
             VALUES (1, NULL, 'Root', 'root', 'Root', 0),
                    (2, 99, 'Orphan', 'orphan', 'Lost > Orphan', 1),
                    (3, 4, 'Loop A', 'loop-a', 'Loop A', 1),
                    (4, 3, 'Loop B', 'loop-b', 'Loop B', 1);",
        )
        .unwrap();

        let tree = category_tree(&conn).unwrap();
        let mut roots: Vec<_> = tree.iter().map(|n| n.category.category_id).collect();
        roots.sort();
        assert_eq!(roots, vec![1, 2, 3]);
        let loop_a = tree.iter().find(|n| n.category.category_id == 3).unwrap();
        assert_eq!(loop_a.children[0].category.category_id, 4);
        assert!(loop_a.children[0].children.is_empty());
    }

    #[test]
    fn rebuild_repairs_stale_metadata() {
        let conn = test_connection();
        let charcoal = ensure_category_path(&conn, "Kitchen > Grills > Charcoal").unwrap().unwrap();
        let outdoor = ensure_category_path(&conn, "Outdoor").unwrap().unwrap();
        let kitchen = conn.find_category(None, "Kitchen").unwrap().unwrap().category_id;
        let grills = conn.find_category(Some(kitchen), "Grills").unwrap().unwrap().category_id;

        conn.update_category(
            grills,
            &CategoryUpdate {
                parent_id: Some(Some(outdoor.category_id)),
                name: Some("BBQ Grills".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let summary = rebuild_category_metadata(&conn).unwrap();
        assert_eq!(summary, RebuildSummary { total: 4, updated: 2, isolated: 0 });

        let leaf = conn.category_by_id(charcoal.category_id).unwrap().unwrap();
        assert_eq!(leaf.path, "Outdoor > BBQ Grills > Charcoal");
        assert_eq!(leaf.level, 2);
        assert_eq!(conn.category_by_id(grills).unwrap().unwrap().slug, "bbq-grills");
    }

    #[test]
    fn rebuild_is_idempotent() {
        let conn = test_connection();
        ensure_category_path(&conn, "Sleeping Gear > Sleeping Bags").unwrap();
        ensure_category_path(&conn, "Sleeping Gear > Air Mattresses").unwrap();
        conn.execute("UPDATE categories SET path = 'stale', slug = 'stale'", []).unwrap();

        rebuild_category_metadata(&conn).unwrap();
        let first = paths(&conn);
        let summary = rebuild_category_metadata(&conn).unwrap();
        assert_eq!(summary.updated, 0);
        assert_eq!(paths(&conn), first);
        assert_eq!(
            first,
            vec![
                ("Sleeping Gear".to_string(), 0),
                ("Sleeping Gear > Air Mattresses".to_string(), 1),
                ("Sleeping Gear > Sleeping Bags".to_string(), 1),
            ]
        );
    }

    #[test]
    fn rebuild_isolates_unreachable_rows() {
        let conn = test_connection();
        conn.execute_batch(
            "PRAGMA foreign_keys=OFF;
             INSERT INTO categories (category_id, parent_id, name, slug, path, level)
             VALUES (1, 2, 'Loop A', 'x', 'x', 3),
                    (2, 1, 'Loop B', 'x', 'x', 3),
                    (3, 99, 'Orphan', 'x', 'x', 2);",
        )
        .unwrap();

        let summary = rebuild_category_metadata(&conn).unwrap();
        assert_eq!(summary.isolated, 2);
        assert_eq!(summary.updated, 3);

        let loop_a = conn.category_by_id(1).unwrap().unwrap();
        assert_eq!((loop_a.path.as_str(), loop_a.level, loop_a.slug.as_str()), ("Loop A", 0, "loop-a"));
        let orphan = conn.category_by_id(3).unwrap().unwrap();
        assert_eq!((orphan.path.as_str(), orphan.level), ("Orphan", 0));
    }
}
