use std::path::Path;

use rusqlite::types::{ToSql, Value as SqlValue};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::error::{CatalogError, Result};
use crate::store::{
    Category, CategoryStore, CategoryUpdate, DerivedFields, NewCategory, ProductStore, ProductText,
};
use crate::text::sections::{build_description_sections, DescriptionSections, SectionInput};

pub fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS categories (
            category_id INTEGER PRIMARY KEY,
            parent_id   INTEGER REFERENCES categories(category_id),
            name        TEXT NOT NULL,
            slug        TEXT NOT NULL,
            path        TEXT NOT NULL,
            level       INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        -- sibling names are unique, root level included
        CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_sibling
            ON categories(COALESCE(parent_id, 0), name);
        CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id);

        CREATE TABLE IF NOT EXISTS products (
            product_id           INTEGER PRIMARY KEY,
            name                 TEXT NOT NULL,
            brand                TEXT,
            category             TEXT,
            category_id          INTEGER REFERENCES categories(category_id),
            description          TEXT,
            html_description     TEXT,
            long_description     TEXT,
            brief_description    TEXT,
            shipping_method      TEXT,
            shipping_limitations TEXT,
            processing_time      TEXT,
            created_at           TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at           TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id);

        CREATE TABLE IF NOT EXISTS product_variations (
            id              INTEGER PRIMARY KEY,
            product_id      INTEGER NOT NULL REFERENCES products(product_id) ON DELETE CASCADE,
            theme_name      TEXT,
            variation_value TEXT,
            variation_order INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_variations_product ON product_variations(product_id);

        CREATE TABLE IF NOT EXISTS product_parameters (
            id              INTEGER PRIMARY KEY,
            product_id      INTEGER NOT NULL REFERENCES products(product_id) ON DELETE CASCADE,
            parameter_name  TEXT,
            parameter_value TEXT,
            parameter_order INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_parameters_product ON product_parameters(product_id);

        CREATE TABLE IF NOT EXISTS product_packaging (
            id             INTEGER PRIMARY KEY,
            product_id     INTEGER NOT NULL REFERENCES products(product_id) ON DELETE CASCADE,
            package_number INTEGER,
            size           TEXT,
            weight         REAL,
            content        TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_packaging_product ON product_packaging(product_id);
        ",
    )?;
    Ok(())
}

/// `BEGIN IMMEDIATE`: takes the write lock up front so writers queue instead
/// of failing halfway through a read-modify-write.
pub fn immediate_transaction(conn: &Connection) -> Result<Transaction<'_>> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// ── Categories ──

const CATEGORY_COLUMNS: &str = "category_id, parent_id, name, slug, path, level";

fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        category_id: row.get(0)?,
        parent_id: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        path: row.get(4)?,
        level: row.get(5)?,
    })
}

impl CategoryStore for Connection {
    fn find_category(&self, parent_id: Option<i64>, name: &str) -> Result<Option<Category>> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE parent_id IS ?1 AND name = ?2");
        Ok(self
            .query_row(&sql, params![parent_id, name], category_from_row)
            .optional()?)
    }

    fn category_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE category_id = ?1");
        Ok(self.query_row(&sql, [id], category_from_row).optional()?)
    }

    fn insert_category(&self, category: &NewCategory) -> Result<i64> {
        let inserted = self.execute(
            "INSERT INTO categories (parent_id, name, slug, path, level) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                category.parent_id,
                category.name,
                category.slug,
                category.path,
                category.level
            ],
        );
        match inserted {
            Ok(_) => Ok(self.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(CatalogError::DuplicateCategory {
                parent_id: category.parent_id,
                name: category.name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn update_category(&self, id: i64, update: &CategoryUpdate) -> Result<()> {
        let mut fields: Vec<(&str, SqlValue)> = Vec::new();
        if let Some(name) = &update.name {
            fields.push(("name", SqlValue::Text(name.clone())));
        }
        if let Some(parent_id) = update.parent_id {
            fields.push(("parent_id", parent_id.map_or(SqlValue::Null, SqlValue::Integer)));
        }
        if let Some(slug) = &update.slug {
            fields.push(("slug", SqlValue::Text(slug.clone())));
        }
        if let Some(path) = &update.path {
            fields.push(("path", SqlValue::Text(path.clone())));
        }
        if let Some(level) = update.level {
            fields.push(("level", SqlValue::Integer(level)));
        }
        if fields.is_empty() {
            return Ok(());
        }

        let set_clause: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, (k, _))| format!("{} = ?{}", k, i + 1))
            .collect();
        let sql = format!(
            "UPDATE categories SET {}, updated_at = datetime('now') WHERE category_id = ?{}",
            set_clause.join(", "),
            fields.len() + 1
        );

        let params_owned: Vec<SqlValue> = fields.into_iter().map(|(_, v)| v).collect();
        let mut params: Vec<&dyn ToSql> = params_owned.iter().map(|v| v as &dyn ToSql).collect();
        params.push(&id as &dyn ToSql);

        match self.execute(&sql, params.as_slice()) {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                let current = self.category_by_id(id)?;
                Err(CatalogError::DuplicateCategory {
                    parent_id: update
                        .parent_id
                        .unwrap_or_else(|| current.as_ref().and_then(|c| c.parent_id)),
                    name: update
                        .name
                        .clone()
                        .or_else(|| current.map(|c| c.name))
                        .unwrap_or_default(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete_category(&self, id: i64) -> Result<()> {
        self.execute("DELETE FROM categories WHERE category_id = ?1", [id])?;
        Ok(())
    }

    fn list_categories(&self) -> Result<Vec<Category>> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY level, name");
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map([], category_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count_child_categories(&self, id: i64) -> Result<i64> {
        Ok(self.query_row(
            "SELECT COUNT(*) FROM categories WHERE parent_id = ?1",
            [id],
            |r| r.get(0),
        )?)
    }

    fn count_products_in_category(&self, id: i64) -> Result<i64> {
        Ok(self.query_row(
            "SELECT COUNT(*) FROM products WHERE category_id = ?1",
            [id],
            |r| r.get(0),
        )?)
    }
}

// ── Products ──

const PRODUCT_TEXT_COLUMNS: &str = "product_id, name, brand, category, category_id, description, \
                                    html_description, long_description, brief_description";

fn product_text_from_row(row: &Row) -> rusqlite::Result<ProductText> {
    Ok(ProductText {
        product_id: row.get(0)?,
        name: row.get(1)?,
        brand: row.get(2)?,
        category: row.get(3)?,
        category_id: row.get(4)?,
        description: row.get(5)?,
        html_description: row.get(6)?,
        long_description: row.get(7)?,
        brief_description: row.get(8)?,
    })
}

impl ProductStore for Connection {
    fn read_product_text(&self, product_id: i64) -> Result<Option<ProductText>> {
        let sql = format!("SELECT {PRODUCT_TEXT_COLUMNS} FROM products WHERE product_id = ?1");
        Ok(self
            .query_row(&sql, [product_id], product_text_from_row)
            .optional()?)
    }

    fn write_product_derived_fields(&self, product_id: i64, fields: &DerivedFields) -> Result<()> {
        let mut columns: Vec<(&str, SqlValue)> = Vec::new();
        if let Some(category) = &fields.category {
            columns.push(("category", SqlValue::Text(category.clone())));
        }
        if let Some(category_id) = fields.category_id {
            columns.push(("category_id", SqlValue::Integer(category_id)));
        }
        if let Some(description) = &fields.description {
            columns.push(("description", SqlValue::Text(description.clone())));
        }
        if let Some(long) = &fields.long_description {
            columns.push(("long_description", SqlValue::Text(long.clone())));
        }
        if let Some(brief) = &fields.brief_description {
            columns.push(("brief_description", SqlValue::Text(brief.clone())));
        }
        if columns.is_empty() {
            return Ok(());
        }

        let set_clause: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, (k, _))| format!("{} = ?{}", k, i + 1))
            .collect();
        let sql = format!(
            "UPDATE products SET {}, updated_at = datetime('now') WHERE product_id = ?{}",
            set_clause.join(", "),
            columns.len() + 1
        );

        let params_owned: Vec<SqlValue> = columns.into_iter().map(|(_, v)| v).collect();
        let mut params: Vec<&dyn ToSql> = params_owned.iter().map(|v| v as &dyn ToSql).collect();
        params.push(&product_id as &dyn ToSql);
        self.execute(&sql, params.as_slice())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductScope {
    All,
    /// Products whose raw `category` text is non-blank.
    WithRawCategory,
}

pub fn fetch_product_texts(
    conn: &Connection,
    scope: ProductScope,
    limit: Option<usize>,
) -> Result<Vec<ProductText>> {
    let sql = format!(
        "SELECT {PRODUCT_TEXT_COLUMNS} FROM products{} ORDER BY product_id{}",
        match scope {
            ProductScope::All => "",
            ProductScope::WithRawCategory => " WHERE TRIM(COALESCE(category, '')) != ''",
        },
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], product_text_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct VariationRow {
    pub theme_name: Option<String>,
    pub variation_value: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParameterRow {
    pub parameter_name: Option<String>,
    pub parameter_value: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PackagingRow {
    pub package_number: Option<i64>,
    pub size: Option<String>,
    pub weight: Option<f64>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub html_description: Option<String>,
    pub long_description: Option<String>,
    pub shipping_method: Option<String>,
    pub shipping_limitations: Option<String>,
    pub processing_time: Option<String>,
    pub variations: Vec<VariationRow>,
    pub parameters: Vec<ParameterRow>,
    pub packaging: Vec<PackagingRow>,
}

pub fn insert_product(conn: &Connection, product: &NewProduct) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let product_id;
    {
        tx.execute(
            "INSERT INTO products
             (name, brand, category, description, html_description, long_description,
              shipping_method, shipping_limitations, processing_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                product.name,
                product.brand,
                product.category,
                product.description,
                product.html_description,
                product.long_description,
                product.shipping_method,
                product.shipping_limitations,
                product.processing_time,
            ],
        )?;
        product_id = tx.last_insert_rowid();

        let mut v_stmt = tx.prepare(
            "INSERT INTO product_variations (product_id, theme_name, variation_value, variation_order)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (i, v) in product.variations.iter().enumerate() {
            v_stmt.execute(params![product_id, v.theme_name, v.variation_value, i as i64])?;
        }

        let mut p_stmt = tx.prepare(
            "INSERT INTO product_parameters (product_id, parameter_name, parameter_value, parameter_order)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (i, p) in product.parameters.iter().enumerate() {
            p_stmt.execute(params![product_id, p.parameter_name, p.parameter_value, i as i64])?;
        }

        let mut k_stmt = tx.prepare(
            "INSERT INTO product_packaging (product_id, package_number, size, weight, content)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for k in &product.packaging {
            k_stmt.execute(params![product_id, k.package_number, k.size, k.weight, k.content])?;
        }
    }
    tx.commit()?;
    Ok(product_id)
}

struct SectionSource {
    name: Option<String>,
    long_description: Option<String>,
    description: Option<String>,
    shipping_method: Option<String>,
    shipping_limitations: Option<String>,
    processing_time: Option<String>,
}

/// Sections are derived on every read and never stored.
pub fn product_sections(conn: &Connection, product_id: i64) -> Result<Option<DescriptionSections>> {
    let source = conn
        .query_row(
            "SELECT name, long_description, description, shipping_method, shipping_limitations, processing_time
             FROM products WHERE product_id = ?1",
            [product_id],
            |row| {
                Ok(SectionSource {
                    name: row.get(0)?,
                    long_description: row.get(1)?,
                    description: row.get(2)?,
                    shipping_method: row.get(3)?,
                    shipping_limitations: row.get(4)?,
                    processing_time: row.get(5)?,
                })
            },
        )
        .optional()?;
    let Some(source) = source else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT theme_name, variation_value FROM product_variations
         WHERE product_id = ?1 ORDER BY variation_order, id",
    )?;
    let variations = stmt
        .query_map([product_id], |row| {
            Ok(VariationRow {
                theme_name: row.get(0)?,
                variation_value: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT parameter_name, parameter_value FROM product_parameters
         WHERE product_id = ?1 ORDER BY parameter_order, id",
    )?;
    let parameters = stmt
        .query_map([product_id], |row| {
            Ok(ParameterRow {
                parameter_name: row.get(0)?,
                parameter_value: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT package_number, size, weight, content FROM product_packaging
         WHERE product_id = ?1 ORDER BY package_number, id",
    )?;
    let packaging = stmt
        .query_map([product_id], |row| {
            Ok(PackagingRow {
                package_number: row.get(0)?,
                size: row.get(1)?,
                weight: row.get(2)?,
                content: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(build_description_sections(&SectionInput {
        name: source.name.as_deref(),
        long_description: source.long_description.as_deref(),
        description: source.description.as_deref(),
        variations: &variations,
        parameters: &parameters,
        packaging: &packaging,
        shipping_method: source.shipping_method.as_deref(),
        shipping_limitations: source.shipping_limitations.as_deref(),
        processing_time: source.processing_time.as_deref(),
    })))
}

/// In-memory database with the full schema, for tests.
#[cfg(test)]
pub(crate) fn test_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
    init_schema(&conn).unwrap();
    conn
}

#[cfg(test)]
pub(crate) fn add_product(conn: &Connection, name: &str, category: Option<&str>) -> i64 {
    insert_product(
        conn,
        &NewProduct {
            name: name.to_string(),
            category: category.map(str::to_string),
            ..Default::default()
        },
    )
    .unwrap()
}
