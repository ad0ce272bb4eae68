//! Storage operations the category tree and the backfills need. Implemented
//! for `rusqlite::Connection` in [`crate::db`]; tests swap in their own.

use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub category_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub path: String,
    pub level: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct NewCategory<'a> {
    pub parent_id: Option<i64>,
    pub name: &'a str,
    pub slug: &'a str,
    pub path: &'a str,
    pub level: i64,
}

/// Partial update; `None` leaves the column alone. `parent_id: Some(None)`
/// moves the category to the root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub parent_id: Option<Option<i64>>,
    pub slug: Option<String>,
    pub path: Option<String>,
    pub level: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ProductText {
    pub product_id: i64,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub html_description: Option<String>,
    pub long_description: Option<String>,
    pub brief_description: Option<String>,
}

/// Derived columns written back onto a product; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedFields {
    pub category: Option<String>,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub long_description: Option<String>,
    pub brief_description: Option<String>,
}

pub trait CategoryStore {
    fn find_category(&self, parent_id: Option<i64>, name: &str) -> Result<Option<Category>>;
    fn category_by_id(&self, id: i64) -> Result<Option<Category>>;
    /// Fails with `DuplicateCategory` when the sibling name is taken.
    fn insert_category(&self, category: &NewCategory) -> Result<i64>;
    fn update_category(&self, id: i64, update: &CategoryUpdate) -> Result<()>;
    fn delete_category(&self, id: i64) -> Result<()>;
    /// Every row, ordered by `(level, name)`.
    fn list_categories(&self) -> Result<Vec<Category>>;
    fn count_child_categories(&self, id: i64) -> Result<i64>;
    fn count_products_in_category(&self, id: i64) -> Result<i64>;
}

pub trait ProductStore {
    fn read_product_text(&self, product_id: i64) -> Result<Option<ProductText>>;
    fn write_product_derived_fields(&self, product_id: i64, fields: &DerivedFields) -> Result<()>;
}
