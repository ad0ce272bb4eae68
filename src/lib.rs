//! Camping-goods catalog maintenance: category taxonomy and product
//! description cleanup over a SQLite store.

pub mod backfill;
pub mod category;
pub mod config;
pub mod db;
pub mod error;
pub mod store;
pub mod text;

pub use error::{CatalogError, Result};
