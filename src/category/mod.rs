pub mod admin;
pub mod path;
pub mod rules;
pub mod tree;

pub use admin::{create_category, delete_category, update_category, CategoryChange};
pub use path::{join_category_path, sanitize_category_name, slugify, split_category_path};
pub use rules::{
    normalize_product_category, normalize_product_category_default, ProductFields, RuleSet,
    FALLBACK_CATEGORY,
};
pub use tree::{
    all_categories, category_tree, descendant_category_ids, ensure_category_path,
    rebuild_category_metadata, CategoryNode, EnsuredCategory, RebuildSummary,
};
