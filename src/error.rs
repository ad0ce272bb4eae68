use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Sibling with the same name already exists, usually a lost race between two writers.
    #[error("category {name:?} already exists under parent {parent_id:?}")]
    DuplicateCategory { parent_id: Option<i64>, name: String },

    #[error("category {0} not found")]
    CategoryNotFound(i64),

    #[error("parent category {0} not found")]
    ParentNotFound(i64),

    #[error("category name is required")]
    EmptyCategoryName,

    #[error("category {0} cannot be its own parent")]
    SelfParent(i64),

    #[error("cannot move category {id} under its descendant {parent_id}")]
    MoveUnderDescendant { id: i64, parent_id: i64 },

    #[error("cannot delete category {0}: it has child categories")]
    HasChildren(i64),

    #[error("cannot delete category {0}: it is assigned to products")]
    HasProducts(i64),

    #[error("invalid pattern in rule for {path:?}: {source}")]
    InvalidRule {
        path: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid rule file: {0}")]
    RuleFile(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
