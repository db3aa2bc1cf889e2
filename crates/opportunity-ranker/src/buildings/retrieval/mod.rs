//! Filtered, sorted, and paginated building and opportunity retrieval.

pub mod filter;
pub mod page;
pub mod predicate;
pub mod sql;

pub use filter::{
    score_threshold, BuildingFilter, OpportunityFilter, PageRequest, PageWindow, SortKey,
    SortOrder, SortSpec,
};
pub use page::{Page, PaginationMeta};
pub use predicate::{Column, Comparison, Predicate, PredicateSet, PredicateValue};

/// Rejected listing input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidQuery {
    #[error("limit must be between 1 and {max}, got {0}", max = filter::MAX_LIMIT)]
    Limit(u32),
    #[error("minimum score must be between 0 and 100, got {0}")]
    ScoreThreshold(f64),
}
