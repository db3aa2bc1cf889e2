//! Building modernization opportunities: scoring, ranked retrieval, and the
//! batch rescorer, over either an in-memory or a Postgres store.

pub mod analytics;
pub mod domain;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod rescore;
pub mod retrieval;
pub mod router;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use analytics::{
    DashboardStatistics, PriorityMismatch, RoiSummary, ScoreBandValue, ScoreBucket, TrendPoint,
};
pub use domain::{
    Borough, Building, BuildingDetail, BuildingId, BuildingSummary, Elevator, Opportunity,
    OpportunityId, OpportunityListing, OpportunityStatus, PriorityLevel, Violation,
    ViolationActivity, ViolationSeverity, ViolationStatus,
};
pub use memory::MemoryBuildingStore;
pub use postgres::PgBuildingStore;
pub use repository::{
    BuildingStore, MonthlyViolations, OpportunityFinancials, PipelineCounts, StoreError,
    StoredGrade,
};
pub use rescore::{
    BatchRescorer, RescoreError, RescoreFailure, RescoreFailurePolicy, RescoreLatch,
    RescoreReport, RescoreState,
};
pub use retrieval::{
    BuildingFilter, InvalidQuery, OpportunityFilter, Page, PageRequest, PaginationMeta, SortSpec,
};
pub use router::{opportunity_router, OpportunityContext};
pub use scoring::{
    FixedSaleActivity, OpportunityGrade, OpportunityScorer, SaleActivitySource, ScoreBreakdown,
    ScoringError, ScoringFacts, SeededSaleActivity,
};
pub use service::{BuildingProfile, OpportunityError, OpportunityService};
