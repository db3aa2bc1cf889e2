use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::domain::{
    Borough, BuildingDetail, BuildingId, BuildingSummary, Elevator, Opportunity, OpportunityId,
    OpportunityListing, OpportunityStatus, PriorityLevel, Violation, ViolationActivity,
};
use super::retrieval::{PageWindow, PredicateSet, SortSpec};
use super::scoring::{OpportunityGrade, ScoringFacts};

/// Score and priority as currently stored for a building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredGrade {
    pub building_id: BuildingId,
    pub score: Option<u8>,
    pub priority: Option<PriorityLevel>,
}

/// Table-level counts behind the dashboard statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineCounts {
    pub total_buildings: u64,
    pub total_violations: u64,
    pub open_violations: u64,
    pub borough_distribution: BTreeMap<Borough, u64>,
}

/// Financial columns of one opportunity record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpportunityFinancials {
    pub building_id: BuildingId,
    pub score: Option<u8>,
    pub priority: Option<PriorityLevel>,
    pub estimated_value: Option<f64>,
    pub roi_estimate: Option<f64>,
    pub payback_period_years: Option<f64>,
    pub energy_savings_potential: Option<f64>,
}

/// Violations dated within one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyViolations {
    /// First day of the month.
    pub month: NaiveDate,
    pub count: u64,
}

/// Relational store holding buildings, elevators, violations, and
/// opportunities. Implementations must evaluate `find_page` and
/// `count_matching` against the same predicate semantics.
#[async_trait]
pub trait BuildingStore: Send + Sync {
    async fn find_page(
        &self,
        predicates: &PredicateSet,
        sort: SortSpec,
        window: PageWindow,
    ) -> Result<Vec<BuildingSummary>, StoreError>;

    async fn count_matching(&self, predicates: &PredicateSet) -> Result<u64, StoreError>;

    /// Page and total read from one snapshot. The default issues the two
    /// reads separately; stores that can isolate them override it.
    async fn find_page_with_count(
        &self,
        predicates: &PredicateSet,
        sort: SortSpec,
        window: PageWindow,
    ) -> Result<(Vec<BuildingSummary>, u64), StoreError> {
        let rows = self.find_page(predicates, sort, window).await?;
        let total = self.count_matching(predicates).await?;
        Ok((rows, total))
    }

    /// Opportunities joined with their buildings, highest score first with
    /// ungraded records last and ties broken by opportunity id.
    async fn find_opportunities(
        &self,
        predicates: &PredicateSet,
        window: PageWindow,
    ) -> Result<Vec<OpportunityListing>, StoreError>;

    async fn count_opportunities(&self, predicates: &PredicateSet) -> Result<u64, StoreError>;

    async fn find_opportunities_with_count(
        &self,
        predicates: &PredicateSet,
        window: PageWindow,
    ) -> Result<(Vec<OpportunityListing>, u64), StoreError> {
        let rows = self.find_opportunities(predicates, window).await?;
        let total = self.count_opportunities(predicates).await?;
        Ok((rows, total))
    }

    async fn find_building(&self, id: BuildingId) -> Result<Option<BuildingDetail>, StoreError>;

    async fn elevators(&self, id: BuildingId) -> Result<Vec<Elevator>, StoreError>;

    async fn violations(&self, id: BuildingId) -> Result<Vec<Violation>, StoreError>;

    async fn scoring_facts(&self, id: BuildingId) -> Result<Option<ScoringFacts>, StoreError>;

    async fn building_ids(&self) -> Result<Vec<BuildingId>, StoreError>;

    /// Writes score and priority together. Fails with `NotFound` when the
    /// building has no opportunity record.
    async fn save_grade(&self, id: BuildingId, grade: OpportunityGrade) -> Result<(), StoreError>;

    /// Changes the pipeline status; `notes` of `None` keeps the stored notes.
    async fn update_opportunity_status(
        &self,
        id: OpportunityId,
        status: OpportunityStatus,
        notes: Option<String>,
    ) -> Result<Option<Opportunity>, StoreError>;

    async fn opportunity_grades(&self) -> Result<Vec<StoredGrade>, StoreError>;

    async fn pipeline_counts(&self) -> Result<PipelineCounts, StoreError>;

    async fn opportunity_financials(&self) -> Result<Vec<OpportunityFinancials>, StoreError>;

    /// Per-month violation counts for violations dated on or after `since`,
    /// oldest month first.
    async fn monthly_violations(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<MonthlyViolations>, StoreError>;

    /// Buildings with violations dated on or after `since`, most recent
    /// violation first.
    async fn violation_activity(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<ViolationActivity>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unreadable stored value: {0}")]
    Decode(String),
}
