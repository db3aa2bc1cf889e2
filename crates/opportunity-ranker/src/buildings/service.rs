use std::sync::Arc;

use chrono::{Days, Months, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::analytics::{
    roi_by_priority, score_band_values, DashboardStatistics, PriorityMismatch, RoiSummary,
    ScoreBandValue, TREND_MONTHS,
};
use super::domain::{
    BuildingDetail, BuildingId, BuildingSummary, Elevator, Opportunity, OpportunityId,
    OpportunityListing, OpportunityStatus, Violation, ViolationActivity,
};
use super::repository::{BuildingStore, StoreError};
use super::retrieval::{
    BuildingFilter, InvalidQuery, OpportunityFilter, Page, PageRequest, PageWindow,
    PaginationMeta, PredicateSet, SortSpec,
};
use super::scoring::{OpportunityScorer, SaleActivitySource, ScoreBreakdown, ScoringError};

pub const DEFAULT_HOT_LIMIT: u32 = 10;
pub const MAX_HOT_LIMIT: u32 = 50;
pub const DEFAULT_RECENT_DAYS: u32 = 30;
pub const MAX_RECENT_DAYS: u32 = 365;

/// Building detail with the score the building would get today. The
/// breakdown is absent when the building cannot be scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingProfile {
    #[serde(flatten)]
    pub detail: BuildingDetail,
    pub score_breakdown: Option<ScoreBreakdown>,
}

/// Scoring and retrieval over an injected store. Cheap to clone, so callers
/// build one per request or job instead of sharing a process-wide instance.
pub struct OpportunityService<S, M> {
    store: Arc<S>,
    sale_activity: Arc<M>,
    scorer: OpportunityScorer,
}

impl<S, M> Clone for OpportunityService<S, M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            sale_activity: Arc::clone(&self.sale_activity),
            scorer: self.scorer,
        }
    }
}

impl<S, M> OpportunityService<S, M>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    pub fn new(store: Arc<S>, sale_activity: Arc<M>, scorer: OpportunityScorer) -> Self {
        Self {
            store,
            sale_activity,
            scorer,
        }
    }

    pub fn scorer(&self) -> OpportunityScorer {
        self.scorer
    }

    /// One page of enriched buildings plus pagination metadata. The page and
    /// the total are read with the same predicate set from one snapshot.
    pub async fn list_buildings(
        &self,
        filter: &BuildingFilter,
        page: &PageRequest,
    ) -> Result<Page<BuildingSummary>, OpportunityError> {
        let predicates = PredicateSet::from_filter(filter);
        let (data, total) = self
            .store
            .find_page_with_count(&predicates, page.sort(), page.window())
            .await?;

        debug!(
            total,
            returned = data.len(),
            limit = page.limit(),
            offset = page.offset(),
            "listed buildings"
        );
        Ok(Page {
            data,
            pagination: PaginationMeta::new(total, page),
        })
    }

    /// Opportunity pipeline ordered by score. The sort in `page` is ignored.
    pub async fn list_opportunities(
        &self,
        filter: &OpportunityFilter,
        page: &PageRequest,
    ) -> Result<Page<OpportunityListing>, OpportunityError> {
        let predicates = PredicateSet::from_opportunity_filter(filter);
        let (data, total) = self
            .store
            .find_opportunities_with_count(&predicates, page.window())
            .await?;

        debug!(
            total,
            returned = data.len(),
            limit = page.limit(),
            offset = page.offset(),
            "listed opportunities"
        );
        Ok(Page {
            data,
            pagination: PaginationMeta::new(total, page),
        })
    }

    pub async fn get_building(&self, id: BuildingId) -> Result<BuildingProfile, OpportunityError> {
        let detail = self
            .store
            .find_building(id)
            .await?
            .ok_or_else(|| OpportunityError::building_not_found(id))?;

        let score_breakdown = match self.score_building(id).await {
            Ok(breakdown) => Some(breakdown),
            Err(OpportunityError::Scoring(error)) => {
                debug!(building_id = %id, %error, "detail served without a score breakdown");
                None
            }
            Err(other) => return Err(other),
        };

        Ok(BuildingProfile {
            detail,
            score_breakdown,
        })
    }

    pub async fn building_elevators(
        &self,
        id: BuildingId,
    ) -> Result<Vec<Elevator>, OpportunityError> {
        self.ensure_building(id).await?;
        Ok(self.store.elevators(id).await?)
    }

    pub async fn building_violations(
        &self,
        id: BuildingId,
    ) -> Result<Vec<Violation>, OpportunityError> {
        self.ensure_building(id).await?;
        Ok(self.store.violations(id).await?)
    }

    /// Scores a building without persisting anything.
    pub async fn score_building(&self, id: BuildingId) -> Result<ScoreBreakdown, OpportunityError> {
        let facts = self
            .store
            .scoring_facts(id)
            .await?
            .ok_or_else(|| OpportunityError::building_not_found(id))?;
        let recent_sale = self.sale_activity.recent_sale(id);
        Ok(self.scorer.score(&facts, recent_sale)?)
    }

    /// Recomputes the score, persists score and priority together, and
    /// returns the breakdown.
    pub async fn recalculate_score(
        &self,
        id: BuildingId,
    ) -> Result<ScoreBreakdown, OpportunityError> {
        let breakdown = self.score_building(id).await?;
        let grade = breakdown.grade();

        match self.store.save_grade(id, grade).await {
            Ok(()) => {}
            Err(StoreError::NotFound) => {
                return Err(OpportunityError::NotFound(format!(
                    "building {id} has no opportunity record"
                )))
            }
            Err(other) => return Err(other.into()),
        }

        info!(
            building_id = %id,
            score = grade.score(),
            priority = %grade.priority(),
            "recalculated opportunity score"
        );
        Ok(breakdown)
    }

    pub async fn update_opportunity_status(
        &self,
        id: OpportunityId,
        status: OpportunityStatus,
        notes: Option<String>,
    ) -> Result<Opportunity, OpportunityError> {
        let opportunity = self
            .store
            .update_opportunity_status(id, status, notes)
            .await?
            .ok_or_else(|| OpportunityError::NotFound(format!("opportunity {id} not found")))?;

        info!(opportunity_id = %id, status = status.label(), "opportunity status updated");
        Ok(opportunity)
    }

    pub async fn statistics(&self) -> Result<DashboardStatistics, OpportunityError> {
        self.statistics_as_of(Utc::now().date_naive()).await
    }

    /// Dashboard figures with the violation trend covering the months
    /// before `as_of`.
    pub async fn statistics_as_of(
        &self,
        as_of: NaiveDate,
    ) -> Result<DashboardStatistics, OpportunityError> {
        let counts = self.store.pipeline_counts().await?;
        let grades = self.store.opportunity_grades().await?;
        let since = as_of
            .checked_sub_months(Months::new(TREND_MONTHS))
            .unwrap_or(NaiveDate::MIN);
        let trend = self.store.monthly_violations(since).await?;
        Ok(DashboardStatistics::collect(counts, &grades, trend))
    }

    pub async fn recent_violations(
        &self,
        days: u32,
    ) -> Result<Vec<ViolationActivity>, OpportunityError> {
        self.recent_violations_as_of(days, Utc::now().date_naive())
            .await
    }

    /// Buildings with violations dated within `days` of `as_of`, most recent
    /// first. `days` must be between 1 and 365.
    pub async fn recent_violations_as_of(
        &self,
        days: u32,
        as_of: NaiveDate,
    ) -> Result<Vec<ViolationActivity>, OpportunityError> {
        if !(1..=MAX_RECENT_DAYS).contains(&days) {
            return Err(OpportunityError::InvalidArgument(format!(
                "days must be between 1 and {MAX_RECENT_DAYS}, got {days}"
            )));
        }
        let since = as_of
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Ok(self.store.violation_activity(since).await?)
    }

    pub async fn score_distribution(&self) -> Result<Vec<ScoreBandValue>, OpportunityError> {
        let records = self.store.opportunity_financials().await?;
        Ok(score_band_values(&records))
    }

    pub async fn roi_analysis(&self) -> Result<Vec<RoiSummary>, OpportunityError> {
        let records = self.store.opportunity_financials().await?;
        Ok(roi_by_priority(&records))
    }

    /// Highest-scoring graded buildings, through the regular listing path.
    pub async fn hot_opportunities(
        &self,
        limit: u32,
    ) -> Result<Vec<BuildingSummary>, OpportunityError> {
        if !(1..=MAX_HOT_LIMIT).contains(&limit) {
            return Err(OpportunityError::InvalidArgument(format!(
                "limit must be between 1 and {MAX_HOT_LIMIT}, got {limit}"
            )));
        }

        let graded = PredicateSet::from_filter(&BuildingFilter {
            score_min: Some(0),
            ..BuildingFilter::default()
        });
        let window = PageWindow { limit, offset: 0 };
        Ok(self
            .store
            .find_page(&graded, SortSpec::default(), window)
            .await?)
    }

    /// Stored grades whose priority disagrees with the classifier.
    pub async fn audit_priorities(&self) -> Result<Vec<PriorityMismatch>, OpportunityError> {
        let grades = self.store.opportunity_grades().await?;
        let mismatches: Vec<PriorityMismatch> =
            grades.iter().filter_map(PriorityMismatch::detect).collect();

        if !mismatches.is_empty() {
            warn!(
                inspected = grades.len(),
                mismatched = mismatches.len(),
                "stored priorities disagree with their scores"
            );
        }
        Ok(mismatches)
    }

    pub(crate) async fn building_ids(&self) -> Result<Vec<BuildingId>, OpportunityError> {
        Ok(self.store.building_ids().await?)
    }

    async fn ensure_building(&self, id: BuildingId) -> Result<(), OpportunityError> {
        match self.store.find_building(id).await? {
            Some(_) => Ok(()),
            None => Err(OpportunityError::building_not_found(id)),
        }
    }
}

/// Error raised by the opportunity service.
#[derive(Debug, thiserror::Error)]
pub enum OpportunityError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OpportunityError {
    fn building_not_found(id: BuildingId) -> Self {
        OpportunityError::NotFound(format!("building {id} not found"))
    }
}

impl From<InvalidQuery> for OpportunityError {
    fn from(error: InvalidQuery) -> Self {
        OpportunityError::InvalidArgument(error.to_string())
    }
}
