use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::buildings::domain::{
    Borough, Building, BuildingDetail, BuildingId, BuildingSummary, Elevator, Opportunity,
    OpportunityId, OpportunityListing, OpportunityStatus, PriorityLevel, Violation,
    ViolationActivity, ViolationSeverity, ViolationStatus,
};
use crate::buildings::memory::MemoryBuildingStore;
use crate::buildings::repository::{
    BuildingStore, MonthlyViolations, OpportunityFinancials, PipelineCounts, StoreError,
    StoredGrade,
};
use crate::buildings::retrieval::{PageWindow, PredicateSet, SortSpec};
use crate::buildings::scoring::{
    FixedSaleActivity, OpportunityGrade, OpportunityScorer, ScoringFacts,
};
use crate::buildings::{OpportunityContext, OpportunityService};

pub(super) const REFERENCE_YEAR: i32 = 2025;

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn building(
    id: i64,
    address: &str,
    borough: Borough,
    year_built: Option<i32>,
    floors: Option<i32>,
) -> Building {
    Building {
        id: BuildingId(id),
        building_code: format!("10{id:05}"),
        address: address.to_string(),
        borough,
        zip_code: None,
        year_built,
        floors,
        units: None,
        owner_name: None,
        owner_contact: None,
        property_manager: None,
        last_inspection_date: None,
    }
}

pub(super) fn elevator(
    id: i64,
    building_id: i64,
    code: &str,
    year_installed: Option<i32>,
    modernization_year: Option<i32>,
) -> Elevator {
    Elevator {
        id,
        building_id: BuildingId(building_id),
        elevator_code: code.to_string(),
        device_number: None,
        elevator_type: Some("Passenger".to_string()),
        manufacturer: Some("Otis".to_string()),
        year_installed,
        capacity: Some(2500),
        floors_served: None,
        last_inspection_date: None,
        inspection_status: None,
        modernization_year,
    }
}

pub(super) fn violation(
    id: i64,
    building_id: i64,
    violation_date: Option<NaiveDate>,
    status: ViolationStatus,
) -> Violation {
    Violation {
        id,
        building_id: BuildingId(building_id),
        violation_code: format!("V-{id:04}"),
        violation_date,
        violation_type: Some("Elevator".to_string()),
        description: None,
        severity: ViolationSeverity::Medium,
        status,
        resolution_date: None,
        fine_amount: None,
    }
}

pub(super) fn opportunity(id: i64, building_id: i64, score: Option<u8>) -> Opportunity {
    Opportunity {
        id: OpportunityId(id),
        building_id: BuildingId(building_id),
        opportunity_score: score,
        priority_level: score.map(PriorityLevel::for_score),
        estimated_value: score.map(|score| f64::from(score) * 10_000.0),
        roi_estimate: Some(18.5),
        payback_period_years: Some(6.0),
        energy_savings_potential: Some(22.0),
        status: OpportunityStatus::Identified,
        notes: Some("walk-through requested".to_string()),
    }
}

/// Seven buildings across all boroughs.
///
/// Stored scores: 1→63, 2→68, 3→45, 4→28, 5→88, 7→ungraded; building 6 has
/// no opportunity record and building 7 has no `year_built`.
pub(super) fn seeded_store() -> MemoryBuildingStore {
    let store = MemoryBuildingStore::default();

    let mut tower = building(1, "350 5th Ave", Borough::Manhattan, Some(1931), Some(102));
    tower.zip_code = Some("10118".to_string());
    tower.last_inspection_date = Some(date(2024, 3, 1));

    let mut heights = building(2, "1 Pierrepont St", Borough::Brooklyn, Some(1962), Some(18));
    heights.zip_code = Some("11201".to_string());
    heights.last_inspection_date = Some(date(2023, 11, 15));

    let mut parkway = building(3, "200 Eastern Pkwy", Borough::Brooklyn, Some(1925), Some(9));
    parkway.zip_code = Some("11238".to_string());

    let mut boulevard = building(4, "41-02 Queens Blvd", Borough::Queens, Some(1989), Some(12));
    boulevard.zip_code = Some("11104".to_string());
    boulevard.last_inspection_date = Some(date(2024, 6, 20));

    let mut concourse = building(5, "890 Grand Concourse", Borough::Bronx, Some(1938), Some(6));
    concourse.zip_code = Some("10451".to_string());
    concourse.last_inspection_date = Some(date(2022, 9, 1));

    let terrace = building(
        6,
        "10 Richmond Terrace",
        Borough::StatenIsland,
        Some(2004),
        Some(4),
    );
    let madison = building(7, "11 Madison Ave", Borough::Manhattan, None, Some(29));

    for record in [tower, heights, parkway, boulevard, concourse, terrace, madison] {
        store.insert_building(record).expect("insert building");
    }

    for record in [
        elevator(1, 2, "2E-02", Some(1990), Some(2008)),
        elevator(2, 2, "2E-01", Some(1962), None),
        elevator(3, 5, "5E-01", Some(1938), None),
    ] {
        store.insert_elevator(record).expect("insert elevator");
    }

    for record in [
        violation(1, 1, Some(date(2021, 5, 4)), ViolationStatus::Resolved),
        violation(2, 2, Some(date(2023, 1, 10)), ViolationStatus::Open),
        violation(3, 2, Some(date(2024, 2, 2)), ViolationStatus::Open),
        violation(4, 2, None, ViolationStatus::Resolved),
        violation(5, 3, Some(date(2024, 8, 30)), ViolationStatus::Open),
        violation(6, 5, Some(date(2020, 1, 1)), ViolationStatus::Open),
        violation(7, 5, Some(date(2021, 1, 1)), ViolationStatus::Open),
        violation(8, 5, Some(date(2022, 1, 1)), ViolationStatus::Open),
        violation(9, 5, Some(date(2023, 1, 1)), ViolationStatus::Resolved),
    ] {
        store.insert_violation(record).expect("insert violation");
    }

    for record in [
        opportunity(101, 1, Some(63)),
        opportunity(102, 2, Some(68)),
        opportunity(103, 3, Some(45)),
        opportunity(104, 4, Some(28)),
        opportunity(105, 5, Some(88)),
        opportunity(107, 7, None),
    ] {
        store.insert_opportunity(record).expect("insert opportunity");
    }

    store
}

/// `count` Queens buildings with ids `1..=count` and descending scores.
pub(super) fn bulk_store(count: i64) -> MemoryBuildingStore {
    let store = MemoryBuildingStore::default();
    for id in 1..=count {
        let address = format!("{id} Northern Blvd");
        store
            .insert_building(building(id, &address, Borough::Queens, Some(1950), Some(8)))
            .expect("insert building");
        let score = u8::try_from(100 - id).unwrap_or(0);
        store
            .insert_opportunity(opportunity(1000 + id, id, Some(score)))
            .expect("insert opportunity");
    }
    store
}

pub(super) fn scorer() -> OpportunityScorer {
    OpportunityScorer::new(REFERENCE_YEAR)
}

pub(super) fn build_service<S>(store: S) -> OpportunityService<S, FixedSaleActivity>
where
    S: BuildingStore + 'static,
{
    OpportunityService::new(Arc::new(store), Arc::new(FixedSaleActivity(false)), scorer())
}

pub(super) fn build_context<S>(store: S) -> OpportunityContext<S, FixedSaleActivity>
where
    S: BuildingStore + 'static,
{
    OpportunityContext::new(Arc::new(store), Arc::new(FixedSaleActivity(false)), scorer())
}

pub(super) fn ids(rows: &[BuildingSummary]) -> Vec<i64> {
    rows.iter().map(|row| row.building.id.0).collect()
}

pub(super) fn opportunity_ids(rows: &[OpportunityListing]) -> Vec<i64> {
    rows.iter().map(|row| row.opportunity.id.0).collect()
}

/// Delegates to a memory store but refuses to save one building's grade.
pub(super) struct FailingStore {
    pub(super) inner: MemoryBuildingStore,
    pub(super) fail_on: BuildingId,
}

#[async_trait]
impl BuildingStore for FailingStore {
    async fn find_page(
        &self,
        predicates: &PredicateSet,
        sort: SortSpec,
        window: PageWindow,
    ) -> Result<Vec<BuildingSummary>, StoreError> {
        self.inner.find_page(predicates, sort, window).await
    }

    async fn count_matching(&self, predicates: &PredicateSet) -> Result<u64, StoreError> {
        self.inner.count_matching(predicates).await
    }

    async fn find_opportunities(
        &self,
        predicates: &PredicateSet,
        window: PageWindow,
    ) -> Result<Vec<OpportunityListing>, StoreError> {
        self.inner.find_opportunities(predicates, window).await
    }

    async fn count_opportunities(&self, predicates: &PredicateSet) -> Result<u64, StoreError> {
        self.inner.count_opportunities(predicates).await
    }

    async fn find_building(&self, id: BuildingId) -> Result<Option<BuildingDetail>, StoreError> {
        self.inner.find_building(id).await
    }

    async fn elevators(&self, id: BuildingId) -> Result<Vec<Elevator>, StoreError> {
        self.inner.elevators(id).await
    }

    async fn violations(&self, id: BuildingId) -> Result<Vec<Violation>, StoreError> {
        self.inner.violations(id).await
    }

    async fn scoring_facts(&self, id: BuildingId) -> Result<Option<ScoringFacts>, StoreError> {
        self.inner.scoring_facts(id).await
    }

    async fn building_ids(&self) -> Result<Vec<BuildingId>, StoreError> {
        self.inner.building_ids().await
    }

    async fn save_grade(&self, id: BuildingId, grade: OpportunityGrade) -> Result<(), StoreError> {
        if id == self.fail_on {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.save_grade(id, grade).await
    }

    async fn update_opportunity_status(
        &self,
        id: OpportunityId,
        status: OpportunityStatus,
        notes: Option<String>,
    ) -> Result<Option<Opportunity>, StoreError> {
        self.inner.update_opportunity_status(id, status, notes).await
    }

    async fn opportunity_grades(&self) -> Result<Vec<StoredGrade>, StoreError> {
        self.inner.opportunity_grades().await
    }

    async fn pipeline_counts(&self) -> Result<PipelineCounts, StoreError> {
        self.inner.pipeline_counts().await
    }

    async fn opportunity_financials(&self) -> Result<Vec<OpportunityFinancials>, StoreError> {
        self.inner.opportunity_financials().await
    }

    async fn monthly_violations(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<MonthlyViolations>, StoreError> {
        self.inner.monthly_violations(since).await
    }

    async fn violation_activity(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<ViolationActivity>, StoreError> {
        self.inner.violation_activity(since).await
    }
}

/// Every call fails as if the database were down.
pub(super) struct UnavailableStore;

fn offline<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("database offline".to_string()))
}

#[async_trait]
impl BuildingStore for UnavailableStore {
    async fn find_page(
        &self,
        _predicates: &PredicateSet,
        _sort: SortSpec,
        _window: PageWindow,
    ) -> Result<Vec<BuildingSummary>, StoreError> {
        offline()
    }

    async fn count_matching(&self, _predicates: &PredicateSet) -> Result<u64, StoreError> {
        offline()
    }

    async fn find_opportunities(
        &self,
        _predicates: &PredicateSet,
        _window: PageWindow,
    ) -> Result<Vec<OpportunityListing>, StoreError> {
        offline()
    }

    async fn count_opportunities(&self, _predicates: &PredicateSet) -> Result<u64, StoreError> {
        offline()
    }

    async fn find_building(&self, _id: BuildingId) -> Result<Option<BuildingDetail>, StoreError> {
        offline()
    }

    async fn elevators(&self, _id: BuildingId) -> Result<Vec<Elevator>, StoreError> {
        offline()
    }

    async fn violations(&self, _id: BuildingId) -> Result<Vec<Violation>, StoreError> {
        offline()
    }

    async fn scoring_facts(&self, _id: BuildingId) -> Result<Option<ScoringFacts>, StoreError> {
        offline()
    }

    async fn building_ids(&self) -> Result<Vec<BuildingId>, StoreError> {
        offline()
    }

    async fn save_grade(&self, _id: BuildingId, _grade: OpportunityGrade) -> Result<(), StoreError> {
        offline()
    }

    async fn update_opportunity_status(
        &self,
        _id: OpportunityId,
        _status: OpportunityStatus,
        _notes: Option<String>,
    ) -> Result<Option<Opportunity>, StoreError> {
        offline()
    }

    async fn opportunity_grades(&self) -> Result<Vec<StoredGrade>, StoreError> {
        offline()
    }

    async fn pipeline_counts(&self) -> Result<PipelineCounts, StoreError> {
        offline()
    }

    async fn opportunity_financials(&self) -> Result<Vec<OpportunityFinancials>, StoreError> {
        offline()
    }

    async fn monthly_violations(
        &self,
        _since: NaiveDate,
    ) -> Result<Vec<MonthlyViolations>, StoreError> {
        offline()
    }

    async fn violation_activity(
        &self,
        _since: NaiveDate,
    ) -> Result<Vec<ViolationActivity>, StoreError> {
        offline()
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
