use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};

use super::domain::{
    Building, BuildingDetail, BuildingId, BuildingSummary, Elevator, Opportunity, OpportunityId,
    OpportunityListing, OpportunityStatus, Violation, ViolationActivity, ViolationStatus,
};
use super::repository::{
    BuildingStore, MonthlyViolations, OpportunityFinancials, PipelineCounts, StoreError,
    StoredGrade,
};
use super::retrieval::{Column, PageWindow, PredicateSet, PredicateValue, SortKey, SortOrder, SortSpec};
use super::scoring::{OpportunityGrade, ScoringFacts};

/// Process-local store with the same read semantics as the Postgres store.
/// Aggregates are recomputed from the current rows on every read.
#[derive(Default, Clone)]
pub struct MemoryBuildingStore {
    tables: Arc<Mutex<Tables>>,
}

#[derive(Default)]
struct Tables {
    buildings: BTreeMap<BuildingId, Building>,
    elevators: Vec<Elevator>,
    violations: Vec<Violation>,
    opportunities: BTreeMap<BuildingId, Opportunity>,
}

impl MemoryBuildingStore {
    pub fn insert_building(&self, building: Building) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if tables.buildings.contains_key(&building.id) {
            return Err(StoreError::Conflict);
        }
        tables.buildings.insert(building.id, building);
        Ok(())
    }

    pub fn insert_elevator(&self, elevator: Elevator) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if !tables.buildings.contains_key(&elevator.building_id) {
            return Err(StoreError::NotFound);
        }
        tables.elevators.push(elevator);
        Ok(())
    }

    pub fn insert_violation(&self, violation: Violation) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if !tables.buildings.contains_key(&violation.building_id) {
            return Err(StoreError::NotFound);
        }
        tables.violations.push(violation);
        Ok(())
    }

    /// At most one live opportunity per building.
    pub fn insert_opportunity(&self, opportunity: Opportunity) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if !tables.buildings.contains_key(&opportunity.building_id) {
            return Err(StoreError::NotFound);
        }
        let duplicate_id = tables
            .opportunities
            .values()
            .any(|existing| existing.id == opportunity.id);
        if duplicate_id || tables.opportunities.contains_key(&opportunity.building_id) {
            return Err(StoreError::Conflict);
        }
        tables
            .opportunities
            .insert(opportunity.building_id, opportunity);
        Ok(())
    }

    /// Removes a building with its elevators, violations, and opportunity.
    pub fn remove_building(&self, id: BuildingId) -> bool {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let removed = tables.buildings.remove(&id).is_some();
        tables.elevators.retain(|elevator| elevator.building_id != id);
        tables.violations.retain(|violation| violation.building_id != id);
        tables.opportunities.remove(&id);
        removed
    }

    pub fn opportunity(&self, building_id: BuildingId) -> Option<Opportunity> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        tables.opportunities.get(&building_id).cloned()
    }
}

impl Tables {
    fn summary(&self, building: &Building) -> BuildingSummary {
        let elevator_count = self
            .elevators
            .iter()
            .filter(|elevator| elevator.building_id == building.id)
            .count();
        let (violation_count, open_violation_count) = self
            .violations
            .iter()
            .filter(|violation| violation.building_id == building.id)
            .fold((0u32, 0u32), |(total, open), violation| {
                let is_open = violation.status == ViolationStatus::Open;
                (total + 1, open + u32::from(is_open))
            });
        let opportunity = self.opportunities.get(&building.id);

        BuildingSummary {
            building: building.clone(),
            elevator_count: elevator_count as u32,
            violation_count,
            open_violation_count,
            opportunity_score: opportunity.and_then(|o| o.opportunity_score),
            priority_level: opportunity.and_then(|o| o.priority_level),
            estimated_value: opportunity.and_then(|o| o.estimated_value),
        }
    }

    fn matching(&self, predicates: &PredicateSet) -> Vec<BuildingSummary> {
        self.buildings
            .values()
            .filter(|building| {
                predicates.row().iter().all(|predicate| {
                    predicate.matches(row_value(building, predicate.column).as_ref())
                })
            })
            .map(|building| self.summary(building))
            .filter(|summary| self.aggregates_match(summary, predicates))
            .collect()
    }

    fn aggregates_match(&self, summary: &BuildingSummary, predicates: &PredicateSet) -> bool {
        let opportunity = self.opportunities.get(&summary.building.id);
        predicates.aggregate().iter().all(|predicate| {
            predicate.matches(aggregate_value(summary, opportunity, predicate.column).as_ref())
        })
    }

    fn page(
        &self,
        predicates: &PredicateSet,
        sort: SortSpec,
        window: PageWindow,
    ) -> (Vec<BuildingSummary>, u64) {
        let mut rows = self.matching(predicates);
        let total = rows.len() as u64;
        rows.sort_by(|left, right| compare_summaries(left, right, sort));
        (windowed(rows, window), total)
    }

    /// Every opportunity whose building satisfies both predicate lists,
    /// in pipeline order.
    fn matching_opportunities(&self, predicates: &PredicateSet) -> Vec<OpportunityListing> {
        let mut rows: Vec<OpportunityListing> = self
            .opportunities
            .values()
            .filter_map(|opportunity| {
                let building = self.buildings.get(&opportunity.building_id)?;
                let row_match = predicates.row().iter().all(|predicate| {
                    predicate.matches(row_value(building, predicate.column).as_ref())
                });
                let summary = self.summary(building);
                (row_match && self.aggregates_match(&summary, predicates))
                    .then(|| listing(opportunity, building))
            })
            .collect();
        rows.sort_by(|left, right| {
            let (left, right) = (&left.opportunity, &right.opportunity);
            match (left.opportunity_score, right.opportunity_score) {
                (Some(a), Some(b)) => b.cmp(&a),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
            .then_with(|| left.id.cmp(&right.id))
        });
        rows
    }
}

fn windowed<T>(rows: Vec<T>, window: PageWindow) -> Vec<T> {
    let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
    rows.into_iter()
        .skip(offset)
        .take(window.limit as usize)
        .collect()
}

fn listing(opportunity: &Opportunity, building: &Building) -> OpportunityListing {
    OpportunityListing {
        opportunity: opportunity.clone(),
        building_code: building.building_code.clone(),
        address: building.address.clone(),
        borough: building.borough,
        year_built: building.year_built,
        floors: building.floors,
        owner_name: building.owner_name.clone(),
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn row_value(building: &Building, column: Column) -> Option<PredicateValue> {
    match column {
        Column::Borough => Some(PredicateValue::Text(building.borough.label().to_string())),
        Column::ZipCode => building.zip_code.clone().map(PredicateValue::Text),
        Column::YearBuilt => building.year_built.map(PredicateValue::from),
        Column::Floors => building.floors.map(PredicateValue::from),
        Column::LastInspectionDate => building.last_inspection_date.map(PredicateValue::Date),
        Column::ViolationCount
        | Column::OpportunityScore
        | Column::PriorityLevel
        | Column::OpportunityStatus => None,
    }
}

fn aggregate_value(
    summary: &BuildingSummary,
    opportunity: Option<&Opportunity>,
    column: Column,
) -> Option<PredicateValue> {
    match column {
        Column::ViolationCount => Some(PredicateValue::from(summary.violation_count)),
        Column::OpportunityScore => summary.opportunity_score.map(PredicateValue::from),
        Column::PriorityLevel => summary
            .priority_level
            .map(|priority| PredicateValue::Text(priority.label().to_string())),
        Column::OpportunityStatus => {
            opportunity.map(|o| PredicateValue::Text(o.status.label().to_string()))
        }
        row_column => row_value(&summary.building, row_column),
    }
}

fn sort_value(summary: &BuildingSummary, key: SortKey) -> Option<PredicateValue> {
    let building = &summary.building;
    match key {
        SortKey::Score => summary.opportunity_score.map(PredicateValue::from),
        SortKey::YearBuilt => building.year_built.map(PredicateValue::from),
        SortKey::Floors => building.floors.map(PredicateValue::from),
        SortKey::Violations => Some(PredicateValue::from(summary.violation_count)),
        SortKey::Address => Some(PredicateValue::Text(building.address.clone())),
        SortKey::Borough => Some(PredicateValue::Text(building.borough.label().to_string())),
        SortKey::LastInspection => building.last_inspection_date.map(PredicateValue::Date),
    }
}

/// Missing values sort last in either direction; ties fall back to id.
fn compare_summaries(left: &BuildingSummary, right: &BuildingSummary, sort: SortSpec) -> Ordering {
    let ordering = match (sort_value(left, sort.key), sort_value(right, sort.key)) {
        (Some(a), Some(b)) => {
            let ordering = a.compare(&b).unwrap_or(Ordering::Equal);
            match sort.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    ordering.then_with(|| left.building.id.cmp(&right.building.id))
}

#[async_trait]
impl BuildingStore for MemoryBuildingStore {
    async fn find_page(
        &self,
        predicates: &PredicateSet,
        sort: SortSpec,
        window: PageWindow,
    ) -> Result<Vec<BuildingSummary>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.page(predicates, sort, window).0)
    }

    async fn count_matching(&self, predicates: &PredicateSet) -> Result<u64, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.matching(predicates).len() as u64)
    }

    /// Both reads happen under one lock.
    async fn find_page_with_count(
        &self,
        predicates: &PredicateSet,
        sort: SortSpec,
        window: PageWindow,
    ) -> Result<(Vec<BuildingSummary>, u64), StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.page(predicates, sort, window))
    }

    async fn find_opportunities(
        &self,
        predicates: &PredicateSet,
        window: PageWindow,
    ) -> Result<Vec<OpportunityListing>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(windowed(tables.matching_opportunities(predicates), window))
    }

    async fn count_opportunities(&self, predicates: &PredicateSet) -> Result<u64, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.matching_opportunities(predicates).len() as u64)
    }

    async fn find_opportunities_with_count(
        &self,
        predicates: &PredicateSet,
        window: PageWindow,
    ) -> Result<(Vec<OpportunityListing>, u64), StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let rows = tables.matching_opportunities(predicates);
        let total = rows.len() as u64;
        Ok((windowed(rows, window), total))
    }

    async fn find_building(&self, id: BuildingId) -> Result<Option<BuildingDetail>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let Some(building) = tables.buildings.get(&id) else {
            return Ok(None);
        };
        let summary = tables.summary(building);
        let opportunity = tables.opportunities.get(&id);

        Ok(Some(BuildingDetail {
            summary,
            opportunity_id: opportunity.map(|o| o.id),
            roi_estimate: opportunity.and_then(|o| o.roi_estimate),
            payback_period_years: opportunity.and_then(|o| o.payback_period_years),
            energy_savings_potential: opportunity.and_then(|o| o.energy_savings_potential),
            opportunity_status: opportunity.map(|o| o.status),
            notes: opportunity.and_then(|o| o.notes.clone()),
        }))
    }

    async fn elevators(&self, id: BuildingId) -> Result<Vec<Elevator>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let mut elevators: Vec<Elevator> = tables
            .elevators
            .iter()
            .filter(|elevator| elevator.building_id == id)
            .cloned()
            .collect();
        elevators.sort_by(|a, b| a.elevator_code.cmp(&b.elevator_code));
        Ok(elevators)
    }

    async fn violations(&self, id: BuildingId) -> Result<Vec<Violation>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let mut violations: Vec<Violation> = tables
            .violations
            .iter()
            .filter(|violation| violation.building_id == id)
            .cloned()
            .collect();
        violations.sort_by(|a, b| match (a.violation_date, b.violation_date) {
            (Some(left), Some(right)) => right.cmp(&left).then(a.id.cmp(&b.id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        Ok(violations)
    }

    async fn scoring_facts(&self, id: BuildingId) -> Result<Option<ScoringFacts>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let Some(building) = tables.buildings.get(&id) else {
            return Ok(None);
        };

        let open_violations = tables
            .violations
            .iter()
            .filter(|v| v.building_id == id && v.status == ViolationStatus::Open)
            .count() as u32;
        let elevators: Vec<&Elevator> = tables
            .elevators
            .iter()
            .filter(|elevator| elevator.building_id == id)
            .collect();
        let oldest_modernization_year = elevators
            .iter()
            .filter_map(|elevator| elevator.modernization_year)
            .min();
        let install_years: Vec<f64> = elevators
            .iter()
            .filter_map(|elevator| elevator.year_installed.map(f64::from))
            .collect();
        let average_install_year = if install_years.is_empty() {
            None
        } else {
            Some(install_years.iter().sum::<f64>() / install_years.len() as f64)
        };

        Ok(Some(ScoringFacts {
            building_id: id,
            borough: building.borough,
            year_built: building.year_built,
            floors: building.floors,
            open_violations,
            oldest_modernization_year,
            average_install_year,
        }))
    }

    async fn building_ids(&self) -> Result<Vec<BuildingId>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.buildings.keys().copied().collect())
    }

    async fn save_grade(&self, id: BuildingId, grade: OpportunityGrade) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let opportunity = tables
            .opportunities
            .get_mut(&id)
            .ok_or(StoreError::NotFound)?;
        opportunity.opportunity_score = Some(grade.score());
        opportunity.priority_level = Some(grade.priority());
        Ok(())
    }

    async fn update_opportunity_status(
        &self,
        id: OpportunityId,
        status: OpportunityStatus,
        notes: Option<String>,
    ) -> Result<Option<Opportunity>, StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let Some(opportunity) = tables
            .opportunities
            .values_mut()
            .find(|opportunity| opportunity.id == id)
        else {
            return Ok(None);
        };
        opportunity.status = status;
        if notes.is_some() {
            opportunity.notes = notes;
        }
        Ok(Some(opportunity.clone()))
    }

    async fn opportunity_grades(&self) -> Result<Vec<StoredGrade>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .opportunities
            .values()
            .map(|opportunity| StoredGrade {
                building_id: opportunity.building_id,
                score: opportunity.opportunity_score,
                priority: opportunity.priority_level,
            })
            .collect())
    }

    async fn pipeline_counts(&self) -> Result<PipelineCounts, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let mut borough_distribution = BTreeMap::new();
        for building in tables.buildings.values() {
            *borough_distribution.entry(building.borough).or_insert(0) += 1;
        }
        let open_violations = tables
            .violations
            .iter()
            .filter(|violation| violation.status == ViolationStatus::Open)
            .count() as u64;

        Ok(PipelineCounts {
            total_buildings: tables.buildings.len() as u64,
            total_violations: tables.violations.len() as u64,
            open_violations,
            borough_distribution,
        })
    }

    async fn opportunity_financials(&self) -> Result<Vec<OpportunityFinancials>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .opportunities
            .values()
            .map(|opportunity| OpportunityFinancials {
                building_id: opportunity.building_id,
                score: opportunity.opportunity_score,
                priority: opportunity.priority_level,
                estimated_value: opportunity.estimated_value,
                roi_estimate: opportunity.roi_estimate,
                payback_period_years: opportunity.payback_period_years,
                energy_savings_potential: opportunity.energy_savings_potential,
            })
            .collect())
    }

    async fn monthly_violations(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<MonthlyViolations>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let mut months: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for date in tables
            .violations
            .iter()
            .filter_map(|violation| violation.violation_date)
            .filter(|date| *date >= since)
        {
            *months.entry(month_start(date)).or_insert(0) += 1;
        }
        Ok(months
            .into_iter()
            .map(|(month, count)| MonthlyViolations { month, count })
            .collect())
    }

    async fn violation_activity(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<ViolationActivity>, StoreError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let mut activity: Vec<ViolationActivity> = tables
            .buildings
            .values()
            .filter_map(|building| {
                let recent: Vec<&Violation> = tables
                    .violations
                    .iter()
                    .filter(|violation| violation.building_id == building.id)
                    .filter(|violation| violation.violation_date.is_some_and(|d| d >= since))
                    .collect();
                let latest_violation_date = recent
                    .iter()
                    .filter_map(|violation| violation.violation_date)
                    .max()?;
                let violation_types: BTreeSet<String> = recent
                    .iter()
                    .filter_map(|violation| violation.violation_type.clone())
                    .collect();

                Some(ViolationActivity {
                    building_id: building.id,
                    building_code: building.building_code.clone(),
                    address: building.address.clone(),
                    borough: building.borough,
                    recent_violation_count: recent.len() as u32,
                    latest_violation_date,
                    violation_types: violation_types.into_iter().collect(),
                    opportunity_score: tables
                        .opportunities
                        .get(&building.id)
                        .and_then(|o| o.opportunity_score),
                })
            })
            .collect();
        activity.sort_by(|a, b| {
            b.latest_violation_date
                .cmp(&a.latest_violation_date)
                .then(a.building_id.cmp(&b.building_id))
        });
        Ok(activity)
    }
}
