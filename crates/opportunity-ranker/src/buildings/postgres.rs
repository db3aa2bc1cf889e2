//! Postgres-backed [`BuildingStore`].
//!
//! Listing SQL comes from [`retrieval::sql`](super::retrieval::sql); the
//! remaining statements are single-table reads, updates, and the analytics
//! aggregates. Serial ids and decimal columns are cast to `int8`/`float8` in
//! the select lists. A page and its total are read inside one
//! `REPEATABLE READ` transaction.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::QueryAs;
use sqlx::{FromRow, Postgres, Transaction};
use tracing::{debug, info};

use super::domain::{
    Borough, Building, BuildingDetail, BuildingId, BuildingSummary, Elevator, Opportunity,
    OpportunityId, OpportunityListing, OpportunityStatus, PriorityLevel, UnknownVariant,
    Violation, ViolationActivity,
};
use super::repository::{
    BuildingStore, MonthlyViolations, OpportunityFinancials, PipelineCounts, StoreError,
    StoredGrade,
};
use super::retrieval::sql::{self, SqlStatement};
use super::retrieval::{PageWindow, PredicateSet, PredicateValue, SortSpec};
use super::scoring::{OpportunityGrade, ScoringFacts};

const SCHEMA: [&str; 7] = [
    "CREATE TABLE IF NOT EXISTS buildings (
        id SERIAL PRIMARY KEY,
        building_id VARCHAR(50) UNIQUE NOT NULL,
        address VARCHAR(255) NOT NULL,
        borough VARCHAR(50) NOT NULL,
        zip_code VARCHAR(10),
        year_built INTEGER,
        floors INTEGER,
        units INTEGER,
        owner_name VARCHAR(255),
        owner_contact VARCHAR(255),
        property_manager VARCHAR(255),
        last_inspection_date DATE,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS elevators (
        id SERIAL PRIMARY KEY,
        building_id INTEGER REFERENCES buildings(id) ON DELETE CASCADE,
        elevator_id VARCHAR(50) UNIQUE NOT NULL,
        device_number VARCHAR(50),
        type VARCHAR(50),
        manufacturer VARCHAR(100),
        year_installed INTEGER,
        capacity INTEGER,
        floors_served INTEGER,
        last_inspection_date DATE,
        inspection_status VARCHAR(50),
        modernization_year INTEGER,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS violations (
        id SERIAL PRIMARY KEY,
        building_id INTEGER REFERENCES buildings(id) ON DELETE CASCADE,
        violation_id VARCHAR(50) UNIQUE NOT NULL,
        violation_date DATE,
        violation_type VARCHAR(100),
        description TEXT,
        severity VARCHAR(50),
        status VARCHAR(50),
        resolution_date DATE,
        fine_amount DECIMAL(10, 2),
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS opportunities (
        id SERIAL PRIMARY KEY,
        building_id INTEGER UNIQUE REFERENCES buildings(id) ON DELETE CASCADE,
        opportunity_score DECIMAL(5, 2),
        priority_level VARCHAR(20),
        estimated_value DECIMAL(12, 2),
        roi_estimate DECIMAL(5, 2),
        payback_period_years DECIMAL(4, 2),
        energy_savings_potential DECIMAL(5, 2),
        status VARCHAR(50) DEFAULT 'identified',
        notes TEXT,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE INDEX IF NOT EXISTS idx_buildings_borough ON buildings(borough)",
    "CREATE INDEX IF NOT EXISTS idx_violations_building_id ON violations(building_id)",
    "CREATE INDEX IF NOT EXISTS idx_opportunities_score ON opportunities(opportunity_score DESC)",
];

const ELEVATOR_COLUMNS: &str = "id::int8 AS id, building_id::int8 AS building_id, \
     elevator_id AS elevator_code, device_number, type AS elevator_type, manufacturer, \
     year_installed, capacity, floors_served, last_inspection_date, inspection_status, \
     modernization_year";

const VIOLATION_COLUMNS: &str = "id::int8 AS id, building_id::int8 AS building_id, \
     violation_id AS violation_code, violation_date, violation_type, description, severity, \
     status, resolution_date, fine_amount::float8 AS fine_amount";

const OPPORTUNITY_COLUMNS: &str = "id::int8 AS id, building_id::int8 AS building_id, \
     opportunity_score::int4 AS opportunity_score, priority_level, \
     estimated_value::float8 AS estimated_value, roi_estimate::float8 AS roi_estimate, \
     payback_period_years::float8 AS payback_period_years, \
     energy_savings_potential::float8 AS energy_savings_potential, status, notes";

const SNAPSHOT_ISOLATION: &str = "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY";

pub struct PgBuildingStore {
    pool: PgPool,
}

impl PgBuildingStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|error| StoreError::Unavailable(error.to_string()))?;
        info!(max_connections, "connected to postgres");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the four tables and their indexes when missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("schema verified");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Read-only transaction whose statements all see the same snapshot.
    async fn snapshot(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(SNAPSHOT_ISOLATION).execute(&mut *tx).await?;
        Ok(tx)
    }
}

fn bind_params<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    params: &[PredicateValue],
) -> QueryAs<'q, Postgres, O, PgArguments> {
    for value in params {
        query = match value {
            PredicateValue::Text(text) => query.bind(text.clone()),
            PredicateValue::Int(number) => query.bind(*number),
            PredicateValue::Date(date) => query.bind(*date),
        };
    }
    query
}

fn decode<T>(raw: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = UnknownVariant>,
{
    raw.parse()
        .map_err(|error: UnknownVariant| StoreError::Decode(error.to_string()))
}

fn decode_optional<T>(raw: Option<&str>) -> Result<Option<T>, StoreError>
where
    T: FromStr<Err = UnknownVariant>,
{
    raw.map(decode).transpose()
}

fn decode_score(raw: Option<i32>) -> Result<Option<u8>, StoreError> {
    raw.map(|score| {
        u8::try_from(score)
            .ok()
            .filter(|score| *score <= 100)
            .ok_or_else(|| StoreError::Decode(format!("opportunity score {score} out of range")))
    })
    .transpose()
}

fn count(raw: i64) -> u32 {
    u32::try_from(raw).unwrap_or(u32::MAX)
}

#[derive(FromRow)]
struct SummaryRow {
    id: i64,
    building_code: String,
    address: String,
    borough: String,
    zip_code: Option<String>,
    year_built: Option<i32>,
    floors: Option<i32>,
    units: Option<i32>,
    owner_name: Option<String>,
    owner_contact: Option<String>,
    property_manager: Option<String>,
    last_inspection_date: Option<NaiveDate>,
    elevator_count: i64,
    total_violations: i64,
    open_violations: i64,
    opportunity_score: Option<i32>,
    priority_level: Option<String>,
    estimated_value: Option<f64>,
}

impl SummaryRow {
    fn into_summary(self) -> Result<BuildingSummary, StoreError> {
        Ok(BuildingSummary {
            building: Building {
                id: BuildingId(self.id),
                building_code: self.building_code,
                address: self.address,
                borough: decode(&self.borough)?,
                zip_code: self.zip_code,
                year_built: self.year_built,
                floors: self.floors,
                units: self.units,
                owner_name: self.owner_name,
                owner_contact: self.owner_contact,
                property_manager: self.property_manager,
                last_inspection_date: self.last_inspection_date,
            },
            elevator_count: count(self.elevator_count),
            violation_count: count(self.total_violations),
            open_violation_count: count(self.open_violations),
            opportunity_score: decode_score(self.opportunity_score)?,
            priority_level: decode_optional(self.priority_level.as_deref())?,
            estimated_value: self.estimated_value,
        })
    }
}

#[derive(FromRow)]
struct DetailRow {
    #[sqlx(flatten)]
    summary: SummaryRow,
    opportunity_id: Option<i64>,
    roi_estimate: Option<f64>,
    payback_period_years: Option<f64>,
    energy_savings_potential: Option<f64>,
    opportunity_status: Option<String>,
    notes: Option<String>,
}

impl DetailRow {
    fn into_detail(self) -> Result<BuildingDetail, StoreError> {
        Ok(BuildingDetail {
            summary: self.summary.into_summary()?,
            opportunity_id: self.opportunity_id.map(OpportunityId),
            roi_estimate: self.roi_estimate,
            payback_period_years: self.payback_period_years,
            energy_savings_potential: self.energy_savings_potential,
            opportunity_status: decode_optional(self.opportunity_status.as_deref())?,
            notes: self.notes,
        })
    }
}

#[derive(FromRow)]
struct ElevatorRow {
    id: i64,
    building_id: i64,
    elevator_code: String,
    device_number: Option<String>,
    elevator_type: Option<String>,
    manufacturer: Option<String>,
    year_installed: Option<i32>,
    capacity: Option<i32>,
    floors_served: Option<i32>,
    last_inspection_date: Option<NaiveDate>,
    inspection_status: Option<String>,
    modernization_year: Option<i32>,
}

impl From<ElevatorRow> for Elevator {
    fn from(row: ElevatorRow) -> Self {
        Elevator {
            id: row.id,
            building_id: BuildingId(row.building_id),
            elevator_code: row.elevator_code,
            device_number: row.device_number,
            elevator_type: row.elevator_type,
            manufacturer: row.manufacturer,
            year_installed: row.year_installed,
            capacity: row.capacity,
            floors_served: row.floors_served,
            last_inspection_date: row.last_inspection_date,
            inspection_status: row.inspection_status,
            modernization_year: row.modernization_year,
        }
    }
}

#[derive(FromRow)]
struct ViolationRow {
    id: i64,
    building_id: i64,
    violation_code: String,
    violation_date: Option<NaiveDate>,
    violation_type: Option<String>,
    description: Option<String>,
    severity: Option<String>,
    status: Option<String>,
    resolution_date: Option<NaiveDate>,
    fine_amount: Option<f64>,
}

impl ViolationRow {
    fn into_violation(self) -> Result<Violation, StoreError> {
        let severity = self.severity.as_deref().ok_or_else(|| {
            StoreError::Decode(format!("violation {} has no severity", self.violation_code))
        })?;
        let status = self.status.as_deref().ok_or_else(|| {
            StoreError::Decode(format!("violation {} has no status", self.violation_code))
        })?;
        Ok(Violation {
            severity: decode(severity)?,
            status: decode(status)?,
            id: self.id,
            building_id: BuildingId(self.building_id),
            violation_code: self.violation_code,
            violation_date: self.violation_date,
            violation_type: self.violation_type,
            description: self.description,
            resolution_date: self.resolution_date,
            fine_amount: self.fine_amount,
        })
    }
}

#[derive(FromRow)]
struct OpportunityRow {
    id: i64,
    building_id: i64,
    opportunity_score: Option<i32>,
    priority_level: Option<String>,
    estimated_value: Option<f64>,
    roi_estimate: Option<f64>,
    payback_period_years: Option<f64>,
    energy_savings_potential: Option<f64>,
    status: Option<String>,
    notes: Option<String>,
}

impl OpportunityRow {
    fn into_opportunity(self) -> Result<Opportunity, StoreError> {
        Ok(Opportunity {
            id: OpportunityId(self.id),
            building_id: BuildingId(self.building_id),
            opportunity_score: decode_score(self.opportunity_score)?,
            priority_level: decode_optional(self.priority_level.as_deref())?,
            estimated_value: self.estimated_value,
            roi_estimate: self.roi_estimate,
            payback_period_years: self.payback_period_years,
            energy_savings_potential: self.energy_savings_potential,
            status: decode_optional(self.status.as_deref())?.unwrap_or_default(),
            notes: self.notes,
        })
    }
}

#[derive(FromRow)]
struct ListingRow {
    #[sqlx(flatten)]
    opportunity: OpportunityRow,
    building_code: String,
    address: String,
    borough: String,
    year_built: Option<i32>,
    floors: Option<i32>,
    owner_name: Option<String>,
}

impl ListingRow {
    fn into_listing(self) -> Result<OpportunityListing, StoreError> {
        Ok(OpportunityListing {
            borough: decode(&self.borough)?,
            opportunity: self.opportunity.into_opportunity()?,
            building_code: self.building_code,
            address: self.address,
            year_built: self.year_built,
            floors: self.floors,
            owner_name: self.owner_name,
        })
    }
}

#[derive(FromRow)]
struct FinancialsRow {
    building_id: i64,
    opportunity_score: Option<i32>,
    priority_level: Option<String>,
    estimated_value: Option<f64>,
    roi_estimate: Option<f64>,
    payback_period_years: Option<f64>,
    energy_savings_potential: Option<f64>,
}

#[derive(FromRow)]
struct ActivityRow {
    building_id: i64,
    building_code: String,
    address: String,
    borough: String,
    recent_violation_count: i64,
    latest_violation_date: NaiveDate,
    violation_types: Option<Vec<String>>,
    opportunity_score: Option<i32>,
}

impl ActivityRow {
    fn into_activity(self) -> Result<ViolationActivity, StoreError> {
        Ok(ViolationActivity {
            building_id: BuildingId(self.building_id),
            borough: decode(&self.borough)?,
            building_code: self.building_code,
            address: self.address,
            recent_violation_count: count(self.recent_violation_count),
            latest_violation_date: self.latest_violation_date,
            violation_types: self.violation_types.unwrap_or_default(),
            opportunity_score: decode_score(self.opportunity_score)?,
        })
    }
}

#[derive(FromRow)]
struct FactsRow {
    borough: String,
    year_built: Option<i32>,
    floors: Option<i32>,
    open_violations: i64,
    oldest_modernization_year: Option<i32>,
    average_install_year: Option<f64>,
}

#[derive(FromRow)]
struct GradeRow {
    building_id: i64,
    opportunity_score: Option<i32>,
    priority_level: Option<String>,
}

#[derive(FromRow)]
struct CountsRow {
    total_buildings: i64,
    total_violations: i64,
    open_violations: i64,
}

#[async_trait]
impl BuildingStore for PgBuildingStore {
    async fn find_page(
        &self,
        predicates: &PredicateSet,
        sort: SortSpec,
        window: PageWindow,
    ) -> Result<Vec<BuildingSummary>, StoreError> {
        let SqlStatement { text, params } = sql::page_query(predicates, sort, window);
        let rows = bind_params(sqlx::query_as::<_, SummaryRow>(&text), &params)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    async fn count_matching(&self, predicates: &PredicateSet) -> Result<u64, StoreError> {
        let SqlStatement { text, params } = sql::count_query(predicates);
        let (total,) = bind_params(sqlx::query_as::<_, (i64,)>(&text), &params)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    async fn find_page_with_count(
        &self,
        predicates: &PredicateSet,
        sort: SortSpec,
        window: PageWindow,
    ) -> Result<(Vec<BuildingSummary>, u64), StoreError> {
        let page = sql::page_query(predicates, sort, window);
        let count_statement = sql::count_query(predicates);

        let mut tx = self.snapshot().await?;
        let rows = bind_params(sqlx::query_as::<_, SummaryRow>(&page.text), &page.params)
            .fetch_all(&mut *tx)
            .await?;
        let (total,) = bind_params(
            sqlx::query_as::<_, (i64,)>(&count_statement.text),
            &count_statement.params,
        )
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let rows = rows
            .into_iter()
            .map(SummaryRow::into_summary)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((rows, u64::try_from(total).unwrap_or_default()))
    }

    async fn find_opportunities(
        &self,
        predicates: &PredicateSet,
        window: PageWindow,
    ) -> Result<Vec<OpportunityListing>, StoreError> {
        let SqlStatement { text, params } = sql::opportunity_page_query(predicates, window);
        let rows = bind_params(sqlx::query_as::<_, ListingRow>(&text), &params)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ListingRow::into_listing).collect()
    }

    async fn count_opportunities(&self, predicates: &PredicateSet) -> Result<u64, StoreError> {
        let SqlStatement { text, params } = sql::opportunity_count_query(predicates);
        let (total,) = bind_params(sqlx::query_as::<_, (i64,)>(&text), &params)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    async fn find_opportunities_with_count(
        &self,
        predicates: &PredicateSet,
        window: PageWindow,
    ) -> Result<(Vec<OpportunityListing>, u64), StoreError> {
        let page = sql::opportunity_page_query(predicates, window);
        let count_statement = sql::opportunity_count_query(predicates);

        let mut tx = self.snapshot().await?;
        let rows = bind_params(sqlx::query_as::<_, ListingRow>(&page.text), &page.params)
            .fetch_all(&mut *tx)
            .await?;
        let (total,) = bind_params(
            sqlx::query_as::<_, (i64,)>(&count_statement.text),
            &count_statement.params,
        )
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let rows = rows
            .into_iter()
            .map(ListingRow::into_listing)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((rows, u64::try_from(total).unwrap_or_default()))
    }

    async fn find_building(&self, id: BuildingId) -> Result<Option<BuildingDetail>, StoreError> {
        let SqlStatement { text, params } = sql::detail_query(id.0);
        let row = bind_params(sqlx::query_as::<_, DetailRow>(&text), &params)
            .fetch_optional(&self.pool)
            .await?;
        row.map(DetailRow::into_detail).transpose()
    }

    async fn elevators(&self, id: BuildingId) -> Result<Vec<Elevator>, StoreError> {
        let text = format!(
            "SELECT {ELEVATOR_COLUMNS} FROM elevators WHERE building_id = $1 ORDER BY elevator_id"
        );
        let rows = sqlx::query_as::<_, ElevatorRow>(&text)
            .bind(id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Elevator::from).collect())
    }

    async fn violations(&self, id: BuildingId) -> Result<Vec<Violation>, StoreError> {
        let text = format!(
            "SELECT {VIOLATION_COLUMNS} FROM violations WHERE building_id = $1 \
             ORDER BY violation_date DESC NULLS LAST, id ASC"
        );
        let rows = sqlx::query_as::<_, ViolationRow>(&text)
            .bind(id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ViolationRow::into_violation).collect()
    }

    async fn scoring_facts(&self, id: BuildingId) -> Result<Option<ScoringFacts>, StoreError> {
        let row = sqlx::query_as::<_, FactsRow>(
            "SELECT b.borough, b.year_built, b.floors, \
                 (SELECT COUNT(*) FROM violations v \
                     WHERE v.building_id = b.id AND v.status = 'Open') AS open_violations, \
                 (SELECT MIN(e.modernization_year) FROM elevators e \
                     WHERE e.building_id = b.id) AS oldest_modernization_year, \
                 (SELECT AVG(e.year_installed)::float8 FROM elevators e \
                     WHERE e.building_id = b.id) AS average_install_year \
             FROM buildings b WHERE b.id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(ScoringFacts {
                building_id: id,
                borough: decode::<Borough>(&row.borough)?,
                year_built: row.year_built,
                floors: row.floors,
                open_violations: count(row.open_violations),
                oldest_modernization_year: row.oldest_modernization_year,
                average_install_year: row.average_install_year,
            })
        })
        .transpose()
    }

    async fn building_ids(&self) -> Result<Vec<BuildingId>, StoreError> {
        let ids: Vec<(i64,)> = sqlx::query_as("SELECT id::int8 FROM buildings ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| BuildingId(id)).collect())
    }

    async fn save_grade(&self, id: BuildingId, grade: OpportunityGrade) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE opportunities \
             SET opportunity_score = $1, priority_level = $2, updated_at = CURRENT_TIMESTAMP \
             WHERE building_id = $3",
        )
        .bind(i32::from(grade.score()))
        .bind(grade.priority().label())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_opportunity_status(
        &self,
        id: OpportunityId,
        status: OpportunityStatus,
        notes: Option<String>,
    ) -> Result<Option<Opportunity>, StoreError> {
        let text = format!(
            "UPDATE opportunities \
             SET status = $1, notes = COALESCE($2, notes), updated_at = CURRENT_TIMESTAMP \
             WHERE id = $3 RETURNING {OPPORTUNITY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OpportunityRow>(&text)
            .bind(status.label())
            .bind(notes)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(OpportunityRow::into_opportunity).transpose()
    }

    async fn opportunity_grades(&self) -> Result<Vec<StoredGrade>, StoreError> {
        let rows = sqlx::query_as::<_, GradeRow>(
            "SELECT building_id::int8 AS building_id, \
                 opportunity_score::int4 AS opportunity_score, priority_level \
             FROM opportunities WHERE building_id IS NOT NULL ORDER BY building_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(StoredGrade {
                    building_id: BuildingId(row.building_id),
                    score: decode_score(row.opportunity_score)?,
                    priority: decode_optional::<PriorityLevel>(row.priority_level.as_deref())?,
                })
            })
            .collect()
    }

    async fn pipeline_counts(&self) -> Result<PipelineCounts, StoreError> {
        let totals = sqlx::query_as::<_, CountsRow>(
            "SELECT \
                 (SELECT COUNT(*) FROM buildings) AS total_buildings, \
                 (SELECT COUNT(*) FROM violations) AS total_violations, \
                 (SELECT COUNT(*) FROM violations WHERE status = 'Open') AS open_violations",
        )
        .fetch_one(&self.pool)
        .await?;

        let boroughs: Vec<(String, i64)> =
            sqlx::query_as("SELECT borough, COUNT(*) FROM buildings GROUP BY borough")
                .fetch_all(&self.pool)
                .await?;
        let mut borough_distribution = BTreeMap::new();
        for (borough, total) in boroughs {
            let borough = decode::<Borough>(&borough)?;
            *borough_distribution.entry(borough).or_insert(0) +=
                u64::try_from(total).unwrap_or_default();
        }

        Ok(PipelineCounts {
            total_buildings: u64::try_from(totals.total_buildings).unwrap_or_default(),
            total_violations: u64::try_from(totals.total_violations).unwrap_or_default(),
            open_violations: u64::try_from(totals.open_violations).unwrap_or_default(),
            borough_distribution,
        })
    }

    async fn opportunity_financials(&self) -> Result<Vec<OpportunityFinancials>, StoreError> {
        let rows = sqlx::query_as::<_, FinancialsRow>(
            "SELECT building_id::int8 AS building_id, \
                 opportunity_score::int4 AS opportunity_score, priority_level, \
                 estimated_value::float8 AS estimated_value, \
                 roi_estimate::float8 AS roi_estimate, \
                 payback_period_years::float8 AS payback_period_years, \
                 energy_savings_potential::float8 AS energy_savings_potential \
             FROM opportunities WHERE building_id IS NOT NULL ORDER BY building_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OpportunityFinancials {
                    building_id: BuildingId(row.building_id),
                    score: decode_score(row.opportunity_score)?,
                    priority: decode_optional::<PriorityLevel>(row.priority_level.as_deref())?,
                    estimated_value: row.estimated_value,
                    roi_estimate: row.roi_estimate,
                    payback_period_years: row.payback_period_years,
                    energy_savings_potential: row.energy_savings_potential,
                })
            })
            .collect()
    }

    async fn monthly_violations(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<MonthlyViolations>, StoreError> {
        let rows: Vec<(NaiveDate, i64)> = sqlx::query_as(
            "SELECT DATE_TRUNC('month', violation_date)::date AS month, COUNT(*) \
             FROM violations WHERE violation_date >= $1 \
             GROUP BY 1 ORDER BY 1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(month, total)| MonthlyViolations {
                month,
                count: u64::try_from(total).unwrap_or_default(),
            })
            .collect())
    }

    async fn violation_activity(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<ViolationActivity>, StoreError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT b.id::int8 AS building_id, b.building_id AS building_code, b.address, \
                 b.borough, COUNT(DISTINCT v.id) AS recent_violation_count, \
                 MAX(v.violation_date) AS latest_violation_date, \
                 ARRAY_AGG(DISTINCT v.violation_type ORDER BY v.violation_type) \
                     FILTER (WHERE v.violation_type IS NOT NULL) AS violation_types, \
                 MAX(o.opportunity_score)::int4 AS opportunity_score \
             FROM buildings b \
             JOIN violations v ON b.id = v.building_id \
             LEFT JOIN opportunities o ON b.id = o.building_id \
             WHERE v.violation_date >= $1 \
             GROUP BY b.id \
             ORDER BY latest_violation_date DESC, b.id ASC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActivityRow::into_activity).collect()
    }
}
