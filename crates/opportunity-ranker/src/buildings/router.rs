use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{
    Borough, BuildingId, OpportunityId, OpportunityStatus, PriorityLevel, UnknownVariant,
};
use super::repository::BuildingStore;
use super::rescore::{BatchRescorer, RescoreFailurePolicy, RescoreLatch};
use super::retrieval::filter::DEFAULT_LIMIT;
use super::retrieval::{score_threshold, BuildingFilter, OpportunityFilter, PageRequest, SortSpec};
use super::scoring::{OpportunityScorer, SaleActivitySource};
use super::service::{
    OpportunityError, OpportunityService, DEFAULT_HOT_LIMIT, DEFAULT_RECENT_DAYS,
};
use crate::error::AppError;

/// Everything a request needs to build its own service and rescorer.
pub struct OpportunityContext<S, M> {
    store: Arc<S>,
    sale_activity: Arc<M>,
    scorer: OpportunityScorer,
    latch: RescoreLatch,
    policy: RescoreFailurePolicy,
}

impl<S, M> Clone for OpportunityContext<S, M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            sale_activity: Arc::clone(&self.sale_activity),
            scorer: self.scorer,
            latch: self.latch.clone(),
            policy: self.policy,
        }
    }
}

impl<S, M> OpportunityContext<S, M>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    pub fn new(store: Arc<S>, sale_activity: Arc<M>, scorer: OpportunityScorer) -> Self {
        Self {
            store,
            sale_activity,
            scorer,
            latch: RescoreLatch::default(),
            policy: RescoreFailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: RescoreFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn latch(&self) -> &RescoreLatch {
        &self.latch
    }

    pub fn service(&self) -> OpportunityService<S, M> {
        OpportunityService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.sale_activity),
            self.scorer,
        )
    }

    pub fn rescorer(&self) -> BatchRescorer<S, M> {
        BatchRescorer::new(self.service(), self.latch.clone(), self.policy)
    }
}

/// Router exposing listing, scoring, pipeline, and analytics endpoints.
pub fn opportunity_router<S, M>(context: OpportunityContext<S, M>) -> Router
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    Router::new()
        .route("/api/v1/buildings", get(list_handler::<S, M>))
        .route("/api/v1/buildings/:building_id", get(detail_handler::<S, M>))
        .route(
            "/api/v1/buildings/:building_id/elevators",
            get(elevators_handler::<S, M>),
        )
        .route(
            "/api/v1/buildings/:building_id/violations",
            get(violations_handler::<S, M>),
        )
        .route(
            "/api/v1/buildings/:building_id/recalculate-score",
            post(recalculate_handler::<S, M>),
        )
        .route("/api/v1/opportunities", get(opportunities_handler::<S, M>))
        .route("/api/v1/opportunities/rescore", post(rescore_handler::<S, M>))
        .route(
            "/api/v1/opportunities/:opportunity_id/status",
            patch(status_handler::<S, M>),
        )
        .route(
            "/api/v1/analytics/statistics",
            get(statistics_handler::<S, M>),
        )
        .route(
            "/api/v1/analytics/hot-opportunities",
            get(hot_opportunities_handler::<S, M>),
        )
        .route(
            "/api/v1/analytics/recent-violations",
            get(recent_violations_handler::<S, M>),
        )
        .route(
            "/api/v1/analytics/score-distribution",
            get(score_distribution_handler::<S, M>),
        )
        .route(
            "/api/v1/analytics/roi-analysis",
            get(roi_analysis_handler::<S, M>),
        )
        .with_state(context)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListingQuery {
    #[serde(default)]
    borough: Option<String>,
    #[serde(default)]
    zip_code: Option<String>,
    #[serde(default)]
    year_built_min: Option<i32>,
    #[serde(default)]
    year_built_max: Option<i32>,
    #[serde(default)]
    floors_min: Option<i32>,
    #[serde(default)]
    floors_max: Option<i32>,
    #[serde(default)]
    violation_count_min: Option<u32>,
    #[serde(default)]
    score_min: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    last_inspection_from: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    last_inspection_to: Option<NaiveDate>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u64>,
    #[serde(default)]
    sort_by: Option<String>,
    #[serde(default)]
    sort_order: Option<String>,
}

impl ListingQuery {
    fn into_request(self) -> Result<(BuildingFilter, PageRequest), OpportunityError> {
        let borough = non_empty(self.borough)
            .map(|raw| raw.parse::<Borough>())
            .transpose()
            .map_err(invalid_argument)?;

        let filter = BuildingFilter {
            borough,
            zip_code: non_empty(self.zip_code),
            year_built_min: self.year_built_min,
            year_built_max: self.year_built_max,
            floors_min: self.floors_min,
            floors_max: self.floors_max,
            last_inspection_from: self.last_inspection_from,
            last_inspection_to: self.last_inspection_to,
            violation_count_min: self.violation_count_min,
            score_min: self.score_min.map(score_threshold).transpose()?,
        };
        let sort = SortSpec::resolve(self.sort_by.as_deref(), self.sort_order.as_deref());
        let page = PageRequest::new(
            self.limit.unwrap_or(DEFAULT_LIMIT),
            self.offset.unwrap_or(0),
            sort,
        )?;
        Ok((filter, page))
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OpportunityQuery {
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    min_score: Option<f64>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u64>,
}

impl OpportunityQuery {
    fn into_request(self) -> Result<(OpportunityFilter, PageRequest), OpportunityError> {
        let filter = OpportunityFilter {
            priority: non_empty(self.priority)
                .map(|raw| raw.parse::<PriorityLevel>())
                .transpose()
                .map_err(invalid_argument)?,
            status: non_empty(self.status)
                .map(|raw| raw.parse::<OpportunityStatus>())
                .transpose()
                .map_err(invalid_argument)?,
            score_min: self.min_score.map(score_threshold).transpose()?,
        };
        let page = PageRequest::new(
            self.limit.unwrap_or(DEFAULT_LIMIT),
            self.offset.unwrap_or(0),
            SortSpec::default(),
        )?;
        Ok((filter, page))
    }
}

fn invalid_argument(error: UnknownVariant) -> OpportunityError {
    OpportunityError::InvalidArgument(error.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|raw| !raw.trim().is_empty())
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn deserialize_optional_date<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    non_empty(opt)
        .map(|value| parse_date(&value).map_err(serde::de::Error::custom))
        .transpose()
}

#[derive(Debug, Deserialize)]
pub(crate) struct HotQuery {
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecentQuery {
    #[serde(default)]
    days: Option<u32>,
}

#[derive(Debug, Serialize)]
struct RecentViolations<T> {
    count: usize,
    days_included: u32,
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusUpdate {
    status: String,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Serialize)]
struct Counted<T> {
    count: usize,
    data: Vec<T>,
}

impl<T> From<Vec<T>> for Counted<T> {
    fn from(data: Vec<T>) -> Self {
        Self {
            count: data.len(),
            data,
        }
    }
}

pub(crate) async fn list_handler<S, M>(
    State(context): State<OpportunityContext<S, M>>,
    Query(query): Query<ListingQuery>,
) -> Result<Response, AppError>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    let (filter, page) = query.into_request()?;
    let listing = context.service().list_buildings(&filter, &page).await?;
    Ok(Json(listing).into_response())
}

pub(crate) async fn opportunities_handler<S, M>(
    State(context): State<OpportunityContext<S, M>>,
    Query(query): Query<OpportunityQuery>,
) -> Result<Response, AppError>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    let (filter, page) = query.into_request()?;
    let listing = context.service().list_opportunities(&filter, &page).await?;
    Ok(Json(listing).into_response())
}

pub(crate) async fn detail_handler<S, M>(
    State(context): State<OpportunityContext<S, M>>,
    Path(building_id): Path<i64>,
) -> Result<Response, AppError>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    let detail = context
        .service()
        .get_building(BuildingId(building_id))
        .await?;
    Ok(Json(detail).into_response())
}

pub(crate) async fn elevators_handler<S, M>(
    State(context): State<OpportunityContext<S, M>>,
    Path(building_id): Path<i64>,
) -> Result<Response, AppError>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    let elevators = context
        .service()
        .building_elevators(BuildingId(building_id))
        .await?;
    Ok(Json(Counted::from(elevators)).into_response())
}

pub(crate) async fn violations_handler<S, M>(
    State(context): State<OpportunityContext<S, M>>,
    Path(building_id): Path<i64>,
) -> Result<Response, AppError>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    let violations = context
        .service()
        .building_violations(BuildingId(building_id))
        .await?;
    Ok(Json(Counted::from(violations)).into_response())
}

pub(crate) async fn recalculate_handler<S, M>(
    State(context): State<OpportunityContext<S, M>>,
    Path(building_id): Path<i64>,
) -> Result<Response, AppError>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    let breakdown = context
        .service()
        .recalculate_score(BuildingId(building_id))
        .await?;
    Ok(Json(breakdown).into_response())
}

pub(crate) async fn rescore_handler<S, M>(
    State(context): State<OpportunityContext<S, M>>,
) -> Result<Response, AppError>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    let report = context.rescorer().run().await?;
    Ok(Json(report).into_response())
}

pub(crate) async fn status_handler<S, M>(
    State(context): State<OpportunityContext<S, M>>,
    Path(opportunity_id): Path<i64>,
    Json(update): Json<StatusUpdate>,
) -> Result<Response, AppError>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    let status = update
        .status
        .parse::<OpportunityStatus>()
        .map_err(invalid_argument)?;
    let opportunity = context
        .service()
        .update_opportunity_status(OpportunityId(opportunity_id), status, update.notes)
        .await?;
    Ok(Json(opportunity).into_response())
}

pub(crate) async fn statistics_handler<S, M>(
    State(context): State<OpportunityContext<S, M>>,
) -> Result<Response, AppError>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    let statistics = context.service().statistics().await?;
    Ok(Json(statistics).into_response())
}

pub(crate) async fn hot_opportunities_handler<S, M>(
    State(context): State<OpportunityContext<S, M>>,
    Query(query): Query<HotQuery>,
) -> Result<Response, AppError>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    let limit = query.limit.unwrap_or(DEFAULT_HOT_LIMIT);
    let opportunities = context.service().hot_opportunities(limit).await?;
    Ok(Json(Counted::from(opportunities)).into_response())
}

pub(crate) async fn recent_violations_handler<S, M>(
    State(context): State<OpportunityContext<S, M>>,
    Query(query): Query<RecentQuery>,
) -> Result<Response, AppError>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    let days = query.days.unwrap_or(DEFAULT_RECENT_DAYS);
    let data = context.service().recent_violations(days).await?;
    Ok(Json(RecentViolations {
        count: data.len(),
        days_included: days,
        data,
    })
    .into_response())
}

pub(crate) async fn score_distribution_handler<S, M>(
    State(context): State<OpportunityContext<S, M>>,
) -> Result<Response, AppError>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    let bands = context.service().score_distribution().await?;
    Ok(Json(bands).into_response())
}

pub(crate) async fn roi_analysis_handler<S, M>(
    State(context): State<OpportunityContext<S, M>>,
) -> Result<Response, AppError>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    let tiers = context.service().roi_analysis().await?;
    Ok(Json(tiers).into_response())
}
