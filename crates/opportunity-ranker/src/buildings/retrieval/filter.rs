use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::super::domain::{Borough, OpportunityStatus, PriorityLevel};
use super::InvalidQuery;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// Optional building constraints. Absent fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingFilter {
    pub borough: Option<Borough>,
    pub zip_code: Option<String>,
    pub year_built_min: Option<i32>,
    pub year_built_max: Option<i32>,
    pub floors_min: Option<i32>,
    pub floors_max: Option<i32>,
    pub last_inspection_from: Option<NaiveDate>,
    pub last_inspection_to: Option<NaiveDate>,
    pub violation_count_min: Option<u32>,
    pub score_min: Option<u8>,
}

/// Pipeline constraints for the opportunity listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityFilter {
    pub priority: Option<PriorityLevel>,
    pub status: Option<OpportunityStatus>,
    pub score_min: Option<u8>,
}

/// Turns a caller-supplied minimum score into an integer bound. Stored
/// scores are whole numbers, so a fractional minimum rounds up.
pub fn score_threshold(raw: f64) -> Result<u8, InvalidQuery> {
    if !raw.is_finite() || !(0.0..=100.0).contains(&raw) {
        return Err(InvalidQuery::ScoreThreshold(raw));
    }
    Ok(raw.ceil() as u8)
}

/// Whitelisted sort keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Score,
    YearBuilt,
    Floors,
    Violations,
    Address,
    Borough,
    LastInspection,
}

impl SortKey {
    /// Resolves a caller-supplied column name. Anything outside the whitelist
    /// sorts by opportunity score.
    pub fn resolve(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("score") | Some("opportunity_score") => SortKey::Score,
            Some("year_built") => SortKey::YearBuilt,
            Some("floors") => SortKey::Floors,
            Some("violations") => SortKey::Violations,
            Some("address") => SortKey::Address,
            Some("borough") => SortKey::Borough,
            Some("last_inspection") => SortKey::LastInspection,
            _ => SortKey::Score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Ascending only when explicitly requested.
    pub fn resolve(raw: Option<&str>) -> Self {
        match raw {
            Some(value) if value.trim().eq_ignore_ascii_case("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn resolve(sort_by: Option<&str>, sort_order: Option<&str>) -> Self {
        Self {
            key: SortKey::resolve(sort_by),
            order: SortOrder::resolve(sort_order),
        }
    }
}

/// LIMIT/OFFSET pair handed to a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: u32,
    pub offset: u64,
}

/// Validated paging input for a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    limit: u32,
    offset: u64,
    sort: SortSpec,
}

impl PageRequest {
    pub fn new(limit: u32, offset: u64, sort: SortSpec) -> Result<Self, InvalidQuery> {
        if limit == 0 || limit > MAX_LIMIT {
            return Err(InvalidQuery::Limit(limit));
        }
        Ok(Self {
            limit,
            offset,
            sort,
        })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    pub fn window(&self) -> PageWindow {
        PageWindow {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort: SortSpec::default(),
        }
    }
}
