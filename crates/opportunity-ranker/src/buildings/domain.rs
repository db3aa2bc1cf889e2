use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Internal building identifier (`buildings.id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildingId(pub i64);

impl fmt::Display for BuildingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the opportunity record attached to a building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpportunityId(pub i64);

impl fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The five NYC boroughs buildings are filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Borough {
    Manhattan,
    Brooklyn,
    Queens,
    Bronx,
    #[serde(rename = "Staten Island")]
    StatenIsland,
}

impl Borough {
    pub const ALL: [Borough; 5] = [
        Borough::Manhattan,
        Borough::Brooklyn,
        Borough::Queens,
        Borough::Bronx,
        Borough::StatenIsland,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Borough::Manhattan => "Manhattan",
            Borough::Brooklyn => "Brooklyn",
            Borough::Queens => "Queens",
            Borough::Bronx => "Bronx",
            Borough::StatenIsland => "Staten Island",
        }
    }
}

impl fmt::Display for Borough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Borough {
    type Err = UnknownVariant;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        Borough::ALL
            .into_iter()
            .find(|borough| borough.label().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| UnknownVariant::new("borough", raw))
    }
}

/// Raised when stored or submitted text does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Building record as ingested from city filings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub id: BuildingId,
    /// External building code (BIN) from the source dataset.
    pub building_code: String,
    pub address: String,
    pub borough: Borough,
    pub zip_code: Option<String>,
    pub year_built: Option<i32>,
    pub floors: Option<i32>,
    pub units: Option<i32>,
    pub owner_name: Option<String>,
    pub owner_contact: Option<String>,
    pub property_manager: Option<String>,
    pub last_inspection_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elevator {
    pub id: i64,
    pub building_id: BuildingId,
    pub elevator_code: String,
    pub device_number: Option<String>,
    pub elevator_type: Option<String>,
    pub manufacturer: Option<String>,
    pub year_installed: Option<i32>,
    pub capacity: Option<i32>,
    pub floors_served: Option<i32>,
    pub last_inspection_date: Option<NaiveDate>,
    pub inspection_status: Option<String>,
    pub modernization_year: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl ViolationSeverity {
    pub fn label(self) -> &'static str {
        match self {
            ViolationSeverity::Critical => "Critical",
            ViolationSeverity::High => "High",
            ViolationSeverity::Medium => "Medium",
            ViolationSeverity::Low => "Low",
        }
    }
}

impl FromStr for ViolationSeverity {
    type Err = UnknownVariant;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(UnknownVariant::new("violation severity", raw)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationStatus {
    Open,
    Resolved,
}

impl ViolationStatus {
    pub fn label(self) -> &'static str {
        match self {
            ViolationStatus::Open => "Open",
            ViolationStatus::Resolved => "Resolved",
        }
    }
}

impl FromStr for ViolationStatus {
    type Err = UnknownVariant;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "resolved" | "closed" => Ok(Self::Resolved),
            _ => Err(UnknownVariant::new("violation status", raw)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: i64,
    pub building_id: BuildingId,
    pub violation_code: String,
    pub violation_date: Option<NaiveDate>,
    pub violation_type: Option<String>,
    pub description: Option<String>,
    pub severity: ViolationSeverity,
    pub status: ViolationStatus,
    pub resolution_date: Option<NaiveDate>,
    pub fine_amount: Option<f64>,
}

/// Ordered priority tier derived from the opportunity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityLevel {
    pub fn label(self) -> &'static str {
        match self {
            PriorityLevel::Low => "Low",
            PriorityLevel::Medium => "Medium",
            PriorityLevel::High => "High",
            PriorityLevel::Critical => "Critical",
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PriorityLevel {
    type Err = UnknownVariant;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(UnknownVariant::new("priority level", raw)),
        }
    }
}

/// Sales pipeline stage of an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    #[default]
    Identified,
    Contacted,
    ProposalSent,
    Negotiating,
    Won,
    Lost,
}

impl OpportunityStatus {
    pub fn label(self) -> &'static str {
        match self {
            OpportunityStatus::Identified => "identified",
            OpportunityStatus::Contacted => "contacted",
            OpportunityStatus::ProposalSent => "proposal_sent",
            OpportunityStatus::Negotiating => "negotiating",
            OpportunityStatus::Won => "won",
            OpportunityStatus::Lost => "lost",
        }
    }
}

impl FromStr for OpportunityStatus {
    type Err = UnknownVariant;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "identified" => Ok(Self::Identified),
            "contacted" => Ok(Self::Contacted),
            "proposal_sent" => Ok(Self::ProposalSent),
            "negotiating" => Ok(Self::Negotiating),
            "won" => Ok(Self::Won),
            "lost" => Ok(Self::Lost),
            _ => Err(UnknownVariant::new("opportunity status", raw)),
        }
    }
}

/// The single live opportunity record attached to a building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub building_id: BuildingId,
    pub opportunity_score: Option<u8>,
    pub priority_level: Option<PriorityLevel>,
    pub estimated_value: Option<f64>,
    pub roi_estimate: Option<f64>,
    pub payback_period_years: Option<f64>,
    pub energy_savings_potential: Option<f64>,
    pub status: OpportunityStatus,
    pub notes: Option<String>,
}

/// Building row enriched with read-time aggregates, as returned by listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingSummary {
    #[serde(flatten)]
    pub building: Building,
    pub elevator_count: u32,
    pub violation_count: u32,
    pub open_violation_count: u32,
    pub opportunity_score: Option<u8>,
    pub priority_level: Option<PriorityLevel>,
    pub estimated_value: Option<f64>,
}

/// Single-building view with the financial side of the opportunity record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingDetail {
    #[serde(flatten)]
    pub summary: BuildingSummary,
    pub opportunity_id: Option<OpportunityId>,
    pub roi_estimate: Option<f64>,
    pub payback_period_years: Option<f64>,
    pub energy_savings_potential: Option<f64>,
    pub opportunity_status: Option<OpportunityStatus>,
    pub notes: Option<String>,
}

/// Pipeline row: an opportunity with the building fields a sales list needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunityListing {
    #[serde(flatten)]
    pub opportunity: Opportunity,
    pub building_code: String,
    pub address: String,
    pub borough: Borough,
    pub year_built: Option<i32>,
    pub floors: Option<i32>,
    pub owner_name: Option<String>,
}

/// Violations a building received since a cutoff date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationActivity {
    pub building_id: BuildingId,
    pub building_code: String,
    pub address: String,
    pub borough: Borough,
    pub recent_violation_count: u32,
    pub latest_violation_date: NaiveDate,
    /// Distinct violation types, sorted.
    pub violation_types: Vec<String>,
    pub opportunity_score: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borough_parses_labels_and_slugs() {
        assert_eq!("Manhattan".parse::<Borough>(), Ok(Borough::Manhattan));
        assert_eq!(" brooklyn ".parse::<Borough>(), Ok(Borough::Brooklyn));
        assert_eq!("staten_island".parse::<Borough>(), Ok(Borough::StatenIsland));
        assert_eq!("Staten Island".parse::<Borough>(), Ok(Borough::StatenIsland));
        assert!("Jersey City".parse::<Borough>().is_err());
    }

    #[test]
    fn priority_levels_are_ordered() {
        assert!(PriorityLevel::Critical > PriorityLevel::High);
        assert!(PriorityLevel::High > PriorityLevel::Medium);
        assert!(PriorityLevel::Medium > PriorityLevel::Low);
    }

    #[test]
    fn opportunity_status_round_trips_labels() {
        for status in [
            OpportunityStatus::Identified,
            OpportunityStatus::Contacted,
            OpportunityStatus::ProposalSent,
            OpportunityStatus::Negotiating,
            OpportunityStatus::Won,
            OpportunityStatus::Lost,
        ] {
            assert_eq!(status.label().parse::<OpportunityStatus>(), Ok(status));
        }
        assert!("archived".parse::<OpportunityStatus>().is_err());
    }
}
