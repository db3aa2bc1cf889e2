//! Ordered, parameterized predicates derived from a [`BuildingFilter`] or an
//! [`OpportunityFilter`].
//!
//! One [`PredicateSet`] feeds both the page query and the count query, so the
//! two always agree on predicate order and parameter positions.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Serialize;

use super::filter::{BuildingFilter, OpportunityFilter};

/// Whether a column is read before or after grouping by building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Row,
    Aggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Column {
    Borough,
    ZipCode,
    YearBuilt,
    Floors,
    LastInspectionDate,
    ViolationCount,
    OpportunityScore,
    PriorityLevel,
    OpportunityStatus,
}

impl Column {
    /// Opportunity columns count as aggregates in the building listing,
    /// which groups the left-joined opportunity by building.
    pub fn scope(self) -> Scope {
        match self {
            Column::ViolationCount
            | Column::OpportunityScore
            | Column::PriorityLevel
            | Column::OpportunityStatus => Scope::Aggregate,
            _ => Scope::Row,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparison {
    Eq,
    Gte,
    Lte,
}

impl Comparison {
    pub fn operator(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gte => ">=",
            Comparison::Lte => "<=",
        }
    }

    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Gte => ordering != Ordering::Less,
            Comparison::Lte => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredicateValue {
    Text(String),
    Int(i64),
    Date(NaiveDate),
}

impl PredicateValue {
    /// Orders two values of the same kind; mixed kinds never compare.
    pub fn compare(&self, other: &PredicateValue) -> Option<Ordering> {
        match (self, other) {
            (PredicateValue::Text(left), PredicateValue::Text(right)) => Some(left.cmp(right)),
            (PredicateValue::Int(left), PredicateValue::Int(right)) => Some(left.cmp(right)),
            (PredicateValue::Date(left), PredicateValue::Date(right)) => Some(left.cmp(right)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub column: Column,
    pub comparison: Comparison,
    pub value: PredicateValue,
}

impl Predicate {
    /// SQL-style evaluation: a missing column value never matches.
    pub fn matches(&self, actual: Option<&PredicateValue>) -> bool {
        actual
            .and_then(|actual| actual.compare(&self.value))
            .map(|ordering| self.comparison.holds(ordering))
            .unwrap_or(false)
    }
}

/// Row-level and aggregate predicates, each combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateSet {
    row: Vec<Predicate>,
    aggregate: Vec<Predicate>,
}

impl PredicateSet {
    pub fn from_filter(filter: &BuildingFilter) -> Self {
        let mut set = Self::default();

        if let Some(borough) = filter.borough {
            set.push(
                Column::Borough,
                Comparison::Eq,
                PredicateValue::Text(borough.label().to_string()),
            );
        }
        if let Some(zip_code) = &filter.zip_code {
            set.push(
                Column::ZipCode,
                Comparison::Eq,
                PredicateValue::Text(zip_code.clone()),
            );
        }
        if let Some(year) = filter.year_built_min {
            set.push(Column::YearBuilt, Comparison::Gte, year.into());
        }
        if let Some(year) = filter.year_built_max {
            set.push(Column::YearBuilt, Comparison::Lte, year.into());
        }
        if let Some(floors) = filter.floors_min {
            set.push(Column::Floors, Comparison::Gte, floors.into());
        }
        if let Some(floors) = filter.floors_max {
            set.push(Column::Floors, Comparison::Lte, floors.into());
        }
        if let Some(date) = filter.last_inspection_from {
            set.push(
                Column::LastInspectionDate,
                Comparison::Gte,
                PredicateValue::Date(date),
            );
        }
        if let Some(date) = filter.last_inspection_to {
            set.push(
                Column::LastInspectionDate,
                Comparison::Lte,
                PredicateValue::Date(date),
            );
        }
        if let Some(count) = filter.violation_count_min {
            set.push(Column::ViolationCount, Comparison::Gte, count.into());
        }
        if let Some(score) = filter.score_min {
            set.push(Column::OpportunityScore, Comparison::Gte, score.into());
        }

        set
    }

    pub fn from_opportunity_filter(filter: &OpportunityFilter) -> Self {
        let mut set = Self::default();

        if let Some(priority) = filter.priority {
            set.push(
                Column::PriorityLevel,
                Comparison::Eq,
                PredicateValue::Text(priority.label().to_string()),
            );
        }
        if let Some(status) = filter.status {
            set.push(
                Column::OpportunityStatus,
                Comparison::Eq,
                PredicateValue::Text(status.label().to_string()),
            );
        }
        if let Some(score) = filter.score_min {
            set.push(Column::OpportunityScore, Comparison::Gte, score.into());
        }

        set
    }

    /// Appends a predicate to the list matching the column's scope.
    pub fn push(&mut self, column: Column, comparison: Comparison, value: PredicateValue) {
        let predicate = Predicate {
            column,
            comparison,
            value,
        };
        match column.scope() {
            Scope::Row => self.row.push(predicate),
            Scope::Aggregate => self.aggregate.push(predicate),
        }
    }

    pub fn row(&self) -> &[Predicate] {
        &self.row
    }

    pub fn aggregate(&self) -> &[Predicate] {
        &self.aggregate
    }

    pub fn is_empty(&self) -> bool {
        self.row.is_empty() && self.aggregate.is_empty()
    }

    /// Parameters in placeholder order: row predicates first, then aggregate.
    pub fn params(&self) -> impl Iterator<Item = &PredicateValue> {
        self.row
            .iter()
            .chain(self.aggregate.iter())
            .map(|predicate| &predicate.value)
    }
}

impl From<i32> for PredicateValue {
    fn from(value: i32) -> Self {
        PredicateValue::Int(i64::from(value))
    }
}

impl From<u32> for PredicateValue {
    fn from(value: u32) -> Self {
        PredicateValue::Int(i64::from(value))
    }
}

impl From<u8> for PredicateValue {
    fn from(value: u8) -> Self {
        PredicateValue::Int(i64::from(value))
    }
}
