//! Weighted modernization opportunity scoring.

pub mod factors;
pub mod priority;
pub mod sale_activity;

pub use priority::{classify, OpportunityGrade};
pub use sale_activity::{FixedSaleActivity, SaleActivitySource, SeededSaleActivity};

use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};

use super::domain::{Borough, BuildingId};

/// Factor weights in the order recency, violations, age ratio, sale activity,
/// upgrade potential. They sum to exactly 1.00.
pub const FACTOR_WEIGHTS: [f64; 5] = [0.30, 0.25, 0.20, 0.15, 0.10];

/// Building-scoped inputs gathered from the building, elevator, and violation
/// tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringFacts {
    pub building_id: BuildingId,
    pub borough: Borough,
    pub year_built: Option<i32>,
    pub floors: Option<i32>,
    pub open_violations: u32,
    pub oldest_modernization_year: Option<i32>,
    pub average_install_year: Option<f64>,
}

/// Coarse building tier reported alongside the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildingClass {
    A,
    B,
    C,
}

impl BuildingClass {
    pub fn classify(borough: Borough, floors: Option<i32>) -> Self {
        let floors = floors.unwrap_or(0);
        let manhattan = borough == Borough::Manhattan;
        if floors > 50 && manhattan {
            BuildingClass::A
        } else if floors > 30 || manhattan {
            BuildingClass::B
        } else {
            BuildingClass::C
        }
    }
}

/// Raw inputs behind the sub-scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub years_since_modernization: i32,
    pub violation_count: u32,
    pub building_age: i32,
    pub elevator_age: i32,
    pub recent_sale: bool,
    pub building_class: BuildingClass,
}

/// Explainable result of scoring one building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub total_score: u8,
    pub age_score: f64,
    pub violation_score: f64,
    pub elevator_age_score: f64,
    pub sale_activity_score: f64,
    pub upgrade_potential_score: f64,
    pub factors: ScoreFactors,
}

impl ScoreBreakdown {
    pub fn grade(&self) -> OpportunityGrade {
        OpportunityGrade::from_score(self.total_score)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("building {0} has no year_built on record")]
    MissingYearBuilt(BuildingId),
}

/// Stateless aggregator applying the fixed factor weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpportunityScorer {
    reference_year: i32,
}

impl OpportunityScorer {
    /// Scorer measuring ages against `reference_year`.
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    /// Scorer measuring ages against the current calendar year.
    pub fn current() -> Self {
        Self::new(Local::now().year())
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    pub fn score(
        &self,
        facts: &ScoringFacts,
        recent_sale: bool,
    ) -> Result<ScoreBreakdown, ScoringError> {
        let year_built = facts
            .year_built
            .ok_or(ScoringError::MissingYearBuilt(facts.building_id))?;

        let last_modernization = facts.oldest_modernization_year.unwrap_or(year_built);
        let years_since_modernization = self.reference_year - last_modernization;
        let building_age = self.reference_year - year_built;
        let elevator_age = facts
            .average_install_year
            .map(|year| self.reference_year - year.floor() as i32)
            .unwrap_or(building_age);

        let sub_scores = [
            factors::modernization_recency(years_since_modernization),
            factors::violation_load(facts.open_violations),
            factors::age_ratio(elevator_age, building_age),
            factors::sale_activity(recent_sale),
            factors::upgrade_potential(facts.borough, facts.floors, building_age),
        ];

        let weighted: f64 = sub_scores
            .iter()
            .zip(FACTOR_WEIGHTS.iter())
            .map(|(score, weight)| score * weight)
            .sum();
        let total_score = weighted.round().clamp(0.0, 100.0) as u8;

        Ok(ScoreBreakdown {
            total_score,
            age_score: sub_scores[0],
            violation_score: sub_scores[1],
            elevator_age_score: sub_scores[2],
            sale_activity_score: sub_scores[3],
            upgrade_potential_score: sub_scores[4],
            factors: ScoreFactors {
                years_since_modernization,
                violation_count: facts.open_violations,
                building_age,
                elevator_age,
                recent_sale,
                building_class: BuildingClass::classify(facts.borough, facts.floors),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::domain::PriorityLevel;
    use super::*;

    fn landmark_tower() -> ScoringFacts {
        ScoringFacts {
            building_id: BuildingId(1),
            borough: Borough::Manhattan,
            year_built: Some(1931),
            floors: Some(102),
            open_violations: 0,
            oldest_modernization_year: None,
            average_install_year: None,
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let total: f64 = FACTOR_WEIGHTS.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unmodernized_manhattan_tower_scores_medium() {
        let breakdown = OpportunityScorer::new(2025)
            .score(&landmark_tower(), false)
            .expect("tower scores");

        assert_eq!(breakdown.age_score, 100.0);
        assert_eq!(breakdown.violation_score, 0.0);
        assert_eq!(breakdown.elevator_age_score, 100.0);
        assert_eq!(breakdown.sale_activity_score, 20.0);
        assert_eq!(breakdown.upgrade_potential_score, 100.0);
        assert_eq!(breakdown.total_score, 63);
        assert_eq!(breakdown.grade().priority(), PriorityLevel::Medium);
        assert_eq!(breakdown.factors.years_since_modernization, 94);
        assert_eq!(breakdown.factors.building_age, 94);
        assert_eq!(breakdown.factors.elevator_age, 94);
        assert_eq!(breakdown.factors.building_class, BuildingClass::A);
    }

    #[test]
    fn modernized_elevators_lower_the_score() {
        let facts = ScoringFacts {
            oldest_modernization_year: Some(2015),
            average_install_year: Some(2015.6),
            ..landmark_tower()
        };
        let breakdown = OpportunityScorer::new(2025)
            .score(&facts, false)
            .expect("scores");

        assert_eq!(breakdown.factors.years_since_modernization, 10);
        assert_eq!(breakdown.age_score, 25.0);
        assert_eq!(breakdown.factors.elevator_age, 10);
        // 0.30*25 + 0 + 0.20*(10/94*100) + 0.15*20 + 0.10*100 = 22.627...
        assert_eq!(breakdown.total_score, 23);
    }

    #[test]
    fn maxed_factors_reach_critical_without_exceeding_bounds() {
        let facts = ScoringFacts {
            open_violations: 9,
            ..landmark_tower()
        };
        let breakdown = OpportunityScorer::new(2025)
            .score(&facts, true)
            .expect("scores");

        // 30 + 25 + 20 + 12 + 10
        assert_eq!(breakdown.total_score, 97);
        assert_eq!(breakdown.grade().priority(), PriorityLevel::Critical);
    }

    #[test]
    fn missing_year_built_is_an_error() {
        let facts = ScoringFacts {
            year_built: None,
            ..landmark_tower()
        };
        let err = OpportunityScorer::new(2025)
            .score(&facts, false)
            .expect_err("year built required");
        assert_eq!(err, ScoringError::MissingYearBuilt(BuildingId(1)));
    }

    #[test]
    fn building_class_rules() {
        assert_eq!(
            BuildingClass::classify(Borough::Manhattan, Some(51)),
            BuildingClass::A
        );
        assert_eq!(
            BuildingClass::classify(Borough::Manhattan, Some(12)),
            BuildingClass::B
        );
        assert_eq!(
            BuildingClass::classify(Borough::Queens, Some(31)),
            BuildingClass::B
        );
        assert_eq!(
            BuildingClass::classify(Borough::Brooklyn, Some(30)),
            BuildingClass::C
        );
        assert_eq!(BuildingClass::classify(Borough::Bronx, None), BuildingClass::C);
    }

    #[test]
    fn scores_stay_bounded_across_inputs() {
        let scorer = OpportunityScorer::new(2025);
        for borough in Borough::ALL {
            for year_built in [1850, 1931, 1990, 2024, 2025] {
                for open_violations in [0, 3, 40] {
                    for recent_sale in [false, true] {
                        let facts = ScoringFacts {
                            building_id: BuildingId(7),
                            borough,
                            year_built: Some(year_built),
                            floors: Some(12),
                            open_violations,
                            oldest_modernization_year: Some(2030),
                            average_install_year: Some(1700.0),
                        };
                        let breakdown = scorer.score(&facts, recent_sale).expect("scores");
                        assert!(breakdown.total_score <= 100);
                        assert!(breakdown
                            .grade()
                            .priority()
                            .is_consistent_with(breakdown.total_score));
                    }
                }
            }
        }
    }
}
