use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{Borough, BuildingId, PriorityLevel};
use super::repository::{MonthlyViolations, OpportunityFinancials, PipelineCounts, StoredGrade};

/// Scores at or above this count as critical opportunities.
pub const CRITICAL_SCORE: u8 = 85;

/// Months of violation history shown on the dashboard trend.
pub const TREND_MONTHS: u32 = 6;

/// Dashboard score bands, highest first, as `(label, min, max)`.
pub const SCORE_BANDS: [(&str, u8, u8); 5] = [
    ("Critical (85-100)", 85, 100),
    ("High (65-84)", 65, 84),
    ("Medium (40-64)", 40, 64),
    ("Low (20-39)", 20, 39),
    ("Very Low (0-19)", 0, 19),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreBucket {
    pub range: &'static str,
    pub min: u8,
    pub max: u8,
    pub count: u64,
}

/// Violations per calendar month, labelled like `Mar 2024`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub month: String,
    pub count: u64,
}

impl From<MonthlyViolations> for TrendPoint {
    fn from(monthly: MonthlyViolations) -> Self {
        Self {
            month: monthly.month.format("%b %Y").to_string(),
            count: monthly.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStatistics {
    pub total_buildings: u64,
    pub critical_opportunities: u64,
    pub average_opportunity_score: f64,
    pub total_violations: u64,
    pub open_violations: u64,
    pub borough_distribution: BTreeMap<Borough, u64>,
    pub score_distribution: Vec<ScoreBucket>,
    pub violation_trend: Vec<TrendPoint>,
}

impl DashboardStatistics {
    /// Folds table counts, stored grades, and monthly violation counts into
    /// the dashboard view. Ungraded opportunities are left out of the score
    /// figures.
    pub fn collect(
        counts: PipelineCounts,
        grades: &[StoredGrade],
        trend: Vec<MonthlyViolations>,
    ) -> Self {
        let scores: Vec<u8> = grades.iter().filter_map(|grade| grade.score).collect();

        let critical_opportunities = scores
            .iter()
            .filter(|score| **score >= CRITICAL_SCORE)
            .count() as u64;
        let average_opportunity_score = if scores.is_empty() {
            0.0
        } else {
            let total: u64 = scores.iter().map(|score| u64::from(*score)).sum();
            round_tenth(total as f64 / scores.len() as f64)
        };
        let score_distribution = SCORE_BANDS
            .iter()
            .map(|(range, min, max)| ScoreBucket {
                range,
                min: *min,
                max: *max,
                count: scores
                    .iter()
                    .filter(|score| (*min..=*max).contains(*score))
                    .count() as u64,
            })
            .collect();

        Self {
            total_buildings: counts.total_buildings,
            critical_opportunities,
            average_opportunity_score,
            total_violations: counts.total_violations,
            open_violations: counts.open_violations,
            borough_distribution: counts.borough_distribution,
            score_distribution,
            violation_trend: trend.into_iter().map(TrendPoint::from).collect(),
        }
    }
}

/// Value and return figures for one score band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBandValue {
    pub score_range: &'static str,
    pub count: u64,
    pub avg_estimated_value: f64,
    pub avg_roi: f64,
}

/// Every band, highest first, over graded opportunities. Averages skip
/// missing values and are 0.0 when none are present.
pub fn score_band_values(records: &[OpportunityFinancials]) -> Vec<ScoreBandValue> {
    SCORE_BANDS
        .iter()
        .map(|(range, min, max)| {
            let band: Vec<&OpportunityFinancials> = records
                .iter()
                .filter(|record| record.score.is_some_and(|score| (*min..=*max).contains(&score)))
                .collect();
            ScoreBandValue {
                score_range: range,
                count: band.len() as u64,
                avg_estimated_value: average(band.iter().map(|r| r.estimated_value)),
                avg_roi: average(band.iter().map(|r| r.roi_estimate)),
            }
        })
        .collect()
}

/// Return on investment for one priority tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoiSummary {
    pub priority_level: PriorityLevel,
    pub count: u64,
    pub avg_roi: f64,
    pub avg_payback_years: f64,
    pub avg_energy_savings: f64,
    pub total_value: f64,
}

/// Tiers holding at least one opportunity, Critical first.
pub fn roi_by_priority(records: &[OpportunityFinancials]) -> Vec<RoiSummary> {
    [
        PriorityLevel::Critical,
        PriorityLevel::High,
        PriorityLevel::Medium,
        PriorityLevel::Low,
    ]
    .into_iter()
    .filter_map(|priority| {
        let tier: Vec<&OpportunityFinancials> = records
            .iter()
            .filter(|record| record.priority == Some(priority))
            .collect();
        if tier.is_empty() {
            return None;
        }
        Some(RoiSummary {
            priority_level: priority,
            count: tier.len() as u64,
            avg_roi: average(tier.iter().map(|r| r.roi_estimate)),
            avg_payback_years: average(tier.iter().map(|r| r.payback_period_years)),
            avg_energy_savings: average(tier.iter().map(|r| r.energy_savings_potential)),
            total_value: tier.iter().filter_map(|r| r.estimated_value).sum(),
        })
    })
    .collect()
}

fn average(values: impl Iterator<Item = Option<f64>>) -> f64 {
    let (total, present) = values
        .flatten()
        .fold((0.0, 0u32), |(total, present), value| (total + value, present + 1));
    if present == 0 {
        0.0
    } else {
        total / f64::from(present)
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Stored priority that disagrees with the tier implied by the stored score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriorityMismatch {
    pub building_id: BuildingId,
    pub score: u8,
    pub stored_priority: Option<PriorityLevel>,
    pub expected_priority: PriorityLevel,
}

impl PriorityMismatch {
    pub fn detect(grade: &StoredGrade) -> Option<Self> {
        let score = grade.score?;
        let expected_priority = PriorityLevel::for_score(score);
        if grade.priority == Some(expected_priority) {
            return None;
        }
        Some(Self {
            building_id: grade.building_id,
            score,
            stored_priority: grade.priority,
            expected_priority,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;

    fn grade(id: i64, score: Option<u8>, priority: Option<PriorityLevel>) -> StoredGrade {
        StoredGrade {
            building_id: BuildingId(id),
            score,
            priority,
        }
    }

    fn financials(
        id: i64,
        score: Option<u8>,
        value: Option<f64>,
        roi: Option<f64>,
    ) -> OpportunityFinancials {
        OpportunityFinancials {
            building_id: BuildingId(id),
            score,
            priority: score.map(PriorityLevel::for_score),
            estimated_value: value,
            roi_estimate: roi,
            payback_period_years: Some(5.0),
            energy_savings_potential: None,
        }
    }

    #[test]
    fn bands_cover_every_score_once() {
        for score in 0..=100u8 {
            let hits = SCORE_BANDS
                .iter()
                .filter(|(_, min, max)| (*min..=*max).contains(&score))
                .count();
            assert_eq!(hits, 1, "score {score}");
        }
    }

    #[test]
    fn collects_scores_into_bands() {
        let grades = vec![
            grade(1, Some(91), Some(PriorityLevel::Critical)),
            grade(2, Some(85), Some(PriorityLevel::Critical)),
            grade(3, Some(64), Some(PriorityLevel::Medium)),
            grade(4, Some(12), Some(PriorityLevel::Low)),
            grade(5, None, None),
        ];
        let counts = PipelineCounts {
            total_buildings: 6,
            total_violations: 9,
            open_violations: 4,
            ..PipelineCounts::default()
        };

        let trend = vec![MonthlyViolations {
            month: NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date"),
            count: 2,
        }];

        let stats = DashboardStatistics::collect(counts, &grades, trend);

        assert_eq!(stats.critical_opportunities, 2);
        assert_eq!(stats.average_opportunity_score, 63.0);
        let counts: Vec<u64> = stats.score_distribution.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 0, 1, 0, 1]);
        assert_eq!(stats.total_buildings, 6);
        assert_eq!(stats.open_violations, 4);
        assert_eq!(
            stats.violation_trend,
            vec![TrendPoint {
                month: "Mar 2024".to_string(),
                count: 2
            }]
        );
    }

    #[test]
    fn average_is_zero_without_scores() {
        let stats = DashboardStatistics::collect(PipelineCounts::default(), &[], Vec::new());
        assert_eq!(stats.average_opportunity_score, 0.0);
        assert!(stats.score_distribution.iter().all(|bucket| bucket.count == 0));
    }

    #[test]
    fn band_values_average_present_figures_only() {
        let records = vec![
            financials(1, Some(90), Some(400_000.0), Some(20.0)),
            financials(2, Some(86), None, Some(10.0)),
            financials(3, Some(50), Some(100_000.0), None),
            financials(4, None, Some(900_000.0), Some(99.0)),
        ];

        let bands = score_band_values(&records);

        assert_eq!(bands.len(), SCORE_BANDS.len());
        assert_eq!(bands[0].score_range, "Critical (85-100)");
        assert_eq!(bands[0].count, 2);
        assert_eq!(bands[0].avg_estimated_value, 400_000.0);
        assert_eq!(bands[0].avg_roi, 15.0);
        assert_eq!(bands[2].count, 1);
        assert_eq!(bands[2].avg_roi, 0.0);
        assert_eq!(bands[4].count, 0);
        assert_eq!(bands[4].avg_estimated_value, 0.0);
    }

    #[test]
    fn roi_groups_skip_empty_tiers() {
        let records = vec![
            financials(1, Some(90), Some(400_000.0), Some(20.0)),
            financials(2, Some(30), Some(50_000.0), Some(8.0)),
            financials(3, Some(25), None, Some(12.0)),
            financials(4, None, Some(900_000.0), Some(99.0)),
        ];

        let summary = roi_by_priority(&records);

        let tiers: Vec<PriorityLevel> = summary.iter().map(|s| s.priority_level).collect();
        assert_eq!(tiers, vec![PriorityLevel::Critical, PriorityLevel::Low]);
        assert_eq!(summary[1].count, 2);
        assert_eq!(summary[1].avg_roi, 10.0);
        assert_eq!(summary[1].avg_payback_years, 5.0);
        assert_eq!(summary[1].avg_energy_savings, 0.0);
        assert_eq!(summary[1].total_value, 50_000.0);
    }

    #[test]
    fn mismatch_requires_a_disagreeing_priority() {
        assert_eq!(
            PriorityMismatch::detect(&grade(1, Some(70), Some(PriorityLevel::High))),
            None
        );
        assert_eq!(PriorityMismatch::detect(&grade(2, None, Some(PriorityLevel::Low))), None);

        let mismatch = PriorityMismatch::detect(&grade(3, Some(70), Some(PriorityLevel::Low)))
            .expect("low priority for 70 is inconsistent");
        assert_eq!(mismatch.expected_priority, PriorityLevel::High);

        let missing = PriorityMismatch::detect(&grade(4, Some(20), None))
            .expect("missing priority is inconsistent");
        assert_eq!(missing.stored_priority, None);
    }
}
