//! Individual opportunity factors. Every calculator returns a sub-score
//! clamped to `0.0..=100.0`.

use super::super::domain::Borough;

const RECENCY_HORIZON_YEARS: f64 = 40.0;
const POINTS_PER_OPEN_VIOLATION: f64 = 20.0;
const RECENT_SALE_SCORE: f64 = 80.0;
const NO_RECENT_SALE_SCORE: f64 = 20.0;
const AGING_BUILDING_YEARS: i32 = 50;

fn clamp_score(raw: f64) -> f64 {
    raw.clamp(0.0, 100.0)
}

/// Scores how long the elevators have gone without modernization, saturating
/// at 40 years.
pub fn modernization_recency(years_since_modernization: i32) -> f64 {
    clamp_score(f64::from(years_since_modernization) / RECENCY_HORIZON_YEARS * 100.0)
}

pub fn violation_load(open_violations: u32) -> f64 {
    clamp_score(f64::from(open_violations) * POINTS_PER_OPEN_VIOLATION)
}

/// Elevator age relative to building age. A building younger than one year
/// counts as one year old.
pub fn age_ratio(elevator_age: i32, building_age: i32) -> f64 {
    let ratio = f64::from(elevator_age) / f64::from(building_age.max(1));
    clamp_score(ratio * 100.0)
}

pub fn sale_activity(recent_sale: bool) -> f64 {
    if recent_sale {
        RECENT_SALE_SCORE
    } else {
        NO_RECENT_SALE_SCORE
    }
}

/// Location, height, and age contributions to the building's upgrade appeal.
pub fn upgrade_potential(borough: Borough, floors: Option<i32>, building_age: i32) -> f64 {
    let location = match borough {
        Borough::Manhattan => 40.0,
        Borough::Brooklyn => 30.0,
        _ => 20.0,
    };

    let height = match floors.unwrap_or(0) {
        f if f > 50 => 40.0,
        f if f > 20 => 25.0,
        _ => 10.0,
    };

    let age = if building_age > AGING_BUILDING_YEARS {
        20.0
    } else {
        0.0
    };

    clamp_score(location + height + age)
}
