use serde::{Deserialize, Serialize};

use super::super::domain::PriorityLevel;

/// Lower bounds evaluated high-to-low; the first match wins.
const PRIORITY_THRESHOLDS: [(u8, PriorityLevel); 3] = [
    (85, PriorityLevel::Critical),
    (65, PriorityLevel::High),
    (40, PriorityLevel::Medium),
];

pub fn classify(score: u8) -> PriorityLevel {
    PRIORITY_THRESHOLDS
        .iter()
        .find(|(floor, _)| score >= *floor)
        .map(|(_, level)| *level)
        .unwrap_or(PriorityLevel::Low)
}

impl PriorityLevel {
    pub fn for_score(score: u8) -> Self {
        classify(score)
    }

    pub fn is_consistent_with(self, score: u8) -> bool {
        classify(score) == self
    }
}

/// Score and priority as persisted together. Only constructible from a score,
/// so the pair always agrees with the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityGrade {
    score: u8,
    priority: PriorityLevel,
}

impl OpportunityGrade {
    pub fn from_score(score: u8) -> Self {
        let score = score.min(100);
        Self {
            score,
            priority: classify(score),
        }
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn priority(&self) -> PriorityLevel {
        self.priority
    }
}
