//! Sequential rescoring of every building.
//!
//! Each building is committed on its own; there is no batch transaction. A
//! [`RescoreLatch`] shared between callers keeps at most one batch running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::domain::BuildingId;
use super::repository::BuildingStore;
use super::scoring::SaleActivitySource;
use super::service::{OpportunityError, OpportunityService};

/// What a batch does when one building fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RescoreFailurePolicy {
    /// Stop at the first failure. Buildings already processed keep their new
    /// scores.
    #[default]
    Abort,
    /// Record the failure and move on to the next building.
    Continue,
}

impl RescoreFailurePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "abort" => Some(Self::Abort),
            "continue" => Some(Self::Continue),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RescoreFailurePolicy::Abort => "abort",
            RescoreFailurePolicy::Continue => "continue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RescoreState {
    Idle,
    Running,
}

/// Shared Idle/Running flag.
#[derive(Debug, Clone, Default)]
pub struct RescoreLatch {
    running: Arc<AtomicBool>,
}

impl RescoreLatch {
    pub fn state(&self) -> RescoreState {
        if self.running.load(Ordering::Acquire) {
            RescoreState::Running
        } else {
            RescoreState::Idle
        }
    }

    /// Moves Idle to Running, or returns `None` when a batch already runs.
    /// The latch returns to Idle when the guard drops.
    pub fn try_acquire(&self) -> Option<RunningGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard {
                running: Arc::clone(&self.running),
            })
    }
}

pub struct RunningGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RescoreFailure {
    pub building_id: BuildingId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RescoreReport {
    pub processed: usize,
    pub updated: usize,
    pub failures: Vec<RescoreFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RescoreError {
    #[error("a batch rescore is already running")]
    AlreadyRunning,
    #[error("rescore aborted at building {building_id} after {processed} buildings: {source}")]
    Aborted {
        building_id: BuildingId,
        processed: usize,
        #[source]
        source: OpportunityError,
    },
    #[error("could not list buildings to rescore: {0}")]
    Listing(#[source] OpportunityError),
}

pub struct BatchRescorer<S, M> {
    service: OpportunityService<S, M>,
    latch: RescoreLatch,
    policy: RescoreFailurePolicy,
}

impl<S, M> BatchRescorer<S, M>
where
    S: BuildingStore + 'static,
    M: SaleActivitySource + 'static,
{
    pub fn new(
        service: OpportunityService<S, M>,
        latch: RescoreLatch,
        policy: RescoreFailurePolicy,
    ) -> Self {
        Self {
            service,
            latch,
            policy,
        }
    }

    pub fn state(&self) -> RescoreState {
        self.latch.state()
    }

    pub fn policy(&self) -> RescoreFailurePolicy {
        self.policy
    }

    pub async fn run(&self) -> Result<RescoreReport, RescoreError> {
        let _running = self.latch.try_acquire().ok_or(RescoreError::AlreadyRunning)?;
        let started_at = Utc::now();

        let ids = self
            .service
            .building_ids()
            .await
            .map_err(RescoreError::Listing)?;
        info!(
            buildings = ids.len(),
            policy = self.policy.label(),
            "batch rescore started"
        );

        let mut processed = 0;
        let mut updated = 0;
        let mut failures = Vec::new();

        for building_id in ids {
            let outcome = self.service.recalculate_score(building_id).await;
            processed += 1;

            match outcome {
                Ok(_) => updated += 1,
                Err(source) => match self.policy {
                    RescoreFailurePolicy::Abort => {
                        error!(
                            building_id = %building_id,
                            processed,
                            error = %source,
                            "batch rescore aborted"
                        );
                        return Err(RescoreError::Aborted {
                            building_id,
                            processed,
                            source,
                        });
                    }
                    RescoreFailurePolicy::Continue => {
                        warn!(building_id = %building_id, error = %source, "building rescore failed");
                        failures.push(RescoreFailure {
                            building_id,
                            reason: source.to_string(),
                        });
                    }
                },
            }
        }

        let report = RescoreReport {
            processed,
            updated,
            failures,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            processed = report.processed,
            updated = report.updated,
            failed = report.failures.len(),
            "batch rescore finished"
        );
        Ok(report)
    }
}
