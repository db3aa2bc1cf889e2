use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::super::domain::BuildingId;

/// Share of buildings reported as recently sold when no market feed exists.
pub const DEFAULT_SALE_PROBABILITY: f64 = 0.3;

/// Market signal telling the scorer whether a building changed hands recently.
pub trait SaleActivitySource: Send + Sync {
    fn recent_sale(&self, building_id: BuildingId) -> bool;
}

/// Constant answer for every building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedSaleActivity(pub bool);

impl SaleActivitySource for FixedSaleActivity {
    fn recent_sale(&self, _building_id: BuildingId) -> bool {
        self.0
    }
}

/// Simulated market feed backed by a seedable generator.
pub struct SeededSaleActivity {
    rng: Mutex<StdRng>,
    probability: f64,
}

impl SeededSaleActivity {
    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            probability: DEFAULT_SALE_PROBABILITY,
        }
    }

    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability.clamp(0.0, 1.0);
        self
    }
}

impl SaleActivitySource for SeededSaleActivity {
    fn recent_sale(&self, _building_id: BuildingId) -> bool {
        let mut rng = self.rng.lock().expect("sale activity rng mutex poisoned");
        rng.gen_bool(self.probability)
    }
}
