//! Reinvestment engine: recycles exit proceeds into new loans during the
//! reinvestment window.
//!
//! Runs month by month so that proceeds from reinvested loans can themselves
//! be reinvested. Each month's batch draws from its own streams (see
//! `LoanGenerator::generate_batch`) and new loans get their exits simulated
//! immediately, so downstream stages see one fully settled book.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::allocator;
use crate::error::SimError;
use crate::exits::{ExitEvent, ExitSimulator};
use crate::loans::{Loan, LoanGenerator};
use crate::price_path::PricePathSet;
use crate::rng::RngFactory;
use crate::tls::{Zone, ZoneMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinvestConfig {
    pub enabled: bool,
    /// Last month (inclusive) at which proceeds are recycled.
    pub horizon_months: u32,
    /// Fraction of each month's proceeds held back as liquidity reserve.
    pub reserve_rate: f64,
    /// Re-weight the target allocation by trailing zone performance.
    pub dynamic_allocation: bool,
    /// Trailing window for the dynamic re-weighting.
    pub lookback_months: u32,
    /// Strength of the dynamic tilt.
    pub performance_tilt: f64,
}

impl Default for ReinvestConfig {
    fn default() -> Self {
        ReinvestConfig {
            enabled: true,
            horizon_months: 60,
            reserve_rate: 0.05,
            dynamic_allocation: false,
            lookback_months: 12,
            performance_tilt: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReinvestBatch {
    pub month: u32,
    pub proceeds_available: f64,
    pub invested: f64,
    pub loan_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReinvestmentSummary {
    pub total_proceeds: f64,
    pub total_reserved: f64,
    pub total_invested: f64,
    pub loans_originated: usize,
    pub batches: Vec<ReinvestBatch>,
}

pub struct ReinvestmentEngine<'a> {
    config: &'a ReinvestConfig,
    target: &'a ZoneMap<f64>,
    caps: &'a ZoneMap<f64>,
    paths: &'a PricePathSet,
    min_loan_size: f64,
}

impl<'a> ReinvestmentEngine<'a> {
    pub fn new(
        config: &'a ReinvestConfig,
        target: &'a ZoneMap<f64>,
        caps: &'a ZoneMap<f64>,
        paths: &'a PricePathSet,
        min_loan_size: f64,
    ) -> Self {
        ReinvestmentEngine {
            config,
            target,
            caps,
            paths,
            min_loan_size,
        }
    }

    /// Run the monthly reinvestment loop, appending new loans and their
    /// exits in place. `on_month` is the cancellation/progress checkpoint.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        rng: &RngFactory,
        generator: &LoanGenerator<'_>,
        exit_simulator: &ExitSimulator<'_>,
        loans: &mut Vec<Loan>,
        exits: &mut Vec<ExitEvent>,
        next_loan_id: &mut u64,
        mut on_month: impl FnMut(u32) -> Result<(), SimError>,
    ) -> Result<ReinvestmentSummary, SimError> {
        let mut summary = ReinvestmentSummary::default();
        if !self.config.enabled {
            return Ok(summary);
        }

        let mut used_properties: HashSet<u64> =
            loans.iter().map(|l| l.property_id).collect();
        let horizon = self
            .config
            .horizon_months
            .min(self.paths.horizon_months.saturating_sub(1));

        for month in 1..=horizon {
            on_month(month)?;

            let proceeds: f64 = exits
                .iter()
                .filter(|e| e.month == month)
                .map(|e| e.fund_proceeds)
                .sum();
            if proceeds <= 0.0 {
                continue;
            }
            summary.total_proceeds += proceeds;

            let reserved = proceeds * self.config.reserve_rate;
            let available = proceeds - reserved;
            summary.total_reserved += reserved;
            if available < self.min_loan_size {
                continue;
            }

            let weights = if self.config.dynamic_allocation {
                let trailing = self.trailing_zone_returns(month);
                allocator::dynamic_weights(
                    self.target,
                    &trailing,
                    self.caps,
                    self.config.performance_tilt,
                )
            } else {
                *self.target
            };
            let budgets = weights.map(|_, w| available * w);

            let batch = generator.generate_batch(
                rng,
                &budgets,
                month,
                next_loan_id,
                &mut used_properties,
            )?;

            let invested: f64 = batch.loans.iter().map(|l| l.principal).sum();
            if batch.loans.is_empty() {
                continue;
            }

            let mut batch_loans = batch.loans;
            for loan in &mut batch_loans {
                let event = exit_simulator.simulate_loan(rng, loan)?;
                exits.push(event);
            }

            summary.total_invested += invested;
            summary.loans_originated += batch_loans.len();
            summary.batches.push(ReinvestBatch {
                month,
                proceeds_available: available,
                invested,
                loan_count: batch_loans.len(),
            });
            loans.append(&mut batch_loans);
        }

        Ok(summary)
    }

    /// Trailing zone index returns over the lookback window ending at
    /// `month`.
    fn trailing_zone_returns(&self, month: u32) -> ZoneMap<f64> {
        let lookback = self.config.lookback_months.min(month).max(1);
        let mut out = ZoneMap::uniform(0.0_f64);
        for zone in Zone::all() {
            let now = self.paths.zone_at(zone, month);
            let then = self.paths.zone_at(zone, month - lookback);
            *out.get_mut(zone) = now / then - 1.0;
        }
        out
    }
}
