//! Loan generator: the initial portfolio and reinvestment batches.
//!
//! Draws loan size, LTV, term and rate from truncated normals, then attaches
//! each loan to a property sampled without replacement from its zone. Every
//! zone draws from its own named stream (`loan_gen/{zone}` for the initial
//! book, `reinvest/{month}/{zone}` for later batches) so batches are
//! independent and reproducible.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::exits::ExitKind;
use crate::rng::RngFactory;
use crate::tls::{TlsCatalogue, Zone, ZoneMap};

/// Shape of the loan book: all draws are truncated normals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanShapeConfig {
    pub avg_size: f64,
    pub size_std: f64,
    pub min_size: f64,
    pub max_size: f64,
    pub avg_ltv: f64,
    pub ltv_std: f64,
    pub min_ltv: f64,
    pub max_ltv: f64,
    /// Contract term in months.
    pub avg_term_months: f64,
    pub term_std_months: f64,
    /// Simple-interest annual rate.
    pub avg_rate: f64,
    pub rate_std: f64,
    /// Months before the time factor of the exit hazard starts rising.
    pub min_hold_months: u32,
    /// Share of property appreciation owed to the fund, scaled by LTV in
    /// pro-rata mode (see `ExitConfig::appreciation_share`).
    pub appreciation_share_rate: f64,
}

impl Default for LoanShapeConfig {
    fn default() -> Self {
        LoanShapeConfig {
            avg_size: 250_000.0,
            size_std: 75_000.0,
            min_size: 50_000.0,
            max_size: 600_000.0,
            avg_ltv: 0.45,
            ltv_std: 0.12,
            min_ltv: 0.10,
            max_ltv: 0.75,
            avg_term_months: 84.0,
            term_std_months: 24.0,
            avg_rate: 0.05,
            rate_std: 0.01,
            min_hold_months: 12,
            appreciation_share_rate: 0.35,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Loan {
    pub id: u64,
    pub zone: Zone,
    pub suburb_id: u32,
    pub property_id: u64,
    pub origination_month: u32,
    pub principal: f64,
    pub ltv: f64,
    pub term_months: u32,
    /// Simple-interest annual rate.
    pub rate: f64,
    pub origination_fee: f64,
    /// True for loans originated from recycled exit proceeds.
    pub reinvestment: bool,
    /// Fraction of appreciation owed to the fund for this loan.
    pub appreciation_share_rate: f64,

    // Written by the exit simulator.
    pub exit_month: Option<u32>,
    pub exit_kind: Option<ExitKind>,
    /// Fund proceeds at exit.
    pub exit_value: Option<f64>,
    /// Recovery proceeds for defaults, before foreclosure costs.
    pub recovery_value: Option<f64>,
}

impl Loan {
    /// Property value implied at origination: principal / ltv.
    pub fn property_value_at_origination(&self) -> f64 {
        self.principal / self.ltv
    }

    pub fn is_active(&self, month: u32) -> bool {
        let exited = self.exit_month.map(|m| m <= month).unwrap_or(false);
        self.origination_month <= month && !exited
    }
}

/// One generated batch: the loans plus how much of the budget went unspent
/// (a zone runs dry when its remaining budget drops below the minimum size
/// or its property pool is exhausted).
#[derive(Debug)]
pub struct LoanBatch {
    pub loans: Vec<Loan>,
    pub unallocated: ZoneMap<f64>,
}

pub struct LoanGenerator<'a> {
    config: &'a LoanShapeConfig,
    tls: &'a TlsCatalogue,
    fund_term_months: u32,
    origination_fee_rate: f64,
}

impl<'a> LoanGenerator<'a> {
    pub fn new(
        config: &'a LoanShapeConfig,
        tls: &'a TlsCatalogue,
        fund_term_months: u32,
        origination_fee_rate: f64,
    ) -> Self {
        LoanGenerator {
            config,
            tls,
            fund_term_months,
            origination_fee_rate,
        }
    }

    /// Generate the initial portfolio from the allocated dollars per zone.
    pub fn generate_initial(
        &self,
        rng: &RngFactory,
        budgets: &ZoneMap<f64>,
        next_id: &mut u64,
        used_properties: &mut HashSet<u64>,
    ) -> Result<LoanBatch, SimError> {
        let mut loans = Vec::new();
        let mut unallocated = ZoneMap::uniform(0.0);

        for zone in Zone::all() {
            let mut stream = rng.stream(&format!("loan_gen/{}", zone.name()));
            let leftover = self.fill_zone(
                zone,
                *budgets.get(zone),
                0,
                false,
                &mut stream,
                next_id,
                used_properties,
                &mut loans,
            )?;
            *unallocated.get_mut(zone) = leftover;
        }

        Ok(LoanBatch { loans, unallocated })
    }

    /// Generate a reinvestment batch at `month`. Terms are clamped so no
    /// loan extends beyond the fund term.
    pub fn generate_batch(
        &self,
        rng: &RngFactory,
        budgets: &ZoneMap<f64>,
        month: u32,
        next_id: &mut u64,
        used_properties: &mut HashSet<u64>,
    ) -> Result<LoanBatch, SimError> {
        let mut loans = Vec::new();
        let mut unallocated = ZoneMap::uniform(0.0);

        for zone in Zone::all() {
            let mut stream = rng.stream(&format!("reinvest/{}/{}", month, zone.name()));
            let leftover = self.fill_zone(
                zone,
                *budgets.get(zone),
                month,
                true,
                &mut stream,
                next_id,
                used_properties,
                &mut loans,
            )?;
            *unallocated.get_mut(zone) = leftover;
        }

        Ok(LoanBatch { loans, unallocated })
    }

    #[allow(clippy::too_many_arguments)]
    fn fill_zone(
        &self,
        zone: Zone,
        budget: f64,
        month: u32,
        reinvestment: bool,
        stream: &mut StdRng,
        next_id: &mut u64,
        used_properties: &mut HashSet<u64>,
        out: &mut Vec<Loan>,
    ) -> Result<f64, SimError> {
        let cfg = self.config;
        let mut remaining = budget;

        let size_dist = Normal::new(cfg.avg_size, cfg.size_std)
            .map_err(|e| SimError::config(format!("loan size distribution: {e}")))?;
        let ltv_dist = Normal::new(cfg.avg_ltv, cfg.ltv_std)
            .map_err(|e| SimError::config(format!("loan ltv distribution: {e}")))?;
        let term_dist = Normal::new(cfg.avg_term_months, cfg.term_std_months)
            .map_err(|e| SimError::config(format!("loan term distribution: {e}")))?;
        let rate_dist = Normal::new(cfg.avg_rate, cfg.rate_std)
            .map_err(|e| SimError::config(format!("loan rate distribution: {e}")))?;

        let pool = self.tls.zone_properties(zone);
        if pool.is_empty() {
            return Err(SimError::missing("zone properties", zone.name()));
        }

        while remaining >= cfg.min_size {
            let principal = size_dist
                .sample(stream)
                .clamp(cfg.min_size, cfg.max_size)
                .min(remaining);
            if principal < cfg.min_size {
                break;
            }

            let ltv = ltv_dist.sample(stream).clamp(cfg.min_ltv, cfg.max_ltv);

            let max_term = self.fund_term_months.saturating_sub(month).max(1);
            let term_months = (term_dist.sample(stream).round() as i64)
                .clamp(1, max_term as i64) as u32;

            let rate = rate_dist.sample(stream).max(0.0);

            let Some(property_id) = sample_unused(pool, used_properties, stream) else {
                // Property pool exhausted: the rest of the budget stays
                // unallocated and is reported back to the allocator.
                break;
            };
            used_properties.insert(property_id);
            let property = self.tls.property(property_id)?;

            *next_id += 1;
            out.push(Loan {
                id: *next_id,
                zone,
                suburb_id: property.suburb_id,
                property_id,
                origination_month: month,
                principal,
                ltv,
                term_months,
                rate,
                origination_fee: principal * self.origination_fee_rate,
                reinvestment,
                appreciation_share_rate: cfg.appreciation_share_rate,
                exit_month: None,
                exit_kind: None,
                exit_value: None,
                recovery_value: None,
            });
            remaining -= principal;
        }

        Ok(remaining)
    }
}

/// Sample a property id from `pool` that is not in `used`, without
/// replacement. Bounded retries keep the draw cost flat; a linear fallback
/// scan guarantees we find a free property if one exists.
fn sample_unused(
    pool: &[u64],
    used: &HashSet<u64>,
    stream: &mut StdRng,
) -> Option<u64> {
    for _ in 0..32 {
        let candidate = pool[stream.gen_range(0..pool.len())];
        if !used.contains(&candidate) {
            return Some(candidate);
        }
    }
    let start = stream.gen_range(0..pool.len());
    for offset in 0..pool.len() {
        let candidate = pool[(start + offset) % pool.len()];
        if !used.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}
