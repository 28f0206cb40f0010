//! Per-zone and per-property stochastic home-price paths.
//!
//! Three closed model variants, selected at config-load time, all exposing
//! the same monthly step contract. Zones are correlated through the Cholesky
//! factor of the configured correlation matrix; properties optionally carry
//! an idiosyncratic lognormal multiplier on top of their zone index.
//!
//! Every path starts at 1.0 and every index stays strictly positive.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::loans::Loan;
use crate::rng::RngFactory;
use crate::tls::{TlsCatalogue, Zone, ZoneMap, ZoneParams};

const DT: f64 = 1.0 / 12.0;

/// Regime tilt applied on top of the per-zone GBM parameters while the
/// regime is active.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeParams {
    /// Added to the zone's annual appreciation drift.
    pub drift_adjust: f64,
    /// Multiplies the zone's annual volatility.
    pub vol_multiplier: f64,
}

/// Closed set of price models. Each variant steps log-price per month from
/// the same correlated normal draws.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum PricePathModel {
    /// Geometric Brownian motion on each zone index.
    Gbm,
    /// Ornstein-Uhlenbeck on log price around the zone's drift trend.
    MeanReverting {
        /// Reversion speed (annual).
        kappa: f64,
        /// Long-term log-level offset above the drift trend.
        theta: f64,
    },
    /// Two-state bull/bear Markov chain; the active regime tilts drift and
    /// scales volatility for all zones.
    RegimeSwitching {
        bull: RegimeParams,
        bear: RegimeParams,
        /// Monthly P(bull -> bear).
        p_bull_to_bear: f64,
        /// Monthly P(bear -> bull).
        p_bear_to_bull: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePathConfig {
    #[serde(flatten)]
    pub model: PricePathModel,
    /// Cross-zone correlation matrix, row/column order green, orange, red.
    pub correlation: [[f64; 3]; 3],
    /// Simulate per-property idiosyncratic multipliers.
    pub property_multipliers: bool,
}

impl Default for PricePathConfig {
    fn default() -> Self {
        PricePathConfig {
            model: PricePathModel::Gbm,
            correlation: [[1.0, 0.6, 0.4], [0.6, 1.0, 0.5], [0.4, 0.5, 1.0]],
            property_multipliers: true,
        }
    }
}

/// All price state produced by the stage: zone indices (month 0 = 1.0),
/// optional per-property multipliers, and the allocation-weighted market
/// index used as the macro state by downstream stages.
#[derive(Debug, Clone)]
pub struct PricePathSet {
    pub horizon_months: u32,
    pub zone_index: ZoneMap<Vec<f64>>,
    pub property_multiplier: HashMap<u64, Vec<f64>>,
    pub market_index: Vec<f64>,
}

impl PricePathSet {
    pub fn zone_at(&self, zone: Zone, month: u32) -> f64 {
        self.zone_index.get(zone)[month as usize]
    }

    /// Effective price index for a property: zone index times the
    /// property's idiosyncratic multiplier when present.
    pub fn property_at(&self, zone: Zone, property_id: u64, month: u32) -> f64 {
        let base = self.zone_at(zone, month);
        match self.property_multiplier.get(&property_id) {
            Some(mult) => base * mult[month as usize],
            None => base,
        }
    }

    /// Growth of a property's value between two months.
    pub fn property_growth(&self, zone: Zone, property_id: u64, from: u32, to: u32) -> f64 {
        self.property_at(zone, property_id, to) / self.property_at(zone, property_id, from)
    }
}

/// Cholesky factor of a symmetric positive-definite matrix. Not
/// positive-definite is a `NumericFailure`; the caller falls back to
/// uncorrelated draws and records the diagnostic.
pub fn cholesky3(matrix: &[[f64; 3]; 3]) -> Result<[[f64; 3]; 3], SimError> {
    let mut l = [[0.0_f64; 3]; 3];
    for i in 0..3 {
        for j in 0..=i {
            let mut sum = matrix[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 {
                    return Err(SimError::numeric(
                        "cholesky",
                        format!("correlation matrix not positive-definite at row {i}"),
                    ));
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Ok(l)
}

pub struct PricePathSimulator<'a> {
    config: &'a PricePathConfig,
    zones: &'a ZoneMap<ZoneParams>,
    allocation: &'a ZoneMap<f64>,
    /// One-off multiplicative shock applied from month 1, for stress runs.
    price_shock_pct: Option<f64>,
}

impl<'a> PricePathSimulator<'a> {
    pub fn new(
        config: &'a PricePathConfig,
        zones: &'a ZoneMap<ZoneParams>,
        allocation: &'a ZoneMap<f64>,
        price_shock_pct: Option<f64>,
    ) -> Self {
        PricePathSimulator {
            config,
            zones,
            allocation,
            price_shock_pct,
        }
    }

    /// Simulate zone indices over `horizon` months. `on_month` is the
    /// stage's progress/cancellation checkpoint, called once per month.
    pub fn simulate_zones(
        &self,
        rng: &RngFactory,
        horizon: u32,
        mut on_month: impl FnMut(u32) -> Result<(), SimError>,
    ) -> Result<(ZoneMap<Vec<f64>>, Vec<String>), SimError> {
        let mut diagnostics = Vec::new();
        let chol = match cholesky3(&self.config.correlation) {
            Ok(l) => l,
            Err(e) => {
                diagnostics.push(format!("{e}; falling back to uncorrelated draws"));
                [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
            }
        };

        let mut streams: Vec<StdRng> = Zone::all()
            .iter()
            .map(|z| rng.stream(&format!("price_path/zone/{}", z.name())))
            .collect();
        let mut regime_stream = rng.stream("price_path/regime");

        let mut log_price = ZoneMap::uniform(0.0_f64);
        let mut paths = ZoneMap::uniform(Vec::with_capacity(horizon as usize + 1));
        for zone in Zone::all() {
            paths.get_mut(zone).push(1.0);
        }

        // Regime chain state; only used by the regime-switching model.
        let mut in_bull = true;

        for month in 1..=horizon {
            on_month(month)?;

            // Independent draws, one per zone stream, then correlate.
            let raw: Vec<f64> = streams
                .iter_mut()
                .map(|s| StandardNormal.sample(s))
                .collect();
            let correlated: Vec<f64> = (0..3)
                .map(|i| (0..3).map(|k| chol[i][k] * raw[k]).sum())
                .collect();

            if let PricePathModel::RegimeSwitching {
                p_bull_to_bear,
                p_bear_to_bull,
                ..
            } = &self.config.model
            {
                let u: f64 = rand::Rng::gen(&mut regime_stream);
                in_bull = if in_bull {
                    u >= *p_bull_to_bear
                } else {
                    u < *p_bear_to_bull
                };
            }

            for (i, zone) in Zone::all().into_iter().enumerate() {
                let params = self.zones.get(zone);
                let z = correlated[i];
                let x = log_price.get_mut(zone);
                *x = self.step_log_price(*x, params, z, month, in_bull);
                let mut index = x.exp();
                if let Some(shock) = self.price_shock_pct {
                    index *= 1.0 + shock;
                }
                // Indices must stay strictly positive.
                paths.get_mut(zone).push(index.max(1e-9));
            }
        }

        Ok((paths, diagnostics))
    }

    fn step_log_price(
        &self,
        x: f64,
        params: &ZoneParams,
        z: f64,
        month: u32,
        in_bull: bool,
    ) -> f64 {
        match &self.config.model {
            PricePathModel::Gbm => {
                let mu = params.appreciation_mean;
                let sigma = params.appreciation_vol;
                x + (mu - 0.5 * sigma * sigma) * DT + sigma * DT.sqrt() * z
            }
            PricePathModel::MeanReverting { kappa, theta } => {
                // Revert toward the drift trend line, not a flat level:
                // home prices are trend-stationary, not level-stationary.
                let trend = params.appreciation_mean * DT * month as f64 + theta;
                let sigma = params.appreciation_vol;
                x + kappa * (trend - x) * DT + sigma * DT.sqrt() * z
            }
            PricePathModel::RegimeSwitching { bull, bear, .. } => {
                let regime = if in_bull { bull } else { bear };
                let mu = params.appreciation_mean + regime.drift_adjust;
                let sigma = params.appreciation_vol * regime.vol_multiplier;
                x + (mu - 0.5 * sigma * sigma) * DT + sigma * DT.sqrt() * z
            }
        }
    }

    /// Lognormal idiosyncratic multiplier per property on the loan book.
    pub fn simulate_property_multipliers(
        &self,
        rng: &RngFactory,
        tls: &TlsCatalogue,
        loans: &[Loan],
        horizon: u32,
    ) -> Result<HashMap<u64, Vec<f64>>, SimError> {
        let mut out = HashMap::new();
        if !self.config.property_multipliers {
            return Ok(out);
        }
        for loan in loans {
            if out.contains_key(&loan.property_id) {
                continue;
            }
            let property = tls.property(loan.property_id)?;
            let vol = property.idio_vol;
            let mut stream = rng.stream(&format!("price_path/property/{}", property.id));
            let mut mult = Vec::with_capacity(horizon as usize + 1);
            let mut x = 0.0_f64;
            mult.push(1.0);
            for _ in 1..=horizon {
                let z: f64 = StandardNormal.sample(&mut stream);
                x += -0.5 * vol * vol * DT + vol * DT.sqrt() * z;
                mult.push(x.exp());
            }
            out.insert(property.id, mult);
        }
        Ok(out)
    }

    /// Allocation-weighted composite of the zone indices; downstream stages
    /// read it as the macro state.
    pub fn market_index(&self, zone_index: &ZoneMap<Vec<f64>>, horizon: u32) -> Vec<f64> {
        let total_weight: f64 = self.allocation.sum().max(1e-12);
        (0..=horizon as usize)
            .map(|m| {
                Zone::all()
                    .into_iter()
                    .map(|z| self.allocation.get(z) / total_weight * zone_index.get(z)[m])
                    .sum()
            })
            .collect()
    }
}
