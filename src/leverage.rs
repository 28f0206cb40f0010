//! Leverage engine: NAV line and subscription line.
//!
//! Each month the engine computes available capacity per facility, draws to
//! cover the fund's cash shortfall, accrues interest at base + spread, pays
//! commitment fees on undrawn limits, and repays from surplus cash. The
//! base-rate path is a mean-reverting process drawn from its own stream, so
//! leverage costs are reproducible per seed.

use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::rng::RngFactory;

const DT: f64 = 1.0 / 12.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseRateConfig {
    pub initial: f64,
    /// Annual reversion speed.
    pub kappa: f64,
    /// Long-run rate level.
    pub theta: f64,
    /// Annual rate volatility.
    pub vol: f64,
}

impl Default for BaseRateConfig {
    fn default() -> Self {
        BaseRateConfig {
            initial: 0.04,
            kappa: 0.8,
            theta: 0.035,
            vol: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavFacilityConfig {
    pub enabled: bool,
    /// Limit = advance_rate × NAV.
    pub advance_rate: f64,
    pub spread: f64,
    /// Annual fee on the undrawn limit.
    pub commitment_fee_rate: f64,
    /// Outstanding / NAV must stay at or below this.
    pub ltv_max: f64,
    /// Income / debt service must stay at or above this for new draws.
    pub dscr_min: f64,
}

impl Default for NavFacilityConfig {
    fn default() -> Self {
        NavFacilityConfig {
            enabled: true,
            advance_rate: 0.30,
            spread: 0.025,
            commitment_fee_rate: 0.005,
            ltv_max: 0.40,
            dscr_min: 1.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubLineConfig {
    pub enabled: bool,
    /// Limit = advance_rate × uncalled commitments.
    pub advance_rate: f64,
    pub spread: f64,
    pub commitment_fee_rate: f64,
    /// Facility expires after this many months.
    pub term_months: u32,
}

impl Default for SubLineConfig {
    fn default() -> Self {
        SubLineConfig {
            enabled: true,
            advance_rate: 0.50,
            spread: 0.015,
            commitment_fee_rate: 0.0035,
            term_months: 36,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageConfig {
    pub enabled: bool,
    pub nav_facility: NavFacilityConfig,
    pub subscription_line: SubLineConfig,
    pub base_rate: BaseRateConfig,
}

impl Default for LeverageConfig {
    fn default() -> Self {
        LeverageConfig {
            enabled: true,
            nav_facility: NavFacilityConfig::default(),
            subscription_line: SubLineConfig::default(),
            base_rate: BaseRateConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LeverageRow {
    pub month: u32,
    pub base_rate: f64,
    pub draw: f64,
    pub repayment: f64,
    pub interest: f64,
    pub commitment_fee: f64,
    pub outstanding_nav: f64,
    pub outstanding_sub: f64,
    /// Capital called from LPs this month beyond the initial call.
    pub capital_call: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LeverageSchedule {
    pub rows: Vec<LeverageRow>,
    pub total_drawn: f64,
    pub total_interest: f64,
    pub total_commitment_fees: f64,
    pub peak_outstanding: f64,
    /// Peak of outstanding / NAV; guardrails read this.
    pub peak_nav_utilisation: f64,
}

impl LeverageSchedule {
    pub fn row(&self, month: u32) -> Option<&LeverageRow> {
        self.rows.get(month as usize)
    }
}

/// Monthly fund flows the engine nets against facility capacity.
pub struct LeverageInputs<'a> {
    pub committed_capital: f64,
    /// Capital called from LPs at month 0.
    pub initial_call: f64,
    /// Loan originations per month (initial book + reinvestment).
    pub investment_by_month: &'a [f64],
    /// Exit fund proceeds per month.
    pub proceeds_by_month: &'a [f64],
    /// Config-derived fee and expense accruals per month.
    pub expense_by_month: &'a [f64],
    /// NAV proxy series for facility limits and covenants.
    pub nav_by_month: &'a [f64],
}

pub fn simulate_base_rate(
    config: &BaseRateConfig,
    rng: &RngFactory,
    horizon: u32,
    rate_shock_bps: f64,
) -> Vec<f64> {
    let mut stream = rng.stream("leverage/base_rate");
    let mut rates = Vec::with_capacity(horizon as usize + 1);
    let mut r = config.initial;
    rates.push((r + rate_shock_bps / 10_000.0).max(0.0));
    for _ in 1..=horizon {
        let z: f64 = StandardNormal.sample(&mut stream);
        r += config.kappa * (config.theta - r) * DT + config.vol * DT.sqrt() * z;
        r = r.max(0.0);
        rates.push((r + rate_shock_bps / 10_000.0).max(0.0));
    }
    rates
}

pub struct LeverageEngine<'a> {
    config: &'a LeverageConfig,
}

impl<'a> LeverageEngine<'a> {
    pub fn new(config: &'a LeverageConfig) -> Self {
        LeverageEngine { config }
    }

    pub fn run(
        &self,
        rng: &RngFactory,
        horizon: u32,
        inputs: &LeverageInputs<'_>,
        rate_shock_bps: f64,
    ) -> LeverageSchedule {
        let cfg = self.config;
        let mut schedule = LeverageSchedule::default();
        let base_rates = simulate_base_rate(&cfg.base_rate, rng, horizon, rate_shock_bps);

        if !cfg.enabled {
            // No facilities, but the equity call schedule still exists.
            schedule.rows = (0..=horizon)
                .map(|m| LeverageRow {
                    month: m,
                    base_rate: base_rates[m as usize],
                    draw: 0.0,
                    repayment: 0.0,
                    interest: 0.0,
                    commitment_fee: 0.0,
                    outstanding_nav: 0.0,
                    outstanding_sub: 0.0,
                    capital_call: if m == 0 {
                        inputs.initial_call.min(inputs.committed_capital)
                    } else {
                        0.0
                    },
                })
                .collect();
            return schedule;
        }

        let mut cash = 0.0_f64;
        let mut called = 0.0_f64;
        let mut out_nav = 0.0_f64;
        let mut out_sub = 0.0_f64;

        for month in 0..=horizon {
            let m = month as usize;
            let base_rate = base_rates[m];
            let nav = inputs.nav_by_month.get(m).copied().unwrap_or(0.0);

            let mut row = LeverageRow {
                month,
                base_rate,
                draw: 0.0,
                repayment: 0.0,
                interest: 0.0,
                commitment_fee: 0.0,
                outstanding_nav: out_nav,
                outstanding_sub: out_sub,
                capital_call: 0.0,
            };

            if month == 0 {
                called = inputs.initial_call.min(inputs.committed_capital);
                cash += called;
                row.capital_call = called;
            }

            let inflow = inputs.proceeds_by_month.get(m).copied().unwrap_or(0.0);
            let outflow = inputs.investment_by_month.get(m).copied().unwrap_or(0.0)
                + inputs.expense_by_month.get(m).copied().unwrap_or(0.0);
            cash += inflow - outflow;

            // Interest and commitment fees accrue on the opening balance.
            let nav_limit = cfg.nav_facility.advance_rate * nav;
            let sub_limit = if cfg.subscription_line.enabled && month < cfg.subscription_line.term_months
            {
                cfg.subscription_line.advance_rate * (inputs.committed_capital - called).max(0.0)
            } else {
                0.0
            };
            if cfg.nav_facility.enabled {
                row.interest += out_nav * (base_rate + cfg.nav_facility.spread) * DT;
                row.commitment_fee +=
                    (nav_limit - out_nav).max(0.0) * cfg.nav_facility.commitment_fee_rate * DT;
            }
            if sub_limit > 0.0 || out_sub > 0.0 {
                row.interest += out_sub * (base_rate + cfg.subscription_line.spread) * DT;
                row.commitment_fee += (sub_limit - out_sub).max(0.0)
                    * cfg.subscription_line.commitment_fee_rate
                    * DT;
            }
            cash -= row.interest + row.commitment_fee;

            // Shortfall: draw sub line first (cheaper, ramp phase), then the
            // NAV line inside its covenants, then call remaining capital.
            if cash < 0.0 {
                let mut shortfall = -cash;

                let sub_capacity = (sub_limit - out_sub).max(0.0);
                let sub_draw = shortfall.min(sub_capacity);
                out_sub += sub_draw;
                shortfall -= sub_draw;
                row.draw += sub_draw;

                if cfg.nav_facility.enabled && shortfall > 0.0 {
                    let ltv_cap = (cfg.nav_facility.ltv_max * nav - out_nav).max(0.0);
                    let debt_service = row.interest.max(1e-9);
                    let dscr = inflow / debt_service;
                    let dscr_ok = out_nav <= 0.0 || dscr >= cfg.nav_facility.dscr_min;
                    if dscr_ok {
                        let nav_draw = shortfall.min((nav_limit - out_nav).max(0.0)).min(ltv_cap);
                        out_nav += nav_draw;
                        shortfall -= nav_draw;
                        row.draw += nav_draw;
                    }
                }

                if shortfall > 0.0 {
                    let call = shortfall.min((inputs.committed_capital - called).max(0.0));
                    called += call;
                    row.capital_call += call;
                    shortfall -= call;
                }
                cash = -shortfall;
            }

            // Surplus repays outstanding balances, sub line first. Whatever
            // is left is swept out as distributions; the ledger stage
            // records the swept amount, so cash carries no positive balance
            // across months.
            if cash > 0.0 {
                let sub_repay = cash.min(out_sub);
                out_sub -= sub_repay;
                cash -= sub_repay;
                row.repayment += sub_repay;

                let nav_repay = cash.min(out_nav);
                out_nav -= nav_repay;
                cash -= nav_repay;
                row.repayment += nav_repay;

                cash = 0.0;
            }

            row.outstanding_nav = out_nav;
            row.outstanding_sub = out_sub;

            schedule.total_drawn += row.draw;
            schedule.total_interest += row.interest + row.commitment_fee;
            schedule.total_commitment_fees += row.commitment_fee;
            let outstanding = out_nav + out_sub;
            schedule.peak_outstanding = schedule.peak_outstanding.max(outstanding);
            if nav > 0.0 {
                schedule.peak_nav_utilisation =
                    schedule.peak_nav_utilisation.max(out_nav / nav);
            }
            schedule.rows.push(row);
        }

        schedule
    }
}
