//! Exit simulator: when each loan leaves the book, how, and for how much.
//!
//! For every month of a loan's life the instantaneous exit hazard is a
//! weighted sum of a time factor (age beyond minimum hold), a price factor
//! (appreciation since origination) and an economic factor (market state).
//! The exit month is the first month a Bernoulli draw fires; otherwise the
//! loan runs to term. Conditional on exiting, the kind is drawn from a
//! categorical over sale / refinance / default whose weights are tilted by
//! the same factors. Each loan draws from its own `exit/loan/{id}` stream.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::loans::Loan;
use crate::price_path::PricePathSet;
use crate::rng::RngFactory;
use crate::tls::{TlsCatalogue, ZoneMap, ZoneParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitKind {
    Sale,
    Refinance,
    Default,
    Term,
}

impl ExitKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExitKind::Sale => "sale",
            ExitKind::Refinance => "refinance",
            ExitKind::Default => "default",
            ExitKind::Term => "term",
        }
    }
}

/// One exit per loan.
#[derive(Debug, Clone, Serialize)]
pub struct ExitEvent {
    pub loan_id: u64,
    pub month: u32,
    pub kind: ExitKind,
    /// Proceeds of the underlying transaction (sale price, refi payoff,
    /// recovery before costs).
    pub gross_proceeds: f64,
    /// Principal + simple interest + appreciation share, or recovery net of
    /// foreclosure costs for defaults. What the fund actually receives.
    pub fund_proceeds: f64,
}

/// How the fund's share of appreciation is computed at exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AppreciationShare {
    /// share_rate × ltv × appreciation.
    ProRataLtv,
    /// Share keyed to total appreciation over the holding period; tiers
    /// sorted ascending by threshold, last matching tier wins.
    Tiered { tiers: Vec<ShareTier> },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShareTier {
    /// Total appreciation (Vm/V0 − 1) at or above which this share applies.
    pub threshold: f64,
    pub share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    /// Hazard floor applied every eligible month.
    pub base_hazard: f64,
    /// Hazard ceiling; the weighted sum is clamped here.
    pub max_hazard: f64,
    pub time_weight: f64,
    pub price_weight: f64,
    pub econ_weight: f64,
    /// Months over which the time factor ramps from 0 to 1 past min hold.
    pub time_ramp_months: u32,
    /// Appreciation at which the price factor saturates at 1.
    pub price_saturation: f64,
    /// Sensitivity of the economic factor to trailing market return.
    pub econ_sensitivity: f64,
    /// Exit-kind weights before factor tilts.
    pub sale_weight: f64,
    pub refi_weight: f64,
    pub default_weight: f64,
    /// Dampens refinance when rates are shocked upward.
    pub refi_rate_sensitivity: f64,
    pub appreciation_share: AppreciationShare,
}

impl Default for ExitConfig {
    fn default() -> Self {
        ExitConfig {
            base_hazard: 0.002,
            max_hazard: 0.12,
            time_weight: 0.04,
            price_weight: 0.03,
            econ_weight: 0.02,
            time_ramp_months: 48,
            price_saturation: 0.5,
            econ_sensitivity: 2.0,
            sale_weight: 0.55,
            refi_weight: 0.30,
            default_weight: 0.15,
            refi_rate_sensitivity: 0.5,
            appreciation_share: AppreciationShare::ProRataLtv,
        }
    }
}

pub struct ExitSimulator<'a> {
    config: &'a ExitConfig,
    zones: &'a ZoneMap<ZoneParams>,
    paths: &'a PricePathSet,
    tls: &'a TlsCatalogue,
    min_hold_months: u32,
    /// Stress tilts; identity when no shock is applied.
    pd_multiplier: f64,
    rate_shock_bps: f64,
}

impl<'a> ExitSimulator<'a> {
    pub fn new(
        config: &'a ExitConfig,
        zones: &'a ZoneMap<ZoneParams>,
        paths: &'a PricePathSet,
        tls: &'a TlsCatalogue,
        min_hold_months: u32,
        pd_multiplier: Option<f64>,
        rate_shock_bps: Option<f64>,
    ) -> Self {
        ExitSimulator {
            config,
            zones,
            paths,
            tls,
            min_hold_months,
            pd_multiplier: pd_multiplier.unwrap_or(1.0),
            rate_shock_bps: rate_shock_bps.unwrap_or(0.0),
        }
    }

    /// Simulate the exit for one loan, writing the exit fields onto the loan
    /// and returning the event. Exactly one event per loan.
    pub fn simulate_loan(
        &self,
        rng: &RngFactory,
        loan: &mut Loan,
    ) -> Result<ExitEvent, SimError> {
        let mut stream = rng.stream(&format!("exit/loan/{}", loan.id));
        let horizon = self.paths.horizon_months;
        let term_end = (loan.origination_month + loan.term_months).min(horizon);

        let mut exit_month = term_end;
        let mut fired = false;
        for month in (loan.origination_month + 1)..=term_end {
            let hazard = self.hazard(loan, month);
            let u: f64 = stream.gen();
            if u < hazard {
                exit_month = month;
                fired = true;
                break;
            }
        }

        let kind = if fired {
            self.draw_kind(loan, exit_month, &mut stream)?
        } else {
            ExitKind::Term
        };

        let event = self.settle(loan, exit_month, kind)?;
        loan.exit_month = Some(exit_month);
        loan.exit_kind = Some(kind);
        loan.exit_value = Some(event.fund_proceeds);
        Ok(event)
    }

    /// Instantaneous monthly exit hazard.
    fn hazard(&self, loan: &Loan, month: u32) -> f64 {
        let cfg = self.config;
        let age = month - loan.origination_month;

        let time_factor = if age <= self.min_hold_months {
            0.0
        } else {
            ((age - self.min_hold_months) as f64 / cfg.time_ramp_months.max(1) as f64).min(1.0)
        };

        let growth = self
            .paths
            .property_growth(loan.zone, loan.property_id, loan.origination_month, month);
        let price_factor = ((growth - 1.0).max(0.0) / cfg.price_saturation).min(1.0);

        let econ_factor = self.econ_factor(month);

        (cfg.base_hazard
            + cfg.time_weight * time_factor
            + cfg.price_weight * price_factor
            + cfg.econ_weight * econ_factor)
            .clamp(0.0, cfg.max_hazard)
    }

    /// Macro state in [0, 1] from the trailing 12-month market return.
    fn econ_factor(&self, month: u32) -> f64 {
        let lookback = month.min(12);
        if lookback == 0 {
            return 0.5;
        }
        let now = self.paths.market_index[month as usize];
        let then = self.paths.market_index[(month - lookback) as usize];
        let trailing = now / then - 1.0;
        (0.5 + self.config.econ_sensitivity * trailing).clamp(0.0, 1.0)
    }

    fn draw_kind(
        &self,
        loan: &Loan,
        month: u32,
        stream: &mut rand::rngs::StdRng,
    ) -> Result<ExitKind, SimError> {
        let cfg = self.config;
        let params = self.zones.get(loan.zone);
        let suburb = self.tls.suburb(loan.suburb_id)?;

        let growth = self
            .paths
            .property_growth(loan.zone, loan.property_id, loan.origination_month, month);
        let appreciation_factor = (growth - 1.0).max(0.0);
        let econ = self.econ_factor(month);

        let rate_damp = 1.0 / (1.0 + cfg.refi_rate_sensitivity * (self.rate_shock_bps / 100.0).max(0.0));

        let w_sale = cfg.sale_weight * (0.5 + appreciation_factor) * suburb.liquidity_score;
        let w_refi = cfg.refi_weight * rate_damp;
        // Defaults scale with zone PD and a weakening macro state.
        let w_default =
            cfg.default_weight * params.default_rate * 12.0 * self.pd_multiplier * (1.5 - econ);

        let total = w_sale + w_refi + w_default;
        if total <= 0.0 {
            return Ok(ExitKind::Sale);
        }
        let u: f64 = stream.gen::<f64>() * total;
        Ok(if u < w_sale {
            ExitKind::Sale
        } else if u < w_sale + w_refi {
            ExitKind::Refinance
        } else {
            ExitKind::Default
        })
    }

    /// Compute gross and fund proceeds for an exit at `month`.
    fn settle(&self, loan: &mut Loan, month: u32, kind: ExitKind) -> Result<ExitEvent, SimError> {
        let params = self.zones.get(loan.zone);
        let v0 = loan.property_value_at_origination();
        let growth = self
            .paths
            .property_growth(loan.zone, loan.property_id, loan.origination_month, month);
        let vm = v0 * growth;

        let held_years = (month - loan.origination_month) as f64 / 12.0;
        let interest = loan.principal * loan.rate * held_years;
        let appreciation = (vm - v0).max(0.0);
        let share = self.appreciation_share_amount(loan, v0, vm, appreciation);

        let (gross, fund) = match kind {
            ExitKind::Sale | ExitKind::Term => (vm, loan.principal + interest + share),
            // Appreciation share is still due on refinance, per product terms.
            ExitKind::Refinance => {
                let payoff = loan.principal + interest + share;
                (payoff, payoff)
            }
            ExitKind::Default => {
                let recovery = params.recovery_rate * vm;
                loan.recovery_value = Some(recovery);
                let net = (recovery - params.foreclosure_cost_rate * vm).max(0.0);
                (recovery, net)
            }
        };

        Ok(ExitEvent {
            loan_id: loan.id,
            month,
            kind,
            gross_proceeds: gross,
            fund_proceeds: fund,
        })
    }

    fn appreciation_share_amount(
        &self,
        loan: &Loan,
        v0: f64,
        vm: f64,
        appreciation: f64,
    ) -> f64 {
        match &self.config.appreciation_share {
            AppreciationShare::ProRataLtv => {
                loan.appreciation_share_rate * appreciation * loan.ltv
            }
            AppreciationShare::Tiered { tiers } => {
                let total_appreciation = vm / v0 - 1.0;
                let mut share = 0.0;
                for tier in tiers {
                    if total_appreciation >= tier.threshold {
                        share = tier.share;
                    }
                }
                share * appreciation
            }
        }
    }
}
