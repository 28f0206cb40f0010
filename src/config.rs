//! Top-level configuration: validated up front, immutable afterwards.
//!
//! JSON in, one `Config` out. Every field carries a schema default through
//! its `Default` impl, so a config file only names what it overrides; there
//! are no hidden defaults applied later in the pipeline. `validate` runs
//! before any stage and collects every problem it finds, not just the
//! first.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::allocator;
use crate::error::SimError;
use crate::exits::ExitConfig;
use crate::fees::FeeConfig;
use crate::guardrails::GuardrailConfig;
use crate::leverage::LeverageConfig;
use crate::loans::LoanShapeConfig;
use crate::price_path::{PricePathConfig, PricePathModel};
use crate::reinvest::ReinvestConfig;
use crate::risk::{RiskConfig, StressShock};
use crate::tls::{CatalogueConfig, ZoneMap, ZoneParams};
use crate::waterfall::{WaterfallParams, WaterfallStructure};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundConfig {
    /// Committed capital in dollars.
    pub fund_size: f64,
    pub term_years: u32,
    /// Vintage year, for reporting.
    pub vintage_year: i32,
    /// Annual preferred return to LPs.
    pub hurdle_rate: f64,
    /// GP share of profits above the hurdle.
    pub carry_rate: f64,
    /// GP share of the catch-up tier; 1.0 is a full catch-up.
    pub catchup_rate: f64,
    /// GP commitment as a fraction of fund size.
    pub gp_commitment_rate: f64,
    pub waterfall_structure: WaterfallStructure,
}

impl Default for FundConfig {
    fn default() -> Self {
        FundConfig {
            fund_size: 10_000_000.0,
            term_years: 10,
            vintage_year: 2024,
            hurdle_rate: 0.08,
            carry_rate: 0.20,
            catchup_rate: 1.0,
            gp_commitment_rate: 0.02,
            waterfall_structure: WaterfallStructure::European,
        }
    }
}

impl FundConfig {
    pub fn term_months(&self) -> u32 {
        self.term_years * 12
    }
}

fn default_zone_allocations() -> ZoneMap<f64> {
    ZoneMap {
        green: 0.6,
        orange: 0.3,
        red: 0.1,
    }
}

fn default_zone_caps() -> ZoneMap<f64> {
    ZoneMap {
        green: 1.0,
        orange: 0.5,
        red: 0.15,
    }
}

fn default_zone_params() -> ZoneMap<ZoneParams> {
    ZoneMap {
        green: ZoneParams {
            appreciation_mean: 0.05,
            appreciation_vol: 0.08,
            default_rate: 0.01,
            recovery_rate: 0.85,
            foreclosure_cost_rate: 0.08,
        },
        orange: ZoneParams {
            appreciation_mean: 0.04,
            appreciation_vol: 0.12,
            default_rate: 0.02,
            recovery_rate: 0.80,
            foreclosure_cost_rate: 0.10,
        },
        red: ZoneParams {
            appreciation_mean: 0.03,
            appreciation_vol: 0.18,
            default_rate: 0.04,
            recovery_rate: 0.70,
            foreclosure_cost_rate: 0.12,
        },
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fund: FundConfig,
    pub loans: LoanShapeConfig,
    pub zone_allocations: ZoneMap<f64>,
    pub zone_caps: ZoneMap<f64>,
    pub zones: ZoneMap<ZoneParams>,
    pub price_paths: PricePathConfig,
    pub exits: ExitConfig,
    pub reinvestment: ReinvestConfig,
    pub leverage: LeverageConfig,
    pub fees: FeeConfig,
    pub risk: RiskConfig,
    pub guardrails: GuardrailConfig,
    pub catalogue: CatalogueConfig,
    pub seed: u64,
    /// Set on stress-variant re-runs; stages apply the shock on top of the
    /// base parameters.
    pub applied_shock: Option<StressShock>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fund: FundConfig::default(),
            loans: LoanShapeConfig::default(),
            zone_allocations: default_zone_allocations(),
            zone_caps: default_zone_caps(),
            zones: default_zone_params(),
            price_paths: PricePathConfig::default(),
            exits: ExitConfig::default(),
            reinvestment: ReinvestConfig::default(),
            leverage: LeverageConfig::default(),
            fees: FeeConfig::default(),
            risk: RiskConfig::default(),
            guardrails: GuardrailConfig::default(),
            catalogue: CatalogueConfig::default(),
            seed: 42,
            applied_shock: None,
        }
    }
}

impl Config {
    /// The S1 smoke preset: $10M, 10-year term, 60/30/10 allocation.
    pub fn smoke_10m() -> Self {
        Config::default()
    }

    /// The documented $100M preset: tighter red-zone cap, NAV-basis
    /// management fee from year 5, American-ready catch-up terms.
    pub fn fund_100m() -> Self {
        let mut config = Config::default();
        config.fund.fund_size = 100_000_000.0;
        config.fund.gp_commitment_rate = 0.03;
        config.zone_allocations = ZoneMap {
            green: 0.60,
            orange: 0.35,
            red: 0.05,
        };
        config.zone_caps = ZoneMap {
            green: 1.0,
            orange: 0.45,
            red: 0.05,
        };
        config.loans.avg_size = 400_000.0;
        config.loans.max_size = 1_200_000.0;
        config.catalogue.suburbs_per_zone = 40;
        config.catalogue.properties_per_suburb = 60;
        config.fees.fee_steps = vec![crate::fees::FeeStep {
            from_month: 60,
            annual_rate: 0.015,
        }];
        config.seed = 7;
        config
    }

    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| SimError::config(format!("schema violation: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, SimError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SimError::config(format!("cannot read {}: {e}", path.display())))?;
        Config::from_json_str(&raw)
    }

    pub fn term_months(&self) -> u32 {
        self.fund.term_months()
    }

    pub fn waterfall_params(&self) -> WaterfallParams {
        WaterfallParams {
            structure: self.fund.waterfall_structure,
            hurdle_rate: self.fund.hurdle_rate,
            carry_rate: self.fund.carry_rate,
            catchup_rate: self.fund.catchup_rate,
            gp_commitment_rate: self.fund.gp_commitment_rate,
        }
    }

    /// Validate every group; all problems are reported together.
    pub fn validate(&self) -> Result<(), SimError> {
        let mut problems: Vec<String> = Vec::new();

        let fund = &self.fund;
        if fund.fund_size <= 0.0 {
            problems.push(format!("fund_size must be positive, got {}", fund.fund_size));
        }
        if fund.term_years == 0 || fund.term_years > 30 {
            problems.push(format!("term_years must be in 1..=30, got {}", fund.term_years));
        }
        if !(0.0..1.0).contains(&fund.hurdle_rate) {
            problems.push(format!("hurdle_rate must be in [0, 1), got {}", fund.hurdle_rate));
        }
        if !(0.0..1.0).contains(&fund.carry_rate) {
            problems.push(format!("carry_rate must be in [0, 1), got {}", fund.carry_rate));
        }
        if !(0.0..=1.0).contains(&fund.catchup_rate) {
            problems.push(format!("catchup_rate must be in [0, 1], got {}", fund.catchup_rate));
        }
        if !(0.0..=0.5).contains(&fund.gp_commitment_rate) {
            problems.push(format!(
                "gp_commitment_rate must be in [0, 0.5], got {}",
                fund.gp_commitment_rate
            ));
        }

        let loans = &self.loans;
        if loans.min_size <= 0.0 || loans.min_size > loans.avg_size || loans.avg_size > loans.max_size
        {
            problems.push(format!(
                "loan sizes must satisfy 0 < min <= avg <= max, got {}/{}/{}",
                loans.min_size, loans.avg_size, loans.max_size
            ));
        }
        if loans.size_std <= 0.0 || loans.ltv_std <= 0.0 || loans.term_std_months <= 0.0 {
            problems.push("loan draw standard deviations must be positive".to_string());
        }
        if !(0.0 < loans.min_ltv && loans.min_ltv <= loans.avg_ltv && loans.avg_ltv <= loans.max_ltv
            && loans.max_ltv <= 1.0)
        {
            problems.push(format!(
                "ltv bounds must satisfy 0 < min <= avg <= max <= 1, got {}/{}/{}",
                loans.min_ltv, loans.avg_ltv, loans.max_ltv
            ));
        }
        if loans.avg_term_months < 1.0 {
            problems.push("avg_term_months must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&loans.appreciation_share_rate) {
            problems.push("appreciation_share_rate must be in [0, 1]".to_string());
        }

        if let Err(e) = allocator::validate_fractions(&self.zone_allocations, &self.zone_caps) {
            problems.push(e.to_string());
        }

        for (zone, params) in self.zones.iter() {
            if params.appreciation_vol <= 0.0 {
                problems.push(format!("{} appreciation_vol must be positive", zone.name()));
            }
            if !(0.0..=1.0).contains(&params.default_rate) {
                problems.push(format!("{} default_rate must be in [0, 1]", zone.name()));
            }
            if !(0.0..=1.0).contains(&params.recovery_rate) {
                problems.push(format!("{} recovery_rate must be in [0, 1]", zone.name()));
            }
            if !(0.0..=1.0).contains(&params.foreclosure_cost_rate) {
                problems.push(format!("{} foreclosure_cost_rate must be in [0, 1]", zone.name()));
            }
        }

        let c = &self.price_paths.correlation;
        for i in 0..3 {
            if (c[i][i] - 1.0).abs() > 1e-9 {
                problems.push(format!("correlation diagonal [{i}][{i}] must be 1"));
            }
            for j in 0..3 {
                if (c[i][j] - c[j][i]).abs() > 1e-9 {
                    problems.push(format!("correlation matrix not symmetric at [{i}][{j}]"));
                }
                if c[i][j].abs() > 1.0 + 1e-9 {
                    problems.push(format!("correlation [{i}][{j}] outside [-1, 1]"));
                }
            }
        }
        match &self.price_paths.model {
            PricePathModel::Gbm => {}
            PricePathModel::MeanReverting { kappa, .. } => {
                if *kappa <= 0.0 {
                    problems.push("mean-reverting kappa must be positive".to_string());
                }
            }
            PricePathModel::RegimeSwitching {
                p_bull_to_bear,
                p_bear_to_bull,
                ..
            } => {
                if !(0.0..=1.0).contains(p_bull_to_bear) || !(0.0..=1.0).contains(p_bear_to_bull) {
                    problems.push("regime transition probabilities must be in [0, 1]".to_string());
                }
            }
        }

        let exits = &self.exits;
        if exits.sale_weight < 0.0 || exits.refi_weight < 0.0 || exits.default_weight < 0.0 {
            problems.push("exit kind weights must be non-negative".to_string());
        }
        if !(exits.max_hazard > 0.0 && exits.max_hazard <= 1.0) {
            problems.push(format!("max_hazard must be in (0, 1], got {}", exits.max_hazard));
        }
        if exits.base_hazard < 0.0 {
            problems.push("base_hazard must be non-negative".to_string());
        }
        if let crate::exits::AppreciationShare::Tiered { tiers } = &exits.appreciation_share {
            if tiers.is_empty() {
                problems.push("tiered appreciation share needs at least one tier".to_string());
            }
            if tiers.windows(2).any(|w| w[0].threshold > w[1].threshold) {
                problems.push("appreciation share tiers must be sorted by threshold".to_string());
            }
        }

        let reinvest = &self.reinvestment;
        if !(0.0..1.0).contains(&reinvest.reserve_rate) {
            problems.push("reinvestment reserve_rate must be in [0, 1)".to_string());
        }
        if reinvest.horizon_months > self.term_months() {
            problems.push(format!(
                "reinvestment horizon {} exceeds fund term {}",
                reinvest.horizon_months,
                self.term_months()
            ));
        }

        let lev = &self.leverage;
        if !(0.0..=1.0).contains(&lev.nav_facility.advance_rate)
            || !(0.0..=1.0).contains(&lev.subscription_line.advance_rate)
        {
            problems.push("facility advance rates must be in [0, 1]".to_string());
        }
        if lev.nav_facility.spread < 0.0 || lev.subscription_line.spread < 0.0 {
            problems.push("facility spreads must be non-negative".to_string());
        }

        let fees = &self.fees;
        if !(0.0..=0.1).contains(&fees.management_fee_rate) {
            problems.push("management_fee_rate must be in [0, 0.1]".to_string());
        }
        for share in [
            fees.allocation.management_lp_share,
            fees.allocation.expense_lp_share,
            fees.allocation.transaction_lp_share,
        ] {
            if !(0.0..=1.0).contains(&share) {
                problems.push("fee allocation LP shares must be in [0, 1]".to_string());
            }
        }

        if !(0.5..1.0).contains(&self.risk.var_confidence) {
            problems.push(format!(
                "var_confidence must be in [0.5, 1), got {}",
                self.risk.var_confidence
            ));
        }

        if self.catalogue.suburbs_per_zone == 0 || self.catalogue.properties_per_suburb == 0 {
            problems.push("catalogue must have at least one suburb and property per zone".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SimError::config(problems.join("; ")))
        }
    }
}
