//! Guardrail monitor: a fixed rule set evaluated against the completed
//! context. Never raises; every finding is a `Breach` with a severity, and
//! the worst severity is reported without blocking downstream stages.

use serde::{Deserialize, Serialize, Serializer};

use crate::allocator::AllocationResult;
use crate::cashflow::CashflowLedger;
use crate::exits::ExitKind;
use crate::leverage::LeverageSchedule;
use crate::loans::{Loan, LoanShapeConfig};
use crate::price_path::PricePathSet;
use crate::risk::RiskMetrics;
use crate::tls::{Zone, ZoneMap};

/// Severity order: FAIL > WARN > INFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warn,
    Fail,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Fail => "FAIL",
        }
    }

    /// Wire form used on guardrail_violation events.
    pub fn wire_label(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warning",
            Severity::Fail => "error",
        }
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailLayer {
    Loan,
    Zone,
    Portfolio,
    Model,
}

#[derive(Debug, Clone, Serialize)]
pub struct Breach {
    pub code: &'static str,
    pub severity: Severity,
    pub value: f64,
    pub threshold: f64,
    pub layer: GuardrailLayer,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GuardrailReport {
    pub breaches: Vec<Breach>,
}

impl GuardrailReport {
    /// Max severity over breaches; `None` when the book is clean.
    pub fn worst_level(&self) -> Option<Severity> {
        self.breaches.iter().map(|b| b.severity).max()
    }

    pub fn has_fail(&self) -> bool {
        self.worst_level() == Some(Severity::Fail)
    }

    fn push(
        &mut self,
        code: &'static str,
        severity: Severity,
        value: f64,
        threshold: f64,
        layer: GuardrailLayer,
        message: String,
    ) {
        self.breaches.push(Breach {
            code,
            severity,
            value,
            threshold,
            layer,
            message,
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Tolerance band over a zone cap before WARN escalates to FAIL.
    pub zone_weight_tolerance: f64,
    pub zone_hhi_warn: f64,
    pub zone_hhi_fail: f64,
    /// Defaulted principal as a fraction of invested principal.
    pub default_rate_warn: f64,
    pub default_rate_fail: f64,
    /// Peak NAV-line utilisation relative to the covenant at which to warn.
    pub leverage_warn_ratio: f64,
    pub suburb_hhi_warn: f64,
    /// Peak aggregate loan-to-value of the active book (principal over
    /// marked property value).
    pub portfolio_ltv_warn: f64,
    pub portfolio_ltv_fail: f64,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        GuardrailConfig {
            zone_weight_tolerance: 0.02,
            zone_hhi_warn: 0.55,
            zone_hhi_fail: 0.75,
            default_rate_warn: 0.08,
            default_rate_fail: 0.20,
            leverage_warn_ratio: 0.85,
            suburb_hhi_warn: 0.15,
            portfolio_ltv_warn: 0.52,
            portfolio_ltv_fail: 0.57,
        }
    }
}

/// Everything the evaluator reads; stages upstream have already completed.
pub struct GuardrailInputs<'a> {
    pub loans: &'a [Loan],
    pub shape: &'a LoanShapeConfig,
    pub allocation: &'a AllocationResult,
    pub caps: &'a ZoneMap<f64>,
    pub paths: &'a PricePathSet,
    pub ledger: &'a CashflowLedger,
    pub leverage: &'a LeverageSchedule,
    pub risk: &'a RiskMetrics,
    pub hurdle_rate: f64,
    pub nav_ltv_covenant: f64,
    pub fund_term_months: u32,
}

pub fn evaluate(config: &GuardrailConfig, inputs: &GuardrailInputs<'_>) -> GuardrailReport {
    let mut report = GuardrailReport::default();
    loan_rules(&mut report, inputs);
    zone_rules(&mut report, config, inputs);
    portfolio_rules(&mut report, config, inputs);
    model_rules(&mut report, config, inputs);
    report
}

fn loan_rules(report: &mut GuardrailReport, inputs: &GuardrailInputs<'_>) {
    let shape = inputs.shape;

    let ltv_violations = inputs
        .loans
        .iter()
        .filter(|l| l.ltv > shape.max_ltv + 1e-9 || l.ltv <= 0.0)
        .count();
    if ltv_violations > 0 {
        report.push(
            "LOAN_LTV_RANGE",
            Severity::Fail,
            ltv_violations as f64,
            0.0,
            GuardrailLayer::Loan,
            format!("{ltv_violations} loans breach the LTV bounds"),
        );
    }

    let size_violations = inputs
        .loans
        .iter()
        .filter(|l| l.principal < shape.min_size - 1e-6 || l.principal > shape.max_size + 1e-6)
        .count();
    if size_violations > 0 {
        report.push(
            "LOAN_SIZE_RANGE",
            Severity::Fail,
            size_violations as f64,
            0.0,
            GuardrailLayer::Loan,
            format!("{size_violations} loans outside the configured size range"),
        );
    }

    let term_violations = inputs
        .loans
        .iter()
        .filter(|l| {
            let exit = l.exit_month.unwrap_or(l.origination_month + l.term_months);
            exit > inputs.fund_term_months || exit < l.origination_month
        })
        .count();
    if term_violations > 0 {
        report.push(
            "LOAN_TERM_BOUNDS",
            Severity::Fail,
            term_violations as f64,
            inputs.fund_term_months as f64,
            GuardrailLayer::Loan,
            format!("{term_violations} loans exit outside the fund term"),
        );
    }
}

fn zone_rules(
    report: &mut GuardrailReport,
    config: &GuardrailConfig,
    inputs: &GuardrailInputs<'_>,
) {
    if let Some(actual) = &inputs.allocation.actual {
        for zone in Zone::all() {
            let weight = *actual.get(zone);
            let cap = *inputs.caps.get(zone);
            if weight > cap + config.zone_weight_tolerance {
                report.push(
                    "ZONE_WEIGHT_CAP",
                    Severity::Fail,
                    weight,
                    cap,
                    GuardrailLayer::Zone,
                    format!(
                        "{} weight {:.1}% exceeds cap {:.1}%",
                        zone.name(),
                        weight * 100.0,
                        cap * 100.0
                    ),
                );
            } else if weight > cap {
                report.push(
                    "ZONE_WEIGHT_CAP",
                    Severity::Warn,
                    weight,
                    cap,
                    GuardrailLayer::Zone,
                    format!(
                        "{} weight {:.1}% is over cap within tolerance",
                        zone.name(),
                        weight * 100.0
                    ),
                );
            }
        }
    }

    if let Some(hhi) = inputs.risk.hhi_zone {
        if hhi > config.zone_hhi_fail {
            report.push(
                "ZONE_HHI",
                Severity::Fail,
                hhi,
                config.zone_hhi_fail,
                GuardrailLayer::Zone,
                format!("zone concentration HHI {hhi:.3} above hard limit"),
            );
        } else if hhi > config.zone_hhi_warn {
            report.push(
                "ZONE_HHI",
                Severity::Warn,
                hhi,
                config.zone_hhi_warn,
                GuardrailLayer::Zone,
                format!("zone concentration HHI {hhi:.3} elevated"),
            );
        }
    }

    if let Some(hhi) = inputs.risk.hhi_suburb {
        if hhi > config.suburb_hhi_warn {
            report.push(
                "SUBURB_HHI",
                Severity::Warn,
                hhi,
                config.suburb_hhi_warn,
                GuardrailLayer::Zone,
                format!("suburb concentration HHI {hhi:.3} elevated"),
            );
        }
    }
}

fn portfolio_rules(
    report: &mut GuardrailReport,
    config: &GuardrailConfig,
    inputs: &GuardrailInputs<'_>,
) {
    let invested: f64 = inputs.loans.iter().map(|l| l.principal).sum();
    if invested > 0.0 {
        let defaulted: f64 = inputs
            .loans
            .iter()
            .filter(|l| l.exit_kind == Some(ExitKind::Default))
            .map(|l| l.principal)
            .sum();
        let rate = defaulted / invested;
        if rate > config.default_rate_fail {
            report.push(
                "PORTFOLIO_DEFAULT_RATE",
                Severity::Fail,
                rate,
                config.default_rate_fail,
                GuardrailLayer::Portfolio,
                format!("defaulted principal {:.1}% of the book", rate * 100.0),
            );
        } else if rate > config.default_rate_warn {
            report.push(
                "PORTFOLIO_DEFAULT_RATE",
                Severity::Warn,
                rate,
                config.default_rate_warn,
                GuardrailLayer::Portfolio,
                format!("defaulted principal {:.1}% of the book", rate * 100.0),
            );
        }
    }

    // Return-quality rules only apply to a populated book; an empty
    // portfolio is a boundary case, not a performance failure.
    if inputs.loans.is_empty() {
        return;
    }

    let summary = &inputs.ledger.summary;
    if let Some(multiple) = summary.equity_multiple {
        if multiple < 1.0 {
            report.push(
                "PORTFOLIO_EQUITY_MULTIPLE",
                Severity::Fail,
                multiple,
                1.0,
                GuardrailLayer::Portfolio,
                format!("equity multiple {multiple:.2} below 1.0"),
            );
        }
    }
    match summary.irr {
        Some(irr) if irr < inputs.hurdle_rate => {
            report.push(
                "PORTFOLIO_IRR_HURDLE",
                Severity::Warn,
                irr,
                inputs.hurdle_rate,
                GuardrailLayer::Portfolio,
                format!(
                    "IRR {:.2}% below the {:.2}% hurdle",
                    irr * 100.0,
                    inputs.hurdle_rate * 100.0
                ),
            );
        }
        Some(_) => {}
        None => {
            report.push(
                "PORTFOLIO_IRR_UNDEFINED",
                Severity::Info,
                0.0,
                0.0,
                GuardrailLayer::Portfolio,
                summary
                    .irr_diagnostic
                    .clone()
                    .unwrap_or_else(|| "IRR not computable".to_string()),
            );
        }
    }

    // Aggregate LTV of the active book, marked to the simulated prices.
    // A price shock pushes this through the stressed-LTV limits.
    let mut peak_ltv = 0.0_f64;
    for month in 0..=inputs.fund_term_months {
        let mut principal = 0.0_f64;
        let mut value = 0.0_f64;
        for loan in inputs.loans.iter().filter(|l| l.is_active(month)) {
            principal += loan.principal;
            value += loan.property_value_at_origination()
                * inputs
                    .paths
                    .property_growth(loan.zone, loan.property_id, loan.origination_month, month);
        }
        if value > 0.0 {
            peak_ltv = peak_ltv.max(principal / value);
        }
    }
    if peak_ltv > config.portfolio_ltv_fail {
        report.push(
            "PORTFOLIO_STRESSED_LTV",
            Severity::Fail,
            peak_ltv,
            config.portfolio_ltv_fail,
            GuardrailLayer::Portfolio,
            format!("peak book LTV {:.1}% above hard limit", peak_ltv * 100.0),
        );
    } else if peak_ltv > config.portfolio_ltv_warn {
        report.push(
            "PORTFOLIO_STRESSED_LTV",
            Severity::Warn,
            peak_ltv,
            config.portfolio_ltv_warn,
            GuardrailLayer::Portfolio,
            format!("peak book LTV {:.1}% elevated", peak_ltv * 100.0),
        );
    }

    let utilisation = inputs.leverage.peak_nav_utilisation;
    let covenant = inputs.nav_ltv_covenant;
    if covenant > 0.0 {
        if utilisation > covenant {
            report.push(
                "PORTFOLIO_LEVERAGE",
                Severity::Fail,
                utilisation,
                covenant,
                GuardrailLayer::Portfolio,
                format!(
                    "NAV-line utilisation {:.1}% breached the {:.1}% covenant",
                    utilisation * 100.0,
                    covenant * 100.0
                ),
            );
        } else if utilisation > covenant * config.leverage_warn_ratio {
            report.push(
                "PORTFOLIO_LEVERAGE",
                Severity::Warn,
                utilisation,
                covenant * config.leverage_warn_ratio,
                GuardrailLayer::Portfolio,
                format!(
                    "NAV-line utilisation {:.1}% close to covenant",
                    utilisation * 100.0
                ),
            );
        }
    }
}

fn model_rules(
    report: &mut GuardrailReport,
    _config: &GuardrailConfig,
    inputs: &GuardrailInputs<'_>,
) {
    for zone in Zone::all() {
        let path = inputs.paths.zone_index.get(zone);
        if path.first().copied() != Some(1.0) || path.iter().any(|&p| p <= 0.0) {
            report.push(
                "MODEL_PRICE_SANITY",
                Severity::Fail,
                0.0,
                0.0,
                GuardrailLayer::Model,
                format!("{} price index violates positivity/base invariants", zone.name()),
            );
        }
    }

    for diagnostic in &inputs.risk.diagnostics {
        report.push(
            "MODEL_NUMERIC_DIAGNOSTIC",
            Severity::Warn,
            0.0,
            0.0,
            GuardrailLayer::Model,
            diagnostic.clone(),
        );
    }
}

/// Monte Carlo aggregation: fraction of paths whose worst level is FAIL.
pub fn fail_rate(reports: &[&GuardrailReport]) -> f64 {
    if reports.is_empty() {
        return 0.0;
    }
    let fails = reports.iter().filter(|r| r.has_fail()).count();
    fails as f64 / reports.len() as f64
}
