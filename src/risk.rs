//! Risk module: volatility, ratio metrics, VaR/CVaR, drawdown,
//! concentration, and the deterministic stress catalogue.
//!
//! Single-path mode uses the analytic lognormal approximation for VaR/CVaR;
//! the empirical variants require the Monte Carlo distribution and are
//! reported as absent here with `requires_mc` markers. Numeric failures
//! never abort the stage: the affected metric is absent and a diagnostic is
//! recorded.

use serde::{Deserialize, Serialize};

use crate::cashflow::CashflowLedger;
use crate::loans::Loan;
use crate::tls::{Zone, ZoneMap};

/// One deterministic shock, applied to a re-run of the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressShock {
    pub name: String,
    /// Multiplicative price shock, e.g. -0.30 for a 30% drop.
    #[serde(default)]
    pub price_shock_pct: Option<f64>,
    /// Parallel shift of the leverage base rate, in basis points.
    #[serde(default)]
    pub rate_shock_bps: Option<f64>,
    /// Multiplier on default propensity.
    #[serde(default)]
    pub pd_multiplier: Option<f64>,
}

impl StressShock {
    /// The standard shock catalogue run by the stress stage.
    pub fn standard_catalogue() -> Vec<StressShock> {
        vec![
            StressShock {
                name: "price_down_30".into(),
                price_shock_pct: Some(-0.30),
                rate_shock_bps: None,
                pd_multiplier: None,
            },
            StressShock {
                name: "rates_up_200".into(),
                price_shock_pct: None,
                rate_shock_bps: Some(200.0),
                pd_multiplier: None,
            },
            StressShock {
                name: "defaults_x2".into(),
                price_shock_pct: None,
                rate_shock_bps: None,
                pd_multiplier: Some(2.0),
            },
            StressShock {
                name: "combined_downturn".into(),
                price_shock_pct: Some(-0.20),
                rate_shock_bps: Some(150.0),
                pd_multiplier: Some(1.5),
            },
        ]
    }
}

/// Outcome of one stress re-run, compared against the baseline path.
#[derive(Debug, Clone, Serialize)]
pub struct StressOutcome {
    pub name: String,
    pub irr: Option<f64>,
    pub equity_multiple: Option<f64>,
    pub irr_delta_vs_base: Option<f64>,
    pub guardrail_fail: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// VaR confidence level, e.g. 0.95.
    pub var_confidence: f64,
    pub risk_free_rate: f64,
    /// Shocks evaluated by the stress stage; empty uses the standard
    /// catalogue.
    #[serde(default)]
    pub stress: Vec<StressShock>,
    /// Run the stress catalogue as part of the pipeline.
    pub run_stress_tests: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            var_confidence: 0.95,
            risk_free_rate: 0.03,
            stress: Vec::new(),
            run_stress_tests: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RiskMetrics {
    pub volatility: Option<f64>,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    pub calmar: Option<f64>,
    pub max_drawdown: Option<f64>,
    /// Analytic VaR/CVaR as a fraction of NAV, lognormal approximation.
    pub var: Option<f64>,
    pub cvar: Option<f64>,
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub hhi_zone: Option<f64>,
    pub hhi_suburb: Option<f64>,
    /// Metrics that need the Monte Carlo distribution; absent in
    /// single-path mode.
    pub requires_mc: Vec<&'static str>,
    pub diagnostics: Vec<String>,
    pub stress_outcomes: Vec<StressOutcome>,
}

/// Herfindahl-Hirschman index of principal concentration over arbitrary
/// buckets.
pub fn hhi<I: Iterator<Item = f64>>(weights: I) -> f64 {
    weights.map(|w| w * w).sum()
}

pub fn hhi_by_zone(loans: &[Loan]) -> Option<f64> {
    let total: f64 = loans.iter().map(|l| l.principal).sum();
    if total <= 0.0 {
        return None;
    }
    let mut per_zone = ZoneMap::uniform(0.0_f64);
    for loan in loans {
        *per_zone.get_mut(loan.zone) += loan.principal;
    }
    Some(hhi(Zone::all().into_iter().map(|z| per_zone.get(z) / total)))
}

pub fn hhi_by_suburb(loans: &[Loan]) -> Option<f64> {
    let total: f64 = loans.iter().map(|l| l.principal).sum();
    if total <= 0.0 {
        return None;
    }
    // BTreeMap keeps the summation order stable across runs.
    let mut per_suburb: std::collections::BTreeMap<u32, f64> = std::collections::BTreeMap::new();
    for loan in loans {
        *per_suburb.entry(loan.suburb_id).or_insert(0.0) += loan.principal;
    }
    Some(hhi(per_suburb.values().map(|v| v / total)))
}

/// Standard normal CDF (Abramowitz & Stegun 7.1.26 via erf).
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592 + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

/// Inverse standard normal CDF (Acklam's rational approximation).
pub fn norm_inv(p: f64) -> Option<f64> {
    if !(0.0..=1.0).contains(&p) || p == 0.0 || p == 1.0 {
        return None;
    }
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    let p_low = 0.02425;

    let x = if p < p_low {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - p_low {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };
    Some(x)
}

/// Empirical percentile on unsorted values; used for MC-mode VaR.
pub fn empirical_quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = idx - lo as f64;
    Some(sorted[lo] * (1.0 - frac) + sorted[hi] * frac)
}

pub struct RiskEngine<'a> {
    config: &'a RiskConfig,
}

impl<'a> RiskEngine<'a> {
    pub fn new(config: &'a RiskConfig) -> Self {
        RiskEngine { config }
    }

    /// Compute single-path metrics from the ledger, the NAV proxy series,
    /// and the market index (the benchmark).
    pub fn compute(
        &self,
        ledger: &CashflowLedger,
        nav_by_month: &[f64],
        market_index: &[f64],
        loans: &[Loan],
    ) -> RiskMetrics {
        let mut metrics = RiskMetrics {
            hhi_zone: hhi_by_zone(loans),
            hhi_suburb: hhi_by_suburb(loans),
            requires_mc: vec![
                "var_empirical",
                "cvar_empirical",
                "hurdle_clear_probability",
            ],
            ..RiskMetrics::default()
        };

        let returns = self.monthly_returns(ledger, nav_by_month);
        if returns.len() < 8 {
            metrics
                .diagnostics
                .push(format!(
                    "only {} return observations; ratio metrics not computed",
                    returns.len()
                ));
            metrics.max_drawdown = self.max_drawdown(ledger);
            return metrics;
        }

        let mean_m = mean(&returns);
        let std_m = std_dev(&returns, mean_m);
        let annual_return = mean_m * 12.0;
        let annual_vol = std_m * 12.0_f64.sqrt();
        metrics.volatility = Some(annual_vol);

        let rf = self.config.risk_free_rate;
        if annual_vol > 1e-12 {
            metrics.sharpe = Some((annual_return - rf) / annual_vol);
        }

        let downside: Vec<f64> = returns
            .iter()
            .map(|r| (r - rf / 12.0).min(0.0))
            .collect();
        let downside_dev = (downside.iter().map(|d| d * d).sum::<f64>()
            / downside.len() as f64)
            .sqrt()
            * 12.0_f64.sqrt();
        if downside_dev > 1e-12 {
            metrics.sortino = Some((annual_return - rf) / downside_dev);
        }

        metrics.max_drawdown = self.max_drawdown(ledger);
        if let Some(dd) = metrics.max_drawdown {
            if dd > 1e-12 {
                metrics.calmar = Some(annual_return / dd);
            }
        }

        // Analytic VaR/CVaR, lognormal approximation on monthly returns.
        match norm_inv(1.0 - self.config.var_confidence) {
            Some(z) => {
                let log_returns: Vec<f64> =
                    returns.iter().map(|r| (1.0 + r).max(1e-9).ln()).collect();
                let mu = mean(&log_returns);
                let sigma = std_dev(&log_returns, mu);
                let var = 1.0 - (mu + z * sigma).exp();
                metrics.var = Some(var.max(0.0));
                if sigma > 1e-12 {
                    let tail = 1.0 - self.config.var_confidence;
                    let cvar = 1.0
                        - (mu + 0.5 * sigma * sigma).exp() * norm_cdf(z - sigma) / tail;
                    metrics.cvar = Some(cvar.max(metrics.var.unwrap_or(0.0)));
                }
            }
            None => metrics
                .diagnostics
                .push("invalid VaR confidence level".to_string()),
        }

        // Alpha/beta against the allocation-weighted market index.
        let bench: Vec<f64> = market_index
            .windows(2)
            .map(|w| w[1] / w[0] - 1.0)
            .collect();
        let n = returns.len().min(bench.len());
        if n >= 8 {
            let r = &returns[returns.len() - n..];
            let b = &bench[bench.len() - n..];
            let mb = mean(b);
            let mr = mean(r);
            let cov = r
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - mr) * (y - mb))
                .sum::<f64>()
                / n as f64;
            let var_b = b.iter().map(|y| (y - mb) * (y - mb)).sum::<f64>() / n as f64;
            if var_b > 1e-14 {
                let beta = cov / var_b;
                metrics.beta = Some(beta);
                metrics.alpha =
                    Some(mr * 12.0 - (rf + beta * (mb * 12.0 - rf)));
            } else {
                metrics
                    .diagnostics
                    .push("benchmark variance too small for beta".to_string());
            }
        }

        metrics
    }

    /// Monthly fund returns on the NAV proxy, distributions added back and
    /// calls netted out. Months without a prior NAV base are skipped.
    fn monthly_returns(&self, ledger: &CashflowLedger, nav: &[f64]) -> Vec<f64> {
        let mut out = Vec::new();
        for t in 1..ledger.rows.len().min(nav.len()) {
            let base = nav[t - 1];
            if base <= 1.0 {
                continue;
            }
            let row = &ledger.rows[t];
            let r = (nav[t] + row.distribution - row.capital_call) / base - 1.0;
            if r.is_finite() {
                out.push(r);
            }
        }
        out
    }

    /// Peak-to-trough drawdown of the cumulative net stakeholder flow,
    /// as a fraction of contributed capital.
    fn max_drawdown(&self, ledger: &CashflowLedger) -> Option<f64> {
        let contributions = ledger.summary.total_contributions;
        if contributions <= 0.0 {
            return None;
        }
        let mut cum = 0.0_f64;
        let mut peak = f64::MIN;
        let mut worst = 0.0_f64;
        for row in &ledger.rows {
            cum += row.distribution - row.capital_call;
            peak = peak.max(cum);
            worst = worst.max(peak - cum);
        }
        Some(worst / contributions)
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    (values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64).sqrt()
}
