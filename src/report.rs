//! Performance reporter: KPI tables, allocation breakdowns, chart-ready
//! series, tranche performance, and a static HTML report.
//!
//! No new computation happens here beyond formatting and bucketing; every
//! number is read from the completed context.

use serde::Serialize;

use crate::config::Config;
use crate::context::SimulationContext;
use crate::error::SimError;
use crate::exits::ExitKind;
use crate::guardrails::{GuardrailReport, Severity};
use crate::tls::Zone;

#[derive(Debug, Clone, Serialize)]
pub struct KpiTable {
    pub irr: Option<f64>,
    pub moic: Option<f64>,
    pub tvpi: Option<f64>,
    pub dpi: Option<f64>,
    pub rvpi: Option<f64>,
    pub equity_multiple: Option<f64>,
    pub total_contributions: f64,
    pub total_distributions: f64,
    pub loan_count: usize,
    pub reinvested_loan_count: usize,
    pub default_count: usize,
    pub gross_invested: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneBreakdownRow {
    pub zone: Zone,
    pub target_pct: f64,
    pub actual_pct: f64,
    pub invested: f64,
    pub loan_count: usize,
}

/// Chart-ready monthly vectors, one entry per month.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CashflowSeries {
    pub months: Vec<u32>,
    pub net: Vec<f64>,
    pub cumulative: Vec<f64>,
    pub distributions: Vec<f64>,
    pub capital_calls: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskRow {
    pub metric: &'static str,
    pub value: Option<f64>,
    pub requires_mc: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrancheRow {
    pub name: &'static str,
    pub contributed: f64,
    pub distributed: f64,
    pub multiple: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanRow {
    pub id: u64,
    pub zone: Zone,
    pub suburb_id: u32,
    pub principal: f64,
    pub ltv: f64,
    pub origination_month: u32,
    pub reinvestment: bool,
    pub exit_month: Option<u32>,
    pub exit_kind: Option<ExitKind>,
    pub exit_value: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HistogramBin {
    pub lo: f64,
    pub hi: f64,
    pub count: usize,
}

/// Equal-width histogram over finite values; chart helpers consume this.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }
    let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = ((hi - lo) / bins as f64).max(1e-12);
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lo: lo + i as f64 * width,
            hi: lo + (i + 1) as f64 * width,
            count: 0,
        })
        .collect();
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        out[idx].count += 1;
    }
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub run_id: String,
    pub vintage_year: i32,
    pub fund_size: f64,
    pub kpis: KpiTable,
    pub zone_breakdown: Vec<ZoneBreakdownRow>,
    pub cashflow_series: CashflowSeries,
    pub risk_table: Vec<RiskRow>,
    pub tranches: Vec<TrancheRow>,
    pub loans: Vec<LoanRow>,
}

/// Assemble the bundle from a completed context.
pub fn build(config: &Config, ctx: &SimulationContext) -> Result<PerformanceReport, SimError> {
    let ledger = ctx
        .cashflows
        .as_ref()
        .ok_or_else(|| SimError::Internal("cashflow ledger missing".to_string()))?;
    let waterfall = ctx
        .waterfall
        .as_ref()
        .ok_or_else(|| SimError::Internal("waterfall missing".to_string()))?;
    let risk = ctx
        .risk_metrics
        .as_ref()
        .ok_or_else(|| SimError::Internal("risk metrics missing".to_string()))?;

    let summary = &ledger.summary;
    let kpis = KpiTable {
        irr: summary.irr,
        moic: summary.moic,
        tvpi: summary.tvpi,
        dpi: summary.dpi,
        rvpi: summary.rvpi,
        equity_multiple: summary.equity_multiple,
        total_contributions: summary.total_contributions,
        total_distributions: summary.total_distributions,
        loan_count: ctx.loans.len(),
        reinvested_loan_count: ctx.loans.iter().filter(|l| l.reinvestment).count(),
        default_count: ctx
            .loans
            .iter()
            .filter(|l| l.exit_kind == Some(ExitKind::Default))
            .count(),
        gross_invested: ctx.loans.iter().map(|l| l.principal).sum(),
    };

    let total_invested = kpis.gross_invested.max(1e-12);
    let zone_breakdown = Zone::all()
        .into_iter()
        .map(|zone| {
            let invested: f64 = ctx
                .loans
                .iter()
                .filter(|l| l.zone == zone)
                .map(|l| l.principal)
                .sum();
            ZoneBreakdownRow {
                zone,
                target_pct: *config.zone_allocations.get(zone),
                actual_pct: invested / total_invested,
                invested,
                loan_count: ctx.loans.iter().filter(|l| l.zone == zone).count(),
            }
        })
        .collect();

    let mut series = CashflowSeries::default();
    for row in &ledger.rows {
        series.months.push(row.month);
        series.net.push(row.net);
        series.cumulative.push(row.cumulative);
        series.distributions.push(row.distribution);
        series.capital_calls.push(row.capital_call);
    }

    let risk_table = vec![
        RiskRow { metric: "volatility", value: risk.volatility, requires_mc: false },
        RiskRow { metric: "sharpe", value: risk.sharpe, requires_mc: false },
        RiskRow { metric: "sortino", value: risk.sortino, requires_mc: false },
        RiskRow { metric: "calmar", value: risk.calmar, requires_mc: false },
        RiskRow { metric: "max_drawdown", value: risk.max_drawdown, requires_mc: false },
        RiskRow { metric: "var_analytic", value: risk.var, requires_mc: false },
        RiskRow { metric: "cvar_analytic", value: risk.cvar, requires_mc: false },
        RiskRow { metric: "alpha", value: risk.alpha, requires_mc: false },
        RiskRow { metric: "beta", value: risk.beta, requires_mc: false },
        RiskRow { metric: "hhi_zone", value: risk.hhi_zone, requires_mc: false },
        RiskRow { metric: "hhi_suburb", value: risk.hhi_suburb, requires_mc: false },
        RiskRow { metric: "var_empirical", value: None, requires_mc: true },
        RiskRow { metric: "cvar_empirical", value: None, requires_mc: true },
    ];

    let gp_frac = config.fund.gp_commitment_rate;
    let contributions = summary.total_contributions;
    let lp_contributed = contributions * (1.0 - gp_frac);
    let gp_contributed = contributions * gp_frac;
    let tranches = vec![
        TrancheRow {
            name: "LP",
            contributed: lp_contributed,
            distributed: waterfall.lp_total,
            multiple: if lp_contributed > 0.0 {
                Some(waterfall.lp_total / lp_contributed)
            } else {
                None
            },
        },
        TrancheRow {
            name: "GP",
            contributed: gp_contributed,
            distributed: waterfall.gp_total,
            multiple: if gp_contributed > 0.0 {
                Some(waterfall.gp_total / gp_contributed)
            } else {
                None
            },
        },
    ];

    let loans = ctx
        .loans
        .iter()
        .map(|l| LoanRow {
            id: l.id,
            zone: l.zone,
            suburb_id: l.suburb_id,
            principal: l.principal,
            ltv: l.ltv,
            origination_month: l.origination_month,
            reinvestment: l.reinvestment,
            exit_month: l.exit_month,
            exit_kind: l.exit_kind,
            exit_value: l.exit_value,
        })
        .collect();

    Ok(PerformanceReport {
        run_id: ctx.run_id.clone(),
        vintage_year: config.fund.vintage_year,
        fund_size: config.fund.fund_size,
        kpis,
        zone_breakdown,
        cashflow_series: series,
        risk_table,
        tranches,
        loans,
    })
}

fn severity_badge(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Warn => "warn",
        Severity::Fail => "fail",
    }
}

fn fmt_opt_pct(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}%", x * 100.0))
        .unwrap_or_else(|| "-".to_string())
}

fn fmt_opt_x(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.2}x")).unwrap_or_else(|| "-".to_string())
}

/// Render the static HTML report.
pub fn render_html(report: &PerformanceReport, guardrails: Option<&GuardrailReport>) -> String {
    let k = &report.kpis;

    let mut zone_rows = String::new();
    for z in &report.zone_breakdown {
        zone_rows.push_str(&format!(
            "<tr><td>{}</td><td>{:.1}%</td><td>{:.1}%</td><td>${:.0}</td><td>{}</td></tr>\n",
            z.zone.name(),
            z.target_pct * 100.0,
            z.actual_pct * 100.0,
            z.invested,
            z.loan_count,
        ));
    }

    let mut risk_rows = String::new();
    for r in &report.risk_table {
        let value = match (r.value, r.requires_mc) {
            (Some(v), _) => format!("{v:.4}"),
            (None, true) => "requires MC".to_string(),
            (None, false) => "-".to_string(),
        };
        risk_rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>\n",
            r.metric, value
        ));
    }

    let mut tranche_rows = String::new();
    for t in &report.tranches {
        tranche_rows.push_str(&format!(
            "<tr><td>{}</td><td>${:.0}</td><td>${:.0}</td><td>{}</td></tr>\n",
            t.name,
            t.contributed,
            t.distributed,
            fmt_opt_x(t.multiple),
        ));
    }

    let guardrail_section = match guardrails {
        Some(g) if !g.breaches.is_empty() => {
            let mut rows = String::new();
            for b in &g.breaches {
                rows.push_str(&format!(
                    "<tr><td>{}</td><td><span class=\"badge {}\">{}</span></td><td>{:.4}</td><td>{:.4}</td><td>{}</td></tr>\n",
                    b.code,
                    severity_badge(b.severity),
                    b.severity.label(),
                    b.value,
                    b.threshold,
                    b.message,
                ));
            }
            let worst = g.worst_level().map(|s| s.label()).unwrap_or("NONE");
            format!(
                "<section><h3>Guardrails — worst: {worst}</h3><table>\n\
                 <tr><th>Rule</th><th>Severity</th><th>Value</th><th>Threshold</th><th>Message</th></tr>\n\
                 {rows}</table></section>"
            )
        }
        _ => "<section><h3>Guardrails</h3><p>No breaches.</p></section>".to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>{run_id} — fund performance</title>
<style>
*{{margin:0;padding:0;box-sizing:border-box}}
body{{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;background:#f5f5f5;color:#333}}
header{{background:#1a1a2e;color:#fff;padding:24px 32px}}
header h1{{font-size:1.4em;font-weight:500}}
main{{max-width:1200px;margin:0 auto;padding:24px}}
section{{background:#fff;border-radius:8px;box-shadow:0 1px 3px rgba(0,0,0,0.1);padding:24px;margin-bottom:20px}}
h3{{margin-bottom:12px;color:#1a1a2e}}
table{{width:100%;border-collapse:collapse;font-size:0.9em}}
th,td{{padding:10px 14px;text-align:left;border-bottom:1px solid #e0e0e0}}
th{{background:#f8f9fa;font-weight:600}}
.badge{{padding:3px 10px;border-radius:3px;font-weight:700;font-size:0.8em}}
.badge.info{{background:#4285f4;color:#fff}}
.badge.warn{{background:#ea8c00;color:#fff}}
.badge.fail{{background:#ea4335;color:#fff}}
</style>
</head>
<body>
<header>
 <h1>{run_id} — vintage {vintage}, ${fund_size:.0} committed</h1>
</header>
<main>
<section>
<h3>KPIs</h3>
<table>
<tr><th>IRR</th><th>MOIC</th><th>TVPI</th><th>DPI</th><th>RVPI</th><th>Loans</th><th>Defaults</th></tr>
<tr><td>{irr}</td><td>{moic}</td><td>{tvpi}</td><td>{dpi}</td><td>{rvpi}</td><td>{loans}</td><td>{defaults}</td></tr>
</table>
</section>
<section>
<h3>Zone allocation</h3>
<table>
<tr><th>Zone</th><th>Target</th><th>Actual</th><th>Invested</th><th>Loans</th></tr>
{zone_rows}
</table>
</section>
<section>
<h3>Risk</h3>
<table>
<tr><th>Metric</th><th>Value</th></tr>
{risk_rows}
</table>
</section>
<section>
<h3>Tranche performance</h3>
<table>
<tr><th>Tranche</th><th>Contributed</th><th>Distributed</th><th>Multiple</th></tr>
{tranche_rows}
</table>
</section>
{guardrail_section}
</main>
</body>
</html>"#,
        run_id = report.run_id,
        vintage = report.vintage_year,
        fund_size = report.fund_size,
        irr = fmt_opt_pct(k.irr),
        moic = fmt_opt_x(k.moic),
        tvpi = fmt_opt_x(k.tvpi),
        dpi = fmt_opt_x(k.dpi),
        rvpi = fmt_opt_x(k.rvpi),
        loans = k.loan_count,
        defaults = k.default_count,
        zone_rows = zone_rows,
        risk_rows = risk_rows,
        tranche_rows = tranche_rows,
        guardrail_section = guardrail_section,
    )
}

/// Write an HTML report to disk, creating parent directories.
pub fn save_report(html: &str, path: &std::path::Path) -> Result<(), SimError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SimError::Internal(format!("create {}: {e}", parent.display())))?;
    }
    std::fs::write(path, html)
        .map_err(|e| SimError::Internal(format!("write {}: {e}", path.display())))
}
