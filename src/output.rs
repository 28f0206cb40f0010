//! File outputs for a run: ledger time series and loan list as CSV, the
//! summary as JSON, the config snapshot as TOML, and the Monte Carlo
//! distribution table.

use std::path::Path;

use serde::Serialize;

use crate::cashflow::CashflowLedger;
use crate::config::Config;
use crate::context::SimulationContext;
use crate::error::SimError;
use crate::exits::ExitEvent;
use crate::fees::FeeBasis;
use crate::loans::Loan;
use crate::mc::McResult;

fn ensure_parent(path: &Path) -> Result<(), SimError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SimError::Internal(format!("create {}: {e}", parent.display())))?;
    }
    Ok(())
}

fn io_err(path: &Path) -> impl Fn(csv::Error) -> SimError + '_ {
    move |e| SimError::Internal(format!("csv {}: {e}", path.display()))
}

/// Monthly ledger time series.
pub fn save_ledger_csv(ledger: &CashflowLedger, path: &Path) -> Result<(), SimError> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| SimError::Internal(format!("open {}: {e}", path.display())))?;
    wtr.write_record([
        "month",
        "capital_call",
        "loan_investment",
        "origination_fee",
        "principal_repayment",
        "interest_income",
        "appreciation_share",
        "management_fee",
        "fund_expense",
        "leverage_draw",
        "leverage_repayment",
        "leverage_interest",
        "distribution",
        "net",
        "cumulative",
    ])
    .map_err(io_err(path))?;

    for r in &ledger.rows {
        wtr.write_record(&[
            r.month.to_string(),
            format!("{:.2}", r.capital_call),
            format!("{:.2}", r.loan_investment),
            format!("{:.2}", r.origination_fee),
            format!("{:.2}", r.principal_repayment),
            format!("{:.2}", r.interest_income),
            format!("{:.2}", r.appreciation_share),
            format!("{:.2}", r.management_fee),
            format!("{:.2}", r.fund_expense),
            format!("{:.2}", r.leverage_draw),
            format!("{:.2}", r.leverage_repayment),
            format!("{:.2}", r.leverage_interest),
            format!("{:.2}", r.distribution),
            format!("{:.2}", r.net),
            format!("{:.2}", r.cumulative),
        ])
        .map_err(io_err(path))?;
    }
    wtr.flush()
        .map_err(|e| SimError::Internal(format!("flush {}: {e}", path.display())))?;
    Ok(())
}

/// The loan book, one row per loan with its exit.
pub fn save_loans_csv(loans: &[Loan], path: &Path) -> Result<(), SimError> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| SimError::Internal(format!("open {}: {e}", path.display())))?;
    wtr.write_record([
        "id",
        "zone",
        "suburb_id",
        "property_id",
        "origination_month",
        "principal",
        "ltv",
        "term_months",
        "rate",
        "reinvestment",
        "exit_month",
        "exit_kind",
        "exit_value",
    ])
    .map_err(io_err(path))?;

    for l in loans {
        wtr.write_record(&[
            l.id.to_string(),
            l.zone.name().to_string(),
            l.suburb_id.to_string(),
            l.property_id.to_string(),
            l.origination_month.to_string(),
            format!("{:.2}", l.principal),
            format!("{:.4}", l.ltv),
            l.term_months.to_string(),
            format!("{:.4}", l.rate),
            l.reinvestment.to_string(),
            l.exit_month.map(|m| m.to_string()).unwrap_or_default(),
            l.exit_kind.map(|k| k.name().to_string()).unwrap_or_default(),
            l.exit_value.map(|v| format!("{v:.2}")).unwrap_or_default(),
        ])
        .map_err(io_err(path))?;
    }
    wtr.flush()
        .map_err(|e| SimError::Internal(format!("flush {}: {e}", path.display())))?;
    Ok(())
}

pub fn save_exits_csv(exits: &[ExitEvent], path: &Path) -> Result<(), SimError> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| SimError::Internal(format!("open {}: {e}", path.display())))?;
    wtr.write_record(["loan_id", "month", "kind", "gross_proceeds", "fund_proceeds"])
        .map_err(io_err(path))?;
    for e in exits {
        wtr.write_record(&[
            e.loan_id.to_string(),
            e.month.to_string(),
            e.kind.name().to_string(),
            format!("{:.2}", e.gross_proceeds),
            format!("{:.2}", e.fund_proceeds),
        ])
        .map_err(io_err(path))?;
    }
    wtr.flush()
        .map_err(|e| SimError::Internal(format!("flush {}: {e}", path.display())))?;
    Ok(())
}

/// Summary JSON: KPI block plus guardrails, for downstream consumers.
pub fn save_summary_json(ctx: &SimulationContext, path: &Path) -> Result<(), SimError> {
    ensure_parent(path)?;
    let summary = ctx.cashflows.as_ref().map(|c| &c.summary);
    let payload = serde_json::json!({
        "run_id": &ctx.run_id,
        "seed": ctx.seed,
        "loan_count": ctx.loans.len(),
        "summary": summary,
        "waterfall": &ctx.waterfall,
        "risk": &ctx.risk_metrics,
        "guardrails": &ctx.guardrail_report,
        "stage_timings": &ctx.stage_timings,
    });
    let json = serde_json::to_string_pretty(&payload)
        .map_err(|e| SimError::Internal(format!("serialise summary: {e}")))?;
    std::fs::write(path, json)
        .map_err(|e| SimError::Internal(format!("write {}: {e}", path.display())))
}

/// Flat snapshot of the headline config, written next to run outputs so a
/// result directory is self-describing.
#[derive(Serialize)]
struct ConfigSnapshot {
    fund: FundSnapshot,
    loans: LoanSnapshot,
    allocation: AllocationSnapshot,
    seed: u64,
}

#[derive(Serialize)]
struct FundSnapshot {
    fund_size: f64,
    term_years: u32,
    vintage_year: i32,
    hurdle_rate: f64,
    carry_rate: f64,
    waterfall_structure: String,
    management_fee_rate: f64,
    management_fee_basis: String,
}

#[derive(Serialize)]
struct LoanSnapshot {
    avg_size: f64,
    min_size: f64,
    max_size: f64,
    avg_ltv: f64,
    max_ltv: f64,
    avg_term_months: f64,
    avg_rate: f64,
}

#[derive(Serialize)]
struct AllocationSnapshot {
    green: f64,
    orange: f64,
    red: f64,
    red_cap: f64,
}

pub fn save_config_toml(config: &Config, path: &Path) -> Result<(), SimError> {
    ensure_parent(path)?;
    let snapshot = ConfigSnapshot {
        fund: FundSnapshot {
            fund_size: config.fund.fund_size,
            term_years: config.fund.term_years,
            vintage_year: config.fund.vintage_year,
            hurdle_rate: config.fund.hurdle_rate,
            carry_rate: config.fund.carry_rate,
            waterfall_structure: format!("{:?}", config.fund.waterfall_structure).to_lowercase(),
            management_fee_rate: config.fees.management_fee_rate,
            management_fee_basis: match config.fees.management_fee_basis {
                FeeBasis::Committed => "committed".to_string(),
                FeeBasis::Nav => "nav".to_string(),
            },
        },
        loans: LoanSnapshot {
            avg_size: config.loans.avg_size,
            min_size: config.loans.min_size,
            max_size: config.loans.max_size,
            avg_ltv: config.loans.avg_ltv,
            max_ltv: config.loans.max_ltv,
            avg_term_months: config.loans.avg_term_months,
            avg_rate: config.loans.avg_rate,
        },
        allocation: AllocationSnapshot {
            green: config.zone_allocations.green,
            orange: config.zone_allocations.orange,
            red: config.zone_allocations.red,
            red_cap: config.zone_caps.red,
        },
        seed: config.seed,
    };
    let text = toml::to_string_pretty(&snapshot)
        .map_err(|e| SimError::Internal(format!("serialise config snapshot: {e}")))?;
    std::fs::write(path, text)
        .map_err(|e| SimError::Internal(format!("write {}: {e}", path.display())))
}

/// Monte Carlo distribution table: one row per metric.
pub fn save_mc_distributions_csv(mc: &McResult, path: &Path) -> Result<(), SimError> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| SimError::Internal(format!("open {}: {e}", path.display())))?;
    wtr.write_record([
        "metric", "mean", "median", "p5", "p25", "p75", "p95", "min", "max",
    ])
    .map_err(io_err(path))?;

    let rows = [
        ("irr", mc.distributions.irr),
        ("equity_multiple", mc.distributions.equity_multiple),
        ("tvpi", mc.distributions.tvpi),
        ("total_distributions", mc.distributions.total_distributions),
        ("max_drawdown", mc.distributions.max_drawdown),
    ];
    for (name, dist) in rows {
        if let Some(d) = dist {
            wtr.write_record(&[
                name.to_string(),
                format!("{:.6}", d.mean),
                format!("{:.6}", d.median),
                format!("{:.6}", d.p5),
                format!("{:.6}", d.p25),
                format!("{:.6}", d.p75),
                format!("{:.6}", d.p95),
                format!("{:.6}", d.min),
                format!("{:.6}", d.max),
            ])
            .map_err(io_err(path))?;
        }
    }
    wtr.flush()
        .map_err(|e| SimError::Internal(format!("flush {}: {e}", path.display())))?;
    Ok(())
}

/// Save all outputs for one run to a directory.
pub fn save_all(config: &Config, ctx: &SimulationContext, dir: &Path) -> Result<(), SimError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| SimError::Internal(format!("create {}: {e}", dir.display())))?;

    if let Some(ledger) = &ctx.cashflows {
        save_ledger_csv(ledger, &dir.join("ledger.csv"))?;
    }
    save_loans_csv(&ctx.loans, &dir.join("loans.csv"))?;
    save_exits_csv(&ctx.exits, &dir.join("exits.csv"))?;
    save_summary_json(ctx, &dir.join("summary.json"))?;
    save_config_toml(config, &dir.join("config.toml"))?;

    if let Some(report) = &ctx.report {
        let html = crate::report::render_html(report, ctx.guardrail_report.as_ref());
        crate::report::save_report(&html, &dir.join("report.html"))?;
    }
    Ok(())
}
