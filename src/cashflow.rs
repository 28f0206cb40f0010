//! Cashflow aggregator: loan-level flows rolled up to the fund ledger,
//! cumulative sums, and the summary return metrics.
//!
//! The ledger row set matches the reporting schema: calls and distributions
//! are carried as separate signed columns even when both land in the same
//! month. `net` covers fund operations (everything except calls and
//! distributions), so `cumulative` tracks internally generated cash and the
//! balance identity `B[t] = calls − distributions + cumulative[t]` holds.

use serde::Serialize;

use crate::error::SimError;
use crate::exits::{ExitEvent, ExitKind};
use crate::fees::FeeSchedule;
use crate::leverage::LeverageSchedule;
use crate::loans::Loan;
use crate::price_path::PricePathSet;

/// NAV proxy: active principal grown by each loan's property index.
pub fn nav_series(loans: &[Loan], paths: &PricePathSet, horizon: u32) -> Vec<f64> {
    let mut nav = vec![0.0_f64; horizon as usize + 1];
    for loan in loans {
        let start = loan.origination_month;
        let end = loan.exit_month.unwrap_or(horizon).min(horizon);
        for month in start..end {
            let growth = paths.property_growth(loan.zone, loan.property_id, start, month);
            nav[month as usize] += loan.principal * growth;
        }
    }
    nav
}

/// Decomposition of one exit's fund proceeds.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExitDecomposition {
    pub principal_repayment: f64,
    pub interest_income: f64,
    pub appreciation_share: f64,
}

/// Split an exit's fund proceeds into ledger components. Defaults return
/// whatever was recovered as principal; sales, refinances and term exits
/// return principal plus accrued interest, with the remainder being the
/// fund's appreciation share.
pub fn decompose_exit(loan: &Loan, event: &ExitEvent) -> ExitDecomposition {
    match event.kind {
        ExitKind::Default => ExitDecomposition {
            principal_repayment: event.fund_proceeds,
            interest_income: 0.0,
            appreciation_share: 0.0,
        },
        _ => {
            let held_years = (event.month - loan.origination_month) as f64 / 12.0;
            let interest = loan.principal * loan.rate * held_years;
            let share = (event.fund_proceeds - loan.principal - interest).max(0.0);
            ExitDecomposition {
                principal_repayment: loan.principal,
                interest_income: interest,
                appreciation_share: share,
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CashflowRow {
    pub month: u32,
    pub capital_call: f64,
    pub loan_investment: f64,
    pub origination_fee: f64,
    pub principal_repayment: f64,
    pub interest_income: f64,
    pub appreciation_share: f64,
    pub management_fee: f64,
    pub fund_expense: f64,
    pub leverage_draw: f64,
    pub leverage_repayment: f64,
    pub leverage_interest: f64,
    pub distribution: f64,
    /// Fund-operations net: inflows − outflows, excluding calls and
    /// distributions.
    pub net: f64,
    pub cumulative: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CashflowSummary {
    pub total_contributions: f64,
    pub total_distributions: f64,
    pub terminal_nav: f64,
    /// Annualised IRR of LP-view flows; absent when no root exists.
    pub irr: Option<f64>,
    pub irr_diagnostic: Option<String>,
    pub moic: Option<f64>,
    pub tvpi: Option<f64>,
    pub dpi: Option<f64>,
    pub rvpi: Option<f64>,
    /// Distributions plus terminal NAV over contributions.
    pub equity_multiple: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CashflowLedger {
    pub rows: Vec<CashflowRow>,
    pub summary: CashflowSummary,
}

impl CashflowLedger {
    /// LP-view monthly flows: distributions minus calls, terminal NAV in
    /// the last month. Input to IRR and to the waterfall.
    pub fn stakeholder_flows(&self) -> Vec<f64> {
        let mut flows: Vec<f64> = self
            .rows
            .iter()
            .map(|r| r.distribution - r.capital_call)
            .collect();
        if let Some(last) = flows.last_mut() {
            *last += self.summary.terminal_nav;
        }
        flows
    }
}

pub struct CashflowAggregator<'a> {
    loans: &'a [Loan],
    exits: &'a [ExitEvent],
    fees: &'a FeeSchedule,
    leverage: &'a LeverageSchedule,
    paths: &'a PricePathSet,
}

impl<'a> CashflowAggregator<'a> {
    pub fn new(
        loans: &'a [Loan],
        exits: &'a [ExitEvent],
        fees: &'a FeeSchedule,
        leverage: &'a LeverageSchedule,
        paths: &'a PricePathSet,
    ) -> Self {
        CashflowAggregator {
            loans,
            exits,
            fees,
            leverage,
            paths,
        }
    }

    pub fn build(
        &self,
        horizon: u32,
        mut on_month: impl FnMut(u32) -> Result<(), SimError>,
    ) -> Result<CashflowLedger, SimError> {
        let months = horizon as usize + 1;
        let mut rows: Vec<CashflowRow> = (0..months)
            .map(|m| CashflowRow {
                month: m as u32,
                ..CashflowRow::default()
            })
            .collect();

        for loan in self.loans {
            let row = &mut rows[loan.origination_month as usize];
            row.loan_investment += loan.principal;
            row.origination_fee += loan.origination_fee;
        }

        let by_id: std::collections::HashMap<u64, &Loan> =
            self.loans.iter().map(|l| (l.id, l)).collect();
        for event in self.exits {
            let loan = by_id
                .get(&event.loan_id)
                .ok_or_else(|| SimError::missing("loan", event.loan_id.to_string()))?;
            let parts = decompose_exit(loan, event);
            let row = &mut rows[event.month as usize];
            row.principal_repayment += parts.principal_repayment;
            row.interest_income += parts.interest_income;
            row.appreciation_share += parts.appreciation_share;
        }

        let mut cash = 0.0_f64;
        let mut cumulative = 0.0_f64;
        for month in 0..months {
            on_month(month as u32)?;
            let row = &mut rows[month];

            if let Some(fee_row) = self.fees.row(month as u32) {
                row.management_fee = fee_row.management_fee;
                // Transaction fees ride the expense column.
                row.fund_expense = fee_row.fund_expense + fee_row.transaction_fee;
            }
            if let Some(lev_row) = self.leverage.row(month as u32) {
                row.capital_call = lev_row.capital_call;
                row.leverage_draw = lev_row.draw;
                row.leverage_repayment = lev_row.repayment;
                row.leverage_interest = lev_row.interest + lev_row.commitment_fee;
            }

            let inflows = row.origination_fee
                + row.principal_repayment
                + row.interest_income
                + row.appreciation_share
                + row.leverage_draw;
            let outflows = row.loan_investment
                + row.management_fee
                + row.fund_expense
                + row.leverage_repayment
                + row.leverage_interest;
            row.net = inflows - outflows;
            cumulative += row.net;
            row.cumulative = cumulative;

            // Monthly sweep: positive cash is distributed, deficits carry.
            cash += row.capital_call + row.net;
            if cash > 0.0 {
                row.distribution = cash;
                cash = 0.0;
            }
        }

        let terminal_nav = nav_series(self.loans, self.paths, horizon)
            .last()
            .copied()
            .unwrap_or(0.0);

        let mut ledger = CashflowLedger {
            rows,
            summary: CashflowSummary {
                terminal_nav,
                ..CashflowSummary::default()
            },
        };
        ledger.summary.total_contributions =
            ledger.rows.iter().map(|r| r.capital_call).sum();
        ledger.summary.total_distributions =
            ledger.rows.iter().map(|r| r.distribution).sum();
        self.fill_summary(&mut ledger);
        Ok(ledger)
    }

    fn fill_summary(&self, ledger: &mut CashflowLedger) {
        let contributions = ledger.summary.total_contributions;
        let distributions = ledger.summary.total_distributions;
        let nav = ledger.summary.terminal_nav;

        if contributions > 0.0 {
            ledger.summary.moic = Some(distributions / contributions);
            ledger.summary.dpi = Some(distributions / contributions);
            ledger.summary.rvpi = Some(nav / contributions);
            ledger.summary.tvpi = Some((distributions + nav) / contributions);
            ledger.summary.equity_multiple = Some((distributions + nav) / contributions);
        }

        let flows = ledger.stakeholder_flows();
        match irr(&flows) {
            Ok(rate) => ledger.summary.irr = Some(rate),
            Err(e) => {
                ledger.summary.irr = None;
                ledger.summary.irr_diagnostic = Some(e.to_string());
            }
        }
    }
}

/// Net present value of monthly flows at annual rate `rate`.
pub fn npv(flows: &[f64], rate: f64) -> f64 {
    flows
        .iter()
        .enumerate()
        .map(|(t, cf)| cf / (1.0 + rate).powf(t as f64 / 12.0))
        .sum()
}

/// Annualised IRR by bracketing + bisection with a secant fallback.
///
/// The no-root case (all-positive or all-negative flows, or no sign change
/// over the bracket) is an explicit `NumericFailure`; callers report the
/// metric as absent with the diagnostic rather than guessing.
pub fn irr(flows: &[f64]) -> Result<f64, SimError> {
    let has_negative = flows.iter().any(|&f| f < 0.0);
    let has_positive = flows.iter().any(|&f| f > 0.0);
    if !has_negative || !has_positive {
        return Err(SimError::numeric(
            "irr",
            "cashflows do not change sign; IRR undefined",
        ));
    }

    // Scan for a sign change of NPV over a wide annual-rate grid.
    let grid: Vec<f64> = (0..400).map(|i| -0.95 + i as f64 * 0.025).collect();
    let mut bracket = None;
    let mut prev = (grid[0], npv(flows, grid[0]));
    for &r in &grid[1..] {
        let v = npv(flows, r);
        if prev.1 == 0.0 {
            return Ok(prev.0);
        }
        if prev.1 * v < 0.0 {
            bracket = Some((prev.0, r));
            break;
        }
        prev = (r, v);
    }

    if let Some((mut lo, mut hi)) = bracket {
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            let v = npv(flows, mid);
            if v.abs() < 1e-10 {
                return Ok(mid);
            }
            if npv(flows, lo) * v < 0.0 {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        return Ok(0.5 * (lo + hi));
    }

    // Secant fallback for roots outside or between grid points.
    let (mut r0, mut r1) = (0.05, 0.15);
    let (mut f0, mut f1) = (npv(flows, r0), npv(flows, r1));
    for _ in 0..100 {
        if (f1 - f0).abs() < 1e-14 {
            break;
        }
        let r2 = r1 - f1 * (r1 - r0) / (f1 - f0);
        if !r2.is_finite() || r2 <= -1.0 {
            break;
        }
        if npv(flows, r2).abs() < 1e-10 {
            return Ok(r2);
        }
        r0 = r1;
        f0 = f1;
        r1 = r2;
        f1 = npv(flows, r2);
    }

    Err(SimError::numeric(
        "irr",
        "no root found by bracketing or secant iteration",
    ))
}
