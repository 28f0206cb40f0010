//! Fee engine: management fees, origination fees, fund expenses, and
//! transaction fees, with the LP/GP allocation applied to each bucket.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeBasis {
    Committed,
    Nav,
}

/// Management-fee step: from `from_month` onward the annual rate changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeeStep {
    pub from_month: u32,
    pub annual_rate: f64,
}

/// How each fee bucket is borne between LP and GP. Values are the LP share
/// in [0, 1]; the GP bears the remainder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeeAllocation {
    pub management_lp_share: f64,
    pub expense_lp_share: f64,
    pub transaction_lp_share: f64,
}

impl Default for FeeAllocation {
    fn default() -> Self {
        FeeAllocation {
            management_lp_share: 1.0,
            expense_lp_share: 1.0,
            transaction_lp_share: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    pub management_fee_rate: f64,
    pub management_fee_basis: FeeBasis,
    /// Optional stepped schedule; empty means flat `management_fee_rate`.
    #[serde(default)]
    pub fee_steps: Vec<FeeStep>,
    /// Charged on principal at origination, credited to the fund.
    pub origination_fee_rate: f64,
    /// Charged on gross proceeds at exit.
    pub transaction_fee_rate: f64,
    pub expense_fixed_annual: f64,
    pub expense_nav_rate: f64,
    pub expense_setup: f64,
    /// Annual growth applied to the fixed expense.
    pub expense_growth_rate: f64,
    pub allocation: FeeAllocation,
}

impl Default for FeeConfig {
    fn default() -> Self {
        FeeConfig {
            management_fee_rate: 0.02,
            management_fee_basis: FeeBasis::Committed,
            fee_steps: Vec::new(),
            origination_fee_rate: 0.015,
            transaction_fee_rate: 0.0075,
            expense_fixed_annual: 150_000.0,
            expense_nav_rate: 0.001,
            expense_setup: 250_000.0,
            expense_growth_rate: 0.02,
            allocation: FeeAllocation::default(),
        }
    }
}

impl FeeConfig {
    /// Annual management-fee rate in force at `month`.
    pub fn management_rate_at(&self, month: u32) -> f64 {
        let mut rate = self.management_fee_rate;
        for step in &self.fee_steps {
            if month >= step.from_month {
                rate = step.annual_rate;
            }
        }
        rate
    }

    /// Config-only accrual estimate (management fee on committed basis plus
    /// expenses), used by the leverage engine before the fee stage runs.
    pub fn accrual_estimate_by_month(&self, committed: f64, horizon: u32) -> Vec<f64> {
        (0..=horizon)
            .map(|m| {
                let mgmt = self.management_rate_at(m) * committed / 12.0;
                let years = m as f64 / 12.0;
                let fixed = self.expense_fixed_annual
                    * (1.0 + self.expense_growth_rate).powf(years)
                    / 12.0;
                let setup = if m == 0 { self.expense_setup } else { 0.0 };
                mgmt + fixed + setup
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeeRow {
    pub month: u32,
    pub management_fee: f64,
    pub fund_expense: f64,
    /// Origination-fee income credited this month.
    pub origination_fee: f64,
    pub transaction_fee: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FeeSchedule {
    pub rows: Vec<FeeRow>,
    pub total_management: f64,
    pub total_expenses: f64,
    pub total_origination: f64,
    pub total_transaction: f64,
    /// Fee burden borne by LPs / GP under the allocation map.
    pub lp_borne: f64,
    pub gp_borne: f64,
}

impl FeeSchedule {
    pub fn row(&self, month: u32) -> Option<&FeeRow> {
        self.rows.get(month as usize)
    }
}

pub struct FeeEngine<'a> {
    config: &'a FeeConfig,
}

impl<'a> FeeEngine<'a> {
    pub fn new(config: &'a FeeConfig) -> Self {
        FeeEngine { config }
    }

    pub fn run(
        &self,
        horizon: u32,
        committed: f64,
        nav_by_month: &[f64],
        origination_income_by_month: &[f64],
        exit_gross_by_month: &[f64],
    ) -> FeeSchedule {
        let cfg = self.config;
        let mut schedule = FeeSchedule::default();

        for month in 0..=horizon {
            let m = month as usize;
            let nav = nav_by_month.get(m).copied().unwrap_or(0.0);

            let basis = match cfg.management_fee_basis {
                FeeBasis::Committed => committed,
                FeeBasis::Nav => nav,
            };
            let management_fee = cfg.management_rate_at(month) * basis / 12.0;

            let years = m as f64 / 12.0;
            let mut fund_expense = cfg.expense_fixed_annual
                * (1.0 + cfg.expense_growth_rate).powf(years)
                / 12.0
                + cfg.expense_nav_rate * nav / 12.0;
            if month == 0 {
                fund_expense += cfg.expense_setup;
            }

            let origination_fee = origination_income_by_month.get(m).copied().unwrap_or(0.0);
            let transaction_fee =
                cfg.transaction_fee_rate * exit_gross_by_month.get(m).copied().unwrap_or(0.0);

            schedule.total_management += management_fee;
            schedule.total_expenses += fund_expense;
            schedule.total_origination += origination_fee;
            schedule.total_transaction += transaction_fee;

            schedule.rows.push(FeeRow {
                month,
                management_fee,
                fund_expense,
                origination_fee,
                transaction_fee,
            });
        }

        let alloc = &cfg.allocation;
        schedule.lp_borne = schedule.total_management * alloc.management_lp_share
            + schedule.total_expenses * alloc.expense_lp_share
            + schedule.total_transaction * alloc.transaction_lp_share;
        schedule.gp_borne = (schedule.total_management + schedule.total_expenses
            + schedule.total_transaction)
            - schedule.lp_borne;

        schedule
    }
}
