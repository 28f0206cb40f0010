//! Distribution waterfall: European (whole-fund) and American
//! (deal-by-deal) structures with GP catch-up and end-of-life clawback.
//!
//! Both structures consume the ledger's monthly distribution stream, so
//! LP + GP totals always equal total distributions; only the split between
//! them depends on the structure. The GP's commitment participates pro rata
//! in the return-of-capital, preferred and residual tiers; catch-up and
//! carry are GP-only.

use serde::{Deserialize, Serialize};

use crate::cashflow::CashflowLedger;
use crate::exits::ExitEvent;
use crate::loans::Loan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterfallStructure {
    European,
    American,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    ReturnOfCapital,
    Preferred,
    CatchUp,
    CarrySplit,
}

impl TierKind {
    pub fn name(&self) -> &'static str {
        match self {
            TierKind::ReturnOfCapital => "return_of_capital",
            TierKind::Preferred => "preferred",
            TierKind::CatchUp => "catch_up",
            TierKind::CarrySplit => "carry_split",
        }
    }
}

/// Totals routed through one tier, split by recipient.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TierDistribution {
    pub tier: TierKind,
    pub lp_amount: f64,
    pub gp_amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaterfallResult {
    pub structure: WaterfallStructure,
    /// Ordered tier totals: ROC, preferred, catch-up, carry split.
    pub tiers: Vec<TierDistribution>,
    pub lp_total: f64,
    pub gp_total: f64,
    /// GP repayment owed at end of life; zero for European.
    pub clawback: f64,
    /// Carry + catch-up actually paid to the GP.
    pub carry_paid: f64,
}

/// Waterfall economics, extracted from the fund terms.
#[derive(Debug, Clone, Copy)]
pub struct WaterfallParams {
    pub structure: WaterfallStructure,
    /// Annual preferred return rate.
    pub hurdle_rate: f64,
    /// GP share of profits above the hurdle.
    pub carry_rate: f64,
    /// GP share of the catch-up tier (1.0 = full catch-up).
    pub catchup_rate: f64,
    /// GP commitment as a fraction of total commitments.
    pub gp_commitment_rate: f64,
}

/// Running tier totals; shared by both structures. `carry_gp` is true
/// carry only; the GP's pro-rata investor share of the residual rides
/// `split_gp` so clawback never counts it.
#[derive(Debug, Default)]
struct TierAccumulator {
    roc_lp: f64,
    roc_gp: f64,
    pref_lp: f64,
    pref_gp: f64,
    catchup_lp: f64,
    catchup_gp: f64,
    carry_gp: f64,
    split_lp: f64,
    split_gp: f64,
}

impl TierAccumulator {
    fn into_result(
        self,
        structure: WaterfallStructure,
        clawback: f64,
    ) -> WaterfallResult {
        let tiers = vec![
            TierDistribution {
                tier: TierKind::ReturnOfCapital,
                lp_amount: self.roc_lp,
                gp_amount: self.roc_gp,
            },
            TierDistribution {
                tier: TierKind::Preferred,
                lp_amount: self.pref_lp,
                gp_amount: self.pref_gp,
            },
            TierDistribution {
                tier: TierKind::CatchUp,
                lp_amount: self.catchup_lp,
                gp_amount: self.catchup_gp,
            },
            TierDistribution {
                tier: TierKind::CarrySplit,
                lp_amount: self.split_lp,
                gp_amount: self.carry_gp + self.split_gp,
            },
        ];
        let lp_total = self.roc_lp + self.pref_lp + self.catchup_lp + self.split_lp;
        let gp_total =
            self.roc_gp + self.pref_gp + self.catchup_gp + self.carry_gp + self.split_gp;
        WaterfallResult {
            structure,
            tiers,
            lp_total,
            gp_total,
            clawback,
            carry_paid: self.catchup_gp + self.carry_gp,
        }
    }
}

/// State for one pool of capital moving through the four tiers.
#[derive(Debug, Default)]
struct TierState {
    contributed: f64,
    returned: f64,
    pref_balance: f64,
    pref_paid: f64,
}

impl TierState {
    fn accrue_pref(&mut self, monthly_hurdle: f64) {
        let outstanding = (self.contributed - self.returned).max(0.0);
        self.pref_balance += (outstanding + self.pref_balance) * monthly_hurdle;
    }

    /// Push `amount` through ROC → pref → catch-up → split.
    fn distribute(&mut self, mut amount: f64, params: &WaterfallParams, acc: &mut TierAccumulator) {
        let gp_frac = params.gp_commitment_rate;
        let lp_frac = 1.0 - gp_frac;

        // Tier 1: return of capital, pro rata to commitments.
        let roc = amount.min((self.contributed - self.returned).max(0.0));
        if roc > 0.0 {
            self.returned += roc;
            acc.roc_lp += roc * lp_frac;
            acc.roc_gp += roc * gp_frac;
            amount -= roc;
        }
        if amount <= 0.0 {
            return;
        }

        // Tier 2: preferred return at the hurdle.
        let pref = amount.min(self.pref_balance);
        if pref > 0.0 {
            self.pref_balance -= pref;
            self.pref_paid += pref;
            acc.pref_lp += pref * lp_frac;
            acc.pref_gp += pref * gp_frac;
            amount -= pref;
        }
        if amount <= 0.0 {
            return;
        }

        // Tier 3: GP catch-up until the GP holds carry/(1-carry) of the
        // profit paid as preferred return.
        let carry = params.carry_rate;
        if carry > 0.0 && carry < 1.0 && params.catchup_rate > 0.0 {
            let target = carry / (1.0 - carry) * self.pref_paid;
            let shortfall = (target - (acc.catchup_gp + acc.carry_gp)).max(0.0);
            // At catchup_rate < 1 the LP co-receives inside the tier, so
            // more total dollars are needed to close the same gap.
            let tier_size = shortfall / params.catchup_rate.min(1.0);
            let tier_amount = amount.min(tier_size);
            if tier_amount > 0.0 {
                let gp_part = tier_amount * params.catchup_rate.min(1.0);
                let lp_part = tier_amount - gp_part;
                acc.catchup_gp += gp_part;
                acc.catchup_lp += lp_part;
                amount -= tier_amount;
            }
        }
        if amount <= 0.0 {
            return;
        }

        // Tier 4: carry to the GP, the rest to investors pro rata.
        let gp_carry = amount * carry_rate_of(params);
        let investor = amount - gp_carry;
        acc.carry_gp += gp_carry;
        acc.split_lp += investor * lp_frac;
        acc.split_gp += investor * gp_frac;
    }
}

fn carry_rate_of(params: &WaterfallParams) -> f64 {
    params.carry_rate.clamp(0.0, 1.0)
}

pub struct WaterfallEngine {
    params: WaterfallParams,
}

impl WaterfallEngine {
    pub fn new(params: WaterfallParams) -> Self {
        WaterfallEngine { params }
    }

    pub fn run(
        &self,
        ledger: &CashflowLedger,
        loans: &[Loan],
        exits: &[ExitEvent],
    ) -> WaterfallResult {
        match self.params.structure {
            WaterfallStructure::European => self.run_european(ledger),
            WaterfallStructure::American => self.run_american(ledger, loans, exits),
        }
    }

    /// Whole-fund: one tier state over the full ledger, accruing preferred
    /// return monthly on outstanding capital.
    fn run_european(&self, ledger: &CashflowLedger) -> WaterfallResult {
        let monthly_hurdle = self.params.hurdle_rate / 12.0;
        let mut state = TierState::default();
        let mut acc = TierAccumulator::default();

        for row in &ledger.rows {
            // Accrue on the opening balance: capital called this month has
            // not been outstanding yet.
            state.accrue_pref(monthly_hurdle);
            state.contributed += row.capital_call;
            if row.distribution > 0.0 {
                state.distribute(row.distribution, &self.params, &mut acc);
            }
        }

        acc.into_result(WaterfallStructure::European, 0.0)
    }

    /// Deal-by-deal: each month's distribution is attributed to that
    /// month's realisations pro rata and pushed through per-deal tiers;
    /// distributions with no realisation that month (leftover sweeps) ride
    /// the fund-level residual split. Clawback trues the GP up at end of
    /// life against entitled carry on realised profits net of losses.
    fn run_american(
        &self,
        ledger: &CashflowLedger,
        loans: &[Loan],
        exits: &[ExitEvent],
    ) -> WaterfallResult {
        let monthly_hurdle = self.params.hurdle_rate / 12.0;
        let by_id: std::collections::HashMap<u64, &Loan> =
            loans.iter().map(|l| (l.id, l)).collect();

        let mut acc = TierAccumulator::default();
        let mut total_realised_profit = 0.0_f64;
        let gp_frac = self.params.gp_commitment_rate;
        let lp_frac = 1.0 - gp_frac;

        for row in &ledger.rows {
            if row.distribution <= 0.0 {
                continue;
            }
            let month_exits: Vec<&ExitEvent> =
                exits.iter().filter(|e| e.month == row.month).collect();
            let gross: f64 = month_exits.iter().map(|e| e.fund_proceeds).sum();

            if gross <= 0.0 {
                // No realisation behind this sweep (fee income, leftover
                // cash): pro-rata split, no carry.
                acc.split_lp += row.distribution * lp_frac;
                acc.split_gp += row.distribution * gp_frac;
                continue;
            }

            for event in &month_exits {
                let share = event.fund_proceeds / gross;
                let slice = row.distribution * share;
                let Some(loan) = by_id.get(&event.loan_id) else {
                    continue;
                };

                // Per-deal tier state: capital is the loan principal, pref
                // compounds over the holding period.
                let held = (event.month - loan.origination_month) as f64;
                let mut deal = TierState {
                    contributed: loan.principal,
                    ..TierState::default()
                };
                deal.pref_balance =
                    loan.principal * ((1.0 + monthly_hurdle).powf(held) - 1.0);

                total_realised_profit +=
                    event.fund_proceeds - loan.principal - deal.pref_balance;

                deal.distribute(slice, &self.params, &mut acc);
            }
        }

        let carry_paid = acc.catchup_gp + acc.carry_gp;
        let entitled = carry_rate_of(&self.params) * total_realised_profit.max(0.0);
        let clawback = (carry_paid - entitled).max(0.0);

        acc.into_result(WaterfallStructure::American, clawback)
    }
}
