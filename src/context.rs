//! `SimulationContext`: all derived state for one path.
//!
//! One context per inner run, exclusively owned by that run. Each stage has
//! write access to its designated field and read access to everything its
//! upstream dependencies wrote; the orchestrator installs stage outputs
//! sequentially, so a completed stage's fields are immutable from the next
//! stage's point of view. After the pipeline finishes, the context is
//! handed to consumers as a whole.

use serde::Serialize;

use crate::allocator::AllocationResult;
use crate::cashflow::CashflowLedger;
use crate::exits::ExitEvent;
use crate::fees::FeeSchedule;
use crate::guardrails::GuardrailReport;
use crate::leverage::LeverageSchedule;
use crate::loans::Loan;
use crate::price_path::PricePathSet;
use crate::reinvest::ReinvestmentSummary;
use crate::risk::RiskMetrics;
use crate::rng::RngFactory;
use crate::waterfall::WaterfallResult;

/// Wall-clock timing for one completed stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: &'static str,
    pub millis: f64,
}

/// How a single path ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed { stage: &'static str, error: String },
    Cancelled { stage: &'static str },
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

#[derive(Debug)]
pub struct SimulationContext {
    pub run_id: String,
    pub path_index: usize,
    pub seed: u64,
    pub rng: RngFactory,

    // Stage outputs, in pipeline order. Each is written exactly once, by
    // the stage of the same name.
    pub allocation: Option<AllocationResult>,
    pub loans: Vec<Loan>,
    pub price_paths: Option<PricePathSet>,
    pub exits: Vec<ExitEvent>,
    pub reinvestment: Option<ReinvestmentSummary>,
    pub leverage: Option<LeverageSchedule>,
    pub fees: Option<FeeSchedule>,
    pub cashflows: Option<CashflowLedger>,
    pub waterfall: Option<WaterfallResult>,
    pub risk_metrics: Option<RiskMetrics>,
    pub guardrail_report: Option<GuardrailReport>,
    pub report: Option<crate::report::PerformanceReport>,

    pub stage_timings: Vec<StageTiming>,
    pub completed_stages: Vec<&'static str>,
}

impl SimulationContext {
    pub fn new(run_id: impl Into<String>, path_index: usize, seed: u64) -> Self {
        SimulationContext {
            run_id: run_id.into(),
            path_index,
            seed,
            rng: RngFactory::new(seed),
            allocation: None,
            loans: Vec::new(),
            price_paths: None,
            exits: Vec::new(),
            reinvestment: None,
            leverage: None,
            fees: None,
            cashflows: None,
            waterfall: None,
            risk_metrics: None,
            guardrail_report: None,
            report: None,
            stage_timings: Vec::new(),
            completed_stages: Vec::new(),
        }
    }

    pub fn stage_completed(&self, stage: &str) -> bool {
        self.completed_stages.iter().any(|s| *s == stage)
    }

    pub fn record_timing(&mut self, stage: &'static str, millis: f64) {
        self.stage_timings.push(StageTiming { stage, millis });
    }
}
