//! The simulation pipeline: stage implementations and the in-process entry
//! point `run(config, seed, token, sink)`.
//!
//! Stage wiring, in dependency order: capital allocation → loan generation
//! → price paths → exit simulation → reinvestment → leverage → fees →
//! cashflow aggregation → waterfall → risk metrics → stress tests →
//! guardrails → performance report. Stress tests re-run the same pipeline
//! with a shocked config and the stress stage disabled.

use std::collections::HashSet;

use serde_json::json;

use crate::allocator;
use crate::cashflow::{nav_series, CashflowAggregator};
use crate::config::Config;
use crate::context::{RunStatus, SimulationContext};
use crate::error::SimError;
use crate::events::{CancelToken, EventKind, EventSink, NullSink, ProgressReporter, SimEvent};
use crate::exits::{ExitEvent, ExitSimulator};
use crate::fees::FeeEngine;
use crate::guardrails::{self, GuardrailInputs};
use crate::leverage::{LeverageEngine, LeverageInputs};
use crate::loans::{Loan, LoanGenerator};
use crate::orchestrator::{Orchestrator, Stage, StageEnv};
use crate::price_path::{PricePathSet, PricePathSimulator};
use crate::reinvest::ReinvestmentEngine;
use crate::report;
use crate::risk::{RiskEngine, StressOutcome, StressShock};
use crate::tls::TlsCatalogue;
use crate::waterfall::WaterfallEngine;

/// Outcome of one path: the fully (or partially) populated context plus
/// how the run ended.
#[derive(Debug)]
pub struct SimulationResult {
    pub context: SimulationContext,
    pub status: RunStatus,
}

impl SimulationResult {
    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }
}

// ── Per-month series helpers ──────────────────────────────────────────

fn investment_by_month(loans: &[Loan], horizon: u32) -> Vec<f64> {
    let mut out = vec![0.0; horizon as usize + 1];
    for loan in loans {
        out[loan.origination_month as usize] += loan.principal;
    }
    out
}

fn origination_income_by_month(loans: &[Loan], horizon: u32) -> Vec<f64> {
    let mut out = vec![0.0; horizon as usize + 1];
    for loan in loans {
        out[loan.origination_month as usize] += loan.origination_fee;
    }
    out
}

fn proceeds_by_month(exits: &[ExitEvent], horizon: u32) -> Vec<f64> {
    let mut out = vec![0.0; horizon as usize + 1];
    for event in exits {
        out[event.month as usize] += event.fund_proceeds;
    }
    out
}

fn exit_gross_by_month(exits: &[ExitEvent], horizon: u32) -> Vec<f64> {
    let mut out = vec![0.0; horizon as usize + 1];
    for event in exits {
        out[event.month as usize] += event.gross_proceeds;
    }
    out
}

/// (price shock, rate shock bps, PD multiplier) of the applied stress
/// shock, if any.
fn shock_of(config: &Config) -> (Option<f64>, Option<f64>, Option<f64>) {
    let shock = config.applied_shock.as_ref();
    (
        shock.and_then(|s| s.price_shock_pct),
        shock.and_then(|s| s.rate_shock_bps),
        shock.and_then(|s| s.pd_multiplier),
    )
}

// ── Stages ────────────────────────────────────────────────────────────

struct CapitalAllocationStage;

impl Stage for CapitalAllocationStage {
    fn name(&self) -> &'static str {
        "capital_allocation"
    }
    fn deps(&self) -> &'static [&'static str] {
        &[]
    }
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        _token: &CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError> {
        let config = env.config;
        let allocation = allocator::allocate(
            config.fund.fund_size,
            &config.zone_allocations,
            &config.zone_caps,
        )?;
        progress.intermediate(json!({
            "committed_capital": allocation.committed_capital,
            "target": allocation.target,
        }));
        ctx.allocation = Some(allocation);
        progress.report(1.0);
        Ok(())
    }
}

struct LoanGenerationStage;

impl Stage for LoanGenerationStage {
    fn name(&self) -> &'static str {
        "loan_generation"
    }
    fn deps(&self) -> &'static [&'static str] {
        &["capital_allocation"]
    }
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        _token: &CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError> {
        let config = env.config;
        let allocation = ctx
            .allocation
            .as_mut()
            .ok_or_else(|| SimError::Internal("allocation missing".to_string()))?;

        let generator = LoanGenerator::new(
            &config.loans,
            env.tls,
            config.term_months(),
            config.fees.origination_fee_rate,
        );
        let mut next_id = 0u64;
        let mut used = HashSet::new();
        let batch = generator.generate_initial(&ctx.rng, &allocation.dollars, &mut next_id, &mut used)?;
        progress.report(0.8);

        ctx.loans = batch.loans;
        allocator::update_actual_allocation(allocation, &ctx.loans);

        progress.intermediate(json!({
            "loan_count": ctx.loans.len(),
            "invested": ctx.loans.iter().map(|l| l.principal).sum::<f64>(),
            "unallocated": batch.unallocated,
        }));
        progress.report(1.0);
        Ok(())
    }
}

struct PricePathStage;

impl Stage for PricePathStage {
    fn name(&self) -> &'static str {
        "price_paths"
    }
    fn deps(&self) -> &'static [&'static str] {
        &["loan_generation"]
    }
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        token: &CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError> {
        let config = env.config;
        let horizon = config.term_months();
        let (price_shock, _, _) = shock_of(config);

        let simulator = PricePathSimulator::new(
            &config.price_paths,
            &config.zones,
            &config.zone_allocations,
            price_shock,
        );

        let (zone_index, diagnostics) =
            simulator.simulate_zones(&ctx.rng, horizon, |month| {
                token.check()?;
                progress.report(0.9 * month as f64 / horizon as f64);
                Ok(())
            })?;

        let property_multiplier =
            simulator.simulate_property_multipliers(&ctx.rng, env.tls, &ctx.loans, horizon)?;
        let market_index = simulator.market_index(&zone_index, horizon);

        ctx.price_paths = Some(PricePathSet {
            horizon_months: horizon,
            zone_index,
            property_multiplier,
            market_index,
        });
        // Correlation fallback diagnostics surface later as model-layer
        // guardrail breaches.
        if !diagnostics.is_empty() {
            ctx.risk_metrics
                .get_or_insert_with(Default::default)
                .diagnostics
                .extend(diagnostics);
        }
        progress.report(1.0);
        Ok(())
    }
}

struct ExitSimulationStage;

impl Stage for ExitSimulationStage {
    fn name(&self) -> &'static str {
        "exit_simulation"
    }
    fn deps(&self) -> &'static [&'static str] {
        &["price_paths"]
    }
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        token: &CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError> {
        let config = env.config;
        let (_, rate_shock, pd_multiplier) = shock_of(config);

        let SimulationContext {
            price_paths,
            loans,
            exits,
            rng,
            ..
        } = ctx;
        let paths = price_paths
            .as_ref()
            .ok_or_else(|| SimError::Internal("price paths missing".to_string()))?;

        let simulator = ExitSimulator::new(
            &config.exits,
            &config.zones,
            paths,
            env.tls,
            config.loans.min_hold_months,
            pd_multiplier,
            rate_shock,
        );

        let total = loans.len().max(1);
        let mut events = Vec::with_capacity(loans.len());
        for (i, loan) in loans.iter_mut().enumerate() {
            token.check()?;
            events.push(simulator.simulate_loan(rng, loan)?);
            if i % 16 == 0 {
                progress.report(i as f64 / total as f64);
            }
        }
        *exits = events;
        progress.report(1.0);
        Ok(())
    }
}

struct ReinvestmentStage;

impl Stage for ReinvestmentStage {
    fn name(&self) -> &'static str {
        "reinvestment"
    }
    fn deps(&self) -> &'static [&'static str] {
        &["exit_simulation"]
    }
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        token: &CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError> {
        let config = env.config;
        let (_, rate_shock, pd_multiplier) = shock_of(config);

        let SimulationContext {
            price_paths,
            loans,
            exits,
            reinvestment,
            rng,
            ..
        } = ctx;
        let paths = price_paths
            .as_ref()
            .ok_or_else(|| SimError::Internal("price paths missing".to_string()))?;

        let generator = LoanGenerator::new(
            &config.loans,
            env.tls,
            config.term_months(),
            config.fees.origination_fee_rate,
        );
        let exit_simulator = ExitSimulator::new(
            &config.exits,
            &config.zones,
            paths,
            env.tls,
            config.loans.min_hold_months,
            pd_multiplier,
            rate_shock,
        );
        let engine = ReinvestmentEngine::new(
            &config.reinvestment,
            &config.zone_allocations,
            &config.zone_caps,
            paths,
            config.loans.min_size,
        );

        let mut next_loan_id = loans.iter().map(|l| l.id).max().unwrap_or(0);
        let horizon = config.reinvestment.horizon_months.max(1);
        let summary = engine.run(
            rng,
            &generator,
            &exit_simulator,
            loans,
            exits,
            &mut next_loan_id,
            |month| {
                token.check()?;
                progress.report(month as f64 / horizon as f64);
                Ok(())
            },
        )?;

        progress.intermediate(json!({
            "loans_originated": summary.loans_originated,
            "total_invested": summary.total_invested,
        }));
        *reinvestment = Some(summary);
        progress.report(1.0);
        Ok(())
    }
}

struct LeverageStage;

impl Stage for LeverageStage {
    fn name(&self) -> &'static str {
        "leverage"
    }
    fn deps(&self) -> &'static [&'static str] {
        &["reinvestment"]
    }
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        token: &CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError> {
        token.check()?;
        let config = env.config;
        let horizon = config.term_months();
        let (_, rate_shock, _) = shock_of(config);
        let paths = ctx
            .price_paths
            .as_ref()
            .ok_or_else(|| SimError::Internal("price paths missing".to_string()))?;

        let investment = investment_by_month(&ctx.loans, horizon);
        let proceeds = proceeds_by_month(&ctx.exits, horizon);
        // Leverage sizes itself on config-derived accrual estimates; the
        // fee stage refines the actuals afterwards.
        let expenses = config
            .fees
            .accrual_estimate_by_month(config.fund.fund_size, horizon);
        let nav = nav_series(&ctx.loans, paths, horizon);

        let inputs = LeverageInputs {
            committed_capital: config.fund.fund_size,
            initial_call: investment[0] + expenses[0],
            investment_by_month: &investment,
            proceeds_by_month: &proceeds,
            expense_by_month: &expenses,
            nav_by_month: &nav,
        };
        let schedule =
            LeverageEngine::new(&config.leverage).run(&ctx.rng, horizon, &inputs, rate_shock.unwrap_or(0.0));

        progress.intermediate(json!({
            "total_drawn": schedule.total_drawn,
            "peak_outstanding": schedule.peak_outstanding,
        }));
        ctx.leverage = Some(schedule);
        progress.report(1.0);
        Ok(())
    }
}

struct FeeStage;

impl Stage for FeeStage {
    fn name(&self) -> &'static str {
        "fees"
    }
    fn deps(&self) -> &'static [&'static str] {
        &["leverage"]
    }
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        token: &CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError> {
        token.check()?;
        let config = env.config;
        let horizon = config.term_months();
        let paths = ctx
            .price_paths
            .as_ref()
            .ok_or_else(|| SimError::Internal("price paths missing".to_string()))?;

        let nav = nav_series(&ctx.loans, paths, horizon);
        let origination = origination_income_by_month(&ctx.loans, horizon);
        let gross = exit_gross_by_month(&ctx.exits, horizon);

        let schedule = FeeEngine::new(&config.fees).run(
            horizon,
            config.fund.fund_size,
            &nav,
            &origination,
            &gross,
        );
        ctx.fees = Some(schedule);
        progress.report(1.0);
        Ok(())
    }
}

struct CashflowStage;

impl Stage for CashflowStage {
    fn name(&self) -> &'static str {
        "cashflow_aggregation"
    }
    fn deps(&self) -> &'static [&'static str] {
        &["exit_simulation", "reinvestment", "leverage", "fees"]
    }
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        token: &CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError> {
        let config = env.config;
        let horizon = config.term_months();
        let paths = ctx
            .price_paths
            .as_ref()
            .ok_or_else(|| SimError::Internal("price paths missing".to_string()))?;
        let fees = ctx
            .fees
            .as_ref()
            .ok_or_else(|| SimError::Internal("fee schedule missing".to_string()))?;
        let leverage = ctx
            .leverage
            .as_ref()
            .ok_or_else(|| SimError::Internal("leverage schedule missing".to_string()))?;

        let aggregator = CashflowAggregator::new(&ctx.loans, &ctx.exits, fees, leverage, paths);
        let ledger = aggregator.build(horizon, |month| {
            token.check()?;
            progress.report(month as f64 / horizon as f64);
            Ok(())
        })?;

        progress.intermediate(json!({
            "contributions": ledger.summary.total_contributions,
            "distributions": ledger.summary.total_distributions,
            "irr": ledger.summary.irr,
        }));
        ctx.cashflows = Some(ledger);
        progress.report(1.0);
        Ok(())
    }
}

struct WaterfallStage;

impl Stage for WaterfallStage {
    fn name(&self) -> &'static str {
        "waterfall"
    }
    fn deps(&self) -> &'static [&'static str] {
        &["cashflow_aggregation"]
    }
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        token: &CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError> {
        token.check()?;
        let ledger = ctx
            .cashflows
            .as_ref()
            .ok_or_else(|| SimError::Internal("cashflow ledger missing".to_string()))?;

        let engine = WaterfallEngine::new(env.config.waterfall_params());
        let result = engine.run(ledger, &ctx.loans, &ctx.exits);

        progress.intermediate(json!({
            "structure": result.structure,
            "lp_total": result.lp_total,
            "gp_total": result.gp_total,
            "clawback": result.clawback,
        }));
        ctx.waterfall = Some(result);
        progress.report(1.0);
        Ok(())
    }
}

struct RiskStage;

impl Stage for RiskStage {
    fn name(&self) -> &'static str {
        "risk_metrics"
    }
    fn deps(&self) -> &'static [&'static str] {
        &["waterfall"]
    }
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        token: &CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError> {
        token.check()?;
        let config = env.config;
        let horizon = config.term_months();
        let paths = ctx
            .price_paths
            .as_ref()
            .ok_or_else(|| SimError::Internal("price paths missing".to_string()))?;
        let ledger = ctx
            .cashflows
            .as_ref()
            .ok_or_else(|| SimError::Internal("cashflow ledger missing".to_string()))?;

        let nav = nav_series(&ctx.loans, paths, horizon);
        let mut metrics = RiskEngine::new(&config.risk).compute(
            ledger,
            &nav,
            &paths.market_index,
            &ctx.loans,
        );

        // Keep diagnostics recorded by earlier stages (correlation
        // fallback) on the final metric set.
        if let Some(existing) = ctx.risk_metrics.take() {
            metrics.diagnostics.extend(existing.diagnostics);
            metrics.stress_outcomes.extend(existing.stress_outcomes);
        }
        ctx.risk_metrics = Some(metrics);
        progress.report(1.0);
        Ok(())
    }
}

struct StressStage;

impl Stage for StressStage {
    fn name(&self) -> &'static str {
        "stress_tests"
    }
    fn deps(&self) -> &'static [&'static str] {
        &["risk_metrics"]
    }
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        token: &CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError> {
        let config = env.config;
        // Stress variants run with the stress stage disabled; nothing to do
        // inside a variant or when switched off.
        if !config.risk.run_stress_tests || config.applied_shock.is_some() {
            progress.report(1.0);
            return Ok(());
        }

        let base_irr = ctx.cashflows.as_ref().and_then(|c| c.summary.irr);
        let shocks = if config.risk.stress.is_empty() {
            StressShock::standard_catalogue()
        } else {
            config.risk.stress.clone()
        };

        let mut outcomes = Vec::with_capacity(shocks.len());
        let total = shocks.len().max(1);
        for (i, shock) in shocks.into_iter().enumerate() {
            token.check()?;

            let mut variant = config.clone();
            variant.applied_shock = Some(shock.clone());
            variant.risk.run_stress_tests = false;

            let result = run_path(
                &variant,
                env.tls,
                format!("{}/stress/{}", ctx.run_id, shock.name),
                ctx.path_index,
                ctx.seed,
                token,
                &NullSink,
            );
            if matches!(result.status, RunStatus::Cancelled { .. }) {
                return Err(SimError::Cancelled);
            }

            let summary = result.context.cashflows.as_ref().map(|c| &c.summary);
            let irr = summary.and_then(|s| s.irr);
            outcomes.push(StressOutcome {
                name: shock.name,
                irr,
                equity_multiple: summary.and_then(|s| s.equity_multiple),
                irr_delta_vs_base: match (irr, base_irr) {
                    (Some(a), Some(b)) => Some(a - b),
                    _ => None,
                },
                guardrail_fail: result
                    .context
                    .guardrail_report
                    .as_ref()
                    .map(|r| r.has_fail())
                    .unwrap_or(false),
            });
            progress.report((i + 1) as f64 / total as f64);
        }

        ctx.risk_metrics
            .get_or_insert_with(Default::default)
            .stress_outcomes = outcomes;
        Ok(())
    }
}

struct GuardrailStage;

impl Stage for GuardrailStage {
    fn name(&self) -> &'static str {
        "guardrails"
    }
    fn deps(&self) -> &'static [&'static str] {
        &["risk_metrics", "stress_tests"]
    }
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        token: &CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError> {
        token.check()?;
        let config = env.config;

        let report = {
            let allocation = ctx
                .allocation
                .as_ref()
                .ok_or_else(|| SimError::Internal("allocation missing".to_string()))?;
            let paths = ctx
                .price_paths
                .as_ref()
                .ok_or_else(|| SimError::Internal("price paths missing".to_string()))?;
            let ledger = ctx
                .cashflows
                .as_ref()
                .ok_or_else(|| SimError::Internal("cashflow ledger missing".to_string()))?;
            let leverage = ctx
                .leverage
                .as_ref()
                .ok_or_else(|| SimError::Internal("leverage schedule missing".to_string()))?;
            let risk = ctx
                .risk_metrics
                .as_ref()
                .ok_or_else(|| SimError::Internal("risk metrics missing".to_string()))?;

            guardrails::evaluate(
                &config.guardrails,
                &GuardrailInputs {
                    loans: &ctx.loans,
                    shape: &config.loans,
                    allocation,
                    caps: &config.zone_caps,
                    paths,
                    ledger,
                    leverage,
                    risk,
                    hurdle_rate: config.fund.hurdle_rate,
                    nav_ltv_covenant: config.leverage.nav_facility.ltv_max,
                    fund_term_months: config.term_months(),
                },
            )
        };

        for breach in &report.breaches {
            progress.violation(
                breach.code.to_string(),
                breach.severity,
                breach.message.clone(),
                Some(json!({
                    "value": breach.value,
                    "threshold": breach.threshold,
                    "layer": breach.layer,
                })),
            );
        }
        ctx.guardrail_report = Some(report);
        progress.report(1.0);
        Ok(())
    }
}

struct ReportStage;

impl Stage for ReportStage {
    fn name(&self) -> &'static str {
        "performance_report"
    }
    fn deps(&self) -> &'static [&'static str] {
        &["guardrails"]
    }
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        token: &CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError> {
        token.check()?;
        let bundle = report::build(env.config, ctx)?;
        ctx.report = Some(bundle);
        progress.report(1.0);
        Ok(())
    }
}

// ── Entry points ──────────────────────────────────────────────────────

/// Register the full pipeline and compute its schedule.
pub fn build_pipeline() -> Result<Orchestrator, SimError> {
    let mut orchestrator = Orchestrator::new();
    orchestrator.register(Box::new(CapitalAllocationStage));
    orchestrator.register(Box::new(LoanGenerationStage));
    orchestrator.register(Box::new(PricePathStage));
    orchestrator.register(Box::new(ExitSimulationStage));
    orchestrator.register(Box::new(ReinvestmentStage));
    orchestrator.register(Box::new(LeverageStage));
    orchestrator.register(Box::new(FeeStage));
    orchestrator.register(Box::new(CashflowStage));
    orchestrator.register(Box::new(WaterfallStage));
    orchestrator.register(Box::new(RiskStage));
    orchestrator.register(Box::new(StressStage));
    orchestrator.register(Box::new(GuardrailStage));
    orchestrator.register(Box::new(ReportStage));
    orchestrator.prepare()?;
    Ok(orchestrator)
}

/// Run one path against a pre-built catalogue. Used directly by the Monte
/// Carlo driver and the stress stage.
pub fn run_path(
    config: &Config,
    tls: &TlsCatalogue,
    run_id: String,
    path_index: usize,
    seed: u64,
    token: &CancelToken,
    sink: &dyn EventSink,
) -> SimulationResult {
    let mut ctx = SimulationContext::new(run_id, path_index, seed);
    let status = match build_pipeline() {
        Ok(orchestrator) => {
            let env = StageEnv { config, tls };
            orchestrator.run(&env, &mut ctx, token, sink)
        }
        Err(e) => RunStatus::Failed {
            stage: "pipeline",
            error: e.to_string(),
        },
    };
    SimulationResult { context: ctx, status }
}

/// Result-event payload: headline numbers plus the guardrail report so the
/// consumer can colour severities without another round-trip.
pub fn result_payload(result: &SimulationResult) -> serde_json::Value {
    let ctx = &result.context;
    let summary = ctx.cashflows.as_ref().map(|c| &c.summary);
    json!({
        "status": &result.status,
        "loan_count": ctx.loans.len(),
        "irr": summary.and_then(|s| s.irr),
        "equity_multiple": summary.and_then(|s| s.equity_multiple),
        "tvpi": summary.and_then(|s| s.tvpi),
        "dpi": summary.and_then(|s| s.dpi),
        "lp_total": ctx.waterfall.as_ref().map(|w| w.lp_total),
        "gp_total": ctx.waterfall.as_ref().map(|w| w.gp_total),
        "clawback": ctx.waterfall.as_ref().map(|w| w.clawback),
        "guardrail_worst": ctx
            .guardrail_report
            .as_ref()
            .and_then(|r| r.worst_level())
            .map(|s| s.wire_label()),
        "guardrail_report": &ctx.guardrail_report,
        "stage_timings": &ctx.stage_timings,
    })
}

/// Primary in-process entry point: validate, build the shared catalogue,
/// run one path, emit the terminal `result` event.
pub fn run(
    config: &Config,
    seed: u64,
    token: &CancelToken,
    sink: &dyn EventSink,
) -> Result<SimulationResult, SimError> {
    config.validate()?;
    let tls = TlsCatalogue::build(&config.catalogue, seed);
    let started = std::time::Instant::now();

    let result = run_path(
        config,
        &tls,
        format!("run-{seed}"),
        0,
        seed,
        token,
        sink,
    );

    if result.is_completed() {
        sink.emit(SimEvent {
            run_id: result.context.run_id.clone(),
            kind: EventKind::Result {
                result: result_payload(&result),
                execution_time_seconds: started.elapsed().as_secs_f64(),
            },
        });
    }
    Ok(result)
}
