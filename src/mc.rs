//! Monte Carlo driver: fans out N independent paths that differ only by
//! seed, then aggregates distributional results.
//!
//! Paths share only immutable inputs (config, catalogue, sink, token).
//! Results are merged in path-id order, never completion order, so the
//! aggregated output is bitwise identical for any worker count. The rayon
//! pool is sized explicitly from the `workers` argument.

use std::sync::Mutex;

use rayon::prelude::*;
use serde::Serialize;

use crate::config::Config;
use crate::context::{RunStatus, SimulationContext};
use crate::engine::{self, SimulationResult};
use crate::error::SimError;
use crate::events::{CancelToken, EventKind, EventSink, SimEvent};
use crate::guardrails::{self, Severity};
use crate::risk::{self, empirical_quantile};
use crate::rng;
use crate::tls::TlsCatalogue;

/// Mean/median/percentile summary of one metric across paths.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DistributionSummary {
    pub mean: f64,
    pub median: f64,
    pub p5: f64,
    pub p25: f64,
    pub p75: f64,
    pub p95: f64,
    pub min: f64,
    pub max: f64,
}

impl DistributionSummary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        let q = |p: f64| empirical_quantile(&finite, p).unwrap_or(0.0);
        Some(DistributionSummary {
            mean: risk::mean(&finite),
            median: q(0.5),
            p5: q(0.05),
            p25: q(0.25),
            p75: q(0.75),
            p95: q(0.95),
            min: finite.iter().copied().fold(f64::INFINITY, f64::min),
            max: finite.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

/// Headline numbers for one path, in path-id order.
#[derive(Debug, Clone, Serialize)]
pub struct PathSummary {
    pub path: usize,
    pub seed: u64,
    pub completed: bool,
    pub irr: Option<f64>,
    pub equity_multiple: Option<f64>,
    pub total_distributions: Option<f64>,
    pub guardrail_worst: Option<Severity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyDistribution {
    pub month: u32,
    pub net: Option<DistributionSummary>,
    pub cumulative: Option<DistributionSummary>,
    pub distribution: Option<DistributionSummary>,
}

/// A candidate on the risk/return efficient frontier.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FrontierPoint {
    pub path: usize,
    pub risk: f64,
    pub ret: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct McDistributions {
    pub irr: Option<DistributionSummary>,
    pub equity_multiple: Option<DistributionSummary>,
    pub tvpi: Option<DistributionSummary>,
    pub total_distributions: Option<DistributionSummary>,
    pub max_drawdown: Option<DistributionSummary>,
}

#[derive(Debug)]
pub struct McResult {
    pub n_paths: usize,
    pub workers: usize,
    pub cancelled: bool,
    pub path_summaries: Vec<PathSummary>,
    pub distributions: McDistributions,
    pub monthly: Vec<MonthlyDistribution>,
    /// P(IRR >= hurdle) across completed paths.
    pub hurdle_clear_probability: Option<f64>,
    pub guardrail_fail_rate: f64,
    /// Empirical VaR/CVaR on terminal equity multiples.
    pub var_empirical: Option<f64>,
    pub cvar_empirical: Option<f64>,
    pub frontier: Vec<FrontierPoint>,
    /// Full per-path results, in path-id order.
    pub results: Vec<SimulationResult>,
}

/// Driver progress that stays monotonic under parallel completion.
struct DriverProgress<'a> {
    sink: &'a dyn EventSink,
    run_id: String,
    total: usize,
    state: Mutex<usize>,
}

impl<'a> DriverProgress<'a> {
    fn path_done(&self) {
        let mut done = self.state.lock().expect("driver progress lock");
        *done += 1;
        let fraction = *done as f64 / self.total as f64;
        self.sink.emit(SimEvent {
            run_id: self.run_id.clone(),
            kind: EventKind::Progress {
                module: "monte_carlo",
                fraction,
                message: Some(format!("{}/{} paths", *done, self.total)),
            },
        });
    }
}

pub fn run_mc(
    config: &Config,
    seed: u64,
    n_paths: usize,
    workers: usize,
    token: &CancelToken,
    sink: &dyn EventSink,
) -> Result<McResult, SimError> {
    config.validate()?;
    if n_paths == 0 {
        return Err(SimError::config("n_paths must be at least 1"));
    }
    let tls = TlsCatalogue::build(&config.catalogue, seed);
    let started = std::time::Instant::now();

    let driver_id = format!("mc-{seed}");
    let progress = DriverProgress {
        sink,
        run_id: driver_id.clone(),
        total: n_paths,
        state: Mutex::new(0),
    };

    let run_one = |p: usize| -> SimulationResult {
        let path_seed = rng::path_seed(seed, p);
        if token.is_cancelled() {
            // Not started: report as cancelled before the first stage.
            return SimulationResult {
                context: SimulationContext::new(format!("{driver_id}-p{p}"), p, path_seed),
                status: RunStatus::Cancelled {
                    stage: "monte_carlo",
                },
            };
        }
        let result = engine::run_path(
            config,
            &tls,
            format!("{driver_id}-p{p}"),
            p,
            path_seed,
            token,
            sink,
        );
        progress.path_done();
        result
    };

    let results: Vec<SimulationResult> = if workers <= 1 {
        (0..n_paths).map(run_one).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| SimError::Internal(format!("worker pool: {e}")))?;
        pool.install(|| (0..n_paths).into_par_iter().map(run_one).collect())
    };

    let mc = aggregate(config, seed, n_paths, workers, token.is_cancelled(), results);

    sink.emit(SimEvent {
        run_id: driver_id,
        kind: EventKind::Result {
            result: summary_payload(&mc),
            execution_time_seconds: started.elapsed().as_secs_f64(),
        },
    });
    Ok(mc)
}

fn aggregate(
    config: &Config,
    seed: u64,
    n_paths: usize,
    workers: usize,
    cancelled: bool,
    results: Vec<SimulationResult>,
) -> McResult {
    let path_summaries: Vec<PathSummary> = results
        .iter()
        .enumerate()
        .map(|(p, r)| {
            let summary = r.context.cashflows.as_ref().map(|c| &c.summary);
            PathSummary {
                path: p,
                seed: rng::path_seed(seed, p),
                completed: r.is_completed(),
                irr: summary.and_then(|s| s.irr),
                equity_multiple: summary.and_then(|s| s.equity_multiple),
                total_distributions: summary.map(|s| s.total_distributions),
                guardrail_worst: r
                    .context
                    .guardrail_report
                    .as_ref()
                    .and_then(|g| g.worst_level()),
            }
        })
        .collect();

    let completed: Vec<&SimulationResult> =
        results.iter().filter(|r| r.is_completed()).collect();

    let collect =
        |f: &dyn Fn(&SimulationResult) -> Option<f64>| -> Vec<f64> {
            completed.iter().filter_map(|r| f(r)).collect()
        };

    let irrs = collect(&|r| r.context.cashflows.as_ref().and_then(|c| c.summary.irr));
    let multiples = collect(&|r| {
        r.context
            .cashflows
            .as_ref()
            .and_then(|c| c.summary.equity_multiple)
    });
    let tvpis = collect(&|r| r.context.cashflows.as_ref().and_then(|c| c.summary.tvpi));
    let dists = collect(&|r| {
        r.context
            .cashflows
            .as_ref()
            .map(|c| c.summary.total_distributions)
    });
    let drawdowns = collect(&|r| {
        r.context
            .risk_metrics
            .as_ref()
            .and_then(|m| m.max_drawdown)
    });

    let distributions = McDistributions {
        irr: DistributionSummary::from_values(&irrs),
        equity_multiple: DistributionSummary::from_values(&multiples),
        tvpi: DistributionSummary::from_values(&tvpis),
        total_distributions: DistributionSummary::from_values(&dists),
        max_drawdown: DistributionSummary::from_values(&drawdowns),
    };

    // Per-month ledger distributions across completed paths.
    let horizon = config.term_months();
    let monthly: Vec<MonthlyDistribution> = (0..=horizon)
        .map(|m| {
            let pick = |f: &dyn Fn(&crate::cashflow::CashflowRow) -> f64| -> Vec<f64> {
                completed
                    .iter()
                    .filter_map(|r| r.context.cashflows.as_ref())
                    .filter_map(|c| c.rows.get(m as usize))
                    .map(f)
                    .collect()
            };
            MonthlyDistribution {
                month: m,
                net: DistributionSummary::from_values(&pick(&|r| r.net)),
                cumulative: DistributionSummary::from_values(&pick(&|r| r.cumulative)),
                distribution: DistributionSummary::from_values(&pick(&|r| r.distribution)),
            }
        })
        .collect();

    let hurdle_clear_probability = if irrs.is_empty() {
        None
    } else {
        let clears = irrs
            .iter()
            .filter(|&&r| r >= config.fund.hurdle_rate)
            .count();
        Some(clears as f64 / irrs.len() as f64)
    };

    let reports: Vec<&guardrails::GuardrailReport> = completed
        .iter()
        .filter_map(|r| r.context.guardrail_report.as_ref())
        .collect();
    let guardrail_fail_rate = guardrails::fail_rate(&reports);

    // Empirical tail risk on terminal equity multiples: losses relative to
    // paid-in capital.
    let confidence = config.risk.var_confidence;
    let losses: Vec<f64> = multiples.iter().map(|m| 1.0 - m).collect();
    let var_empirical = empirical_quantile(&losses, confidence);
    let cvar_empirical = var_empirical.map(|var| {
        let tail: Vec<f64> = losses.iter().copied().filter(|&l| l >= var).collect();
        if tail.is_empty() {
            var
        } else {
            risk::mean(&tail)
        }
    });

    // Efficient-frontier candidates: Pareto-optimal (volatility, IRR)
    // pairs across paths, in rising-risk order.
    let mut points: Vec<FrontierPoint> = completed
        .iter()
        .filter_map(|r| {
            let vol = r.context.risk_metrics.as_ref()?.volatility?;
            let irr = r.context.cashflows.as_ref()?.summary.irr?;
            Some(FrontierPoint {
                path: r.context.path_index,
                risk: vol,
                ret: irr,
            })
        })
        .collect();
    points.sort_by(|a, b| {
        a.risk
            .partial_cmp(&b.risk)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.path.cmp(&b.path))
    });
    let mut frontier = Vec::new();
    let mut best_ret = f64::NEG_INFINITY;
    for point in points {
        if point.ret > best_ret {
            best_ret = point.ret;
            frontier.push(point);
        }
    }

    McResult {
        n_paths,
        workers,
        cancelled,
        path_summaries,
        distributions,
        monthly,
        hurdle_clear_probability,
        guardrail_fail_rate,
        var_empirical,
        cvar_empirical,
        frontier,
        results,
    }
}

fn summary_payload(mc: &McResult) -> serde_json::Value {
    serde_json::json!({
        "n_paths": mc.n_paths,
        "workers": mc.workers,
        "cancelled": mc.cancelled,
        "completed_paths": mc.path_summaries.iter().filter(|p| p.completed).count(),
        "distributions": mc.distributions,
        "hurdle_clear_probability": mc.hurdle_clear_probability,
        "guardrail_fail_rate": mc.guardrail_fail_rate,
        "var_empirical": mc.var_empirical,
        "cvar_empirical": mc.cvar_empirical,
    })
}
