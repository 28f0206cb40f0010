/// S1 "smoke": $10M fund, 10-year term, 60/30/10 allocation, seed 42,
/// one path. Checks the universal invariants on the completed context and
/// that the event stream carries exactly one result event.
use approx::assert_relative_eq;

use hef_sim::config::Config;
use hef_sim::engine;
use hef_sim::events::{CancelToken, ChannelSink, EventKind};
use hef_sim::exits::ExitKind;
use hef_sim::tls::Zone;

#[test]
fn smoke_run_satisfies_universal_invariants() {
    let mut config = Config::smoke_10m();
    config.risk.run_stress_tests = false;
    let token = CancelToken::new();
    let sink = ChannelSink::new(16_384);

    let result = engine::run(&config, 42, &token, &sink).expect("run");
    assert!(result.is_completed(), "status: {:?}", result.status);
    let ctx = &result.context;

    // Loan invariants: bounds, one exit each, recognised exit kinds.
    let initial: Vec<_> = ctx.loans.iter().filter(|l| !l.reinvestment).collect();
    assert!(
        initial.len() >= 25 && initial.len() <= 60,
        "expected ~40 initial loans, got {}",
        initial.len()
    );
    let horizon = config.term_months();
    for loan in &ctx.loans {
        let exit = loan.exit_month.expect("every loan exits");
        assert!(loan.origination_month <= exit);
        assert!(exit <= horizon);
        assert!(matches!(
            loan.exit_kind,
            Some(ExitKind::Sale | ExitKind::Refinance | ExitKind::Default | ExitKind::Term)
        ));
        assert!(loan.ltv > 0.0 && loan.ltv <= config.loans.max_ltv);
        assert!(loan.principal >= config.loans.min_size);
        assert!(loan.principal <= config.loans.max_size);
    }
    assert_eq!(ctx.exits.len(), ctx.loans.len(), "exactly one exit per loan");

    // Allocation invariant: fractions non-negative, summing to one.
    let allocation = ctx.allocation.as_ref().expect("allocation");
    assert!((allocation.target.sum() - 1.0).abs() < 1e-9);
    let actual = allocation.actual.as_ref().expect("actual allocation");
    for (_, &f) in actual.iter() {
        assert!(f >= 0.0);
    }
    assert_relative_eq!(actual.sum(), 1.0, epsilon = 1e-9);

    // Price-path invariant: base 1.0, strictly positive.
    let paths = ctx.price_paths.as_ref().expect("paths");
    for zone in Zone::all() {
        let series = paths.zone_index.get(zone);
        assert_eq!(series[0], 1.0);
        assert!(series.iter().all(|&p| p > 0.0));
    }

    // Ledger invariant: cumulative is the running sum of net.
    let ledger = ctx.cashflows.as_ref().expect("ledger");
    let mut running = 0.0;
    for row in &ledger.rows {
        running += row.net;
        assert_relative_eq!(row.cumulative, running, epsilon = 1e-6);
    }

    // Waterfall conservation: LP + GP totals equal the distribution
    // stream to within 1e-6 of fund size.
    let waterfall = ctx.waterfall.as_ref().expect("waterfall");
    let dist: f64 = ledger.rows.iter().map(|r| r.distribution).sum();
    assert!(
        (waterfall.lp_total + waterfall.gp_total - dist).abs()
            < 1e-6 * config.fund.fund_size
    );

    // Guardrail severity invariant.
    let report = ctx.guardrail_report.as_ref().expect("guardrails");
    let worst = report.worst_level();
    assert_eq!(worst, report.breaches.iter().map(|b| b.severity).max());

    // Reporter bundle exists and reflects the book.
    let bundle = ctx.report.as_ref().expect("report");
    assert_eq!(bundle.kpis.loan_count, ctx.loans.len());
    assert_eq!(bundle.cashflow_series.months.len(), ledger.rows.len());

    // Stage timings cover the whole pipeline.
    assert_eq!(ctx.completed_stages.len(), 13);
    assert_eq!(ctx.stage_timings.len(), 13);

    // Exactly one terminal result event.
    let events = sink.drain();
    let results = events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Result { .. }))
        .count();
    assert_eq!(results, 1, "result event must be emitted exactly once");

    // Progress fractions stay within [0, 1].
    for event in &events {
        if let EventKind::Progress { fraction, .. } = &event.kind {
            assert!((0.0..=1.0).contains(fraction));
        }
    }
}
