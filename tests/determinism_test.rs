/// Determinism: the same (config, seed) must reproduce loans, cashflows,
/// waterfall and risk metrics exactly.
use hef_sim::config::Config;
use hef_sim::engine;
use hef_sim::events::{CancelToken, NullSink};

fn fingerprint(result: &engine::SimulationResult) -> String {
    let ctx = &result.context;
    serde_json::to_string(&(
        &ctx.loans,
        &ctx.exits,
        ctx.cashflows.as_ref().map(|c| &c.rows),
        ctx.cashflows.as_ref().map(|c| &c.summary),
        &ctx.waterfall,
        ctx.risk_metrics.as_ref().map(|r| {
            (
                r.volatility,
                r.sharpe,
                r.var,
                r.cvar,
                r.hhi_zone,
                r.hhi_suburb,
                r.max_drawdown,
            )
        }),
        &ctx.guardrail_report,
    ))
    .expect("serialise context")
}

#[test]
fn identical_seed_identical_output() {
    let mut config = Config::smoke_10m();
    config.risk.run_stress_tests = false;
    let token = CancelToken::new();

    let a = engine::run(&config, 42, &token, &NullSink).expect("first");
    let b = engine::run(&config, 42, &token, &NullSink).expect("second");
    assert!(a.is_completed() && b.is_completed());
    assert_eq!(fingerprint(&a), fingerprint(&b));
}

#[test]
fn different_seed_different_output() {
    let mut config = Config::smoke_10m();
    config.risk.run_stress_tests = false;
    let token = CancelToken::new();

    let a = engine::run(&config, 42, &token, &NullSink).expect("a");
    let b = engine::run(&config, 43, &token, &NullSink).expect("b");
    assert_ne!(fingerprint(&a), fingerprint(&b));
}

#[test]
fn float_fields_match_bit_for_bit() {
    let mut config = Config::smoke_10m();
    config.risk.run_stress_tests = false;
    let token = CancelToken::new();

    let a = engine::run(&config, 7, &token, &NullSink).expect("a");
    let b = engine::run(&config, 7, &token, &NullSink).expect("b");

    let la = &a.context.loans;
    let lb = &b.context.loans;
    assert_eq!(la.len(), lb.len());
    for (x, y) in la.iter().zip(lb.iter()) {
        assert_eq!(x.principal.to_bits(), y.principal.to_bits());
        assert_eq!(x.ltv.to_bits(), y.ltv.to_bits());
        assert_eq!(x.exit_value.map(f64::to_bits), y.exit_value.map(f64::to_bits));
    }

    let ra = &a.context.cashflows.as_ref().expect("ledger").rows;
    let rb = &b.context.cashflows.as_ref().expect("ledger").rows;
    for (x, y) in ra.iter().zip(rb.iter()) {
        assert_eq!(x.net.to_bits(), y.net.to_bits());
        assert_eq!(x.cumulative.to_bits(), y.cumulative.to_bits());
        assert_eq!(x.distribution.to_bits(), y.distribution.to_bits());
    }
}
