/// S6 "-30% prices" and S11 "all defaults": engineered downturns must
/// degrade the economics and surface FAIL guardrails without ever
/// raising.
use hef_sim::config::Config;
use hef_sim::engine;
use hef_sim::events::{CancelToken, NullSink};
use hef_sim::exits::ExitKind;
use hef_sim::guardrails::Severity;
use hef_sim::risk::StressShock;

#[test]
fn price_shock_degrades_irr_and_fails_guardrails() {
    let mut base = Config::smoke_10m();
    base.risk.run_stress_tests = false;
    let token = CancelToken::new();

    let baseline = engine::run(&base, 42, &token, &NullSink).expect("baseline");
    assert!(baseline.is_completed());
    let base_irr = baseline
        .context
        .cashflows
        .as_ref()
        .expect("ledger")
        .summary
        .irr
        .expect("baseline IRR");

    let mut shocked = base.clone();
    shocked.applied_shock = Some(StressShock {
        name: "price_down_30".into(),
        price_shock_pct: Some(-0.30),
        rate_shock_bps: None,
        pd_multiplier: None,
    });

    let stressed = engine::run(&shocked, 42, &token, &NullSink).expect("stressed");
    assert!(stressed.is_completed(), "the engine must not raise under stress");
    let ctx = &stressed.context;

    if let Some(stressed_irr) = ctx.cashflows.as_ref().expect("ledger").summary.irr {
        assert!(
            stressed_irr < base_irr,
            "stressed IRR {stressed_irr:.4} not below baseline {base_irr:.4}"
        );
    }

    let report = ctx.guardrail_report.as_ref().expect("guardrails");
    assert!(
        report.has_fail(),
        "a 30% price drop must trip at least one FAIL guardrail"
    );
    assert!(report
        .breaches
        .iter()
        .any(|b| b.code == "PORTFOLIO_STRESSED_LTV" && b.severity == Severity::Fail));
}

#[test]
fn all_defaults_with_zero_recovery_stays_graceful() {
    let mut config = Config::smoke_10m();
    config.risk.run_stress_tests = false;
    config.reinvestment.enabled = false;
    config.exits.sale_weight = 0.0;
    config.exits.refi_weight = 0.0;
    config.exits.default_weight = 1.0;
    config.exits.base_hazard = 0.05;
    for zone in [
        &mut config.zones.green,
        &mut config.zones.orange,
        &mut config.zones.red,
    ] {
        zone.recovery_rate = 0.0;
        zone.foreclosure_cost_rate = 0.0;
    }

    let token = CancelToken::new();
    let result = engine::run(&config, 42, &token, &NullSink).expect("run");
    assert!(result.is_completed(), "the engine must not raise");
    let ctx = &result.context;

    // Every hazard-fired exit is a default returning nothing.
    let defaults = ctx
        .loans
        .iter()
        .filter(|l| l.exit_kind == Some(ExitKind::Default))
        .count();
    assert!(defaults > ctx.loans.len() / 2, "most loans should default");
    for loan in ctx.loans.iter().filter(|l| l.exit_kind == Some(ExitKind::Default)) {
        assert_eq!(loan.exit_value, Some(0.0));
    }

    let summary = &ctx.cashflows.as_ref().expect("ledger").summary;
    let multiple = summary.equity_multiple.expect("multiple");
    assert!(multiple < 1.0, "wipeout must show a sub-1 multiple, got {multiple:.2}");

    let report = ctx.guardrail_report.as_ref().expect("guardrails");
    assert!(report.has_fail());
    assert!(report
        .breaches
        .iter()
        .any(|b| b.code == "PORTFOLIO_DEFAULT_RATE" && b.severity == Severity::Fail));
}
