/// S2 "100M preset": the documented large-fund config, one path, seed 7.
use hef_sim::config::Config;
use hef_sim::engine;
use hef_sim::events::{CancelToken, NullSink};
use hef_sim::guardrails::Severity;
use hef_sim::tls::Zone;

#[test]
fn preset_is_valid_and_documented() {
    let config = Config::fund_100m();
    config.validate().expect("preset must validate");
    assert_eq!(config.fund.fund_size, 100_000_000.0);
    assert_eq!(config.seed, 7);
    assert_eq!(config.zone_caps.red, 0.05);
}

#[test]
fn preset_run_stays_inside_policy() {
    let mut config = Config::fund_100m();
    config.risk.run_stress_tests = false;
    let token = CancelToken::new();
    let result = engine::run(&config, 7, &token, &NullSink).expect("run");
    assert!(result.is_completed(), "status: {:?}", result.status);
    let ctx = &result.context;

    // Healthy performance band for the documented preset.
    let summary = &ctx.cashflows.as_ref().expect("ledger").summary;
    let irr = summary.irr.expect("IRR defined");
    assert!(
        irr > 0.0 && irr < 0.30,
        "IRR {:.2}% outside the sanity band",
        irr * 100.0
    );
    assert!(summary.equity_multiple.expect("multiple") > 1.0);

    // Every realised allocation respects its cap (with the guardrail
    // tolerance).
    let allocation = ctx.allocation.as_ref().expect("allocation");
    let actual = allocation.actual.as_ref().expect("actual");
    for zone in Zone::all() {
        let weight = *actual.get(zone);
        let cap = *config.zone_caps.get(zone);
        assert!(
            weight <= cap + config.guardrails.zone_weight_tolerance,
            "{} weight {:.3} beyond cap {:.3}",
            zone.name(),
            weight,
            cap
        );
    }

    // No hard guardrail failure on the documented preset.
    let report = ctx.guardrail_report.as_ref().expect("guardrails");
    assert!(
        report.worst_level() <= Some(Severity::Warn),
        "FAILs: {:?}",
        report
            .breaches
            .iter()
            .filter(|b| b.severity == Severity::Fail)
            .map(|b| b.code)
            .collect::<Vec<_>>()
    );
}
