use hef_sim::config::Config;
use hef_sim::engine;
use hef_sim::events::{CancelToken, NullSink};
use hef_sim::guardrails::{fail_rate, Breach, GuardrailLayer, GuardrailReport, Severity};

fn breach(code: &'static str, severity: Severity) -> Breach {
    Breach {
        code,
        severity,
        value: 1.0,
        threshold: 0.5,
        layer: GuardrailLayer::Portfolio,
        message: String::from("test breach"),
    }
}

#[test]
fn severity_order_is_fail_over_warn_over_info() {
    assert!(Severity::Fail > Severity::Warn);
    assert!(Severity::Warn > Severity::Info);
    assert_eq!(Severity::Fail.label(), "FAIL");
    assert_eq!(Severity::Warn.wire_label(), "warning");
    assert_eq!(Severity::Fail.wire_label(), "error");
}

#[test]
fn worst_level_is_the_max_over_breaches() {
    let mut report = GuardrailReport::default();
    assert_eq!(report.worst_level(), None);

    report.breaches.push(breach("A", Severity::Info));
    assert_eq!(report.worst_level(), Some(Severity::Info));

    report.breaches.push(breach("B", Severity::Fail));
    report.breaches.push(breach("C", Severity::Warn));
    assert_eq!(report.worst_level(), Some(Severity::Fail));
    assert!(report.has_fail());
}

#[test]
fn fail_rate_counts_failing_paths() {
    let clean = GuardrailReport::default();
    let mut warned = GuardrailReport::default();
    warned.breaches.push(breach("W", Severity::Warn));
    let mut failed = GuardrailReport::default();
    failed.breaches.push(breach("F", Severity::Fail));

    assert_eq!(fail_rate(&[]), 0.0);
    assert_eq!(fail_rate(&[&clean, &warned]), 0.0);
    assert_eq!(fail_rate(&[&clean, &warned, &failed, &failed]), 0.5);
}

#[test]
fn smoke_run_produces_a_report_without_fail() {
    let mut config = Config::smoke_10m();
    config.risk.run_stress_tests = false;
    let token = CancelToken::new();
    let result = engine::run(&config, 42, &token, &NullSink).expect("run");
    assert!(result.is_completed());

    let report = result.context.guardrail_report.as_ref().expect("report");
    // The monitor never raises; a healthy book may still warn.
    assert!(
        report.worst_level() <= Some(Severity::Warn),
        "unexpected FAIL: {:?}",
        report
            .breaches
            .iter()
            .filter(|b| b.severity == Severity::Fail)
            .map(|b| b.code)
            .collect::<Vec<_>>()
    );
}

#[test]
fn breaches_do_not_block_downstream_stages() {
    // Even a book engineered to fail guardrails completes the pipeline.
    let mut config = Config::smoke_10m();
    config.risk.run_stress_tests = false;
    config.guardrails.default_rate_fail = 0.0001;
    config.guardrails.portfolio_ltv_fail = 0.01;
    let token = CancelToken::new();
    let result = engine::run(&config, 42, &token, &NullSink).expect("run");
    assert!(result.is_completed());

    let report = result.context.guardrail_report.as_ref().expect("report");
    assert!(report.has_fail());
    assert!(result.context.report.is_some(), "reporter ran after FAILs");
}
