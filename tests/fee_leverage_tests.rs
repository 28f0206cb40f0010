use approx::assert_relative_eq;

use hef_sim::fees::{FeeConfig, FeeEngine, FeeStep};
use hef_sim::leverage::{simulate_base_rate, BaseRateConfig, LeverageConfig, LeverageEngine, LeverageInputs};
use hef_sim::rng::RngFactory;

#[test]
fn stepped_management_fee_switches_at_the_step() {
    let mut config = FeeConfig::default();
    config.management_fee_rate = 0.02;
    config.fee_steps = vec![FeeStep {
        from_month: 60,
        annual_rate: 0.015,
    }];
    assert_eq!(config.management_rate_at(0), 0.02);
    assert_eq!(config.management_rate_at(59), 0.02);
    assert_eq!(config.management_rate_at(60), 0.015);
    assert_eq!(config.management_rate_at(119), 0.015);
}

#[test]
fn fee_engine_accrues_all_buckets() {
    let config = FeeConfig::default();
    let horizon = 24;
    let nav = vec![10_000_000.0; horizon as usize + 1];
    let mut origination = vec![0.0; horizon as usize + 1];
    origination[0] = 150_000.0;
    let mut gross = vec![0.0; horizon as usize + 1];
    gross[12] = 2_000_000.0;

    let schedule = FeeEngine::new(&config).run(horizon, 10_000_000.0, &nav, &origination, &gross);
    assert_eq!(schedule.rows.len(), horizon as usize + 1);

    // Management fee: 2% of committed, monthly.
    assert_relative_eq!(
        schedule.rows[1].management_fee,
        10_000_000.0 * 0.02 / 12.0,
        epsilon = 1e-9
    );
    // Setup expense lands in month 0 only.
    assert!(schedule.rows[0].fund_expense > schedule.rows[1].fund_expense);
    // Origination income and exit transaction fee flow through.
    assert_relative_eq!(schedule.rows[0].origination_fee, 150_000.0);
    assert_relative_eq!(
        schedule.rows[12].transaction_fee,
        2_000_000.0 * config.transaction_fee_rate,
        epsilon = 1e-9
    );

    assert!(schedule.total_management > 0.0);
    assert!(schedule.lp_borne + schedule.gp_borne > 0.0);
    assert_relative_eq!(
        schedule.lp_borne + schedule.gp_borne,
        schedule.total_management + schedule.total_expenses + schedule.total_transaction,
        epsilon = 1e-6
    );
}

#[test]
fn base_rate_path_is_seeded_and_floored() {
    let config = BaseRateConfig {
        initial: 0.01,
        kappa: 0.5,
        theta: 0.005,
        vol: 0.05,
    };
    let rng = RngFactory::new(42);
    let a = simulate_base_rate(&config, &rng, 120, 0.0);
    let b = simulate_base_rate(&config, &rng, 120, 0.0);
    assert_eq!(a.len(), 121);
    assert_eq!(a, b, "same stream, same path");
    assert!(a.iter().all(|&r| r >= 0.0), "rates never go negative");

    let shocked = simulate_base_rate(&config, &rng, 120, 200.0);
    for (s, base) in shocked.iter().zip(a.iter()) {
        assert!(s >= base, "a +200bps shock never lowers the rate");
    }
}

#[test]
fn disabled_leverage_produces_empty_schedule() {
    let mut config = LeverageConfig::default();
    config.enabled = false;
    let rng = RngFactory::new(42);

    let investment = vec![1_000_000.0, 0.0, 0.0];
    let proceeds = vec![0.0, 0.0, 1_100_000.0];
    let expenses = vec![10_000.0; 3];
    let nav = vec![1_000_000.0; 3];
    let inputs = LeverageInputs {
        committed_capital: 1_000_000.0,
        initial_call: 1_000_000.0,
        investment_by_month: &investment,
        proceeds_by_month: &proceeds,
        expense_by_month: &expenses,
        nav_by_month: &nav,
    };
    let schedule = LeverageEngine::new(&config).run(&rng, 2, &inputs, 0.0);
    assert_eq!(schedule.total_drawn, 0.0);
    assert_eq!(schedule.total_interest, 0.0);
    assert!(schedule.rows.iter().all(|r| r.draw == 0.0 && r.repayment == 0.0));
}

#[test]
fn shortfalls_draw_and_surpluses_repay() {
    let config = LeverageConfig::default();
    let rng = RngFactory::new(42);

    // Month 0: fully invested plus expenses, so the fund is short.
    // Month 6: a large exit repays the line.
    let horizon = 12;
    let mut investment = vec![0.0; horizon + 1];
    investment[0] = 1_000_000.0;
    let mut proceeds = vec![0.0; horizon + 1];
    proceeds[6] = 600_000.0;
    let expenses = vec![5_000.0; horizon + 1];
    let nav = vec![1_000_000.0; horizon + 1];

    let inputs = LeverageInputs {
        committed_capital: 1_000_000.0,
        initial_call: 1_000_000.0,
        investment_by_month: &investment,
        proceeds_by_month: &proceeds,
        expense_by_month: &expenses,
        nav_by_month: &nav,
    };
    let schedule = LeverageEngine::new(&config).run(&rng, horizon as u32, &inputs, 0.0);

    // Early months run a deficit covered by draws.
    assert!(schedule.total_drawn > 0.0);
    let outstanding_before: f64 =
        schedule.rows[5].outstanding_nav + schedule.rows[5].outstanding_sub;
    let outstanding_after: f64 =
        schedule.rows[6].outstanding_nav + schedule.rows[6].outstanding_sub;
    assert!(
        outstanding_after < outstanding_before,
        "the month-6 exit must repay debt"
    );
    assert!(schedule.rows[6].repayment > 0.0);
    assert!(schedule.total_interest > 0.0);
    assert!(schedule.peak_outstanding > 0.0);
}
