use approx::assert_relative_eq;

use hef_sim::config::Config;
use hef_sim::price_path::{cholesky3, PricePathModel, PricePathSimulator, RegimeParams};
use hef_sim::rng::RngFactory;
use hef_sim::tls::Zone;

const HORIZON: u32 = 120;

fn simulate(config: &Config, seed: u64) -> hef_sim::tls::ZoneMap<Vec<f64>> {
    let simulator = PricePathSimulator::new(
        &config.price_paths,
        &config.zones,
        &config.zone_allocations,
        None,
    );
    let rng = RngFactory::new(seed);
    let (paths, diagnostics) = simulator
        .simulate_zones(&rng, HORIZON, |_| Ok(()))
        .expect("simulate");
    assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
    paths
}

#[test]
fn paths_start_at_one_and_stay_positive() {
    let config = Config::smoke_10m();
    let paths = simulate(&config, 42);
    for zone in Zone::all() {
        let series = paths.get(zone);
        assert_eq!(series.len(), HORIZON as usize + 1);
        assert_eq!(series[0], 1.0);
        for &p in series.iter() {
            assert!(p > 0.0, "{} index must stay positive", zone.name());
        }
    }
}

#[test]
fn paths_are_deterministic_per_seed() {
    let config = Config::smoke_10m();
    let a = simulate(&config, 42);
    let b = simulate(&config, 42);
    for zone in Zone::all() {
        for (x, y) in a.get(zone).iter().zip(b.get(zone).iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }
    let c = simulate(&config, 7);
    assert_ne!(a.get(Zone::Green)[12], c.get(Zone::Green)[12]);
}

#[test]
fn mean_reverting_model_tracks_its_trend() {
    let mut config = Config::smoke_10m();
    config.price_paths.model = PricePathModel::MeanReverting {
        kappa: 2.0,
        theta: 0.0,
    };
    let paths = simulate(&config, 42);
    // Strong reversion keeps the index near its drift trend.
    let green = paths.get(Zone::Green);
    let trend = (config.zones.green.appreciation_mean * 10.0).exp();
    assert!(green[120] > trend * 0.5 && green[120] < trend * 2.0);
}

#[test]
fn regime_switching_model_runs_and_differs_from_gbm() {
    let mut config = Config::smoke_10m();
    config.price_paths.model = PricePathModel::RegimeSwitching {
        bull: RegimeParams {
            drift_adjust: 0.02,
            vol_multiplier: 0.8,
        },
        bear: RegimeParams {
            drift_adjust: -0.10,
            vol_multiplier: 1.6,
        },
        p_bull_to_bear: 0.05,
        p_bear_to_bull: 0.20,
    };
    let regime = simulate(&config, 42);

    let gbm = simulate(&Config::smoke_10m(), 42);
    assert_ne!(
        regime.get(Zone::Green)[60].to_bits(),
        gbm.get(Zone::Green)[60].to_bits()
    );
}

#[test]
fn cholesky_rejects_non_positive_definite_matrix() {
    // Perfectly redundant correlations are not PD.
    let bad = [[1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0]];
    assert!(cholesky3(&bad).is_err());

    let good = [[1.0, 0.6, 0.4], [0.6, 1.0, 0.5], [0.4, 0.5, 1.0]];
    let l = cholesky3(&good).expect("pd matrix");
    // L L^T must reproduce the input.
    for i in 0..3 {
        for j in 0..3 {
            let mut sum = 0.0;
            for k in 0..3 {
                sum += l[i][k] * l[j][k];
            }
            assert_relative_eq!(sum, good[i][j], epsilon = 1e-12);
        }
    }
}

#[test]
fn bad_correlation_falls_back_with_diagnostic() {
    let mut config = Config::smoke_10m();
    config.price_paths.correlation = [[1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0]];
    let simulator = PricePathSimulator::new(
        &config.price_paths,
        &config.zones,
        &config.zone_allocations,
        None,
    );
    let rng = RngFactory::new(42);
    let (paths, diagnostics) = simulator
        .simulate_zones(&rng, 24, |_| Ok(()))
        .expect("falls back");
    assert!(!diagnostics.is_empty());
    assert!(paths.get(Zone::Green).iter().all(|&p| p > 0.0));
}

#[test]
fn price_shock_scales_the_level() {
    let config = Config::smoke_10m();
    let baseline = simulate(&config, 42);

    let shocked_sim = PricePathSimulator::new(
        &config.price_paths,
        &config.zones,
        &config.zone_allocations,
        Some(-0.30),
    );
    let rng = RngFactory::new(42);
    let (shocked, _) = shocked_sim
        .simulate_zones(&rng, HORIZON, |_| Ok(()))
        .expect("simulate");

    for zone in Zone::all() {
        assert_eq!(shocked.get(zone)[0], 1.0);
        for m in 1..=HORIZON as usize {
            assert_relative_eq!(
                shocked.get(zone)[m],
                baseline.get(zone)[m] * 0.7,
                epsilon = 1e-9
            );
        }
    }
}

#[test]
fn property_multipliers_start_at_one() {
    let config = Config::smoke_10m();
    let tls = hef_sim::tls::TlsCatalogue::build(&config.catalogue, 42);
    let rng = RngFactory::new(42);

    let generator = hef_sim::loans::LoanGenerator::new(
        &config.loans,
        &tls,
        config.term_months(),
        config.fees.origination_fee_rate,
    );
    let budgets = config.zone_allocations.map(|_, f| config.fund.fund_size * f);
    let mut next_id = 0;
    let mut used = std::collections::HashSet::new();
    let loans = generator
        .generate_initial(&rng, &budgets, &mut next_id, &mut used)
        .expect("generate")
        .loans;

    let simulator = PricePathSimulator::new(
        &config.price_paths,
        &config.zones,
        &config.zone_allocations,
        None,
    );
    let multipliers = simulator
        .simulate_property_multipliers(&rng, &tls, &loans, HORIZON)
        .expect("multipliers");

    assert_eq!(multipliers.len(), loans.len());
    for series in multipliers.values() {
        assert_eq!(series[0], 1.0);
        assert!(series.iter().all(|&m| m > 0.0));
    }
}

#[test]
fn cancellation_propagates_from_the_month_callback() {
    let config = Config::smoke_10m();
    let simulator = PricePathSimulator::new(
        &config.price_paths,
        &config.zones,
        &config.zone_allocations,
        None,
    );
    let rng = RngFactory::new(42);
    let result = simulator.simulate_zones(&rng, HORIZON, |month| {
        if month > 3 {
            Err(hef_sim::SimError::Cancelled)
        } else {
            Ok(())
        }
    });
    assert!(matches!(result, Err(hef_sim::SimError::Cancelled)));
}
