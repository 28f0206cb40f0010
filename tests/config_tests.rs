use hef_sim::config::Config;
use hef_sim::price_path::PricePathModel;
use hef_sim::waterfall::WaterfallStructure;

#[test]
fn empty_json_uses_schema_defaults() {
    let config = Config::from_json_str("{}").expect("defaults are valid");
    assert_eq!(config.fund.fund_size, 10_000_000.0);
    assert_eq!(config.fund.term_years, 10);
    assert_eq!(config.seed, 42);
    assert!(matches!(config.price_paths.model, PricePathModel::Gbm));
    assert!(matches!(
        config.fund.waterfall_structure,
        WaterfallStructure::European
    ));
}

#[test]
fn overrides_are_applied_on_top_of_defaults() {
    let json = r#"{
        "fund": {
            "fund_size": 50000000.0,
            "term_years": 8,
            "vintage_year": 2025,
            "hurdle_rate": 0.07,
            "carry_rate": 0.2,
            "catchup_rate": 1.0,
            "gp_commitment_rate": 0.02,
            "waterfall_structure": "american"
        },
        "seed": 1234
    }"#;
    let config = Config::from_json_str(json).expect("valid");
    assert_eq!(config.fund.fund_size, 50_000_000.0);
    assert_eq!(config.fund.term_years, 8);
    assert_eq!(config.seed, 1234);
    assert!(matches!(
        config.fund.waterfall_structure,
        WaterfallStructure::American
    ));
    // Untouched groups keep their defaults.
    assert_eq!(config.loans.avg_size, 250_000.0);
}

#[test]
fn malformed_json_is_a_schema_violation() {
    let err = Config::from_json_str("{ not json").unwrap_err();
    assert!(err.to_string().contains("schema violation"));
}

#[test]
fn allocations_must_sum_to_one() {
    let json = r#"{ "zone_allocations": { "green": 0.7, "orange": 0.4, "red": 0.1 } }"#;
    let err = Config::from_json_str(json).unwrap_err();
    assert!(err.to_string().contains("sum"), "got: {err}");
}

#[test]
fn red_zone_cap_is_enforced() {
    let json = r#"{ "zone_allocations": { "green": 0.5, "orange": 0.2, "red": 0.3 } }"#;
    let err = Config::from_json_str(json).unwrap_err();
    assert!(err.to_string().contains("cap"), "got: {err}");
}

#[test]
fn contradictory_settings_are_reported_together() {
    let mut config = Config::default();
    config.fund.fund_size = -5.0;
    config.fund.hurdle_rate = 2.0;
    config.reinvestment.horizon_months = 600;
    let err = config.validate().unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("fund_size"));
    assert!(msg.contains("hurdle_rate"));
    assert!(msg.contains("reinvestment horizon"));
}

#[test]
fn model_selection_parses_from_tagged_json() {
    let json = r#"{
        "price_paths": {
            "model": "regime_switching",
            "bull": { "drift_adjust": 0.02, "vol_multiplier": 0.8 },
            "bear": { "drift_adjust": -0.08, "vol_multiplier": 1.5 },
            "p_bull_to_bear": 0.04,
            "p_bear_to_bull": 0.25,
            "correlation": [[1.0, 0.6, 0.4], [0.6, 1.0, 0.5], [0.4, 0.5, 1.0]],
            "property_multipliers": true
        }
    }"#;
    let config = Config::from_json_str(json).expect("valid");
    assert!(matches!(
        config.price_paths.model,
        PricePathModel::RegimeSwitching { .. }
    ));
}

#[test]
fn invalid_regime_probabilities_rejected() {
    let json = r#"{
        "price_paths": {
            "model": "regime_switching",
            "bull": { "drift_adjust": 0.02, "vol_multiplier": 0.8 },
            "bear": { "drift_adjust": -0.08, "vol_multiplier": 1.5 },
            "p_bull_to_bear": 1.5,
            "p_bear_to_bull": 0.25,
            "correlation": [[1.0, 0.6, 0.4], [0.6, 1.0, 0.5], [0.4, 0.5, 1.0]],
            "property_multipliers": true
        }
    }"#;
    assert!(Config::from_json_str(json).is_err());
}

#[test]
fn asymmetric_correlation_rejected() {
    let mut config = Config::default();
    config.price_paths.correlation[0][1] = 0.9;
    assert!(config.validate().is_err());
}

#[test]
fn json_round_trip_preserves_the_config() {
    let config = Config::fund_100m();
    let json = serde_json::to_string(&config).expect("serialise");
    let back = Config::from_json_str(&json).expect("parse back");
    assert_eq!(back.fund.fund_size, config.fund.fund_size);
    assert_eq!(back.zone_caps.red, config.zone_caps.red);
    assert_eq!(back.fees.fee_steps.len(), config.fees.fee_steps.len());
    assert_eq!(back.seed, config.seed);
}

#[test]
fn presets_validate() {
    Config::smoke_10m().validate().expect("smoke");
    Config::fund_100m().validate().expect("fund100m");
}
