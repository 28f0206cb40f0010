use std::collections::HashSet;

use hef_sim::config::Config;
use hef_sim::loans::LoanGenerator;
use hef_sim::rng::RngFactory;
use hef_sim::tls::{TlsCatalogue, Zone, ZoneMap};

fn setup() -> (Config, TlsCatalogue) {
    let config = Config::smoke_10m();
    let tls = TlsCatalogue::build(&config.catalogue, 42);
    (config, tls)
}

fn generate(config: &Config, tls: &TlsCatalogue, seed: u64) -> Vec<hef_sim::loans::Loan> {
    let generator = LoanGenerator::new(
        &config.loans,
        tls,
        config.term_months(),
        config.fees.origination_fee_rate,
    );
    let rng = RngFactory::new(seed);
    let budgets = config.zone_allocations.map(|_, f| config.fund.fund_size * f);
    let mut next_id = 0;
    let mut used = HashSet::new();
    generator
        .generate_initial(&rng, &budgets, &mut next_id, &mut used)
        .expect("generate")
        .loans
}

#[test]
fn draws_respect_configured_bounds() {
    let (config, tls) = setup();
    let loans = generate(&config, &tls, 42);
    assert!(!loans.is_empty());

    let shape = &config.loans;
    for loan in &loans {
        assert!(loan.principal >= shape.min_size - 1e-9);
        assert!(loan.principal <= shape.max_size + 1e-9);
        assert!(loan.ltv >= shape.min_ltv && loan.ltv <= shape.max_ltv);
        assert!(loan.term_months >= 1);
        assert!(loan.term_months <= config.term_months());
        assert!(loan.rate >= 0.0);
        assert_eq!(loan.origination_month, 0);
        assert!(!loan.reinvestment);
        assert!(loan.exit_month.is_none());
    }
}

#[test]
fn smoke_preset_produces_roughly_forty_loans() {
    let (config, tls) = setup();
    let loans = generate(&config, &tls, 42);
    // $10M at ~$250k average.
    assert!(
        loans.len() >= 25 && loans.len() <= 60,
        "expected ~40 loans, got {}",
        loans.len()
    );
}

#[test]
fn budgets_are_exhausted_down_to_min_size() {
    let (config, tls) = setup();
    let loans = generate(&config, &tls, 42);
    let mut invested = ZoneMap::uniform(0.0_f64);
    for loan in &loans {
        *invested.get_mut(loan.zone) += loan.principal;
    }
    for zone in Zone::all() {
        let budget = config.fund.fund_size * config.zone_allocations.get(zone);
        let leftover = budget - invested.get(zone);
        assert!(
            leftover < config.loans.min_size,
            "{} left {:.0} unspent",
            zone.name(),
            leftover
        );
    }
}

#[test]
fn properties_sampled_without_replacement() {
    let (config, tls) = setup();
    let loans = generate(&config, &tls, 42);
    let mut seen = HashSet::new();
    for loan in &loans {
        assert!(
            seen.insert(loan.property_id),
            "property {} assigned twice",
            loan.property_id
        );
        let property = tls.property(loan.property_id).expect("catalogued");
        assert_eq!(property.zone, loan.zone);
        assert_eq!(property.suburb_id, loan.suburb_id);
    }
}

#[test]
fn generation_is_deterministic_per_seed() {
    let (config, tls) = setup();
    let a = generate(&config, &tls, 42);
    let b = generate(&config, &tls, 42);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.id, y.id);
        assert_eq!(x.property_id, y.property_id);
        assert_eq!(x.principal.to_bits(), y.principal.to_bits());
        assert_eq!(x.ltv.to_bits(), y.ltv.to_bits());
    }

    let c = generate(&config, &tls, 43);
    assert!(
        a.iter().zip(c.iter()).any(|(x, y)| x.principal != y.principal),
        "different seeds should differ"
    );
}

#[test]
fn reinvestment_batch_respects_remaining_fund_term() {
    let (config, tls) = setup();
    let generator = LoanGenerator::new(
        &config.loans,
        &tls,
        config.term_months(),
        config.fees.origination_fee_rate,
    );
    let rng = RngFactory::new(42);
    let month = config.term_months() - 6;
    let budgets = ZoneMap {
        green: 600_000.0,
        orange: 300_000.0,
        red: 100_000.0,
    };
    let mut next_id = 100;
    let mut used = HashSet::new();
    let batch = generator
        .generate_batch(&rng, &budgets, month, &mut next_id, &mut used)
        .expect("batch");

    assert!(!batch.loans.is_empty());
    for loan in &batch.loans {
        assert!(loan.reinvestment);
        assert_eq!(loan.origination_month, month);
        assert!(
            loan.origination_month + loan.term_months <= config.term_months(),
            "loan extends past fund term"
        );
    }
}
