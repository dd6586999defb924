//! Full-run scenarios exercising the engine through its public surface.

use assert_approx_eq::assert_approx_eq;
use tbsim::{
    CompartmentState, SimulationConfig, SimulationEngine, SimulationStatus,
};

fn baseline_config() -> SimulationConfig {
    SimulationConfig {
        duration_days: 3650,
        dt: 1.0,
        total_population: 1_000_000.0,
        initial_infected: 100.0,
        initial_latent: 10_000.0,
        initial_vaccinated: 0.0,
        ..SimulationConfig::default()
    }
}

#[test]
fn ten_year_run_stays_well_behaved() {
    let mut engine = SimulationEngine::new(baseline_config()).unwrap();
    engine.start();

    // Day one: susceptibles drain, deaths match muTb * I * dt.
    engine.step().unwrap();
    let first = &engine.history()[0];
    assert!(first.compartments.susceptible < 989_900.0);
    assert_approx_eq!(first.new_deaths, 0.04 / 365.0 * 100.0, 1e-3);

    while engine.step().unwrap() == SimulationStatus::Running {}

    assert_eq!(engine.status(), SimulationStatus::Completed);
    assert_eq!(engine.day(), 3650);
    assert_eq!(engine.history().len(), 3650);

    // Every compartment stays within [0, total population] for the whole run.
    for point in engine.history() {
        let c = &point.compartments;
        for value in [
            c.susceptible,
            c.vaccinated,
            c.exposed_high,
            c.exposed_low,
            c.infectious,
            c.recovered,
            c.deceased,
        ] {
            assert!(value >= 0.0, "negative compartment on day {}", point.day);
            assert!(
                value <= 1_000_000.0,
                "compartment above total population on day {}",
                point.day
            );
        }
    }
}

#[test]
fn living_plus_tb_deaths_is_conserved() {
    let mut engine = SimulationEngine::new(baseline_config()).unwrap();
    engine.start();
    let initial = engine.snapshot().compartments.total_population();

    while engine.step().unwrap() == SimulationStatus::Running {}

    let last = engine.snapshot().compartments;
    let grand_total = last.total_population() + last.deceased;
    // Births replace natural deaths; only TB deaths leave the living pool,
    // and they land in D. Drift over ten years stays under 0.01%.
    assert!(
        (grand_total - initial).abs() / initial < 1e-4,
        "population drifted: {grand_total} vs {initial}"
    );
}

#[test]
fn vaccination_lowers_the_epidemic_burden() {
    let mut unvaccinated = SimulationEngine::new(baseline_config()).unwrap();
    let mut vaccinated = SimulationEngine::new(SimulationConfig {
        vaccination: tbsim::config::VaccinationPolicy {
            enabled: true,
            daily_rate: 0.002,
            efficacy: 0.8,
        },
        ..baseline_config()
    })
    .unwrap();

    unvaccinated.start();
    vaccinated.start();
    while unvaccinated.step().unwrap() == SimulationStatus::Running {}
    while vaccinated.step().unwrap() == SimulationStatus::Running {}

    let burden_without = unvaccinated.metrics().cumulative_infections;
    let burden_with = vaccinated.metrics().cumulative_infections;
    assert!(
        burden_with < burden_without,
        "vaccination did not reduce infections: {burden_with} vs {burden_without}"
    );
    assert!(vaccinated.metrics().prevented_infections > 0.0);
    assert!(vaccinated.metrics().prevented_deaths > 0.0);
}

#[test]
fn interventions_suppress_transmission() {
    let mut config = baseline_config();
    config.interventions.push(
        tbsim::PolicyIntervention::new(
            "case finding",
            tbsim::InterventionKind::TransmissionReduction,
            0,
            None,
            0.4,
        )
        .unwrap(),
    );
    let mut with_policy = SimulationEngine::new(config).unwrap();
    let mut without_policy = SimulationEngine::new(baseline_config()).unwrap();

    with_policy.start();
    without_policy.start();
    while with_policy.step().unwrap() == SimulationStatus::Running {}
    while without_policy.step().unwrap() == SimulationStatus::Running {}

    assert!(
        with_policy.metrics().cumulative_infections
            < without_policy.metrics().cumulative_infections
    );
}

#[test]
fn snapshot_is_structurally_independent() {
    let mut engine = SimulationEngine::new(SimulationConfig {
        duration_days: 10,
        ..baseline_config()
    })
    .unwrap();
    engine.start();
    engine.step().unwrap();

    let snapshot = engine.snapshot();
    let frozen: CompartmentState = snapshot.compartments;
    let history_len = snapshot.history.len();

    // Mutating the engine afterwards must not show through the snapshot.
    engine.step().unwrap();
    engine.step().unwrap();
    assert_eq!(snapshot.compartments, frozen);
    assert_eq!(snapshot.history.len(), history_len);
    assert!(engine.history().len() > history_len);
}
