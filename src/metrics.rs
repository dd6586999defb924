//! Derived epidemiological metrics, recomputed by the engine after every
//! step.
//!
//! The "prevented" counterfactual uses a closed-form approximation rather
//! than a parallel shadow run: on each day the factual inflow of new
//! infections is λS + (1−ve)λV, while with vaccination disabled (ve = ρ = 0)
//! the same people would contribute λ(S+V). The difference, ve·λ·V, is the
//! infections prevented that day. Deaths prevented scale that by the
//! lifetime probability of progressing to active disease and the case
//! fatality fraction.

use serde::{Deserialize, Serialize};

use crate::model::{CompartmentState, DiseaseParameters};

/// WHO definition of a low-incidence country: fewer than 10 new cases per
/// 100 000 population per year.
pub const WHO_LOW_INCIDENCE_PER_100K: f64 = 10.0;

/// Daily new infections per 100 000 above which a surge is logged as an
/// outbreak event.
pub const OUTBREAK_THRESHOLD_PER_100K: f64 = 50.0;

/// The metrics block carried in every state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub cumulative_infections: f64,
    pub cumulative_deaths: f64,
    pub cumulative_recoveries: f64,
    pub cumulative_vaccinations: f64,
    pub prevented_infections: f64,
    pub prevented_deaths: f64,
    /// New cases / population × 100 000, for the current day.
    pub incidence_per_100k: f64,
    /// The same rate annualized (× 365); WHO thresholds are annual.
    pub annualized_incidence_per_100k: f64,
    /// I / N.
    pub prevalence: f64,
    pub r_effective: f64,
    /// Normalized distance from the baseline incidence toward the 2035
    /// elimination target, in [0, 1].
    pub who_target_progress: f64,
    /// Whether annualized incidence is below [`WHO_LOW_INCIDENCE_PER_100K`].
    pub low_incidence: bool,
}

/// Daily incidence per 100 000: new cases / population × 100 000. Zero for
/// an empty population.
#[must_use]
pub fn incidence_per_100k(new_cases: f64, population: f64) -> f64 {
    if population == 0.0 {
        return 0.0;
    }
    new_cases / population * 100_000.0
}

/// Infectious prevalence I/N, zero for an empty population.
#[must_use]
pub fn prevalence(state: &CompartmentState) -> f64 {
    let n = state.total_population();
    if n == 0.0 {
        return 0.0;
    }
    state.infectious / n
}

/// Infections prevented on one day relative to the no-vaccination
/// counterfactual: ve × λ × V × dt.
#[must_use]
pub fn prevented_infections(
    lambda: f64,
    state: &CompartmentState,
    params: &DiseaseParameters,
    dt: f64,
) -> f64 {
    params.ve * lambda * state.vaccinated * dt
}

/// Deaths prevented corresponding to `prevented`: each averted infection
/// would have progressed to active disease with the lifetime progression
/// probability and then died of TB with the case fatality fraction.
#[must_use]
pub fn prevented_deaths(prevented: f64, params: &DiseaseParameters) -> f64 {
    prevented * params.progression_fraction() * params.case_fatality_fraction()
}

/// Progress from the baseline annualized incidence toward the WHO 2035
/// elimination target (10/100 000), clamped to [0, 1]. A population that
/// starts below the target reports full progress.
#[must_use]
pub fn who_target_progress(baseline_incidence: f64, current_incidence: f64) -> f64 {
    if baseline_incidence <= WHO_LOW_INCIDENCE_PER_100K {
        return 1.0;
    }
    let progress = (baseline_incidence - current_incidence)
        / (baseline_incidence - WHO_LOW_INCIDENCE_PER_100K);
    progress.clamp(0.0, 1.0)
}
