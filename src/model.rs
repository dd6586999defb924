//! The compartment model: pure math over a disease state vector and a
//! parameter set.
//!
//! Tuberculosis gets an extended SEIR treatment with seven compartments:
//! susceptible (S), vaccinated (V), high-risk recent latent infection (E_H),
//! stabilized low-risk latent infection (E_L), infectious (I), recovered (R)
//! and cumulative disease deaths (D). Births (μN) enter S and natural deaths
//! (μ per compartment) leave every living compartment, so the living
//! population plus D is conserved. Nothing in this module mutates its
//! inputs; every operation returns a new value.

use serde::{Deserialize, Serialize};

/// The seven-compartment disease state. All components are non-negative at
/// every observable point; `deceased` accumulates TB-attributable deaths
/// only.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CompartmentState {
    pub susceptible: f64,
    pub vaccinated: f64,
    /// Recently infected, high progression probability.
    pub exposed_high: f64,
    /// Stabilized latent infection, slow reactivation.
    pub exposed_low: f64,
    pub infectious: f64,
    pub recovered: f64,
    /// Cumulative TB deaths. Not part of the living population.
    pub deceased: f64,
}

impl CompartmentState {
    pub const ZERO: CompartmentState = CompartmentState {
        susceptible: 0.0,
        vaccinated: 0.0,
        exposed_high: 0.0,
        exposed_low: 0.0,
        infectious: 0.0,
        recovered: 0.0,
        deceased: 0.0,
    };

    /// The living population N: the six compartments excluding `deceased`.
    #[must_use]
    pub fn total_population(&self) -> f64 {
        self.susceptible
            + self.vaccinated
            + self.exposed_high
            + self.exposed_low
            + self.infectious
            + self.recovered
    }

    /// Component-wise sum, as a new value.
    #[must_use]
    pub fn add(&self, other: &CompartmentState) -> CompartmentState {
        CompartmentState {
            susceptible: self.susceptible + other.susceptible,
            vaccinated: self.vaccinated + other.vaccinated,
            exposed_high: self.exposed_high + other.exposed_high,
            exposed_low: self.exposed_low + other.exposed_low,
            infectious: self.infectious + other.infectious,
            recovered: self.recovered + other.recovered,
            deceased: self.deceased + other.deceased,
        }
    }

    /// Component-wise scaling, as a new value.
    #[must_use]
    pub fn scale(&self, factor: f64) -> CompartmentState {
        CompartmentState {
            susceptible: self.susceptible * factor,
            vaccinated: self.vaccinated * factor,
            exposed_high: self.exposed_high * factor,
            exposed_low: self.exposed_low * factor,
            infectious: self.infectious * factor,
            recovered: self.recovered * factor,
            deceased: self.deceased * factor,
        }
    }

    /// Every component clamped to zero from below, absorbing floating-point
    /// undershoot near empty compartments.
    #[must_use]
    pub fn clamped_non_negative(&self) -> CompartmentState {
        CompartmentState {
            susceptible: self.susceptible.max(0.0),
            vaccinated: self.vaccinated.max(0.0),
            exposed_high: self.exposed_high.max(0.0),
            exposed_low: self.exposed_low.max(0.0),
            infectious: self.infectious.max(0.0),
            recovered: self.recovered.max(0.0),
            deceased: self.deceased.max(0.0),
        }
    }
}

/// The ten per-day rate and probability constants of the model. Immutable
/// during a run; the policy layer derives a scaled shadow copy per day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiseaseParameters {
    /// Transmission rate β.
    pub beta: f64,
    /// Fast-progression rate ε out of E_H.
    pub epsilon: f64,
    /// Stabilization rate κ, E_H → E_L.
    pub kappa: f64,
    /// Reactivation rate ω out of E_L.
    pub omega: f64,
    /// Recovery rate γ.
    pub gamma: f64,
    /// Natural mortality rate μ.
    pub mu: f64,
    /// TB-specific mortality rate.
    pub mu_tb: f64,
    /// Background vaccination rate ρ.
    pub rho: f64,
    /// Vaccine efficacy in [0, 1]; protection is leaky by (1 − ve).
    pub ve: f64,
    /// Reinfection susceptibility of the recovered, in [0, 1].
    pub sigma: f64,
}

impl Default for DiseaseParameters {
    /// Calibration for a high-burden setting with R0 ≈ 1.7: mean infectious
    /// period 180 days, 80-year life expectancy, 4%/year TB case fatality.
    fn default() -> Self {
        DiseaseParameters {
            beta: 0.011,
            epsilon: 0.0014,
            kappa: 0.001,
            omega: 0.0001,
            gamma: 1.0 / 180.0,
            mu: 1.0 / (80.0 * 365.0),
            mu_tb: 0.04 / 365.0,
            rho: 0.0,
            ve: 0.8,
            sigma: 0.5,
        }
    }
}

impl DiseaseParameters {
    /// Lifetime probability that a new latent infection progresses to active
    /// disease, through either the fast (ε) or the slow (κ then ω) path.
    /// Zero for degenerate all-zero rate sets.
    #[must_use]
    pub fn progression_fraction(&self) -> f64 {
        let leaving_high = self.epsilon + self.kappa + self.mu;
        let leaving_low = self.omega + self.mu;
        if leaving_high == 0.0 || leaving_low == 0.0 {
            return 0.0;
        }
        self.epsilon / leaving_high + (self.kappa / leaving_high) * (self.omega / leaving_low)
    }

    /// Probability that an active case dies of TB rather than recovering or
    /// dying naturally.
    #[must_use]
    pub fn case_fatality_fraction(&self) -> f64 {
        let removal = self.gamma + self.mu + self.mu_tb;
        if removal == 0.0 {
            return 0.0;
        }
        self.mu_tb / removal
    }

    /// R0 = β × progression fraction / (γ + μ + μ_TB). Degenerate zero-rate
    /// denominators yield 0, not an error.
    #[must_use]
    pub fn basic_reproduction_number(&self) -> f64 {
        let removal = self.gamma + self.mu + self.mu_tb;
        if removal == 0.0 {
            return 0.0;
        }
        self.beta * self.progression_fraction() / removal
    }
}

/// Force of infection λ = β I / N, the per-capita infection rate a
/// susceptible individual experiences. Zero for an empty population.
#[must_use]
pub fn force_of_infection(state: &CompartmentState, params: &DiseaseParameters) -> f64 {
    let n = state.total_population();
    if n == 0.0 {
        return 0.0;
    }
    params.beta * state.infectious / n
}

/// Rt = R0 × (S + (1−ve)V + σR) / N: the basic reproduction number scaled
/// by the effectively susceptible share. Zero for an empty population.
#[must_use]
pub fn effective_reproduction_number(
    state: &CompartmentState,
    params: &DiseaseParameters,
) -> f64 {
    let n = state.total_population();
    if n == 0.0 {
        return 0.0;
    }
    let effectively_susceptible =
        state.susceptible + (1.0 - params.ve) * state.vaccinated + params.sigma * state.recovered;
    params.basic_reproduction_number() * effectively_susceptible / n
}

/// The coupled ODE system: per-day derivatives of every compartment.
///
/// Births μN enter S, natural death removes μ·X from every living
/// compartment, vaccination moves ρS into V with leaky protection (1−ve),
/// infection feeds E_H from S and V, latency stabilizes E_H → E_L at κ,
/// activation happens fast (ε from E_H) or slow (ω from E_L), recovery runs
/// at γ, the recovered are reinfected at the reduced rate σλ, and D
/// accumulates TB deaths only.
#[must_use]
pub fn derivatives(state: &CompartmentState, params: &DiseaseParameters) -> CompartmentState {
    let n = state.total_population();
    let lambda = force_of_infection(state, params);
    let leaky = (1.0 - params.ve) * lambda;

    CompartmentState {
        susceptible: params.mu * n - lambda * state.susceptible - params.rho * state.susceptible
            + params.sigma * lambda * state.recovered
            - params.mu * state.susceptible,
        vaccinated: params.rho * state.susceptible
            - leaky * state.vaccinated
            - params.mu * state.vaccinated,
        exposed_high: lambda * state.susceptible + leaky * state.vaccinated
            - (params.epsilon + params.kappa + params.mu) * state.exposed_high,
        exposed_low: params.kappa * state.exposed_high
            - (params.omega + params.mu) * state.exposed_low,
        infectious: params.epsilon * state.exposed_high + params.omega * state.exposed_low
            - (params.gamma + params.mu + params.mu_tb) * state.infectious,
        recovered: params.gamma * state.infectious
            - params.sigma * lambda * state.recovered
            - params.mu * state.recovered,
        deceased: params.mu_tb * state.infectious,
    }
}
