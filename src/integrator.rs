//! Fixed-step classical Runge-Kutta (RK4) integration of the compartment
//! model.

use crate::model::{derivatives, CompartmentState, DiseaseParameters};

/// Advances `state` by one step of length `dt` days and returns the new
/// state; the input is never mutated.
///
/// The four derivative evaluations are combined with the classical 1-2-2-1
/// weights, then every compartment is clamped to zero from below. The clamp
/// is a stabilization policy for floating-point undershoot near empty
/// compartments, not a correction for genuine divergence. Callers keep `dt`
/// within (0, 7] days; accuracy degrades silently above that and the
/// integrator does not enforce it.
#[must_use]
pub fn integrate_step(
    state: &CompartmentState,
    params: &DiseaseParameters,
    dt: f64,
) -> CompartmentState {
    let k1 = derivatives(state, params);
    let k2 = derivatives(&state.add(&k1.scale(dt / 2.0)), params);
    let k3 = derivatives(&state.add(&k2.scale(dt / 2.0)), params);
    let k4 = derivatives(&state.add(&k3.scale(dt)), params);

    let weighted = k1
        .add(&k2.scale(2.0))
        .add(&k3.scale(2.0))
        .add(&k4);
    state.add(&weighted.scale(dt / 6.0)).clamped_non_negative()
}
