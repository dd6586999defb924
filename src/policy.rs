//! Time-indexed intervention policies.
//!
//! An intervention is a named modifier active over a window of simulation
//! days. Each one carries a multiplicative effect on transmission
//! (`effect_on_r0`); several active interventions compose by multiplying
//! their effects, so the order they are listed in never matters. The layer's
//! job is to turn the base [`DiseaseParameters`] into the effective shadow
//! parameter set for one simulation day. Base parameters are never mutated.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::TbError;
use crate::model::DiseaseParameters;

/// What an intervention does, beyond scaling transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    /// Reduces effective transmission (masking, case isolation, contact
    /// tracing). Only `effect_on_r0` applies.
    TransmissionReduction,
    /// A BCG vaccination campaign. The `rate_multiplier` parameter scales
    /// the background vaccination rate ρ while active.
    VaccinationCampaign,
    /// Improved case finding and treatment. The `recovery_multiplier`
    /// parameter scales γ while active.
    TreatmentScaleUp,
}

/// A named policy intervention with a day window and a multiplicative effect
/// on the reproduction number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyIntervention {
    pub name: String,
    pub kind: InterventionKind,
    /// First day (inclusive) the intervention applies.
    pub start_day: u32,
    /// Last day (inclusive); `None` means indefinite.
    pub end_day: Option<u32>,
    /// Intervention-specific settings (e.g. `rate_multiplier`).
    #[serde(default)]
    pub params: HashMap<String, f64>,
    /// Multiplicative effect on R0 while active, in (0, 1].
    pub effect_on_r0: f64,
}

impl PolicyIntervention {
    /// Builds an intervention, rejecting malformed timelines and effects
    /// outside (0, 1] at construction time.
    pub fn new(
        name: impl Into<String>,
        kind: InterventionKind,
        start_day: u32,
        end_day: Option<u32>,
        effect_on_r0: f64,
    ) -> Result<PolicyIntervention, TbError> {
        let name = name.into();
        if let Some(end) = end_day {
            if start_day > end {
                return Err(TbError::InvalidConfig(format!(
                    "intervention '{name}': start_day {start_day} is after end_day {end}"
                )));
            }
        }
        if !(effect_on_r0 > 0.0 && effect_on_r0 <= 1.0) {
            return Err(TbError::InvalidConfig(format!(
                "intervention '{name}': effect_on_r0 must be in (0, 1], got {effect_on_r0}"
            )));
        }
        Ok(PolicyIntervention {
            name,
            kind,
            start_day,
            end_day,
            params: HashMap::new(),
            effect_on_r0,
        })
    }

    /// Re-runs the constructor-time checks, for interventions that arrived
    /// through deserialization rather than [`PolicyIntervention::new`].
    pub fn validate(&self) -> Result<(), TbError> {
        PolicyIntervention::new(
            self.name.clone(),
            self.kind,
            self.start_day,
            self.end_day,
            self.effect_on_r0,
        )
        .map(|_| ())
    }

    /// Whether the intervention applies on simulation day `day`. Both
    /// endpoints are inclusive.
    #[must_use]
    pub fn is_active_on(&self, day: u32) -> bool {
        self.start_day <= day && self.end_day.is_none_or(|end| day <= end)
    }

    fn param(&self, key: &str) -> Option<f64> {
        self.params.get(key).copied()
    }
}

/// Product of `effect_on_r0` over the interventions active on `day`. The
/// empty product is 1 (no reduction). Multiplication commutes, so the list
/// order never affects the result.
#[must_use]
pub fn combined_transmission_effect(interventions: &[PolicyIntervention], day: u32) -> f64 {
    interventions
        .iter()
        .filter(|i| i.is_active_on(day))
        .map(|i| i.effect_on_r0)
        .product()
}

/// The shadow parameter set for `day`: base parameters with transmission
/// scaled by the combined intervention effect, and campaign/treatment
/// multipliers applied with the same composition rule. The base is copied,
/// never touched.
#[must_use]
pub fn effective_parameters(
    base: &DiseaseParameters,
    interventions: &[PolicyIntervention],
    day: u32,
) -> DiseaseParameters {
    let mut effective = *base;
    effective.beta *= combined_transmission_effect(interventions, day);

    for intervention in interventions.iter().filter(|i| i.is_active_on(day)) {
        match intervention.kind {
            InterventionKind::TransmissionReduction => {}
            InterventionKind::VaccinationCampaign => {
                effective.rho *= intervention.param("rate_multiplier").unwrap_or(1.0);
            }
            InterventionKind::TreatmentScaleUp => {
                effective.gamma *= intervention.param("recovery_multiplier").unwrap_or(1.0);
            }
        }
    }
    effective
}
