//! Inbound simulation configuration.
//!
//! A [`SimulationConfig`] is produced by the configuration layer (UI panels,
//! files) and consumed by the engine. The configuration boundary validates
//! every numeric field here; the engine assumes pre-validated input but still
//! clamps defensively where cheap.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TbError;
use crate::model::DiseaseParameters;
use crate::policy::PolicyIntervention;

/// A named region with its share of the total population. Regional
/// compartment counts are a proportional view of the aggregate state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDefinition {
    pub id: String,
    pub name: String,
    /// Fraction of the total population living in this region, in [0, 1].
    pub population_share: f64,
}

/// A named population group (e.g. an age or risk cohort) with its share of
/// the total population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationGroup {
    pub id: String,
    pub name: String,
    pub population_share: f64,
}

/// One band of the age distribution, as a fraction of the population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeBand {
    pub label: String,
    pub share: f64,
}

/// BCG vaccination policy settings. When enabled, `daily_rate` and
/// `efficacy` override the ρ and ve entries of the disease parameters at
/// initialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaccinationPolicy {
    pub enabled: bool,
    /// Fraction of the susceptible compartment vaccinated per day.
    pub daily_rate: f64,
    /// Vaccine efficacy in [0, 1].
    pub efficacy: f64,
}

impl Default for VaccinationPolicy {
    fn default() -> Self {
        VaccinationPolicy {
            enabled: false,
            daily_rate: 0.0,
            efficacy: 0.8,
        }
    }
}

/// The full inbound configuration object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Run length in simulated days.
    pub duration_days: u32,
    /// Integration time step in days, in (0, 7].
    pub dt: f64,
    /// Target interval between display updates, milliseconds.
    pub display_update_interval_ms: u64,
    /// Calendar date of day 0.
    pub start_date: NaiveDate,

    pub total_population: f64,
    pub initial_infected: f64,
    /// Initial latent infections, split 20%/80% into E_H/E_L.
    pub initial_latent: f64,
    pub initial_vaccinated: f64,
    /// Infectious cases arriving from outside the population per day.
    pub imported_cases_per_day: f64,

    pub disease: DiseaseParameters,
    pub vaccination: VaccinationPolicy,
    pub interventions: Vec<PolicyIntervention>,

    pub regions: Vec<RegionDefinition>,
    pub population_groups: Vec<PopulationGroup>,
    pub age_distribution: Vec<AgeBand>,
    /// Inter-region mixing coefficient in [0, 1]. Carried for the display
    /// layer; aggregate dynamics do not use it.
    pub region_mixing: f64,

    /// Render compartments as discrete agents instead of charts. Pure
    /// passthrough for the display layer.
    pub agent_view: bool,
    /// Free-form display toggles, passed through untouched.
    pub display_toggles: HashMap<String, bool>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            duration_days: 3650,
            dt: 1.0,
            display_update_interval_ms: 16,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
            total_population: 1_000_000.0,
            initial_infected: 100.0,
            initial_latent: 10_000.0,
            initial_vaccinated: 0.0,
            imported_cases_per_day: 0.0,
            disease: DiseaseParameters::default(),
            vaccination: VaccinationPolicy::default(),
            interventions: Vec::new(),
            regions: Vec::new(),
            population_groups: Vec::new(),
            age_distribution: Vec::new(),
            region_mixing: 0.1,
            agent_view: false,
            display_toggles: HashMap::new(),
        }
    }
}

impl SimulationConfig {
    /// Parses a configuration from a JSON string and validates it.
    pub fn from_json(json: &str) -> Result<SimulationConfig, TbError> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<SimulationConfig, TbError> {
        let contents = fs::read_to_string(path)?;
        SimulationConfig::from_json(&contents)
    }

    /// Applies a partial update: top-level keys present in `patch` replace
    /// the corresponding fields of `self`, everything else is kept. The
    /// merged result is validated before being returned, so a bad patch
    /// leaves the caller's configuration untouched.
    pub fn merged_with(&self, patch: &serde_json::Value) -> Result<SimulationConfig, TbError> {
        let Some(patch_fields) = patch.as_object() else {
            return Err(TbError::InvalidConfig(
                "configuration update must be a JSON object".to_string(),
            ));
        };
        let mut merged = serde_json::to_value(self)?;
        let fields = merged
            .as_object_mut()
            .ok_or_else(|| TbError::TbError("configuration did not serialize to an object".to_string()))?;
        for (key, value) in patch_fields {
            fields.insert(key.clone(), value.clone());
        }
        let config: SimulationConfig = serde_json::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    /// The disease parameters with the vaccination policy folded in. The
    /// engine always works from these, never from `disease` directly.
    #[must_use]
    pub fn base_parameters(&self) -> DiseaseParameters {
        let mut params = self.disease;
        if self.vaccination.enabled {
            params.rho = self.vaccination.daily_rate;
            params.ve = self.vaccination.efficacy;
        }
        params
    }

    /// Checks every numeric field: counts and rates non-negative,
    /// probabilities inside [0, 1], dt inside (0, 7], intervention timelines
    /// well-formed. Returns the first violation found.
    pub fn validate(&self) -> Result<(), TbError> {
        if self.duration_days == 0 {
            return Err(TbError::InvalidConfig(
                "duration_days must be at least 1".to_string(),
            ));
        }
        if !(self.dt > 0.0 && self.dt <= 7.0) {
            return Err(TbError::InvalidConfig(format!(
                "dt must be in (0, 7] days, got {}",
                self.dt
            )));
        }

        let non_negative = [
            ("total_population", self.total_population),
            ("initial_infected", self.initial_infected),
            ("initial_latent", self.initial_latent),
            ("initial_vaccinated", self.initial_vaccinated),
            ("imported_cases_per_day", self.imported_cases_per_day),
            ("beta", self.disease.beta),
            ("epsilon", self.disease.epsilon),
            ("kappa", self.disease.kappa),
            ("omega", self.disease.omega),
            ("gamma", self.disease.gamma),
            ("mu", self.disease.mu),
            ("mu_tb", self.disease.mu_tb),
            ("rho", self.disease.rho),
            ("vaccination.daily_rate", self.vaccination.daily_rate),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(TbError::InvalidConfig(format!(
                    "{field} must be a non-negative finite number, got {value}"
                )));
            }
        }

        let probabilities = [
            ("ve", self.disease.ve),
            ("sigma", self.disease.sigma),
            ("vaccination.efficacy", self.vaccination.efficacy),
            ("region_mixing", self.region_mixing),
        ];
        for (field, value) in probabilities {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(TbError::InvalidConfig(format!(
                    "{field} must be in [0, 1], got {value}"
                )));
            }
        }

        let seeded = self.initial_infected + self.initial_latent + self.initial_vaccinated;
        if seeded > self.total_population {
            return Err(TbError::InvalidConfig(format!(
                "initial infected + latent + vaccinated ({seeded}) exceeds the total population ({})",
                self.total_population
            )));
        }

        for region in &self.regions {
            if !region.population_share.is_finite() || region.population_share < 0.0 {
                return Err(TbError::InvalidConfig(format!(
                    "region '{}': population_share must be non-negative",
                    region.id
                )));
            }
        }
        for group in &self.population_groups {
            if !group.population_share.is_finite() || group.population_share < 0.0 {
                return Err(TbError::InvalidConfig(format!(
                    "population group '{}': population_share must be non-negative",
                    group.id
                )));
            }
        }
        for band in &self.age_distribution {
            if !band.share.is_finite() || band.share < 0.0 {
                return Err(TbError::InvalidConfig(format!(
                    "age band '{}': share must be non-negative",
                    band.label
                )));
            }
        }

        for intervention in &self.interventions {
            intervention.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::InterventionKind;

    #[test]
    fn default_config_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_dt() {
        for dt in [0.0, -1.0, 7.5] {
            let config = SimulationConfig {
                dt,
                ..SimulationConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(TbError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn rejects_probability_out_of_unit_interval() {
        let config = SimulationConfig {
            disease: DiseaseParameters {
                ve: 1.2,
                ..DiseaseParameters::default()
            },
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(TbError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_overseeded_population() {
        let config = SimulationConfig {
            total_population: 1_000.0,
            initial_infected: 600.0,
            initial_latent: 600.0,
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(TbError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_malformed_intervention_timeline() {
        let mut config = SimulationConfig::default();
        config.interventions.push(PolicyIntervention {
            name: "backwards".to_string(),
            kind: InterventionKind::TransmissionReduction,
            start_day: 30,
            end_day: Some(10),
            params: HashMap::new(),
            effect_on_r0: 0.5,
        });
        assert!(matches!(config.validate(), Err(TbError::InvalidConfig(_))));
    }

    #[test]
    fn vaccination_policy_overrides_rates() {
        let config = SimulationConfig {
            vaccination: VaccinationPolicy {
                enabled: true,
                daily_rate: 0.002,
                efficacy: 0.7,
            },
            ..SimulationConfig::default()
        };
        let params = config.base_parameters();
        assert_eq!(params.rho, 0.002);
        assert_eq!(params.ve, 0.7);

        let disabled = SimulationConfig::default();
        assert_eq!(disabled.base_parameters().rho, disabled.disease.rho);
    }

    #[test]
    fn round_trips_through_json() {
        let json = serde_json::to_string(&SimulationConfig::default()).unwrap();
        let parsed = SimulationConfig::from_json(&json).unwrap();
        assert_eq!(parsed, SimulationConfig::default());
    }

    #[test]
    fn merged_with_replaces_only_patched_fields() {
        let base = SimulationConfig {
            duration_days: 100,
            initial_infected: 42.0,
            ..SimulationConfig::default()
        };
        let merged = base
            .merged_with(&serde_json::json!({"duration_days": 200}))
            .unwrap();
        assert_eq!(merged.duration_days, 200);
        assert_eq!(merged.initial_infected, 42.0);

        // A bad patch is rejected and the base is untouched.
        let result = base.merged_with(&serde_json::json!({"dt": -1.0}));
        assert!(matches!(result, Err(TbError::InvalidConfig(_))));
        assert_eq!(base.duration_days, 100);

        let result = base.merged_with(&serde_json::json!(17));
        assert!(matches!(result, Err(TbError::InvalidConfig(_))));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let parsed =
            SimulationConfig::from_json(r#"{"duration_days": 30, "initial_infected": 5}"#)
                .unwrap();
        assert_eq!(parsed.duration_days, 30);
        assert_eq!(parsed.initial_infected, 5.0);
        assert_eq!(parsed.dt, 1.0);
    }
}
