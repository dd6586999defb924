//! The simulation engine: owns the authoritative run state, advances it one
//! simulated day at a time, and records history, events and derived metrics.
//!
//! One engine instance is constructed per run and owned by a single writer
//! (in production, the background thread inside [`crate::host`]). Consumers
//! never see the live state; [`SimulationEngine::snapshot`] produces a deep,
//! structurally independent copy with key-ordered maps, safe to ship across
//! a thread boundary.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::error::TbError;
use crate::integrator::integrate_step;
use crate::log::{debug, info, warn};
use crate::metrics::{
    self, DerivedMetrics, OUTBREAK_THRESHOLD_PER_100K, WHO_LOW_INCIDENCE_PER_100K,
};
use crate::model::{
    effective_reproduction_number, force_of_infection, CompartmentState, DiseaseParameters,
};
use crate::policy::{effective_parameters, InterventionKind};

/// Engine lifecycle: `idle → running ⇄ paused → completed`, with
/// `running|paused → idle` on reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

/// Kinds of discrete, human-readable log entries the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationEventKind {
    Infection,
    Recovery,
    Death,
    Vaccination,
    PolicyChange,
    Outbreak,
}

/// A discrete event tagged with the simulation day it occurred on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationEvent {
    pub kind: SimulationEventKind,
    pub day: u32,
    pub detail: String,
}

/// An immutable per-day snapshot appended to the run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub day: u32,
    pub date: NaiveDate,
    /// Wall-clock time the point was recorded, milliseconds since the epoch.
    pub timestamp_ms: u64,
    pub compartments: CompartmentState,
    pub new_infections: f64,
    pub new_deaths: f64,
    /// Infections averted that day relative to the no-vaccination
    /// counterfactual (see [`crate::metrics`]).
    pub prevented_infections: f64,
    pub r_effective: f64,
    /// Vaccinations administered that day.
    pub vaccinations: f64,
}

/// A deep, serializable copy of the engine state for the display layer.
/// Region and group maps are key-ordered for stable cross-context transport.
/// Events travel separately as an incremental stream, so only their count is
/// carried here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub day: u32,
    pub date: NaiveDate,
    pub status: SimulationStatus,
    pub speed: f64,
    pub compartments: CompartmentState,
    pub regions: BTreeMap<String, CompartmentState>,
    pub groups: BTreeMap<String, CompartmentState>,
    pub metrics: DerivedMetrics,
    pub history: Vec<TimeSeriesPoint>,
    pub event_count: usize,
}

/// Orchestrates one simulation run. Single writer; see the module docs.
pub struct SimulationEngine {
    config: SimulationConfig,
    base_params: DiseaseParameters,
    state: CompartmentState,
    day: u32,
    status: SimulationStatus,
    speed: f64,
    history: Vec<TimeSeriesPoint>,
    events: Vec<SimulationEvent>,
    metrics: DerivedMetrics,
    /// Annualized incidence recorded at initialization, the WHO-progress
    /// reference point.
    baseline_incidence: f64,
    /// Staged configuration from `update_config`, applied at the top of the
    /// next step.
    pending_config: Option<SimulationConfig>,
    /// Which interventions were active yesterday, for activation/expiry
    /// edge detection. Parallel to `config.interventions`.
    active_flags: Vec<bool>,
    was_low_incidence: bool,
    in_outbreak: bool,
}

impl SimulationEngine {
    /// Builds an engine in `idle` status from a validated configuration:
    /// seeds the compartments from the initial conditions (latent infections
    /// split 20%/80% into E_H/E_L, the remainder susceptible) and records the
    /// baseline incidence. Does not start stepping.
    pub fn new(config: SimulationConfig) -> Result<SimulationEngine, TbError> {
        config.validate()?;
        let base_params = config.base_parameters();
        let state = initial_compartments(&config);

        let lambda = force_of_infection(&state, &base_params);
        let expected_new_infections = (lambda * state.susceptible
            + (1.0 - base_params.ve) * lambda * state.vaccinated)
            * config.dt;
        let baseline_incidence = metrics::incidence_per_100k(
            expected_new_infections,
            state.total_population(),
        ) * 365.0;

        info!(
            "initialized engine: population {}, {} infectious, baseline incidence {:.1}/100k/yr",
            config.total_population, config.initial_infected, baseline_incidence
        );

        let active_flags = vec![false; config.interventions.len()];
        Ok(SimulationEngine {
            config,
            base_params,
            state,
            day: 0,
            status: SimulationStatus::Idle,
            speed: 1.0,
            history: Vec::new(),
            events: Vec::new(),
            metrics: DerivedMetrics::default(),
            baseline_incidence,
            pending_config: None,
            active_flags,
            was_low_incidence: baseline_incidence < WHO_LOW_INCIDENCE_PER_100K,
            in_outbreak: false,
        })
    }

    #[must_use]
    pub fn status(&self) -> SimulationStatus {
        self.status
    }

    #[must_use]
    pub fn day(&self) -> u32 {
        self.day
    }

    #[must_use]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// The configuration currently in effect (staged updates excluded).
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub fn history(&self) -> &[TimeSeriesPoint] {
        &self.history
    }

    #[must_use]
    pub fn events(&self) -> &[SimulationEvent] {
        &self.events
    }

    #[must_use]
    pub fn metrics(&self) -> &DerivedMetrics {
        &self.metrics
    }

    /// Events appended since `index`, for incremental forwarding.
    #[must_use]
    pub fn events_since(&self, index: usize) -> &[SimulationEvent] {
        &self.events[index.min(self.events.len())..]
    }

    /// Transitions `idle → running`. A no-op from any other status.
    pub fn start(&mut self) {
        if self.status == SimulationStatus::Idle {
            info!("run started, duration {} days", self.config.duration_days);
            self.status = SimulationStatus::Running;
        } else {
            warn!("start ignored in status {:?}", self.status);
        }
    }

    /// Transitions `running → paused`. Illegal from `idle`/`completed`,
    /// where it is a defensive no-op that corrupts nothing.
    pub fn pause(&mut self) {
        if self.status == SimulationStatus::Running {
            self.status = SimulationStatus::Paused;
        } else {
            warn!("pause ignored in status {:?}", self.status);
        }
    }

    /// Transitions `paused → running`; a no-op otherwise.
    pub fn resume(&mut self) {
        if self.status == SimulationStatus::Paused {
            self.status = SimulationStatus::Running;
        } else {
            warn!("resume ignored in status {:?}", self.status);
        }
    }

    /// Discards run state back to `idle`: compartments reseeded from the
    /// configuration, history and events cleared, day zeroed.
    pub fn reset(&mut self) {
        info!("reset to idle at day {}", self.day);
        self.state = initial_compartments(&self.config);
        self.day = 0;
        self.status = SimulationStatus::Idle;
        self.history.clear();
        self.events.clear();
        self.metrics = DerivedMetrics::default();
        self.pending_config = None;
        self.active_flags = vec![false; self.config.interventions.len()];
        self.in_outbreak = false;
        self.was_low_incidence = self.baseline_incidence < WHO_LOW_INCIDENCE_PER_100K;
    }

    /// Stages a configuration to take effect at the start of the *next*
    /// step. Already-recorded history is never rewritten.
    pub fn update_config(&mut self, config: SimulationConfig) -> Result<(), TbError> {
        config.validate()?;
        self.pending_config = Some(config);
        Ok(())
    }

    /// Purely a cadence hint for the execution host, clamped to [0.1, 100].
    /// Has no effect on the per-step math.
    pub fn set_speed(&mut self, multiplier: f64) {
        self.speed = if multiplier.is_finite() {
            multiplier.clamp(0.1, 100.0)
        } else {
            1.0
        };
    }

    /// Advances exactly one simulated day. Valid only from `running`; from
    /// any other status this is a logged no-op. Returns the status after the
    /// step so callers can observe completion.
    pub fn step(&mut self) -> Result<SimulationStatus, TbError> {
        if self.status != SimulationStatus::Running {
            warn!("step ignored in status {:?}", self.status);
            return Ok(self.status);
        }

        self.apply_pending_config();
        self.record_intervention_edges();

        // (1) Effective parameters for today from the active interventions.
        let params = effective_parameters(&self.base_params, &self.config.interventions, self.day);
        let dt = self.config.dt;

        // (2) Integrate one step.
        let before = self.state;
        let lambda = force_of_infection(&before, &params);
        let mut after = integrate_step(&before, &params, dt);
        if self.config.imported_cases_per_day > 0.0 {
            let imported = (self.config.imported_cases_per_day * dt).min(after.susceptible);
            after.susceptible -= imported;
            after.infectious += imported;
        }

        // (3) Per-day flows, first-order from the pre-step state; deaths are
        // exact from the D compartment.
        let new_infections = (lambda * before.susceptible
            + (1.0 - params.ve) * lambda * before.vaccinated)
            * dt;
        let new_deaths = after.deceased - before.deceased;
        let vaccinations = params.rho * before.susceptible * dt;
        let prevented = metrics::prevented_infections(lambda, &before, &params, dt);
        let r_effective = effective_reproduction_number(&after, &params);

        self.update_metrics(
            &after,
            &params,
            new_infections,
            new_deaths,
            vaccinations,
            prevented,
            r_effective,
        );

        // (4) Record the day.
        self.history.push(TimeSeriesPoint {
            day: self.day,
            date: self.date_of(self.day),
            timestamp_ms: wall_clock_ms(),
            compartments: after,
            new_infections,
            new_deaths,
            prevented_infections: prevented,
            r_effective,
            vaccinations,
        });

        // (5) Threshold-triggered events.
        self.record_threshold_events(new_infections, after.total_population());

        // (6) Advance the clock; (7) complete when the duration is reached.
        self.state = after;
        self.day += 1;
        if self.day >= self.config.duration_days {
            info!("run completed at day {}", self.day);
            self.status = SimulationStatus::Completed;
        }
        debug!(
            "day {}: I={:.1} Rt={:.3} incidence={:.2}/100k",
            self.day, self.state.infectious, r_effective, self.metrics.incidence_per_100k
        );

        Ok(self.status)
    }

    /// A deep copy of the current state for consumers. Region and group
    /// views are proportional allocations of the aggregate compartments by
    /// configured population share; the aggregate numbers stay authoritative.
    #[must_use]
    pub fn snapshot(&self) -> SimulationSnapshot {
        let regions = self
            .config
            .regions
            .iter()
            .map(|r| (r.id.clone(), self.state.scale(r.population_share)))
            .collect();
        let groups = self
            .config
            .population_groups
            .iter()
            .map(|g| (g.id.clone(), self.state.scale(g.population_share)))
            .collect();

        SimulationSnapshot {
            day: self.day,
            date: self.date_of(self.day),
            status: self.status,
            speed: self.speed,
            compartments: self.state,
            regions,
            groups,
            metrics: self.metrics,
            history: self.history.clone(),
            event_count: self.events.len(),
        }
    }

    fn apply_pending_config(&mut self) {
        if let Some(config) = self.pending_config.take() {
            self.base_params = config.base_parameters();
            self.active_flags.resize(config.interventions.len(), false);
            self.config = config;
            self.push_event(
                SimulationEventKind::PolicyChange,
                "configuration updated".to_string(),
            );
        }
    }

    /// Emits policy events on the day an intervention activates or expires.
    fn record_intervention_edges(&mut self) {
        let mut pending = Vec::new();
        for (index, intervention) in self.config.interventions.iter().enumerate() {
            let active = intervention.is_active_on(self.day);
            let was_active = self.active_flags[index];
            if active && !was_active {
                pending.push((
                    SimulationEventKind::PolicyChange,
                    format!("intervention '{}' is now active", intervention.name),
                ));
                if intervention.kind == InterventionKind::VaccinationCampaign {
                    pending.push((
                        SimulationEventKind::Vaccination,
                        format!("vaccination campaign '{}' started", intervention.name),
                    ));
                }
            } else if !active && was_active {
                pending.push((
                    SimulationEventKind::PolicyChange,
                    format!("intervention '{}' has ended", intervention.name),
                ));
            }
            self.active_flags[index] = active;
        }
        for (kind, detail) in pending {
            self.push_event(kind, detail);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn update_metrics(
        &mut self,
        after: &CompartmentState,
        params: &DiseaseParameters,
        new_infections: f64,
        new_deaths: f64,
        vaccinations: f64,
        prevented: f64,
        r_effective: f64,
    ) {
        let m = &mut self.metrics;
        m.cumulative_infections += new_infections;
        m.cumulative_deaths += new_deaths;
        m.cumulative_recoveries += params.gamma * after.infectious * self.config.dt;
        m.cumulative_vaccinations += vaccinations;
        m.prevented_infections += prevented;
        m.prevented_deaths += metrics::prevented_deaths(prevented, params);
        m.incidence_per_100k =
            metrics::incidence_per_100k(new_infections, after.total_population());
        m.annualized_incidence_per_100k = m.incidence_per_100k * 365.0;
        m.prevalence = metrics::prevalence(after);
        m.r_effective = r_effective;
        m.who_target_progress =
            metrics::who_target_progress(self.baseline_incidence, m.annualized_incidence_per_100k);
        m.low_incidence = m.annualized_incidence_per_100k < WHO_LOW_INCIDENCE_PER_100K;
    }

    fn record_threshold_events(&mut self, new_infections: f64, population: f64) {
        let daily_per_100k = metrics::incidence_per_100k(new_infections, population);

        // Rising edge only: one outbreak event per surge.
        if daily_per_100k > OUTBREAK_THRESHOLD_PER_100K {
            if !self.in_outbreak {
                self.in_outbreak = true;
                self.push_event(
                    SimulationEventKind::Outbreak,
                    format!("{new_infections:.0} new infections in one day ({daily_per_100k:.1}/100k)"),
                );
            }
        } else {
            self.in_outbreak = false;
        }

        let low = self.metrics.low_incidence;
        if low && !self.was_low_incidence {
            self.push_event(
                SimulationEventKind::Infection,
                format!(
                    "annualized incidence fell below the WHO low-incidence threshold ({:.1} < {WHO_LOW_INCIDENCE_PER_100K}/100k)",
                    self.metrics.annualized_incidence_per_100k
                ),
            );
        }
        self.was_low_incidence = low;
    }

    fn push_event(&mut self, kind: SimulationEventKind, detail: String) {
        debug!("event on day {}: {:?} {detail}", self.day, kind);
        self.events.push(SimulationEvent {
            kind,
            day: self.day,
            detail,
        });
    }

    fn date_of(&self, day: u32) -> NaiveDate {
        self.config
            .start_date
            .checked_add_days(chrono::Days::new(u64::from(day)))
            .unwrap_or(self.config.start_date)
    }
}

/// Seeds the compartments from the configured initial conditions: the latent
/// pool splits 20%/80% into E_H/E_L, and whatever is left after the seeded
/// compartments goes to S (clamped at zero for defensive robustness).
fn initial_compartments(config: &SimulationConfig) -> CompartmentState {
    let exposed_high = 0.2 * config.initial_latent;
    let exposed_low = 0.8 * config.initial_latent;
    let susceptible = (config.total_population
        - config.initial_infected
        - config.initial_latent
        - config.initial_vaccinated)
        .max(0.0);
    CompartmentState {
        susceptible,
        vaccinated: config.initial_vaccinated,
        exposed_high,
        exposed_low,
        infectious: config.initial_infected,
        recovered: 0.0,
        deceased: 0.0,
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
