//! tbsim is a deterministic compartmental model of tuberculosis
//! transmission dynamics. The engine advances an extended SEIR state vector
//! (with TB's two-stage latency and a vaccinated compartment) one simulated
//! day at a time under configurable vaccination and intervention policies,
//! and streams incremental snapshots and events to consumers from a
//! background execution host.

pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod integrator;
pub mod log;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod report;
pub mod runner;
pub mod scheduler;

pub use config::SimulationConfig;
pub use engine::{
    SimulationEngine, SimulationEvent, SimulationEventKind, SimulationSnapshot, SimulationStatus,
    TimeSeriesPoint,
};
pub use error::TbError;
pub use host::{Command, OutboundMessage, SimulationHost};
pub use crate::log::{debug, error, info, trace, warn};
pub use model::{CompartmentState, DiseaseParameters};
pub use policy::{InterventionKind, PolicyIntervention};
