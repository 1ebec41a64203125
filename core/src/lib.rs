//! fedsim-core: batch orchestration for the orbital federates simulator.
//!
//! A batch asks for `count` seeds of one configuration. Seeds already in the
//! result store are reused; the rest are run as external simulator processes
//! through a bounded concurrency gate, decoded, and persisted together.

pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod gate;
pub mod invoker;
pub mod orchestrator;
pub mod output;
pub mod placement;
pub mod planner;
pub mod record;
pub mod run_config;
pub mod store;
pub mod types;

pub use context::FedsimContext;
pub use error::{FedsimError, FedsimResult, PlacementError, TrialError};
pub use orchestrator::{BatchOrchestrator, BatchOutcome, BatchState};
pub use run_config::{BatchRequest, RawRunConfig, RunConfig};
pub use store::{ResultStore, SimStore};
