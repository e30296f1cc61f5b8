//! Policies applied by the orchestrator.
//!
//! ## Contents
//! - [`CrashPolicy`], [`ExitClass`], [`CrashDecision`] what happens to an exited worker
//! - [`SecondStageTrigger`] which event starts the second-stage module load

mod crash;
mod trigger;

pub use crash::{CrashDecision, CrashPolicy, ExitClass};
pub use trigger::SecondStageTrigger;
