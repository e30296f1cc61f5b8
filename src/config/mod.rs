//! Configuration of an orchestration session.
//!
//! ## Contents
//! - [`FleetConfig`] timing and capacity knobs with defaults
//! - [`Settings`] the persisted ordered-lines settings file
//! - [`ModuleSet`] first- and second-stage native modules
//! - [`LaunchSpec`], [`Sentinels`] how workers are started and observed

mod fleet;
mod launch;
mod modules;
mod settings;

pub use fleet::FleetConfig;
pub use launch::{LaunchSpec, Sentinels};
pub use modules::ModuleSet;
pub use settings::Settings;
