//! # Runtime configuration of the orchestrator.
//!
//! [`FleetConfig`] centralizes the timing and capacity knobs of one orchestration session.
//!
//! ## Sentinel values
//! - `setup_timeout = None` → workers may stay in setup indefinitely
//! - `crash_policy.max_relaunches = None` → unbounded relaunches per credential

use std::time::Duration;

use crate::policies::{CrashPolicy, SecondStageTrigger};

use super::settings::Settings;

/// Runtime configuration for the orchestrator.
///
/// ## Field semantics
/// - `tick_interval`: delay between the end of one tick and the start of the next
/// - `dwell`: how long a worker must stay alive after its listening sentinel before it is `Ready`
/// - `max_instances`: registry capacity (`start(n)` overrides it)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `request_timeout`: per-request timeout of the HTTP control plane
/// - `second_stage_delay`: pause between consecutive second-stage modules
/// - `setup_timeout`: optional limit on time spent before the listening sentinel
#[derive(Clone, Debug)]
pub struct FleetConfig {
    pub tick_interval: Duration,
    pub dwell: Duration,
    pub max_instances: usize,
    pub bus_capacity: usize,
    pub request_timeout: Duration,
    pub second_stage_delay: Duration,

    /// Workers still before `Listening` after this long are terminated.
    ///
    /// They are reclaimed by the next sweep as `CrashBeforeReady`, which relaunches
    /// them under the crash policy.
    pub setup_timeout: Option<Duration>,

    pub crash_policy: CrashPolicy,
    pub second_stage_trigger: SecondStageTrigger,
}

impl FleetConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Applies overrides carried by persisted settings flags.
    pub fn apply_settings(&mut self, settings: &Settings) {
        if let Some(delay) = settings.second_stage_delay() {
            self.second_stage_delay = delay;
        }
    }
}

impl Default for FleetConfig {
    /// Default configuration:
    ///
    /// - `tick_interval = 35s`, `dwell = 70s`
    /// - `max_instances = 1`, `bus_capacity = 1024`
    /// - `request_timeout = 30s`, `second_stage_delay = 5s`
    /// - no setup timeout, unbounded relaunches, second stage on either trigger
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(35),
            dwell: Duration::from_secs(70),
            max_instances: 1,
            bus_capacity: 1024,
            request_timeout: Duration::from_secs(30),
            second_stage_delay: Duration::from_secs(5),
            setup_timeout: None,
            crash_policy: CrashPolicy::default(),
            second_stage_trigger: SecondStageTrigger::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timing() {
        let cfg = FleetConfig::default();
        assert_eq!(cfg.tick_interval, Duration::from_secs(35));
        assert_eq!(cfg.dwell, Duration::from_secs(70));
        assert_eq!(cfg.max_instances, 1);
        assert!(cfg.setup_timeout.is_none());
    }

    #[test]
    fn settings_override_second_stage_delay() {
        let settings = Settings::from_lines(
            "https://cp.example\nsecret\n/opt/worker\nsecond_stage_delay_ms=250\n",
        )
        .unwrap();
        let mut cfg = FleetConfig::default();
        cfg.apply_settings(&settings);
        assert_eq!(cfg.second_stage_delay, Duration::from_millis(250));
    }
}
