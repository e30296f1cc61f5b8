/// Which event starts a worker's second-stage module load.
///
/// Whatever fires, each worker is loaded at most once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SecondStageTrigger {
    /// Only the authentication sentinel starts the load.
    OnAuthentication,
    /// Only the per-tick sweep starts the load.
    OnSweep,
    /// Whichever comes first (default).
    #[default]
    Either,
}

impl SecondStageTrigger {
    #[inline]
    pub fn on_authentication(&self) -> bool {
        matches!(self, Self::OnAuthentication | Self::Either)
    }

    #[inline]
    pub fn on_sweep(&self) -> bool {
        matches!(self, Self::OnSweep | Self::Either)
    }
}
