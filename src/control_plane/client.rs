//! # Control-plane contract consumed by the orchestrator.
//!
//! The orchestrator treats the control plane as unreliable: any call may fail,
//! and no failure may corrupt registry invariants.

use async_trait::async_trait;

use super::Credential;
use crate::error::ControlPlaneError;

/// Remote service that signals demand and issues/revokes worker credentials.
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    /// Returns whether another worker is needed.
    async fn poll_demand(&self) -> Result<bool, ControlPlaneError>;

    /// Provisions a fresh credential for one new worker.
    async fn provision_credential(&self) -> Result<Credential, ControlPlaneError>;

    /// Revokes a credential. Best effort: callers log and swallow the error.
    async fn revoke_credential(&self, credential: Credential) -> Result<(), ControlPlaneError>;
}
