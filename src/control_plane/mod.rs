//! Control-plane client: demand polling and credential lifecycle.
//!
//! ## Contents
//! - [`ControlPlane`] the contract the orchestrator consumes
//! - [`Credential`] per-worker identity (revoked at most once; not `Clone`)
//! - [`HttpControlPlane`] HTTP/JSON implementation, [`Endpoints`] its paths

mod client;
mod credential;
mod http;

pub use client::ControlPlane;
pub use credential::Credential;
pub use http::{Endpoints, HttpControlPlane};
