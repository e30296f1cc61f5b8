//! Code loading: making a running worker load a native module.
//!
//! This is the only platform-specific component. Everything else talks to the
//! [`CodeLoader`] capability and stays platform-independent.
//!
//! ## Contents
//! - [`CodeLoader`] `load_module(pid, path)` capability
//! - [`RemoteThreadLoader`] Windows implementation (remote thread on the module-load entry point)
//! - [`UnsupportedLoader`] fallback that always fails with `Unsupported`
//! - [`NativeLoader`] whichever of the two fits the build target
//!
//! A successful call only means the load was *started*; the module's own
//! initialization is observed later through worker output sentinels.

use std::path::Path;

use crate::error::LoadError;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::RemoteThreadLoader;

mod unsupported;
pub use unsupported::UnsupportedLoader;

/// Loader for the current build target.
#[cfg(windows)]
pub type NativeLoader = RemoteThreadLoader;
/// Loader for the current build target.
#[cfg(not(windows))]
pub type NativeLoader = UnsupportedLoader;

/// Capability to load a native module into another process.
pub trait CodeLoader: Send + Sync + 'static {
    /// Starts loading `module` inside process `pid`.
    ///
    /// Synchronous; does not wait for the module's initialization.
    fn load_module(&self, pid: u32, module: &Path) -> Result<(), LoadError>;
}
