use std::path::Path;

use super::CodeLoader;
use crate::error::{LoadError, LoadErrorKind};

/// Loader for targets without a supported injection mechanism.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedLoader;

impl UnsupportedLoader {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CodeLoader for UnsupportedLoader {
    fn load_module(&self, pid: u32, module: &Path) -> Result<(), LoadError> {
        Err(LoadError::new(LoadErrorKind::Unsupported, pid, module))
    }
}
