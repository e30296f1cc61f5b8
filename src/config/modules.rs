use std::path::{Path, PathBuf};

use crate::error::FleetError;

/// Native modules loaded into every worker.
///
/// The first stage is loaded right after spawn; the second stage, in order,
/// once the worker has authenticated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleSet {
    pub first_stage: PathBuf,
    pub second_stage: Vec<PathBuf>,
}

impl ModuleSet {
    pub const FIRST_STAGE: &'static str = "Backend.dll";
    pub const SECOND_STAGE: [&'static str; 2] = ["memory.dll", "server.dll"];

    /// The standard module layout inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            first_stage: dir.join(Self::FIRST_STAGE),
            second_stage: Self::SECOND_STAGE.iter().map(|m| dir.join(m)).collect(),
        }
    }

    /// Every module, first stage first.
    pub fn all(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.first_stage.as_path()).chain(self.second_stage.iter().map(PathBuf::as_path))
    }

    /// Checks that every module exists, reporting all absent ones at once.
    pub fn verify(&self) -> Result<(), FleetError> {
        let missing: Vec<PathBuf> = self
            .all()
            .filter(|p| !p.is_file())
            .map(Path::to_path_buf)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FleetError::DependencyMissing { missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_lists_every_missing_module() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("memory.dll"), b"").unwrap();

        let set = ModuleSet::in_dir(dir.path());
        match set.verify() {
            Err(FleetError::DependencyMissing { missing }) => {
                assert_eq!(
                    missing,
                    vec![dir.path().join("Backend.dll"), dir.path().join("server.dll")]
                );
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn verify_passes_when_complete() {
        let dir = tempfile::tempdir().unwrap();
        for m in ["Backend.dll", "memory.dll", "server.dll"] {
            std::fs::write(dir.path().join(m), b"").unwrap();
        }
        assert!(ModuleSet::in_dir(dir.path()).verify().is_ok());
    }
}
