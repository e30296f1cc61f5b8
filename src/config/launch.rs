use std::path::{Path, PathBuf};

use crate::control_plane::Credential;
use crate::registry::WorkerId;

use super::settings::Settings;

/// Output substrings that announce worker milestones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sentinels {
    /// Printed once the worker has logged in with its credential.
    pub auth_ready: String,
    /// Printed once the worker accepts connections.
    pub listening: String,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            auth_ready: "Successfully logged in user".to_string(),
            listening: "listening on port".to_string(),
        }
    }
}

/// How worker processes are started.
///
/// `args` is a template: `{username}`, `{email}` and `{password}` are
/// replaced with the worker's credential.
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    pub executable_root: PathBuf,
    /// Executable path relative to `executable_root`.
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub log_dir: PathBuf,
    pub sentinels: Sentinels,
    /// Refuse to launch while this TCP port is bound.
    pub free_port: Option<u16>,
}

impl LaunchSpec {
    pub const DEFAULT_EXECUTABLE: &'static str =
        "FortniteGame/Binaries/Win64/FortniteClient-Win64-Shipping.exe";

    pub const DEFAULT_ARGS: [&'static str; 6] = [
        "-AUTH_LOGIN={email}",
        "-AUTH_PASSWORD={password}",
        "-AUTH_TYPE=epic",
        "-nosplash",
        "-nosound",
        "-nullrhi",
    ];

    /// Launch spec with the default executable layout and arguments.
    pub fn new(executable_root: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable_root: executable_root.into(),
            executable: PathBuf::from(Self::DEFAULT_EXECUTABLE),
            args: Self::DEFAULT_ARGS.iter().map(|a| a.to_string()).collect(),
            log_dir: log_dir.into(),
            sentinels: Sentinels::default(),
            free_port: None,
        }
    }

    /// Launch spec for the executable root and port flag of persisted settings.
    pub fn from_settings(settings: &Settings, log_dir: impl Into<PathBuf>) -> Self {
        let mut spec = Self::new(settings.executable_root.clone(), log_dir);
        spec.free_port = settings.free_port();
        spec
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sentinels(mut self, sentinels: Sentinels) -> Self {
        self.sentinels = sentinels;
        self
    }

    pub fn with_free_port(mut self, port: u16) -> Self {
        self.free_port = Some(port);
        self
    }

    pub fn executable_path(&self) -> PathBuf {
        self.executable_root.join(&self.executable)
    }

    /// Arguments with credential placeholders substituted.
    pub fn render_args(&self, credential: &Credential) -> Vec<String> {
        self.args.iter().map(|a| credential.render(a)).collect()
    }

    /// `<log_dir>/worker-<id>.log`
    pub fn log_path(&self, id: WorkerId) -> PathBuf {
        self.log_dir.join(format!("worker-{}.log", id.0))
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}
