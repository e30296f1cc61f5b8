//! # Persisted settings file.
//!
//! An ordered list of lines, read once when a session is created:
//!
//! ```text
//! line 1   control-plane base URL
//! line 2   shared secret
//! line 3   worker executable root
//! line 4+  optional feature flags, `key` or `key=value`
//! ```
//!
//! Recognised flags: `free_port=<u16>`, `second_stage_delay_ms=<u64>`.
//! Unknown flags are kept and logged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::error::FleetError;

const FLAG_FREE_PORT: &str = "free_port";
const FLAG_SECOND_STAGE_DELAY_MS: &str = "second_stage_delay_ms";

/// Settings read from the persisted lines file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub secret: String,
    pub executable_root: PathBuf,
    flags: BTreeMap<String, Option<String>>,
    free_port: Option<u16>,
    second_stage_delay: Option<Duration>,
}

impl Settings {
    /// Reads the settings file at `path`.
    ///
    /// A missing file is [`FleetError::ConfigurationMissing`], like a missing line.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FleetError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| FleetError::ConfigurationMissing {
            what: format!("settings file {}: {e}", path.display()),
        })?;
        Self::from_lines(&text)
    }

    /// Parses settings from the file contents.
    pub fn from_lines(text: &str) -> Result<Self, FleetError> {
        let mut lines = text.lines().map(str::trim);

        let base_url = required(lines.next(), "control-plane base URL")?;
        let secret = required(lines.next(), "shared secret")?;
        let executable_root = PathBuf::from(required(lines.next(), "worker executable root")?);

        let mut flags = BTreeMap::new();
        for line in lines.filter(|l| !l.is_empty()) {
            let (key, value) = match line.split_once('=') {
                Some((k, v)) => (k.trim().to_string(), Some(v.trim().to_string())),
                None => (line.to_string(), None),
            };
            flags.insert(key, value);
        }

        let free_port = parse_flag::<u16>(&flags, FLAG_FREE_PORT)?;
        let second_stage_delay =
            parse_flag::<u64>(&flags, FLAG_SECOND_STAGE_DELAY_MS)?.map(Duration::from_millis);

        for key in flags.keys() {
            if key != FLAG_FREE_PORT && key != FLAG_SECOND_STAGE_DELAY_MS {
                warn!(flag = %key, "unknown settings flag ignored");
            }
        }

        Ok(Self {
            base_url,
            secret,
            executable_root,
            flags,
            free_port,
            second_stage_delay,
        })
    }

    /// TCP port that must be free before a worker is launched.
    pub fn free_port(&self) -> Option<u16> {
        self.free_port
    }

    pub fn second_stage_delay(&self) -> Option<Duration> {
        self.second_stage_delay
    }

    /// Returns whether a flag is present, recognised or not.
    pub fn has_flag(&self, key: &str) -> bool {
        self.flags.contains_key(key)
    }

    pub fn flag(&self, key: &str) -> Option<&str> {
        self.flags.get(key).and_then(|v| v.as_deref())
    }
}

fn required(line: Option<&str>, what: &str) -> Result<String, FleetError> {
    match line {
        Some(l) if !l.is_empty() => Ok(l.to_string()),
        _ => Err(FleetError::ConfigurationMissing {
            what: what.to_string(),
        }),
    }
}

fn parse_flag<T: std::str::FromStr>(
    flags: &BTreeMap<String, Option<String>>,
    key: &str,
) -> Result<Option<T>, FleetError> {
    match flags.get(key) {
        None => Ok(None),
        Some(Some(raw)) => raw
            .parse()
            .map(Some)
            .map_err(|_| FleetError::ConfigurationMissing {
                what: format!("valid value for flag {key} (got {raw:?})"),
            }),
        Some(None) => Err(FleetError::ConfigurationMissing {
            what: format!("value for flag {key}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mandatory_lines_and_flags() {
        let s = Settings::from_lines(
            "https://cp.example\nsecret-key\n/opt/worker\nfree_port=7777\nverbose\n",
        )
        .unwrap();
        assert_eq!(s.base_url, "https://cp.example");
        assert_eq!(s.secret, "secret-key");
        assert_eq!(s.executable_root, PathBuf::from("/opt/worker"));
        assert_eq!(s.free_port(), Some(7777));
        assert!(s.has_flag("verbose"));
        assert_eq!(s.flag("verbose"), None);
        assert_eq!(s.second_stage_delay(), None);
    }

    #[test]
    fn missing_line_is_configuration_missing() {
        let err = Settings::from_lines("https://cp.example\nsecret\n").unwrap_err();
        assert_eq!(err.as_label(), "configuration_missing");
        assert!(err.to_string().contains("executable root"));
    }

    #[test]
    fn blank_mandatory_line_is_rejected() {
        assert!(Settings::from_lines("https://cp.example\n\n/opt/worker\n").is_err());
    }

    #[test]
    fn malformed_flag_value_is_rejected() {
        let err = Settings::from_lines("u\ns\n/r\nfree_port=http\n").unwrap_err();
        assert!(err.to_string().contains("free_port"));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, FleetError::ConfigurationMissing { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.txt");
        std::fs::write(&path, "u\ns\n/r\r\n").unwrap();
        let s = Settings::load(&path).unwrap();
        assert_eq!(s.executable_root, PathBuf::from("/r"));
    }
}
