use crate::probe::CommandSpec;
use crate::registry::{is_safe_name, Section};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Section keys to include; empty means all sections.
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default = "default_detectors")]
    pub detectors: Vec<DetectorConfig>,
    /// Extra probes appended after the built-in table.
    #[serde(default)]
    pub probes: Vec<ProbeConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: DetectorKind,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum DetectorKind {
    /// Running when a process whose name or command line contains
    /// `pattern` exists.
    Process { pattern: String },
    /// Running when `systemctl is-active <unit>` reports active.
    Systemd { unit: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    pub name: String,
    pub section: String,
    pub command: CommandSpec,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Detector name this probe is gated on, if any.
    #[serde(default)]
    pub requires: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("config validation failed: {0}")]
    Validation(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            duration_secs: default_duration_secs(),
            sample_interval_secs: default_sample_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            sections: Vec::new(),
            detectors: default_detectors(),
            probes: Vec::new(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.duration_secs < 1 {
            return Err(ConfigError::Validation(
                "duration_secs must be >= 1".to_string(),
            ));
        }
        if self.sample_interval_secs < 1 {
            return Err(ConfigError::Validation(
                "sample_interval_secs must be >= 1".to_string(),
            ));
        }
        if self.sample_interval_secs > self.duration_secs {
            return Err(ConfigError::Validation(
                "sample_interval_secs must not exceed duration_secs".to_string(),
            ));
        }
        if self.probe_timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "probe_timeout_secs must be >= 1".to_string(),
            ));
        }
        if self.output_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "output_dir must not be empty".to_string(),
            ));
        }

        for key in &self.sections {
            if Section::from_key(key).is_none() {
                return Err(ConfigError::Validation(format!(
                    "unknown section '{key}' (valid: {})",
                    Section::ALL.map(|s| s.key()).join(", ")
                )));
            }
        }

        validate_detectors(&self.detectors)?;
        validate_probes(&self.probes, &self.detectors)?;

        Ok(())
    }

    pub fn included_sections(&self) -> Vec<Section> {
        if self.sections.is_empty() {
            return Section::ALL.to_vec();
        }
        // Keys were validated; unknown keys cannot reach here.
        self.sections
            .iter()
            .filter_map(|key| Section::from_key(key))
            .collect()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_detectors(detectors: &[DetectorConfig]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for det in detectors {
        if det.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "detectors[*].name must not be empty".to_string(),
            ));
        }
        if !names.insert(det.name.clone()) {
            return Err(ConfigError::Validation(format!(
                "detector name '{}' must be unique",
                det.name
            )));
        }
        match &det.kind {
            DetectorKind::Process { pattern } if pattern.trim().is_empty() => {
                return Err(ConfigError::Validation(format!(
                    "detector '{}' has an empty process pattern",
                    det.name
                )));
            }
            DetectorKind::Systemd { unit } if unit.trim().is_empty() => {
                return Err(ConfigError::Validation(format!(
                    "detector '{}' has an empty systemd unit",
                    det.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_probes(
    probes: &[ProbeConfig],
    detectors: &[DetectorConfig],
) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for probe in probes {
        if !is_safe_name(&probe.name) {
            return Err(ConfigError::Validation(format!(
                "probe name '{}' must be non-empty and use only [A-Za-z0-9_-]",
                probe.name
            )));
        }
        if !names.insert(probe.name.clone()) {
            return Err(ConfigError::Validation(format!(
                "probe name '{}' must be unique",
                probe.name
            )));
        }
        if Section::from_key(&probe.section).is_none() {
            return Err(ConfigError::Validation(format!(
                "probe '{}' references unknown section '{}'",
                probe.name, probe.section
            )));
        }
        if probe.command.program.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "probe '{}' has an empty command program",
                probe.name
            )));
        }
        if let Some(timeout) = probe.timeout_secs {
            if timeout < 1 {
                return Err(ConfigError::Validation(format!(
                    "probe '{}' timeout_secs must be >= 1",
                    probe.name
                )));
            }
        }
        if let Some(required) = &probe.requires {
            if !detectors.iter().any(|d| &d.name == required) {
                return Err(ConfigError::Validation(format!(
                    "probe '{}' requires unknown detector '{}'",
                    probe.name, required
                )));
            }
        }
    }
    Ok(())
}

fn default_output_dir() -> String {
    ".".to_string()
}

const fn default_duration_secs() -> u64 {
    60
}

const fn default_sample_interval_secs() -> u64 {
    5
}

const fn default_probe_timeout_secs() -> u64 {
    30
}

fn default_detectors() -> Vec<DetectorConfig> {
    vec![
        DetectorConfig {
            name: "tomcat".to_string(),
            kind: DetectorKind::Process {
                pattern: "catalina".to_string(),
            },
        },
        DetectorConfig {
            name: "postgresql".to_string(),
            kind: DetectorKind::Systemd {
                unit: "postgresql".to_string(),
            },
        },
    ]
}
