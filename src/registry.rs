use crate::probe::CommandSpec;
use std::time::Duration;
use thiserror::Error;

/// Report sections in their fixed rendering order. Probes execute in
/// registration order; renderers group by section in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    SystemInfo,
    Performance,
    Services,
    Application,
    Logs,
    Network,
    Packages,
    Summary,
}

impl Section {
    pub fn title(&self) -> &'static str {
        match self {
            Section::SystemInfo => "System Information",
            Section::Performance => "Performance",
            Section::Services => "Services",
            Section::Application => "Application",
            Section::Logs => "Logs",
            Section::Network => "Network",
            Section::Packages => "Packages",
            Section::Summary => "Summary",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Section::SystemInfo => "system",
            Section::Performance => "performance",
            Section::Services => "services",
            Section::Application => "application",
            Section::Logs => "logs",
            Section::Network => "network",
            Section::Packages => "packages",
            Section::Summary => "summary",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "system" => Some(Section::SystemInfo),
            "performance" => Some(Section::Performance),
            "services" => Some(Section::Services),
            "application" => Some(Section::Application),
            "logs" => Some(Section::Logs),
            "network" => Some(Section::Network),
            "packages" => Some(Section::Packages),
            "summary" => Some(Section::Summary),
            _ => None,
        }
    }

    pub const ALL: [Section; 8] = [
        Section::SystemInfo,
        Section::Performance,
        Section::Services,
        Section::Application,
        Section::Logs,
        Section::Network,
        Section::Packages,
        Section::Summary,
    ];
}

/// Gate evaluated before a probe runs. A false precondition records the
/// probe as `Skipped` without spawning anything.
#[derive(Debug, Clone)]
pub enum Precondition {
    Always,
    ServiceRunning(String),
}

#[derive(Debug, Clone)]
pub struct Probe {
    pub name: String,
    pub section: Section,
    pub command: CommandSpec,
    pub timeout: Duration,
    pub precondition: Precondition,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate probe name '{0}'")]
    DuplicateName(String),
    #[error("probe name '{0}' is not filesystem-safe")]
    UnsafeName(String),
}

/// Ordered probe list. Registration order is execution order.
#[derive(Default)]
pub struct SectionRegistry {
    probes: Vec<Probe>,
}

impl SectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, probe: Probe) -> Result<(), RegistryError> {
        if !is_safe_name(&probe.name) {
            return Err(RegistryError::UnsafeName(probe.name));
        }
        if self.probes.iter().any(|p| p.name == probe.name) {
            return Err(RegistryError::DuplicateName(probe.name));
        }
        self.probes.push(probe);
        Ok(())
    }

    pub fn all(&self) -> &[Probe] {
        &self.probes
    }

    pub fn retain_sections(&mut self, sections: &[Section]) {
        self.probes.retain(|p| sections.contains(&p.section));
    }
}

/// Probe names double as output file names, so keep them shell- and
/// path-neutral.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Name of the built-in probe whose output feeds the listening-ports
/// block of the summary digest.
pub const LISTENING_SOCKETS_PROBE: &str = "listening-sockets";

/// The default probe table, one entry per diagnostic the snapshot
/// gathers. Tomcat and PostgreSQL probes are gated on their detectors.
pub fn builtin_probes(default_timeout: Duration) -> Vec<Probe> {
    let always = |name: &str, section: Section, program: &str, args: &[&str]| Probe {
        name: name.to_string(),
        section,
        command: CommandSpec::new(program, args),
        timeout: default_timeout,
        precondition: Precondition::Always,
    };
    let gated = |name: &str, section: Section, program: &str, args: &[&str], service: &str| Probe {
        name: name.to_string(),
        section,
        command: CommandSpec::new(program, args),
        timeout: default_timeout,
        precondition: Precondition::ServiceRunning(service.to_string()),
    };

    vec![
        always("uname", Section::SystemInfo, "uname", &["-a"]),
        always("uptime", Section::SystemInfo, "uptime", &[]),
        always("cpu-info", Section::SystemInfo, "lscpu", &[]),
        always("memory", Section::SystemInfo, "free", &["-h"]),
        always("disk-usage", Section::SystemInfo, "df", &["-h"]),
        always("vmstat", Section::Performance, "vmstat", &["1", "5"]),
        always("iostat", Section::Performance, "iostat", &["-x", "1", "5"]),
        always("top-snapshot", Section::Performance, "top", &["-b", "-n", "1"]),
        always(
            "ps-by-cpu",
            Section::Performance,
            "ps",
            &["aux", "--sort=-%cpu"],
        ),
        always(
            "running-units",
            Section::Services,
            "systemctl",
            &["list-units", "--type=service", "--state=running", "--no-pager"],
        ),
        always(
            "failed-units",
            Section::Services,
            "systemctl",
            &["--failed", "--no-pager"],
        ),
        gated(
            "tomcat-processes",
            Section::Application,
            "pgrep",
            &["-af", "catalina"],
            "tomcat",
        ),
        gated(
            "tomcat-journal",
            Section::Application,
            "journalctl",
            &["-u", "tomcat", "-n", "200", "--no-pager"],
            "tomcat",
        ),
        gated(
            "postgres-activity",
            Section::Application,
            "psql",
            &["-c", "SELECT datname, state, count(*) FROM pg_stat_activity GROUP BY 1, 2"],
            "postgresql",
        ),
        gated(
            "postgres-version",
            Section::Application,
            "psql",
            &["-c", "SELECT version()"],
            "postgresql",
        ),
        gated(
            "postgres-service",
            Section::Application,
            "systemctl",
            &["status", "postgresql", "--no-pager"],
            "postgresql",
        ),
        always(
            "journal-errors",
            Section::Logs,
            "journalctl",
            &["-p", "err", "-n", "100", "--no-pager"],
        ),
        always(
            "kernel-log",
            Section::Logs,
            "journalctl",
            &["-k", "-n", "100", "--no-pager"],
        ),
        always(LISTENING_SOCKETS_PROBE, Section::Network, "ss", &["-tlnp"]),
        always("socket-summary", Section::Network, "ss", &["-s"]),
        always("interfaces", Section::Network, "ip", &["addr"]),
        always("routes", Section::Network, "ip", &["route"]),
        always("deb-packages", Section::Packages, "dpkg", &["-l"]),
        always("rpm-packages", Section::Packages, "rpm", &["-qa"]),
    ]
}
