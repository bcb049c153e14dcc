use crate::config::{DetectorConfig, DetectorKind};
use crate::model::ServiceStatus;
use crate::probe::{CommandRunner, CommandSpec, ProbeStatus};
use std::time::Duration;
use sysinfo::{ProcessExt, System, SystemExt};
use tracing::info;

const SYSTEMD_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Evaluates every configured detector once, before any probe runs.
/// The resulting statuses gate conditional probes and feed the
/// services block of the summary.
pub async fn detect_services(detectors: &[DetectorConfig], system: &mut System) -> Vec<ServiceStatus> {
    if detectors.iter().any(|d| matches!(d.kind, DetectorKind::Process { .. })) {
        system.refresh_processes();
    }

    let mut statuses = Vec::with_capacity(detectors.len());
    for det in detectors {
        let status = match &det.kind {
            DetectorKind::Process { pattern } => detect_process(&det.name, pattern, system),
            DetectorKind::Systemd { unit } => detect_systemd(&det.name, unit).await,
        };
        info!(
            service = %status.name,
            running = status.running,
            detail = %status.detail,
            "service detection"
        );
        statuses.push(status);
    }
    statuses
}

fn detect_process(name: &str, pattern: &str, system: &System) -> ServiceStatus {
    let matches = system
        .processes()
        .values()
        .filter(|p| {
            p.name().contains(pattern) || p.cmd().iter().any(|arg| arg.contains(pattern))
        })
        .count();
    ServiceStatus {
        name: name.to_string(),
        running: matches > 0,
        detail: if matches > 0 {
            format!("{matches} process(es) matching '{pattern}'")
        } else {
            format!("no process matching '{pattern}'")
        },
    }
}

async fn detect_systemd(name: &str, unit: &str) -> ServiceStatus {
    let spec = CommandSpec::new("systemctl", &["is-active", unit]);
    let result = CommandRunner::execute(name, &spec, SYSTEMD_QUERY_TIMEOUT).await;
    let answer = result.output.trim().to_string();
    ServiceStatus {
        name: name.to_string(),
        running: result.status == ProbeStatus::Success,
        detail: if answer.is_empty() {
            format!("systemctl is-active {unit}: {}", result.status.label())
        } else {
            format!("systemctl is-active {unit}: {answer}")
        },
    }
}
